use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The document kinds the service can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Contract,
    ApprovalLetter,
    TermsOfReference,
    ProjectSummary,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        Self::Contract,
        Self::ApprovalLetter,
        Self::TermsOfReference,
        Self::ProjectSummary,
    ];

    /// Path segment used by the HTTP route.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::ApprovalLetter => "approval-letter",
            Self::TermsOfReference => "terms-of-reference",
            Self::ProjectSummary => "project-summary",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    /// Title used in stored file names.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Contract => "Contract",
            Self::ApprovalLetter => "Approval Letter",
            Self::TermsOfReference => "Terms of Reference",
            Self::ProjectSummary => "Project Summary",
        }
    }

    /// Phrase used in auto-created project descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Contract => "a contract",
            Self::ApprovalLetter => "an approval letter",
            Self::TermsOfReference => "a terms of reference",
            Self::ProjectSummary => "a project summary",
        }
    }

    /// Template to load, with a per-contract-type variant for contracts.
    ///
    /// Returns `(name, fallback)`.
    pub fn template_names(&self, contract_type: Option<&str>) -> (String, Option<&'static str>) {
        match (self, contract_type) {
            (Self::Contract, Some(code)) => (format!("contract_{code}.docx"), Some("contract.docx")),
            (Self::Contract, None) => ("contract.docx".to_string(), None),
            (Self::ApprovalLetter, _) => ("approval_letter.docx".to_string(), None),
            (Self::TermsOfReference, _) => ("terms_of_reference.docx".to_string(), None),
            (Self::ProjectSummary, _) => ("project_summary.xlsx".to_string(), None),
        }
    }

    /// Whether the document can carry an embedded signature.
    pub fn accepts_signature(&self) -> bool {
        !matches!(self, Self::ProjectSummary)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
