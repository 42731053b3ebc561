//! Template rendering - turning an office-document template plus a data scope
//! into a finished document.
//!
//! - `archive` - zip container access for OOXML packages
//! - `store` - named template lookup with fallback and caching
//! - `scope` - nested data scope used during a render
//! - `resolver` - placeholder resolution policy
//! - `docx` - single-brace placeholder engine for Word documents
//! - `image` - raster image embedding plugin
//! - `xlsx` - double-brace cell substitution for spreadsheets

pub mod archive;
pub mod docx;
pub mod image;
pub mod resolver;
pub mod scope;
pub mod store;
pub mod test_utils;
pub mod xlsx;

pub use archive::OfficeArchive;
pub use docx::{Delimiters, PlaceholderEngine};
pub use image::{ImageAsset, ImageEmbedModule, ImageFormat, ImageSource};
pub use resolver::{FieldResolver, ResolvedValue, Resolver};
pub use scope::Scope;
pub use store::{LoadedTemplate, TemplateStore};
pub use xlsx::SpreadsheetRenderer;

use thiserror::Error;

/// Errors raised while loading or rendering a template.
///
/// Every variant is a content-authoring or template-availability problem,
/// never a problem with the caller's data.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template `{0}` not found")]
    NotFound(String),
    #[error("invalid template name `{0}`")]
    InvalidName(String),
    #[error("failed to read template `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("template archive is unreadable: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to assemble archive: {0}")]
    Write(#[source] std::io::Error),
    #[error("required part `{0}` is missing from the archive")]
    MissingPart(String),
    #[error("part `{part}` is not valid XML: {message}")]
    Xml { part: String, message: String },
    #[error("malformed placeholder markup in `{part}`: {message}")]
    Structure { part: String, message: String },
    #[error("unsupported template format `{0}`")]
    UnsupportedFormat(String),
}

impl TemplateError {
    pub(crate) fn structure(part: &str, message: impl Into<String>) -> Self {
        Self::Structure {
            part: part.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn xml(part: &str, message: impl ToString) -> Self {
        Self::Xml {
            part: part.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// The binary container format of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Docx,
    Xlsx,
}

impl TemplateFormat {
    /// Infer the format from a template file name.
    pub fn from_name(name: &str) -> Result<Self> {
        let ext = std::path::Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("docx") | Some("dotx") => Ok(Self::Docx),
            Some("xlsx") | Some("xltx") => Ok(Self::Xlsx),
            _ => Err(TemplateError::UnsupportedFormat(name.to_string())),
        }
    }

    /// File extension of documents rendered from this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
        }
    }
}

/// The output of one render call.
#[derive(Debug)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}
