//! Field rules and render scopes for each document kind.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::common::{format_amount, parse_amount};
use super::validation::{ValidationError, ValidationErrors};
use super::DocumentKind;
use crate::shaping::shape;

pub const PROJECT_NAME: &str = "project_name";
pub const CONTRACT_TYPE: &str = "contract_type";
pub const SIGNATURE_TAG: &str = "signature";

lazy_static! {
    static ref CONTRACT_TYPE_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9-]{1,16}$").unwrap();
}

/// What a document kind expects from the caller.
#[derive(Debug, Clone, Copy)]
pub struct FieldRules {
    /// `(field, label)` pairs that must be present and non-empty.
    pub required: &'static [(&'static str, &'static str)],
    /// Fields whose line breaks are kept.
    pub free_text: &'static [&'static str],
    /// Fields holding money amounts; each gets a `<field>_formatted` twin.
    pub amounts: &'static [&'static str],
    /// Fields holding arrays of row objects.
    pub tables: &'static [&'static str],
}

pub fn rules(kind: DocumentKind) -> FieldRules {
    match kind {
        DocumentKind::Contract => FieldRules {
            required: &[
                (PROJECT_NAME, "Project name"),
                (CONTRACT_TYPE, "Contract type"),
                ("contractor_name", "Contractor name"),
                ("contract_value", "Contract value"),
            ],
            free_text: &["contractor_address", "scope_of_work", "notes"],
            amounts: &["contract_value"],
            tables: &["activities"],
        },
        DocumentKind::ApprovalLetter => FieldRules {
            required: &[
                (PROJECT_NAME, "Project name"),
                ("recipient_name", "Recipient name"),
                ("subject", "Subject"),
            ],
            free_text: &["recipient_address", "body", "notes"],
            amounts: &["approved_budget"],
            tables: &[],
        },
        DocumentKind::TermsOfReference => FieldRules {
            required: &[
                (PROJECT_NAME, "Project name"),
                ("background", "Background"),
                ("objectives", "Objectives"),
            ],
            free_text: &["background", "objectives", "scope_of_work", "deliverables"],
            amounts: &["estimated_budget"],
            tables: &["activities"],
        },
        DocumentKind::ProjectSummary => FieldRules {
            required: &[(PROJECT_NAME, "Project name")],
            free_text: &[],
            amounts: &["total_budget"],
            tables: &["activities"],
        },
    }
}

/// Check the caller's fields for `kind`, reporting every problem at once.
///
/// With an explicit project the project name may be omitted; it is taken
/// from the project record instead.
pub fn validate(
    kind: DocumentKind,
    fields: &Map<String, Value>,
    has_explicit_project: bool,
) -> Result<(), String> {
    let rules = rules(kind);
    let mut errors = ValidationErrors::new();

    for &(field, label) in rules.required {
        if field == PROJECT_NAME && has_explicit_project {
            continue;
        }
        match fields.get(field) {
            None | Some(Value::Null) => errors.add(ValidationError::empty_field(field, label)),
            Some(Value::String(s)) if shape(s).is_empty() => {
                errors.add(ValidationError::empty_field(field, label))
            }
            Some(Value::String(_)) | Some(Value::Number(_)) => {}
            Some(_) => errors.add(ValidationError::wrong_type(field, "text")),
        }
    }

    if kind == DocumentKind::Contract {
        match fields.get(CONTRACT_TYPE) {
            Some(Value::String(code)) => {
                let code = code.trim();
                if !code.is_empty() && !CONTRACT_TYPE_PATTERN.is_match(code) {
                    errors.add(ValidationError::invalid_contract_type(CONTRACT_TYPE, code));
                }
            }
            Some(Value::Number(_)) => errors.add(ValidationError::wrong_type(CONTRACT_TYPE, "text")),
            _ => {}
        }
    }

    for &field in rules.amounts {
        check_amount(fields.get(field), field, &mut errors);
    }

    for &table in rules.tables {
        match fields.get(table) {
            None | Some(Value::Null) => {}
            Some(Value::Array(rows)) => {
                for (i, row) in rows.iter().enumerate() {
                    let name = format!("{}[{}]", table, i);
                    match row {
                        Value::Object(row) => check_amount(row.get("amount"), &name, &mut errors),
                        _ => errors.add(ValidationError::wrong_type(&name, "an object")),
                    }
                }
            }
            Some(_) => errors.add(ValidationError::wrong_type(table, "a list of rows")),
        }
    }

    errors.into_result()
}

fn check_amount(value: Option<&Value>, field: &str, errors: &mut ValidationErrors) {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() && parse_amount(s).is_none() => {
            errors.add(ValidationError::invalid_amount(field, s.trim()))
        }
        Some(Value::Bool(_)) | Some(Value::Array(_)) | Some(Value::Object(_)) => {
            errors.add(ValidationError::wrong_type(field, "an amount"))
        }
        _ => {}
    }
}

fn amount_of(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// The trimmed contract type of a contract request.
pub fn contract_type(fields: &Map<String, Value>) -> Option<String> {
    match fields.get(CONTRACT_TYPE) {
        Some(Value::String(code)) if !code.trim().is_empty() => Some(code.trim().to_string()),
        _ => None,
    }
}

/// Extra values added to the caller's fields before rendering.
#[derive(Debug, Clone)]
pub struct ScopeExtras<'a> {
    pub date: String,
    pub contract_number: Option<&'a str>,
}

/// Assemble the render scope: the caller's fields plus derived values
/// (formatted amounts, row numbers, table totals, date, contract number).
pub fn build_scope(kind: DocumentKind, fields: &Map<String, Value>, extras: ScopeExtras<'_>) -> Value {
    let rules = rules(kind);
    let mut scope = fields.clone();

    for &field in rules.amounts {
        if let Some(amount) = amount_of(fields.get(field)) {
            scope.insert(format!("{}_formatted", field), Value::String(format_amount(amount)));
        }
    }

    for &table in rules.tables {
        let Some(Value::Array(rows)) = fields.get(table) else {
            scope.insert(format!("{}_count", table), Value::from(0));
            continue;
        };

        let mut total = 0.0;
        let numbered: Vec<Value> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut row = row.as_object().cloned().unwrap_or_default();
                row.insert("no".to_string(), Value::from(i + 1));
                if let Some(amount) = amount_of(row.get("amount")) {
                    total += amount;
                    row.insert("amount_formatted".to_string(), Value::String(format_amount(amount)));
                }
                Value::Object(row)
            })
            .collect();

        scope.insert(format!("{}_count", table), Value::from(numbered.len()));
        scope.insert(format!("{}_total", table), Value::String(format_amount(total)));
        scope.insert(table.to_string(), Value::Array(numbered));
    }

    scope.insert("document_title".to_string(), Value::String(kind.title().to_string()));
    scope.insert("date".to_string(), Value::String(extras.date));
    if let Some(number) = extras.contract_number {
        scope.insert("contract_number".to_string(), Value::String(number.to_string()));
    }

    Value::Object(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_contract_requires_core_fields() {
        let message = validate(DocumentKind::Contract, &fields(json!({})), false).unwrap_err();
        assert!(message.contains("4 error(s)"));
        assert!(message.contains("[contractor_name]"));

        let ok = fields(json!({
            "project_name": "Harbor Bridge",
            "contract_type": "ABS",
            "contractor_name": "PT Example",
            "contract_value": "1,250,000"
        }));
        assert!(validate(DocumentKind::Contract, &ok, false).is_ok());
    }

    #[test]
    fn test_whitespace_only_counts_as_empty() {
        let message = validate(
            DocumentKind::ProjectSummary,
            &fields(json!({ "project_name": " \n\t " })),
            false,
        )
        .unwrap_err();
        assert!(message.contains("[project_name]"));
    }

    #[test]
    fn test_explicit_project_makes_name_optional() {
        assert!(validate(DocumentKind::ProjectSummary, &fields(json!({})), true).is_ok());
    }

    #[test]
    fn test_rejects_unsafe_contract_type_and_bad_amounts() {
        let bad = fields(json!({
            "project_name": "Harbor Bridge",
            "contract_type": "../ABS",
            "contractor_name": "PT Example",
            "contract_value": "a lot",
            "activities": [{ "amount": "12x" }, "row"]
        }));
        let message = validate(DocumentKind::Contract, &bad, false).unwrap_err();
        assert!(message.contains("[contract_type]"));
        assert!(message.contains("[contract_value]"));
        assert!(message.contains("[activities[0]]"));
        assert!(message.contains("[activities[1]]"));
    }

    #[test]
    fn test_build_scope_adds_derived_values() {
        let input = fields(json!({
            "project_name": "Harbor Bridge",
            "contract_value": 1500000,
            "activities": [
                { "description": "Survey", "amount": "1,000" },
                { "description": "Design", "amount": 250.5 }
            ]
        }));
        let scope = build_scope(
            DocumentKind::Contract,
            &input,
            ScopeExtras {
                date: "1 March 2026".into(),
                contract_number: Some("ABS07"),
            },
        );

        assert_eq!(scope["contract_value_formatted"], "1,500,000.00");
        assert_eq!(scope["activities"][0]["no"], 1);
        assert_eq!(scope["activities"][1]["no"], 2);
        assert_eq!(scope["activities"][1]["amount_formatted"], "250.50");
        assert_eq!(scope["activities_total"], "1,250.50");
        assert_eq!(scope["activities_count"], 2);
        assert_eq!(scope["contract_number"], "ABS07");
        assert_eq!(scope["date"], "1 March 2026");
        assert_eq!(scope["document_title"], "Contract");
    }

    #[test]
    fn test_missing_table_has_zero_count() {
        let scope = build_scope(
            DocumentKind::TermsOfReference,
            &fields(json!({ "project_name": "X" })),
            ScopeExtras {
                date: String::new(),
                contract_number: None,
            },
        );
        assert_eq!(scope["activities_count"], 0);
        assert!(scope.get("activities").is_none());
        assert!(scope.get("contract_number").is_none());
    }
}
