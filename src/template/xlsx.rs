//! Double-brace substitution for spreadsheet templates.
//!
//! Spreadsheets get a flat find/replace instead of the section engine: every
//! `{{key}}` in shared strings, inline strings and formula bodies is replaced
//! by the flattened scope value for `key`. Unknown keys are left as written so
//! a half-filled template is easy to spot.

use std::collections::HashMap;

use lazy_static::lazy_static;
use quick_xml::escape::partial_escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::Value;

use super::archive::{serialize, OfficeArchive};
use super::{RenderedDocument, Result, TemplateError};
use crate::shaping::shape;

const WORKBOOK: &str = "xl/workbook.xml";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

lazy_static! {
    static ref WORKSHEET: Regex = Regex::new(r"^xl/worksheets/[^/]+\.xml$").unwrap();
}

#[derive(Debug, Default)]
pub struct SpreadsheetRenderer;

impl SpreadsheetRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, template: &[u8], data: &Value) -> Result<RenderedDocument> {
        let mut archive = OfficeArchive::from_bytes(template)?;
        if !archive.contains(WORKBOOK) {
            return Err(TemplateError::MissingPart(WORKBOOK.to_string()));
        }

        let values = flatten(data);
        let parts: Vec<String> = archive
            .names()
            .filter(|name| *name == SHARED_STRINGS || WORKSHEET.is_match(name))
            .map(str::to_string)
            .collect();

        let mut formulas_changed = false;
        for part in &parts {
            let Some(xml) = archive.get_string(part)? else {
                continue;
            };
            let (out, changed) = substitute_part(part, &xml, &values)?;
            formulas_changed |= changed;
            archive.set_string(part.clone(), out);
        }

        if formulas_changed {
            if let Some(workbook) = archive.get_string(WORKBOOK)? {
                archive.set_string(WORKBOOK, force_recalculation(&workbook));
            }
        }

        Ok(RenderedDocument {
            bytes: archive.to_bytes()?,
            extension: "xlsx",
        })
    }
}

/// Flatten a JSON object into `key` / `parent.child` text values. Arrays and
/// nulls have no cell representation and are skipped.
pub fn flatten(data: &Value) -> HashMap<String, String> {
    let mut values = HashMap::new();
    if let Value::Object(map) = data {
        for (key, value) in map {
            flatten_into(key, value, &mut values);
        }
    }
    values
}

fn flatten_into(key: &str, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::String(s) => {
            out.insert(key.to_string(), shape(s));
        }
        Value::Number(n) => {
            out.insert(key.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            out.insert(key.to_string(), b.to_string());
        }
        Value::Object(map) => {
            for (child, value) in map {
                flatten_into(&format!("{key}.{child}"), value, out);
            }
        }
        Value::Null | Value::Array(_) => {}
    }
}

/// Replace every `{{key}}` with a known key in one left-to-right pass.
/// Inside formulas, `"` in values is doubled so string literals stay closed.
fn replace_placeholders(text: &str, values: &HashMap<String, String>, formula: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let key = &rest[start + 2..start + 2 + len];
        let end = start + 2 + len + 2;

        out.push_str(&rest[..start]);
        match values.get(key) {
            Some(value) if formula => out.push_str(&value.replace('"', "\"\"")),
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..end]),
        }
        rest = &rest[end..];
    }

    out.push_str(rest);
    out
}

/// Rewrite one part. Returns the new XML and whether any formula changed.
fn substitute_part(
    part: &str,
    xml: &str,
    values: &HashMap<String, String>,
) -> Result<(String, bool)> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(false);

    let mut out = String::with_capacity(xml.len());
    let mut buf = Vec::new();
    // innermost substitutable element: b't' or b'f'
    let mut inside: Option<u8> = None;
    let mut formula_changed = false;
    let mut cell_formula_changed = false;
    let mut cached_value: Option<(usize, usize)> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| TemplateError::xml(part, e))?;

        match event {
            Event::Eof => break,
            Event::Start(start) => {
                let local = start.local_name().as_ref().to_vec();
                match local.as_slice() {
                    b"t" | b"f" => inside = Some(local[0]),
                    b"c" => {
                        cell_formula_changed = false;
                        cached_value = None;
                    }
                    b"v" => cached_value = Some((out.len(), out.len())),
                    _ => {}
                }
                out.push_str(&serialize(part, Event::Start(start))?);
            }
            Event::End(end) => {
                let local = end.local_name().as_ref().to_vec();
                out.push_str(&serialize(part, Event::End(end))?);
                match local.as_slice() {
                    b"t" | b"f" => inside = None,
                    b"v" => {
                        if let Some((start, _)) = cached_value {
                            cached_value = Some((start, out.len()));
                        }
                    }
                    b"c" => {
                        if cell_formula_changed {
                            if let Some((start, end)) = cached_value.take() {
                                out.replace_range(start..end, "");
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(text) if inside.is_some() => {
                let raw = text
                    .unescape()
                    .map_err(|e| TemplateError::xml(part, e))?
                    .into_owned();
                let replaced = replace_placeholders(&raw, values, inside == Some(b'f'));
                if replaced != raw {
                    if inside == Some(b'f') {
                        formula_changed = true;
                        cell_formula_changed = true;
                    }
                    out.push_str(&partial_escape(&replaced));
                } else {
                    out.push_str(&serialize(part, Event::Text(text))?);
                }
            }
            other => out.push_str(&serialize(part, other)?),
        }
        buf.clear();
    }

    Ok((out, formula_changed))
}

/// Ask the spreadsheet application to recompute every formula on open.
fn force_recalculation(workbook: &str) -> String {
    if workbook.contains("fullCalcOnLoad") {
        return workbook.to_string();
    }

    if let Some(pos) = workbook.find("<calcPr") {
        let at = pos + "<calcPr".len();
        return format!(r#"{} fullCalcOnLoad="1"{}"#, &workbook[..at], &workbook[at..]);
    }

    let calc = r#"<calcPr fullCalcOnLoad="1"/>"#;
    for anchor in ["</definedNames>", "</sheets>"] {
        if let Some(pos) = workbook.find(anchor) {
            let at = pos + anchor.len();
            return format!("{}{}{}", &workbook[..at], calc, &workbook[at..]);
        }
    }
    workbook.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::test_utils::minimal_xlsx;
    use serde_json::json;

    fn render(shared: &[&str], sheet: &str, data: Value) -> OfficeArchive {
        let template = minimal_xlsx(shared, sheet).unwrap();
        let rendered = SpreadsheetRenderer::new().render(&template, &data).unwrap();
        assert_eq!(rendered.extension, "xlsx");
        OfficeArchive::from_bytes(&rendered.bytes).unwrap()
    }

    #[test]
    fn test_flatten_nested_values() {
        let values = flatten(&json!({
            "project": { "name": "Bridge", "budget": 1200 },
            "approved": true,
            "rows": [1, 2],
            "note": null,
        }));

        assert_eq!(values["project.name"], "Bridge");
        assert_eq!(values["project.budget"], "1200");
        assert_eq!(values["approved"], "true");
        assert!(!values.contains_key("rows"));
        assert!(!values.contains_key("note"));
    }

    #[test]
    fn test_replace_is_single_pass_and_keeps_unknown() {
        let mut values = HashMap::new();
        values.insert("a".to_string(), "{{b}}".to_string());
        values.insert("b".to_string(), "B".to_string());

        assert_eq!(replace_placeholders("{{a}}-{{b}}-{{c}}", &values, false), "{{b}}-B-{{c}}");
        assert_eq!(replace_placeholders("open {{a", &values, false), "open {{a");
    }

    #[test]
    fn test_shared_strings_are_substituted() {
        let archive = render(
            &["Project: {{project_name}}", "Owner: {{owner}}"],
            r#"<c r="A1" t="s"><v>0</v></c>"#,
            json!({ "project_name": "Bridge & Road", "owner": "  Sam  " }),
        );

        let shared = archive.get_string("xl/sharedStrings.xml").unwrap().unwrap();
        assert!(shared.contains("Project: Bridge &amp; Road"));
        assert!(shared.contains("Owner: Sam"));
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let archive = render(&["{{missing}}"], r#"<c r="A1" t="s"><v>0</v></c>"#, json!({}));
        let shared = archive.get_string("xl/sharedStrings.xml").unwrap().unwrap();
        assert!(shared.contains("{{missing}}"));
    }

    #[test]
    fn test_inline_strings_are_substituted() {
        let archive = render(
            &[],
            r#"<c r="B2" t="inlineStr"><is><t>{{total}}</t></is></c>"#,
            json!({ "total": 4500 }),
        );
        let sheet = archive.get_string("xl/worksheets/sheet1.xml").unwrap().unwrap();
        assert!(sheet.contains("<t>4500</t>"));
    }

    #[test]
    fn test_rich_text_runs_keep_their_formatting() {
        let archive = render(
            &[],
            concat!(
                r#"<c r="A1" t="inlineStr"><is>"#,
                r#"<r><rPr><b/></rPr><t>{{a}}</t></r>"#,
                r#"<r><t xml:space="preserve"> and {{b}}</t></r>"#,
                r#"<r><t>{{spl</t></r><r><t>it}}</t></r>"#,
                r#"</is></c>"#,
            ),
            json!({ "a": "A", "b": "B", "split": "never" }),
        );

        let sheet = archive.get_string("xl/worksheets/sheet1.xml").unwrap().unwrap();
        assert!(sheet.contains("<r><rPr><b/></rPr><t>A</t></r>"));
        assert!(sheet.contains(r#"<t xml:space="preserve"> and B</t>"#));
        assert!(sheet.contains("<t>{{spl</t>"));
        assert!(sheet.contains("<t>it}}</t>"));
        assert!(!sheet.contains("never"));
    }

    #[test]
    fn test_formula_values_double_quotes() {
        let archive = render(
            &["Owner: {{owner}}"],
            r#"<c r="A1"><f>"{{project_name}} - "&amp;B5</f><v>x</v></c>"#,
            json!({ "project_name": r#"The "North" Bridge"#, "owner": r#"Sam "S""# }),
        );

        let sheet = archive.get_string("xl/worksheets/sheet1.xml").unwrap().unwrap();
        assert!(sheet.contains(r#"<f>"The ""North"" Bridge - "&amp;B5</f>"#));

        let shared = archive.get_string("xl/sharedStrings.xml").unwrap().unwrap();
        assert!(shared.contains(r#"Owner: Sam "S""#));
    }

    #[test]
    fn test_changed_formula_drops_cached_value() {
        let archive = render(
            &[],
            r#"<c r="C1"><f>B1*{{rate}}</f><v>10</v></c><c r="C2"><f>SUM(A1:A2)</f><v>7</v></c>"#,
            json!({ "rate": 0.5 }),
        );

        let sheet = archive.get_string("xl/worksheets/sheet1.xml").unwrap().unwrap();
        assert!(sheet.contains(r#"<c r="C1"><f>B1*0.5</f></c>"#));
        assert!(sheet.contains("<v>7</v>"));

        let workbook = archive.get_string("xl/workbook.xml").unwrap().unwrap();
        assert!(workbook.contains(r#"fullCalcOnLoad="1""#));
    }

    #[test]
    fn test_workbook_untouched_without_formula_changes() {
        let archive = render(&["{{a}}"], r#"<c r="A1" t="s"><v>0</v></c>"#, json!({ "a": "x" }));
        let workbook = archive.get_string("xl/workbook.xml").unwrap().unwrap();
        assert!(!workbook.contains("fullCalcOnLoad"));
    }

    #[test]
    fn test_force_recalculation_variants() {
        assert_eq!(
            force_recalculation(r#"<workbook><sheets/><calcPr calcId="191029"/></workbook>"#),
            r#"<workbook><sheets/><calcPr fullCalcOnLoad="1" calcId="191029"/></workbook>"#
        );
        assert_eq!(
            force_recalculation("<workbook><sheets></sheets></workbook>"),
            r#"<workbook><sheets></sheets><calcPr fullCalcOnLoad="1"/></workbook>"#
        );
    }
}
