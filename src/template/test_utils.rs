//! Fixture builders for template tests.
//!
//! Public so the integration tests under `tests/` can build templates in
//! memory instead of shipping binary fixtures.

use lazy_static::lazy_static;
use regex::Regex;

use super::archive::OfficeArchive;
use super::{Result, TemplateError};

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const SHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

lazy_static! {
    static ref RUN_TEXT: Regex = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap();
}

/// A `.docx` whose body is `body_xml`.
pub fn minimal_docx(body_xml: &str) -> Result<Vec<u8>> {
    docx_with_parts(body_xml, &[])
}

/// A `.docx` with extra parts such as `("word/header1.xml", "...")`.
pub fn docx_with_parts(body_xml: &str, extra: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut archive = OfficeArchive::default();

    archive.set_string(
        "[Content_Types].xml",
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#,
    );
    archive.set_string(
        "_rels/.rels",
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#,
    );
    archive.set_string(
        "word/_rels/document.xml.rels",
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#,
    );
    archive.set_string(
        "word/document.xml",
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{WORD_NS}"><w:body>{body_xml}</w:body></w:document>"#
        ),
    );

    for (name, xml) in extra {
        archive.set_string(*name, *xml);
    }

    archive.to_bytes()
}

/// A `.xlsx` with the given shared strings and one sheet row of `cells_xml`.
pub fn minimal_xlsx(shared_strings: &[&str], cells_xml: &str) -> Result<Vec<u8>> {
    let mut archive = OfficeArchive::default();

    archive.set_string(
        "[Content_Types].xml",
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#,
    );
    archive.set_string(
        "xl/workbook.xml",
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{SHEET_NS}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets><calcPr calcId="191029"/></workbook>"#
        ),
    );

    let items: String = shared_strings
        .iter()
        .map(|s| format!("<si><t>{}</t></si>", quick_xml::escape::escape(*s)))
        .collect();
    archive.set_string(
        "xl/sharedStrings.xml",
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="{SHEET_NS}" count="{n}" uniqueCount="{n}">{items}</sst>"#,
            n = shared_strings.len()
        ),
    );
    archive.set_string(
        "xl/worksheets/sheet1.xml",
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{SHEET_NS}"><sheetData><row r="1">{cells_xml}</row></sheetData></worksheet>"#
        ),
    );

    archive.to_bytes()
}

/// A paragraph with a single run holding `text`.
pub fn paragraph(text: &str) -> String {
    format!(
        "<w:p><w:r><w:t>{}</w:t></w:r></w:p>",
        quick_xml::escape::partial_escape(text)
    )
}

/// A table row with one single-paragraph cell per entry.
pub fn table_row(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|text| format!("<w:tc>{}</w:tc>", paragraph(text)))
        .collect();
    format!("<w:tr>{cells}</w:tr>")
}

/// The main document part of a rendered `.docx`.
pub fn document_xml(bytes: &[u8]) -> Result<String> {
    OfficeArchive::from_bytes(bytes)?
        .get_string("word/document.xml")?
        .ok_or_else(|| TemplateError::MissingPart("word/document.xml".to_string()))
}

/// Concatenated, unescaped run text of a WordprocessingML fragment.
pub fn plain_text(xml: &str) -> String {
    RUN_TEXT
        .captures_iter(xml)
        .map(|c| {
            quick_xml::escape::unescape(&c[1])
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| c[1].to_string())
        })
        .collect()
}
