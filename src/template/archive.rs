//! Archive handling for DOCX/XLSX packages.
//!
//! Office documents are ZIP archives of XML parts and media. A render unpacks
//! a private copy, rewrites the parts it needs and packs a new archive; the
//! source bytes are never touched.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use quick_xml::events::Event;
use quick_xml::Writer;
use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

use super::{Result, TemplateError};

/// An unpacked OOXML package.
#[derive(Debug, Default)]
pub struct OfficeArchive {
    files: HashMap<String, Vec<u8>>,
    /// Entry order of the source archive; new entries are appended.
    order: Vec<String>,
}

impl OfficeArchive {
    /// Unpack an archive held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut unpacked = Self::default();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();

            if name.ends_with('/') {
                continue;
            }

            let mut contents = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut contents)
                .map_err(|e| TemplateError::Archive(e.into()))?;
            unpacked.set(name, contents);
        }

        Ok(unpacked)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|v| v.as_slice())
    }

    /// Get a part as UTF-8 text. XML parts that are not UTF-8 are rejected.
    pub fn get_string(&self, path: &str) -> Result<Option<String>> {
        match self.files.get(path) {
            Some(bytes) => String::from_utf8(bytes.clone())
                .map(Some)
                .map_err(|e| TemplateError::xml(path, e)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Part names in archive order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn set(&mut self, path: impl Into<String>, contents: Vec<u8>) {
        let path = path.into();
        if !self.files.contains_key(&path) {
            self.order.push(path.clone());
        }
        self.files.insert(path, contents);
    }

    pub fn set_string(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.set(path, contents.into().into_bytes());
    }

    /// Pack the archive into a new buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for path in &self.order {
            let contents = &self.files[path];
            zip.start_file(path.as_str(), options)?;
            zip.write_all(contents).map_err(TemplateError::Write)?;
        }

        zip.finish()?;
        Ok(buffer.into_inner())
    }
}

/// Write a single XML event back out as text.
pub(crate) fn serialize(part: &str, event: Event<'_>) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(event)
        .map_err(|e| TemplateError::xml(part, e))?;
    String::from_utf8(writer.into_inner()).map_err(|e| TemplateError::xml(part, e))
}
