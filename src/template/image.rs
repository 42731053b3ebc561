//! Raster image embedding for Word documents.
//!
//! [`ImageEmbedModule`] binds placeholder tags to an [`ImageSource`]; the
//! resolver asks it for bytes and, when it gets some, hands the engine an
//! [`ImageAsset`] instead of text. [`MediaWriter`] then does the package
//! bookkeeping: the media part, a relationship in the owning part's `.rels`
//! and a content-type default for the image extension.
//!
//! OOXML measures drawings in EMUs: 914400 per inch, 9525 per pixel at 96 DPI.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::archive::OfficeArchive;
use super::{Result, TemplateError};

/// EMUs per pixel at 96 DPI.
pub const EMU_PER_PIXEL: i64 = 9525;

const CONTENT_TYPES: &str = "[Content_Types].xml";
const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
/// Keeps generated `wp:docPr` ids clear of the ones Word assigns.
const DOC_PR_ID_BASE: u32 = 4000;

lazy_static! {
    static ref REL_ID: Regex = Regex::new(r#"Id="([^"]+)""#).unwrap();
}

/// Raster formats accepted for embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// Detect the format from magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }
}

/// An image ready to be placed in a document.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub bytes: Arc<[u8]>,
    pub format: ImageFormat,
    pub width_px: u32,
    pub height_px: u32,
}

impl ImageAsset {
    pub fn width_emu(&self) -> i64 {
        self.width_px as i64 * EMU_PER_PIXEL
    }

    pub fn height_emu(&self) -> i64 {
        self.height_px as i64 * EMU_PER_PIXEL
    }
}

/// Supplies raw image bytes for a tag, or `None` when there is no image.
pub trait ImageSource: Send + Sync {
    fn image_for(&self, tag: &str) -> Option<Arc<[u8]>>;
}

impl ImageSource for HashMap<String, Arc<[u8]>> {
    fn image_for(&self, tag: &str) -> Option<Arc<[u8]>> {
        self.get(tag).cloned()
    }
}

/// Binds tags to an image source and a fixed bounding box.
pub struct ImageEmbedModule {
    tags: HashSet<String>,
    source: Box<dyn ImageSource>,
    width_px: u32,
    height_px: u32,
}

impl ImageEmbedModule {
    pub fn new(source: impl ImageSource + 'static, width_px: u32, height_px: u32) -> Self {
        Self {
            tags: HashSet::new(),
            source: Box::new(source),
            width_px,
            height_px,
        }
    }

    /// Register a tag this module answers for.
    pub fn bind(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn handles(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// The image for `tag`, if the tag is bound and the source has a
    /// recognisable raster for it.
    pub fn image_for(&self, tag: &str) -> Option<ImageAsset> {
        if !self.handles(tag) {
            return None;
        }

        let bytes = self.source.image_for(tag)?;
        let Some(format) = ImageFormat::detect(&bytes) else {
            log::warn!("Image for tag `{}` has an unknown format, using text fallback", tag);
            return None;
        };

        Some(ImageAsset {
            bytes,
            format,
            width_px: self.width_px,
            height_px: self.height_px,
        })
    }
}

impl std::fmt::Debug for ImageEmbedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEmbedModule")
            .field("tags", &self.tags)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .finish()
    }
}

struct PendingMedia {
    rels_path: String,
    media_path: String,
    target: String,
    rel_id: String,
    asset: ImageAsset,
}

/// Collects images placed during a render and writes them into the package.
pub struct MediaWriter {
    taken_ids: HashSet<String>,
    taken_paths: HashSet<String>,
    pending: Vec<PendingMedia>,
    counter: u32,
}

impl MediaWriter {
    pub fn new(archive: &OfficeArchive) -> Self {
        let mut taken_ids = HashSet::new();
        let taken_paths: HashSet<String> = archive.names().map(str::to_string).collect();

        for name in archive.names().filter(|n| n.ends_with(".rels")) {
            if let Some(bytes) = archive.get(name) {
                let text = String::from_utf8_lossy(bytes);
                taken_ids.extend(REL_ID.captures_iter(&text).map(|c| c[1].to_string()));
            }
        }

        Self {
            taken_ids,
            taken_paths,
            pending: Vec::new(),
            counter: 0,
        }
    }

    /// Register `asset` for `part` and return the `<w:drawing>` markup that
    /// references it.
    pub fn embed(&mut self, part: &str, asset: &ImageAsset) -> String {
        let (dir, file) = match part.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (String::new(), part.to_string()),
        };
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };

        let (rel_id, target, media_path) = loop {
            self.counter += 1;
            let rel_id = format!("rIdImg{}", self.counter);
            let target = format!("media/embedded{}.{}", self.counter, asset.format.extension());
            let media_path = format!("{prefix}{target}");
            if !self.taken_ids.contains(&rel_id) && !self.taken_paths.contains(&media_path) {
                break (rel_id, target, media_path);
            }
        };
        self.taken_ids.insert(rel_id.clone());
        self.taken_paths.insert(media_path.clone());

        let doc_pr_id = DOC_PR_ID_BASE + self.counter;
        let drawing = drawing_xml(&rel_id, doc_pr_id, asset);

        self.pending.push(PendingMedia {
            rels_path: format!("{prefix}_rels/{file}.rels"),
            media_path,
            target,
            rel_id,
            asset: asset.clone(),
        });

        drawing
    }

    /// Write media parts, relationships and content types into `archive`.
    pub fn apply(self, archive: &mut OfficeArchive) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut extensions: Vec<ImageFormat> = Vec::new();

        for media in &self.pending {
            archive.set(media.media_path.clone(), media.asset.bytes.to_vec());

            let relationship = format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
                media.rel_id, IMAGE_REL_TYPE, media.target
            );
            let rels = match archive.get_string(&media.rels_path)? {
                Some(existing) => insert_before_root_end(
                    &media.rels_path,
                    &existing,
                    "Relationships",
                    &relationship,
                )?,
                None => format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}">{}</Relationships>"#,
                    RELS_NS, relationship
                ),
            };
            archive.set_string(media.rels_path.clone(), rels);

            if !extensions.contains(&media.asset.format) {
                extensions.push(media.asset.format);
            }
        }

        let mut content_types = archive
            .get_string(CONTENT_TYPES)?
            .ok_or_else(|| TemplateError::MissingPart(CONTENT_TYPES.to_string()))?;

        for format in extensions {
            let marker = format!(r#"extension="{}""#, format.extension());
            if content_types.to_ascii_lowercase().contains(&marker) {
                continue;
            }
            let default = format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                format.extension(),
                format.mime_type()
            );
            content_types = insert_before_root_end(CONTENT_TYPES, &content_types, "Types", &default)?;
        }
        archive.set_string(CONTENT_TYPES, content_types);

        Ok(())
    }
}

/// Insert `fragment` as the last child of the root element `root`.
fn insert_before_root_end(part: &str, xml: &str, root: &str, fragment: &str) -> Result<String> {
    let closing = format!("</{root}>");
    if let Some(pos) = xml.rfind(&closing) {
        let mut out = String::with_capacity(xml.len() + fragment.len());
        out.push_str(&xml[..pos]);
        out.push_str(fragment);
        out.push_str(&xml[pos..]);
        return Ok(out);
    }

    // Self-closing root such as `<Relationships xmlns="..."/>`.
    let open = format!("<{root}");
    let start = xml
        .find(&open)
        .ok_or_else(|| TemplateError::xml(part, format!("missing <{root}> root element")))?;
    let end = xml[start..]
        .find("/>")
        .map(|offset| start + offset)
        .ok_or_else(|| TemplateError::xml(part, format!("unterminated <{root}> element")))?;

    Ok(format!(
        "{}>{}{}{}",
        &xml[..end],
        fragment,
        closing,
        &xml[end + 2..]
    ))
}

fn drawing_xml(rel_id: &str, doc_pr_id: u32, asset: &ImageAsset) -> String {
    let cx = asset.width_emu();
    let cy = asset.height_emu();
    let name = format!("Picture {doc_pr_id}");

    format!(
        concat!(
            r#"<w:drawing>"#,
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="{name}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"#
        ),
        cx = cx,
        cy = cy,
        id = doc_pr_id,
        name = name,
        rel = rel_id,
    )
}
