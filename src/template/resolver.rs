//! Placeholder resolution.
//!
//! The engine never looks at scope values directly; it asks a [`Resolver`]
//! and acts on the returned [`ResolvedValue`]. [`FieldResolver`] is the
//! policy used by document generation: shaped text, an empty-string null
//! policy with per-tag overrides, free-text line breaks and image tags.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::image::{ImageAsset, ImageEmbedModule};
use super::scope::Scope;
use crate::shaping::shape;

/// Tag that refers to the current scope itself.
pub const SELF_TAG: &str = ".";

/// What a placeholder resolves to.
#[derive(Debug, Clone)]
pub enum ResolvedValue {
    /// Text to insert. `multiline` text has its `\n` rendered as line breaks.
    Text { value: String, multiline: bool },
    /// A raster image to place instead of text.
    Image(ImageAsset),
    /// One sub-scope per repetition of a section.
    SubScopes(Vec<Value>),
    Empty,
}

impl ResolvedValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
            multiline: false,
        }
    }

    /// Whether a section over this value renders at least once.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Text { value, .. } => !value.is_empty(),
            Self::Image(_) => true,
            Self::SubScopes(items) => !items.is_empty(),
            Self::Empty => false,
        }
    }
}

pub trait Resolver: Send + Sync {
    fn resolve(&self, tag: &str, scope: &Scope<'_>) -> ResolvedValue;
}

/// Resolution policy for generated documents.
#[derive(Debug, Default)]
pub struct FieldResolver {
    free_text: HashSet<String>,
    overrides: HashMap<String, String>,
    images: Option<ImageEmbedModule>,
}

impl FieldResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark tags whose line breaks are kept in the document.
    pub fn with_free_text<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.free_text.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Text used when `tag` is absent or empty, instead of `""`.
    pub fn with_override(mut self, tag: impl Into<String>, text: impl Into<String>) -> Self {
        self.overrides.insert(tag.into(), text.into());
        self
    }

    pub fn with_images(mut self, module: ImageEmbedModule) -> Self {
        self.images = Some(module);
        self
    }

    fn null_policy(&self, tag: &str) -> ResolvedValue {
        match self.overrides.get(tag) {
            Some(text) => ResolvedValue::Text {
                value: text.clone(),
                multiline: self.free_text.contains(tag),
            },
            None => ResolvedValue::Empty,
        }
    }

    fn from_value(&self, tag: &str, value: &Value) -> ResolvedValue {
        match value {
            Value::Null => self.null_policy(tag),
            Value::String(s) => {
                let shaped = shape(s);
                if shaped.is_empty() {
                    self.null_policy(tag)
                } else {
                    ResolvedValue::Text {
                        value: shaped,
                        multiline: self.free_text.contains(tag),
                    }
                }
            }
            Value::Number(n) => ResolvedValue::text(n.to_string()),
            Value::Bool(true) => ResolvedValue::text("true"),
            Value::Bool(false) => ResolvedValue::Empty,
            Value::Array(items) => ResolvedValue::SubScopes(items.clone()),
            Value::Object(_) => ResolvedValue::SubScopes(vec![value.clone()]),
        }
    }
}

impl Resolver for FieldResolver {
    fn resolve(&self, tag: &str, scope: &Scope<'_>) -> ResolvedValue {
        if tag == SELF_TAG {
            return self.from_value(tag, scope.current());
        }

        if let Some(asset) = self.images.as_ref().and_then(|m| m.image_for(tag)) {
            return ResolvedValue::Image(asset);
        }

        match scope.lookup(tag) {
            Some(value) => self.from_value(tag, value),
            None => self.null_policy(tag),
        }
    }
}
