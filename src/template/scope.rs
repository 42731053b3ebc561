//! Render scopes.
//!
//! A render starts with the caller's JSON object as the only frame. Every
//! repeating section pushes the current element as a new innermost frame, and
//! lookups walk from the innermost frame outwards so row templates can still
//! reach document-level values.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Scope<'a> {
    frames: Vec<&'a Value>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { frames: vec![root] }
    }

    /// A child scope with `value` as the innermost frame.
    pub fn push<'b>(&self, value: &'b Value) -> Scope<'b>
    where
        'a: 'b,
    {
        let mut frames: Vec<&'b Value> = self.frames.iter().copied().collect();
        frames.push(value);
        Scope { frames }
    }

    /// The innermost frame.
    pub fn current(&self) -> &'a Value {
        self.frames[self.frames.len() - 1]
    }

    /// Look a key up, innermost frame first. Dotted keys (`contractor.name`)
    /// descend into nested objects.
    pub fn lookup(&self, key: &str) -> Option<&'a Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| lookup_path(frame, key))
    }
}

fn lookup_path<'v>(frame: &'v Value, key: &str) -> Option<&'v Value> {
    if let Some(found) = frame.as_object().and_then(|map| map.get(key)) {
        return Some(found);
    }

    if !key.contains('.') {
        return None;
    }

    key.split('.')
        .try_fold(frame, |value, segment| value.as_object()?.get(segment))
}
