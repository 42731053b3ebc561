//! Placeholder engine for Word documents.
//!
//! Each XML part is tokenized with `quick-xml` into markup and run text. Tags
//! are found in the run text only, re-assembled when Word split them across
//! runs, paired into sections, given an extent (inline, table row or sibling
//! paragraphs) and compiled into a small node tree which is then rendered
//! against the data scope.
//!
//! Tag syntax with the default delimiters:
//!
//! | Tag | Meaning |
//! |---|---|
//! | `{name}` | value |
//! | `{#name}` … `{/name}` | section, repeated per array element |
//! | `{^name}` … `{/name}` | inverted section |
//! | `{.}` | the current scope value |

use std::collections::HashMap;

use lazy_static::lazy_static;
use quick_xml::escape::partial_escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::Value;

use super::archive::{serialize, OfficeArchive};
use super::image::MediaWriter;
use super::resolver::{ResolvedValue, Resolver};
use super::scope::Scope;
use super::{RenderedDocument, Result, TemplateError};

const MAIN_PART: &str = "word/document.xml";
const LINE_BREAK: &str = r#"</w:t><w:br/><w:t xml:space="preserve">"#;

lazy_static! {
    static ref RENDERED_PART: Regex =
        Regex::new(r"^word/(document|header\d*|footer\d*|footnotes|endnotes)\.xml$").unwrap();
}

/// Opening and closing tag characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub open: char,
    pub close: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: '{',
            close: '}',
        }
    }
}

#[derive(Debug, Default)]
pub struct PlaceholderEngine {
    delimiters: Delimiters,
}

impl PlaceholderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiters(delimiters: Delimiters) -> Self {
        Self { delimiters }
    }

    /// Render a `.docx` template against `data`.
    ///
    /// The template bytes are only read; the result is a new archive.
    pub fn render(
        &self,
        template: &[u8],
        data: &Value,
        resolver: &dyn Resolver,
    ) -> Result<RenderedDocument> {
        let mut archive = OfficeArchive::from_bytes(template)?;
        if !archive.contains(MAIN_PART) {
            return Err(TemplateError::MissingPart(MAIN_PART.to_string()));
        }

        let parts: Vec<String> = archive
            .names()
            .filter(|name| RENDERED_PART.is_match(name))
            .map(str::to_string)
            .collect();

        let scope = Scope::new(data);
        let mut media = MediaWriter::new(&archive);

        for part in &parts {
            let Some(xml) = archive.get_string(part)? else {
                continue;
            };
            let nodes = self.compile(part, &xml)?;

            let mut out = String::with_capacity(xml.len());
            let mut renderer = PartRenderer {
                part,
                resolver,
                media: &mut media,
            };
            renderer.render(&nodes, &scope, &mut out);
            archive.set_string(part.clone(), out);
        }

        log::debug!("Rendered {} document parts", parts.len());

        media.apply(&mut archive)?;
        Ok(RenderedDocument {
            bytes: archive.to_bytes()?,
            extension: "docx",
        })
    }

    fn compile(&self, part: &str, xml: &str) -> Result<Vec<Node>> {
        let tokens = Tokens::parse(part, xml)?;
        let pieces = split_tags(part, &tokens, self.delimiters)?;
        let lexed = Lexed::new(&tokens, pieces);
        let sections = pair_sections(part, &tokens, &lexed)?;
        check_nesting(part, &sections)?;

        let mut excluded = vec![false; lexed.items.len()];
        for section in &sections {
            for &item in &section.excluded {
                excluded[item] = true;
            }
        }

        let mut builder = TreeBuilder {
            items: &lexed.items,
            sections: &sections,
            excluded: &excluded,
            next: 0,
        };
        Ok(builder.build(0, lexed.items.len()))
    }
}

// ---------------------------------------------------------------------------
// Tokenizing
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Token {
    Open { name: String, xml: String },
    Close(String),
    Markup(String),
    /// Unescaped text of a `<w:t>` element.
    Content(String),
}

struct Tokens {
    tokens: Vec<Token>,
    /// Innermost enclosing `Open` token for every token.
    parent: Vec<Option<usize>>,
    close_of: HashMap<usize, usize>,
}

impl Tokens {
    fn parse(part: &str, xml: &str) -> Result<Self> {
        let mut reader = Reader::from_reader(xml.as_bytes());
        reader.config_mut().trim_text(false);

        let mut tokens = Vec::new();
        let mut parent = Vec::new();
        let mut close_of = HashMap::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut in_text = false;
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| TemplateError::xml(part, e))?;

            let token = match event {
                Event::Eof => break,
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    let mut start = start.into_owned();
                    if name == "w:t" {
                        in_text = true;
                        let has_space = start
                            .try_get_attribute("xml:space")
                            .map_err(|e| TemplateError::xml(part, e))?
                            .is_some();
                        if !has_space {
                            start.push_attribute(("xml:space", "preserve"));
                        }
                    }
                    let xml = serialize(part, Event::Start(start))?;

                    let idx = tokens.len();
                    tokens.push(Token::Open { name, xml });
                    parent.push(stack.last().copied());
                    stack.push(idx);
                    buf.clear();
                    continue;
                }
                Event::End(end) => {
                    if end.name().as_ref() == b"w:t" {
                        in_text = false;
                    }
                    let idx = tokens.len();
                    let open = stack
                        .pop()
                        .ok_or_else(|| TemplateError::xml(part, "unbalanced end tag"))?;
                    close_of.insert(open, idx);
                    parent.push(parent[open]);
                    tokens.push(Token::Close(serialize(part, Event::End(end))?));
                    buf.clear();
                    continue;
                }
                Event::Text(text) if in_text => {
                    let content = text.unescape().map_err(|e| TemplateError::xml(part, e))?;
                    Token::Content(content.into_owned())
                }
                other => Token::Markup(serialize(part, other)?),
            };

            parent.push(stack.last().copied());
            tokens.push(token);
            buf.clear();
        }

        Ok(Self {
            tokens,
            parent,
            close_of,
        })
    }

    /// Nearest enclosing element named `name`.
    fn enclosing(&self, idx: usize, name: &str) -> Option<usize> {
        let mut current = self.parent[idx];
        while let Some(p) = current {
            if matches!(&self.tokens[p], Token::Open { name: n, .. } if n == name) {
                return Some(p);
            }
            current = self.parent[p];
        }
        None
    }

    fn paragraph(&self, idx: usize) -> Option<usize> {
        self.enclosing(idx, "w:p")
    }
}

// ---------------------------------------------------------------------------
// Lexing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tag {
    Value(String),
    Open { name: String, inverted: bool },
    Close(String),
}

#[derive(Debug)]
enum Piece {
    Literal(String),
    Tag(Tag),
}

fn parse_tag(part: &str, body: &str) -> Result<Tag> {
    let body = body.trim();
    let (kind, name) = match body.chars().next() {
        Some(c @ ('#' | '^' | '/')) => (Some(c), body[1..].trim()),
        _ => (None, body),
    };

    if name.is_empty() {
        return Err(TemplateError::structure(part, format!("empty tag `{body}`")));
    }

    let name = name.to_string();
    Ok(match kind {
        Some('#') => Tag::Open {
            name,
            inverted: false,
        },
        Some('^') => Tag::Open {
            name,
            inverted: true,
        },
        Some(_) => Tag::Close(name),
        None => Tag::Value(name),
    })
}

/// Split run text into literals and tags. A tag split across runs is moved
/// whole into the run where it starts.
fn split_tags(part: &str, tokens: &Tokens, delimiters: Delimiters) -> Result<Vec<Vec<Piece>>> {
    let mut pieces: Vec<Vec<Piece>> = tokens.tokens.iter().map(|_| Vec::new()).collect();
    // (token holding the opening delimiter, tag text so far)
    let mut pending: Option<(usize, String)> = None;

    for (idx, token) in tokens.tokens.iter().enumerate() {
        let Token::Content(text) = token else {
            continue;
        };

        if let Some((start, body)) = &pending {
            if tokens.paragraph(*start) != tokens.paragraph(idx) {
                return Err(TemplateError::structure(
                    part,
                    format!("unclosed tag `{}{}`", delimiters.open, body),
                ));
            }
        }

        let mut literal = String::new();
        for ch in text.chars() {
            match pending.as_mut() {
                Some((start, body)) => {
                    if ch == delimiters.open {
                        return Err(TemplateError::structure(
                            part,
                            format!("nested `{}` inside tag `{}`", ch, body),
                        ));
                    } else if ch == delimiters.close {
                        let tag = parse_tag(part, body)?;
                        pieces[*start].push(Piece::Tag(tag));
                        pending = None;
                    } else {
                        body.push(ch);
                    }
                }
                None => {
                    if ch == delimiters.open {
                        if !literal.is_empty() {
                            pieces[idx].push(Piece::Literal(std::mem::take(&mut literal)));
                        }
                        pending = Some((idx, String::new()));
                    } else if ch == delimiters.close {
                        return Err(TemplateError::structure(
                            part,
                            format!("`{ch}` without a matching `{}`", delimiters.open),
                        ));
                    } else {
                        literal.push(ch);
                    }
                }
            }
        }
        if !literal.is_empty() {
            pieces[idx].push(Piece::Literal(literal));
        }
    }

    if let Some((_, body)) = pending {
        return Err(TemplateError::structure(
            part,
            format!("unclosed tag `{}{}`", delimiters.open, body),
        ));
    }

    Ok(pieces)
}

#[derive(Debug)]
enum Item {
    /// Serialized markup.
    Raw(String),
    /// Unescaped literal run text.
    Text(String),
    Tag(Tag),
}

struct TagRef {
    item: usize,
    token: usize,
}

/// The part flattened into items, with tags in place.
struct Lexed {
    items: Vec<Item>,
    /// First item of every token.
    item_of: Vec<usize>,
    tags: Vec<TagRef>,
    pieces: Vec<Vec<Piece>>,
}

impl Lexed {
    fn new(tokens: &Tokens, pieces: Vec<Vec<Piece>>) -> Self {
        let mut items = Vec::new();
        let mut item_of = Vec::with_capacity(tokens.tokens.len());
        let mut tags = Vec::new();

        for (idx, token) in tokens.tokens.iter().enumerate() {
            item_of.push(items.len());
            match token {
                Token::Open { xml, .. } | Token::Close(xml) | Token::Markup(xml) => {
                    items.push(Item::Raw(xml.clone()));
                }
                Token::Content(_) => {
                    for piece in &pieces[idx] {
                        match piece {
                            Piece::Literal(text) => items.push(Item::Text(text.clone())),
                            Piece::Tag(tag) => {
                                tags.push(TagRef {
                                    item: items.len(),
                                    token: idx,
                                });
                                items.push(Item::Tag(tag.clone()));
                            }
                        }
                    }
                }
            }
        }

        Self {
            items,
            item_of,
            tags,
            pieces,
        }
    }

    fn tag(&self, tag: &TagRef) -> &Tag {
        match &self.items[tag.item] {
            Item::Tag(t) => t,
            _ => unreachable!("tag reference points at a non-tag item"),
        }
    }

    /// A paragraph whose only non-blank content is a single tag.
    fn holds_only_tag(&self, tokens: &Tokens, paragraph: usize) -> bool {
        let end = tokens.close_of[&paragraph];
        let mut tags_seen = 0;

        for idx in paragraph..end {
            if !matches!(tokens.tokens[idx], Token::Content(_)) {
                continue;
            }
            for piece in &self.pieces[idx] {
                match piece {
                    Piece::Literal(text) if text.trim().is_empty() => {}
                    Piece::Literal(_) => return false,
                    Piece::Tag(_) => tags_seen += 1,
                }
            }
        }

        tags_seen == 1
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Section {
    name: String,
    inverted: bool,
    open_item: usize,
    close_item: usize,
    /// Inclusive item range replaced by the rendered section.
    lo: usize,
    hi: usize,
    excluded: Vec<usize>,
}

fn pair_sections(part: &str, tokens: &Tokens, lexed: &Lexed) -> Result<Vec<Section>> {
    let mut open: Vec<&TagRef> = Vec::new();
    let mut sections = Vec::new();

    for tag_ref in &lexed.tags {
        match lexed.tag(tag_ref) {
            Tag::Value(_) => {}
            Tag::Open { .. } => open.push(tag_ref),
            Tag::Close(name) => {
                let start = open.pop().ok_or_else(|| {
                    TemplateError::structure(part, format!("`/{name}` closes a section that was never opened"))
                })?;
                let Tag::Open {
                    name: open_name,
                    inverted,
                } = lexed.tag(start)
                else {
                    unreachable!("only open tags are stacked");
                };
                if open_name != name {
                    return Err(TemplateError::structure(
                        part,
                        format!("section `{open_name}` is closed by `/{name}`"),
                    ));
                }
                sections.push(extent(part, tokens, lexed, name, *inverted, start, tag_ref)?);
            }
        }
    }

    if let Some(unclosed) = open.pop() {
        if let Tag::Open { name, .. } = lexed.tag(unclosed) {
            return Err(TemplateError::structure(
                part,
                format!("section `{name}` is never closed"),
            ));
        }
    }

    sections.sort_by(|a, b| {
        a.lo.cmp(&b.lo)
            .then(b.hi.cmp(&a.hi))
            .then(a.open_item.cmp(&b.open_item))
    });
    Ok(sections)
}

fn extent(
    part: &str,
    tokens: &Tokens,
    lexed: &Lexed,
    name: &str,
    inverted: bool,
    open: &TagRef,
    close: &TagRef,
) -> Result<Section> {
    let outside = || TemplateError::structure(part, format!("section `{name}` is outside a paragraph"));
    let pa = tokens.paragraph(open.token).ok_or_else(outside)?;
    let pb = tokens.paragraph(close.token).ok_or_else(outside)?;

    let mut section = Section {
        name: name.to_string(),
        inverted,
        open_item: open.item,
        close_item: close.item,
        lo: open.item,
        hi: close.item,
        excluded: vec![open.item, close.item],
    };

    if pa == pb {
        return Ok(section);
    }

    let same_cell = tokens.enclosing(open.token, "w:tc") == tokens.enclosing(close.token, "w:tc");
    if let Some(row) = tokens.enclosing(open.token, "w:tr").filter(|_| !same_cell) {
        if tokens.enclosing(close.token, "w:tr") == Some(row) {
            section.lo = lexed.item_of[row];
            section.hi = lexed.item_of[tokens.close_of[&row]];
            return Ok(section);
        }
    }

    if pa < pb && tokens.parent[pa] == tokens.parent[pb] {
        section.lo = lexed.item_of[pa];
        section.hi = lexed.item_of[tokens.close_of[&pb]];

        for paragraph in [pa, pb] {
            if lexed.holds_only_tag(tokens, paragraph) {
                let first = lexed.item_of[paragraph];
                let last = lexed.item_of[tokens.close_of[&paragraph]];
                section.excluded.extend(first..=last);
            }
        }
        return Ok(section);
    }

    Err(TemplateError::structure(
        part,
        format!("section `{name}` spans elements that are not siblings"),
    ))
}

/// Sections must be disjoint or nested, and a section containing another
/// must also enclose its tags.
fn check_nesting(part: &str, sections: &[Section]) -> Result<()> {
    for (i, outer) in sections.iter().enumerate() {
        for inner in &sections[i + 1..] {
            if inner.lo > outer.hi {
                continue;
            }
            let contained = inner.hi <= outer.hi;
            let tags_nest =
                outer.open_item < inner.open_item && inner.close_item < outer.close_item;
            if !contained || !tags_nest {
                return Err(TemplateError::structure(
                    part,
                    format!(
                        "sections `{}` and `{}` cross each other",
                        outer.name, inner.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Node tree
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Node {
    Raw(String),
    Value(String),
    Section {
        name: String,
        inverted: bool,
        body: Vec<Node>,
    },
}

struct TreeBuilder<'a> {
    items: &'a [Item],
    sections: &'a [Section],
    excluded: &'a [bool],
    next: usize,
}

impl TreeBuilder<'_> {
    fn build(&mut self, mut pos: usize, end: usize) -> Vec<Node> {
        let mut nodes = Vec::new();

        let sections = self.sections;
        while pos < end {
            if let Some(section) = sections.get(self.next).filter(|s| s.lo == pos) {
                self.next += 1;
                let body = self.build(pos, section.hi + 1);
                nodes.push(Node::Section {
                    name: section.name.clone(),
                    inverted: section.inverted,
                    body,
                });
                pos = section.hi + 1;
                continue;
            }

            if !self.excluded[pos] {
                match &self.items[pos] {
                    Item::Raw(xml) => push_raw(&mut nodes, xml),
                    Item::Text(text) => push_raw(&mut nodes, &escape_text(text)),
                    Item::Tag(Tag::Value(name)) => nodes.push(Node::Value(name.clone())),
                    // Section tags are always excluded.
                    Item::Tag(_) => {}
                }
            }
            pos += 1;
        }

        nodes
    }
}

fn push_raw(nodes: &mut Vec<Node>, xml: &str) {
    if let Some(Node::Raw(last)) = nodes.last_mut() {
        last.push_str(xml);
    } else {
        nodes.push(Node::Raw(xml.to_string()));
    }
}

/// Escape text for a `<w:t>` body, dropping characters XML 1.0 forbids.
fn escape_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .filter(|&c| !matches!(c, '\u{FFFE}' | '\u{FFFF}'))
        .collect();
    partial_escape(&cleaned).into_owned()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

struct PartRenderer<'r> {
    part: &'r str,
    resolver: &'r dyn Resolver,
    media: &'r mut MediaWriter,
}

impl PartRenderer<'_> {
    fn render(&mut self, nodes: &[Node], scope: &Scope<'_>, out: &mut String) {
        for node in nodes {
            match node {
                Node::Raw(xml) => out.push_str(xml),
                Node::Value(name) => self.render_value(name, scope, out),
                Node::Section {
                    name,
                    inverted,
                    body,
                } => {
                    let value = self.resolver.resolve(name, scope);
                    if *inverted {
                        if !value.is_truthy() {
                            self.render(body, scope, out);
                        }
                        continue;
                    }

                    match &value {
                        ResolvedValue::SubScopes(items) => {
                            for item in items {
                                let child = scope.push(item);
                                self.render(body, &child, out);
                            }
                        }
                        _ if value.is_truthy() => self.render(body, scope, out),
                        _ => {}
                    }
                }
            }
        }
    }

    fn render_value(&mut self, name: &str, scope: &Scope<'_>, out: &mut String) {
        match self.resolver.resolve(name, scope) {
            ResolvedValue::Text { value, multiline } => {
                let escaped = escape_text(&value);
                if multiline {
                    out.push_str(&escaped.replace('\n', LINE_BREAK));
                } else {
                    out.push_str(&escaped);
                }
            }
            ResolvedValue::Image(asset) => {
                let drawing = self.media.embed(self.part, &asset);
                out.push_str("</w:t>");
                out.push_str(&drawing);
                out.push_str(r#"<w:t xml:space="preserve">"#);
            }
            ResolvedValue::SubScopes(_) | ResolvedValue::Empty => {}
        }
    }
}
