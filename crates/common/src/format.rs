//! Small template language for bar and notification text.
//!
//! `{name}` is replaced by the placeholder value, `[ ... ]` is kept only when
//! at least one placeholder inside it is non-empty, and `\` escapes the next
//! character.

use std::collections::BTreeSet;

use crate::error::FormatError;
use crate::types::DeviceId;

/// Click routing tag carried by a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentTag {
    Device(DeviceId),
    Separator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub full_text: String,
    pub index: Option<SegmentTag>,
}

/// Ordered text segments, each optionally tagged for click routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composite {
    segments: Vec<Segment>,
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        let mut composite = Self::new();
        composite.push_text(text);
        composite
    }

    pub fn tagged(text: impl Into<String>, tag: SegmentTag) -> Self {
        Self {
            segments: vec![Segment {
                full_text: text.into(),
                index: Some(tag),
            }],
        }
    }

    /// Appends untagged text, merging it into a trailing untagged segment.
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(last) if last.index.is_none() => last.full_text.push_str(&text),
            _ => self.segments.push(Segment {
                full_text: text,
                index: None,
            }),
        }
    }

    pub fn append(&mut self, other: Composite) {
        for segment in other.segments {
            match segment.index {
                None => self.push_text(segment.full_text),
                Some(_) => self.segments.push(segment),
            }
        }
    }

    /// Joins the non-empty `parts` with a copy of `separator` between each
    /// pair.
    pub fn join(separator: &Composite, parts: Vec<Composite>) -> Self {
        let mut joined = Self::new();
        for part in parts.into_iter().filter(|p| !p.is_empty()) {
            if !joined.is_empty() {
                joined.append(separator.clone());
            }
            joined.append(part);
        }
        joined
    }

    /// Tags every segment with `tag`.
    pub fn with_tag(mut self, tag: SegmentTag) -> Self {
        for segment in &mut self.segments {
            segment.index = Some(tag);
        }
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.full_text.is_empty())
    }

    /// Plain text with tags dropped.
    pub fn to_text(&self) -> String {
        self.segments.iter().map(|s| s.full_text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Placeholder(String),
    Optional(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, FormatError> {
        let mut chars = source.char_indices().peekable();
        let mut stack: Vec<(usize, Vec<Node>)> = Vec::new();
        let mut current: Vec<Node> = Vec::new();
        let mut text = String::new();

        fn flush(text: &mut String, nodes: &mut Vec<Node>) {
            if !text.is_empty() {
                nodes.push(Node::Text(std::mem::take(text)));
            }
        }

        while let Some((pos, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        text.push(escaped);
                    }
                }
                '{' => {
                    flush(&mut text, &mut current);
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((at, '{')) => return Err(FormatError::Unexpected('{', at)),
                            Some((_, c)) => name.push(c),
                            None => return Err(FormatError::Unclosed('{', pos)),
                        }
                    }
                    current.push(Node::Placeholder(name.trim().to_string()));
                }
                '}' => return Err(FormatError::Unexpected('}', pos)),
                '[' => {
                    flush(&mut text, &mut current);
                    stack.push((pos, std::mem::take(&mut current)));
                }
                ']' => {
                    flush(&mut text, &mut current);
                    let Some((_, parent)) = stack.pop() else {
                        return Err(FormatError::Unexpected(']', pos));
                    };
                    let inner = std::mem::replace(&mut current, parent);
                    current.push(Node::Optional(inner));
                }
                c => text.push(c),
            }
        }
        if let Some((pos, _)) = stack.pop() {
            return Err(FormatError::Unclosed('[', pos));
        }
        flush(&mut text, &mut current);

        Ok(Self { nodes: current })
    }

    pub fn placeholders(&self) -> BTreeSet<String> {
        fn walk(nodes: &[Node], out: &mut BTreeSet<String>) {
            for node in nodes {
                match node {
                    Node::Text(_) => {}
                    Node::Placeholder(name) => {
                        out.insert(name.clone());
                    }
                    Node::Optional(inner) => walk(inner, out),
                }
            }
        }
        let mut out = BTreeSet::new();
        walk(&self.nodes, &mut out);
        out
    }

    /// Renders with placeholders that may expand to tagged composites.
    /// Unresolved placeholders render empty.
    pub fn render<F>(&self, lookup: F) -> Composite
    where
        F: Fn(&str) -> Option<Composite>,
    {
        render_nodes(&self.nodes, &lookup).0
    }

    pub fn render_text<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        self.render(|name| lookup(name).map(Composite::text))
            .to_text()
    }
}

/// Returns the rendered nodes and whether any placeholder was non-empty.
fn render_nodes<F>(nodes: &[Node], lookup: &F) -> (Composite, bool)
where
    F: Fn(&str) -> Option<Composite>,
{
    let mut out = Composite::new();
    let mut filled = false;
    for node in nodes {
        match node {
            Node::Text(text) => out.push_text(text.clone()),
            Node::Placeholder(name) => {
                if let Some(value) = lookup(name) {
                    if !value.is_empty() {
                        filled = true;
                    }
                    out.append(value);
                }
            }
            Node::Optional(inner) => {
                let (rendered, inner_filled) = render_nodes(inner, lookup);
                if inner_filled {
                    filled = true;
                    out.append(rendered);
                }
            }
        }
    }
    (out, filled)
}
