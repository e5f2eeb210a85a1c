//! Markup text <-> [`Document`] conversion.
//!
//! The decoder is a small, strict, non-validating XML reader: it checks tag
//! balance, attribute syntax and entity references, and nothing else. Text
//! made only of whitespace is dropped, so indentation never becomes part of
//! the tree. The encoder writes one child per line, indented by a fixed
//! number of spaces per level, except inside elements that carry text, which
//! are written inline so no whitespace is injected into their content.
//!
//! `&` is always written as `&amp;` (and `<`, `>` and `"` as entities where
//! required), so anything the encoder produces decodes back to the same
//! tree.

use super::{Attributes, Document, Element, ElementBody, Node};
use crate::error::DocumentError;
use tracing::{Level, span, trace};

type DecodeResult<T> = Result<T, DocumentError>;

/// Deepest element nesting [`decode`] accepts.
pub const MAX_DEPTH: usize = 512;

/// Parses `text` into a [`Document`].
///
/// # Errors
///
/// Returns [`DocumentError`] if the text is not well-formed: unbalanced or
/// mismatched tags, bad attribute syntax, unknown entities, stray text
/// outside the root, or no root element at all.
pub fn decode(text: &str) -> Result<Document, DocumentError> {
    let span = span!(Level::TRACE, "decode", len = text.len());
    let _guard = span.enter();

    let mut reader = Reader::new(text.strip_prefix('\u{feff}').unwrap_or(text));

    reader.skip_whitespace();
    let declaration = if reader.at_declaration() {
        Some(reader.declaration()?)
    } else {
        None
    };

    let prolog = reader.misc(true)?;
    if reader.is_eof() {
        return Err(reader.error("missing root element"));
    }
    let root = reader.element()?;
    let epilog = reader.misc(false)?;
    if !reader.is_eof() {
        return Err(reader.error("unexpected content after root element"));
    }

    trace!(root = %root.name, "decoded document");
    Ok(Document {
        declaration,
        prolog,
        root,
        epilog,
    })
}

/// Serializes `document`, indenting nested elements by `indent` spaces.
///
/// The output has no trailing newline.
#[must_use]
pub fn encode(document: &Document, indent: usize) -> String {
    let mut writer = Writer {
        out: String::new(),
        indent,
    };

    if let Some(declaration) = &document.declaration {
        writer.out.push_str("<?xml");
        writer.attributes(declaration);
        writer.out.push_str("?>");
    }

    let mut first = document.declaration.is_none();
    for node in &document.prolog {
        writer.separator(&mut first);
        writer.node(node, 0, false);
    }
    writer.separator(&mut first);
    writer.element(&document.root, 0, false);
    for node in &document.epilog {
        writer.out.push('\n');
        writer.node(node, 0, false);
    }

    writer.out
}

struct Writer {
    out: String,
    indent: usize,
}

impl Writer {
    fn separator(&mut self, first: &mut bool) {
        if !*first {
            self.out.push('\n');
        }
        *first = false;
    }

    fn pad(&mut self, depth: usize) {
        self.out.push('\n');
        for _ in 0..depth * self.indent {
            self.out.push(' ');
        }
    }

    fn attributes(&mut self, attributes: &Attributes) {
        for (key, value) in attributes {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            escape_into(&mut self.out, value, true);
            self.out.push('"');
        }
    }

    fn element(&mut self, element: &Element, depth: usize, inline: bool) {
        self.out.push('<');
        self.out.push_str(&element.name);
        self.attributes(&element.attributes);

        let ElementBody::Container(children) = element.body() else {
            self.out.push_str("/>");
            return;
        };

        self.out.push('>');
        let inline = inline || children.iter().any(Node::is_character_data);
        for child in children {
            if !inline {
                self.pad(depth + 1);
            }
            self.node(child, depth + 1, inline);
        }
        if !inline {
            self.pad(depth);
        }
        self.out.push_str("</");
        self.out.push_str(&element.name);
        self.out.push('>');
    }

    fn node(&mut self, node: &Node, depth: usize, inline: bool) {
        match node {
            Node::Element(element) => self.element(element, depth, inline),
            Node::Text(text) => escape_into(&mut self.out, text, false),
            Node::CData(data) => {
                self.out.push_str("<![CDATA[");
                self.out.push_str(data);
                self.out.push_str("]]>");
            }
            Node::Comment(comment) => {
                self.out.push_str("<!--");
                self.out.push_str(comment);
                self.out.push_str("-->");
            }
            Node::Instruction { target, data } => {
                self.out.push_str("<?");
                self.out.push_str(target);
                if !data.is_empty() {
                    self.out.push(' ');
                    self.out.push_str(data);
                }
                self.out.push_str("?>");
            }
            Node::Doctype(body) => {
                self.out.push_str("<!DOCTYPE");
                self.out.push_str(body);
                self.out.push('>');
            }
        }
    }
}

/// Escapes markup-significant characters. Bare `&` always becomes `&amp;`.
fn escape_into(out: &mut String, raw: &str, attribute: bool) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

struct Reader<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, message: impl Into<String>) -> DocumentError {
        DocumentError::new(message, self.pos)
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, prefix: &str) -> DecodeResult<()> {
        if self.eat(prefix) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{prefix}`")))
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start_matches(is_xml_whitespace);
        self.pos = self.input.len() - trimmed.len();
    }

    /// Consumes everything up to `terminator` and the terminator itself.
    fn until(&mut self, terminator: &str, what: &str) -> DecodeResult<&'a str> {
        let rest = self.rest();
        let Some(end) = rest.find(terminator) else {
            return Err(self.error(format!("unterminated {what}")));
        };
        self.pos += end + terminator.len();
        Ok(&rest[..end])
    }

    fn name(&mut self) -> DecodeResult<String> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, ch)) if is_name_start(ch) => {}
            _ => return Err(self.error("expected a name")),
        }
        let end = chars
            .find(|&(_, ch)| !is_name_char(ch))
            .map_or(rest.len(), |(index, _)| index);
        self.pos += end;
        Ok(rest[..end].to_string())
    }

    fn at_declaration(&self) -> bool {
        self.starts_with("<?xml")
            && self.rest()[5..]
                .chars()
                .next()
                .is_some_and(|ch| ch == '?' || is_xml_whitespace(ch))
    }

    fn declaration(&mut self) -> DecodeResult<Attributes> {
        self.expect("<?xml")?;
        let mut attributes = Attributes::new();
        loop {
            self.skip_whitespace();
            if self.eat("?>") {
                return Ok(attributes);
            }
            if self.is_eof() {
                return Err(self.error("unterminated XML declaration"));
            }
            self.attribute(&mut attributes)?;
        }
    }

    /// Comments, processing instructions and (before the root) a doctype.
    fn misc(&mut self, allow_doctype: bool) -> DecodeResult<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace();
            if self.starts_with("<!--") {
                nodes.push(self.comment()?);
            } else if self.starts_with("<?") {
                nodes.push(self.instruction()?);
            } else if allow_doctype && self.starts_with("<!DOCTYPE") {
                nodes.push(self.doctype()?);
            } else if self.is_eof() || self.starts_with("<") {
                return Ok(nodes);
            } else {
                return Err(self.error("text outside the root element"));
            }
        }
    }

    fn comment(&mut self) -> DecodeResult<Node> {
        self.expect("<!--")?;
        let body = self.until("-->", "comment")?;
        Ok(Node::Comment(body.to_string()))
    }

    fn cdata(&mut self) -> DecodeResult<Node> {
        self.expect("<![CDATA[")?;
        let body = self.until("]]>", "CDATA section")?;
        Ok(Node::CData(body.to_string()))
    }

    fn instruction(&mut self) -> DecodeResult<Node> {
        let start = self.pos;
        self.expect("<?")?;
        let target = self.name()?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(DocumentError::new(
                "XML declaration is only allowed at the start",
                start,
            ));
        }
        let data = self.until("?>", "processing instruction")?;
        Ok(Node::Instruction {
            target,
            data: data.trim().to_string(),
        })
    }

    fn doctype(&mut self) -> DecodeResult<Node> {
        self.expect("<!DOCTYPE")?;
        let rest = self.rest();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        for (index, ch) in rest.char_indices() {
            match (quote, ch) {
                (Some(open), _) if ch == open => quote = None,
                (Some(_), _) => {}
                (None, '"' | '\'') => quote = Some(ch),
                (None, '[') => depth += 1,
                (None, ']') => depth = depth.saturating_sub(1),
                (None, '>') if depth == 0 => {
                    self.pos += index + 1;
                    return Ok(Node::Doctype(rest[..index].to_string()));
                }
                _ => {}
            }
        }
        Err(self.error("unterminated DOCTYPE"))
    }

    fn attribute(&mut self, attributes: &mut Attributes) -> DecodeResult<()> {
        let start = self.pos;
        let key = self.name()?;
        self.skip_whitespace();
        self.expect("=")?;
        self.skip_whitespace();
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        self.pos += 1;
        let value_start = self.pos;
        let rest = self.rest();
        let Some(end) = rest.find(quote) else {
            return Err(self.error("unterminated attribute value"));
        };
        let raw = &rest[..end];
        if let Some(lt) = raw.find('<') {
            return Err(DocumentError::new(
                "`<` is not allowed in attribute values",
                value_start + lt,
            ));
        }
        let value = unescape(raw, value_start)?;
        self.pos += end + 1;

        if attributes.contains_key(&key) {
            return Err(DocumentError::new(
                format!("duplicate attribute `{key}`"),
                start,
            ));
        }
        attributes.insert(key, value);
        Ok(())
    }

    fn element(&mut self) -> DecodeResult<Element> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("elements nested deeper than {MAX_DEPTH} levels")));
        }
        self.expect("<")?;
        let name = self.name()?;
        let mut attributes = Attributes::new();

        loop {
            let before = self.pos;
            self.skip_whitespace();
            if self.eat("/>") {
                return Ok(Element::from_parts(name, attributes, Vec::new()));
            }
            if self.eat(">") {
                break;
            }
            if self.is_eof() {
                return Err(self.error(format!("unterminated start tag `{name}`")));
            }
            if self.pos == before {
                return Err(self.error("expected whitespace before attribute"));
            }
            self.attribute(&mut attributes)?;
        }

        self.depth += 1;
        let children = self.content(&name);
        self.depth -= 1;
        Ok(Element::from_parts(name, attributes, children?))
    }

    /// Children of `parent` up to and including its end tag.
    fn content(&mut self, parent: &str) -> DecodeResult<Vec<Node>> {
        let mut children = Vec::new();
        loop {
            if self.is_eof() {
                return Err(self.error(format!("unclosed element `{parent}`")));
            }
            if self.starts_with("</") {
                let start = self.pos;
                self.pos += 2;
                let closing = self.name()?;
                self.skip_whitespace();
                self.expect(">")?;
                if closing != parent {
                    return Err(DocumentError::new(
                        format!("expected `</{parent}>`, found `</{closing}>`"),
                        start,
                    ));
                }
                return Ok(children);
            } else if self.starts_with("<!--") {
                children.push(self.comment()?);
            } else if self.starts_with("<![CDATA[") {
                children.push(self.cdata()?);
            } else if self.starts_with("<?") {
                children.push(self.instruction()?);
            } else if self.starts_with("<") {
                children.push(Node::Element(self.element()?));
            } else {
                let start = self.pos;
                let rest = self.rest();
                let end = rest.find('<').unwrap_or(rest.len());
                self.pos += end;
                let raw = &rest[..end];
                if !raw.chars().all(is_xml_whitespace) {
                    children.push(Node::Text(unescape(raw, start)?));
                }
            }
        }
    }
}

/// Resolves the five predefined entities and numeric character references.
fn unescape(raw: &str, offset: usize) -> DecodeResult<String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let at = offset + (raw.len() - rest.len()) + amp;
        let tail = &rest[amp + 1..];
        let Some(semi) = tail.find(';') else {
            return Err(DocumentError::new("bare `&` must be written as `&amp;`", at));
        };
        let entity = &tail[..semi];
        let resolved = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => numeric_reference(entity)
                .ok_or_else(|| DocumentError::new(format!("unknown entity `&{entity};`"), at))?,
        };
        out.push(resolved);
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn numeric_reference(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

const fn is_xml_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r')
}

fn is_name_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == ':'
}

fn is_name_char(ch: char) -> bool {
    is_name_start(ch) || ch.is_ascii_digit() || ch == '-' || ch == '.' || ch.is_alphanumeric()
}

/// True if `name` is usable as an element or attribute name.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}
