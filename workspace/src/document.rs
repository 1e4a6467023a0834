//! Owned XML element tree of a workspace file.
//!
//! The reader tokenizes with `quick-xml` and builds a small DOM that the rest
//! of the pipeline walks. Leniency is controlled by [`XmlParserOptions`], whose
//! bit values follow libxml2 so integer option sets passed by callers keep
//! their meaning.

use crate::error::{Result, WorkspaceError};
use bitflags::bitflags;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

bitflags! {
    /// Independent, composable reader options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct XmlParserOptions: u32 {
        /// Tolerate mismatched or unmatched end tags and malformed attributes
        const RECOVER = 1;
        /// Keep unknown named entities verbatim instead of failing
        const NOENT = 1 << 1;
        /// Drop whitespace-only text
        const NOBLANKS = 1 << 8;
        /// Raise the element depth limit and lift the text size limit
        const HUGE = 1 << 19;
    }
}

impl XmlParserOptions {
    /// Interpret a raw option integer, ignoring bits this reader has no use for.
    pub fn from_raw(raw: i32) -> Self {
        let bits = raw as u32;
        let unknown = bits & !Self::all().bits();
        if unknown != 0 {
            debug!("Ignoring unsupported XML parser option bits {:#x}", unknown);
        }
        Self::from_bits_truncate(bits)
    }
}

const MAX_DEPTH: usize = 256;
/// Depth ceiling under `HUGE`. Element trees are dropped and compared
/// recursively, so nesting stays bounded.
const MAX_HUGE_DEPTH: usize = 2048;
const MAX_TEXT_LEN: usize = 10 * 1024 * 1024;

/// One element with its attributes, child elements and concatenated text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `gating:PolygonGate`
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Whether the element's local name is `name`.
    pub fn is(&self, name: &str) -> bool {
        self.local_name() == name
    }

    /// Attribute value by local name, so `gating:id` and `id` both match `"id"`.
    /// An exact qualified match wins over a local-name match.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .or_else(|| self.attributes.iter().find(|(key, _)| local(key) == name))
            .map(|(_, value)| value.as_str())
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// Follow a `/`-separated chain of child local names.
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |element, segment| element.child(segment))
    }

    /// All descendants (not self) with the given local name, in document order.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(element) = stack.pop() {
            if element.is(name) {
                found.push(element);
            }
            stack.extend(element.children.iter().rev());
        }
        found
    }

    /// Text content with surrounding whitespace removed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }
}

/// A loaded workspace document. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    path: Option<PathBuf>,
    options: XmlParserOptions,
    root: XmlElement,
}

impl XmlDocument {
    /// Read and parse the file at `path`.
    pub fn open(path: impl AsRef<Path>, options: XmlParserOptions) -> Result<Self> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let bytes = std::fs::read(path)
            .map_err(|e| WorkspaceError::malformed(&source, format!("cannot read file: {}", e)))?;
        let xml = String::from_utf8(bytes)
            .map_err(|e| WorkspaceError::malformed(&source, format!("not valid UTF-8: {}", e)))?;

        debug!("Parsing {} ({} bytes, options {:?})", source, xml.len(), options);
        let root = parse_tree(&xml, options, &source)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            options,
            root,
        })
    }

    /// Parse an in-memory document.
    pub fn parse_str(xml: &str, options: XmlParserOptions) -> Result<Self> {
        let root = parse_tree(xml, options, "<memory>")?;
        Ok(Self {
            path: None,
            options,
            root,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reader options the document was parsed with.
    pub fn options(&self) -> XmlParserOptions {
        self.options
    }

    /// How the document is named in error messages.
    pub fn source_name(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// The `version` attribute of the root element.
    pub fn version(&self) -> Option<&str> {
        self.root.attr("version")
    }
}

struct TreeBuilder<'s> {
    options: XmlParserOptions,
    source: &'s str,
    stack: Vec<XmlElement>,
    root: Option<XmlElement>,
}

impl<'s> TreeBuilder<'s> {
    fn recover(&self) -> bool {
        self.options.contains(XmlParserOptions::RECOVER)
    }

    fn huge(&self) -> bool {
        self.options.contains(XmlParserOptions::HUGE)
    }

    fn fail(&self, message: impl Into<String>) -> WorkspaceError {
        WorkspaceError::malformed(self.source, message)
    }

    fn open(&mut self, element: XmlElement) -> Result<()> {
        let max_depth = if self.huge() { MAX_HUGE_DEPTH } else { MAX_DEPTH };
        if self.stack.len() >= max_depth {
            return Err(self.fail(format!(
                "element <{}> exceeds the maximum nesting depth of {}",
                element.name, max_depth
            )));
        }
        self.stack.push(element);
        Ok(())
    }

    fn attach(&mut self, element: XmlElement) -> Result<()> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(element);
        } else if self.root.is_none() {
            self.root = Some(element);
        } else if self.recover() {
            warn!("Ignoring <{}> after the root element", element.name);
        } else {
            return Err(self.fail(format!(
                "second root element <{}>",
                element.name
            )));
        }
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        let Some(position) = self.stack.iter().rposition(|e| e.name == name) else {
            if self.recover() {
                warn!("Ignoring unmatched end tag </{}>", name);
                return Ok(());
            }
            return Err(self.fail(format!("unexpected end tag </{}>", name)));
        };

        if position + 1 != self.stack.len() {
            let open = self.stack.last().map(|e| e.name.clone()).unwrap_or_default();
            if !self.recover() {
                return Err(self.fail(format!(
                    "end tag </{}> does not match open element <{}>",
                    name, open
                )));
            }
            warn!("End tag </{}> closes unterminated <{}>", name, open);
        }

        while self.stack.len() > position {
            if let Some(element) = self.stack.pop() {
                self.attach(element)?;
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if self.options.contains(XmlParserOptions::NOBLANKS) && text.trim().is_empty() {
            return Ok(());
        }
        let huge = self.huge();
        let recover = self.recover();
        let source = self.source;
        match self.stack.last_mut() {
            Some(element) if !huge && element.text.len() + text.len() > MAX_TEXT_LEN => {
                Err(WorkspaceError::malformed(
                    source,
                    format!("text of <{}> exceeds {} bytes", element.name, MAX_TEXT_LEN),
                ))
            }
            Some(element) => {
                element.text.push_str(text);
                Ok(())
            }
            None if text.trim().is_empty() || recover => Ok(()),
            None => Err(WorkspaceError::malformed(source, "text outside the root element")),
        }
    }

    fn finish(mut self) -> Result<XmlElement> {
        if let Some(open) = self.stack.last() {
            if !self.recover() {
                return Err(self.fail(format!("unclosed element <{}>", open.name)));
            }
            warn!("Closing {} unterminated element(s) at end of document", self.stack.len());
            while let Some(element) = self.stack.pop() {
                self.attach(element)?;
            }
        }
        self.root
            .ok_or_else(|| WorkspaceError::malformed(self.source, "document has no root element"))
    }
}

fn parse_tree(xml: &str, options: XmlParserOptions, source: &str) -> Result<XmlElement> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);

    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.trim_text(false);
    // End tags are matched against our own stack so RECOVER can decide
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut builder = TreeBuilder {
        options,
        source,
        stack: Vec::new(),
        root: None,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let element = read_element(e, &builder)?;
                builder.open(element)?;
            }
            Ok(Event::Empty(ref e)) => {
                let element = read_element(e, &builder)?;
                builder.attach(element)?;
            }
            Ok(Event::End(ref e)) => {
                let name = std::str::from_utf8(e.name().as_ref())
                    .map_err(|err| builder.fail(format!("invalid end tag name: {}", err)))?
                    .to_string();
                builder.close(&name)?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .decode()
                    .map_err(|err| builder.fail(format!("invalid text: {}", err)))?;
                builder.text(&text)?;
            }
            Ok(Event::CData(ref e)) => {
                let text = e
                    .decode()
                    .map_err(|err| builder.fail(format!("invalid CDATA: {}", err)))?;
                builder.text(&text)?;
            }
            Ok(Event::GeneralRef(ref e)) => {
                let name = e
                    .decode()
                    .map_err(|err| builder.fail(format!("invalid entity reference: {}", err)))?;
                let resolved = match resolve_entity(&name) {
                    Some(ch) => ch.to_string(),
                    None if options.contains(XmlParserOptions::NOENT) => format!("&{};", name),
                    None => return Err(builder.fail(format!("unknown entity &{};", name))),
                };
                builder.text(&resolved)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(builder.fail(format!(
                    "XML parse error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    builder.finish()
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "apos" => Some('\''),
        "quot" => Some('"'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}

fn read_element(start: &BytesStart<'_>, builder: &TreeBuilder<'_>) -> Result<XmlElement> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| builder.fail(format!("invalid element name: {}", e)))?
        .to_string();
    let mut element = XmlElement::new(name);

    let recover = builder.recover();
    let mut attributes = start.attributes();
    attributes.with_checks(!recover);

    for attribute in attributes {
        let attribute = match attribute {
            Ok(attribute) => attribute,
            Err(e) if recover => {
                warn!("Skipping malformed attributes of <{}>: {}", element.name, e);
                break;
            }
            Err(e) => {
                return Err(builder.fail(format!(
                    "malformed attribute on <{}>: {}",
                    element.name, e
                )));
            }
        };

        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|e| builder.fail(format!("invalid attribute name: {}", e)))?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let raw = std::str::from_utf8(&attribute.value)
            .map_err(|e| builder.fail(format!("invalid attribute value: {}", e)))?;
        let value = match quick_xml::escape::unescape(raw) {
            Ok(value) => value.into_owned(),
            Err(_) if builder.options.contains(XmlParserOptions::NOENT) => raw.to_string(),
            Err(e) => {
                return Err(builder.fail(format!(
                    "attribute {} of <{}>: {}",
                    key, element.name, e
                )));
            }
        };
        element.attributes.push((key.to_string(), value));
    }

    Ok(element)
}
