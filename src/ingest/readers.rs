//! Format readers: turn raw file bytes into the neutral tree.
//!
//! Readers are deliberately dumb. They know nothing about profiles or
//! queue semantics; any parse problem surfaces as
//! [`IngestError::Unparseable`] and the pipeline decides what that means
//! for the file.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

use crate::models::{RawNode, RawTree};

use super::error::IngestError;
use super::traits::TreeReader;

/// Dispatches files to the first reader that claims them.
pub struct ReaderRegistry {
    readers: Vec<Box<dyn TreeReader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// The stock registry: XML first (the primary annotation format),
    /// then JSON.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(XmlTreeReader));
        registry.register(Box::new(JsonTreeReader));
        registry
    }

    pub fn register(&mut self, reader: Box<dyn TreeReader>) {
        self.readers.push(reader);
    }

    /// First reader whose `can_handle` accepts the label or filename.
    pub fn reader_for(&self, format: &str) -> Option<&dyn TreeReader> {
        self.readers
            .iter()
            .find(|r| r.can_handle(format))
            .map(|r| r.as_ref())
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Label match or filename-extension match, case-insensitive.
fn claims(format: &str, label: &str) -> bool {
    let lower = format.to_ascii_lowercase();
    lower == label || lower.ends_with(&format!(".{label}"))
}

fn unparseable(filename: &str, reason: impl Into<String>) -> IngestError {
    IngestError::Unparseable {
        filename: filename.to_string(),
        reason: reason.into(),
    }
}

/// Streaming XML reader over the whole document.
///
/// Namespace prefixes are kept on the node name; path lookups strip them
/// at comparison time, so `lidc:ResponseHeader` and `ResponseHeader`
/// resolve the same way.
pub struct XmlTreeReader;

impl XmlTreeReader {
    fn node_from_start(e: &BytesStart) -> Result<RawNode, String> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut node = RawNode::new(name);
        for attr in e.attributes() {
            let attr = attr.map_err(|err| err.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| err.to_string())?
                .into_owned();
            node.attributes.push((key, value));
        }
        Ok(node)
    }
}

fn append_text(stack: &mut [RawNode], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(node) = stack.last_mut() {
        match node.text.as_mut() {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(text);
            }
            None => node.text = Some(text.to_string()),
        }
    }
}

fn attach(
    stack: &mut Vec<RawNode>,
    root: &mut Option<RawNode>,
    node: RawNode,
    filename: &str,
) -> Result<(), IngestError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_none() {
        *root = Some(node);
    } else {
        return Err(unparseable(filename, "multiple root elements"));
    }
    Ok(())
}

impl TreeReader for XmlTreeReader {
    fn format(&self) -> &'static str {
        "xml"
    }

    fn can_handle(&self, format: &str) -> bool {
        claims(format, "xml")
    }

    fn read(&self, filename: &str, payload: &[u8]) -> Result<RawTree, IngestError> {
        let mut reader = Reader::from_reader(payload);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<RawNode> = Vec::new();
        let mut root: Option<RawNode> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let node = Self::node_from_start(e)
                        .map_err(|reason| unparseable(filename, reason))?;
                    stack.push(node);
                }
                Ok(Event::Empty(ref e)) => {
                    let node = Self::node_from_start(e)
                        .map_err(|reason| unparseable(filename, reason))?;
                    attach(&mut stack, &mut root, node, filename)?;
                }
                Ok(Event::End(_)) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| unparseable(filename, "unexpected closing tag"))?;
                    attach(&mut stack, &mut root, node, filename)?;
                }
                Ok(Event::Text(ref t)) => {
                    let text = t
                        .unescape()
                        .map_err(|err| unparseable(filename, err.to_string()))?;
                    append_text(&mut stack, &text);
                }
                Ok(Event::CData(t)) => {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    append_text(&mut stack, &text);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(unparseable(
                        filename,
                        format!("{err} at byte {}", reader.buffer_position()),
                    ));
                }
            }
            buf.clear();
        }

        let root = root.ok_or_else(|| unparseable(filename, "no root element"))?;
        Ok(RawTree::new(filename, root))
    }
}

/// JSON reader for annotation exports that were converted upstream.
///
/// Objects become nodes, object keys become child names, and arrays
/// become repeated same-named siblings so path lookups behave exactly as
/// they do for repeated XML sections.
pub struct JsonTreeReader;

impl JsonTreeReader {
    fn nodes_from_value(name: &str, value: &Value) -> Vec<RawNode> {
        match value {
            Value::Array(items) => items
                .iter()
                .flat_map(|item| Self::nodes_from_value(name, item))
                .collect(),
            Value::Object(entries) => {
                let mut node = RawNode::new(name);
                for (key, child) in entries {
                    node.children.extend(Self::nodes_from_value(key, child));
                }
                vec![node]
            }
            Value::Null => vec![RawNode::new(name)],
            Value::String(s) => vec![RawNode::with_text(name, s.clone())],
            other => vec![RawNode::with_text(name, other.to_string())],
        }
    }
}

impl TreeReader for JsonTreeReader {
    fn format(&self) -> &'static str {
        "json"
    }

    fn can_handle(&self, format: &str) -> bool {
        claims(format, "json")
    }

    fn read(&self, filename: &str, payload: &[u8]) -> Result<RawTree, IngestError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|err| unparseable(filename, err.to_string()))?;

        let entries = match value {
            Value::Object(entries) => entries,
            _ => return Err(unparseable(filename, "top-level JSON must be an object")),
        };

        let mut root = RawNode::new("root");
        for (key, child) in &entries {
            root.children
                .extend(JsonTreeReader::nodes_from_value(key, child));
        }
        Ok(RawTree::new(filename, root))
    }
}
