//! XML bodies are converted to the same JSON-shaped value a JSON body would
//! produce, so field ignoring works the same for both content types:
//!
//! - the document becomes `{root_name: root_value}`
//! - an element with children or attributes becomes an object
//! - repeated child elements collapse into an array
//! - attributes are stored as `@name`, text next to children as `#text`
//! - a text-only element becomes a string, an empty element becomes `null`
//! - object fields keep document order; a repeated element keeps the position of
//!   its first occurrence
//!
//! [`to_xml`] performs the inverse for dispatching XML bodies upstream.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};
use std::fmt::Display;

use crate::core::error::{ProxyError, ProxyResult};

const TEXT_KEY: &str = "#text";
const ATTRIBUTE_PREFIX: char = '@';

fn malformed<E: Display>(err: E) -> ProxyError {
    ProxyError::malformed_body("xml", err.to_string())
}

#[derive(Default)]
struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> ProxyResult<Self> {
        let mut frame = Frame {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Default::default()
        };

        for attr in start.attributes() {
            let attr = attr.map_err(malformed)?;
            let key = format!(
                "{}{}",
                ATTRIBUTE_PREFIX,
                String::from_utf8_lossy(attr.key.as_ref())
            );
            let value = attr.unescape_value().map_err(malformed)?.into_owned();
            frame.fields.insert(key, Value::String(value));
        }

        Ok(frame)
    }

    fn add_child(&mut self, name: String, value: Value) {
        match self.fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.fields.insert(name, value);
            }
        }
    }

    fn close(self) -> (String, Value) {
        let value = if self.fields.is_empty() {
            if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            }
        } else {
            let mut fields = self.fields;
            if !self.text.is_empty() {
                fields.insert(TEXT_KEY.to_string(), Value::String(self.text));
            }
            Value::Object(fields)
        };
        (self.name, value)
    }
}

/// Parse an XML document into its JSON-shaped value
pub fn parse_xml(input: &str) -> ProxyResult<Value> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let event = reader.read_event().map_err(malformed)?;
        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(malformed("multiple root elements"));
                }
                stack.push(Frame::open(&start)?);
            }
            Event::Empty(start) => {
                if root.is_some() {
                    return Err(malformed("multiple root elements"));
                }
                let (name, value) = Frame::open(&start)?.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(malformed("text outside the root element")),
                }
            }
            Event::CData(data) => {
                let data = data.into_inner();
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&String::from_utf8_lossy(&data)),
                    None => return Err(malformed("CDATA outside the root element")),
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    return Err(malformed("unexpected closing tag"));
                };
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unexpected end of document"));
    }

    let (name, value) = root.ok_or_else(|| malformed("document has no root element"))?;
    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}

/// Serialize a JSON-shaped value back into an XML document.
///
/// A single-key object names the root element; any other value is wrapped in
/// `<root>`.
pub fn to_xml(value: &Value) -> ProxyResult<String> {
    let mut writer = Writer::new(Vec::new());

    match value {
        Value::Object(map) if map.len() == 1 && !is_special_key(map.keys().next()) => {
            for (name, inner) in map {
                write_element(&mut writer, name, inner)?;
            }
        }
        other => write_element(&mut writer, "root", other)?,
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| ProxyError::internal(format!("XML output is not UTF-8: {}", e)))
}

fn is_special_key(key: Option<&String>) -> bool {
    key.map(|k| k.starts_with(ATTRIBUTE_PREFIX) || k == TEXT_KEY)
        .unwrap_or(false)
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> ProxyResult<()> {
    let write_error = |e: quick_xml::Error| ProxyError::internal(format!("XML write failed: {}", e));

    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(name)))
                .map_err(write_error)?;
        }
        Value::Object(fields) => {
            let mut start = BytesStart::new(name);
            let mut attribute_values = Vec::new();
            for (key, field) in fields {
                if let Some(attr) = key.strip_prefix(ATTRIBUTE_PREFIX) {
                    attribute_values.push((attr, scalar_text(field)));
                }
            }
            for (attr, text) in &attribute_values {
                start.push_attribute((*attr, text.as_str()));
            }

            let has_content = fields
                .keys()
                .any(|k| !k.starts_with(ATTRIBUTE_PREFIX));
            if !has_content {
                writer.write_event(Event::Empty(start)).map_err(write_error)?;
                return Ok(());
            }

            writer.write_event(Event::Start(start)).map_err(write_error)?;
            for (key, field) in fields {
                if key == TEXT_KEY {
                    let text = scalar_text(field);
                    writer
                        .write_event(Event::Text(BytesText::new(&text)))
                        .map_err(write_error)?;
                } else if !key.starts_with(ATTRIBUTE_PREFIX) {
                    write_element(writer, key, field)?;
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(write_error)?;
        }
        scalar => {
            let text = scalar_text(scalar);
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(write_error)?;
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(write_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(write_error)?;
        }
    }

    Ok(())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
