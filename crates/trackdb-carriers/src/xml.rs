//! Converts SOAP/XML bodies into the `serde_json::Value` tree the normalizers
//! walk.
//!
//! Mapping rules:
//! - element names lose their namespace prefix;
//! - an element with child elements becomes an object keyed by child name;
//! - repeated sibling names collapse into an array in document order;
//! - a text-only element becomes its trimmed text;
//! - an empty element or one marked `nil="true"` becomes `null`;
//! - attributes other than `nil` are dropped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::CarrierError;

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
    nil: bool,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Self {
        Self {
            name: local_name(start),
            children: Map::new(),
            text: String::new(),
            nil: is_nil(start),
        }
    }

    fn into_value(self) -> (String, Value) {
        let value = if self.nil {
            Value::Null
        } else if !self.children.is_empty() {
            Value::Object(self.children)
        } else if self.text.trim().is_empty() {
            Value::Null
        } else {
            Value::String(self.text.trim().to_string())
        };
        (self.name, value)
    }
}

/// Parses `xml` and returns `{ "<root>": <tree> }`.
///
/// # Errors
///
/// Returns [`CarrierError::Decode`] if the document is not well-formed or has
/// no root element.
pub fn xml_to_value(xml: &str) -> Result<Value, CarrierError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Frame::open(&e)),
            Ok(Event::Empty(e)) => {
                let name = local_name(&e);
                attach(&mut stack, &mut root, name, Value::Null);
            }
            Ok(Event::Text(e)) => {
                if let Some(frame) = stack.last_mut() {
                    let text = e.unescape().map_err(|err| decode_error(&err))?;
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(_)) => {
                let Some(frame) = stack.pop() else {
                    return Err(decode_error("unbalanced closing tag"));
                };
                let (name, value) = frame.into_value();
                attach(&mut stack, &mut root, name, value);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(decode_error(&e)),
            Ok(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(decode_error("unexpected end of document"));
    }
    let (name, value) = root.ok_or_else(|| decode_error("document has no root element"))?;
    let mut wrapper = Map::new();
    wrapper.insert(name, value);
    Ok(Value::Object(wrapper))
}

fn attach(
    stack: &mut [Frame],
    root: &mut Option<(String, Value)>,
    name: String,
    value: Value,
) {
    match stack.last_mut() {
        Some(parent) => insert_child(&mut parent.children, name, value),
        None => {
            if root.is_none() {
                *root = Some((name, value));
            }
        }
    }
}

fn insert_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        None => {
            children.insert(name, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn is_nil(start: &BytesStart<'_>) -> bool {
    start.attributes().flatten().any(|attr| {
        attr.key.local_name().as_ref() == b"nil"
            && attr
                .unescape_value()
                .is_ok_and(|v| v.trim().eq_ignore_ascii_case("true"))
    })
}

fn decode_error(reason: impl std::fmt::Display) -> CarrierError {
    CarrierError::Decode {
        context: "XML body".to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strips_namespaces_and_groups_repeats() {
        let xml = r#"<?xml version="1.0"?>
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
              <s:Body>
                <Packages>
                  <Package><PIN><Value>329</Value></PIN></Package>
                  <Package><PIN><Value>330</Value></PIN></Package>
                </Packages>
              </s:Body>
            </s:Envelope>"#;
        let value = xml_to_value(xml).unwrap();
        assert_eq!(
            value,
            json!({"Envelope": {"Body": {"Packages": {"Package": [
                {"PIN": {"Value": "329"}},
                {"PIN": {"Value": "330"}}
            ]}}}})
        );
    }

    #[test]
    fn empty_and_nil_elements_become_null() {
        let xml = r#"<Root xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
            <A/>
            <B></B>
            <C i:nil="true"/>
            <D i:nil="true">ignored</D>
            <E>  text &amp; more  </E>
        </Root>"#;
        let value = xml_to_value(xml).unwrap();
        assert_eq!(
            value,
            json!({"Root": {"A": null, "B": null, "C": null, "D": null, "E": "text & more"}})
        );
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(
            xml_to_value("<Root><Open></Root>"),
            Err(CarrierError::Decode { .. })
        ));
        assert!(matches!(xml_to_value(""), Err(CarrierError::Decode { .. })));
    }
}
