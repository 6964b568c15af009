//! SOAP response parsing and conversion to plain mappings

use std::io::BufReader;

use serde_json::{Map, Value};
use xmltree::{Element, XMLNode};

use super::{SoapBody, SoapEnvelope, SoapHeader};
use crate::builder::TEXT_KEY;
use crate::errors::{SoapError, SoapParseError};
use crate::fault::SoapFault;

/// Parses a complete SOAP envelope (1.1 or 1.2)
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if root.name != "Envelope" {
        return Err(SoapParseError::MissingEnvelope);
    }

    let header = root
        .get_child("Header")
        .map(|e| SoapHeader { content: e.clone() });

    let body_elem = root.get_child("Body").ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope {
        header,
        body: SoapBody {
            content: body_elem.clone(),
        },
    })
}

fn scalar(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

/// Converts an element into a plain mapping.
///
/// - leaf elements become scalars (`true`/`false` as booleans, anything
///   else as strings) or `null` when empty
/// - attributes become `_name` keys
/// - repeated children become arrays, in document order
pub fn element_to_value(elem: &Element) -> Value {
    let children: Vec<&Element> = elem.children.iter().filter_map(|n| n.as_element()).collect();
    let text = elem
        .children
        .iter()
        .filter_map(|n| match n {
            XMLNode::Text(t) | XMLNode::CData(t) => Some(t.as_str()),
            _ => None,
        })
        .collect::<String>();
    let text = text.trim();

    if children.is_empty() && elem.attributes.is_empty() {
        return if text.is_empty() {
            Value::Null
        } else {
            scalar(text)
        };
    }

    let mut map = Map::new();
    for (name, value) in &elem.attributes {
        map.insert(format!("_{name}"), scalar(value));
    }
    if children.is_empty() && !text.is_empty() {
        map.insert(TEXT_KEY.to_string(), scalar(text));
    }

    for child in children {
        let value = element_to_value(child);
        match map.get_mut(&child.name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(child.name.clone(), value);
            }
        }
    }

    Value::Object(map)
}

/// Extracts the result of an operation from a response envelope.
///
/// A fault payload is returned as [`SoapError::Fault`]. A response element
/// holding a single part is unwrapped to that part, so `GetHostnameResponse`
/// yields the `HostnameInformation` mapping and `GetProfilesResponse` the list
/// of profiles.
pub fn response_value(envelope: &SoapEnvelope) -> Result<Value, SoapError> {
    response_value_with(envelope, |_| false)
}

/// Same as [`response_value`], with `is_list` naming the parts declared as
/// repeatable. Those parts are sequences even when the device sent a single
/// element.
pub fn response_value_with<F>(envelope: &SoapEnvelope, is_list: F) -> Result<Value, SoapError>
where
    F: Fn(&str) -> bool,
{
    let Some(payload) = envelope.payload() else {
        return Ok(Value::Null);
    };

    if let Some(fault) = SoapFault::from_element(payload) {
        return Err(SoapError::Fault(fault));
    }

    let mut map = match element_to_value(payload) {
        Value::Object(map) => map,
        other => return Ok(other),
    };

    for (name, part) in map.iter_mut() {
        if !name.starts_with('_') && !part.is_array() && is_list(name.as_str()) {
            let single = part.take();
            *part = Value::Array(vec![single]);
        }
    }

    if map.len() == 1 && !map.keys().any(|k| k.starts_with('_')) {
        let key = map.keys().next().cloned().unwrap_or_default();
        return Ok(map.remove(&key).unwrap_or(Value::Null));
    }
    Ok(Value::Object(map))
}
