//! SOAP 1.2 request construction

use serde_json::{Map, Value};
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::errors::SoapError;
use crate::wsse::UsernameToken;

pub const NS_SOAP_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";
pub(crate) const SOAP_ENV_PREFIX: &str = "s";

/// Key holding the text content of an element that also has attributes
pub const TEXT_KEY: &str = "_value";

pub(crate) fn write_envelope(header: Option<Element>, body_child: Element) -> Result<String, SoapError> {
    let mut body = Element::new(&format!("{SOAP_ENV_PREFIX}:Body"));
    body.children.push(XMLNode::Element(body_child));

    let mut envelope = Element::new(&format!("{SOAP_ENV_PREFIX}:Envelope"));
    envelope.attributes.insert(
        format!("xmlns:{SOAP_ENV_PREFIX}"),
        NS_SOAP_ENV.to_string(),
    );
    if let Some(content) = header {
        let mut header = Element::new(&format!("{SOAP_ENV_PREFIX}:Header"));
        header.children.push(XMLNode::Element(content));
        envelope.children.push(XMLNode::Element(header));
    }
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope
        .write_with_config(&mut buf, config)
        .map_err(SoapError::build)?;

    String::from_utf8(buf).map_err(SoapError::build)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Appends one parameter under `parent`.
///
/// `_name` keys become attributes, `_value` the element text, arrays are
/// written as repeated elements and `null` values are omitted.
fn append_param(parent: &mut Element, name: &str, value: &Value) -> Result<(), SoapError> {
    if name.is_empty() {
        return Err(SoapError::build(format!(
            "empty parameter name under {}",
            parent.name
        )));
    }

    if name == TEXT_KEY {
        let text = scalar_text(value)
            .ok_or_else(|| SoapError::build(format!("{} text must be a scalar", parent.name)))?;
        parent.children.push(XMLNode::Text(text));
        return Ok(());
    }

    if let Some(attribute) = name.strip_prefix('_') {
        let text = scalar_text(value).ok_or_else(|| {
            SoapError::build(format!("attribute {attribute} of {} must be a scalar", parent.name))
        })?;
        parent.attributes.insert(attribute.to_string(), text);
        return Ok(());
    }

    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                append_param(parent, name, item)?;
            }
        }
        Value::Object(fields) => {
            let mut child = Element::new(name);
            for (key, field) in fields {
                append_param(&mut child, key, field)?;
            }
            parent.children.push(XMLNode::Element(child));
        }
        scalar => {
            let mut child = Element::new(name);
            if let Some(text) = scalar_text(scalar) {
                child.children.push(XMLNode::Text(text));
            }
            parent.children.push(XMLNode::Element(child));
        }
    }
    Ok(())
}

/// Builds the request document for `operation` in the service `namespace`.
///
/// The operation element declares `namespace` as default namespace so that
/// parameter elements are qualified the way ONVIF schemas expect.
pub fn build_soap_request(
    namespace: &str,
    operation: &str,
    params: &Map<String, Value>,
    security: Option<&UsernameToken>,
) -> Result<String, SoapError> {
    let mut request = Element::new(operation);
    request
        .attributes
        .insert("xmlns".to_string(), namespace.to_string());

    for (name, value) in params {
        append_param(&mut request, name, value)?;
    }

    let header = security.map(|token| token.to_element(SOAP_ENV_PREFIX));
    write_envelope(header, request)
}
