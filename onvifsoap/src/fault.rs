//! SOAP faults returned by devices

use std::fmt;

use xmltree::{Element, XMLNode};

use crate::builder::{SOAP_ENV_PREFIX, write_envelope};
use crate::errors::SoapError;

/// A SOAP fault, as returned in the body of a failed call.
///
/// SOAP 1.2 faults carry a code (`env:Sender`), an optional subcode
/// (`ter:NotAuthorized`) and a reason. SOAP 1.1 faults are mapped onto the
/// same shape from `faultcode`/`faultstring`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: String,
    pub subcode: Option<String>,
    pub reason: String,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

fn child<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name == name => Some(elem),
        _ => None,
    })
}

fn child_text(parent: &Element, name: &str) -> Option<String> {
    child(parent, name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
}

impl SoapFault {
    pub fn new(code: &str, subcode: Option<&str>, reason: &str) -> Self {
        Self {
            code: code.to_string(),
            subcode: subcode.map(str::to_string),
            reason: reason.to_string(),
        }
    }

    /// Reads a `Fault` element; `None` if the element is not a fault
    pub fn from_element(fault: &Element) -> Option<Self> {
        if fault.name != "Fault" {
            return None;
        }

        // SOAP 1.2
        if let Some(code) = child(fault, "Code") {
            let value = child_text(code, "Value").unwrap_or_default();
            let subcode = child(code, "Subcode").and_then(|s| child_text(s, "Value"));
            let reason = child(fault, "Reason")
                .and_then(|r| child_text(r, "Text"))
                .unwrap_or_else(|| value.clone());
            return Some(Self {
                code: value,
                subcode,
                reason,
            });
        }

        // SOAP 1.1
        let code = child_text(fault, "faultcode").unwrap_or_default();
        let reason = child_text(fault, "faultstring").unwrap_or_else(|| code.clone());
        Some(Self {
            code,
            subcode: None,
            reason,
        })
    }
}

fn value_element(name: &str, value: &str) -> Element {
    let mut text = Element::new(&format!("{SOAP_ENV_PREFIX}:Value"));
    text.children.push(XMLNode::Text(value.to_string()));
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Element(text));
    elem
}

/// Builds a SOAP 1.2 fault document
pub fn build_soap_fault(
    code: &str,
    subcode: Option<&str>,
    reason: &str,
) -> Result<String, SoapError> {
    let mut code_elem = value_element(&format!("{SOAP_ENV_PREFIX}:Code"), code);
    if let Some(subcode) = subcode {
        code_elem.children.push(XMLNode::Element(value_element(
            &format!("{SOAP_ENV_PREFIX}:Subcode"),
            subcode,
        )));
    }

    let mut text = Element::new(&format!("{SOAP_ENV_PREFIX}:Text"));
    text.attributes
        .insert("xml:lang".to_string(), "en".to_string());
    text.children.push(XMLNode::Text(reason.to_string()));
    let mut reason_elem = Element::new(&format!("{SOAP_ENV_PREFIX}:Reason"));
    reason_elem.children.push(XMLNode::Element(text));

    let mut fault = Element::new(&format!("{SOAP_ENV_PREFIX}:Fault"));
    fault.children.push(XMLNode::Element(code_elem));
    fault.children.push(XMLNode::Element(reason_elem));

    write_envelope(None, fault)
}
