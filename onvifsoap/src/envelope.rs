//! SOAP envelope structures

use xmltree::Element;

/// Complete SOAP envelope
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// Optional SOAP header
    pub header: Option<SoapHeader>,

    /// SOAP body holding the request, the response or a fault
    pub body: SoapBody,
}

/// SOAP header
#[derive(Debug, Clone)]
pub struct SoapHeader {
    pub content: Element,
}

/// SOAP body
#[derive(Debug, Clone)]
pub struct SoapBody {
    pub content: Element,
}

impl SoapEnvelope {
    pub fn new(body: SoapBody) -> Self {
        Self { header: None, body }
    }

    pub fn with_header(header: SoapHeader, body: SoapBody) -> Self {
        Self {
            header: Some(header),
            body,
        }
    }

    /// First element child of the body, i.e. the operation response or the fault
    pub fn payload(&self) -> Option<&Element> {
        self.body.content.children.iter().find_map(|n| n.as_element())
    }
}
