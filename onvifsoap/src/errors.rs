use std::path::PathBuf;

use thiserror::Error;

use crate::fault::SoapFault;

/// Failures raised by the SOAP transport layer.
#[derive(Debug, Error)]
pub enum SoapError {
    #[error("{0}")]
    Fault(SoapFault),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Type not found: {0}")]
    TypeNotFound(String),
    #[error("Port not found: {0}")]
    PortNotFound(String),
    #[error("Cannot build request: {0}")]
    Build(String),
    #[error("WSDL document {}: {message}", path.display())]
    Wsdl { path: PathBuf, message: String },
    #[error("HTTP error when calling {endpoint}: {message}")]
    Http { endpoint: String, message: String },
    #[error("{endpoint} answered HTTP status {status} without a SOAP envelope")]
    HttpStatus { endpoint: String, status: u16 },
    #[error("Invalid SOAP message: {0}")]
    Parse(#[from] SoapParseError),
}

/// Malformed SOAP documents.
#[derive(Debug, Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] xmltree::ParseError),
    #[error("Missing SOAP Envelope")]
    MissingEnvelope,
    #[error("Missing SOAP Body")]
    MissingBody,
}

impl SoapError {
    pub fn wsdl(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        SoapError::Wsdl {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn http(endpoint: &str, message: impl ToString) -> Self {
        SoapError::Http {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    pub fn build(message: impl ToString) -> Self {
        SoapError::Build(message.to_string())
    }
}
