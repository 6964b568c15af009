//! # onvifsoap - SOAP 1.2 plumbing for ONVIF services
//!
//! This crate turns a WSDL contract and an endpoint into something that can
//! be called with plain mappings:
//!
//! - [`WsdlDocument`]: operations and SOAP actions declared by a WSDL file
//! - [`build_soap_request`]: request envelopes, with an optional
//!   WS-Security [`UsernameToken`] header
//! - [`parse_soap_envelope`] / [`response_value`]: response decoding and
//!   [`SoapFault`] extraction
//! - [`SoapTransport`] / [`TransportFactory`]: the seam used by the ONVIF
//!   client, with a blocking HTTP implementation in [`HttpTransport`]
//!
//! ## Example
//!
//! ```ignore
//! use onvifsoap::{HttpTransportFactory, TransportFactory, TransportOptions};
//! use serde_json::Map;
//!
//! let transport = HttpTransportFactory.construct(
//!     "wsdl/devicemgmt.wsdl".as_ref(),
//!     "http://192.168.1.10/onvif/device_service",
//!     &TransportOptions::default(),
//! )?;
//! let info = transport.call("GetDeviceInformation", &Map::new(), None)?;
//! println!("{}", info["Model"]);
//! ```

mod builder;
mod envelope;
mod errors;
mod fault;
mod parser;
mod transport;
mod wsdl;
mod wsse;

pub use builder::{NS_SOAP_ENV, TEXT_KEY, build_soap_request};
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader};
pub use errors::{SoapError, SoapParseError};
pub use fault::{SoapFault, build_soap_fault};
pub use parser::{element_to_value, parse_soap_envelope, response_value, response_value_with};
pub use transport::{
    HttpTransport, HttpTransportFactory, SoapTransport, TransportFactory, TransportOptions,
};
pub use wsdl::WsdlDocument;
pub use wsse::{NS_WSSE, NS_WSU, PasswordType, UsernameToken};
