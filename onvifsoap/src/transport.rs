//! Service transports: one WSDL contract bound to one endpoint
//!
//! A [`TransportFactory`] parses a WSDL file and binds it to an endpoint URL.
//! The resulting [`SoapTransport`] can be cloned cheaply (the parsed contract
//! is shared) and re-pointed at another endpoint without parsing again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use ureq::Agent;

use crate::builder::build_soap_request;
use crate::errors::SoapError;
use crate::parser::{parse_soap_envelope, response_value_with};
use crate::wsdl::WsdlDocument;
use crate::wsse::UsernameToken;

/// Options handed to the transport when it is constructed.
///
/// The cache settings describe where parsed schemas may be kept; the HTTP
/// transport records them but parses WSDL documents in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportOptions {
    pub cache_location: Option<PathBuf>,
    pub cache_duration_days: Option<u32>,
    pub disable_cache: bool,
    pub timeout: Option<Duration>,
}

/// A SOAP client for one service.
pub trait SoapTransport: Send + Sync {
    /// Endpoint URL calls are posted to
    fn endpoint(&self) -> &str;

    /// Re-points the transport; the parsed contract is kept
    fn set_endpoint(&mut self, endpoint: &str);

    fn wsdl(&self) -> &Arc<WsdlDocument>;

    fn options(&self) -> &TransportOptions;

    /// Applies new options; the parsed contract and endpoint are kept
    fn set_options(&mut self, options: TransportOptions);

    /// Invokes `operation` and returns its decoded result.
    ///
    /// `security`, when present, is rendered as the `wsse:Security` header
    /// of this request only.
    fn call(
        &self,
        operation: &str,
        params: &Map<String, Value>,
        security: Option<&UsernameToken>,
    ) -> Result<Value, SoapError>;

    /// Independent copy sharing the parsed contract
    fn clone_transport(&self) -> Box<dyn SoapTransport>;
}

/// Builds transports from WSDL files.
pub trait TransportFactory: Send + Sync {
    fn construct(
        &self,
        wsdl: &Path,
        endpoint: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn SoapTransport>, SoapError>;
}

/// Factory for [`HttpTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn construct(
        &self,
        wsdl: &Path,
        endpoint: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn SoapTransport>, SoapError> {
        let document = WsdlDocument::parse_file(wsdl)?;
        if options.disable_cache {
            debug!(wsdl = %wsdl.display(), "WSDL cache disabled");
        } else if let Some(location) = &options.cache_location {
            debug!(
                wsdl = %wsdl.display(),
                cache = %location.display(),
                days = ?options.cache_duration_days,
                "WSDL cache configured"
            );
        }
        Ok(Box::new(HttpTransport::new(
            Arc::new(document),
            endpoint,
            options.clone(),
        )))
    }
}

/// SOAP 1.2 over HTTP, using a blocking `ureq` agent.
#[derive(Clone)]
pub struct HttpTransport {
    wsdl: Arc<WsdlDocument>,
    endpoint: String,
    agent: Agent,
    options: TransportOptions,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("wsdl", &self.wsdl.path())
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .finish()
    }
}

fn agent(options: &TransportOptions) -> Agent {
    // Faults come back with 4xx/5xx statuses and must still be read.
    Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(options.timeout)
        .build()
        .into()
}

impl HttpTransport {
    pub fn new(wsdl: Arc<WsdlDocument>, endpoint: &str, options: TransportOptions) -> Self {
        Self {
            wsdl,
            endpoint: endpoint.to_string(),
            agent: agent(&options),
            options,
        }
    }
}

impl SoapTransport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn set_endpoint(&mut self, endpoint: &str) {
        self.endpoint = endpoint.to_string();
    }

    fn wsdl(&self) -> &Arc<WsdlDocument> {
        &self.wsdl
    }

    fn options(&self) -> &TransportOptions {
        &self.options
    }

    fn set_options(&mut self, options: TransportOptions) {
        if options != self.options {
            self.agent = agent(&options);
            self.options = options;
        }
    }

    fn call(
        &self,
        operation: &str,
        params: &Map<String, Value>,
        security: Option<&UsernameToken>,
    ) -> Result<Value, SoapError> {
        let action = self
            .wsdl
            .soap_action(operation)
            .ok_or_else(|| SoapError::MethodNotFound(operation.to_string()))?;

        let body = build_soap_request(self.wsdl.target_namespace(), operation, params, security)?;

        debug!(endpoint = %self.endpoint, operation, "Sending SOAP request");

        let content_type = format!(r#"application/soap+xml; charset=utf-8; action="{action}""#);
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", &content_type)
            .send(body)
            .map_err(|e| SoapError::http(&self.endpoint, e))?;

        let status = response.status();
        let raw_body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| SoapError::http(&self.endpoint, e))?;

        let envelope = match parse_soap_envelope(raw_body.as_bytes()) {
            Ok(envelope) => envelope,
            Err(e) if !status.is_success() => {
                warn!(
                    endpoint = %self.endpoint,
                    operation,
                    status = status.as_u16(),
                    error = %e,
                    "Non-SOAP error response"
                );
                return Err(SoapError::HttpStatus {
                    endpoint: self.endpoint.clone(),
                    status: status.as_u16(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let result = response_value_with(&envelope, |part| self.wsdl.is_list_element(part));
        if let Err(SoapError::Fault(fault)) = &result {
            debug!(
                endpoint = %self.endpoint,
                operation,
                code = %fault.code,
                subcode = ?fault.subcode,
                "SOAP fault"
            );
        }
        result
    }

    fn clone_transport(&self) -> Box<dyn SoapTransport> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MEDIA_WSDL: &str = r#"<?xml version="1.0"?>
<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"
             targetNamespace="http://www.onvif.org/ver10/media/wsdl">
  <portType name="Media">
    <operation name="GetProfiles"/>
  </portType>
</definitions>"#;

    #[test]
    fn factory_parses_the_contract_and_binds_the_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.wsdl");
        fs::write(&path, MEDIA_WSDL).unwrap();

        let transport = HttpTransportFactory
            .construct(&path, "http://10.0.0.5/onvif/Media", &TransportOptions::default())
            .unwrap();

        assert_eq!(transport.endpoint(), "http://10.0.0.5/onvif/Media");
        assert!(transport.wsdl().has_operation("GetProfiles"));
    }

    #[test]
    fn clones_share_the_contract_but_not_the_endpoint() {
        let wsdl = Arc::new(WsdlDocument::new(
            "media.wsdl",
            "http://www.onvif.org/ver10/media/wsdl",
            ["GetProfiles"],
        ));
        let original = HttpTransport::new(wsdl, "http://a/onvif/Media", TransportOptions::default());

        let mut copy = original.clone_transport();
        copy.set_endpoint("http://b/onvif/Media");

        assert_eq!(original.endpoint(), "http://a/onvif/Media");
        assert_eq!(copy.endpoint(), "http://b/onvif/Media");
        assert!(Arc::ptr_eq(original.wsdl(), copy.wsdl()));
    }

    #[test]
    fn rebinding_options_keeps_contract_and_endpoint() {
        let wsdl = Arc::new(WsdlDocument::new(
            "media.wsdl",
            "http://www.onvif.org/ver10/media/wsdl",
            ["GetProfiles"],
        ));
        let original = HttpTransport::new(
            wsdl,
            "http://a/onvif/Media",
            TransportOptions {
                cache_location: Some(PathBuf::from("/a")),
                timeout: Some(Duration::from_secs(30)),
                ..TransportOptions::default()
            },
        );

        let mut copy = original.clone_transport();
        let options = TransportOptions {
            cache_location: Some(PathBuf::from("/b")),
            timeout: Some(Duration::from_secs(5)),
            ..TransportOptions::default()
        };
        copy.set_options(options.clone());

        assert_eq!(copy.options(), &options);
        assert_eq!(copy.endpoint(), "http://a/onvif/Media");
        assert_eq!(original.options().timeout, Some(Duration::from_secs(30)));
        assert!(Arc::ptr_eq(original.wsdl(), copy.wsdl()));
    }

    #[test]
    fn undeclared_operations_are_rejected_before_sending() {
        let wsdl = Arc::new(WsdlDocument::new(
            "media.wsdl",
            "http://www.onvif.org/ver10/media/wsdl",
            ["GetProfiles"],
        ));
        // Unroutable endpoint: the call must fail before any I/O.
        let transport = HttpTransport::new(wsdl, "http://192.0.2.1/", TransportOptions::default());
        let err = transport.call("GetVideoSources", &Map::new(), None).unwrap_err();
        assert!(matches!(err, SoapError::MethodNotFound(op) if op == "GetVideoSources"));
    }
}
