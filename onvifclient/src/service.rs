//! Bound, authenticated handles to one ONVIF service
//!
//! A [`ServiceInstance`] pairs a SOAP transport (one WSDL contract bound to
//! one XAddr) with the credential of the device. Every call builds a fresh
//! WS-Security token from that credential.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use onvifsoap::{SoapTransport, TransportOptions};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::credential::Credential;
use crate::errors::{OnvifError, Result};

/// Completion callback of a call dispatched in daemon mode
pub type Callback = Box<dyn FnOnce(&Result<Value>) + Send + 'static>;

pub struct ServiceInstance {
    name: String,
    wsdl: PathBuf,
    transport: RwLock<Box<dyn SoapTransport>>,
    credential: RwLock<Credential>,
    daemon: bool,
    wsse_asserts: AtomicU64,
}

impl std::fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("name", &self.name)
            .field("xaddr", &self.xaddr())
            .field("wsdl", &self.wsdl)
            .field("daemon", &self.daemon)
            .finish()
    }
}

impl ServiceInstance {
    pub fn new(
        name: &str,
        wsdl: &Path,
        transport: Box<dyn SoapTransport>,
        credential: Credential,
        daemon: bool,
    ) -> Self {
        let service = Self {
            name: name.to_string(),
            wsdl: wsdl.to_path_buf(),
            transport: RwLock::new(transport),
            credential: RwLock::new(Credential::default()),
            daemon,
            wsse_asserts: AtomicU64::new(0),
        };
        service.set_credential(&credential);
        service
    }

    /// New instance sharing this one's parsed contract, bound to `xaddr`
    /// and running with `options`.
    pub fn clone_to(
        &self,
        xaddr: &str,
        credential: Credential,
        options: &TransportOptions,
        daemon: bool,
    ) -> Self {
        let mut transport = self.transport.read().clone_transport();
        transport.set_endpoint(xaddr);
        transport.set_options(options.clone());
        Self::new(&self.name, &self.wsdl, transport, credential, daemon)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wsdl(&self) -> &Path {
        &self.wsdl
    }

    pub fn xaddr(&self) -> String {
        self.transport.read().endpoint().to_string()
    }

    pub fn transport_options(&self) -> TransportOptions {
        self.transport.read().options().clone()
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    /// Operation names declared by the WSDL contract
    pub fn operations(&self) -> Vec<String> {
        self.transport
            .read()
            .wsdl()
            .operations()
            .map(str::to_string)
            .collect()
    }

    pub fn has_operation(&self, operation: &str) -> bool {
        self.transport.read().wsdl().has_operation(operation)
    }

    pub fn set_endpoint(&self, xaddr: &str) {
        debug!(service = %self.name, xaddr, "Rebinding service endpoint");
        self.transport.write().set_endpoint(xaddr);
    }

    pub fn credential(&self) -> Credential {
        self.credential.read().clone()
    }

    /// Replaces the credential used for the next calls
    pub fn set_credential(&self, credential: &Credential) {
        *self.credential.write() = credential.clone();
        self.wsse_asserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Re-asserts WS-Security, updating the username and/or password
    pub fn set_wsse(&self, username: Option<&str>, password: Option<&str>) {
        let mut credential = self.credential();
        if let Some(user) = username.filter(|u| !u.is_empty()) {
            credential.username = user.to_string();
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            credential.password = password.to_string();
        }
        self.set_credential(&credential);
    }

    /// How many times the credential has been asserted on this instance
    pub fn wsse_asserts(&self) -> u64 {
        self.wsse_asserts.load(Ordering::Relaxed)
    }

    fn ensure_operation(&self, operation: &str) -> Result<()> {
        if self.has_operation(operation) {
            Ok(())
        } else {
            Err(OnvifError::method_not_found(operation))
        }
    }

    fn call(&self, operation: &str, params: &Map<String, Value>) -> Result<Value> {
        // Snapshot so that rebinding never waits on a call in flight
        let transport = self.transport.read().clone_transport();
        if !transport.wsdl().has_operation(operation) {
            return Err(OnvifError::method_not_found(operation));
        }

        let token = self.credential.read().token();
        debug!(
            service = %self.name,
            xaddr = %transport.endpoint(),
            operation,
            "Invoking ONVIF operation"
        );
        transport
            .call(operation, params, token.as_ref())
            .map_err(OnvifError::from)
    }

    /// Calls `operation` and waits for its result.
    ///
    /// Always synchronous, whatever the daemon flag: daemon mode only
    /// applies to [`dispatch`](Self::dispatch).
    pub fn invoke<P>(&self, operation: &str, params: &P) -> Result<Value>
    where
        P: Serialize + ?Sized,
    {
        let params = normalize_params(params)?;
        self.call(operation, &params)
    }

    /// Calls `operation`, on a background thread when the instance runs in
    /// daemon mode.
    ///
    /// In daemon mode the function returns `Ok(None)` as soon as the thread
    /// is started and the result is only delivered to `callback`. Otherwise
    /// the call completes first, `callback` sees the result and it is
    /// returned as `Some`.
    pub fn dispatch<P>(
        self: &Arc<Self>,
        operation: &str,
        params: &P,
        callback: Option<Callback>,
    ) -> Result<Option<Value>>
    where
        P: Serialize + ?Sized,
    {
        let params = normalize_params(params)?;

        if !self.daemon {
            let result = self.call(operation, &params);
            if let Some(callback) = callback {
                callback(&result);
            }
            return result.map(Some);
        }

        self.ensure_operation(operation)?;

        let service = Arc::clone(self);
        let op = operation.to_string();
        thread::Builder::new()
            .name(format!("onvif-{}-{}", self.name, operation))
            .spawn(move || {
                let result = service.call(&op, &params);
                if let Err(e) = &result {
                    warn!(service = %service.name, operation = %op, error = %e, "Background ONVIF call failed");
                }
                if let Some(callback) = callback {
                    callback(&result);
                }
            })
            .map_err(|e| OnvifError::Unknown(e.to_string()))?;

        Ok(None)
    }
}

/// Normalizes call parameters to a key/value mapping.
///
/// `()` and `None` are the empty mapping; anything else must serialize to an
/// object.
pub fn normalize_params<P>(params: &P) -> Result<Map<String, Value>>
where
    P: Serialize + ?Sized,
{
    match serde_json::to_value(params).map_err(|e| OnvifError::Build(e.to_string()))? {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(OnvifError::Build(format!(
            "operation parameters must be a mapping, got {other}"
        ))),
    }
}

/// Plain-mapping view of a response: an empty response is an empty mapping,
/// anything else is kept as decoded.
pub fn to_mapping(response: Value) -> Value {
    match response {
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, Sender, bounded};
    use onvifsoap::{SoapError, UsernameToken, WsdlDocument};
    use serde_json::json;
    use std::time::Duration;

    /// Transport whose calls block until released.
    #[derive(Clone)]
    struct GatedTransport {
        endpoint: String,
        wsdl: Arc<WsdlDocument>,
        options: TransportOptions,
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl SoapTransport for GatedTransport {
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
            self.options = options;
        }
        fn call(
            &self,
            _operation: &str,
            _params: &Map<String, Value>,
            _security: Option<&UsernameToken>,
        ) -> std::result::Result<Value, SoapError> {
            let _ = self.entered.send(());
            let _ = self.release.recv_timeout(Duration::from_secs(5));
            Ok(json!(self.endpoint))
        }
        fn clone_transport(&self) -> Box<dyn SoapTransport> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn rebinding_does_not_wait_for_calls_in_flight() {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let service = Arc::new(ServiceInstance::new(
            "media",
            Path::new("media.wsdl"),
            Box::new(GatedTransport {
                endpoint: "http://10.0.0.5/onvif/Media".into(),
                wsdl: Arc::new(WsdlDocument::new("media.wsdl", "urn:media", ["GetProfiles"])),
                options: TransportOptions::default(),
                entered: entered_tx,
                release: release_rx,
            }),
            Credential::new("admin", "admin", true),
            false,
        ));

        let caller = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.invoke("GetProfiles", &()))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (done_tx, done_rx) = bounded(1);
        {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service.set_endpoint("http://10.0.0.9/onvif/Media");
                let _ = done_tx.send(());
            });
        }
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(service.xaddr(), "http://10.0.0.9/onvif/Media");

        release_tx.send(()).unwrap();
        // The call in flight completes against the endpoint it started with
        assert_eq!(
            caller.join().unwrap().unwrap(),
            json!("http://10.0.0.5/onvif/Media")
        );
    }

    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct SetHostname {
        name: String,
    }

    #[test]
    fn structured_params_become_mappings() {
        let params = normalize_params(&SetHostname {
            name: "cam-01".into(),
        })
        .unwrap();
        assert_eq!(params.get("Name"), Some(&json!("cam-01")));

        assert!(normalize_params(&()).unwrap().is_empty());
        assert!(normalize_params(&None::<SetHostname>).unwrap().is_empty());
        assert_eq!(
            normalize_params(&json!({"Category": "All"})).unwrap()["Category"],
            "All"
        );
    }

    #[test]
    fn non_mapping_params_are_build_errors() {
        let err = normalize_params(&vec![1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Build);
        assert!(normalize_params("All").is_err());
    }

    #[test]
    fn empty_responses_map_to_empty_mappings() {
        assert_eq!(to_mapping(Value::Null), json!({}));
        assert_eq!(to_mapping(json!([{"a": 1}])), json!([{"a": 1}]));
        assert_eq!(to_mapping(json!(true)), json!(true));
    }
}
