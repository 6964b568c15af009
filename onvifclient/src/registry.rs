//! Per-device service instances and process-wide templates
//!
//! Building a service from its WSDL contract is slow, so the first instance
//! ever built for a logical service is kept as a template and later
//! instances, for the same device or another one, are cloned from it: the
//! clone shares the parsed contract and only swaps endpoint and credential.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use onvifsoap::{TransportFactory, TransportOptions};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tracing::{debug, info};

use crate::credential::Credential;
use crate::definition::{self, DEVICE_SERVICE_PATH, DEVICEMGMT};
use crate::discovery::XAddrTable;
use crate::errors::{OnvifError, Result};
use crate::service::ServiceInstance;

static SHARED_TEMPLATES: Lazy<Arc<ServiceTemplates>> =
    Lazy::new(|| Arc::new(ServiceTemplates::new()));

/// Template instances, at most one per logical service name.
#[derive(Debug, Default)]
pub struct ServiceTemplates {
    templates: Mutex<HashMap<String, Arc<ServiceInstance>>>,
    no_clone: Mutex<HashSet<String>>,
}

impl ServiceTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store used unless another one is injected
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED_TEMPLATES)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceInstance>> {
        self.templates.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.lock().is_empty()
    }

    /// Keeps `instance` as template unless one already exists
    fn register(&self, name: &str, instance: &Arc<ServiceInstance>) {
        self.templates
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(service = name, "Registering service template");
                Arc::clone(instance)
            });
    }

    /// Forces fresh WSDL construction for every new instance of `name`
    pub fn disable_cloning(&self, name: &str) {
        self.no_clone.lock().insert(name.to_ascii_lowercase());
    }

    pub fn enable_cloning(&self, name: &str) {
        self.no_clone.lock().remove(&name.to_ascii_lowercase());
    }

    pub fn cloning_enabled(&self, name: &str) -> bool {
        !self.no_clone.lock().contains(&name.to_ascii_lowercase())
    }

    /// Drops every template; the next instance of each service is built
    /// from its WSDL again.
    pub fn clear(&self) {
        self.templates.lock().clear();
    }
}

/// Mutable state of one device, guarded by the registry mutex.
#[derive(Debug)]
pub struct DeviceState {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) credential: Credential,
    pub(crate) xaddrs: XAddrTable,
    pub(crate) capabilities: Value,
    pub(crate) active: HashMap<String, Arc<ServiceInstance>>,
}

impl DeviceState {
    pub fn new(host: &str, port: u16, credential: Credential) -> Self {
        Self {
            host: host.to_string(),
            port,
            credential,
            xaddrs: XAddrTable::default(),
            capabilities: Value::Null,
            active: HashMap::new(),
        }
    }

    /// Fixed entry point of the device management service
    pub fn device_xaddr(&self) -> String {
        device_xaddr(&self.host, self.port)
    }
}

/// Device management entry point of `host:port`
pub fn device_xaddr(host: &str, port: u16) -> String {
    format!("http://{host}:{port}{DEVICE_SERVICE_PATH}")
}

/// Service instances of one device.
pub struct ServiceRegistry {
    templates: Arc<ServiceTemplates>,
    factory: Arc<dyn TransportFactory>,
    wsdl_dir: PathBuf,
    transport_options: TransportOptions,
    daemon: bool,
    state: Mutex<DeviceState>,
}

impl ServiceRegistry {
    pub fn new(
        state: DeviceState,
        wsdl_dir: PathBuf,
        factory: Arc<dyn TransportFactory>,
        templates: Arc<ServiceTemplates>,
        transport_options: TransportOptions,
        daemon: bool,
    ) -> Self {
        Self {
            templates,
            factory,
            wsdl_dir,
            transport_options,
            daemon,
            state: Mutex::new(state),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, DeviceState>> {
        self.state.try_lock()
    }

    pub fn templates(&self) -> &Arc<ServiceTemplates> {
        &self.templates
    }

    pub fn wsdl_dir(&self) -> &Path {
        &self.wsdl_dir
    }

    /// Active instance of `name`, created when missing and `create` is set
    pub fn get_or_create(&self, name: &str, create: bool) -> Result<Option<Arc<ServiceInstance>>> {
        let mut state = self.lock();
        self.get_or_create_locked(&mut state, name, create)
    }

    pub(crate) fn get_or_create_locked(
        &self,
        state: &mut DeviceState,
        name: &str,
        create: bool,
    ) -> Result<Option<Arc<ServiceInstance>>> {
        let descriptor = definition::lookup(name).ok_or_else(|| OnvifError::unknown_service(name))?;
        if let Some(active) = state.active.get(descriptor.name) {
            return Ok(Some(Arc::clone(active)));
        }
        if !create {
            return Ok(None);
        }
        self.create_locked(state, descriptor.name, true).map(Some)
    }

    /// Builds a new instance of `name` and makes it the active one
    pub fn create(&self, name: &str, from_template: bool) -> Result<Arc<ServiceInstance>> {
        let mut state = self.lock();
        self.create_locked(&mut state, name, from_template)
    }

    pub(crate) fn create_locked(
        &self,
        state: &mut DeviceState,
        name: &str,
        from_template: bool,
    ) -> Result<Arc<ServiceInstance>> {
        let instance = self.build_locked(state, name, None, from_template)?;
        state
            .active
            .insert(instance.name().to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Builds an instance of `name` without making it active.
    ///
    /// `xaddr` overrides the advertised endpoint (or the fixed entry point
    /// for device management).
    pub(crate) fn build_locked(
        &self,
        state: &DeviceState,
        name: &str,
        xaddr: Option<&str>,
        from_template: bool,
    ) -> Result<Arc<ServiceInstance>> {
        let descriptor = definition::lookup(name).ok_or_else(|| OnvifError::unknown_service(name))?;

        let wsdl = self.wsdl_dir.join(descriptor.wsdl);
        if !wsdl.is_file() {
            return Err(OnvifError::Wsdl(format!("No such file: {}", wsdl.display())));
        }

        let xaddr = match xaddr {
            Some(xaddr) => xaddr.to_string(),
            None if descriptor.name == DEVICEMGMT => state.device_xaddr(),
            None => state
                .xaddrs
                .get(descriptor.namespace)
                .map(str::to_string)
                .ok_or_else(|| OnvifError::unsupported_service(descriptor.name))?,
        };

        let template = if from_template && self.templates.cloning_enabled(descriptor.name) {
            self.templates.get(descriptor.name)
        } else {
            None
        };

        let instance = match template {
            Some(template) => {
                debug!(service = descriptor.name, xaddr = %xaddr, "Cloning service from template");
                Arc::new(template.clone_to(
                    &xaddr,
                    state.credential.clone(),
                    &self.transport_options,
                    self.daemon,
                ))
            }
            None => {
                info!(
                    service = descriptor.name,
                    xaddr = %xaddr,
                    wsdl = %wsdl.display(),
                    "Building service from WSDL"
                );
                let transport = self
                    .factory
                    .construct(&wsdl, &xaddr, &self.transport_options)?;
                Arc::new(ServiceInstance::new(
                    descriptor.name,
                    &wsdl,
                    transport,
                    state.credential.clone(),
                    self.daemon,
                ))
            }
        };

        self.templates.register(descriptor.name, &instance);
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onvifsoap::{SoapError, SoapTransport, UsernameToken, WsdlDocument};
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct NullTransport {
        endpoint: String,
        wsdl: Arc<WsdlDocument>,
        options: TransportOptions,
    }

    impl SoapTransport for NullTransport {
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
            Ok(Value::Null)
        }
        fn clone_transport(&self) -> Box<dyn SoapTransport> {
            Box::new(self.clone())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        constructs: AtomicUsize,
    }

    impl TransportFactory for CountingFactory {
        fn construct(
            &self,
            wsdl: &Path,
            endpoint: &str,
            options: &TransportOptions,
        ) -> std::result::Result<Box<dyn SoapTransport>, SoapError> {
            self.constructs.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullTransport {
                endpoint: endpoint.to_string(),
                wsdl: Arc::new(WsdlDocument::new(wsdl, "urn:test", ["GetProfiles"])),
                options: options.clone(),
            }))
        }
    }

    fn registry(
        dir: &Path,
        factory: Arc<CountingFactory>,
        templates: Arc<ServiceTemplates>,
    ) -> ServiceRegistry {
        registry_with(dir, factory, templates, TransportOptions::default())
    }

    fn registry_with(
        dir: &Path,
        factory: Arc<CountingFactory>,
        templates: Arc<ServiceTemplates>,
        options: TransportOptions,
    ) -> ServiceRegistry {
        let mut state = DeviceState::new("10.0.0.5", 80, Credential::new("admin", "admin", true));
        state.xaddrs.insert(
            definition::lookup("media").unwrap().namespace,
            "http://10.0.0.5/onvif/Media",
        );
        ServiceRegistry::new(
            state,
            dir.to_path_buf(),
            factory,
            templates,
            options,
            false,
        )
    }

    fn wsdl_dir(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), "<definitions/>").unwrap();
        }
        dir
    }

    #[test]
    fn get_or_create_returns_the_active_instance() {
        let dir = wsdl_dir(&["media.wsdl"]);
        let factory = Arc::new(CountingFactory::default());
        let registry = registry(dir.path(), factory.clone(), Arc::new(ServiceTemplates::new()));

        let first = registry.get_or_create("Media", true).unwrap().unwrap();
        let second = registry.get_or_create("media", true).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.constructs.load(Ordering::SeqCst), 1);
        assert_eq!(first.xaddr(), "http://10.0.0.5/onvif/Media");
    }

    #[test]
    fn get_without_create_reports_absence() {
        let dir = wsdl_dir(&["media.wsdl"]);
        let registry = registry(
            dir.path(),
            Arc::new(CountingFactory::default()),
            Arc::new(ServiceTemplates::new()),
        );
        assert!(registry.get_or_create("media", false).unwrap().is_none());
    }

    #[test]
    fn creation_errors_are_checked_in_order() {
        let dir = wsdl_dir(&["analytics.wsdl"]);
        let registry = registry(
            dir.path(),
            Arc::new(CountingFactory::default()),
            Arc::new(ServiceTemplates::new()),
        );

        let err = registry.create("thermal", true).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
        assert_eq!(err.reason(), "Unknown service: thermal");

        let err = registry.create("media", true).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Wsdl);
        assert!(err.reason().starts_with("No such file: "));

        let err = registry.create("analytics", true).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
        assert_eq!(err.reason(), "device doesn't support service: analytics");
    }

    #[test]
    fn disabled_cloning_builds_from_wsdl_again() {
        let dir = wsdl_dir(&["media.wsdl"]);
        let factory = Arc::new(CountingFactory::default());
        let templates = Arc::new(ServiceTemplates::new());
        let registry = registry(dir.path(), factory.clone(), templates.clone());

        let first = registry.create("media", true).unwrap();
        templates.disable_cloning("Media");
        let second = registry.create("media", true).unwrap();
        assert_eq!(factory.constructs.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&templates.get("media").unwrap(), &first));
        assert!(!Arc::ptr_eq(&first, &second));

        templates.enable_cloning("media");
        registry.create("media", true).unwrap();
        assert_eq!(factory.constructs.load(Ordering::SeqCst), 2);

        templates.clear();
        assert!(templates.is_empty());
        registry.create("media", true).unwrap();
        assert_eq!(factory.constructs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn clones_run_with_the_options_of_their_registry() {
        let dir = wsdl_dir(&["media.wsdl"]);
        let factory = Arc::new(CountingFactory::default());
        let templates = Arc::new(ServiceTemplates::new());
        let first = registry_with(
            dir.path(),
            factory.clone(),
            templates.clone(),
            TransportOptions {
                cache_location: Some(PathBuf::from("/a")),
                timeout: Some(std::time::Duration::from_secs(30)),
                ..TransportOptions::default()
            },
        );
        let second_options = TransportOptions {
            cache_location: Some(PathBuf::from("/b")),
            timeout: Some(std::time::Duration::from_secs(5)),
            disable_cache: true,
            ..TransportOptions::default()
        };
        let second = registry_with(
            dir.path(),
            factory.clone(),
            templates.clone(),
            second_options.clone(),
        );

        let template = first.create("media", true).unwrap();
        let clone = second.create("media", true).unwrap();
        assert_eq!(factory.constructs.load(Ordering::SeqCst), 1);
        assert_eq!(clone.transport_options(), second_options);
        assert_eq!(
            template.transport_options().cache_location,
            Some(PathBuf::from("/a"))
        );
    }

    #[test]
    fn built_instances_are_not_activated() {
        let dir = wsdl_dir(&["devicemgmt.wsdl"]);
        let registry = registry(
            dir.path(),
            Arc::new(CountingFactory::default()),
            Arc::new(ServiceTemplates::new()),
        );
        let state = registry.lock();
        let xaddr = device_xaddr("10.0.0.9", 8080);
        let instance = registry
            .build_locked(&state, DEVICEMGMT, Some(&xaddr), true)
            .unwrap();
        assert_eq!(instance.xaddr(), "http://10.0.0.9:8080/onvif/device_service");
        assert!(state.active.is_empty());
    }

    #[test]
    fn devicemgmt_uses_the_fixed_entry_point() {
        let dir = wsdl_dir(&["devicemgmt.wsdl"]);
        let registry = registry(
            dir.path(),
            Arc::new(CountingFactory::default()),
            Arc::new(ServiceTemplates::new()),
        );
        let devicemgmt = registry.create("devicemgmt", true).unwrap();
        assert_eq!(devicemgmt.xaddr(), "http://10.0.0.5:80/onvif/device_service");
    }
}
