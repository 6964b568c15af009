//! ONVIF device client
//!
//! [`DeviceClient`] connects to the device management service at its fixed
//! entry point, optionally calibrates the clock offset, discovers the XAddr
//! of every other service and then hands out [`ServiceInstance`]s on demand.

use std::path::PathBuf;
use std::sync::Arc;

use onvifconfig::Config;
use onvifsoap::{HttpTransportFactory, TransportFactory};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::{self, Calibration};
use crate::credential::Credential;
use crate::definition::{self, DEVICEMGMT, EVENTS, PULLPOINT};
use crate::discovery::{self, PullPointBootstrap, XAddrTable};
use crate::errors::{OnvifError, Result};
use crate::options::ClientOptions;
use crate::registry::{self, DeviceState, ServiceRegistry, ServiceTemplates};
use crate::service::ServiceInstance;

pub struct DeviceClient {
    registry: ServiceRegistry,
    options: ClientOptions,
}

impl std::fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("DeviceClient");
        match self.registry.try_lock() {
            Some(state) => {
                let mut services: Vec<&str> = state.active.keys().map(String::as_str).collect();
                services.sort_unstable();
                out.field("host", &state.host)
                    .field("port", &state.port)
                    .field("services", &services);
            }
            None => {
                out.field("state", &"<locked>");
            }
        }
        out.field("options", &self.options).finish()
    }
}

/// Step-by-step construction of a [`DeviceClient`], for callers that need
/// to inject a transport factory or a template store.
pub struct DeviceClientBuilder {
    host: String,
    port: u16,
    username: String,
    password: String,
    wsdl_dir: PathBuf,
    options: ClientOptions,
    factory: Option<Arc<dyn TransportFactory>>,
    templates: Option<Arc<ServiceTemplates>>,
}

impl DeviceClientBuilder {
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn wsdl_dir(mut self, wsdl_dir: impl Into<PathBuf>) -> Self {
        self.wsdl_dir = wsdl_dir.into();
        self
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn transport(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn templates(mut self, templates: Arc<ServiceTemplates>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Builds the client and runs the bootstrap sequence against the device
    pub fn connect(self) -> Result<DeviceClient> {
        let credential = Credential::new(&self.username, &self.password, self.options.digest);
        let factory: Arc<dyn TransportFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(HttpTransportFactory),
        };
        let registry = ServiceRegistry::new(
            DeviceState::new(&self.host, self.port, credential),
            self.wsdl_dir,
            factory,
            self.templates.unwrap_or_else(ServiceTemplates::shared),
            self.options.transport_options(),
            self.options.daemon,
        );

        let client = DeviceClient {
            registry,
            options: self.options,
        };
        {
            let mut state = client.registry.lock();
            client.bootstrap(&mut state)?;
            info!(
                host = %state.host,
                port = state.port,
                services = state.xaddrs.len(),
                "ONVIF device connected"
            );
        }
        Ok(client)
    }
}

impl DeviceClient {
    /// Connects to `host:port` with the default HTTP transport and the
    /// process-wide template store.
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        wsdl_dir: impl Into<PathBuf>,
        options: ClientOptions,
    ) -> Result<Self> {
        Self::builder(host, port)
            .credentials(username, password)
            .wsdl_dir(wsdl_dir)
            .options(options)
            .connect()
    }

    pub fn builder(host: &str, port: u16) -> DeviceClientBuilder {
        DeviceClientBuilder {
            host: host.to_string(),
            port,
            username: String::new(),
            password: String::new(),
            wsdl_dir: PathBuf::from("wsdl"),
            options: ClientOptions::default(),
            factory: None,
            templates: None,
        }
    }

    /// Connects to a device profile stored in the configuration
    pub fn from_config(config: &Config, device: &str) -> anyhow::Result<Self> {
        let profile = config.get_device(device)?;
        let options = ClientOptions::from_config(config)?;
        let client = Self::new(
            &profile.host,
            profile.port,
            &profile.user,
            &profile.password,
            config.get_wsdl_dir()?,
            options,
        )?;
        Ok(client)
    }

    fn bootstrap(&self, state: &mut DeviceState) -> Result<()> {
        let devicemgmt = self.registry.create_locked(state, DEVICEMGMT, true)?;

        if self.options.adjust_clock {
            self.calibrate_locked(state, &devicemgmt);
        }

        let (xaddrs, capabilities) = discovery::discover(&devicemgmt)?;
        state.xaddrs = xaddrs;
        state.capabilities = capabilities;

        if self.options.pullpoint {
            self.bootstrap_pullpoint_locked(state);
        }
        Ok(())
    }

    fn calibrate_locked(&self, state: &mut DeviceState, devicemgmt: &ServiceInstance) -> Calibration {
        let calibration = clock::measure_offset(devicemgmt);
        match &calibration {
            Calibration::Adjusted { offset } => {
                info!(
                    host = %state.host,
                    offset_ms = offset.num_milliseconds(),
                    "Device clock offset measured"
                );
                state.credential.clock_offset = Some(*offset);
                devicemgmt.set_credential(&state.credential);
            }
            Calibration::Skipped { reason } => {
                warn!(host = %state.host, reason = %reason, "Clock calibration skipped");
            }
        }
        calibration
    }

    fn bootstrap_pullpoint_locked(&self, state: &mut DeviceState) -> PullPointBootstrap {
        let events = match state.active.get(EVENTS).cloned() {
            Some(events) => {
                if let Some(xaddr) = state.xaddrs.for_service(EVENTS) {
                    events.set_endpoint(xaddr);
                }
                events
            }
            None => match self.registry.create_locked(state, EVENTS, true) {
                Ok(events) => events,
                Err(e) => {
                    let outcome = PullPointBootstrap::Skipped {
                        reason: e.to_string(),
                    };
                    debug!(?outcome, "Pull-point bootstrap skipped");
                    return outcome;
                }
            },
        };

        let outcome = discovery::bootstrap_pullpoint(&events, &mut state.xaddrs);
        match &outcome {
            PullPointBootstrap::Registered { address } => {
                info!(address = %address, "Pull-point subscription registered");
            }
            PullPointBootstrap::Skipped { reason } => {
                warn!(reason = %reason, "Pull-point bootstrap skipped");
            }
        }
        outcome
    }

    /// Re-measures the clock offset.
    ///
    /// The offset is applied to the device management instance and to
    /// every instance created afterwards.
    pub fn calibrate_clock(&self) -> Result<Calibration> {
        let mut state = self.registry.lock();
        let devicemgmt = self
            .registry
            .get_or_create_locked(&mut state, DEVICEMGMT, true)?
            .ok_or_else(|| OnvifError::unsupported_service(DEVICEMGMT))?;
        Ok(self.calibrate_locked(&mut state, &devicemgmt))
    }

    /// Creates a new pull-point subscription and registers its address
    pub fn bootstrap_pullpoint(&self) -> PullPointBootstrap {
        let mut state = self.registry.lock();
        self.bootstrap_pullpoint_locked(&mut state)
    }

    /// Points the client at a new host and/or port.
    ///
    /// Device management is rebuilt, services are discovered again and
    /// every active instance is rebound to its new XAddr. Nothing changes
    /// when discovery at the new endpoint fails, so the call can be retried.
    pub fn update_endpoint(&self, host: Option<&str>, port: Option<u16>) -> Result<()> {
        let mut state = self.registry.lock();

        let new_host = host
            .filter(|h| !h.is_empty())
            .unwrap_or(state.host.as_str())
            .to_string();
        let new_port = port.filter(|p| *p != 0).unwrap_or(state.port);
        if new_host == state.host && new_port == state.port {
            return Ok(());
        }

        let xaddr = registry::device_xaddr(&new_host, new_port);
        let devicemgmt = self
            .registry
            .build_locked(&state, DEVICEMGMT, Some(&xaddr), true)?;
        let (xaddrs, capabilities) = discovery::discover(&devicemgmt).inspect_err(|e| {
            warn!(host = %new_host, port = new_port, error = %e, "Discovery failed, endpoint unchanged");
        })?;

        info!(host = %new_host, port = new_port, "Device endpoint changed");
        state.host = new_host;
        state.port = new_port;
        state.active.insert(DEVICEMGMT.to_string(), devicemgmt);
        state.xaddrs = xaddrs;
        state.capabilities = capabilities;

        if self.options.pullpoint {
            self.bootstrap_pullpoint_locked(&mut state);
        }

        for (name, instance) in &state.active {
            if name == DEVICEMGMT {
                continue;
            }
            match state.xaddrs.for_service(name) {
                Some(xaddr) => instance.set_endpoint(xaddr),
                None => warn!(
                    service = %name,
                    xaddr = %instance.xaddr(),
                    "Service no longer advertised, keeping previous endpoint"
                ),
            }
        }
        Ok(())
    }

    /// Changes the username and/or password used by every service.
    pub fn update_auth(&self, username: Option<&str>, password: Option<&str>) {
        let mut state = self.registry.lock();

        let mut changed = false;
        if let Some(user) = username.filter(|u| !u.is_empty() && *u != state.credential.username) {
            state.credential.username = user.to_string();
            changed = true;
        }
        if let Some(password) =
            password.filter(|p| !p.is_empty() && *p != state.credential.password)
        {
            state.credential.password = password.to_string();
            changed = true;
        }
        if !changed {
            return;
        }

        debug!(username = %state.credential.username, "Re-asserting WS-Security");
        for instance in state.active.values() {
            instance.set_wsse(username, password);
        }
    }

    /// Active instance of `name`; created on first access when `create` is
    /// set, `None` otherwise.
    pub fn get_service(&self, name: &str, create: bool) -> Result<Option<Arc<ServiceInstance>>> {
        self.registry.get_or_create(name, create)
    }

    /// Active instance of `name`, created on first access
    pub fn service(&self, name: &str) -> Result<Arc<ServiceInstance>> {
        self.get_service(name, true)?
            .ok_or_else(|| OnvifError::unsupported_service(name))
    }

    /// Builds a new instance of `name`, replacing the active one
    pub fn create_service(&self, name: &str, from_template: bool) -> Result<Arc<ServiceInstance>> {
        self.registry.create(name, from_template)
    }

    pub fn devicemgmt(&self) -> Result<Arc<ServiceInstance>> {
        self.service(DEVICEMGMT)
    }

    pub fn media(&self) -> Result<Arc<ServiceInstance>> {
        self.service("media")
    }

    pub fn ptz(&self) -> Result<Arc<ServiceInstance>> {
        self.service("ptz")
    }

    pub fn imaging(&self) -> Result<Arc<ServiceInstance>> {
        self.service("imaging")
    }

    pub fn events(&self) -> Result<Arc<ServiceInstance>> {
        self.service(EVENTS)
    }

    pub fn analytics(&self) -> Result<Arc<ServiceInstance>> {
        self.service("analytics")
    }

    pub fn pullpoint(&self) -> Result<Arc<ServiceInstance>> {
        self.service(PULLPOINT)
    }

    /// Raw `GetCapabilities` result of the last discovery
    pub fn capabilities(&self) -> Value {
        self.registry.lock().capabilities.clone()
    }

    pub fn xaddrs(&self) -> XAddrTable {
        self.registry.lock().xaddrs.clone()
    }

    /// Whether the device advertised the logical service `name`
    pub fn supports(&self, name: &str) -> bool {
        match definition::lookup(name) {
            Some(d) if d.name == DEVICEMGMT => true,
            Some(d) => self.registry.lock().xaddrs.contains(d.namespace),
            None => false,
        }
    }

    pub fn host(&self) -> String {
        self.registry.lock().host.clone()
    }

    pub fn port(&self) -> u16 {
        self.registry.lock().port
    }

    pub fn credential(&self) -> Credential {
        self.registry.lock().credential.clone()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn templates(&self) -> &Arc<ServiceTemplates> {
        self.registry.templates()
    }
}
