//! # onvifclient - ONVIF device management client
//!
//! Orchestration layer above the SOAP transport of [`onvifsoap`]:
//!
//! - WS-Security `UsernameToken` generation, fresh for every call, with
//!   optional clock-offset correction ([`digest`], [`clock`])
//! - the table of logical ONVIF services and their WSDL contracts
//!   ([`definition`])
//! - XAddr discovery through `GetCapabilities` ([`discovery`])
//! - per-device service registry with process-wide templates so that a
//!   WSDL contract is parsed once per service ([`registry`])
//! - [`DeviceClient`], which ties everything together
//!
//! ## Example
//!
//! ```no_run
//! use onvifclient::{ClientOptions, DeviceClient};
//! use serde_json::json;
//!
//! let camera = DeviceClient::new("192.168.1.10", 80, "admin", "admin", "wsdl", ClientOptions::default())?;
//!
//! let info = camera.devicemgmt()?.invoke("GetDeviceInformation", &())?;
//! println!("{} {}", info["Manufacturer"], info["Model"]);
//!
//! let profiles = camera.media()?.invoke("GetProfiles", &())?;
//! camera.devicemgmt()?.invoke("SetHostname", &json!({ "Name": "cam-01" }))?;
//! # Ok::<(), onvifclient::OnvifError>(())
//! ```

pub mod clock;
mod credential;
pub mod definition;
pub mod device;
pub mod digest;
pub mod discovery;
mod errors;
mod options;
pub mod registry;
pub mod service;

pub use clock::Calibration;
pub use credential::Credential;
pub use definition::ServiceDescriptor;
pub use device::{DeviceClient, DeviceClientBuilder};
pub use digest::{build_token, compute_digest};
pub use discovery::{PullPointBootstrap, XAddrTable};
pub use errors::{ErrorKind, OnvifError, Result};
pub use options::ClientOptions;
pub use registry::{ServiceRegistry, ServiceTemplates};
pub use service::{Callback, ServiceInstance, to_mapping};
