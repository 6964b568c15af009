//! Service endpoint discovery through `GetCapabilities`

use std::collections::HashMap;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::definition::{self, PULLPOINT};
use crate::errors::Result;
use crate::service::ServiceInstance;

/// Endpoint URL of every service a device advertises, keyed by namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XAddrTable {
    entries: HashMap<String, String>,
}

impl XAddrTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str) -> Option<&str> {
        self.entries.get(namespace).map(String::as_str)
    }

    /// XAddr of a logical service name
    pub fn for_service(&self, name: &str) -> Option<&str> {
        definition::lookup(name).and_then(|d| self.get(d.namespace))
    }

    /// Returns the address previously registered for `namespace`
    pub fn insert(&mut self, namespace: &str, xaddr: &str) -> Option<String> {
        self.entries.insert(namespace.to_string(), xaddr.to_string())
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.entries.contains_key(namespace)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn collect_xaddrs(categories: &Map<String, Value>, table: &mut XAddrTable) {
    for (category, record) in categories {
        if category.starts_with('_') {
            continue;
        }
        if category.eq_ignore_ascii_case("Extension") {
            if let Some(extension) = record.as_object() {
                collect_xaddrs(extension, table);
            }
            continue;
        }

        let Some(descriptor) = definition::lookup(category) else {
            if category.eq_ignore_ascii_case("Device") {
                debug!("Device category ignored, device management has a fixed XAddr");
            } else {
                warn!(category = %category, "Skipping unknown capability category");
            }
            continue;
        };

        let xaddr = record
            .get("XAddr")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|x| !x.is_empty());
        match xaddr {
            Some(xaddr) => {
                debug!(service = descriptor.name, xaddr, "Service advertised");
                table.insert(descriptor.namespace, xaddr);
            }
            None => warn!(category = %category, "Capability without XAddr, skipped"),
        }
    }
}

/// Builds the XAddr table from a `GetCapabilities` result.
///
/// Categories are matched case-insensitively against the known services;
/// unknown ones and records without an XAddr are skipped.
pub fn xaddrs_from_capabilities(capabilities: &Value) -> XAddrTable {
    let mut table = XAddrTable::new();
    match capabilities.as_object() {
        Some(categories) => collect_xaddrs(categories, &mut table),
        None => warn!("GetCapabilities returned no capability record"),
    }
    table
}

/// Queries every capability of the device.
///
/// Returns the XAddr table and the raw capability mapping.
pub fn discover(devicemgmt: &ServiceInstance) -> Result<(XAddrTable, Value)> {
    let capabilities = devicemgmt.invoke("GetCapabilities", &json!({ "Category": "All" }))?;
    let table = xaddrs_from_capabilities(&capabilities);
    info!(
        xaddr = %devicemgmt.xaddr(),
        services = table.len(),
        "Discovered device services"
    );
    Ok((table, capabilities))
}

/// Outcome of the pull-point subscription attempt made after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullPointBootstrap {
    Registered { address: String },
    Skipped { reason: String },
}

/// `SubscriptionReference/Address` of a `CreatePullPointSubscription` result
pub fn subscription_address(response: &Value) -> Option<String> {
    let address = response.get("SubscriptionReference")?.get("Address")?;
    let address = match address {
        Value::Object(map) => map.get(onvifsoap::TEXT_KEY)?,
        other => other,
    };
    address
        .as_str()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

/// Creates a pull-point subscription on `events` and registers its address
/// under the pull-point namespace. Failures are reported, never raised.
pub fn bootstrap_pullpoint(events: &ServiceInstance, table: &mut XAddrTable) -> PullPointBootstrap {
    let response = match events.invoke("CreatePullPointSubscription", &()) {
        Ok(response) => response,
        Err(e) => {
            return PullPointBootstrap::Skipped {
                reason: e.to_string(),
            };
        }
    };

    let Some(address) = subscription_address(&response) else {
        return PullPointBootstrap::Skipped {
            reason: "no SubscriptionReference/Address in response".to_string(),
        };
    };

    let Some(descriptor) = definition::lookup(PULLPOINT) else {
        return PullPointBootstrap::Skipped {
            reason: "pull-point service is not defined".to_string(),
        };
    };
    if let Some(previous) = table.insert(descriptor.namespace, &address) {
        if previous != address {
            debug!(previous = %previous, address = %address, "Replacing pull-point subscription");
        }
    }
    PullPointBootstrap::Registered { address }
}
