//! Logical ONVIF services and the WSDL contract describing each of them

/// One logical service: its XML namespace and WSDL file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub namespace: &'static str,
    pub wsdl: &'static str,
}

pub const DEVICEMGMT: &str = "devicemgmt";
pub const EVENTS: &str = "events";
pub const PULLPOINT: &str = "pullpoint";

/// Path of the device management service, the only XAddr known in advance
pub const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

pub static SERVICES: &[ServiceDescriptor] = &[
    ServiceDescriptor {
        name: DEVICEMGMT,
        namespace: "http://www.onvif.org/ver10/device/wsdl",
        wsdl: "devicemgmt.wsdl",
    },
    ServiceDescriptor {
        name: "media",
        namespace: "http://www.onvif.org/ver10/media/wsdl",
        wsdl: "media.wsdl",
    },
    ServiceDescriptor {
        name: "ptz",
        namespace: "http://www.onvif.org/ver20/ptz/wsdl",
        wsdl: "ptz.wsdl",
    },
    ServiceDescriptor {
        name: "imaging",
        namespace: "http://www.onvif.org/ver20/imaging/wsdl",
        wsdl: "imaging.wsdl",
    },
    ServiceDescriptor {
        name: "deviceio",
        namespace: "http://www.onvif.org/ver10/deviceIO/wsdl",
        wsdl: "deviceio.wsdl",
    },
    ServiceDescriptor {
        name: EVENTS,
        namespace: "http://www.onvif.org/ver10/events/wsdl",
        wsdl: "events.wsdl",
    },
    ServiceDescriptor {
        name: PULLPOINT,
        namespace: "http://www.onvif.org/ver10/events/wsdl/PullPointSubscription",
        wsdl: "events.wsdl",
    },
    ServiceDescriptor {
        name: "analytics",
        namespace: "http://www.onvif.org/ver20/analytics/wsdl",
        wsdl: "analytics.wsdl",
    },
    ServiceDescriptor {
        name: "recording",
        namespace: "http://www.onvif.org/ver10/recording/wsdl",
        wsdl: "recording.wsdl",
    },
    ServiceDescriptor {
        name: "search",
        namespace: "http://www.onvif.org/ver10/search/wsdl",
        wsdl: "search.wsdl",
    },
    ServiceDescriptor {
        name: "replay",
        namespace: "http://www.onvif.org/ver10/replay/wsdl",
        wsdl: "replay.wsdl",
    },
    ServiceDescriptor {
        name: "receiver",
        namespace: "http://www.onvif.org/ver10/receiver/wsdl",
        wsdl: "receiver.wsdl",
    },
];

/// Case-insensitive lookup by logical name or capability category
pub fn lookup(name: &str) -> Option<&'static ServiceDescriptor> {
    SERVICES.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

pub fn by_namespace(namespace: &str) -> Option<&'static ServiceDescriptor> {
    SERVICES.iter().find(|s| s.namespace == namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_and_namespaces_are_unique() {
        let names: HashSet<_> = SERVICES.iter().map(|s| s.name).collect();
        let namespaces: HashSet<_> = SERVICES.iter().map(|s| s.namespace).collect();
        assert_eq!(names.len(), SERVICES.len());
        assert_eq!(namespaces.len(), SERVICES.len());
    }

    #[test]
    fn capability_categories_resolve_case_insensitively() {
        assert_eq!(lookup("PTZ").unwrap().namespace, "http://www.onvif.org/ver20/ptz/wsdl");
        assert_eq!(lookup("Media").unwrap().wsdl, "media.wsdl");
        assert_eq!(lookup("DeviceIO").unwrap().name, "deviceio");
        assert!(lookup("AnalyticsDevice").is_none());
        assert_eq!(
            by_namespace("http://www.onvif.org/ver10/events/wsdl/PullPointSubscription")
                .unwrap()
                .wsdl,
            "events.wsdl"
        );
    }
}
