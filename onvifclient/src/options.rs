use std::path::PathBuf;
use std::time::Duration;

use onvifconfig::Config;
use onvifsoap::TransportOptions;

/// Behavior switches of a [`DeviceClient`](crate::DeviceClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Send password digests instead of plaintext passwords
    pub digest: bool,
    pub cache_location: Option<PathBuf>,
    pub cache_duration_days: Option<u32>,
    pub disable_cache: bool,
    /// Measure the device clock offset right after connecting
    pub adjust_clock: bool,
    /// Run every call on a background thread
    pub daemon: bool,
    /// Try to create a pull-point subscription during discovery
    pub pullpoint: bool,
    pub http_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            digest: true,
            cache_location: None,
            cache_duration_days: None,
            disable_cache: false,
            adjust_clock: false,
            daemon: false,
            pullpoint: true,
            http_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every client option from the configuration file
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let timeout = config.get_http_timeout_secs()?;
        Ok(Self {
            digest: config.get_digest()?,
            cache_location: config.get_cache_location()?,
            cache_duration_days: config.get_cache_duration_days()?,
            disable_cache: config.get_disable_cache()?,
            adjust_clock: config.get_adjust_clock()?,
            daemon: config.get_daemon()?,
            pullpoint: config.get_pullpoint()?,
            http_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
        })
    }

    pub fn digest(mut self, digest: bool) -> Self {
        self.digest = digest;
        self
    }

    pub fn cache_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.cache_location = Some(location.into());
        self
    }

    pub fn cache_duration_days(mut self, days: u32) -> Self {
        self.cache_duration_days = Some(days);
        self
    }

    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.disable_cache = disable;
        self
    }

    pub fn adjust_clock(mut self, adjust: bool) -> Self {
        self.adjust_clock = adjust;
        self
    }

    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn pullpoint(mut self, pullpoint: bool) -> Self {
        self.pullpoint = pullpoint;
        self
    }

    pub fn http_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            cache_location: self.cache_location.clone(),
            cache_duration_days: self.cache_duration_days,
            disable_cache: self.disable_cache,
            timeout: self.http_timeout,
        }
    }
}
