use chrono::TimeDelta;
use onvifsoap::UsernameToken;

use crate::digest::build_token;

/// Username/password pair of a device, with the authentication mode and the
/// clock offset measured against the device.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub digest: bool,
    pub clock_offset: Option<TimeDelta>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .field("digest", &self.digest)
            .field("clock_offset", &self.clock_offset)
            .finish()
    }
}

impl Credential {
    pub fn new(username: &str, password: &str, digest: bool) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            digest,
            clock_offset: None,
        }
    }

    /// A fresh token for one call, `None` when no username is configured
    pub fn token(&self) -> Option<UsernameToken> {
        if self.username.is_empty() {
            return None;
        }
        Some(build_token(
            &self.username,
            &self.password,
            self.digest,
            self.clock_offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_credentials_produce_no_token() {
        assert!(Credential::default().token().is_none());
        assert!(Credential::new("admin", "admin", true).token().is_some());
    }

    #[test]
    fn debug_output_hides_the_password() {
        let rendered = format!("{:?}", Credential::new("admin", "hunter2", true));
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
