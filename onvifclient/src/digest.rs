//! WS-Security `UsernameToken` generation
//!
//! A token is single use: every call gets a fresh random nonce and a fresh
//! creation timestamp. With digest authentication the password is replaced by
//! `base64(SHA1(nonce ‖ created ‖ password))`, and the timestamp is shifted by
//! the clock offset measured against the device so that it falls inside the
//! device's replay window.

use std::sync::atomic::{AtomicI64, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, TimeDelta, Utc};
use onvifsoap::{PasswordType, UsernameToken};
use sha1::{Digest, Sha1};

/// `wsu:Created` format: UTC with millisecond resolution
pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub const NONCE_LEN: usize = 16;

/// How far `created` may run ahead of the local clock to stay unique
pub const MAX_LEAD_MS: i64 = 500;

static LAST_CREATED_MS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Next `created` value after `last`, at `now_ms`.
///
/// Strictly increasing while fewer than one token per millisecond is
/// issued; under a heavier burst the value stays capped at
/// `now_ms + MAX_LEAD_MS` and uniqueness rests on the nonce alone.
fn next_created_ms(last: i64, now_ms: i64) -> i64 {
    now_ms
        .max(last.saturating_add(1))
        .min(now_ms.saturating_add(MAX_LEAD_MS))
}

/// Current time, strictly increasing across the process at millisecond
/// resolution so that two tokens never share a timestamp.
fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now();
    let now_ms = now.timestamp_millis();
    let previous = LAST_CREATED_MS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(next_created_ms(last, now_ms))
        })
        .unwrap_or(now_ms);
    DateTime::from_timestamp_millis(next_created_ms(previous, now_ms)).unwrap_or(now)
}

/// `base64(SHA1(nonce ‖ created ‖ password))`
pub fn compute_digest(nonce: &[u8], created: &str, password: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(nonce);
    sha.update(created.as_bytes());
    sha.update(password.as_bytes());
    BASE64.encode(sha.finalize())
}

/// Builds a token from fixed inputs.
pub fn build_token_at(
    username: &str,
    password: &str,
    digest: bool,
    created: DateTime<Utc>,
    nonce: &[u8],
) -> UsernameToken {
    let created = created.format(CREATED_FORMAT).to_string();
    let (password, password_type) = if digest {
        (compute_digest(nonce, &created, password), PasswordType::Digest)
    } else {
        (password.to_string(), PasswordType::Text)
    };

    UsernameToken {
        username: username.to_string(),
        password,
        password_type,
        nonce: BASE64.encode(nonce),
        created,
    }
}

/// Builds a fresh token for one call.
///
/// The clock offset only applies to digest tokens; an absent offset means
/// the local clock is trusted.
pub fn build_token(
    username: &str,
    password: &str,
    digest: bool,
    clock_offset: Option<TimeDelta>,
) -> UsernameToken {
    let nonce: [u8; NONCE_LEN] = rand::random();
    let mut created = monotonic_now();
    if digest {
        if let Some(offset) = clock_offset {
            created = created.checked_add_signed(offset).unwrap_or(created);
        }
    }
    build_token_at(username, password, digest, created, &nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn parse_created(created: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(created, CREATED_FORMAT)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn digest_is_deterministic_for_fixed_inputs() {
        let nonce = BASE64.decode("LKqI6G/AikKCQrN0zqZFlg==").unwrap();
        let a = compute_digest(&nonce, "2010-09-16T07:50:45Z", "userpassword");
        let b = compute_digest(&nonce, "2010-09-16T07:50:45Z", "userpassword");
        assert_eq!(a, b);
        // Reference value from the WS-Security username token profile
        assert_eq!(a, "tuOSpGlFlIXsozq4HFNeeGeFLEI=");

        assert_ne!(a, compute_digest(&nonce, "2010-09-16T07:50:46Z", "userpassword"));
    }

    #[test]
    fn fixed_inputs_produce_a_complete_digest_token() {
        let created = parse_created("2024-03-01T12:00:00.250Z");
        let token = build_token_at("admin", "admin", true, created, &[7u8; NONCE_LEN]);

        assert_eq!(token.created, "2024-03-01T12:00:00.250Z");
        assert_eq!(token.password_type, PasswordType::Digest);
        assert_eq!(token.nonce, BASE64.encode([7u8; NONCE_LEN]));
        assert_eq!(
            token.password,
            compute_digest(&[7u8; NONCE_LEN], "2024-03-01T12:00:00.250Z", "admin")
        );
    }

    #[test]
    fn plaintext_tokens_keep_the_password() {
        let token = build_token("admin", "secret", false, Some(TimeDelta::hours(3)));
        assert_eq!(token.password, "secret");
        assert_eq!(token.password_type, PasswordType::Text);
        assert_eq!(BASE64.decode(&token.nonce).unwrap().len(), NONCE_LEN);

        // Offset is ignored without digest
        let skew = (parse_created(&token.created) - Utc::now()).abs();
        assert!(skew < TimeDelta::seconds(5));
    }

    #[test]
    fn clock_offset_shifts_created() {
        let offset = TimeDelta::seconds(3600);
        let token = build_token("admin", "admin", true, Some(offset));
        let delta = parse_created(&token.created) - Utc::now();
        assert!((delta - offset).abs() < TimeDelta::seconds(5));

        let token = build_token("admin", "admin", true, None);
        let delta = parse_created(&token.created) - Utc::now();
        assert!(delta.abs() < TimeDelta::seconds(5));
    }

    #[test]
    fn created_lead_over_the_clock_is_capped() {
        let now = 1_700_000_000_000;
        assert_eq!(next_created_ms(i64::MIN, now), now);
        assert_eq!(next_created_ms(now - 10, now), now);
        assert_eq!(next_created_ms(now, now), now + 1);
        assert_eq!(next_created_ms(now + 100, now), now + 101);
        assert_eq!(next_created_ms(now + MAX_LEAD_MS, now), now + MAX_LEAD_MS);
        assert_eq!(next_created_ms(now + 60_000, now), now + MAX_LEAD_MS);
    }

    #[test]
    fn consecutive_tokens_never_repeat() {
        let a = build_token("admin", "admin", true, None);
        let b = build_token("admin", "admin", true, None);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.created, b.created);
        assert!(parse_created(&a.created) < parse_created(&b.created));
        assert_ne!(a.password, b.password);
    }
}
