//! Challenge-response authentication
//!
//! The miniserver hands out a per-connection challenge key (hex) via
//! `jdev/sys/getkey`. The client proves its credentials by sending
//! `HMAC-SHA1(key = hex-decode(challenge), message = "user:password")`,
//! hex-encoded lower-case.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{ClientError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Compute the authenticate digest for a challenge key.
pub fn auth_digest(challenge_hex: &str, user: &str, password: &str) -> Result<String> {
    let key = hex::decode(challenge_hex.trim())
        .map_err(|e| ClientError::InvalidChallengeKey(e.to_string()))?;
    let mut mac = HmacSha1::new_from_slice(&key)
        .map_err(|e| ClientError::InvalidChallengeKey(e.to_string()))?;
    mac.update(format!("{user}:{password}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
