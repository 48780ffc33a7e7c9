//! Signed session cookie codec.
//!
//! The session id is an opaque uuid; the cookie value is `id.sig` where
//! `sig` is an HMAC-SHA256 tag over the id, URL-safe base64. A cookie that
//! fails verification is treated as absent, never as an error.
//!
//! Key resolution: `VITRINE_COOKIE_KEY` env (base64) → `<data_dir>/cookie.key`
//! file → auto-generate.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use base64::Engine;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{error, info, warn};

use crate::paths;

const KEY_LEN: usize = 32;

/// Ensure the cookie signing key exists. Call at startup.
pub fn ensure_key() {
    if std::env::var("VITRINE_COOKIE_KEY").ok().is_some() {
        return;
    }

    let key_path = paths::cookie_key_path();
    if key_path.exists() {
        return;
    }

    let rng = SystemRandom::new();
    let mut key_bytes = [0u8; KEY_LEN];
    rng.fill(&mut key_bytes)
        .expect("failed to generate cookie key");

    if let Err(e) = std::fs::write(&key_path, key_bytes) {
        error!(
            component = "cookie",
            event = "cookie.key_write_failed",
            error = %e,
            "Failed to write cookie key file"
        );
        return;
    }

    info!(
        component = "cookie",
        event = "cookie.key_generated",
        path = %key_path.display(),
        "Generated cookie signing key"
    );
}

/// Load the signing key: env var first, then key file.
pub fn load_key() -> anyhow::Result<[u8; KEY_LEN]> {
    if let Ok(env_val) = std::env::var("VITRINE_COOKIE_KEY") {
        let trimmed = env_val.trim();
        if !trimmed.is_empty() {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(trimmed)
                .map_err(|e| anyhow::anyhow!("VITRINE_COOKIE_KEY is not valid base64: {e}"))?;
            if decoded.len() != KEY_LEN {
                anyhow::bail!(
                    "VITRINE_COOKIE_KEY has wrong length: {} (expected {KEY_LEN})",
                    decoded.len()
                );
            }
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&decoded);
            return Ok(key);
        }
    }

    let bytes = std::fs::read(paths::cookie_key_path())?;
    if bytes.len() != KEY_LEN {
        anyhow::bail!("cookie key file has wrong length: {}", bytes.len());
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Mints and verifies the signed session cookie.
#[derive(Clone)]
pub struct CookieCodec {
    key: hmac::Key,
    name: String,
    secure: bool,
    max_age_secs: u64,
}

impl CookieCodec {
    pub fn new(name: String, secure: bool, max_age_secs: u64, key_bytes: &[u8; KEY_LEN]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, key_bytes),
            name,
            secure,
            max_age_secs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie value for a session id: `id.sig`.
    pub fn sign(&self, session_id: &str) -> String {
        let tag = hmac::sign(&self.key, session_id.as_bytes());
        format!("{}.{}", session_id, BASE64.encode(tag.as_ref()))
    }

    /// Verify a cookie value and return the session id it carries.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (session_id, sig) = value.rsplit_once('.')?;
        let sig_bytes = BASE64.decode(sig).ok()?;
        match hmac::verify(&self.key, session_id.as_bytes(), &sig_bytes) {
            Ok(()) => Some(session_id.to_string()),
            Err(_) => {
                warn!(
                    component = "cookie",
                    event = "cookie.signature_mismatch",
                    "Session cookie failed signature verification"
                );
                None
            }
        }
    }

    /// Full `Set-Cookie` header value for a session id.
    pub fn set_header(&self, session_id: &str) -> String {
        let mut header = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name,
            self.sign(session_id),
            self.max_age_secs
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }

    /// `Set-Cookie` header value that clears the session cookie.
    pub fn clear_header(&self) -> String {
        format!("{}=; Path=/; HttpOnly; Max-Age=0", self.name)
    }

    /// Extract and verify the session id from request headers.
    pub fn session_id_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let raw = headers.get(COOKIE)?.to_str().ok()?;
        for pair in raw.split(';') {
            let Some((name, value)) = pair.trim().split_once('=') else {
                continue;
            };
            if name == self.name {
                return self.verify(value);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn codec() -> CookieCodec {
        CookieCodec::new("vitrine.sid".to_string(), false, 86_400, &[7u8; KEY_LEN])
    }

    #[test]
    fn sign_verify_roundtrip() {
        let codec = codec();
        let value = codec.sign("abc-123");
        assert_eq!(codec.verify(&value).as_deref(), Some("abc-123"));
    }

    #[test]
    fn tampered_cookie_verifies_as_absent() {
        let codec = codec();
        let value = codec.sign("abc-123");
        let forged = value.replace("abc-123", "abc-124");
        assert_eq!(codec.verify(&forged), None);
        assert_eq!(codec.verify("garbage"), None);
        assert_eq!(codec.verify(""), None);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let codec = codec();
        let other = CookieCodec::new("vitrine.sid".to_string(), false, 86_400, &[9u8; KEY_LEN]);
        let value = codec.sign("abc-123");
        assert_eq!(other.verify(&value), None);
    }

    #[test]
    fn extracts_session_id_from_cookie_header() {
        let codec = codec();
        let mut headers = HeaderMap::new();
        let raw = format!("theme=dark; vitrine.sid={}; lang=fr", codec.sign("s-9"));
        headers.insert(COOKIE, HeaderValue::from_str(&raw).unwrap());
        assert_eq!(
            codec.session_id_from_headers(&headers).as_deref(),
            Some("s-9")
        );

        let mut empty = HeaderMap::new();
        empty.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(codec.session_id_from_headers(&empty), None);
    }

    #[test]
    fn set_header_carries_attributes() {
        let codec = codec();
        let header = codec.set_header("s-1");
        assert!(header.starts_with("vitrine.sid=s-1."));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Max-Age=86400"));
        assert!(!header.contains("Secure"));
    }
}
