//! Request signing for REST calls.
//!
//! The signature is `md5(raw_sorted_params + secret)` in lowercase hex, where
//! `raw_sorted_params` is the unescaped, separator-less query encoding of
//! every parameter except `sig` itself.

use md5::{Digest, Md5};

use crate::query::{encode_with, Params};
use crate::session::Session;

/// Injects the standard call fields and signs parameter maps.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    api_key: Option<String>,
    api_version: String,
    last_call_id: u64,
}

impl RequestSigner {
    pub fn new(api_key: Option<String>, api_version: impl Into<String>) -> Self {
        Self {
            api_key,
            api_version: api_version.into(),
            last_call_id: 0,
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key;
    }

    /// Next call id: the clock in milliseconds, clamped so it never goes backwards.
    fn next_call_id(&mut self, now_ms: u64) -> u64 {
        self.last_call_id = self.last_call_id.max(now_ms);
        self.last_call_id
    }

    /// Sign `params` in place and hand them back.
    ///
    /// Caller-supplied values for the standard fields always win. With neither
    /// an explicit `secret` nor a `session`, no `sig` is added.
    pub fn sign<'a>(
        &mut self,
        params: &'a mut Params,
        secret: Option<&str>,
        session: Option<&Session>,
        now_ms: u64,
    ) -> &'a mut Params {
        let call_id = self.next_call_id(now_ms);
        self.merge_standard(params, call_id);

        // Session-specific fields only apply to implicit session signing.
        if secret.is_none() {
            if let Some(session) = session {
                params.set_default("session_key", session.session_key.clone());
                params.set_default("ss", "1");
            }
        }

        let key = secret.or(session.map(|s| s.secret.as_str()));
        if let Some(key) = key {
            params.remove("sig");
            let sig = signature(params, key);
            params.set("sig", sig);
        }

        params
    }

    fn merge_standard(&self, params: &mut Params, call_id: u64) {
        let mut standard = Params::new();
        standard.set_opt("api_key", self.api_key.clone());
        standard.set("call_id", call_id.to_string());
        standard.set("format", "json");
        standard.set("v", self.api_version.clone());
        params.merge_defaults(&standard);
    }
}

/// Compute the signature over `params` (excluding any existing `sig`) with `secret`.
pub fn signature(params: &Params, secret: &str) -> String {
    let mut unsigned = params.clone();
    unsigned.remove("sig");
    let mut hasher = Md5::new();
    hasher.update(encode_with(&unsigned, "", false).as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a signed parameter map against `secret`.
pub fn verify(params: &Params, secret: &str) -> bool {
    match params.get("sig") {
        Some(sig) => signature(params, secret) == sig,
        None => false,
    }
}
