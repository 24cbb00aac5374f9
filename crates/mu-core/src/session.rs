use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{MuError, MuResult};

/// A session as issued by the remote service.
///
/// Sessions are never patched in place: every status/login resolution
/// replaces the whole value, and logout/disconnect clear it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_key: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub uid: String,
    /// Fields the service adds that the client does not interpret, such as
    /// `expires` or `sig`.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    pub fn new(session_key: impl Into<String>, secret: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            secret: secret.into(),
            uid: uid.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn from_json(json: &str) -> MuResult<Self> {
        let session: Session = serde_json::from_str(json)?;
        if session.session_key.is_empty() {
            return Err(MuError::InvalidSession("empty session_key".into()));
        }
        Ok(session)
    }

    /// Parse the `session` field of a handoff message; any failure yields no session.
    pub fn from_handoff(field: Option<&str>) -> Option<Self> {
        let json = field?;
        match Self::from_json(json) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!("discarding handoff session: {e}");
                None
            }
        }
    }

    pub fn to_json(&self) -> MuResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Uid {
        Str(String),
        Num(serde_json::Number),
    }

    Ok(match Uid::deserialize(deserializer)? {
        Uid::Str(s) => s,
        Uid::Num(n) => n.to_string(),
    })
}
