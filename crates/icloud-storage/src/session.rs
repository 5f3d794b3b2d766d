//! Session record.

use serde::{Deserialize, Serialize};

/// Credentials that tie successive requests to one server-side session.
///
/// Serialized as flat JSON with the same keys the service uses for the
/// matching response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Stable client identifier, generated once and reused forever.
    #[serde(rename = "ClientID", default)]
    pub client_id: String,
    #[serde(rename = "AccountCountry", default)]
    pub account_country: String,
    #[serde(rename = "SessionID", default)]
    pub session_id: String,
    #[serde(rename = "SessionToken", default)]
    pub session_token: String,
    #[serde(rename = "TrustToken", default)]
    pub trust_token: String,
    /// Continuation token echoed back on auth requests.
    #[serde(rename = "SCnt", default)]
    pub scnt: String,
}

impl SessionData {
    /// Create an empty session with a freshly generated client id.
    pub fn new() -> Self {
        let mut session = Self::default();
        session.ensure_client_id();
        session
    }

    /// Generate a client id if none is set. Returns true if one was generated.
    pub fn ensure_client_id(&mut self) -> bool {
        if !self.client_id.is_empty() {
            return false;
        }
        self.client_id = format!("auth-{}", uuid::Uuid::new_v4().hyphenated());
        true
    }

    /// Whether a session token from a previous login is available.
    pub fn has_session_token(&self) -> bool {
        !self.session_token.is_empty()
    }

    /// Trust tokens to present on credential sign-in.
    pub fn trust_tokens(&self) -> Vec<String> {
        if self.trust_token.is_empty() {
            Vec::new()
        } else {
            vec![self.trust_token.clone()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_lowercase_client_id() {
        let session = SessionData::new();
        assert!(session.client_id.starts_with("auth-"));
        assert_eq!(session.client_id, session.client_id.to_lowercase());
        assert_eq!(session.client_id.len(), "auth-".len() + 36);
    }

    #[test]
    fn test_ensure_client_id_keeps_existing() {
        let mut session = SessionData {
            client_id: "auth-fixed".to_string(),
            ..Default::default()
        };
        assert!(!session.ensure_client_id());
        assert_eq!(session.client_id, "auth-fixed");
    }

    #[test]
    fn test_serialized_keys() {
        let session = SessionData {
            client_id: "auth-1".to_string(),
            account_country: "USA".to_string(),
            session_id: "sid".to_string(),
            session_token: "tok".to_string(),
            trust_token: "trust".to_string(),
            scnt: "scnt".to_string(),
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["ClientID"], "auth-1");
        assert_eq!(value["AccountCountry"], "USA");
        assert_eq!(value["SessionID"], "sid");
        assert_eq!(value["SessionToken"], "tok");
        assert_eq!(value["TrustToken"], "trust");
        assert_eq!(value["SCnt"], "scnt");
    }

    #[test]
    fn test_missing_keys_default_to_empty() {
        let session: SessionData = serde_json::from_str(r#"{"ClientID":"auth-x"}"#).unwrap();
        assert_eq!(session.client_id, "auth-x");
        assert!(!session.has_session_token());
        assert!(session.trust_tokens().is_empty());
    }
}
