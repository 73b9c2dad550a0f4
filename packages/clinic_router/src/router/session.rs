//! Per-participant authentication state and NLU conversation ids.

use std::collections::HashMap;

use clinic_auth::{Claims, TokenVerifier};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::ParticipantId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub authenticated: bool,
    pub claims: Option<Claims>,
}

impl SessionState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(claims: Claims) -> Self {
        Self {
            authenticated: true,
            claims: Some(claims),
        }
    }
}

/// Turn an optional bearer token into a session.
///
/// Verification failures never surface as errors: the participant is simply
/// unauthenticated and only the error code is logged. A valid token issued
/// for a different user does not authenticate `participant`.
pub fn authenticate(
    verifier: &TokenVerifier,
    participant: &str,
    token: Option<&str>,
) -> SessionState {
    match verifier.verify_optional(token) {
        Ok(Some(claims)) if claims.user_id != participant => {
            info!(
                participant = %participant,
                "token subject does not match participant, continuing unauthenticated"
            );
            SessionState::anonymous()
        }
        Ok(Some(claims)) => {
            debug!(participant = %participant, role = %claims.role, "token verified");
            SessionState::authenticated(claims)
        }
        Ok(None) => SessionState::anonymous(),
        Err(e) => {
            info!(
                participant = %participant,
                error_code = e.error_code(),
                "token rejected, continuing unauthenticated"
            );
            SessionState::anonymous()
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<ParticipantId, SessionState>,
    conversations: HashMap<ParticipantId, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_session(&mut self, id: &str, state: SessionState) {
        self.sessions.insert(id.to_string(), state);
    }

    /// Unknown participants read as unauthenticated.
    pub fn get_session(&self, id: &str) -> SessionState {
        self.sessions.get(id).cloned().unwrap_or_default()
    }

    pub fn is_authenticated(&self, id: &str) -> bool {
        self.sessions.get(id).is_some_and(|s| s.authenticated)
    }

    /// External conversation id, created on first use and stable until
    /// the participant is removed.
    pub fn conversation_id(&mut self, id: &str) -> String {
        self.conversations
            .entry(id.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    pub fn remove(&mut self, id: &str) {
        self.sessions.remove(id);
        self.conversations.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_auth::Role;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new("test-secret")
    }

    #[test]
    fn test_valid_token_authenticates() {
        let v = verifier();
        let token = v.issue("BN0001", "an.nguyen", Role::Patient, 3600).unwrap();
        let state = authenticate(&v, "BN0001", Some(&token));
        assert!(state.authenticated);
        assert_eq!(state.claims.unwrap().user_id, "BN0001");
    }

    #[test]
    fn test_bad_tokens_are_anonymous() {
        let v = verifier();
        let foreign = TokenVerifier::new("other-secret")
            .issue("BN0001", "an.nguyen", Role::Patient, 3600)
            .unwrap();
        let expired = v.issue("BN0001", "an.nguyen", Role::Patient, -120).unwrap();

        let tokens = [
            Some(foreign.as_str()),
            Some(expired.as_str()),
            Some("garbage"),
            Some(""),
            None,
        ];
        for token in tokens {
            let state = authenticate(&v, "BN0001", token);
            assert_eq!(state, SessionState::anonymous());
        }
    }

    #[test]
    fn test_token_for_other_user_is_anonymous() {
        let v = verifier();
        let token = v.issue("BN0002", "binh.tran", Role::Patient, 3600).unwrap();
        assert!(!authenticate(&v, "BN0001", Some(&token)).authenticated);
    }

    #[test]
    fn test_unknown_participant_is_unauthenticated() {
        let store = SessionStore::new();
        assert!(!store.get_session("g-1").authenticated);
        assert!(!store.is_authenticated("g-1"));
    }

    #[test]
    fn test_update_in_place() {
        let v = verifier();
        let mut store = SessionStore::new();
        store.set_session("BN0001", SessionState::anonymous());
        assert!(!store.is_authenticated("BN0001"));

        let token = v.issue("BN0001", "an.nguyen", Role::Patient, 3600).unwrap();
        store.set_session("BN0001", authenticate(&v, "BN0001", Some(&token)));
        assert!(store.is_authenticated("BN0001"));

        store.set_session("BN0001", authenticate(&v, "BN0001", None));
        assert!(!store.is_authenticated("BN0001"));
    }

    #[test]
    fn test_conversation_id_is_stable_until_removed() {
        let mut store = SessionStore::new();
        let first = store.conversation_id("BN0001");
        assert_eq!(store.conversation_id("BN0001"), first);
        assert_ne!(store.conversation_id("BN0002"), first);
        assert_ne!(first, "BN0001");

        store.remove("BN0001");
        assert_ne!(store.conversation_id("BN0001"), first);
    }
}
