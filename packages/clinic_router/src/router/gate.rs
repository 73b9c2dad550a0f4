//! Access-control gate in front of the NLU service.
//!
//! A coarse keyword filter: an unauthenticated participant whose message
//! mentions a restricted capability (booking, records, prescriptions,
//! payment, ...) gets a fixed refusal instead of a bot answer. It produces
//! false positives on purpose and is a deliberate simplification, not the
//! last line of security; the CRUD endpoints enforce their own authorization.

use tracing::debug;

/// Outcome of evaluating one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Refuse { keyword: String },
}

/// Classifies chat text for a given authentication state.
///
/// The keyword scan is one implementation; an intent classifier can stand in
/// without changing callers.
pub trait ContentPolicy: Send + Sync {
    fn evaluate(&self, text: &str, authenticated: bool) -> GateDecision;

    /// Text sent back when a message is refused.
    fn refusal_message(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct KeywordGate {
    /// Lowercased.
    keywords: Vec<String>,
    refusal: String,
}

impl KeywordGate {
    pub fn new<I, S>(keywords: I, refusal: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keywords,
            refusal: refusal.into(),
        }
    }

    /// First restricted keyword contained in `text`, case-insensitively.
    pub fn matched_keyword(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
    }
}

impl ContentPolicy for KeywordGate {
    fn evaluate(&self, text: &str, authenticated: bool) -> GateDecision {
        if authenticated {
            return GateDecision::Allow;
        }
        match self.matched_keyword(text) {
            Some(keyword) => {
                debug!(keyword, "restricted keyword for unauthenticated participant");
                GateDecision::Refuse {
                    keyword: keyword.to_string(),
                }
            }
            None => GateDecision::Allow,
        }
    }

    fn refusal_message(&self) -> &str {
        &self.refusal
    }
}
