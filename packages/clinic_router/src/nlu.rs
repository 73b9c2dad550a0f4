//! NLU gateway: forwards chat text to the external bot service.
//!
//! The service speaks the Rasa REST channel contract:
//! `POST {sender, message, metadata}` answered by a JSON array of bot messages.
//! Exactly one attempt is made per message, bounded by a timeout.

use std::time::Duration;

use async_trait::async_trait;
use clinic_auth::Claims;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ChatbotConfig;
use crate::ws::BotMessage;

#[derive(Debug, thiserror::Error)]
pub enum NluError {
    #[error("NLU service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("NLU transport error: {0}")]
    Transport(String),

    #[error("NLU service returned HTTP {0}")]
    Status(u16),

    #[error("NLU reply could not be decoded: {0}")]
    Decode(String),
}

/// One question for the bot.
#[derive(Debug, Clone)]
pub struct NluRequest {
    /// External conversation id; never the participant id.
    pub session_id: String,
    pub message: String,
    pub authenticated: bool,
    pub claims: Option<Claims>,
}

#[async_trait]
pub trait NluGateway: Send + Sync {
    async fn ask(&self, request: &NluRequest) -> Result<Vec<BotMessage>, NluError>;
}

/// Ask the gateway; any failure becomes the fallback message.
///
/// Returns the messages and whether the fallback was used.
pub async fn ask_or_fallback(
    gateway: &dyn NluGateway,
    request: &NluRequest,
    fallback: &str,
) -> (Vec<BotMessage>, bool) {
    match gateway.ask(request).await {
        Ok(messages) => (messages, false),
        Err(e) => {
            warn!(
                session_id = %request.session_id,
                error = %e,
                "NLU call failed, replying with fallback"
            );
            (vec![BotMessage::text(fallback)], true)
        }
    }
}

#[derive(Debug, Serialize)]
struct RasaMetadata<'a> {
    authenticated: bool,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct RasaRequest<'a> {
    sender: &'a str,
    message: &'a str,
    metadata: RasaMetadata<'a>,
}

impl<'a> From<&'a NluRequest> for RasaRequest<'a> {
    fn from(req: &'a NluRequest) -> Self {
        let claims = req.claims.as_ref();
        Self {
            sender: &req.session_id,
            message: &req.message,
            metadata: RasaMetadata {
                authenticated: req.authenticated,
                user_id: claims.map(|c| c.user_id.as_str()),
                username: claims.map(|c| c.username.as_str()),
                role: claims.map(|c| c.role.to_string()),
            },
        }
    }
}

/// HTTP client for a Rasa REST webhook.
#[derive(Debug, Clone)]
pub struct RasaGateway {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RasaGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ChatbotConfig) -> Self {
        Self::new(config.nlu_url.clone(), config.nlu_timeout)
    }

    async fn call(&self, request: &NluRequest) -> Result<Vec<BotMessage>, NluError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RasaRequest::from(request))
            .send()
            .await
            .map_err(|e| NluError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NluError::Status(status.as_u16()));
        }

        response
            .json::<Vec<BotMessage>>()
            .await
            .map_err(|e| NluError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NluGateway for RasaGateway {
    async fn ask(&self, request: &NluRequest) -> Result<Vec<BotMessage>, NluError> {
        debug!(
            session_id = %request.session_id,
            authenticated = request.authenticated,
            "asking NLU service"
        );
        tokio::time::timeout(self.timeout, self.call(request))
            .await
            .map_err(|_| NluError::Timeout(self.timeout))?
    }
}
