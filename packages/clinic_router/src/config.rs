use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Unified config (figment-deserialized from defaults / clinic.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   clinic.toml:     [chatbot]
//                    nlu_timeout_ms = 5000
//
//   env var:         CLINIC_CHATBOT__NLU_TIMEOUT_MS=5000   (double underscore = nesting)
//
//   (single underscore stays within field names: CLINIC_AUTH__JWT_SECRET)

/// File name looked up inside the config directory.
pub const CONFIG_FILE_NAME: &str = "clinic.toml";

/// Named configuration presets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// host=127.0.0.1, token leeway=0
    Local,
    /// host=0.0.0.0, token leeway=30s
    Server,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub auth: AuthFileConfig,
    #[serde(default)]
    pub chatbot: ChatbotFileConfig,
}

/// Server tuning knobs (lives under `[server]` in clinic.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
    #[serde(default = "default_router_mailbox_capacity")]
    pub router_mailbox_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            send_channel_capacity: default_send_channel_capacity(),
            router_mailbox_capacity: default_router_mailbox_capacity(),
        }
    }
}

/// Token verification tunables (lives under `[auth]` in clinic.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthFileConfig {
    /// Must match the secret the CRUD login service signs with.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default)]
    pub leeway_secs: u64,
}

impl Default for AuthFileConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            leeway_secs: 0,
        }
    }
}

/// Chatbot gate and NLU gateway tunables (lives under `[chatbot]` in clinic.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatbotFileConfig {
    /// Case-insensitive substrings that require a logged-in participant.
    #[serde(default = "default_restricted_keywords")]
    pub restricted_keywords: Vec<String>,
    #[serde(default = "default_restricted_message")]
    pub restricted_message: String,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(default = "default_no_agent_message")]
    pub no_agent_message: String,
    #[serde(default = "default_handoff_ack_message")]
    pub handoff_ack_message: String,
    #[serde(default = "default_nlu_url")]
    pub nlu_url: String,
    #[serde(default = "default_nlu_timeout_ms")]
    pub nlu_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ChatbotFileConfig {
    fn default() -> Self {
        Self {
            restricted_keywords: default_restricted_keywords(),
            restricted_message: default_restricted_message(),
            fallback_message: default_fallback_message(),
            no_agent_message: default_no_agent_message(),
            handoff_ack_message: default_handoff_ack_message(),
            nlu_url: default_nlu_url(),
            nlu_timeout_ms: default_nlu_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_send_channel_capacity() -> usize {
    100
}
fn default_router_mailbox_capacity() -> usize {
    1024
}
fn default_jwt_secret() -> String {
    "your-secret-key".to_string()
}
fn default_nlu_url() -> String {
    "http://localhost:5005/webhooks/rest/webhook".to_string()
}
fn default_nlu_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_restricted_message() -> String {
    "🔒 Bạn cần đăng nhập để sử dụng tính năng này. Vui lòng đăng nhập để đặt lịch, tư vấn hoặc xem hồ sơ nhé!".to_string()
}
fn default_fallback_message() -> String {
    "Xin lỗi, trợ lý ảo tạm thời không phản hồi. Vui lòng thử lại sau ít phút.".to_string()
}
fn default_no_agent_message() -> String {
    "Hiện chưa có nhân viên hỗ trợ trực tuyến. Trợ lý ảo sẽ tiếp tục hỗ trợ bạn.".to_string()
}
fn default_handoff_ack_message() -> String {
    "Yêu cầu của bạn đã được chuyển đến nhân viên hỗ trợ. Vui lòng chờ trong giây lát.".to_string()
}

fn default_restricted_keywords() -> Vec<String> {
    [
        // booking
        "đặt lịch",
        "book",
        "appointment",
        "hẹn khám",
        "schedule",
        "lịch hẹn",
        "book_appointment",
        // consultation
        "tư vấn",
        "consultation",
        "consult",
        "advise",
        // examination
        "khám bệnh",
        "exam",
        "medical exam",
        "checkup",
        // own schedule
        "xem lịch",
        "view schedule",
        "my appointments",
        "lịch của tôi",
        "check appointment",
        // records
        "hồ sơ",
        "profile",
        "medical record",
        "health record",
        "bệnh án",
        "medical history",
        // prescriptions
        "đơn thuốc",
        "prescription",
        "my prescription",
        // results
        "kết quả",
        "test result",
        "xét nghiệm",
        // cancellation
        "hủy lịch",
        "cancel appointment",
        "cancel booking",
        // payment
        "thanh toán",
        "payment",
        "pay",
        "invoice",
        "hóa đơn",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Build a figment that layers: defaults → profile defaults → clinic.toml → CLINIC_* env vars.
///
/// A missing `config_file` is not an error. The CLI profile takes priority
/// over the config file profile.
///
/// Env vars use double-underscore for nesting into sections:
///   `CLINIC_SERVER__PORT=8080`  →  `server.port = 8080`
///   `CLINIC_AUTH__JWT_SECRET=s3cret`  →  `auth.jwt_secret = "s3cret"`
pub fn load_config(config_file: &Path, cli_profile: Option<&Profile>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    // Pass 1: peek at profile from clinic.toml/env (CLI overrides file)
    let base = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("CLINIC_").split("__"));

    let profile: Option<Profile> = cli_profile
        .cloned()
        .or_else(|| base.extract_inner("profile").ok());

    // Pass 2: rebuild with profile defaults between struct defaults and clinic.toml
    let profile_layer = profile_to_file_config(profile.as_ref());

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Serialized::defaults(profile_layer))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("CLINIC_").split("__"))
}

fn profile_to_file_config(profile: Option<&Profile>) -> FileConfig {
    match profile {
        Some(Profile::Local) => FileConfig {
            profile: Some(Profile::Local),
            server: ServerFileConfig {
                host: Some("127.0.0.1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
        Some(Profile::Server) => FileConfig {
            profile: Some(Profile::Server),
            server: ServerFileConfig {
                host: Some("0.0.0.0".to_string()),
                ..Default::default()
            },
            auth: AuthFileConfig {
                leeway_secs: 30,
                ..Default::default()
            },
            ..Default::default()
        },
        None => FileConfig::default(),
    }
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

/// Listener and per-connection settings (runtime view).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Outbound queue per connection; a full queue drops the message.
    pub send_channel_capacity: usize,
    /// Inbound queue of the router actor.
    pub router_mailbox_capacity: usize,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Result<Self> {
        let host = fc.host.as_deref().unwrap_or("0.0.0.0");
        let port = fc.port.unwrap_or(3000);
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server address {host}:{port}: {e}"))?;
        if fc.send_channel_capacity == 0 || fc.router_mailbox_capacity == 0 {
            bail!("server channel capacities must be greater than zero");
        }
        Ok(Self {
            bind_addr,
            send_channel_capacity: fc.send_channel_capacity,
            router_mailbox_capacity: fc.router_mailbox_capacity,
        })
    }
}

/// Token verification (runtime view).
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub leeway_secs: u64,
}

impl AuthConfig {
    pub fn from_file(fc: &AuthFileConfig) -> Result<Self> {
        if fc.jwt_secret.trim().is_empty() {
            bail!("auth.jwt_secret must not be empty");
        }
        Ok(Self {
            jwt_secret: fc.jwt_secret.clone(),
            leeway_secs: fc.leeway_secs,
        })
    }

    pub fn verifier(&self) -> clinic_auth::TokenVerifier {
        clinic_auth::TokenVerifier::new(&self.jwt_secret).with_leeway(self.leeway_secs)
    }
}

/// Chatbot gate and NLU gateway (runtime view).
#[derive(Clone, Debug)]
pub struct ChatbotConfig {
    pub restricted_keywords: Vec<String>,
    pub restricted_message: String,
    pub fallback_message: String,
    pub no_agent_message: String,
    pub handoff_ack_message: String,
    pub nlu_url: String,
    pub nlu_timeout: Duration,
    /// Reserved: the gateway makes exactly one attempt.
    pub max_retries: u32,
    /// Reserved: the gateway makes exactly one attempt.
    pub retry_delay: Duration,
}

impl ChatbotConfig {
    pub fn from_file(fc: &ChatbotFileConfig) -> Result<Self> {
        if fc.nlu_timeout_ms == 0 {
            bail!("chatbot.nlu_timeout_ms must be greater than zero");
        }
        let restricted_keywords: Vec<String> = fc
            .restricted_keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Ok(Self {
            restricted_keywords,
            restricted_message: fc.restricted_message.clone(),
            fallback_message: fc.fallback_message.clone(),
            no_agent_message: fc.no_agent_message.clone(),
            handoff_ack_message: fc.handoff_ack_message.clone(),
            nlu_url: fc.nlu_url.clone(),
            nlu_timeout: Duration::from_millis(fc.nlu_timeout_ms),
            max_retries: fc.max_retries,
            retry_delay: Duration::from_millis(fc.retry_delay_ms),
        })
    }

    /// True when the reserved retry knobs were set to something that would
    /// matter if retries existed.
    pub fn has_reserved_retry_settings(&self) -> bool {
        self.max_retries > 0 && !self.retry_delay.is_zero()
    }
}

/// Fully resolved configuration.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub chatbot: ChatbotConfig,
}

impl RouterConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        Ok(Self {
            server: ServerConfig::from_file(&fc.server)?,
            auth: AuthConfig::from_file(&fc.auth)?,
            chatbot: ChatbotConfig::from_file(&fc.chatbot)?,
        })
    }
}
