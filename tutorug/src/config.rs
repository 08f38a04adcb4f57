//! Configuration for the TutorUG service
//!
//! CLI arguments with environment variable fallbacks, using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// TutorUG - subscriptions, billing, reputation and AI tutoring for
/// Ugandan O-Level students
#[derive(Parser, Debug, Clone)]
#[command(name = "tutorug")]
#[command(about = "TutorUG learning platform backend")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallbacks, relaxed secrets)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "tutorug")]
    pub mongodb_db: String,

    /// JWT secret shared with the login service (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// YAML file overriding the default points configuration
    #[arg(long, env = "POINTS_CONFIG")]
    pub points_config: Option<PathBuf>,

    /// Free trial length in days
    #[arg(long, env = "TRIAL_DAYS", default_value = "7")]
    pub trial_days: i64,

    /// Flutterwave secret key
    #[arg(long, env = "FLUTTERWAVE_SECRET_KEY")]
    pub flutterwave_secret_key: Option<String>,

    /// Flutterwave API base URL override
    #[arg(long, env = "FLUTTERWAVE_BASE_URL")]
    pub flutterwave_base_url: Option<String>,

    /// Flutterwave webhook secret hash (webhooks are refused without it)
    #[arg(long, env = "FLUTTERWAVE_SECRET_HASH")]
    pub flutterwave_secret_hash: Option<String>,

    /// Where the payment page sends the user after checkout
    #[arg(
        long,
        env = "PAYMENT_REDIRECT_URL",
        default_value = "http://localhost:3000/payment/success"
    )]
    pub payment_redirect_url: String,

    /// Africa's Talking username ("sandbox" for the sandbox)
    #[arg(long, env = "AFRICASTALKING_USERNAME", default_value = "sandbox")]
    pub africastalking_username: String,

    /// Africa's Talking API key (SMS disabled when unset)
    #[arg(long, env = "AFRICASTALKING_API_KEY")]
    pub africastalking_api_key: Option<String>,

    /// SMS sender ID
    #[arg(long, env = "SMS_SENDER_ID")]
    pub sms_sender_id: Option<String>,

    /// SendGrid API key (email disabled when unset)
    #[arg(long, env = "SENDGRID_API_KEY")]
    pub sendgrid_api_key: Option<String>,

    /// From address for outgoing email
    #[arg(long, env = "FROM_EMAIL", default_value = "noreply@tutoruganda.com")]
    pub from_email: String,

    /// OpenAI API key (AI tutor disabled when unset, outside dev mode)
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Chat model
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Deadline for each LLM call in milliseconds
    #[arg(long, env = "LLM_TIMEOUT_MS", default_value = "30000")]
    pub llm_timeout_ms: u64,

    /// Seconds between subscription expiry sweeps
    #[arg(long, env = "SUBSCRIPTION_SWEEP_SECS", default_value = "21600")]
    pub subscription_sweep_secs: u64,

    /// Seconds between reminder sweeps
    #[arg(long, env = "REMINDER_SWEEP_SECS", default_value = "86400")]
    pub reminder_sweep_secs: u64,

    /// Maximum accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "65536")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub const MIN_JWT_SECRET_LEN: usize = 32;
const DEV_JWT_SECRET: &str = "dev-mode-secret-not-for-production-use-123456";

impl Args {
    /// Effective JWT secret (falls back to a fixed secret in dev mode).
    pub fn jwt_secret(&self) -> Result<String, String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok(DEV_JWT_SECRET.to_string()),
            (None, false) => Err("JWT_SECRET is required in production mode".to_string()),
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                Some(s) if s.len() < MIN_JWT_SECRET_LEN => {
                    return Err(format!(
                        "JWT_SECRET must be at least {} characters",
                        MIN_JWT_SECRET_LEN
                    ))
                }
                Some(_) => {}
            }
            if self.flutterwave_secret_key.is_none() {
                return Err("FLUTTERWAVE_SECRET_KEY is required in production mode".to_string());
            }
            if self.flutterwave_secret_hash.is_none() {
                return Err("FLUTTERWAVE_SECRET_HASH is required in production mode".to_string());
            }
        }

        if self.trial_days < 0 {
            return Err("TRIAL_DAYS must not be negative".to_string());
        }

        if self.subscription_sweep_secs == 0 || self.reminder_sweep_secs == 0 {
            return Err("sweep intervals must be greater than zero".to_string());
        }

        Ok(())
    }
}
