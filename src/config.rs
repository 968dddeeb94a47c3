//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Which analysis backend the pipeline talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Fixed scores behind artificial latency
    Simulated,
    /// Gemini generateContent API
    Gemini,
}

impl std::str::FromStr for AnalysisMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(AnalysisMode::Simulated),
            "gemini" => Ok(AnalysisMode::Gemini),
            other => Err(ConfigError::InvalidValue(format!(
                "ANALYSIS_MODE must be 'simulated' or 'gemini', got '{}'",
                other
            ))),
        }
    }
}

/// External analysis configuration
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub mode: AnalysisMode,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: Url,
    /// Upper bound for any single capability call
    pub timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Simulated,
            gemini_api_key: None,
            gemini_model: "gemini-3-pro-preview".to_string(),
            gemini_base_url: Url::parse("https://generativelanguage.googleapis.com/")
                .expect("static URL is valid"),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Verification pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub biometric_latency: Duration,
    pub behavior_latency: Duration,
    pub scoring_latency: Duration,
    pub max_document_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            biometric_latency: Duration::from_millis(2000),
            behavior_latency: Duration::from_millis(1500),
            scoring_latency: Duration::from_millis(2500),
            max_document_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Live session retention
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Untouched sessions are dropped after this long
    pub idle_ttl: Duration,
    /// Sessions that reached RESULT are dropped after this long
    pub result_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(15 * 60),
            result_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Outcome persistence and audit retention
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// JSON file backing the adjudication store; in-memory when unset
    pub outcome_path: Option<PathBuf>,
    /// Oldest audit entries are dropped beyond this many
    pub audit_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            outcome_path: None,
            audit_capacity: 10_000,
        }
    }
}

/// Officer gate configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub officer_id: String,
    pub passcode: String,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub bcrypt_cost: u32,
}

/// One week
pub const MAX_TOKEN_TTL_MINUTES: i64 = 7 * 24 * 60;

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            officer_id: "MEITY-OFF-441".to_string(),
            passcode: "admin123".to_string(),
            jwt_secret: "pramaan-dev-secret-change-in-production".to_string(),
            token_ttl_minutes: 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
    pub sessions: SessionConfig,
    pub storage: StorageConfig,
    pub admin: AdminConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            host: parse_or(&lookup, "HOST", ServerConfig::default().host)?,
            port: parse_or(&lookup, "PORT", ServerConfig::default().port)?,
        };

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let defaults = AnalysisConfig::default();
        let gemini_base_url = match lookup("GEMINI_BASE_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| {
                ConfigError::InvalidValue(format!("GEMINI_BASE_URL '{}': {}", raw, e))
            })?,
            None => defaults.gemini_base_url,
        };
        let analysis = AnalysisConfig {
            mode: parse_or(&lookup, "ANALYSIS_MODE", defaults.mode)?,
            gemini_api_key: lookup("GEMINI_API_KEY")
                .or_else(|| lookup("API_KEY"))
                .filter(|k| !k.trim().is_empty()),
            gemini_model: lookup("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url,
            timeout: Duration::from_secs(parse_or(&lookup, "ANALYSIS_TIMEOUT_SECS", 30u64)?),
        };

        if analysis.mode == AnalysisMode::Gemini && analysis.gemini_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "GEMINI_API_KEY (required when ANALYSIS_MODE=gemini)".to_string(),
            ));
        }
        if analysis.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "ANALYSIS_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let pipeline_defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            biometric_latency: Duration::from_millis(parse_or(
                &lookup,
                "BIOMETRIC_LATENCY_MS",
                pipeline_defaults.biometric_latency.as_millis() as u64,
            )?),
            behavior_latency: Duration::from_millis(parse_or(
                &lookup,
                "BEHAVIOR_LATENCY_MS",
                pipeline_defaults.behavior_latency.as_millis() as u64,
            )?),
            scoring_latency: Duration::from_millis(parse_or(
                &lookup,
                "SCORING_LATENCY_MS",
                pipeline_defaults.scoring_latency.as_millis() as u64,
            )?),
            max_document_bytes: parse_or(
                &lookup,
                "MAX_DOCUMENT_BYTES",
                pipeline_defaults.max_document_bytes,
            )?,
        };

        let session_defaults = SessionConfig::default();
        let sessions = SessionConfig {
            idle_ttl: Duration::from_secs(parse_or(
                &lookup,
                "SESSION_IDLE_TTL_SECS",
                session_defaults.idle_ttl.as_secs(),
            )?),
            result_ttl: Duration::from_secs(parse_or(
                &lookup,
                "SESSION_RESULT_TTL_SECS",
                session_defaults.result_ttl.as_secs(),
            )?),
        };

        let storage = StorageConfig {
            outcome_path: lookup("OUTCOME_STORE_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            audit_capacity: parse_or(
                &lookup,
                "AUDIT_LOG_CAPACITY",
                StorageConfig::default().audit_capacity,
            )?,
        };

        if storage.audit_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "AUDIT_LOG_CAPACITY must be greater than zero".to_string(),
            ));
        }

        let admin_defaults = AdminConfig::default();
        let admin = AdminConfig {
            officer_id: lookup("OFFICER_ID").unwrap_or(admin_defaults.officer_id),
            passcode: lookup("ADMIN_PASSCODE").unwrap_or(admin_defaults.passcode),
            jwt_secret: lookup("JWT_SECRET").unwrap_or(admin_defaults.jwt_secret),
            token_ttl_minutes: parse_or(
                &lookup,
                "TOKEN_TTL_MINUTES",
                admin_defaults.token_ttl_minutes,
            )?,
            bcrypt_cost: parse_or(&lookup, "BCRYPT_COST", admin_defaults.bcrypt_cost)?,
        };

        if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&admin.token_ttl_minutes) {
            return Err(ConfigError::InvalidValue(format!(
                "TOKEN_TTL_MINUTES must be between 1 and {}",
                MAX_TOKEN_TTL_MINUTES
            )));
        }

        Ok(Self {
            server,
            cors,
            analysis,
            pipeline,
            sessions,
            storage,
            admin,
        })
    }

    /// True when the officer gate still runs on the shipped demo secrets
    pub fn uses_default_secrets(&self) -> bool {
        let defaults = AdminConfig::default();
        self.admin.passcode == defaults.passcode || self.admin.jwt_secret == defaults.jwt_secret
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}='{}'", key, raw))),
        None => Ok(default),
    }
}
