//! Officer credential checks

use crate::config::AdminConfig;
use crate::error::AppError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

/// Department-office-number, e.g. `MEITY-OFF-441`
static OFFICER_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]+-[A-Z]+-[0-9]+$").expect("officer id pattern is valid"));

#[derive(Debug, Clone)]
pub struct OfficerCredentials {
    pub officer_id: String,
    pub passcode: String,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Return the authenticated officer id, or `Unauthorized`
    async fn authenticate(&self, credentials: &OfficerCredentials) -> Result<String, AppError>;
}

/// Single officer with a shared passcode. Stands in for a real identity
/// provider; only the bcrypt hash of the passcode is kept in memory.
pub struct SharedSecretAuthenticator {
    officer_id: String,
    passcode_hash: String,
}

impl SharedSecretAuthenticator {
    pub fn new(officer_id: impl Into<String>, passcode: &str, cost: u32) -> Result<Self, AppError> {
        let officer_id = officer_id.into();
        if !OFFICER_ID_PATTERN.is_match(&officer_id) {
            return Err(AppError::Config(format!(
                "Configured officer id '{}' is not of the form DEPT-OFFICE-NUMBER",
                officer_id
            )));
        }

        let passcode_hash = bcrypt::hash(passcode, cost)
            .map_err(|e| AppError::Internal(format!("Failed to hash passcode: {}", e)))?;

        Ok(Self {
            officer_id,
            passcode_hash,
        })
    }

    pub fn from_config(config: &AdminConfig) -> Result<Self, AppError> {
        Self::new(config.officer_id.clone(), &config.passcode, config.bcrypt_cost)
    }
}

#[async_trait]
impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(&self, credentials: &OfficerCredentials) -> Result<String, AppError> {
        let officer_id = credentials.officer_id.trim();
        if !OFFICER_ID_PATTERN.is_match(officer_id) {
            return Err(AppError::Unauthorized("Malformed officer id".to_string()));
        }

        let passcode_ok = bcrypt::verify(&credentials.passcode, &self.passcode_hash)
            .map_err(|e| AppError::Internal(format!("Failed to verify passcode: {}", e)))?;

        if officer_id != self.officer_id || !passcode_ok {
            debug!("Rejected login for {}", officer_id);
            return Err(AppError::Unauthorized("Invalid officer credentials".to_string()));
        }

        info!("Officer {} authenticated", officer_id);
        Ok(officer_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn credentials(officer_id: &str, passcode: &str) -> OfficerCredentials {
        OfficerCredentials {
            officer_id: officer_id.to_string(),
            passcode: passcode.to_string(),
        }
    }

    fn authenticator() -> SharedSecretAuthenticator {
        SharedSecretAuthenticator::new("MEITY-OFF-441", "admin123", 4).unwrap()
    }

    #[tokio::test]
    async fn test_valid_login() {
        let officer = assert_ok!(
            authenticator()
                .authenticate(&credentials("MEITY-OFF-441", "admin123"))
                .await
        );
        assert_eq!(officer, "MEITY-OFF-441");
    }

    #[tokio::test]
    async fn test_rejected_logins() {
        let auth = authenticator();
        for (id, pass) in [
            ("MEITY-OFF-441", "wrong"),
            ("MEITY-OFF-442", "admin123"),
            ("meity-off-441", "admin123"),
            ("not an id", "admin123"),
        ] {
            let err = assert_err!(auth.authenticate(&credentials(id, pass)).await);
            assert!(matches!(err, AppError::Unauthorized(_)), "{} / {}", id, pass);
        }
    }

    #[test]
    fn test_configured_officer_id_must_be_well_formed() {
        assert!(matches!(
            SharedSecretAuthenticator::new("officer", "x", 4),
            Err(AppError::Config(_))
        ));
    }
}
