//! Application configuration loaded from environment variables.

use std::env;

/// Which document store backs profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStoreKind {
    /// Cloud Firestore (or its emulator)
    Firestore,
    /// Process memory; profiles vanish on exit
    Memory,
}

impl std::str::FromStr for ProfileStoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("PROFILE_STORE", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Firebase Web API key (public, identifies the project to Identity Toolkit)
    pub firebase_api_key: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Country code prepended to bare 10-digit phone numbers
    pub phone_default_country_code: String,
    /// Redirect URI registered for OAuth sign-in
    pub oauth_request_uri: String,
    pub profile_store: ProfileStoreKind,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            firebase_api_key: "test_api_key".to_string(),
            gcp_project_id: "test-project".to_string(),
            phone_default_country_code: "1".to_string(),
            oauth_request_uri: "http://localhost".to_string(),
            profile_store: ProfileStoreKind::Memory,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let phone_default_country_code = env::var("PHONE_DEFAULT_COUNTRY_CODE")
            .map(|v| v.trim().trim_start_matches('+').to_string())
            .unwrap_or_else(|_| "1".to_string());
        if phone_default_country_code.is_empty()
            || !phone_default_country_code
                .chars()
                .all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::Invalid(
                "PHONE_DEFAULT_COUNTRY_CODE",
                phone_default_country_code,
            ));
        }

        Ok(Self {
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FIREBASE_API_KEY"))?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            phone_default_country_code,
            oauth_request_uri: env::var("OAUTH_REQUEST_URI")
                .unwrap_or_else(|_| "http://localhost".to_string()),
            profile_store: env::var("PROFILE_STORE")
                .unwrap_or_else(|_| "firestore".to_string())
                .parse()?,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("FIREBASE_API_KEY", "test_key");
        env::set_var("PHONE_DEFAULT_COUNTRY_CODE", "+91");
        env::set_var("PROFILE_STORE", "memory");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.firebase_api_key, "test_key");
        assert_eq!(config.phone_default_country_code, "91");
        assert_eq!(config.profile_store, ProfileStoreKind::Memory);
        assert_eq!(config.oauth_request_uri, "http://localhost");
    }

    #[test]
    fn test_profile_store_kind_parse() {
        assert_eq!(
            "Firestore".parse::<ProfileStoreKind>().unwrap(),
            ProfileStoreKind::Firestore
        );
        assert!("sqlite".parse::<ProfileStoreKind>().is_err());
    }
}
