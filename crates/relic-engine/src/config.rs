use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use relic_contracts::models::DEFAULT_CANDIDATE_MODELS;
use thiserror::Error;
use tracing::debug;

use crate::first_non_empty_env;

pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const API_BASE_VAR: &str = "GEMINI_API_BASE";
pub const CANDIDATE_MODELS_VAR: &str = "RELIC_CANDIDATE_MODELS";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "{key} not found. Set it in .env, the environment, or a secrets store \
         (.relic/secrets.toml or {config_hint})."
    )]
    MissingCredential {
        key: &'static str,
        config_hint: String,
    },
    #[error("failed reading secrets store {}", .path.display())]
    SecretsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("secrets store {} is not valid TOML", .path.display())]
    SecretsMalformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        (!value.is_empty()).then_some(Self(value))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub candidate_models: Vec<String>,
    pub api_base: Option<String>,
}

/// Everything resolved at startup. Built once, then only read.
#[derive(Debug, Clone)]
pub struct RelicConfig {
    pub credential: Credential,
    pub api_base: String,
    pub candidate_models: Vec<String>,
}

impl RelicConfig {
    /// Loads `.env`, then resolves the credential from the environment or the
    /// secrets store.
    pub fn load(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => debug!(error = %err, "ignoring unreadable .env"),
        }
        let lookup = |key: &str| first_non_empty_env(&[key]);
        Self::from_sources(&lookup, &secrets_store_paths(), overrides)
    }

    pub fn from_sources(
        env: &dyn Fn(&str) -> Option<String>,
        secrets_paths: &[PathBuf],
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let credential = resolve_credential(env, secrets_paths)?;

        let api_base = overrides
            .api_base
            .or_else(|| env(API_BASE_VAR))
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let candidate_models = if !overrides.candidate_models.is_empty() {
            overrides.candidate_models
        } else if let Some(raw) = env(CANDIDATE_MODELS_VAR) {
            split_model_list(&raw)
        } else {
            DEFAULT_CANDIDATE_MODELS
                .iter()
                .map(|name| name.to_string())
                .collect()
        };

        Ok(Self {
            credential,
            api_base,
            candidate_models,
        })
    }
}

pub fn resolve_credential(
    env: &dyn Fn(&str) -> Option<String>,
    secrets_paths: &[PathBuf],
) -> Result<Credential, ConfigError> {
    if let Some(credential) = env(API_KEY_VAR).and_then(Credential::new) {
        debug!("credential resolved from environment");
        return Ok(credential);
    }
    for path in secrets_paths {
        if !path.is_file() {
            continue;
        }
        if let Some(credential) = read_secret(path, API_KEY_VAR)?.and_then(Credential::new) {
            debug!(path = %path.display(), "credential resolved from secrets store");
            return Ok(credential);
        }
    }
    Err(ConfigError::MissingCredential {
        key: API_KEY_VAR,
        config_hint: user_secrets_path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "~/.config/relic/secrets.toml".to_string()),
    })
}

/// Reads a top-level string key from a TOML secrets file.
pub fn read_secret(path: &Path, key: &str) -> Result<Option<String>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::SecretsUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let table: toml::Table = raw.parse().map_err(|source| ConfigError::SecretsMalformed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(table
        .get(key)
        .and_then(toml::Value::as_str)
        .map(str::to_string))
}

pub fn secrets_store_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".relic").join("secrets.toml")];
    if let Some(path) = user_secrets_path() {
        paths.push(path);
    }
    paths
}

fn user_secrets_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("relic").join("secrets.toml"))
}

fn split_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| {
            map.get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        }
    }

    #[test]
    fn environment_credential_wins_over_secrets_store() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let secrets = temp.path().join("secrets.toml");
        fs::write(&secrets, "GOOGLE_API_KEY = \"from-secrets\"\n")?;

        let env = env_from(&[("GOOGLE_API_KEY", "from-env")]);
        let credential = resolve_credential(&env, &[secrets])?;
        assert_eq!(credential.expose(), "from-env");
        Ok(())
    }

    #[test]
    fn secrets_store_is_used_when_environment_is_blank() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let missing = temp.path().join("missing.toml");
        let secrets = temp.path().join("secrets.toml");
        fs::write(&secrets, "OTHER = 1\nGOOGLE_API_KEY = \" from-secrets \"\n")?;

        let env = env_from(&[("GOOGLE_API_KEY", "   ")]);
        let credential = resolve_credential(&env, &[missing, secrets])?;
        assert_eq!(credential.expose(), "from-secrets");
        Ok(())
    }

    #[test]
    fn missing_credential_names_the_key() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let secrets = temp.path().join("secrets.toml");
        fs::write(&secrets, "GOOGLE_API_KEY = \"\"\n")?;

        let err = resolve_credential(&env_from(&[]), &[secrets]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { key, .. } if key == "GOOGLE_API_KEY"));
        assert!(err.to_string().starts_with("GOOGLE_API_KEY not found."));
        Ok(())
    }

    #[test]
    fn malformed_secrets_store_is_fatal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let secrets = temp.path().join("secrets.toml");
        fs::write(&secrets, "GOOGLE_API_KEY = \n")?;

        let err = resolve_credential(&env_from(&[]), &[secrets.clone()]).unwrap_err();
        assert!(matches!(err, ConfigError::SecretsMalformed { ref path, .. } if *path == secrets));
        Ok(())
    }

    #[test]
    fn defaults_apply_without_overrides() -> anyhow::Result<()> {
        let env = env_from(&[("GOOGLE_API_KEY", "k")]);
        let config = RelicConfig::from_sources(&env, &[], ConfigOverrides::default())?;
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(
            config.candidate_models,
            vec!["gemini-1.5-flash", "gemini-1.0-pro", "gemini-pro"]
        );
        Ok(())
    }

    #[test]
    fn environment_and_flags_override_models_and_base() -> anyhow::Result<()> {
        let env = env_from(&[
            ("GOOGLE_API_KEY", "k"),
            ("GEMINI_API_BASE", "http://127.0.0.1:9000/v1beta/"),
            ("RELIC_CANDIDATE_MODELS", "gemini-2.0-flash, ,gemini-2.5-pro"),
        ]);
        let config = RelicConfig::from_sources(&env, &[], ConfigOverrides::default())?;
        assert_eq!(config.api_base, "http://127.0.0.1:9000/v1beta");
        assert_eq!(
            config.candidate_models,
            vec!["gemini-2.0-flash", "gemini-2.5-pro"]
        );

        let flagged = RelicConfig::from_sources(
            &env,
            &[],
            ConfigOverrides {
                candidate_models: vec!["gemini-exp".to_string()],
                api_base: None,
            },
        )?;
        assert_eq!(flagged.candidate_models, vec!["gemini-exp"]);
        Ok(())
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("super-secret").unwrap();
        assert_eq!(format!("{credential:?}"), "Credential(<redacted>)");
        assert!(Credential::new("  ").is_none());
    }
}
