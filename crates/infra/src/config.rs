//! Configuration loading and representation.
//!
//! Everything comes from the environment; a `.env` file is loaded first when
//! present. Invalid values fail start-up instead of falling back silently.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

use assurance_assessments::{CommentPolicy, DEFAULT_EDIT_WINDOW_MINUTES, EvidencePolicy};
use assurance_auth::{PolicyLoadError, RolePermissionTable};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_EVIDENCE_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is required{context}")]
    Missing { key: &'static str, context: &'static str },

    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read permissions file {path}: {source}")]
    PermissionsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load permissions file {path}: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: PolicyLoadError,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub evidence_policy: EvidencePolicy,
    pub evidence_concurrency: usize,
    pub comment_policy: CommentPolicy,
    pub permissions_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load `.env` (if any), then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let bind_addr = parse("BIND_ADDR", get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()))?;

        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            None => false,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(invalid("USE_PERSISTENT_STORES", v, "expected true or false")),
            },
        };
        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing {
                key: "DATABASE_URL",
                context: " when USE_PERSISTENT_STORES=true",
            });
        }

        let defaults = EvidencePolicy::default();
        let evidence_policy = EvidencePolicy {
            max_file_bytes: positive("EVIDENCE_MAX_FILE_BYTES", get("EVIDENCE_MAX_FILE_BYTES"), defaults.max_file_bytes)?,
            max_files: positive("EVIDENCE_MAX_FILES", get("EVIDENCE_MAX_FILES"), defaults.max_files)?,
        };
        let evidence_concurrency =
            positive("EVIDENCE_CONCURRENCY", get("EVIDENCE_CONCURRENCY"), DEFAULT_EVIDENCE_CONCURRENCY)?;

        let window: i64 = positive(
            "COMMENT_EDIT_WINDOW_MINUTES",
            get("COMMENT_EDIT_WINDOW_MINUTES"),
            DEFAULT_EDIT_WINDOW_MINUTES,
        )?;
        let edit_window = Duration::try_minutes(window)
            .ok_or_else(|| invalid("COMMENT_EDIT_WINDOW_MINUTES", window.to_string(), "out of range"))?;

        Ok(Self {
            jwt_secret,
            bind_addr,
            use_persistent_stores,
            database_url,
            evidence_policy,
            evidence_concurrency,
            comment_policy: CommentPolicy {
                edit_window,
            },
            permissions_file: get("PERMISSIONS_FILE").map(PathBuf::from),
        })
    }

    /// The grant list from `PERMISSIONS_FILE`, or the built-in table.
    pub fn load_permissions(&self) -> Result<RolePermissionTable, ConfigError> {
        let Some(path) = &self.permissions_file else {
            return Ok(RolePermissionTable::builtin());
        };
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::PermissionsFile {
            path: path.clone(),
            source,
        })?;
        RolePermissionTable::from_json(&json).map_err(|source| ConfigError::Permissions {
            path: path.clone(),
            source,
        })
    }
}

fn invalid(key: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value,
        reason: reason.into(),
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        let reason = e.to_string();
        invalid(key, value.clone(), reason)
    })
}

fn positive<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = value else {
        return Ok(default);
    };
    let parsed: T = parse(key, raw.clone())?;
    if parsed <= T::default() {
        return Err(invalid(key, raw, "must be greater than zero"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(!cfg.use_persistent_stores);
        assert_eq!(cfg.evidence_policy, EvidencePolicy::default());
        assert_eq!(cfg.evidence_concurrency, DEFAULT_EVIDENCE_CONCURRENCY);
        assert_eq!(cfg.comment_policy.edit_window, Duration::minutes(20));
        assert!(cfg.load_permissions().is_ok());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("JWT_SECRET", "s3cret"),
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("EVIDENCE_MAX_FILES", "2"),
            ("EVIDENCE_MAX_FILE_BYTES", "1024"),
            ("COMMENT_EDIT_WINDOW_MINUTES", "5"),
        ])
        .unwrap();
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.evidence_policy.max_files, 2);
        assert_eq!(cfg.evidence_policy.max_file_bytes, 1024);
        assert_eq!(cfg.comment_policy.edit_window, Duration::minutes(5));
    }

    #[test]
    fn invalid_values_fail_startup() {
        assert!(matches!(config(&[("EVIDENCE_MAX_FILES", "0")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("EVIDENCE_CONCURRENCY", "many")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("BIND_ADDR", "nowhere")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(
            config(&[("COMMENT_EDIT_WINDOW_MINUTES", "9223372036854775807")]),
            Err(ConfigError::Invalid { key: "COMMENT_EDIT_WINDOW_MINUTES", .. })
        ));
        assert!(matches!(
            config(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::Missing { key: "DATABASE_URL", .. })
        ));
    }

    #[test]
    fn missing_permissions_file_is_reported() {
        let cfg = config(&[("PERMISSIONS_FILE", "/nonexistent/grants.json")]).unwrap();
        assert!(matches!(cfg.load_permissions(), Err(ConfigError::PermissionsFile { .. })));
    }
}
