// ABOUTME: Runtime configuration loaded from the environment and an optional .env file
// ABOUTME: Covers database url, blob root, upload limit, bind address, CORS origins and bootstrap admin

use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub files_root: PathBuf,
    pub max_file_mb: u64,
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub bootstrap_admin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:dossier.db?mode=rwc".to_string(),
            files_root: PathBuf::from("./storage"),
            max_file_mb: 50,
            bind_addr: "0.0.0.0:8000".to_string(),
            allowed_origins: Vec::new(),
            bootstrap_admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine; the process environment still applies.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; tests pass a closure over a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let max_file_mb = match non_empty("MAX_FILE_MB") {
            Some(raw) => raw.trim().parse::<u64>().ok().filter(|mb| *mb > 0).ok_or_else(|| {
                AppError::Validation(format!("MAX_FILE_MB must be a positive integer, got '{}'", raw))
            })?,
            None => defaults.max_file_mb,
        };

        let allowed_origins = non_empty("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            files_root: non_empty("FILES_ROOT").map(PathBuf::from).unwrap_or(defaults.files_root),
            max_file_mb,
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            allowed_origins,
            bootstrap_admin: non_empty("BOOTSTRAP_ADMIN").map(|u| u.trim().to_string()),
        })
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite:dossier.db?mode=rwc");
        assert_eq!(config.max_file_mb, 50);
        assert_eq!(config.max_file_bytes(), 50 * 1024 * 1024);
        assert!(config.allowed_origins.is_empty());
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_overrides_and_origin_list() {
        let config = Config::from_lookup(lookup_from(&[
            ("MAX_FILE_MB", "5"),
            ("ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("BOOTSTRAP_ADMIN", " root "),
            ("FILES_ROOT", "/srv/blobs"),
        ]))
        .unwrap();
        assert_eq!(config.max_file_mb, 5);
        assert_eq!(config.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.bootstrap_admin.as_deref(), Some("root"));
        assert_eq!(config.files_root, PathBuf::from("/srv/blobs"));
    }

    #[test]
    fn test_invalid_limit_names_variable() {
        let err = Config::from_lookup(lookup_from(&[("MAX_FILE_MB", "lots")])).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.message().contains("MAX_FILE_MB"));

        assert!(Config::from_lookup(lookup_from(&[("MAX_FILE_MB", "0")])).is_err());
    }
}
