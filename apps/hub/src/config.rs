use std::{collections::HashMap, fs, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::warn;

const SETTINGS_FILE: &str = "hub.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Rest,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "rest" => Ok(Self::Rest),
            other => Err(anyhow!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub store_backend: StoreBackend,
    pub rest_url: Option<String>,
    pub rest_api_key: Option<String>,
    pub rest_access_token: Option<String>,
    pub admin_role_threshold: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/hub.db".into(),
            store_backend: StoreBackend::Sqlite,
            rest_url: None,
            rest_api_key: None,
            rest_access_token: None,
            admin_role_threshold: 6,
        }
    }
}

impl Settings {
    fn set(&mut self, key: &str, value: String) {
        match key {
            "database_url" => self.database_url = value,
            "store_backend" => match value.parse() {
                Ok(backend) => self.store_backend = backend,
                Err(err) => warn!("config: ignoring store_backend: {err}"),
            },
            "rest_url" => self.rest_url = Some(value),
            "rest_api_key" => self.rest_api_key = Some(value),
            "rest_access_token" => self.rest_access_token = Some(value),
            "admin_role_threshold" => match value.trim().parse::<i32>() {
                Ok(threshold) => self.admin_role_threshold = threshold,
                Err(_) => warn!(%value, "config: ignoring non-numeric admin_role_threshold"),
            },
            _ => {}
        }
    }
}

const KEYS: &[&str] = &[
    "database_url",
    "store_backend",
    "rest_url",
    "rest_api_key",
    "rest_access_token",
    "admin_role_threshold",
];

/// Defaults, then `hub.toml`, then `HUB_<KEY>`, then `APP__<KEY>`.
pub fn load_settings() -> Settings {
    let file_cfg = fs::read_to_string(SETTINGS_FILE)
        .ok()
        .and_then(|raw| match parse_settings_file(&raw) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!("config: ignoring malformed {SETTINGS_FILE}: {err:#}");
                None
            }
        })
        .unwrap_or_default();
    resolve_settings(&file_cfg, |name| std::env::var(name).ok())
}

/// Flat key/value table; non-string scalars are kept in their toml spelling.
fn parse_settings_file(raw: &str) -> anyhow::Result<HashMap<String, String>> {
    let table = toml::from_str::<HashMap<String, toml::Value>>(raw)
        .with_context(|| format!("failed to parse {SETTINGS_FILE}"))?;
    Ok(table
        .into_iter()
        .map(|(key, value)| match value {
            toml::Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect())
}

fn resolve_settings(
    file_cfg: &HashMap<String, String>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();
    for key in KEYS {
        if let Some(v) = file_cfg.get(*key) {
            settings.set(key, v.clone());
        }
        let upper = key.to_ascii_uppercase();
        if let Some(v) = env(&format!("HUB_{upper}")) {
            settings.set(key, v);
        }
        if let Some(v) = env(&format!("APP__{upper}")) {
            settings.set(key, v);
        }
    }
    settings
}

/// Turns plain file paths into `sqlite://` urls. Directory creation is left to
/// `Storage::new`.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_local_sqlite_with_admin_threshold_six() {
        let settings = resolve_settings(&HashMap::new(), env_from(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.admin_role_threshold, 6);
        assert_eq!(settings.store_backend, StoreBackend::Sqlite);
    }

    #[test]
    fn env_overrides_file_and_app_prefix_wins() {
        let file_cfg = HashMap::from([
            ("database_url".to_string(), "sqlite://file.db".to_string()),
            ("store_backend".to_string(), "rest".to_string()),
            ("rest_url".to_string(), "https://file.example.com".to_string()),
        ]);
        let settings = resolve_settings(
            &file_cfg,
            env_from(&[
                ("HUB_DATABASE_URL", "sqlite://hub-env.db"),
                ("APP__DATABASE_URL", "sqlite://app-env.db"),
                ("HUB_ADMIN_ROLE_THRESHOLD", "9"),
            ]),
        );
        assert_eq!(settings.database_url, "sqlite://app-env.db");
        assert_eq!(settings.store_backend, StoreBackend::Rest);
        assert_eq!(settings.rest_url.as_deref(), Some("https://file.example.com"));
        assert_eq!(settings.admin_role_threshold, 9);
    }

    #[test]
    fn settings_file_accepts_numbers_and_strings() {
        let file_cfg = parse_settings_file(
            "database_url = \"sqlite://hub.db\"\nadmin_role_threshold = 8\n",
        )
        .expect("parse");
        let settings = resolve_settings(&file_cfg, env_from(&[]));
        assert_eq!(settings.database_url, "sqlite://hub.db");
        assert_eq!(settings.admin_role_threshold, 8);
        assert!(parse_settings_file("not toml = = =").is_err());
    }

    #[test]
    fn invalid_values_keep_previous_setting() {
        let settings = resolve_settings(
            &HashMap::new(),
            env_from(&[
                ("HUB_STORE_BACKEND", "mongo"),
                ("HUB_ADMIN_ROLE_THRESHOLD", "high"),
            ]),
        );
        assert_eq!(settings.store_backend, StoreBackend::Sqlite);
        assert_eq!(settings.admin_role_threshold, 6);
    }

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(
            normalize_database_url("./data/test.db"),
            "sqlite://./data/test.db"
        );
        assert_eq!(normalize_database_url("sqlite:hub.db"), "sqlite://hub.db");
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    }

    #[test]
    fn normalizing_touches_no_filesystem() {
        let temp_root = tempfile::tempdir().expect("tempdir");
        let db_path = temp_root.path().join("nested").join("hub.db");

        let url = normalize_database_url(&db_path.to_string_lossy());
        assert_eq!(url, format!("sqlite://{}", db_path.to_string_lossy()));
        assert!(!temp_root.path().join("nested").exists());
    }
}
