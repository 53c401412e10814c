use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chatstream_transport::{TransportConfig, TransportKind};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
pub const DEFAULT_WEBSOCKET_PATH: &str = "/ws";
pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const SETTINGS_DIRECTORY_NAME: &str = "chatstream";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "CHATSTREAM_";
const STAGED_EXTENSION: &str = "json.staged";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_websocket_path")]
    pub websocket_path: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            server_url: default_server_url(),
            websocket_path: default_websocket_path(),
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        self.server_url = non_blank_or(&self.server_url, default_server_url)
            .trim_end_matches('/')
            .to_string();
        self.websocket_path = non_blank_or(&self.websocket_path, default_websocket_path);
        if !self.websocket_path.starts_with('/') {
            self.websocket_path.insert(0, '/');
        }
        self.log_filter = non_blank_or(&self.log_filter, default_log_filter);
        self
    }

    /// WebSocket endpoint derived from the server URL: `http` maps to `ws`,
    /// `https` to `wss`.
    pub fn websocket_url(&self) -> String {
        let server = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = server.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = server.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if server.starts_with("ws://") || server.starts_with("wss://") {
            server.to_string()
        } else {
            format!("ws://{server}")
        };
        format!("{base}{}", self.websocket_path)
    }

    pub fn http_base_url(&self) -> String {
        let server = self.server_url.trim_end_matches('/');
        if server.contains("://") {
            server.to_string()
        } else {
            format!("http://{server}")
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.transport, self.websocket_url(), self.http_base_url())
    }
}

/// Live settings snapshot backed by a JSON file.
pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".chatstream"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from(&config_path, Some(ENV_PREFIX));
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Defaults, then the JSON file, then `env_prefix` variables. Falls back
    /// to defaults when the merged result does not parse.
    fn load_from(path: &Path, env_prefix: Option<&str>) -> Settings {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults");
        }

        let mut figment =
            Figment::from(Serialized::defaults(Settings::default())).merge(Json::file(path));
        if let Some(prefix) = env_prefix {
            figment = figment.merge(Env::prefixed(prefix));
        }

        match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "failed to parse settings, using defaults");
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        write_settings_file(&self.config_path, settings)?;
        tracing::info!(
            path = ?self.config_path,
            transport = %settings.transport,
            "chatstream settings saved"
        );
        Ok(())
    }
}

/// Stages the JSON next to `path` and renames it into place, so readers never
/// see a half-written file.
fn write_settings_file(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(directory) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(directory).context(CreateConfigDirSnafu {
            stage: "prepare-chatstream-config-dir",
            directory: directory.to_path_buf(),
        })?;
    }

    let mut json = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
        stage: "encode-chatstream-settings",
    })?;
    json.push(b'\n');

    let staged = path.with_extension(STAGED_EXTENSION);
    std::fs::write(&staged, json).context(WriteStagedSnafu {
        stage: "write-staged-chatstream-settings",
        staged: staged.clone(),
    })?;
    std::fs::rename(&staged, path).context(CommitStagedSnafu {
        stage: "commit-staged-chatstream-settings",
        staged,
        target: path.to_path_buf(),
    })
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("chatstream config directory {directory:?} is not usable ({stage}): {source}"))]
    CreateConfigDir {
        stage: &'static str,
        directory: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("chatstream settings could not be encoded as JSON ({stage}): {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("chatstream settings could not be staged at {staged:?} ({stage}): {source}"))]
    WriteStaged {
        stage: &'static str,
        staged: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "staged chatstream settings {staged:?} could not replace {target:?} ({stage}): {source}"
    ))]
    CommitStaged {
        stage: &'static str,
        staged: PathBuf,
        target: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: &str, default: fn() -> String) -> String {
    let value = value.trim();
    if value.is_empty() {
        default()
    } else {
        value.to_string()
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_websocket_path() -> String {
    DEFAULT_WEBSOCKET_PATH.to_string()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsStore::load_from(&dir.path().join("settings.json"), None);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.websocket_url(), "ws://localhost:8080/ws");
        assert_eq!(settings.http_base_url(), "http://localhost:8080");
    }

    #[test]
    fn file_values_override_defaults_and_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"transport": "http", "server_url": " https://chat.example.com/ ", "websocket_path": "socket", "log_filter": "  "}"#,
        )
        .unwrap();

        let settings = SettingsStore::load_from(&path, None);
        assert_eq!(settings.transport, TransportKind::Http);
        assert_eq!(settings.server_url, "https://chat.example.com");
        assert_eq!(settings.websocket_path, "/socket");
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(settings.websocket_url(), "wss://chat.example.com/socket");

        let config = settings.transport_config();
        assert_eq!(config.kind, TransportKind::Http);
        assert_eq!(config.http_base_url, "https://chat.example.com");
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"transport": "carrier-pigeon"}"#).unwrap();

        assert_eq!(SettingsStore::load_from(&path, None), Settings::default());
    }

    #[test]
    fn update_persists_atomically_and_swaps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone());

        let mut settings = (*store.settings()).clone();
        settings.transport = TransportKind::Http;
        settings.server_url = "localhost:9000/".to_string();
        store.update(settings).unwrap();

        assert_eq!(store.settings().transport, TransportKind::Http);
        assert_eq!(store.settings().server_url, "localhost:9000");
        assert_eq!(store.settings().http_base_url(), "http://localhost:9000");
        assert_eq!(store.settings().websocket_url(), "ws://localhost:9000/ws");
        assert!(!path.with_extension(STAGED_EXTENSION).exists());

        let reloaded = SettingsStore::load_from(&path, None);
        assert_eq!(reloaded, *store.settings());
    }

    #[test]
    fn update_reports_an_unusable_config_directory_and_keeps_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, "occupied").unwrap();
        let store = SettingsStore::new(blocker.join("settings.json"));

        let mut settings = (*store.settings()).clone();
        settings.transport = TransportKind::Http;
        let error = store.update(settings).unwrap_err();

        assert!(matches!(
            error,
            SettingsError::CreateConfigDir {
                stage: "prepare-chatstream-config-dir",
                ..
            }
        ));
        assert!(error.to_string().starts_with("chatstream config directory"));
        assert_eq!(store.settings().transport, TransportKind::WebSocket);
    }
}
