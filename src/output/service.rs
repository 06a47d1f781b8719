use crate::foundation::error::{StagecastError, StagecastResult};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Service type used when a document has no `type` field.
pub const DEFAULT_SERVICE_TYPE: &str = "rtmp_common";

/// Custom RTMP server (explicit URL and key).
pub const RTMP_CUSTOM: &str = "rtmp_custom";

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_owned()
}

/// Destination, protocol and credentials of a streaming output.
///
/// The document shape is `{ "type": "...", "settings": { ... }, "hotkeys": { ... } }`; settings
/// are type specific and kept as an opaque JSON object.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ServiceConfig {
    #[serde(rename = "type", default = "default_service_type")]
    kind: String,
    #[serde(default)]
    settings: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    hotkeys: Map<String, Value>,
}

impl Default for ServiceConfig {
    /// Local custom RTMP server, key `stream`.
    fn default() -> Self {
        Self::rtmp_custom("rtmp://127.0.0.1:1935/live/", "stream")
    }
}

impl ServiceConfig {
    /// Build a service of type `kind` with the given settings.
    pub fn new(kind: impl Into<String>, settings: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            settings,
            hotkeys: Map::new(),
        }
    }

    /// Custom RTMP server with a stream key and no authentication.
    pub fn rtmp_custom(server: impl Into<String>, key: impl Into<String>) -> Self {
        let mut settings = Map::new();
        settings.insert("bwtest".to_owned(), Value::Bool(false));
        settings.insert("key".to_owned(), Value::String(key.into()));
        settings.insert("server".to_owned(), Value::String(server.into()));
        settings.insert("use_auth".to_owned(), Value::Bool(false));
        Self::new(RTMP_CUSTOM, settings)
    }

    /// Parse a service document from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> StagecastResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| StagecastError::serde(format!("parse service JSON: {e}")))
    }

    /// Parse a service document from a JSON string.
    pub fn from_json_str(s: &str) -> StagecastResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| StagecastError::serde(format!("parse service JSON: {e}")))
    }

    /// Parse a service document from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> StagecastResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            StagecastError::serde(format!("open service JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Service type discriminator.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Type-specific settings.
    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// Hotkey bindings carried along with the service.
    pub fn hotkeys(&self) -> &Map<String, Value> {
        &self.hotkeys
    }

    fn str_setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn bool_setting(&self, key: &str) -> bool {
        self.settings
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Ingest server URL.
    pub fn server(&self) -> Option<&str> {
        self.str_setting("server")
    }

    /// Stream key.
    pub fn key(&self) -> Option<&str> {
        self.str_setting("key")
    }

    /// Provider name (for `rtmp_common`).
    pub fn service_name(&self) -> Option<&str> {
        self.str_setting("service")
    }

    /// Whether username/password authentication is enabled.
    pub fn use_auth(&self) -> bool {
        self.bool_setting("use_auth")
    }

    /// Username for authenticated servers.
    pub fn username(&self) -> Option<&str> {
        self.str_setting("username")
    }

    /// Password for authenticated servers.
    pub fn password(&self) -> Option<&str> {
        self.str_setting("password")
    }

    /// Bandwidth test mode.
    pub fn bwtest(&self) -> bool {
        self.bool_setting("bwtest")
    }

    /// URL scheme of the server (`rtmp`, `rtmps`, ...).
    pub fn protocol(&self) -> Option<&str> {
        self.server()
            .and_then(|s| s.split_once("://"))
            .map(|(scheme, _)| scheme)
    }

    /// Server joined with the stream key.
    pub fn publish_url(&self) -> Option<String> {
        let server = self.server()?;
        Some(match self.key() {
            Some(key) => format!("{}/{}", server.trim_end_matches('/'), key),
            None => server.to_owned(),
        })
    }

    /// Check the service can back an output. Failures are [`StagecastError::Setup`].
    pub fn validate(&self) -> StagecastResult<()> {
        if self.kind != RTMP_CUSTOM && self.kind != DEFAULT_SERVICE_TYPE {
            return Err(StagecastError::setup(format!(
                "unsupported service type '{}'",
                self.kind
            )));
        }
        let server = self
            .server()
            .ok_or_else(|| StagecastError::setup("service has no server"))?;
        match self.protocol() {
            Some("rtmp" | "rtmps") => {}
            Some(other) => {
                return Err(StagecastError::setup(format!(
                    "unsupported protocol '{other}' in server '{server}'"
                )));
            }
            None => {
                return Err(StagecastError::setup(format!(
                    "server '{server}' is not a URL"
                )));
            }
        }
        if self.kind == DEFAULT_SERVICE_TYPE && self.service_name().is_none() {
            return Err(StagecastError::setup(
                "rtmp_common service requires a provider name",
            ));
        }
        if self.use_auth() && self.username().is_none() {
            return Err(StagecastError::setup(
                "authentication enabled but no username set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/service.rs"]
mod tests;
