//! Flat JSON key/value store used by the host shell.
//!
//! The file holds a single JSON object. Reads never fail: a missing or
//! malformed file yields the caller's default and a warning.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::ShellConfig;
use crate::error::StoreError;

/// File name of the store inside its directory.
pub const CONFIG_FILE: &str = "config.json";

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `config.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The whole object. A missing file is an empty object.
    pub fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::NotAnObject),
        }
    }

    fn load_or_empty(&self) -> Map<String, Value> {
        self.load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), "Error reading config: {e}");
            Map::new()
        })
    }

    /// Raw value for `key`, or `default` when absent or unreadable.
    pub fn get(&self, key: &str, default: Value) -> Value {
        self.load_or_empty()
            .remove(key)
            .filter(|v| !v.is_null())
            .unwrap_or(default)
    }

    /// Typed read. Values of the wrong shape fall back to `default`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        take_field(&mut self.load_or_empty(), key, default)
    }

    /// Store `value` under `key`, keeping every other key.
    pub fn set(&self, key: &str, value: impl Serialize) -> Result<(), StoreError> {
        let mut map = self.load_or_empty();
        map.insert(key.to_string(), serde_json::to_value(value)?);
        self.write(&map)
    }

    /// Shell configuration, read key by key. A missing or malformed value
    /// only resets its own field.
    pub fn shell_config(&self) -> ShellConfig {
        let mut map = self.load_or_empty();
        let defaults = ShellConfig::default();
        ShellConfig {
            token: take_field(&mut map, "token", defaults.token),
            channel_type: take_field(&mut map, "channelType", defaults.channel_type),
            channel: take_field(&mut map, "channel", defaults.channel),
            user_id: take_field(&mut map, "userId", defaults.user_id),
            bot_id: take_field(&mut map, "botId", defaults.bot_id),
            interval: take_field(&mut map, "interval", defaults.interval),
        }
    }

    /// Merge the shell configuration's keys into the store.
    pub fn save_shell_config(&self, config: &ShellConfig) -> Result<(), StoreError> {
        let mut map = self.load_or_empty();
        let Value::Object(fields) = serde_json::to_value(config)? else {
            return Err(StoreError::NotAnObject);
        };
        map.extend(fields);
        self.write(&map)
    }

    fn write(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

fn take_field<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str, default: T) -> T {
    match map.remove(key) {
        None | Some(Value::Null) => default,
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(key, "Ignoring malformed config value: {e}");
            default
        }),
    }
}
