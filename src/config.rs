//! Configuration types.
//!
//! The automation process reads [`FishingConfig`] from its environment.
//! The host shell keeps a [`ShellConfig`] in the flat JSON store and turns
//! it into that environment when it spawns the child.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Virtual Fisher's application id.
pub const DEFAULT_BOT_ID: &str = "574652751745777665";

/// Default period between fish commands.
pub const DEFAULT_INTERVAL_MS: u64 = 3000;

/// Where fish commands are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// A guild text channel, addressed by channel id.
    #[default]
    Server,
    /// A direct-message conversation, addressed by user id.
    Dm,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Dm => "dm",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "dm" => Ok(Self::Dm),
            other => Err(ConfigError::InvalidValue {
                key: "CHANNEL_TYPE".into(),
                message: format!("expected 'server' or 'dm', got '{other}'"),
            }),
        }
    }
}

/// Automation process configuration.
#[derive(Debug, Clone)]
pub struct FishingConfig {
    /// Account credential handed to the transport.
    pub token: SecretString,
    pub channel_type: ChannelType,
    /// Target channel id (server mode).
    pub channel_id: Option<String>,
    /// Target user id (DM mode).
    pub user_id: Option<String>,
    /// The counterpart whose messages are scanned and who receives commands.
    pub bot_id: String,
    /// Period between fish commands.
    pub interval: Duration,
    /// Start the cycle as soon as the target is resolved.
    pub auto_start: bool,
    /// JSON-lines feed replayed by the dry-run transport.
    pub feed_path: Option<String>,
}

impl FishingConfig {
    /// Build the config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = non_empty("DISCORD_TOKEN").ok_or_else(|| ConfigError::MissingRequired {
            key: "DISCORD_TOKEN".into(),
            hint: "Set the account token before starting the bot.".into(),
        })?;

        let channel_type = match non_empty("CHANNEL_TYPE") {
            Some(raw) => raw.parse()?,
            None => ChannelType::Server,
        };

        let bot_id = non_empty("DISCORD_BOT_ID").unwrap_or_else(|| DEFAULT_BOT_ID.to_string());

        let interval_ms = non_empty("FISHING_INTERVAL")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_INTERVAL_MS);

        let channel_id = non_empty("DISCORD_BOT_CHANNEL");

        // DM mode falls back to the counterpart itself.
        let user_id = match (channel_type, non_empty("DISCORD_USER_ID")) {
            (_, Some(id)) => Some(id),
            (ChannelType::Dm, None) => Some(bot_id.clone()),
            (ChannelType::Server, None) => None,
        };

        Ok(Self {
            token: SecretString::from(token),
            channel_type,
            channel_id,
            user_id,
            bot_id,
            interval: Duration::from_millis(interval_ms),
            auto_start: non_empty("AUTO_START_FISHING").as_deref() == Some("true"),
            feed_path: non_empty("FISHING_FEED"),
        })
    }

    /// The id used to resolve the target conversation for the configured mode.
    pub fn target_id(&self) -> Option<&str> {
        match self.channel_type {
            ChannelType::Server => self.channel_id.as_deref(),
            ChannelType::Dm => self.user_id.as_deref(),
        }
    }
}

/// Host-shell configuration, persisted in the flat JSON store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub channel_type: ChannelType,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_bot_id")]
    pub bot_id: String,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_bot_id() -> String {
    DEFAULT_BOT_ID.to_string()
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            channel_type: ChannelType::Server,
            channel: String::new(),
            user_id: String::new(),
            bot_id: default_bot_id(),
            interval: default_interval(),
        }
    }
}

impl ShellConfig {
    /// Reject configs that cannot possibly reach a target.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "token".into(),
                hint: "Discord token is required".into(),
            });
        }
        if self.channel_type == ChannelType::Server && self.channel.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "channel".into(),
                hint: "Channel ID is required".into(),
            });
        }
        Ok(())
    }

    /// Environment injected into the automation process.
    ///
    /// Auto-start is always off; the shell starts the cycle explicitly.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let user_id = if self.channel_type == ChannelType::Dm && self.user_id.is_empty() {
            self.bot_id.clone()
        } else {
            self.user_id.clone()
        };
        let interval = if self.interval == 0 {
            DEFAULT_INTERVAL_MS
        } else {
            self.interval
        };

        vec![
            ("DISCORD_TOKEN".into(), self.token.clone()),
            ("CHANNEL_TYPE".into(), self.channel_type.to_string()),
            ("DISCORD_BOT_CHANNEL".into(), self.channel.clone()),
            ("DISCORD_USER_ID".into(), user_id),
            ("DISCORD_BOT_ID".into(), self.bot_id.clone()),
            ("FISHING_INTERVAL".into(), interval.to_string()),
            ("AUTO_START_FISHING".into(), "false".into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_applied() {
        let config = FishingConfig::from_lookup(lookup(&[("DISCORD_TOKEN", "tok")])).unwrap();
        assert_eq!(config.channel_type, ChannelType::Server);
        assert_eq!(config.bot_id, DEFAULT_BOT_ID);
        assert_eq!(config.interval, Duration::from_millis(3000));
        assert!(!config.auto_start);
        assert!(config.channel_id.is_none());
        assert_eq!(config.token.expose_secret(), "tok");
    }

    #[test]
    fn missing_token_rejected() {
        let err = FishingConfig::from_lookup(lookup(&[("DISCORD_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn bad_interval_falls_back() {
        for raw in ["abc", "0", "-5"] {
            let config = FishingConfig::from_lookup(lookup(&[
                ("DISCORD_TOKEN", "tok"),
                ("FISHING_INTERVAL", raw),
            ]))
            .unwrap();
            assert_eq!(config.interval, Duration::from_millis(DEFAULT_INTERVAL_MS));
        }
    }

    #[test]
    fn dm_mode_uses_bot_id_when_user_missing() {
        let config = FishingConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "tok"),
            ("CHANNEL_TYPE", "dm"),
            ("DISCORD_BOT_ID", "42"),
        ]))
        .unwrap();
        assert_eq!(config.target_id(), Some("42"));
    }

    #[test]
    fn server_mode_targets_channel() {
        let config = FishingConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "tok"),
            ("DISCORD_BOT_CHANNEL", "123"),
            ("DISCORD_USER_ID", "999"),
            ("AUTO_START_FISHING", "true"),
        ]))
        .unwrap();
        assert_eq!(config.target_id(), Some("123"));
        assert!(config.auto_start);
    }

    #[test]
    fn invalid_channel_type() {
        let err = FishingConfig::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "tok"),
            ("CHANNEL_TYPE", "group"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn shell_config_env_round_trips_into_fishing_config() {
        let shell = ShellConfig {
            token: "tok".into(),
            channel: "555".into(),
            interval: 4500,
            ..Default::default()
        };
        let env: HashMap<String, String> = shell.to_env().into_iter().collect();
        assert_eq!(env["AUTO_START_FISHING"], "false");

        let config = FishingConfig::from_lookup(move |k| env.get(k).cloned()).unwrap();
        assert_eq!(config.target_id(), Some("555"));
        assert_eq!(config.interval, Duration::from_millis(4500));
        assert!(!config.auto_start);
    }

    #[test]
    fn shell_config_validation() {
        let mut shell = ShellConfig::default();
        assert!(shell.validate().is_err());
        shell.token = "tok".into();
        assert!(shell.validate().is_err());
        shell.channel = "1".into();
        assert!(shell.validate().is_ok());

        let dm = ShellConfig {
            token: "tok".into(),
            channel_type: ChannelType::Dm,
            ..Default::default()
        };
        assert!(dm.validate().is_ok());
        let env: HashMap<String, String> = dm.to_env().into_iter().collect();
        assert_eq!(env["DISCORD_USER_ID"], DEFAULT_BOT_ID);
    }
}
