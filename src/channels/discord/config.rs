//! Discord channel configuration.

use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

/// Configuration for the Discord bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from Discord Developer Portal.
    #[serde(default)]
    pub token: String,

    /// Application (client) ID.
    #[serde(default)]
    pub application_id: u64,

    /// User IDs allowed to use the commands. Empty allows everyone.
    #[serde(default)]
    pub user_allowlist: Vec<String>,

    /// Guild (server) IDs the commands work in. Empty allows every guild.
    #[serde(default)]
    pub guild_allowlist: Vec<u64>,

    /// Whether to register the slash commands globally on startup.
    #[serde(default = "default_register_commands")]
    pub register_commands: bool,
}

fn default_register_commands() -> bool {
    true
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            application_id: 0,
            user_allowlist: Vec::new(),
            guild_allowlist: Vec::new(),
            register_commands: default_register_commands(),
        }
    }
}

impl DiscordConfig {
    /// Create a new config with the given token.
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            ..Default::default()
        }
    }

    /// Set the application ID.
    pub fn with_application_id(mut self, id: u64) -> Self {
        self.application_id = id;
        self
    }

    /// Set the user allowlist.
    pub fn with_user_allowlist(mut self, users: Vec<String>) -> Self {
        self.user_allowlist = users;
        self
    }

    /// Set the guild allowlist.
    pub fn with_guild_allowlist(mut self, guilds: Vec<u64>) -> Self {
        self.guild_allowlist = guilds;
        self
    }

    /// Enable or disable slash command registration.
    pub fn with_register_commands(mut self, register: bool) -> Self {
        self.register_commands = register;
        self
    }

    /// Whether `user_id` may use the commands, in `guild_id` if any.
    ///
    /// Commands outside a guild (DMs, user-installed contexts) are only
    /// subject to the user allowlist.
    pub fn is_allowed(&self, user_id: &str, guild_id: Option<u64>) -> bool {
        if let Some(guild_id) = guild_id {
            if !self.guild_allowlist.is_empty() && !self.guild_allowlist.contains(&guild_id) {
                return false;
            }
        }

        self.user_allowlist.is_empty() || self.user_allowlist.iter().any(|u| u == user_id)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::MissingRequired("discord.token".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = DiscordConfig::default();
        assert!(config.validate().is_err());

        let config = DiscordConfig::new("test_token");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DiscordConfig::new("token")
            .with_application_id(123456789)
            .with_user_allowlist(vec!["user1".to_string()])
            .with_guild_allowlist(vec![111, 222])
            .with_register_commands(false);

        assert_eq!(config.application_id, 123456789);
        assert_eq!(config.user_allowlist.len(), 1);
        assert_eq!(config.guild_allowlist.len(), 2);
        assert!(!config.register_commands);
    }

    #[test]
    fn test_allowlists() {
        let open = DiscordConfig::new("token");
        assert!(open.is_allowed("anyone", Some(1)));
        assert!(open.is_allowed("anyone", None));

        let config = DiscordConfig::new("token")
            .with_user_allowlist(vec!["42".to_string()])
            .with_guild_allowlist(vec![7]);
        assert!(config.is_allowed("42", Some(7)));
        assert!(config.is_allowed("42", None));
        assert!(!config.is_allowed("42", Some(8)));
        assert!(!config.is_allowed("43", Some(7)));
    }

    #[test]
    fn test_config_serde() {
        let json = r#"{
            "token": "my_token",
            "application_id": 123,
            "guild_allowlist": [456, 789]
        }"#;

        let config: DiscordConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.token, "my_token");
        assert_eq!(config.application_id, 123);
        assert!(config.register_commands);
        assert!(config.user_allowlist.is_empty());
    }
}
