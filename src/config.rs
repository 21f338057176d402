use std::env;

use log::{debug, error, info};
use poise::serenity_prelude::{ChannelId, UserId};

use crate::error::{BotError, Result};
use crate::openrouter::OPENROUTER_API_URL;

const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub openrouter_api_key: String,
    pub openrouter_api_url: String,
    pub privileged_user_id: Option<UserId>,
    pub auto_reply_channel_id: Option<ChannelId>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        debug!("Loading configuration from environment");
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// Empty values are treated the same as missing ones.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let discord_token = var("DISCORD_BOT_TOKEN").ok_or_else(|| {
            error!("DISCORD_BOT_TOKEN is not set");
            BotError::MissingEnv("DISCORD_BOT_TOKEN")
        })?;

        let openrouter_api_key = var("OPENAI_API_KEY").ok_or_else(|| {
            error!("OPENAI_API_KEY (OpenRouter key) is not set");
            BotError::MissingEnv("OPENAI_API_KEY")
        })?;

        let openrouter_api_url =
            var("OPENROUTER_API_URL").unwrap_or_else(|| OPENROUTER_API_URL.to_string());

        let privileged_user_id = var("IMPERADOR_USER_ID")
            .map(|raw| parse_snowflake("IMPERADOR_USER_ID", &raw).map(UserId::new))
            .transpose()?;

        let auto_reply_channel_id = var("CANAL_AUTO_RESPOSTA")
            .map(|raw| parse_snowflake("CANAL_AUTO_RESPOSTA", &raw).map(ChannelId::new))
            .transpose()?;

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                error!("Invalid PORT value '{raw}': {e}");
                BotError::Config(format!("PORT must be a valid port number, got '{raw}'"))
            })?,
            None => DEFAULT_PORT,
        };

        info!("Configuration loaded successfully");
        debug!("Discord token length: {} characters", discord_token.len());
        debug!(
            "OpenRouter API key length: {} characters",
            openrouter_api_key.len()
        );
        debug!("OpenRouter endpoint: {openrouter_api_url}");
        debug!("Privileged user: {privileged_user_id:?}");
        debug!("Auto-reply channel: {auto_reply_channel_id:?}");
        debug!("Health port: {port}");

        Ok(Self {
            discord_token,
            openrouter_api_key,
            openrouter_api_url,
            privileged_user_id,
            auto_reply_channel_id,
            port,
        })
    }
}

fn parse_snowflake(key: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            error!("Invalid {key} value '{raw}'");
            Err(BotError::Config(format!(
                "{key} must be a non-zero Discord id, got '{raw}'"
            )))
        }
        Ok(id) => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DISCORD_BOT_TOKEN", "discord-token"),
        ("OPENAI_API_KEY", "sk-or-key"),
    ];

    #[test]
    fn defaults_apply_when_optional_values_missing() {
        let config = Config::from_lookup(lookup(&REQUIRED)).expect("config should load");
        assert_eq!(config.port, 3000);
        assert_eq!(config.openrouter_api_url, OPENROUTER_API_URL);
        assert!(config.privileged_user_id.is_none());
        assert!(config.auto_reply_channel_id.is_none());
    }

    #[test]
    fn missing_discord_token_is_fatal() {
        let result = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "key")]));
        assert!(matches!(
            result,
            Err(BotError::MissingEnv("DISCORD_BOT_TOKEN"))
        ));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let result = Config::from_lookup(lookup(&[
            ("DISCORD_BOT_TOKEN", "token"),
            ("OPENAI_API_KEY", "   "),
        ]));
        assert!(matches!(result, Err(BotError::MissingEnv("OPENAI_API_KEY"))));
    }

    #[test]
    fn parses_optional_ids_and_port() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("IMPERADOR_USER_ID", "398543560330444813"),
            ("CANAL_AUTO_RESPOSTA", "1122334455"),
            ("PORT", "8080"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).expect("config should load");
        assert_eq!(
            config.privileged_user_id,
            Some(UserId::new(398_543_560_330_444_813))
        );
        assert_eq!(
            config.auto_reply_channel_id,
            Some(ChannelId::new(1_122_334_455))
        );
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn rejects_zero_and_garbage_ids() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("IMPERADOR_USER_ID", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(BotError::Config(_))
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CANAL_AUTO_RESPOSTA", "general"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(BotError::Config(_))
        ));
    }

    #[test]
    fn rejects_invalid_port() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "70000"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(BotError::Config(_))
        ));
    }
}
