//! Discord bot wiring and event handling.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, error, info};
use poise::{
    Framework, FrameworkOptions,
    serenity_prelude::{
        ActivityData, ClientBuilder, Context, FullEvent, GatewayIntents,
        Message as SerenityMessage,
    },
};

use crate::config::Config;
use crate::cooldown::{CooldownPolicy, CooldownTracker, SystemClock};
use crate::error::Result;
use crate::gate::{GateConfig, InboundMessage, MessageGate};
use crate::health;
use crate::openrouter::OpenRouterClient;
use crate::responder::{ReplyTarget, Responder};

type EventResult = std::result::Result<(), Box<dyn StdError + Send + Sync>>;

const ACTIVITY: &str = "quietamente observando";

pub struct Data {
    responder: Responder<OpenRouterClient>,
}

/// Replies to a single Discord message.
struct DiscordReply<'a> {
    ctx: &'a Context,
    message: &'a SerenityMessage,
}

#[async_trait]
impl ReplyTarget for DiscordReply<'_> {
    async fn send_typing(&self) -> Result<()> {
        self.message
            .channel_id
            .broadcast_typing(&self.ctx.http)
            .await?;
        Ok(())
    }

    async fn reply(&self, text: &str) -> Result<()> {
        self.message.reply(&self.ctx.http, text).await?;
        Ok(())
    }
}

/// Run the Discord bot and the health endpoint.
pub async fn run() -> Result<()> {
    let started_at = Instant::now();

    info!("Initializing bot");
    let config = Config::from_env()?;

    let port = config.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port, started_at).await {
            error!("HTTP server stopped: {e}");
        }
    });

    debug!("Initializing OpenRouter client");
    let openrouter_client = OpenRouterClient::new(
        config.openrouter_api_key.clone(),
        config.openrouter_api_url.clone(),
    )?;

    let tracker = CooldownTracker::in_memory(CooldownPolicy::new(config.privileged_user_id));
    let gate = MessageGate::new(
        GateConfig {
            auto_reply_channel: config.auto_reply_channel_id,
        },
        tracker,
        Arc::new(SystemClock),
    );
    let responder = Responder::new(gate, openrouter_client);

    debug!("Setting up gateway intents");
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;

    debug!("Building framework");
    let framework = Framework::builder()
        .options(FrameworkOptions {
            event_handler: |ctx, event, _framework, data| Box::pin(event_handler(ctx, event, data)),
            ..Default::default()
        })
        .setup(move |_ctx, _ready, _framework| {
            Box::pin(async move {
                info!("Bot is ready and connected to Discord");
                Ok(Data { responder })
            })
        })
        .build();

    debug!("Creating Discord client");
    let mut client = ClientBuilder::new(config.discord_token, intents)
        .framework(framework)
        .await?;

    info!("Starting Discord client");

    tokio::select! {
        result = client.start() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    Ok(())
}

async fn event_handler(ctx: &Context, event: &FullEvent, data: &Data) -> EventResult {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!("Online as {}", data_about_bot.user.tag());
            ctx.set_activity(Some(ActivityData::watching(ACTIVITY)));
        }
        FullEvent::Message { new_message } => {
            let bot_user_id = ctx.cache.current_user().id;
            let bot_role_ids = new_message
                .guild_id
                .and_then(|guild_id| {
                    let guild = ctx.cache.guild(guild_id)?;
                    guild
                        .members
                        .get(&bot_user_id)
                        .map(|member| member.roles.clone())
                })
                .unwrap_or_default();
            let message = InboundMessage::from_serenity(new_message, bot_user_id, &bot_role_ids);
            let target = DiscordReply {
                ctx,
                message: new_message,
            };
            data.responder.handle_message(&message, &target).await;
        }
        _ => {}
    }
    Ok(())
}
