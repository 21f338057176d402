//! Decides whether an inbound message gets a reply, and with what prompt.

use std::sync::{Arc, LazyLock};

use log::debug;
use poise::serenity_prelude::{ChannelId, Message as SerenityMessage, RoleId, UserId};
use regex::Regex;

use crate::cooldown::{Clock, CooldownStore, CooldownTracker, InMemoryCooldownStore};

/// Discord's message length limit.
pub const MAX_REPLY_CHARS: usize = 2000;

const ELLIPSIS: &str = "...";
/// Counted in UTF-16 code units, so a lone emoji is long enough.
const MIN_CONTENT_UNITS: usize = 2;

const PRIVILEGED_PLACEHOLDER: &str = "Mensagem do Imperador.";
const DEFAULT_PLACEHOLDER: &str = "Usuário chamou o bot.";

static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?[0-9]+>").expect("mention pattern is valid"));

/// The parts of a chat message the gate looks at.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub author_id: UserId,
    pub author_is_bot: bool,
    pub channel_id: ChannelId,
    pub content: String,
    pub mentions_bot: bool,
}

impl InboundMessage {
    /// `bot_role_ids` are the roles the bot's member holds in the message's
    /// guild; empty outside guilds or when the member is not cached.
    pub fn from_serenity(
        message: &SerenityMessage,
        bot_user_id: UserId,
        bot_role_ids: &[RoleId],
    ) -> Self {
        Self {
            author_id: message.author.id,
            author_is_bot: message.author.bot,
            channel_id: message.channel_id,
            content: message.content.clone(),
            mentions_bot: addresses_bot(
                message.mention_everyone,
                message.mentions_user_id(bot_user_id),
                &message.mention_roles,
                bot_role_ids,
            ),
        }
    }
}

/// A message reaches the bot through `@everyone`/`@here`, a direct mention,
/// or a mention of any role the bot holds.
#[must_use]
pub fn addresses_bot(
    mention_everyone: bool,
    mentions_bot_user: bool,
    mention_roles: &[RoleId],
    bot_role_ids: &[RoleId],
) -> bool {
    mention_everyone
        || mentions_bot_user
        || mention_roles.iter().any(|role| bot_role_ids.contains(role))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    FromBot,
    TooShort,
    NotAddressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Ignore(IgnoreReason),
    CoolingDown,
    Respond { prompt: String, privileged: bool },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GateConfig {
    pub auto_reply_channel: Option<ChannelId>,
}

impl GateConfig {
    /// With a channel configured, every message in it is addressed to the
    /// bot and messages elsewhere never are. Without one, a mention is needed.
    #[must_use]
    pub fn is_addressed(&self, message: &InboundMessage) -> bool {
        let in_channel = self
            .auto_reply_channel
            .is_none_or(|channel| channel == message.channel_id);
        in_channel && (message.mentions_bot || self.auto_reply_channel.is_some())
    }
}

pub struct MessageGate<S = InMemoryCooldownStore> {
    config: GateConfig,
    tracker: CooldownTracker<S>,
    clock: Arc<dyn Clock>,
}

impl<S: CooldownStore> MessageGate<S> {
    pub fn new(config: GateConfig, tracker: CooldownTracker<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            tracker,
            clock,
        }
    }

    pub fn tracker(&self) -> &CooldownTracker<S> {
        &self.tracker
    }

    /// Evaluate a message once. An admitted message consumes the author's
    /// cooldown slot whatever happens afterwards.
    pub fn evaluate(&self, message: &InboundMessage) -> GateDecision {
        if message.author_is_bot {
            return GateDecision::Ignore(IgnoreReason::FromBot);
        }
        if message.content.trim().encode_utf16().count() < MIN_CONTENT_UNITS {
            return GateDecision::Ignore(IgnoreReason::TooShort);
        }
        if !self.config.is_addressed(message) {
            return GateDecision::Ignore(IgnoreReason::NotAddressed);
        }

        if !self.tracker.try_admit(message.author_id, self.clock.now()) {
            return GateDecision::CoolingDown;
        }

        let privileged = self.tracker.policy().is_privileged(message.author_id);
        let prompt = prompt_text(&message.content, privileged);
        debug!("Admitted message from {} as prompt: {prompt}", message.author_id);

        GateDecision::Respond { prompt, privileged }
    }
}

/// Remove `<@id>` and `<@!id>` tokens and surrounding whitespace.
#[must_use]
pub fn strip_mentions(content: &str) -> String {
    USER_MENTION.replace_all(content, "").trim().to_string()
}

fn prompt_text(content: &str, privileged: bool) -> String {
    let stripped = strip_mentions(content);
    if !stripped.is_empty() {
        return stripped;
    }
    if privileged {
        PRIVILEGED_PLACEHOLDER.to_string()
    } else {
        DEFAULT_PLACEHOLDER.to_string()
    }
}

/// Fit a reply into a single Discord message.
#[must_use]
pub fn truncate_reply(text: &str) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text.to_string();
    }
    let keep = MAX_REPLY_CHARS - ELLIPSIS.len();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
