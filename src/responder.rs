//! Turns admitted messages into replies.

use async_trait::async_trait;
use log::{debug, error, info};

use crate::cooldown::{CooldownStore, InMemoryCooldownStore};
use crate::error::Result;
use crate::gate::{GateDecision, InboundMessage, MessageGate, truncate_reply};
use crate::openrouter::CompletionBackend;

/// Sent when the completion service produced nothing usable.
pub const COMPLETION_FAILED_REPLY: &str = "Erro ao processar a requisição.";

/// Sent when handling a message failed unexpectedly.
pub const INTERNAL_ERROR_REPLY: &str = "Erro interno.";

/// Where the answer to one inbound message goes.
#[async_trait]
pub trait ReplyTarget: Send + Sync {
    async fn send_typing(&self) -> Result<()>;

    async fn reply(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(GateDecision),
    Replied(String),
}

pub struct Responder<C, S = InMemoryCooldownStore> {
    gate: MessageGate<S>,
    completion: C,
}

impl<C: CompletionBackend, S: CooldownStore> Responder<C, S> {
    pub fn new(gate: MessageGate<S>, completion: C) -> Self {
        Self { gate, completion }
    }

    pub fn gate(&self) -> &MessageGate<S> {
        &self.gate
    }

    /// Answer `message` if the gate admits it.
    pub async fn respond<T: ReplyTarget + ?Sized>(
        &self,
        message: &InboundMessage,
        target: &T,
    ) -> Result<Outcome> {
        let prompt = match self.gate.evaluate(message) {
            GateDecision::Respond { prompt, .. } => prompt,
            decision => {
                debug!(
                    "Skipping message from {} in channel {}: {decision:?}",
                    message.author_id, message.channel_id
                );
                return Ok(Outcome::Skipped(decision));
            }
        };

        info!(
            "Received message from {} in channel {}: {}",
            message.author_id, message.channel_id, message.content
        );

        target.send_typing().await?;

        let reply = match self.completion.complete(&prompt, message.author_id).await {
            Some(text) => truncate_reply(&text),
            None => COMPLETION_FAILED_REPLY.to_string(),
        };

        target.reply(&reply).await?;
        info!(
            "Replied to {} in channel {}: {}",
            message.author_id, message.channel_id, reply
        );

        Ok(Outcome::Replied(reply))
    }

    /// Top-level boundary for one message: failures are logged and answered
    /// with a generic reply, never propagated.
    pub async fn handle_message<T: ReplyTarget + ?Sized>(
        &self,
        message: &InboundMessage,
        target: &T,
    ) {
        if let Err(e) = self.respond(message, target).await {
            error!(
                "Error processing message from {} in channel {}: {e}",
                message.author_id, message.channel_id
            );
            if let Err(e) = target.reply(INTERNAL_ERROR_REPLY).await {
                debug!("Failed to send error reply: {e}");
            }
        }
    }
}
