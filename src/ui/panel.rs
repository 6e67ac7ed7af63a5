use anyhow::Result;
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
        CreateMessage, EditInteractionResponse, EditMessage,
    },
    collector::ComponentInteractionCollector,
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, MessageId},
    },
    prelude::Context,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::debug;

use crate::{
    bot::handlers::voice_channel_of,
    sources::Song,
    ui::{
        controls::{button_rows, Actor, ButtonPress, ControlSurface, PanelHandle, Responder},
        Announcer,
    },
};

/// Avisos de la sesión en su canal de texto
pub struct ChannelAnnouncer {
    ctx: Context,
    channel_id: ChannelId,
}

impl ChannelAnnouncer {
    pub fn new(ctx: Context, channel_id: ChannelId) -> Self {
        Self { ctx, channel_id }
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn send(&self, content: String) -> Result<()> {
        self.channel_id.say(&self.ctx.http, content).await?;
        Ok(())
    }
}

/// Publica el panel de "now playing" con sus botones
pub struct ChannelSurface {
    ctx: Context,
    channel_id: ChannelId,
}

impl ChannelSurface {
    pub fn new(ctx: Context, channel_id: ChannelId) -> Self {
        Self { ctx, channel_id }
    }
}

#[async_trait]
impl ControlSurface for ChannelSurface {
    async fn render(&self, song: &Song) -> Result<Box<dyn PanelHandle>> {
        let message = self
            .channel_id
            .send_message(
                &self.ctx.http,
                CreateMessage::new()
                    .content(song.start_message())
                    .components(button_rows()),
            )
            .await?;

        debug!("🎛️ Panel {} publicado para {}", message.id, song.title());
        Ok(Box::new(MessagePanel {
            ctx: self.ctx.clone(),
            channel_id: self.channel_id,
            message_id: message.id,
        }))
    }
}

pub struct MessagePanel {
    ctx: Context,
    channel_id: ChannelId,
    message_id: MessageId,
}

#[async_trait]
impl PanelHandle for MessagePanel {
    fn presses(&self, lifetime: Duration) -> BoxStream<'static, ButtonPress> {
        let ctx = self.ctx.clone();
        ComponentInteractionCollector::new(&self.ctx)
            .message_id(self.message_id)
            .timeout(lifetime)
            .stream()
            .map(move |interaction| {
                let actor = Actor {
                    user_id: interaction.user.id,
                    voice_channel: interaction
                        .guild_id
                        .and_then(|guild_id| voice_channel_of(&ctx, guild_id, interaction.user.id)),
                };
                ButtonPress {
                    action_id: interaction.data.custom_id.clone(),
                    actor,
                    responder: Arc::new(InteractionReply::component(ctx.clone(), interaction)),
                }
            })
            .boxed()
    }

    async fn clear_buttons(&self) -> Result<()> {
        self.channel_id
            .edit_message(&self.ctx.http, self.message_id, EditMessage::new().components(vec![]))
            .await?;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.channel_id.delete_message(&self.ctx.http, self.message_id).await?;
        Ok(())
    }
}

enum Interaction {
    Command(CommandInteraction),
    Component(ComponentInteraction),
}

/// Respuesta a una interacción de Discord, de comando o de botón.
///
/// Slash commands are deferred with a "thinking" state and the first reply
/// fills it in; buttons are acknowledged silently and every reply is a
/// followup message.
pub struct InteractionReply {
    ctx: Context,
    interaction: Interaction,
    acknowledged: AtomicBool,
    replied: AtomicBool,
}

impl InteractionReply {
    pub fn command(ctx: Context, interaction: CommandInteraction) -> Self {
        Self::new(ctx, Interaction::Command(interaction))
    }

    pub fn component(ctx: Context, interaction: ComponentInteraction) -> Self {
        Self::new(ctx, Interaction::Component(interaction))
    }

    fn new(ctx: Context, interaction: Interaction) -> Self {
        Self {
            ctx,
            interaction,
            acknowledged: AtomicBool::new(false),
            replied: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Responder for InteractionReply {
    async fn acknowledge(&self) -> Result<()> {
        if self.acknowledged.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let http = &self.ctx.http;
        match &self.interaction {
            Interaction::Command(command) => {
                command
                    .create_response(http, CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()))
                    .await?
            }
            Interaction::Component(component) => {
                component
                    .create_response(http, CreateInteractionResponse::Acknowledge)
                    .await?
            }
        }
        Ok(())
    }

    async fn reply(&self, content: String) -> Result<()> {
        let http = &self.ctx.http;
        let first = !self.replied.swap(true, Ordering::SeqCst);
        let acknowledged = self.acknowledged.load(Ordering::SeqCst);

        match &self.interaction {
            Interaction::Command(command) if !acknowledged => {
                self.acknowledged.store(true, Ordering::SeqCst);
                command
                    .create_response(
                        http,
                        CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
                    )
                    .await?;
            }
            Interaction::Command(command) if first => {
                command
                    .edit_response(http, EditInteractionResponse::new().content(content))
                    .await?;
            }
            Interaction::Command(command) => {
                command
                    .create_followup(http, CreateInteractionResponseFollowup::new().content(content))
                    .await?;
            }
            Interaction::Component(component) if !acknowledged => {
                self.acknowledged.store(true, Ordering::SeqCst);
                component
                    .create_response(
                        http,
                        CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
                    )
                    .await?;
            }
            Interaction::Component(component) => {
                component
                    .create_followup(http, CreateInteractionResponseFollowup::new().content(content))
                    .await?;
            }
        }
        Ok(())
    }

    fn has_replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }
}
