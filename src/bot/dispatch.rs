//! Command execution shared by slash commands and panel buttons.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::{MusicQueue, SessionRegistry},
    error::QueueError,
    sources::Song,
    ui::{
        controls::{CommandDispatch, Invocation},
        messages,
    },
};

pub struct Commands<S> {
    sessions: Arc<SessionRegistry<S>>,
}

impl<S: Send + 'static> Commands<S> {
    pub fn new(sessions: Arc<SessionRegistry<S>>) -> Self {
        Self { sessions }
    }

    /// La sesión del guild si el usuario puede tocarla; si no, responde y devuelve `None`
    async fn session(&self, invocation: &Invocation) -> Result<Option<Arc<MusicQueue<S>>>> {
        let Some(queue) = self.sessions.get(invocation.guild_id) else {
            invocation.responder.reply(messages::no_queue()).await?;
            return Ok(None);
        };

        if !queue.can_modify(&invocation.actor) {
            invocation.responder.reply(messages::not_same_channel()).await?;
            return Ok(None);
        }

        Ok(Some(queue))
    }

    /// Encola una canción ya resuelta en la sesión existente.
    ///
    /// Returns `false` without replying when the session is already leaving
    /// its channel; the caller should retry on a fresh session.
    pub async fn enqueue(&self, queue: &Arc<MusicQueue<S>>, invocation: &Invocation, song: Song) -> Result<bool> {
        let title = song.title().to_string();
        let content = match queue.enqueue(vec![song]).await {
            Ok(()) => messages::queued(&title, &invocation.actor.mention()),
            Err(QueueError::QueueFull { max }) => {
                warn!("🚫 Cola llena en guild {}", invocation.guild_id);
                messages::queue_full(max)
            }
            Err(QueueError::SessionClosed) => {
                debug!("🚪 La sesión de guild {} se está cerrando", invocation.guild_id);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        invocation.responder.reply(content).await?;
        Ok(true)
    }

    pub async fn volume(&self, invocation: Invocation, level: Option<i64>) -> Result<()> {
        let Some(queue) = self.session(&invocation).await? else {
            return Ok(());
        };

        let content = match level {
            None => messages::current_volume(queue.snapshot().volume),
            Some(level) => {
                let level = level.clamp(0, 100) as u8;
                queue.set_volume_level(&invocation.actor, level);
                messages::volume_set(&invocation.actor.mention(), level)
            }
        };
        invocation.responder.reply(content).await
    }

    pub async fn move_track(&self, invocation: Invocation, from: i64, to: i64) -> Result<()> {
        let Some(queue) = self.session(&invocation).await? else {
            return Ok(());
        };

        let position = |value: i64| usize::try_from(value).unwrap_or(0);
        let content = match queue.move_track(position(from), position(to)) {
            Ok((song, position)) => messages::moved(&invocation.actor.mention(), song.title(), position),
            Err(_) => messages::move_usage(),
        };
        invocation.responder.reply(content).await
    }

    pub async fn show_queue(&self, invocation: Invocation) -> Result<()> {
        let content = match self.sessions.get(invocation.guild_id) {
            Some(queue) => messages::queue_listing(&queue.snapshot()),
            None => messages::no_queue(),
        };
        invocation.responder.reply(content).await
    }
}

#[async_trait]
impl<S: Send + 'static> CommandDispatch for Commands<S> {
    async fn execute(&self, command: &str, invocation: Invocation) -> Result<()> {
        let Some(queue) = self.session(&invocation).await? else {
            return Ok(());
        };

        info!("📝 /{} por {} en guild {}", command, invocation.actor.user_id, invocation.guild_id);
        let author = invocation.actor.mention();

        let content = match command {
            "skip" => {
                queue.skip();
                messages::skipped(&author)
            }
            "pause" => {
                if queue.pause() {
                    messages::paused(&author)
                } else {
                    messages::nothing_playing()
                }
            }
            "resume" => {
                if queue.resume() {
                    messages::resumed(&author)
                } else {
                    messages::not_playing()
                }
            }
            "stop" => {
                queue.stop().await;
                messages::stopped(&author)
            }
            "loop" => messages::loop_state(queue.toggle_loop()),
            "shuffle" => {
                queue.shuffle();
                messages::shuffled(&author)
            }
            other => anyhow::bail!("Comando no reconocido: {}", other),
        };

        invocation.responder.reply(content).await
    }
}
