use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::audio::{
    queue::MusicQueue,
    state::{ConnectionStatus, PlayerStatus},
};

/// Sesiones activas, una por servidor
pub struct SessionRegistry<S> {
    sessions: DashMap<GuildId, Arc<MusicQueue<S>>>,
}

impl<S: Send + 'static> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<MusicQueue<S>>> {
        self.sessions.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, queue: Arc<MusicQueue<S>>) {
        info!("🎧 Nueva sesión en guild {}", queue.guild_id());
        self.sessions.insert(queue.guild_id(), queue);
    }

    /// Quita `queue` solo si sigue siendo la sesión registrada de su guild
    pub fn release(&self, queue: &MusicQueue<S>) -> bool {
        let guild_id = queue.guild_id();
        let released = self
            .sessions
            .remove_if(&guild_id, |_, current| std::ptr::eq(Arc::as_ptr(current), queue))
            .is_some();
        if released {
            debug!("🗑️ Sesión eliminada en guild {}", guild_id);
        }
        released
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S: Send + 'static> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Evento del driver de voz dirigido a una sesión
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Player(PlayerStatus),
    PlayerError(String),
    Connection(ConnectionStatus),
}

pub type SessionEvents = mpsc::UnboundedSender<SessionEvent>;

/// Delivers driver events to the queue one at a time, in arrival order,
/// until the session shuts down or every sender is gone.
pub fn spawn_event_loop<S: Send + 'static>(
    queue: Arc<MusicQueue<S>>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) -> JoinHandle<()> {
    let shutdown = queue.shutdown_token();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                SessionEvent::Player(status) => queue.on_player_state(status).await,
                SessionEvent::PlayerError(message) => queue.on_player_error(&message).await,
                SessionEvent::Connection(status) => queue.on_connection_state(status).await,
            }
        }
        debug!("🔚 Bucle de eventos terminado en guild {}", queue.guild_id());
    })
}
