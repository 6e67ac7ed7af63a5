use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::context_data::{DisconnectData, DisconnectReason},
    input::Input,
    model::CloseCode,
    tracks::TrackHandle,
    Call, CoreEvent, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::{AudioPlayer, VoiceConnection},
        session::{SessionEvent, SessionEvents},
        state::{ConnectionStatus, PlayerStatus, KICKED_CLOSE_CODE},
    },
    error::{ConnectionError, PlayerError},
    sources::AudioResource,
};

/// Reproductor sobre un `Call` de songbird. Un track a la vez.
pub struct SongbirdPlayer {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    events: SessionEvents,
    current: parking_lot::Mutex<Option<TrackHandle>>,
    /// Generación del track actual; los eventos de tracks anteriores se ignoran
    generation: Arc<AtomicU64>,
}

impl SongbirdPlayer {
    pub fn new(guild_id: GuildId, call: Arc<Mutex<Call>>, events: SessionEvents) -> Self {
        Self {
            guild_id,
            call,
            events,
            current: parking_lot::Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl AudioPlayer for SongbirdPlayer {
    type Stream = Input;

    async fn play(&self, resource: AudioResource<Input>) -> Result<(), PlayerError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(resource.stream)
        };

        for event in [TrackEvent::Play, TrackEvent::Pause, TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    VoiceEvent::Track(event),
                    TrackRelay {
                        generation,
                        current: Arc::clone(&self.generation),
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| PlayerError(format!("{} ({:?}): {}", resource.song.title(), event, e)))?;
        }

        debug!("🎚️ Track {} en guild {}: {}", generation, self.guild_id, resource.song.title());
        *self.current.lock() = Some(handle);
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        if let Some(handle) = self.current.lock().as_ref() {
            if let Err(e) = handle.set_volume(gain) {
                debug!("No se pudo ajustar el volumen: {:?}", e);
            }
        }
    }

    fn pause(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|handle| handle.pause().is_ok())
    }

    fn resume(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|handle| handle.play().is_ok())
    }

    fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            if let Err(e) = handle.stop() {
                debug!("El track ya había terminado: {:?}", e);
            }
        }
    }

    fn has_resource(&self) -> bool {
        self.current.lock().is_some()
    }
}

/// Reenvía los eventos de un track a su sesión
struct TrackRelay {
    generation: u64,
    current: Arc<AtomicU64>,
    events: SessionEvents,
}

#[async_trait]
impl VoiceEventHandler for TrackRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if self.current.load(Ordering::SeqCst) != self.generation {
            return None;
        }

        let EventContext::Track(tracks) = ctx else {
            return None;
        };

        for (state, _handle) in *tracks {
            let event = match &state.playing {
                songbird::tracks::PlayMode::Play => SessionEvent::Player(PlayerStatus::Playing),
                songbird::tracks::PlayMode::Pause => SessionEvent::Player(PlayerStatus::Paused),
                songbird::tracks::PlayMode::Errored(e) => SessionEvent::PlayerError(format!("{e:?}")),
                _ => SessionEvent::Player(PlayerStatus::Idle),
            };
            // La sesión puede haber terminado ya
            let _ = self.events.send(event);
        }

        None
    }
}

/// Reenvía los eventos del driver de voz como estados de conexión
struct DriverRelay {
    guild_id: GuildId,
    events: SessionEvents,
}

fn disconnect_status(data: &DisconnectData<'_>) -> ConnectionStatus {
    match &data.reason {
        // Desconexión pedida por nosotros
        None => ConnectionStatus::Destroyed,
        Some(DisconnectReason::WsClosed(Some(CloseCode::Disconnected))) => ConnectionStatus::Disconnected {
            close_code: Some(KICKED_CLOSE_CODE),
        },
        Some(_) => ConnectionStatus::Disconnected { close_code: None },
    }
}

#[async_trait]
impl VoiceEventHandler for DriverRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let status = match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => ConnectionStatus::Ready,
            EventContext::DriverDisconnect(data) => {
                let status = disconnect_status(data);
                warn!("🔌 Driver desconectado en guild {}: {:?}", self.guild_id, data.reason);
                status
            }
            _ => return None,
        };

        let _ = self.events.send(SessionEvent::Connection(status));
        None
    }
}

/// Registra los eventos del driver de un guild hacia su sesión
pub fn register_driver_events(call: &mut Call, guild_id: GuildId, events: SessionEvents) {
    for event in [CoreEvent::DriverConnect, CoreEvent::DriverReconnect, CoreEvent::DriverDisconnect] {
        call.add_global_event(
            VoiceEvent::Core(event),
            DriverRelay {
                guild_id,
                events: events.clone(),
            },
        );
    }
}

/// Conexión de voz gestionada por el manager de songbird
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    events: SessionEvents,
}

impl SongbirdConnection {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId, channel_id: ChannelId, events: SessionEvents) -> Self {
        Self {
            manager,
            guild_id,
            channel_id,
            events,
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn rejoin(&self) -> Result<(), ConnectionError> {
        info!("🔄 Reconectando al canal de voz en guild {}", self.guild_id);
        let _ = self.events.send(SessionEvent::Connection(ConnectionStatus::Connecting));

        self.manager
            .join(self.guild_id, self.channel_id)
            .await
            .map(|_| ())
            .map_err(|e| ConnectionError::Rejoin(e.to_string()))
    }

    async fn destroy(&self) -> Result<(), ConnectionError> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| ConnectionError::Destroy(e.to_string()))?;

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}
