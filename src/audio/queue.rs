use rand::seq::SliceRandom;
use serenity::model::id::GuildId;
use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        player::{AudioPlayer, VoiceConnection},
        session::SessionRegistry,
        state::{
            connection_transition, effective_gain, player_transition, ConnectionEffect, ConnectionStatus,
            ConnectionWatch, Phase, PlayerEffect, PlayerStatus,
        },
    },
    error::QueueError,
    sources::{AudioResource, Song, TrackProvider},
    ui::{
        controls::{run_panel, ActionRegistry, Actor, ControlSurface, ModifyGuard},
        messages, Announcer,
    },
};

/// Ajustes de la cola que vienen de la configuración
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    pub default_volume: u8,
    /// Tiempo en el canal tras vaciarse la cola
    pub stay_time: Duration,
    pub pruning: bool,
    pub max_queue_size: usize,
    /// Fallos de stream consecutivos antes de abandonar la cola
    pub max_stream_failures: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_volume: 100,
            stay_time: Duration::from_secs(30),
            pruning: false,
            max_queue_size: 1000,
            max_stream_failures: 5,
        }
    }
}

/// Colaboradores de una sesión
pub struct SessionParts<S> {
    pub provider: Arc<dyn TrackProvider<Stream = S>>,
    pub player: Arc<dyn AudioPlayer<Stream = S>>,
    pub connection: Arc<dyn VoiceConnection>,
    pub announcer: Arc<dyn Announcer>,
    pub surface: Arc<dyn ControlSurface>,
    pub guard: ModifyGuard,
    pub actions: Arc<ActionRegistry<S>>,
    pub registry: Weak<SessionRegistry<S>>,
}

/// Copia del estado de la cola para comandos y tests
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub tracks: Vec<Arc<Song>>,
    pub current: Option<Arc<Song>>,
    pub volume: u8,
    pub muted: bool,
    pub loop_enabled: bool,
    pub phase: Phase,
    pub player_status: PlayerStatus,
    pub connection: ConnectionStatus,
    pub watch: ConnectionWatch,
    pub rejoin_attempts: u32,
}

impl QueueSnapshot {
    pub fn titles(&self) -> Vec<String> {
        self.tracks.iter().map(|song| song.title().to_string()).collect()
    }

    /// Duración conocida de todo lo que queda en la cola
    pub fn total_duration(&self) -> Duration {
        self.tracks.iter().filter_map(|song| song.duration()).sum()
    }
}

struct QueueState {
    tracks: VecDeque<Arc<Song>>,
    current: Option<Arc<Song>>,
    volume: u8,
    muted: bool,
    loop_enabled: bool,
    phase: Phase,
    player_status: PlayerStatus,
    watch: ConnectionWatch,
    rejoin_attempts: u32,
    consecutive_failures: u32,
    /// Incrementa con cada `advance()`; un resultado con ticket viejo se descarta
    advance_ticket: u64,
    teardown: Option<JoinHandle<()>>,
    /// La sesión se está cerrando o ya cerró; no acepta más canciones
    closed: bool,
}

impl QueueState {
    /// Completion policy: the head rotates to the tail when looping, otherwise it is dropped.
    fn retire_head(&mut self) -> Option<Arc<Song>> {
        let head = self.tracks.pop_front()?;
        if self.loop_enabled {
            self.tracks.push_back(Arc::clone(&head));
        }
        Some(head)
    }

    fn gain(&self) -> f32 {
        effective_gain(self.volume, self.muted)
    }
}

enum Opened<S> {
    Discard,
    Play(AudioResource<S>, f32),
    Retry,
    GiveUp,
}

/// Cola de reproducción de un servidor.
///
/// Owns the ordered tracks and drives the player from them. The head of
/// `tracks` is always the song being played (or about to be). State lives
/// behind a single lock that is never held across an await; re-entrancy is
/// resolved by [`Phase`] and [`ConnectionWatch`].
pub struct MusicQueue<S> {
    guild_id: GuildId,
    settings: QueueSettings,
    provider: Arc<dyn TrackProvider<Stream = S>>,
    player: Arc<dyn AudioPlayer<Stream = S>>,
    connection: Arc<dyn VoiceConnection>,
    announcer: Arc<dyn Announcer>,
    surface: Arc<dyn ControlSurface>,
    guard: ModifyGuard,
    actions: Arc<ActionRegistry<S>>,
    registry: Weak<SessionRegistry<S>>,
    link_status: watch::Sender<ConnectionStatus>,
    shutdown: CancellationToken,
    state: parking_lot::Mutex<QueueState>,
}

impl<S: Send + 'static> MusicQueue<S> {
    pub fn new(guild_id: GuildId, settings: QueueSettings, parts: SessionParts<S>) -> Arc<Self> {
        let (link_status, _) = watch::channel(ConnectionStatus::Ready);
        let state = QueueState {
            tracks: VecDeque::new(),
            current: None,
            volume: settings.default_volume.min(100),
            muted: false,
            loop_enabled: false,
            phase: Phase::Empty,
            player_status: PlayerStatus::Idle,
            watch: ConnectionWatch::Idle,
            rejoin_attempts: 0,
            consecutive_failures: 0,
            advance_ticket: 0,
            teardown: None,
            closed: false,
        };

        Arc::new(Self {
            guild_id,
            settings,
            provider: parts.provider,
            player: parts.player,
            connection: parts.connection,
            announcer: parts.announcer,
            surface: parts.surface,
            guard: parts.guard,
            actions: parts.actions,
            registry: parts.registry,
            link_status,
            shutdown: CancellationToken::new(),
            state: parking_lot::Mutex::new(state),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Se cancela cuando la sesión termina
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn can_modify(&self, actor: &Actor) -> bool {
        (self.guard)(actor)
    }

    pub fn player_status(&self) -> PlayerStatus {
        self.state.lock().player_status
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            tracks: state.tracks.iter().cloned().collect(),
            current: state.current.clone(),
            volume: state.volume,
            muted: state.muted,
            loop_enabled: state.loop_enabled,
            phase: state.phase,
            player_status: state.player_status,
            connection: *self.link_status.borrow(),
            watch: state.watch,
            rejoin_attempts: state.rejoin_attempts,
        }
    }

    /// Canciones detrás de la que suena
    pub fn upcoming(&self) -> Vec<Arc<Song>> {
        self.state.lock().tracks.iter().skip(1).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tracks.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Resolves once the session has left its channel and been deregistered.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    async fn announce(&self, content: String) {
        if let Err(e) = self.announcer.send(content).await {
            warn!("⚠️ No se pudo enviar mensaje al canal: {:?}", e);
        }
    }

    /// Agrega canciones al final de la cola y arranca la reproducción si estaba parada
    pub async fn enqueue(self: &Arc<Self>, songs: Vec<Song>) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(QueueError::SessionClosed);
            }
            let max = self.settings.max_queue_size;
            if state.tracks.len() + songs.len() > max {
                return Err(QueueError::QueueFull { max });
            }

            if let Some(teardown) = state.teardown.take() {
                debug!("⏹️ Desconexión cancelada en guild {}", self.guild_id);
                teardown.abort();
            }
            if state.phase == Phase::Draining {
                state.phase = Phase::Empty;
            }

            for song in songs {
                info!("➕ Agregado a la cola: {}", song.title());
                state.tracks.push_back(Arc::new(song));
            }
        }

        self.advance().await;
        Ok(())
    }

    /// Promotes the head of the queue into playback.
    ///
    /// No-op while another advance is opening a stream or while the player
    /// is busy. Streams that fail to open are retired with the completion
    /// policy until one plays or the consecutive failure cap is hit.
    pub async fn advance(self: &Arc<Self>) {
        loop {
            let next = {
                let mut state = self.state.lock();
                if state.phase == Phase::Advancing || state.player_status != PlayerStatus::Idle {
                    return;
                }
                let head = state.tracks.front().cloned();
                head.map(|head| {
                    state.advance_ticket += 1;
                    state.phase = Phase::Advancing;
                    (head, state.advance_ticket)
                })
            };

            let Some((head, ticket)) = next else {
                self.stop().await;
                return;
            };

            let opened = head.open_stream(self.provider.as_ref()).await;

            let outcome = {
                let mut state = self.state.lock();
                if state.advance_ticket != ticket || state.phase != Phase::Advancing {
                    debug!("🗑️ Stream descartado, la cola cambió mientras abría: {}", head.title());
                    Opened::Discard
                } else {
                    match opened {
                        Ok(resource) => {
                            state.consecutive_failures = 0;
                            state.phase = Phase::Playing;
                            state.player_status = PlayerStatus::Buffering;
                            state.current = Some(Arc::clone(&head));
                            let gain = state.gain();
                            Opened::Play(resource, gain)
                        }
                        Err(e) => {
                            warn!("❌ No se pudo abrir el stream: {}", e);
                            self.record_failure(&mut state)
                        }
                    }
                }
            };

            match outcome {
                Opened::Discard => return,
                Opened::Retry => continue,
                Opened::GiveUp => {
                    self.stop().await;
                    return;
                }
                Opened::Play(resource, gain) => {
                    info!("▶️ Reproduciendo: {}", head.title());
                    match self.player.play(resource).await {
                        Ok(()) => {
                            self.player.set_gain(gain);
                            if self.state.lock().phase == Phase::Draining {
                                self.player.stop();
                            }
                            return;
                        }
                        Err(e) => {
                            error!("❌ El reproductor rechazó {}: {}", head.title(), e);
                            let outcome = {
                                let mut state = self.state.lock();
                                if state.phase == Phase::Draining {
                                    return;
                                }
                                state.player_status = PlayerStatus::Idle;
                                state.current = None;
                                self.record_failure(&mut state)
                            };
                            if matches!(outcome, Opened::GiveUp) {
                                self.stop().await;
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    fn record_failure(&self, state: &mut QueueState) -> Opened<S> {
        state.consecutive_failures += 1;
        state.phase = Phase::Empty;

        if state.consecutive_failures >= self.settings.max_stream_failures {
            error!(
                "🚫 {} fallos de stream seguidos en guild {}, se descarta la cola ({} canciones)",
                state.consecutive_failures,
                self.guild_id,
                state.tracks.len()
            );
            state.tracks.clear();
            state.consecutive_failures = 0;
            return Opened::GiveUp;
        }

        state.retire_head();
        Opened::Retry
    }

    /// Vacía la cola y programa la salida del canal. Idempotente.
    pub async fn stop(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.phase == Phase::Draining {
                return;
            }
            state.phase = Phase::Draining;
            state.loop_enabled = false;
            state.tracks.clear();
            state.current = None;
            state.consecutive_failures = 0;
            // El `Idle` que reporte el motor después no debe tocar la cola
            state.player_status = PlayerStatus::Idle;

            // El handle se guarda antes de soltar el lock para que la tarea siempre lo encuentre
            if state.teardown.is_none() {
                let queue = Arc::clone(self);
                let stay_time = self.settings.stay_time;
                state.teardown = Some(tokio::spawn(async move {
                    tokio::time::sleep(stay_time).await;
                    queue.teardown().await;
                }));
            }
        }

        self.player.stop();
        info!("⏹️ Cola terminada en guild {}", self.guild_id);

        if !self.settings.pruning {
            self.announce(messages::queue_ended()).await;
        }
    }

    async fn teardown(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.teardown.take().is_none() {
                return;
            }
            state.closed = true;
        }

        info!("👋 Saliendo del canal de voz en guild {}", self.guild_id);
        if *self.link_status.borrow() != ConnectionStatus::Destroyed {
            if let Err(e) = self.connection.destroy().await {
                warn!("⚠️ Error al destruir la conexión: {}", e);
            }
            self.link_status.send_replace(ConnectionStatus::Destroyed);
        }

        self.deregister();
        self.shutdown.cancel();

        if !self.settings.pruning {
            self.announce(messages::leave_channel()).await;
        }
    }

    /// Destruye la conexión y da la sesión por perdida
    async fn abandon(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.phase = Phase::Draining;
            state.loop_enabled = false;
            state.tracks.clear();
            state.current = None;
            state.player_status = PlayerStatus::Idle;
            if let Some(teardown) = state.teardown.take() {
                teardown.abort();
            }
        }

        self.player.stop();
        if *self.link_status.borrow() != ConnectionStatus::Destroyed {
            if let Err(e) = self.connection.destroy().await {
                warn!("⚠️ Error al destruir la conexión: {}", e);
            }
            self.link_status.send_replace(ConnectionStatus::Destroyed);
        }

        self.deregister();
        self.shutdown.cancel();
    }

    fn deregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self);
        }
    }

    /// Reacts to a player state reported by the audio driver.
    pub async fn on_player_state(self: &Arc<Self>, next: PlayerStatus) {
        let effects = {
            let mut state = self.state.lock();
            let prev = std::mem::replace(&mut state.player_status, next);
            player_transition(prev, next)
        };

        for effect in effects {
            match effect {
                PlayerEffect::CompleteTrack => self.complete_track().await,
                PlayerEffect::AnnounceNowPlaying => self.open_panel(),
            }
        }
    }

    async fn complete_track(self: &Arc<Self>) {
        if self.player.has_resource() {
            debug!("Recurso todavía adjunto al terminar, se avanza igual");
        }

        let drained = {
            let mut state = self.state.lock();
            if state.phase == Phase::Playing {
                state.phase = Phase::Empty;
            }
            state.current = None;
            if let Some(finished) = state.retire_head() {
                debug!("✔️ Terminó: {}", finished.title());
            }
            state.tracks.is_empty()
        };

        if drained {
            self.stop().await;
        } else {
            self.advance().await;
        }
    }

    /// The player failed mid-track: drop the head and force progress, even
    /// past an in-flight advance.
    pub async fn on_player_error(self: &Arc<Self>, message: &str) {
        error!("❌ Error del reproductor en guild {}: {}", self.guild_id, message);

        {
            let mut state = self.state.lock();
            state.retire_head();
            state.current = None;
            state.player_status = PlayerStatus::Idle;
            if state.phase != Phase::Draining {
                state.phase = Phase::Empty;
                state.advance_ticket += 1;
            }
        }

        self.advance().await;
    }

    fn open_panel(self: &Arc<Self>) {
        let Some(song) = self.state.lock().current.clone() else {
            return;
        };

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            match queue.surface.render(&song).await {
                Ok(panel) => {
                    let actions = Arc::clone(&queue.actions);
                    let pruning = queue.settings.pruning;
                    run_panel(queue, panel, song, actions, pruning).await;
                }
                Err(e) => error!("❌ No se pudo publicar el panel de {}: {:?}", song.title(), e),
            }
        });
    }

    /// Reacts to a voice connection state reported by the driver.
    pub async fn on_connection_state(self: &Arc<Self>, next: ConnectionStatus) {
        let prev = self.link_status.send_replace(next);
        let effects = {
            let state = self.state.lock();
            connection_transition(prev, next, state.rejoin_attempts, state.watch)
        };

        for effect in effects {
            match effect {
                ConnectionEffect::Stop => {
                    info!("🚪 Desconectado del canal en guild {}", self.guild_id);
                    self.stop().await;
                }
                ConnectionEffect::Rejoin { attempt, delay } => {
                    warn!("🔄 Conexión perdida, reintento {} en {:?}", attempt, delay);
                    self.state.lock().rejoin_attempts = attempt;
                    self.schedule_rejoin(delay);
                }
                ConnectionEffect::Destroy => {
                    error!("💥 Sin más reintentos de conexión en guild {}", self.guild_id);
                    self.abandon().await;
                }
                ConnectionEffect::AwaitReady { timeout } => {
                    self.state.lock().watch = ConnectionWatch::AwaitingReady;
                    self.await_ready(timeout);
                }
                ConnectionEffect::ResetRejoins => {
                    debug!("✅ Conexión lista en guild {}", self.guild_id);
                    self.state.lock().rejoin_attempts = 0;
                }
            }
        }
    }

    fn schedule_rejoin(self: &Arc<Self>, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if *queue.link_status.borrow() == ConnectionStatus::Destroyed {
                return;
            }
            if let Err(e) = queue.connection.rejoin().await {
                error!("❌ {}", e);
                queue.abandon().await;
            }
        });
    }

    fn await_ready(self: &Arc<Self>, timeout: Duration) {
        let queue = Arc::clone(self);
        let mut status = self.link_status.subscribe();
        tokio::spawn(async move {
            let settled = tokio::time::timeout(
                timeout,
                status.wait_for(|s| matches!(s, ConnectionStatus::Ready | ConnectionStatus::Destroyed)),
            )
            .await
            .is_ok();

            if !settled {
                warn!("⏱️ La conexión no quedó lista en {:?}", timeout);
                queue.abandon().await;
            }
            queue.state.lock().watch = ConnectionWatch::Idle;
        });
    }

    /// Cambia el volumen en `delta` puntos. `None` si no hubo cambio.
    pub fn set_volume(&self, actor: &Actor, delta: i16) -> Option<u8> {
        if !self.can_modify(actor) {
            return None;
        }
        let current = self.state.lock().volume;
        let level = (i16::from(current) + delta).clamp(0, 100) as u8;
        self.set_volume_level(actor, level)
    }

    pub fn set_volume_level(&self, actor: &Actor, level: u8) -> Option<u8> {
        if !self.can_modify(actor) {
            return None;
        }

        let gain = {
            let mut state = self.state.lock();
            let level = level.min(100);
            if state.volume == level {
                return None;
            }
            state.volume = level;
            state.gain()
        };

        self.player.set_gain(gain);
        debug!("🔊 Volumen: {}", level.min(100));
        Some(level.min(100))
    }

    /// Alterna el silencio. Devuelve el nuevo estado.
    pub fn toggle_mute(&self, actor: &Actor) -> Option<bool> {
        if !self.can_modify(actor) {
            return None;
        }

        let (muted, gain) = {
            let mut state = self.state.lock();
            state.muted = !state.muted;
            (state.muted, state.gain())
        };

        self.player.set_gain(gain);
        Some(muted)
    }

    pub fn set_loop(&self, enabled: bool) {
        self.state.lock().loop_enabled = enabled;
        if enabled {
            info!("🔁 Repetir cola activado");
        } else {
            info!("➡️ Repetición desactivada");
        }
    }

    pub fn toggle_loop(&self) -> bool {
        let enabled = !self.state.lock().loop_enabled;
        self.set_loop(enabled);
        enabled
    }

    /// Mezcla todo lo que viene detrás de la canción actual
    pub fn shuffle(&self) {
        let mut state = self.state.lock();
        if state.tracks.len() > 2 {
            state.tracks.make_contiguous()[1..].shuffle(&mut rand::thread_rng());
        }
        info!("🔀 Cola mezclada");
    }

    /// Detiene la canción actual; la política de fin de canción avanza la cola
    pub fn skip(&self) {
        info!("⏭️ Saltando canción en guild {}", self.guild_id);
        self.player.stop();
    }

    pub fn pause(&self) -> bool {
        if !self.player.pause() {
            return false;
        }
        self.state.lock().player_status = PlayerStatus::Paused;
        true
    }

    pub fn resume(&self) -> bool {
        if !self.player.resume() {
            return false;
        }
        self.state.lock().player_status = PlayerStatus::Playing;
        true
    }

    /// Mueve una canción entre posiciones 1-based. Devuelve la canción y su posición final.
    pub fn move_track(&self, from: usize, to: usize) -> Result<(Arc<Song>, usize), QueueError> {
        let mut state = self.state.lock();
        let len = state.tracks.len();
        if !(1..=len).contains(&from) || !(1..=len).contains(&to) {
            return Err(QueueError::OutOfRange { len });
        }

        let song = state
            .tracks
            .remove(from - 1)
            .ok_or(QueueError::OutOfRange { len })?;
        let index = (to - 1).min(state.tracks.len());
        state.tracks.insert(index, Arc::clone(&song));

        debug!("📍 Track movido de posición {} a {}", from, index + 1);
        Ok((song, index + 1))
    }
}
