//! Fakes shared by the unit tests.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Semaphore};

use crate::{
    audio::{
        player::{AudioPlayer, MockVoiceConnection, VoiceConnection},
        queue::{MusicQueue, QueueSettings, SessionParts},
        session::SessionRegistry,
    },
    error::{ConnectionError, PlayerError, StreamError},
    sources::{AudioResource, Song, StreamRequest, TrackMetadata, TrackProvider},
    ui::{
        controls::{ActionRegistry, Actor, ButtonPress, CommandDispatch, ControlSurface, Invocation, PanelHandle, Responder},
        Announcer,
    },
};

pub fn actor(id: u64) -> Actor {
    Actor {
        user_id: UserId::new(id),
        voice_channel: Some(ChannelId::new(1)),
    }
}

/// Canciones de un minuto con URL `https://youtu.be/{title}`
pub fn songs(titles: &[&str]) -> Vec<Song> {
    titles
        .iter()
        .map(|title| Song::new(format!("https://youtu.be/{title}"), *title, 60))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeStream {
    pub url: String,
}

#[derive(Default)]
pub struct FakeProvider {
    links: HashMap<String, TrackMetadata>,
    searches: HashMap<String, String>,
    failing: HashSet<String>,
    search_broken: bool,
    gate: Option<Arc<Semaphore>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link(mut self, url: &str, metadata: TrackMetadata) -> Self {
        self.links.insert(url.to_string(), metadata);
        self
    }

    pub fn with_search(mut self, term: &str, url: &str) -> Self {
        self.searches.insert(term.to_string(), url.to_string());
        self
    }

    pub fn failing_stream(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Toda búsqueda falla como si yt-dlp no respondiera
    pub fn failing_search(mut self) -> Self {
        self.search_broken = true;
        self
    }

    /// Cada apertura de stream espera un permiso del semáforo
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TrackProvider for FakeProvider {
    type Stream = FakeStream;

    async fn lookup_by_link(&self, url: &str) -> anyhow::Result<Option<TrackMetadata>> {
        Ok(self.links.get(url).cloned())
    }

    async fn search_first(&self, term: &str) -> anyhow::Result<Option<TrackMetadata>> {
        if self.search_broken {
            anyhow::bail!("yt-dlp timed out");
        }
        Ok(self.searches.get(term).map(|url| TrackMetadata {
            url: Some(url.clone()),
            ..TrackMetadata::default()
        }))
    }

    async fn open_audio_stream(&self, request: &StreamRequest) -> Result<FakeStream, StreamError> {
        self.requests.lock().push(request.clone());

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| StreamError::unavailable(&request.url, e))?
                .forget();
        }

        if self.failing.contains(&request.url) {
            return Err(StreamError::unavailable(&request.url, "403 Forbidden"));
        }
        Ok(FakeStream {
            url: request.url.clone(),
        })
    }
}

#[derive(Default)]
pub struct FakePlayer {
    played: Mutex<Vec<String>>,
    gains: Mutex<Vec<f32>>,
    stops: AtomicUsize,
    attached: AtomicBool,
    paused: AtomicBool,
    reject_next: AtomicBool,
}

impl FakePlayer {
    /// Títulos que llegaron a reproducirse, en orden
    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn gains(&self) -> Vec<f32> {
        self.gains.lock().clone()
    }

    pub fn last_gain(&self) -> Option<f32> {
        self.gains.lock().last().copied()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn reject_next_play(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    type Stream = FakeStream;

    async fn play(&self, resource: AudioResource<FakeStream>) -> Result<(), PlayerError> {
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(PlayerError(format!("cannot decode {}", resource.stream.url)));
        }
        self.played.lock().push(resource.song.title().to_string());
        self.attached.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_gain(&self, gain: f32) {
        self.gains.lock().push(gain);
    }

    fn pause(&self) -> bool {
        self.attached.load(Ordering::SeqCst) && !self.paused.swap(true, Ordering::SeqCst)
    }

    fn resume(&self) -> bool {
        self.paused.swap(false, Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.attached.store(false, Ordering::SeqCst);
    }

    fn has_resource(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeConnection {
    rejoins: AtomicUsize,
    destroys: AtomicUsize,
    destroy_delay: Duration,
}

impl FakeConnection {
    pub fn rejoins(&self) -> usize {
        self.rejoins.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn rejoin(&self) -> Result<(), ConnectionError> {
        self.rejoins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ConnectionError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        if !self.destroy_delay.is_zero() {
            tokio::time::sleep(self.destroy_delay).await;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAnnouncer {
    messages: Mutex<Vec<String>>,
}

impl RecordingAnnouncer {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn count(&self, content: &str) -> usize {
        self.messages.lock().iter().filter(|m| *m == content).count()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn send(&self, content: String) -> anyhow::Result<()> {
        self.messages.lock().push(content);
        Ok(())
    }
}

/// Respuesta de interacción que solo guarda lo enviado
#[derive(Default)]
pub struct Reply {
    replies: Mutex<Vec<String>>,
    acknowledged: AtomicBool,
}

impl Reply {
    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().clone()
    }

    pub fn acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for Reply {
    async fn acknowledge(&self) -> anyhow::Result<()> {
        self.acknowledged.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reply(&self, content: String) -> anyhow::Result<()> {
        self.replies.lock().push(content);
        Ok(())
    }

    fn has_replied(&self) -> bool {
        !self.replies.lock().is_empty()
    }
}

#[derive(Default)]
pub struct RecordingDispatch {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingDispatch {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandDispatch for RecordingDispatch {
    async fn execute(&self, command: &str, _invocation: Invocation) -> anyhow::Result<()> {
        self.calls.lock().push(command.to_string());
        if self.fail {
            anyhow::bail!("{command} failed");
        }
        Ok(())
    }
}

struct PanelState {
    presses: Mutex<Option<mpsc::UnboundedReceiver<ButtonPress>>>,
    lifetimes: Mutex<Vec<Duration>>,
    cleared: AtomicBool,
    deleted: AtomicBool,
}

#[derive(Clone)]
pub struct FakePanel {
    inner: Arc<PanelState>,
}

impl FakePanel {
    pub fn new() -> (Self, mpsc::UnboundedSender<ButtonPress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let panel = Self {
            inner: Arc::new(PanelState {
                presses: Mutex::new(Some(rx)),
                lifetimes: Mutex::new(Vec::new()),
                cleared: AtomicBool::new(false),
                deleted: AtomicBool::new(false),
            }),
        };
        (panel, tx)
    }

    pub fn cleared(&self) -> bool {
        self.inner.cleared.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::SeqCst)
    }

    pub fn lifetimes(&self) -> Vec<Duration> {
        self.inner.lifetimes.lock().clone()
    }
}

#[async_trait]
impl PanelHandle for FakePanel {
    fn presses(&self, lifetime: Duration) -> BoxStream<'static, ButtonPress> {
        self.inner.lifetimes.lock().push(lifetime);
        match self.inner.presses.lock().take() {
            Some(rx) => futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|press| (press, rx)) })
                .boxed(),
            None => futures::stream::empty().boxed(),
        }
    }

    async fn clear_buttons(&self) -> anyhow::Result<()> {
        self.inner.cleared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self) -> anyhow::Result<()> {
        self.inner.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Superficie que publica paneles sin botones pulsables
#[derive(Default)]
pub struct FakeSurface {
    rendered: Mutex<Vec<String>>,
}

impl FakeSurface {
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().clone()
    }
}

#[async_trait]
impl ControlSurface for FakeSurface {
    async fn render(&self, song: &Song) -> anyhow::Result<Box<dyn PanelHandle>> {
        self.rendered.lock().push(song.title().to_string());
        let (panel, _) = FakePanel::new();
        Ok(Box::new(panel))
    }
}

pub struct Harness {
    pub guild_id: GuildId,
    pub queue: Arc<MusicQueue<FakeStream>>,
    pub provider: Arc<FakeProvider>,
    pub player: Arc<FakePlayer>,
    pub connection: Arc<FakeConnection>,
    pub announcer: Arc<RecordingAnnouncer>,
    pub surface: Arc<FakeSurface>,
    pub registry: Arc<SessionRegistry<FakeStream>>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }
}

#[derive(Default)]
pub struct HarnessBuilder {
    provider: Option<FakeProvider>,
    settings: QueueSettings,
    denied: Vec<u64>,
    mock_connection: Option<MockVoiceConnection>,
    destroy_delay: Duration,
}

impl HarnessBuilder {
    pub fn provider(mut self, provider: FakeProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn settings(mut self, settings: QueueSettings) -> Self {
        self.settings = settings;
        self
    }

    /// El usuario no podrá modificar la cola
    pub fn deny_user(mut self, id: u64) -> Self {
        self.denied.push(id);
        self
    }

    /// `destroy()` de la conexión falsa tarda `delay` en volver
    pub fn destroy_delay(mut self, delay: Duration) -> Self {
        self.destroy_delay = delay;
        self
    }

    pub fn mock_connection(mut self, connection: MockVoiceConnection) -> Self {
        self.mock_connection = Some(connection);
        self
    }

    pub fn build(self) -> Harness {
        let guild_id = GuildId::new(42);
        let provider = Arc::new(self.provider.unwrap_or_default());
        let player = Arc::new(FakePlayer::default());
        let connection = Arc::new(FakeConnection {
            destroy_delay: self.destroy_delay,
            ..FakeConnection::default()
        });
        let announcer = Arc::new(RecordingAnnouncer::default());
        let surface = Arc::new(FakeSurface::default());
        let registry = Arc::new(SessionRegistry::new());

        let voice: Arc<dyn VoiceConnection> = match self.mock_connection {
            Some(mock) => Arc::new(mock),
            None => connection.clone(),
        };
        let denied = self.denied;

        let queue = MusicQueue::new(
            guild_id,
            self.settings,
            SessionParts {
                provider: provider.clone(),
                player: player.clone(),
                connection: voice,
                announcer: announcer.clone(),
                surface: surface.clone(),
                guard: Arc::new(move |actor: &Actor| !denied.contains(&actor.user_id.get())),
                actions: Arc::new(ActionRegistry::new()),
                registry: Arc::downgrade(&registry),
            },
        );
        registry.insert(Arc::clone(&queue));

        Harness {
            guild_id,
            queue,
            provider,
            player,
            connection,
            announcer,
            surface,
            registry,
        }
    }
}
