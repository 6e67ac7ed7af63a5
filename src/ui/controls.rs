//! Now-playing control panel.
//!
//! Every track that starts playing gets a panel with two rows of buttons.
//! Presses arrive as a stream scoped to that panel and live as long as the
//! track (or [`FALLBACK_PANEL_LIFETIME`] for live streams). Each press is
//! routed through an [`ActionRegistry`]: volume and mute are handled by the
//! queue itself, the rest delegate to the slash command with the same name.

use async_trait::async_trait;
use futures::{future::BoxFuture, stream::BoxStream, FutureExt, StreamExt};
use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
    model::id::{ChannelId, GuildId, UserId},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{queue::MusicQueue, state::PlayerStatus},
    sources::Song,
    ui::messages,
};

pub const FALLBACK_PANEL_LIFETIME: Duration = Duration::from_secs(60);
pub const PRUNE_DELAY: Duration = Duration::from_secs(3);
const VOLUME_STEP: i16 = 10;

/// Usuario que dispara una acción
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub voice_channel: Option<ChannelId>,
}

impl Actor {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

/// Predicado de autorización para modificar la cola
pub type ModifyGuard = Arc<dyn Fn(&Actor) -> bool + Send + Sync>;

/// Canal de respuesta de una interacción (comando o botón)
#[async_trait]
pub trait Responder: Send + Sync {
    /// Confirma la interacción sin responder todavía
    async fn acknowledge(&self) -> anyhow::Result<()>;

    async fn reply(&self, content: String) -> anyhow::Result<()>;

    fn has_replied(&self) -> bool;
}

/// A command call as seen by the dispatcher, whether it came from a slash
/// command or from a panel button.
#[derive(Clone)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub actor: Actor,
    pub responder: Arc<dyn Responder>,
}

/// Ejecuta comandos por nombre (`skip`, `pause`, `resume`, `loop`, `shuffle`, `stop`)
#[async_trait]
pub trait CommandDispatch: Send + Sync {
    async fn execute(&self, command: &str, invocation: Invocation) -> anyhow::Result<()>;
}

pub struct ButtonPress {
    pub action_id: String,
    pub actor: Actor,
    pub responder: Arc<dyn Responder>,
}

/// Mensaje de panel ya publicado
#[async_trait]
pub trait PanelHandle: Send + Sync {
    /// Button presses on this panel only, ending after `lifetime`.
    fn presses(&self, lifetime: Duration) -> BoxStream<'static, ButtonPress>;

    async fn clear_buttons(&self) -> anyhow::Result<()>;

    async fn delete(&self) -> anyhow::Result<()>;
}

/// Publica paneles en el canal de texto de la sesión
#[async_trait]
pub trait ControlSurface: Send + Sync {
    async fn render(&self, song: &Song) -> anyhow::Result<Box<dyn PanelHandle>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    Skip,
    PlayPause,
    Mute,
    VolumeDown,
    VolumeUp,
    Loop,
    Shuffle,
    Stop,
}

impl ControlAction {
    pub const TRANSPORT: [ControlAction; 5] = [
        ControlAction::Skip,
        ControlAction::PlayPause,
        ControlAction::Mute,
        ControlAction::VolumeDown,
        ControlAction::VolumeUp,
    ];
    pub const QUEUE: [ControlAction; 3] = [ControlAction::Loop, ControlAction::Shuffle, ControlAction::Stop];

    pub fn id(&self) -> &'static str {
        match self {
            ControlAction::Skip => "skip",
            ControlAction::PlayPause => "play_pause",
            ControlAction::Mute => "mute",
            ControlAction::VolumeDown => "decrease_volume",
            ControlAction::VolumeUp => "increase_volume",
            ControlAction::Loop => "loop",
            ControlAction::Shuffle => "shuffle",
            ControlAction::Stop => "stop",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::TRANSPORT
            .into_iter()
            .chain(Self::QUEUE)
            .find(|action| action.id() == id)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ControlAction::Skip => "⏭",
            ControlAction::PlayPause => "⏯",
            ControlAction::Mute => "🔇",
            ControlAction::VolumeDown => "🔉",
            ControlAction::VolumeUp => "🔊",
            ControlAction::Loop => "🔁",
            ControlAction::Shuffle => "🔀",
            ControlAction::Stop => "⏹",
        }
    }

    /// Skip y stop cierran el panel antes de ejecutarse
    pub fn ends_panel(&self) -> bool {
        matches!(self, ControlAction::Skip | ControlAction::Stop)
    }
}

/// Filas de botones del panel
pub fn button_rows() -> Vec<CreateActionRow> {
    let row = |actions: &[ControlAction]| {
        CreateActionRow::Buttons(
            actions
                .iter()
                .map(|action| {
                    CreateButton::new(action.id())
                        .label(action.label())
                        .style(ButtonStyle::Secondary)
                })
                .collect(),
        )
    };

    vec![row(&ControlAction::TRANSPORT), row(&ControlAction::QUEUE)]
}

pub fn panel_lifetime(song: &Song) -> Duration {
    song.duration().unwrap_or(FALLBACK_PANEL_LIFETIME)
}

pub type ActionFn<S> =
    Arc<dyn Fn(Arc<MusicQueue<S>>, ButtonPress) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Tabla acción → handler
pub struct ActionRegistry<S> {
    handlers: HashMap<ControlAction, ActionFn<S>>,
}

impl<S: Send + 'static> ActionRegistry<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(mut self, action: ControlAction, handler: ActionFn<S>) -> Self {
        self.handlers.insert(action, handler);
        self
    }

    pub fn get(&self, action: ControlAction) -> Option<ActionFn<S>> {
        self.handlers.get(&action).cloned()
    }

    /// Registry with the standard panel buttons.
    pub fn standard(dispatch: Arc<dyn CommandDispatch>) -> Self {
        let delegate = |command: &'static str| -> ActionFn<S> {
            let dispatch = Arc::clone(&dispatch);
            Arc::new(move |queue: Arc<MusicQueue<S>>, press: ButtonPress| {
                let dispatch = Arc::clone(&dispatch);
                async move { dispatch.execute(command, invocation(&queue, press)).await }.boxed()
            })
        };

        let play_pause: ActionFn<S> = {
            let dispatch = Arc::clone(&dispatch);
            Arc::new(move |queue: Arc<MusicQueue<S>>, press: ButtonPress| {
                let dispatch = Arc::clone(&dispatch);
                async move {
                    let command = if queue.player_status() == PlayerStatus::Playing {
                        "pause"
                    } else {
                        "resume"
                    };
                    dispatch.execute(command, invocation(&queue, press)).await
                }
                .boxed()
            })
        };

        let mute: ActionFn<S> = Arc::new(|queue: Arc<MusicQueue<S>>, press: ButtonPress| {
            async move {
                let Some(muted) = queue.toggle_mute(&press.actor) else {
                    return Ok(());
                };
                let author = press.actor.mention();
                let content = if muted {
                    messages::muted(&author)
                } else {
                    messages::unmuted(&author)
                };
                press.responder.reply(content).await
            }
            .boxed()
        });

        let volume = |delta: i16| -> ActionFn<S> {
            Arc::new(move |queue: Arc<MusicQueue<S>>, press: ButtonPress| {
                async move {
                    let Some(volume) = queue.set_volume(&press.actor, delta) else {
                        return Ok(());
                    };
                    let author = press.actor.mention();
                    let content = if delta < 0 {
                        messages::decreased_volume(&author, volume)
                    } else {
                        messages::increased_volume(&author, volume)
                    };
                    press.responder.reply(content).await
                }
                .boxed()
            })
        };

        Self::new()
            .register(ControlAction::Skip, delegate("skip"))
            .register(ControlAction::PlayPause, play_pause)
            .register(ControlAction::Mute, mute)
            .register(ControlAction::VolumeDown, volume(-VOLUME_STEP))
            .register(ControlAction::VolumeUp, volume(VOLUME_STEP))
            .register(ControlAction::Loop, delegate("loop"))
            .register(ControlAction::Shuffle, delegate("shuffle"))
            .register(ControlAction::Stop, delegate("stop"))
    }
}

impl<S: Send + 'static> Default for ActionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn invocation<S: Send + 'static>(queue: &MusicQueue<S>, press: ButtonPress) -> Invocation {
    Invocation {
        guild_id: queue.guild_id(),
        actor: press.actor,
        responder: press.responder,
    }
}

async fn dispatch_press<S: Send + 'static>(
    queue: &Arc<MusicQueue<S>>,
    registry: &ActionRegistry<S>,
    action: ControlAction,
    press: ButtonPress,
) {
    if let Err(e) = press.responder.acknowledge().await {
        warn!("⚠️ No se pudo confirmar el botón {}: {:?}", action.id(), e);
    }

    let Some(handler) = registry.get(action) else {
        debug!("Botón sin handler: {}", action.id());
        return;
    };

    let responder = Arc::clone(&press.responder);
    if let Err(e) = handler(Arc::clone(queue), press).await {
        error!("❌ Error en botón {}: {:?}", action.id(), e);
        if !responder.has_replied() {
            if let Err(e) = responder.reply(messages::generic_error()).await {
                error!("Error al responder al botón: {:?}", e);
            }
        }
    }
}

/// Drives one panel from the first press until its stream ends, then strips
/// its buttons (or deletes it when `pruning`).
pub async fn run_panel<S: Send + 'static>(
    queue: Arc<MusicQueue<S>>,
    panel: Box<dyn PanelHandle>,
    song: Arc<Song>,
    registry: Arc<ActionRegistry<S>>,
    pruning: bool,
) {
    let lifetime = panel_lifetime(&song);
    debug!("🎛️ Panel abierto para {} durante {:?}", song.title(), lifetime);

    let mut presses = panel.presses(lifetime);
    while let Some(press) = presses.next().await {
        let Some(action) = ControlAction::from_id(&press.action_id) else {
            debug!("Botón desconocido: {}", press.action_id);
            continue;
        };

        info!("🔘 Botón {} presionado por {}", action.id(), press.actor.user_id);

        if action.ends_panel() {
            drop(presses);
            dispatch_press(&queue, &registry, action, press).await;
            break;
        }

        dispatch_press(&queue, &registry, action, press).await;
    }

    if let Err(e) = panel.clear_buttons().await {
        error!("Error al quitar los botones del panel: {:?}", e);
    }

    if pruning {
        tokio::time::sleep(PRUNE_DELAY).await;
        if let Err(e) = panel.delete().await {
            debug!("No se pudo borrar el panel: {:?}", e);
        }
    }
}
