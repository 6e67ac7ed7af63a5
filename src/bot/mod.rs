//! # Bot Module
//!
//! Discord glue for the jukebox.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands on `ready`, routes command interactions through
//! [`handlers`], and creates one playback session per guild the first time
//! someone plays a song there. Panel buttons are not routed here; each
//! panel collects its own presses.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready},
    async_trait,
};
use songbird::input::Input;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub mod commands;
pub mod dispatch;
pub mod handlers;
pub mod voice;

use crate::{
    audio::{session::spawn_event_loop, MusicQueue, SessionParts, SessionRegistry},
    config::Config,
    sources::youtube::YtDlpProvider,
    ui::{
        controls::{ActionRegistry, Actor},
        panel::{ChannelAnnouncer, ChannelSurface},
    },
};
use dispatch::Commands;
use voice::{register_driver_events, SongbirdConnection, SongbirdPlayer};

/// Handler principal del bot.
///
/// Owns the live sessions and everything a new session is built from.
pub struct JukeboxBot {
    config: Arc<Config>,
    provider: Arc<YtDlpProvider>,
    sessions: Arc<SessionRegistry<Input>>,
    commands: Arc<Commands<Input>>,
    actions: Arc<ActionRegistry<Input>>,
}

impl JukeboxBot {
    pub fn new(config: Config, provider: YtDlpProvider) -> Self {
        let sessions = Arc::new(SessionRegistry::default());
        let commands = Arc::new(Commands::new(Arc::clone(&sessions)));
        let actions = Arc::new(ActionRegistry::standard(commands.clone()));

        Self {
            config: Arc::new(config),
            provider: Arc::new(provider),
            sessions,
            commands,
            actions,
        }
    }

    /// Registra los comandos slash, por guild si hay `GUILD_ID` o globales si no.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!(
                        "No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild."
                    )
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!(
                        "No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'."
                    )
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// La sesión del guild, o una nueva conectada a `voice_channel`.
    ///
    /// A new session joins the voice channel, subscribes to the driver's
    /// connection events and starts its event loop before it is returned.
    pub async fn session_for(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<Arc<MusicQueue<Input>>> {
        if let Some(queue) = self.sessions.get(guild_id) {
            if !queue.is_closed() {
                return Ok(queue);
            }
            // La anterior sigue desconectándose; unirse ahora chocaría con su `remove`
            queue.closed().await;
        }

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager.join(guild_id, voice_channel).await.map_err(|e| {
            error!("Error al conectar al canal de voz: {:?}", e);
            anyhow::anyhow!("Error al conectar al canal de voz")
        })?;
        info!("🔊 Conectado al canal de voz {} en guild {}", voice_channel, guild_id);

        let (events, rx) = mpsc::unbounded_channel();
        {
            let mut handler = call.lock().await;
            register_driver_events(&mut handler, guild_id, events.clone());
        }

        let parts = SessionParts {
            provider: self.provider.clone(),
            player: Arc::new(SongbirdPlayer::new(guild_id, call, events.clone())),
            connection: Arc::new(SongbirdConnection::new(manager, guild_id, voice_channel, events)),
            announcer: Arc::new(ChannelAnnouncer::new(ctx.clone(), text_channel)),
            surface: Arc::new(ChannelSurface::new(ctx.clone(), text_channel)),
            guard: Arc::new(move |actor: &Actor| actor.voice_channel == Some(voice_channel)),
            actions: Arc::clone(&self.actions),
            registry: Arc::downgrade(&self.sessions),
        };

        let queue = MusicQueue::new(guild_id, self.config.queue_settings(), parts);
        self.sessions.insert(Arc::clone(&queue));
        spawn_event_loop(Arc::clone(&queue), rx);

        Ok(queue)
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }
}
