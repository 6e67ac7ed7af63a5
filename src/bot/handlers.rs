use anyhow::Result;
use serenity::{
    model::{
        application::{CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    bot::JukeboxBot,
    error::ResolutionError,
    sources::Song,
    ui::{
        controls::{Actor, CommandDispatch, Invocation, Responder},
        messages,
        panel::InteractionReply,
    },
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let name = command.data.name.clone();
    let text_channel = command.channel_id;
    let play_query = string_option(&command, "query");
    let level = integer_option(&command, "level");
    let move_from = integer_option(&command, "movefrom");
    let move_to = integer_option(&command, "moveto");

    let invocation = Invocation {
        guild_id,
        actor: Actor {
            user_id: command.user.id,
            voice_channel: voice_channel_of(ctx, guild_id, command.user.id),
        },
        responder: Arc::new(InteractionReply::command(ctx.clone(), command)),
    };
    let responder = Arc::clone(&invocation.responder);

    let result = match name.as_str() {
        "play" => handle_play(ctx, bot, invocation, text_channel, play_query.unwrap_or_default()).await,
        "volume" => bot.commands.volume(invocation, level).await,
        "move" => match (move_from, move_to) {
            (Some(from), Some(to)) => bot.commands.move_track(invocation, from, to).await,
            _ => invocation.responder.reply(messages::move_usage()).await,
        },
        "queue" => bot.commands.show_queue(invocation).await,
        "skip" | "pause" | "resume" | "stop" | "loop" | "shuffle" => bot.commands.execute(&name, invocation).await,
        other => Err(anyhow::anyhow!("Comando no reconocido: {}", other)),
    };

    if let Err(e) = result {
        if !responder.has_replied() {
            responder.reply(messages::generic_error()).await?;
        }
        return Err(e);
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    bot: &JukeboxBot,
    invocation: Invocation,
    text_channel: ChannelId,
    query: String,
) -> Result<()> {
    // Defer la respuesta ya que puede tomar tiempo
    invocation.responder.acknowledge().await?;

    let Some(voice_channel) = invocation.actor.voice_channel else {
        return invocation.responder.reply(messages::not_in_channel()).await;
    };

    if let Some(queue) = bot.sessions.get(invocation.guild_id) {
        if !queue.can_modify(&invocation.actor) {
            return invocation.responder.reply(messages::not_same_channel()).await;
        }
    }

    let song = match Song::resolve(bot.provider.as_ref(), &query, "").await {
        Ok(song) => song,
        Err(e) => {
            warn!("❌ No se pudo resolver \"{}\": {}", query, e);
            let content = match e {
                ResolutionError::NoResults(term) => messages::no_results(&term),
                ResolutionError::InvalidInput(_) => messages::invalid_input(),
                ResolutionError::MetadataUnavailable(_) => messages::metadata_unavailable(),
            };
            return invocation.responder.reply(content).await;
        }
    };

    // Una sesión que está saliendo del canal rechaza la canción; la segunda vuelta usa una nueva
    for _ in 0..2 {
        let queue = bot
            .session_for(ctx, invocation.guild_id, voice_channel, text_channel)
            .await?;
        if bot.commands.enqueue(&queue, &invocation, song.clone()).await? {
            return Ok(());
        }
        queue.closed().await;
    }

    anyhow::bail!("La sesión de guild {} no terminó de cerrarse", invocation.guild_id)
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(str::to_string)
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| match opt.value {
            CommandDataOptionValue::Integer(value) => Some(value),
            _ => None,
        })
}

/// Canal de voz en el que está el usuario, según la caché
pub fn voice_channel_of(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
