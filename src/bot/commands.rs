use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        loop_command(),
        shuffle_command(),
        volume_command(),
        move_command(),
        queue_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Plays a song from a link or a search")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Link or search terms").required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips the current song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pauses the music")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resumes the music")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stops the music and clears the queue")
}

// Comandos de cola

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Toggles looping the whole queue")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffles the upcoming songs")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Shows or changes the volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volume between 0 and 100")
                .min_int_value(0)
                .max_int_value(100),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Moves a song to another position in the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "movefrom", "Current position")
                .min_int_value(1)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "moveto", "New position")
                .min_int_value(1)
                .required(true),
        )
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Shows the music queue")
}
