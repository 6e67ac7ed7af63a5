//! Textos que el bot envía al canal.

use std::time::Duration;

use crate::audio::QueueSnapshot;

const QUEUE_PAGE_SIZE: usize = 10;

pub fn started_playing(title: &str, url: &str) -> String {
    format!("🎶 Started playing: **{}** {}", title, url)
}

pub fn queue_ended() -> String {
    "❌ Music queue ended.".to_string()
}

pub fn leave_channel() -> String {
    "Leaving voice channel...".to_string()
}

pub fn generic_error() -> String {
    "There was an error executing that command.".to_string()
}

pub fn muted(author: &str) -> String {
    format!("{} 🔇 muted the music!", author)
}

pub fn unmuted(author: &str) -> String {
    format!("{} 🔊 unmuted the music!", author)
}

pub fn decreased_volume(author: &str, volume: u8) -> String {
    format!("{} 🔉 decreased the volume, the volume is now {}%", author, volume)
}

pub fn increased_volume(author: &str, volume: u8) -> String {
    format!("{} 🔊 increased the volume, the volume is now {}%", author, volume)
}

pub fn volume_set(author: &str, volume: u8) -> String {
    format!("{} set the volume to {}%", author, volume)
}

pub fn current_volume(volume: u8) -> String {
    format!("🔊 The current volume is: **{}%**", volume)
}

pub fn skipped(author: &str) -> String {
    format!("{} ⏭ skipped the song", author)
}

pub fn paused(author: &str) -> String {
    format!("{} ⏸ paused the music.", author)
}

pub fn resumed(author: &str) -> String {
    format!("{} ▶ resumed the music!", author)
}

pub fn stopped(author: &str) -> String {
    format!("{} ⏹ stopped the music!", author)
}

pub fn shuffled(author: &str) -> String {
    format!("{} 🔀 shuffled the queue", author)
}

pub fn loop_state(enabled: bool) -> String {
    format!("Loop is now **{}**", if enabled { "on" } else { "off" })
}

pub fn moved(author: &str, title: &str, position: usize) -> String {
    format!("{} 🚚 moved **{}** to {}.", author, title, position)
}

pub fn move_usage() -> String {
    "Usage: /move <from> <to> (positions in the queue)".to_string()
}

pub fn no_queue() -> String {
    "❌ There is nothing playing.".to_string()
}

pub fn not_in_channel() -> String {
    "You need to join a voice channel first!".to_string()
}

pub fn not_same_channel() -> String {
    "You need to be in the same voice channel as the bot.".to_string()
}

pub fn nothing_playing() -> String {
    "Nothing is playing right now.".to_string()
}

pub fn not_playing() -> String {
    "The music is not paused.".to_string()
}

pub fn queued(title: &str, author: &str) -> String {
    format!("✅ **{}** has been added to the queue by {}", title, author)
}

pub fn queue_full(max: usize) -> String {
    format!("❌ The queue is full (max {} songs)", max)
}

pub fn no_results(term: &str) -> String {
    format!("❌ No results found for \"{}\"", term)
}

pub fn invalid_input() -> String {
    "❌ That link is not supported.".to_string()
}

pub fn metadata_unavailable() -> String {
    "❌ Unable to fetch song information.".to_string()
}

/// Listado de la cola: la canción actual primero, como mucho diez entradas
pub fn queue_listing(snapshot: &QueueSnapshot) -> String {
    let tracks = &snapshot.tracks;
    if tracks.is_empty() {
        return no_queue();
    }

    let mut lines = vec!["📃 **Music queue**".to_string()];
    for (index, song) in tracks.iter().take(QUEUE_PAGE_SIZE).enumerate() {
        let marker = if index == 0 { "▶ " } else { "" };
        lines.push(format!(
            "`{}.` {}{} [{}]",
            index + 1,
            marker,
            song.title(),
            format_duration(song.duration())
        ));
    }
    if tracks.len() > QUEUE_PAGE_SIZE {
        lines.push(format!("...and {} more", tracks.len() - QUEUE_PAGE_SIZE));
    }

    lines.push(format!(
        "Total: {} · Loop {}",
        humantime::format_duration(snapshot.total_duration()),
        if snapshot.loop_enabled { "on" } else { "off" }
    ));
    lines.join("\n")
}

/// `mm:ss`, o `LIVE` cuando la duración es desconocida
pub fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => {
            let secs = d.as_secs();
            if secs >= 3600 {
                format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
            } else {
                format!("{}:{:02}", secs / 60, secs % 60)
            }
        }
        None => "LIVE".to_string(),
    }
}
