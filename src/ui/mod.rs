//! Everything the bot shows in the text channel.

pub mod controls;
pub mod messages;
pub mod panel;

use async_trait::async_trait;

/// Canal de texto donde la sesión publica avisos
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn send(&self, content: String) -> anyhow::Result<()>;
}
