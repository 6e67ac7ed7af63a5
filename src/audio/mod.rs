//! # Audio Module
//!
//! Per-guild playback sessions.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Controller
//! - Ordered tracks, volume, mute and loop for one guild
//! - Drives the player from the head of the queue
//! - Schedules the voice channel teardown once the queue runs dry
//!
//! ### [`state`] - State Machines
//! - Observed player and connection states
//! - Pure transition functions returning the effects to run
//!
//! ### [`player`] - Driver Seams
//! - [`player::AudioPlayer`] and [`player::VoiceConnection`] traits,
//!   implemented over songbird in [`crate::bot::voice`]
//!
//! ### [`session`] - Session Plumbing
//! - Registry of live sessions keyed by guild
//! - Event loop that feeds driver events to the queue in order

pub mod player;
pub mod queue;
pub mod session;
pub mod state;

pub use queue::{MusicQueue, QueueSettings, QueueSnapshot, SessionParts};
pub use session::{SessionEvent, SessionRegistry};
