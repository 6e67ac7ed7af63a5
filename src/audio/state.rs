//! Observed player/connection states and the pure transition rules over them.
//!
//! The voice driver reports state changes; these functions decide what the
//! controller must do about each change and return it as a list of effects.
//! Nothing here performs I/O.

use std::time::Duration;

/// Close code Discord uses when the bot is kicked or moved out of the channel
pub const KICKED_CLOSE_CODE: u16 = 4014;
pub const MAX_REJOIN_ATTEMPTS: u32 = 5;
pub const REJOIN_BACKOFF_STEP: Duration = Duration::from_secs(5);
pub const READY_TIMEOUT: Duration = Duration::from_secs(20);

/// Exponent of the perceptual volume curve (`x^1.660964` ≈ 10 dB per doubling)
const LOG_VOLUME_EXPONENT: f32 = 1.660964;

/// Estado del reproductor, observado desde el motor de audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Fase del controlador de la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nada sonando y sin trabajo pendiente
    Empty,
    /// Un `advance()` está abriendo el stream de la cabeza
    Advancing,
    Playing,
    /// `stop()` ya corrió; la desconexión está programada
    Draining,
}

/// Estado de la conexión de voz, observado desde el driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Signalling,
    Ready,
    Disconnected { close_code: Option<u16> },
    Destroyed,
}

/// Whether a ready-wait is already running for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionWatch {
    #[default]
    Idle,
    AwaitingReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEffect {
    /// La canción terminó de forma natural
    CompleteTrack,
    /// Empezó a sonar: publicar el panel de control
    AnnounceNowPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEffect {
    Stop,
    Rejoin { attempt: u32, delay: Duration },
    Destroy,
    AwaitReady { timeout: Duration },
    ResetRejoins,
}

pub fn player_transition(prev: PlayerStatus, next: PlayerStatus) -> Vec<PlayerEffect> {
    match (prev, next) {
        (PlayerStatus::Idle, PlayerStatus::Idle) => vec![],
        (_, PlayerStatus::Idle) => vec![PlayerEffect::CompleteTrack],
        (PlayerStatus::Buffering, PlayerStatus::Playing) => vec![PlayerEffect::AnnounceNowPlaying],
        _ => vec![],
    }
}

pub fn connection_transition(
    prev: ConnectionStatus,
    next: ConnectionStatus,
    rejoin_attempts: u32,
    watch: ConnectionWatch,
) -> Vec<ConnectionEffect> {
    match next {
        ConnectionStatus::Disconnected {
            close_code: Some(KICKED_CLOSE_CODE),
        } => vec![ConnectionEffect::Stop],
        ConnectionStatus::Disconnected { .. } if rejoin_attempts < MAX_REJOIN_ATTEMPTS => {
            vec![ConnectionEffect::Rejoin {
                attempt: rejoin_attempts + 1,
                delay: REJOIN_BACKOFF_STEP * (rejoin_attempts + 1),
            }]
        }
        ConnectionStatus::Disconnected { .. } => vec![ConnectionEffect::Destroy],
        ConnectionStatus::Connecting | ConnectionStatus::Signalling
            if watch == ConnectionWatch::Idle =>
        {
            vec![ConnectionEffect::AwaitReady {
                timeout: READY_TIMEOUT,
            }]
        }
        ConnectionStatus::Ready if prev != ConnectionStatus::Ready => vec![ConnectionEffect::ResetRejoins],
        _ => vec![],
    }
}

/// Gain actually applied to the output for a stored volume in `[0, 100]`.
pub fn effective_gain(volume: u8, muted: bool) -> f32 {
    if muted {
        return 0.0;
    }
    let linear = f32::from(volume.min(100)) / 100.0;
    linear.powf(LOG_VOLUME_EXPONENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_idle_after_activity_completes_track() {
        for prev in [PlayerStatus::Buffering, PlayerStatus::Playing, PlayerStatus::Paused] {
            assert_eq!(player_transition(prev, PlayerStatus::Idle), vec![PlayerEffect::CompleteTrack]);
        }
        assert_eq!(player_transition(PlayerStatus::Idle, PlayerStatus::Idle), vec![]);
    }

    #[test]
    fn test_buffering_to_playing_announces() {
        assert_eq!(
            player_transition(PlayerStatus::Buffering, PlayerStatus::Playing),
            vec![PlayerEffect::AnnounceNowPlaying]
        );
        // Reanudar desde pausa no vuelve a anunciar
        assert_eq!(player_transition(PlayerStatus::Paused, PlayerStatus::Playing), vec![]);
    }

    #[test]
    fn test_kicked_disconnect_stops() {
        let effects = connection_transition(
            ConnectionStatus::Ready,
            ConnectionStatus::Disconnected {
                close_code: Some(KICKED_CLOSE_CODE),
            },
            0,
            ConnectionWatch::Idle,
        );
        assert_eq!(effects, vec![ConnectionEffect::Stop]);
    }

    #[test]
    fn test_disconnect_backoff_grows_then_destroys() {
        let disconnected = ConnectionStatus::Disconnected { close_code: None };

        for attempts in 0..MAX_REJOIN_ATTEMPTS {
            let effects = connection_transition(ConnectionStatus::Ready, disconnected, attempts, ConnectionWatch::Idle);
            assert_eq!(
                effects,
                vec![ConnectionEffect::Rejoin {
                    attempt: attempts + 1,
                    delay: Duration::from_secs(5 * u64::from(attempts + 1)),
                }]
            );
        }

        let effects = connection_transition(
            ConnectionStatus::Ready,
            disconnected,
            MAX_REJOIN_ATTEMPTS,
            ConnectionWatch::Idle,
        );
        assert_eq!(effects, vec![ConnectionEffect::Destroy]);
    }

    #[test]
    fn test_connecting_waits_for_ready_once() {
        let effects = connection_transition(
            ConnectionStatus::Ready,
            ConnectionStatus::Signalling,
            0,
            ConnectionWatch::Idle,
        );
        assert_eq!(effects, vec![ConnectionEffect::AwaitReady { timeout: READY_TIMEOUT }]);

        let effects = connection_transition(
            ConnectionStatus::Signalling,
            ConnectionStatus::Connecting,
            0,
            ConnectionWatch::AwaitingReady,
        );
        assert_eq!(effects, vec![]);
    }

    #[test]
    fn test_ready_resets_rejoins() {
        let effects = connection_transition(
            ConnectionStatus::Connecting,
            ConnectionStatus::Ready,
            3,
            ConnectionWatch::AwaitingReady,
        );
        assert_eq!(effects, vec![ConnectionEffect::ResetRejoins]);
    }

    #[test]
    fn test_effective_gain() {
        assert_eq!(effective_gain(100, false), 1.0);
        assert_eq!(effective_gain(0, false), 0.0);
        assert_eq!(effective_gain(80, true), 0.0);

        let half = effective_gain(50, false);
        assert!(half > 0.3 && half < 0.33, "gain {half}");
    }
}
