use async_trait::async_trait;

use crate::{
    error::{ConnectionError, PlayerError},
    sources::AudioResource,
};

/// Motor de audio que reproduce un recurso a la vez.
///
/// Los cambios de estado (`Buffering`, `Playing`, `Idle`...) no se consultan
/// aquí: el motor los reporta como eventos a la sesión.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    type Stream: Send + 'static;

    /// Reemplaza el recurso actual y empieza a reproducir
    async fn play(&self, resource: AudioResource<Self::Stream>) -> Result<(), PlayerError>;

    /// Gain on the attached resource. No-op when nothing is attached.
    fn set_gain(&self, gain: f32);

    fn pause(&self) -> bool;

    fn resume(&self) -> bool;

    /// Detiene el recurso actual; el motor reportará `Idle`
    fn stop(&self);

    fn has_resource(&self) -> bool;
}

/// Conexión de voz de una sesión
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn rejoin(&self) -> Result<(), ConnectionError>;

    async fn destroy(&self) -> Result<(), ConnectionError>;
}
