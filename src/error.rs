use thiserror::Error;

/// Fallos al convertir una entrada del usuario en un [`crate::sources::Song`].
///
/// Se muestran como respuesta al usuario y nunca afectan a la sesión.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no results found for \"{0}\"")]
    NoResults(String),
    #[error("unsupported input: {0}")]
    InvalidInput(String),
    #[error("no usable details for {0}")]
    MetadataUnavailable(String),
}

/// Fallo al abrir el stream de audio de una canción.
///
/// Es por canción: la cola la descarta y avanza sola.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream unavailable for {url}: {reason}")]
    Unavailable { url: String, reason: String },
}

impl StreamError {
    pub fn unavailable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Fallos de la conexión de voz. Terminales para la sesión, nunca para el proceso.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("rejoin failed: {0}")]
    Rejoin(String),
    #[error("destroy failed: {0}")]
    Destroy(String),
}

/// Uso incorrecto de las operaciones de la cola desde un comando.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("position out of range (queue has {len} tracks)")]
    OutOfRange { len: usize },
    #[error("queue is full (max {max} tracks)")]
    QueueFull { max: usize },
    #[error("session is closing")]
    SessionClosed,
}

/// Fallo del reproductor subyacente al aceptar un recurso.
#[derive(Debug, Error)]
#[error("player error: {0}")]
pub struct PlayerError(pub String);
