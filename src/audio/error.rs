use thiserror::Error;

/// Fallos que el orquestador devuelve a la capa de comandos.
///
/// Ninguno corrompe el estado de otra guild; todos se muestran al usuario.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("el usuario no está en un canal de voz")]
    NotInChannel,

    #[error("no se pudo conectar al canal de voz: {0}")]
    ConnectionFailed(String),

    #[error("no se pudo resolver la canción: {0}")]
    TrackResolutionFailed(String),

    #[error("precondición no cumplida: {0}")]
    PreconditionNotMet(&'static str),

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),
}

impl PlaybackError {
    /// Texto que se envía al usuario
    pub fn user_message(&self) -> String {
        match self {
            Self::NotInChannel => "❌ Debes estar en un canal de voz para reproducir música".to_string(),
            Self::ConnectionFailed(reason) => {
                format!("❌ No se pudo conectar al canal de voz: {}", reason)
            }
            Self::TrackResolutionFailed(reason) => {
                format!("❌ No se pudo encontrar la canción: {}", reason)
            }
            Self::PreconditionNotMet(reason) => format!("❌ {}", reason),
            Self::QueueFull(max) => format!("❌ La cola está llena (máximo {} canciones)", max),
        }
    }

    /// Los fallos benignos no se registran como error
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::PreconditionNotMet(_) | Self::NotInChannel)
    }
}
