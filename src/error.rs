use thiserror::Error;

/// Errores del almacenamiento de caché (namespaces en disco o memoria).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error in cache store: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt entry metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("declared length {declared} does not match body length {actual}")]
    LengthMismatch { declared: u64, actual: u64 },
}

/// Fallo de transporte al consultar el origen.
///
/// Es `Clone` porque un mismo resultado de fetch se comparte entre todos
/// los llamadores que esperan la misma clave en vuelo.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Transport(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("fetch task ended without a result")]
    Abandoned,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Motivos por los que un payload de audio no entra en la caché.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// El cuerpo recibido no coincide con el Content-Length declarado.
    Incomplete { expected: u64, actual: u64 },
    /// Demasiado pequeño para ser audio real.
    TooSmall { size: u64, minimum: u64 },
    /// Mayor que la cuota completa del namespace.
    OverQuota { size: u64, quota: u64 },
    /// Respuesta parcial o con estado distinto de 200.
    NotFull { status: u16 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Incomplete { expected, actual } => {
                write!(f, "incomplete transfer: expected {} bytes, got {}", expected, actual)
            }
            RejectReason::TooSmall { size, minimum } => {
                write!(f, "payload too small: {} bytes (minimum {})", size, minimum)
            }
            RejectReason::OverQuota { size, quota } => {
                write!(f, "payload of {} bytes exceeds quota of {}", size, quota)
            }
            RejectReason::NotFull { status } => {
                write!(f, "response status {} is not a full response", status)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("payload rejected: {0}")]
    Rejected(RejectReason),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
