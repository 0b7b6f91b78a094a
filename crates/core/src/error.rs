/// Result alias that carries the custom [`CodecError`] type.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Common error type for the codec crate.
///
/// Every variant describes a deterministic, input-driven failure. Nothing is
/// retried: calling again with the same input fails the same way.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Tempo curve is empty, unsorted, or carries a non-positive rate.
    #[error("invalid tempo curve: {0}")]
    InvalidTempoCurve(String),
    /// Score and performance events do not correspond one-to-one.
    #[error("alignment error: {0}")]
    Alignment(String),
    /// A time was requested before the start of the tempo curve.
    #[error("time {time} lies before the start of the tempo curve at {start}")]
    OutOfRange { time: f64, start: f64 },
    /// Codec configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Parameter table does not have one row per score event.
    #[error("parameter table has {found} rows but the score has {expected} events")]
    ShapeMismatch { expected: usize, found: usize },
    /// Malformed score or performance event.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub fn tempo_curve<T: Into<String>>(msg: T) -> Self {
        Self::InvalidTempoCurve(msg.into())
    }

    pub fn alignment<T: Into<String>>(msg: T) -> Self {
        Self::Alignment(msg.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn input<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }
}
