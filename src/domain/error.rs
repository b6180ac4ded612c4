//! Domain error types.
//!
//! Only feed-level corruption and configuration problems are `Err`s.
//! Single-order failures (insufficient cash, locked shares, odd lots)
//! are recorded on the order and in the skipped-signal log instead of
//! aborting the run.

/// Top-level error type for quantback.
#[derive(Debug, thiserror::Error)]
pub enum QuantbackError {
    #[error("fatal input error for {symbol} at {date}: {reason}")]
    FatalInput {
        symbol: String,
        date: String,
        reason: String,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("accounting violation: {reason}")]
    Accounting { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&QuantbackError> for std::process::ExitCode {
    fn from(err: &QuantbackError) -> Self {
        let code: u8 = match err {
            QuantbackError::Io(_) => 1,
            QuantbackError::ConfigParse { .. }
            | QuantbackError::ConfigMissing { .. }
            | QuantbackError::ConfigInvalid { .. } => 2,
            QuantbackError::Data { .. } | QuantbackError::InsufficientData { .. } => 3,
            QuantbackError::FatalInput { .. } => 4,
            QuantbackError::Accounting { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
