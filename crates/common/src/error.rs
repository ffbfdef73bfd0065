use thiserror::Error;

/// Errors raised outside the provider boundary.
///
/// Provider-local failures never surface as a `FeedError` — they are absorbed
/// by the chain. Anything here is either a configuration problem or a fault
/// in the cycle itself and feeds the scheduler's backoff path.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid spot price: {0}")]
    InvalidSpotPrice(f64),

    #[error("conversion produced a non-finite price from spot {0}")]
    NonFinitePrice(f64),

    #[error("price {0} does not fit a whole currency unit")]
    PriceOutOfRange(f64),

    #[error("no purity profile configured for {0}")]
    UnknownPurity(String),

    #[error("snapshot purity set mismatch: store has {expected:?}, commit has {got:?}")]
    PurityMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
