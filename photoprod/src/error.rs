use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Unresolvable particles, charge imbalance, empty kinematic windows. Fatal.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single event could not be written; the event is skipped.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// An iterative loop hit its iteration guard before reaching its threshold.
    #[error("Convergence error: {0}")]
    Convergence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    RunCard(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, GeneratorError>;
