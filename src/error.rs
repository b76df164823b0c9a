//! Error types for the SPIKE simulator

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Simulator error types
///
/// Configuration errors come from bad scenario or robot files and from
/// invalid registrations. Usage errors are argument problems caught before a
/// command is issued. Runtime errors are consistency failures raised by the
/// engine when a command targets something the robot does not have.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ground image error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wrong argument type or value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Command issued against something the robot cannot do
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Command name not understood by the target component
    #[error("Unknown command '{name}' for {component}")]
    UnknownCommand {
        /// Component kind the command was given to
        component: &'static str,
        /// Requested command name
        name: String,
    },

    /// Scenario loop is not running
    #[error("Scenario is not running")]
    NotRunning,

    /// Mutex was poisoned by a panicking thread
    #[error("Mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Shorthand for lock failures, used as `.lock().map_err(poisoned("dynamics"))`
pub(crate) fn poisoned<T>(what: &'static str) -> impl FnOnce(std::sync::PoisonError<T>) -> Error {
    move |e| Error::MutexPoisoned(format!("{} lock failed: {}", what, e))
}
