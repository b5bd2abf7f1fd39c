use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    /// Bad distribution spec or resource spec. The simulation must stop.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A record a single event depends on is missing; that event is abandoned.
    #[error("Lookup failed: {what} '{id}' not found")]
    Lookup { what: &'static str, id: String },

    /// Any other failure raised while invoking a due event.
    #[error("Callback '{kind}' failed: {message}")]
    Callback { kind: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Simulation '{id}' has no saved snapshot")]
    NoSnapshot { id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn lookup(what: &'static str, id: impl Into<String>) -> Self {
        Self::Lookup { what, id: id.into() }
    }

    /// Only configuration errors may terminate a run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

pub type SimResult<T> = Result<T, SimError>;
