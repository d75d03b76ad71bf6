//! Error types and handling for the Clairity service

use thiserror::Error;

/// Main error type for the Clairity service
///
/// Per-city failures are rendered through `Display` into the `error` field of
/// the city's entry, so the messages are kept short and user facing.
#[derive(Error, Debug)]
pub enum ClairityError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Non-success status from an upstream API
    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    /// Connection failures, timeouts and other transport problems
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Upstream answered but reported an error in its envelope
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// Payload could not be decoded
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// The feed has no current PM2.5 reading for the station
    #[error("no current PM2.5 data")]
    MissingCurrent,

    /// Trend fitting produced an unusable model
    #[error("Trend fit error: {message}")]
    Fit { message: String },

    /// Sensor store errors
    #[error("Store error: {message}")]
    Store { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl ClairityError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new upstream error
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn fit<S: Into<String>>(message: S) -> Self {
        Self::Fit {
            message: message.into(),
        }
    }

    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ClairityError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err.to_string())
    }
}

impl From<reqwest_middleware::Error> for ClairityError {
    fn from(err: reqwest_middleware::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<reqwest::Error> for ClairityError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::parse(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

impl From<postcard::Error> for ClairityError {
    fn from(err: postcard::Error) -> Self {
        Self::store(format!("corrupt record: {err}"))
    }
}
