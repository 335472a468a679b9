use thiserror::Error;

/// Failures inside the messaging core. None of them is fatal to the process;
/// the variant decides who hears about it.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad input from a client. Reported to that client only.
    #[error("{0}")]
    Validation(String),

    /// A referenced user does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The store failed. Logged; the message is not broadcast.
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),

    /// Send or receive failed on one connection. Ends that session only.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Text safe to show to the client that caused the error.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Storage(_) => "internal storage error".to_string(),
            Self::Transport(_) => "connection error".to_string(),
        }
    }
}
