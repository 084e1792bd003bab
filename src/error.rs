#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: Box<AppError> },

    #[error("batch {index}/{total} failed: {source}")]
    Batch {
        index: usize,
        total: usize,
        #[source]
        source: Box<AppError>,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    General(String),
}

fn mentions_json(message: &str) -> bool {
    message.contains("JSON")
}

impl AppError {
    /// Whether a failed transport call is worth sending again.
    ///
    /// Malformed output and anything that talks about JSON is treated as
    /// permanent: resending the same prompt will not fix it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MalformedResponse(_) | Self::Serde(_) => false,
            Self::Config(_) | Self::RetriesExhausted { .. } | Self::Batch { .. } => false,
            Self::Reqwest(err) => !err.is_decode() && !mentions_json(&err.to_string()),
            Self::Transport(message) | Self::General(message) => !mentions_json(message),
            Self::Http { body, .. } => !mentions_json(body),
            Self::Io(_) => true,
        }
    }
}
