use std::path::PathBuf;

/// Failures of the upload / predict / save round trips.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response. `message` is the server's explanation when the body
    /// carried one.
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    /// 2xx response whose `status` field was not "success".
    #[error("server reported status '{0}'")]
    Rejected(String),

    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("could not start request thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Text suitable for showing to the user, without the variant prefix.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// True for failures caused by the detection service's credentials,
    /// billing or quota rather than by the request itself.
    pub fn is_configuration_problem(&self) -> bool {
        match self {
            ApiError::Server { status, message } => {
                matches!(status, 401 | 402 | 403 | 429) || mentions_configuration(message)
            }
            ApiError::Rejected(message) => mentions_configuration(message),
            _ => false,
        }
    }
}

fn mentions_configuration(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ["api key", "api_key", "billing", "quota", "credential", "permission"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
