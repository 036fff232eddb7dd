use rmcp::model::ErrorData;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GithubToolsError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("GitHub API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode GitHub response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("{0}")]
    Other(String),
}

impl GithubToolsError {
    /// Stable tag for the error category, carried in the MCP error data so
    /// hosts can branch on it without parsing the message.
    pub fn kind(&self) -> &'static str {
        match self {
            GithubToolsError::InvalidParam(_) => "validation",
            GithubToolsError::Api { .. } => "api",
            GithubToolsError::Transport(_) => "transport",
            GithubToolsError::Decode(_) => "decode",
            GithubToolsError::DuplicateTool(_) => "registry",
            GithubToolsError::Other(_) => "internal",
        }
    }

    pub fn to_mcp_error(&self) -> ErrorData {
        let data = match self {
            GithubToolsError::Api { status, .. } => {
                json!({ "kind": self.kind(), "status": status })
            }
            _ => json!({ "kind": self.kind() }),
        };
        match self {
            GithubToolsError::InvalidParam(_) => {
                ErrorData::invalid_params(self.to_string(), Some(data))
            }
            _ => ErrorData::internal_error(self.to_string(), Some(data)),
        }
    }
}
