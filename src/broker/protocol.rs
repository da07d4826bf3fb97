use serde::{Deserialize, Serialize};

/// Query parameters for the WebSocket upgrade
#[derive(Debug, Clone, Deserialize)]
pub struct SocketQuery {
    pub entity_id: Option<String>,
}

/// Server → Client: a frame that could not be published
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub error: String,
}

impl ErrorMessage {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            msg_type: "error".to_string(),
            error: error.into(),
        }
    }
}
