use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Body of every /test response
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EchoResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_data: Option<Map<String, Value>>,
}

impl EchoResponse {
    pub fn get() -> Self {
        Self {
            message: "GET request received".to_string(),
            your_data: None,
        }
    }

    pub fn post(data: Map<String, Value>) -> Self {
        Self {
            message: "POST request received".to_string(),
            your_data: Some(data),
        }
    }
}

/// Parse a request body as a JSON object; anything else becomes an empty map.
pub fn parse_payload(body: &[u8]) -> Map<String, Value> {
    serde_json::from_slice(body).unwrap_or_default()
}
