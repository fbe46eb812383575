pub mod chat;

/// Connection settings for the chat completion endpoint, passed explicitly
/// into the client instead of living in process-wide state.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub default_top_p: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000/v1".to_string(),
            api_key: "token-abc123".to_string(),
            model: "Qwen/Qwen2-VL-72B-Instruct-AWQ".to_string(),
            default_top_p: 0.8,
        }
    }
}
