use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Base URL of the OpenAI-compatible chat completion API (e.g., a vLLM endpoint)
    #[arg(long, env = "CHAT_BASE_URL", default_value = "http://localhost:9000/v1")]
    pub base_url: String,

    /// API key sent as a bearer token. Self-hosted endpoints usually accept any placeholder.
    #[arg(long, env = "CHAT_API_KEY", default_value = "token-abc123")]
    pub api_key: String,

    /// Model name for chat completion
    #[arg(long, env = "CHAT_MODEL", default_value = "Qwen/Qwen2-VL-72B-Instruct-AWQ")]
    pub model: String,

    // --- Batch Args ---
    /// Root directory holding one subdirectory per prompt owner, each with prompt template JSON files.
    #[arg(long, env = "PROMPTS_PATH", default_value = "prompts")]
    pub prompts_path: PathBuf,

    /// Directory containing the test images sent with every prompt template.
    #[arg(long, env = "TEST_IMAGES_PATH", default_value = "data/test/drawings")]
    pub images_path: PathBuf,

    /// Sampling top_p applied when a template does not set its own.
    #[arg(long, env = "DEFAULT_TOP_P", default_value = "0.8")]
    pub top_p: f32,
}
