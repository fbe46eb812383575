pub mod cli;
pub mod config;
pub mod llm;
pub mod media;
pub mod models;
pub mod runner;

use cli::Args;
use llm::chat::openai::OpenAIChatClient;
use llm::chat::ChatClient;
use llm::LlmConfig;
use log::info;
use runner::BatchRunner;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Chat Base URL: {}", args.base_url);
    info!("Chat Model: {}", args.model);
    info!("Prompts Path: {}", args.prompts_path.display());
    info!("Test Images Path: {}", args.images_path.display());
    info!("Default top_p: {}", args.top_p);
    info!("-------------------------");

    let llm_config = LlmConfig {
        base_url: args.base_url.clone(),
        api_key: args.api_key.clone(),
        model: args.model.clone(),
        default_top_p: args.top_p,
    };

    let client: Arc<dyn ChatClient> = Arc::new(OpenAIChatClient::from_config(&llm_config)?);
    let runner = BatchRunner::new(client, args.prompts_path, args.images_path, args.top_p);
    runner.run().await
}
