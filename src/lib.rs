pub mod cli;
pub mod document;
pub mod error;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;
pub mod session;

use cli::Args;
use llm::ollama::OllamaClient;
use llm::LlmConfig;
use log::info;
use server::api::AppState;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    args.validate()?;

    info!("--- Relay Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Ollama Base URL: {}", args.ollama_base_url);
    info!("Default Model: {}", args.default_model);
    info!("Session TTL: {}s", args.session_ttl_secs);
    match args.upstream_timeout_secs {
        Some(secs) => info!("Upstream Timeout: {}s", secs),
        None => info!("Upstream Timeout: none"),
    }
    info!("Fetch Timeout: {}s", args.fetch_timeout_secs);
    info!("Max Document Size: {} bytes", args.max_document_bytes);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("---------------------------");

    let llm_config = LlmConfig {
        base_url: args.ollama_base_url.clone(),
        timeout: args.upstream_timeout(),
    };
    let client = Arc::new(OllamaClient::from_config(&llm_config)?);
    let state = AppState::new(args.clone(), client)?;

    let server = Server::new(args.server_addr.clone(), state, args);
    server.run().await?;

    Ok(())
}
