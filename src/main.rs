mod chat;
mod history;
mod model;
mod web;

use actix_web::{web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use chat::Orchestrator;
use history::HistoryStore;
use model::{GemmaServerModel, GenerationBackend, GenerationConfig, OpenAiChatModel};
use web::routes;

fn generation_config_from_env() -> GenerationConfig {
    let defaults = GenerationConfig::default();
    GenerationConfig {
        model: env::var("MODEL_NAME").unwrap_or(defaults.model),
        max_tokens: env::var("MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_tokens),
        temperature: env::var("TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.temperature),
        top_p: env::var("TOP_P")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.top_p),
        timeout: env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
    }
}

fn backend_from_env(config: GenerationConfig) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    let backend = env::var("BACKEND").unwrap_or_else(|_| "local".to_string());
    match backend.as_str() {
        "local" => {
            let url = env::var("LOCAL_SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string());
            Ok(Arc::new(GemmaServerModel::new(url, config)?))
        }
        "openai" => {
            let url = env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string());
            let key = env::var("OPENAI_API_KEY").ok();
            Ok(Arc::new(OpenAiChatModel::new(url, key, config)?))
        }
        other => anyhow::bail!("unknown BACKEND {:?} (expected \"local\" or \"openai\")", other),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting dialog web application");

    let backend = match backend_from_env(generation_config_from_env()) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to initialize generation backend: {}", e);
            std::process::exit(1);
        }
    };

    let data_dir =
        env::var("DATA_DIR").unwrap_or_else(|_| "./data/conversations".to_string());
    let store = match HistoryStore::new(&data_dir) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open history store at {}: {}", data_dir, e);
            std::process::exit(1);
        }
    };
    info!("Conversation history stored in {}", data_dir);

    let orchestrator = Data::new(Orchestrator::new(store, backend));

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8080);
    info!("Listening on {}:{}", bind_addr, port);

    HttpServer::new(move || {
        App::new()
            .app_data(orchestrator.clone())
            .configure(routes::configure)
    })
    .bind((bind_addr.as_str(), port))?
    .run()
    .await
}
