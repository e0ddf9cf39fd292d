use std::env;
use std::error::Error;

use agentic_showcase::{Config, run_all};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(fmt::layer())
        .init();

    let config = Config::from_env();
    println!("model: {}", config.model_label());

    if !config.validate() {
        println!(
            "Watsonx configuration is invalid. Please set WATSONX_PROJECT_ID, WATSONX_API_KEY, WATSONX_URL and WATSONX_MODEL_ID (a .env file works too)."
        );
        return Ok(());
    }

    let summary = run_all(&config).await;
    println!("Overall Summary:");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
