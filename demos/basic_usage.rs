//! Basic usage example.
//!
//! Runs a prompt through the full gateway pipeline (policy, cache, batching,
//! health supervision) against a local model runtime, then repeats it to show
//! the cache hit.
//!
//! Requires a runtime listening on http://127.0.0.1:11434 (or set
//! AI_GATEWAY_RUNTIME_URL) with the `llama3` model installed.
//!
//! Usage:
//!   cargo run --example basic_usage

use ai_gateway_rust::{config::GatewayConfig, GatewayBuilder, Priority, RequestOptions};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::default().apply_env();
    let gateway = GatewayBuilder::with_config(config).build()?;

    let health = gateway.health().await?;
    println!("runtime: {:?} ({:?})", health.status, health.version);

    let options = || {
        RequestOptions::new()
            .with_model("llama3")
            .with_priority(Priority::High)
            .with_temperature(0.2)
    };

    let started = Instant::now();
    let answer = gateway
        .generate_text("Why is the sky blue? One sentence.", options(), Some("demo"))
        .await?;
    println!("\nanswer ({:?}):\n{answer}", started.elapsed());

    // Same model, prompt and sampling options: this one never leaves the cache.
    let started = Instant::now();
    let cached = gateway
        .generate_text("Why is the sky blue? One sentence.", options(), Some("demo"))
        .await?;
    assert_eq!(answer, cached);
    println!("\ncached replay took {:?}", started.elapsed());

    let stats = gateway.stats();
    println!(
        "\ncache: {} hits / {} misses, telemetry: {} events recorded",
        stats.cache.hits, stats.cache.misses, stats.telemetry.recorded
    );

    gateway.shutdown().await;
    Ok(())
}
