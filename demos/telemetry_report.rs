//! Telemetry walkthrough: record, analyze, give feedback, train.
//!
//! Sends a burst of mixed-priority prompts through the gateway, then asks the
//! telemetry engine what it saw in the last few minutes and trains the
//! learning models on the result.
//!
//! Requires a runtime listening on http://127.0.0.1:11434 (or set
//! AI_GATEWAY_RUNTIME_URL) with the `llama3` model installed.
//!
//! Usage:
//!   cargo run --example telemetry_report

use ai_gateway_rust::{config::GatewayConfig, FeedbackInput, GatewayBuilder, RequestOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::default().apply_env();
    let gateway = GatewayBuilder::with_config(config).build()?;
    let telemetry = gateway.telemetry();

    let prompts = [
        "Name three uses for a paperclip.",
        "What is 17 * 23?",
        "Summarize the plot of Hamlet in one line.",
    ];
    for prompt in prompts {
        match gateway
            .generate_text(prompt, RequestOptions::new(), Some("reporter"))
            .await
        {
            Ok(answer) => println!("> {prompt}\n{answer}\n"),
            Err(err) => eprintln!("> {prompt}\nfailed: {err}\n"),
        }
    }

    // The drain worker runs every five seconds; force a pass so the report
    // sees analyzed events.
    telemetry.process_pending().await;

    let report = telemetry.analyze("5m").await?;
    println!(
        "window {}: {} events, error rate {:.1}%, performance {:.2}",
        report.summary.window,
        report.summary.total_events,
        report.summary.error_rate * 100.0,
        report.summary.performance_score
    );
    for insight in &report.insights {
        println!("insight: {} ({:.0}%)", insight.title, insight.confidence * 100.0);
    }
    for recommendation in &report.recommendations {
        println!("recommend: {recommendation}");
    }

    // Tell the engine how one generation actually went, then retrain.
    if let Some(event) = telemetry.events(1).into_iter().next() {
        let feedback = telemetry
            .provide_feedback(event.id, 1.0, FeedbackInput::new().with_rating(4))
            .await?;
        println!("feedback accuracy: {:.3}", feedback.accuracy);
    }

    for model in telemetry.train_models().await {
        println!(
            "trained {} v{} ({:?}, f1 {:.2})",
            model.name, model.version, model.status, model.scores.f1
        );
    }

    gateway.shutdown().await;
    Ok(())
}
