//! Basic connect, send and report.
//!
//! Demonstrates:
//! - Building a client for an endpoint
//! - Sending one message of each priority
//! - Watching client events
//! - Printing the performance report
//!
//! Usage:
//!   cargo run --example basic_send -- ws://127.0.0.1:9000/ws
//!   cargo run --example basic_send -- ws://127.0.0.1:9000/ws --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use adaptive_ws_client::{Client, ClientEvent, Error, Priority, Result};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:9000/ws";
const SETTLE_TIME: Duration = Duration::from_secs(2);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|a| a == "--debug");
    let endpoint = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    init_logging(debug);

    if let Err(e) = run(&endpoint).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(endpoint: &str) -> Result<()> {
    println!("=== Basic Send ===\n");

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[1] Connecting to {endpoint}...");
    let client = Client::builder().endpoint(endpoint).pool_size(2).build()?;
    let mut events = client.subscribe();

    client.connect().await?;
    println!("    ✓ Connected ({})\n", client.state());

    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::StateChanged(state) => println!("    [event] state: {state}"),
                ClientEvent::QualityChanged(quality) => {
                    println!("    [event] quality: {quality:?}");
                }
                ClientEvent::MetricsUpdated(metrics) => println!(
                    "    [event] sent {}/{}",
                    metrics.successful_messages, metrics.total_messages
                ),
                ClientEvent::Message(envelope) => {
                    println!("    [event] inbound {}: {}", envelope.kind, envelope.content);
                }
            }
        }
    });

    // ========================================================================
    // Send
    // ========================================================================

    println!("[2] Sending one message per priority...");
    for priority in [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ] {
        client.send(format!("hello at {priority}"), "greeting", priority);
    }
    println!("    ✓ Flushed {} batch(es)\n", client.flush());

    tokio::time::sleep(SETTLE_TIME).await;

    // ========================================================================
    // Report
    // ========================================================================

    println!("[3] Performance report:");
    let report = serde_json::to_string_pretty(&client.performance_report()).map_err(Error::from)?;
    println!("{report}\n");

    client.disconnect().await;
    watcher.abort();
    println!("=== Done ===");
    Ok(())
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "adaptive_ws_client=debug"
    } else {
        "adaptive_ws_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
