//! Countdown example binary
//!
//! Runs a three second countdown on the wall-clock scheduler and prints
//! every state change.

use composable_effects_runtime::metrics::MetricsServer;
use composable_effects_runtime::{Store, TokioScheduler};
use countdown::{CountdownAction, CountdownEnvironment, CountdownReducer, CountdownState};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "countdown=debug,composable_effects_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsServer::new("127.0.0.1:9090".parse()?);
    metrics.start()?;

    println!("=== Countdown Example: Composable Effects ===\n");

    let scheduler = TokioScheduler::new()?;
    let env = CountdownEnvironment::new(scheduler.clone());
    let store = Store::new(CountdownState::new(3), CountdownReducer::new(), env);

    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
    let _changes = store.subscribe(move |state: &CountdownState| {
        println!(
            "remaining: {} running: {} finished: {}",
            state.remaining, state.running, state.finished
        );
        if state.finished {
            let _ = finished_tx.send(());
        }
    });

    println!("\n>>> Sending: Start");
    store.send(CountdownAction::Start);

    // Pause halfway through and resume
    tokio::time::sleep(Duration::from_millis(1500)).await;
    println!("\n>>> Sending: Stop");
    store.send(CountdownAction::Stop);

    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("\n>>> Sending: Start");
    store.send(CountdownAction::Start);

    finished_rx.recv().await;
    scheduler.shutdown();

    if let Some(text) = metrics.render() {
        println!("\n=== Metrics ===\n{text}");
    }

    println!("\n=== Countdown Complete ===");
    println!("\nKey concepts demonstrated:");
    println!("  • Effect::timer: periodic ticks on an injected scheduler");
    println!("  • take: bounding an endless timer to the remaining seconds");
    println!("  • Effect::cancel: stopping every timer registered under an id");
    println!("  • TokioScheduler: wall-clock time for production runs");

    Ok(())
}
