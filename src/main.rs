use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use event_dispatcher::{config, Dispatcher, Event, EventHandler, FnHandler, StreamEvent};

/// Reads newline-delimited JSON events (`{"name": ..., "payload": ...}`) from
/// stdin and dispatches each one to a printing and a counting handler.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    // Initialize the tracing subscriber for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "event_dispatcher=debug,warn".into()
            } else {
                "event_dispatcher=info,warn".into()
            }
        }))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();

    info!(version = event_dispatcher::VERSION, "Event dispatcher starting");

    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    let config = config::load_config().await?;
    let dispatcher = Dispatcher::with_config(&config);

    let printer = FnHandler::shared(|event: &dyn Event| {
        println!(
            "{} {} {}",
            event.timestamp().to_rfc3339(),
            event.name(),
            event.payload()
        );
        Ok(())
    });

    let handled = Arc::new(AtomicU64::new(0));
    let handled_clone = Arc::clone(&handled);
    let counter = FnHandler::shared(move |_: &dyn Event| {
        handled_clone.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    for name in &config.event_names {
        register_all(&dispatcher, name, &[&printer, &counter]);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: StreamEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping malformed event line");
                continue;
            }
        };

        // Without a configured list, listen to whatever shows up
        if config.event_names.is_empty() && !dispatcher.has(event.name(), &printer) {
            register_all(&dispatcher, event.name(), &[&printer, &counter]);
        }

        if let Err(e) = dispatcher.dispatch(Arc::new(event)).await {
            warn!(code = %e.code(), error = %e, "Dispatch did not complete");
        }
    }

    let stats = dispatcher.stats().await;
    info!(
        events_dispatched = stats.events_dispatched,
        events_without_handlers = stats.events_without_handlers,
        handled = handled.load(Ordering::Relaxed),
        "Input exhausted"
    );
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

fn register_all(dispatcher: &Dispatcher, event_name: &str, handlers: &[&Arc<dyn EventHandler>]) {
    for handler in handlers {
        // Repeated names in the configuration are harmless
        if let Err(e) = dispatcher.register(event_name, handler) {
            debug!(code = %e.code(), error = %e, "Skipping registration");
        }
    }
}
