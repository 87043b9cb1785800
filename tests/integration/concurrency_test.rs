//! Concurrent use of a shared dispatcher
use anyhow::Result;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::test_harness::{CollectingHandler, TestEnvironment};
use event_dispatcher::{Dispatcher, Event, EventHandler, StreamEvent};

/// Many tasks registering the same handler: exactly one wins
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_registration() -> Result<()> {
    let dispatcher = Dispatcher::new();
    let handler: Arc<dyn EventHandler> = Arc::new(CollectingHandler::new("shared"));

    let attempts = (0..16).map(|_| {
        let dispatcher = dispatcher.clone();
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { dispatcher.register("order.created", &handler).is_ok() })
    });
    let results = join_all(attempts).await;

    let successes = results
        .into_iter()
        .map(|joined| joined.expect("registration task panicked"))
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(dispatcher.handler_count("order.created"), 1);
    Ok(())
}

/// Parallel dispatches each get their own completion tracking
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_dispatches() -> Result<()> {
    let mut env = TestEnvironment::new();
    let a = env.add_slow_handler("A", "tick", Duration::from_millis(20))?;
    let b = env.add_handler("B", "tick")?;

    let dispatches = (0..10).map(|i| {
        let dispatcher = env.dispatcher.clone();
        async move {
            let event: Arc<dyn Event> = Arc::new(StreamEvent::new("tick", json!({"n": i})));
            dispatcher.dispatch(event).await
        }
    });
    for result in join_all(dispatches).await {
        assert_eq!(result?, 2);
    }

    assert_eq!(a.calls(), 10);
    assert_eq!(b.calls(), 10);
    assert_eq!(a.get_events().await.len(), 10);
    Ok(())
}

/// Removing a handler while a dispatch is in flight does not disturb it
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remove_during_dispatch() -> Result<()> {
    let mut env = TestEnvironment::new();
    let slow = env.add_slow_handler("slow", "order.created", Duration::from_millis(100))?;
    let slow_handler = env.handler("slow")?;

    let dispatcher = env.dispatcher.clone();
    let in_flight = tokio::spawn(async move {
        let event: Arc<dyn Event> = Arc::new(StreamEvent::new("order.created", json!({"id": 42})));
        dispatcher.dispatch(event).await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(env.dispatcher.remove("order.created", &slow_handler));
    env.dispatcher.clear();

    let invoked = tokio::time::timeout(Duration::from_secs(5), in_flight).await???;
    assert_eq!(invoked, 1);
    assert_eq!(slow.get_events().await.len(), 1, "In-flight handler should finish");

    // Later dispatches no longer reach it
    assert_eq!(env.dispatch("order.created", json!({"id": 43})).await?, 0);
    assert_eq!(slow.calls(), 1);
    Ok(())
}

/// Registering and removing from many tasks while dispatching keeps the registry consistent
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_register_remove_dispatch_interleaved() -> Result<()> {
    let dispatcher = Dispatcher::new();
    let handlers: Vec<Arc<dyn EventHandler>> = (0..8)
        .map(|i| Arc::new(CollectingHandler::new(&format!("h{}", i))) as Arc<dyn EventHandler>)
        .collect();

    let mut tasks = Vec::new();
    for handler in &handlers {
        let dispatcher = dispatcher.clone();
        let handler = Arc::clone(handler);
        tasks.push(tokio::spawn(async move {
            for _ in 0..20 {
                dispatcher.register("churn", &handler)?;
                let event: Arc<dyn Event> = Arc::new(StreamEvent::new("churn", json!(null)));
                dispatcher.dispatch(event).await?;
                assert!(dispatcher.remove("churn", &handler));
            }
            anyhow::Ok(())
        }));
    }

    for task in join_all(tasks).await {
        task??;
    }

    assert_eq!(dispatcher.handler_count("churn"), 0);
    assert!(dispatcher.is_empty());
    Ok(())
}
