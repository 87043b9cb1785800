//! End-to-end dispatch scenarios
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::test_harness::TestEnvironment;
use event_dispatcher::{DispatcherError, Event, StreamEvent};

/// Two handlers on "order.created" both receive the exact dispatched event
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_order_created_reaches_both_handlers() -> Result<()> {
    let mut env = TestEnvironment::new();
    let a = env.add_slow_handler("A", "order.created", Duration::from_millis(30))?;
    let b = env.add_slow_handler("B", "order.created", Duration::from_millis(60))?;

    let event: Arc<dyn Event> = Arc::new(StreamEvent::new("order.created", json!({"id": 42})));
    let invoked = env.dispatch_event(Arc::clone(&event)).await?;

    assert_eq!(invoked, 2);
    for handler in [&a, &b] {
        assert_eq!(handler.calls(), 1, "{} should run exactly once", handler.name());

        // Events are only recorded right before completion, so they are
        // visible as soon as dispatch returns
        let received = handler.get_events().await;
        assert_eq!(received.len(), 1, "{} finished after dispatch returned", handler.name());
        assert!(Arc::ptr_eq(&received[0], &event));
        assert_eq!(received[0].payload(), &json!({"id": 42}));
    }
    Ok(())
}

/// A removed handler is not invoked
#[tokio::test]
async fn test_register_remove_dispatch() -> Result<()> {
    let mut env = TestEnvironment::new();
    let a = env.add_handler("A", "X")?;

    let handler = env.handler("A")?;
    assert!(env.dispatcher.remove("X", &handler));

    let invoked = env.dispatch("X", json!(null)).await?;

    assert_eq!(invoked, 0);
    assert_eq!(a.calls(), 0);
    Ok(())
}

/// Duplicate registration is reported and leaves the handler list alone
#[tokio::test]
async fn test_duplicate_registration_is_recoverable() -> Result<()> {
    let mut env = TestEnvironment::new();
    let a = env.add_handler("A", "order.created")?;

    let handler = env.handler("A")?;
    let err = env
        .dispatcher
        .register("order.created", &handler)
        .expect_err("second registration should fail");
    assert!(matches!(err, DispatcherError::HandlerAlreadyRegistered { .. }));
    assert_eq!(env.dispatcher.handler_count("order.created"), 1);

    // Only one invocation despite the second attempt
    env.dispatch("order.created", json!({"id": 1})).await?;
    assert_eq!(a.calls(), 1);

    // Another instance registers normally
    let b = env.add_handler("B", "order.created")?;
    env.dispatch("order.created", json!({"id": 2})).await?;
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 1);
    Ok(())
}

/// Handlers only see the events they registered for
#[tokio::test]
async fn test_events_are_routed_by_name() -> Result<()> {
    let mut env = TestEnvironment::new();
    let created = env.add_handler("created", "order.created")?;
    let paid = env.add_handler("paid", "order.paid")?;

    env.dispatch("order.created", json!({"id": 1})).await?;
    env.dispatch("order.created", json!({"id": 2})).await?;
    env.dispatch("order.paid", json!({"id": 1})).await?;
    env.dispatch("order.shipped", json!({"id": 1})).await?;

    assert_eq!(created.calls(), 2);
    assert_eq!(paid.calls(), 1);

    let stats = env.dispatcher.stats().await;
    assert_eq!(stats.events_dispatched, 3);
    assert_eq!(stats.events_without_handlers, 1);
    assert_eq!(stats.handler_invocations, 3);
    Ok(())
}

/// Clearing the dispatcher stops all delivery
#[tokio::test]
async fn test_clear_stops_delivery() -> Result<()> {
    let mut env = TestEnvironment::new();
    let a = env.add_handler("A", "order.created")?;
    let b = env.add_handler("B", "order.paid")?;

    env.dispatcher.clear();

    assert_eq!(env.dispatch("order.created", json!({})).await?, 0);
    assert_eq!(env.dispatch("order.paid", json!({})).await?, 0);
    assert_eq!(a.calls(), 0);
    assert_eq!(b.calls(), 0);
    assert!(!env.dispatcher.has("order.created", &env.handler("A")?));
    Ok(())
}
