//! Integration tests for the event dispatcher
//! These tests drive the public API the way an application would


// Import individual test modules
pub mod concurrency_test;
pub mod dispatch_flow_test;
