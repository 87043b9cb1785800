//! Unit tests for the event and handler building blocks
//!
//! Dispatcher and configuration tests live next to their modules.
