//! Test module for cgbridge-core
//!
//! This module contains tests for:
//! - Connection lifecycle and status reporting
//! - Method list resync and stale-result handling
//! - Action set construction properties
//! - Settings loading, defaults and reload

mod config_reload_tests;
