//! Shared helpers for integration tests.

#![allow(dead_code)]

// One socket guard for unit and integration tests.
#[path = "../../src/test_support/socket_guard.rs"]
pub mod socket_guard;
pub mod transports;
