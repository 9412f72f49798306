//! Integration test binary: every cross-crate flow in a single binary.
//!
//! See the matklad pattern: <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod cooldown_flow;
mod task_lifecycle;
mod tour_flow;
mod transport_events;
