//! Integration test harness.

#[path = "integration/circuit_sharing.rs"]
mod circuit_sharing;
#[path = "integration/retry_flow.rs"]
mod retry_flow;
