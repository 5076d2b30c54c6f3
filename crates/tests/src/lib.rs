//! Integration Tests for the Solana RPC Gateway
//!
//! This crate contains the cross-crate test modules:
//!
//! - `transport_tests`: target selection, jailing, rate limits, and pool reconciliation
//! - `pipeline_tests`: requests through the axum router to mockito nodes
//! - `scanner_tests`: discovery, probing, and the refresher feeding the proxy
//! - `runtime_tests`: runtime construction, background tasks, and shutdown
//! - `mock_infrastructure`: reusable mock Solana nodes and fixtures
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! Every test runs against local mockito servers and an in-memory SQLite database, so no
//! network access is needed. Tests that start servers are marked `#[serial]`.

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod runtime_tests;
#[cfg(test)]
mod scanner_tests;
#[cfg(test)]
mod transport_tests;

pub mod mock_infrastructure;
