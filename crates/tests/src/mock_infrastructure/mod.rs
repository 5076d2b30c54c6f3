//! Mock Infrastructure for Gateway Tests
//!
//! Reusable fakes for backend nodes and fixtures for storage and transport, so
//! integration tests need no real network or database.
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::RpcMockBuilder;
//!
//! let mut node = RpcMockBuilder::new().await;
//! node.mock_healthy_node();
//!
//! // Point a prober or transport at node.url()
//! ```

pub mod rpc_mock;
pub mod test_helpers;

pub use rpc_mock::RpcMockBuilder;
pub use test_helpers::*;
