//! HTTP middleware for the proxy front-end.
//!
//! JSON-RPC validation lives in `gateway_core::middleware` because its failures are
//! JSON-RPC responses, not HTTP rejections. Only transport-level concerns stay here.

pub mod correlation_id;

pub use correlation_id::{
    create_request_id_layers, CorrelationId, UuidRequestIdGenerator, X_REQUEST_ID,
};
