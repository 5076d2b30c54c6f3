//! Inbound request checks that run before the transport.

pub mod validation;

pub use validation::{validate_request, Rejection, ValidatedRequest, ValidationError};
