//! HTTP front-end for the gateway proxy.

pub mod middleware;
pub mod router;
