//! The proxy request pipeline and its background endpoint refresher.

pub mod context;
pub mod engine;
pub mod errors;
pub mod refresher;

pub use context::RequestContext;
pub use engine::{
    ProxyEngine, ProxyResponse, HEADER_NODE_ENDPOINT, HEADER_NODE_REQ_ATTEMPTS,
    HEADER_NODE_RESPONSE_TIME,
};
pub use errors::ProxyError;
pub use refresher::EndpointRefresher;
