//! Backend node selection, health tracking, and retrying transport.
//!
//! ```text
//!                 round_trip(ctx, body)
//!                          │
//!          ┌───────────────▼───────────────┐
//!          │ next_available_target(methods)│
//!          └───────┬───────────────┬───────┘
//!                  │               │ none eligible
//!          ┌───────▼──────┐  ┌─────▼────────┐
//!          │ primary pool │  │ failover pool│
//!          │ (capability, │  │ (quota only) │
//!          │  jail, rate) │  └─────┬────────┘
//!          └───────┬──────┘        │
//!                  └──────┬────────┘
//!                         ▼
//!                HttpClient::send_request
//!                         │
//!                         ▼
//!              classifier::classify(body)
//!          success / user error ─► return
//!          node error / transport error ─► update_stats(false), retry
//! ```
//!
//! Primary targets come from scanned peers and are refreshed by the endpoint
//! refresher. Failover targets are static, carry an hourly quota, and are not
//! jailed by default.

pub mod classifier;
pub mod errors;
pub mod http_client;
pub mod pool;
pub mod target;
pub mod transport;

pub use classifier::{classify, ResponseClass};
pub use errors::{RpcErrorCategory, TransportError};
pub use http_client::{HttpClient, HttpClientConfig, HttpReply};
pub use pool::{PoolKind, TargetPool};
pub use target::{Target, TargetPolicy, TargetSnapshot};
pub use transport::{Endpoint, RefreshSummary, Transport};
