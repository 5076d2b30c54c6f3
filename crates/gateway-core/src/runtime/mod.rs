//! Gateway runtime initialization and lifecycle management.
//!
//! Wires storage, transport, the proxy engine, and the stats collector together and
//! owns the background tasks (endpoint refresher, stats flush). The HTTP front-end
//! only needs [`GatewayRuntime::proxy_engine`].
//!
//! # Example
//!
//! ```no_run
//! use gateway_core::{config::AppConfig, runtime::GatewayRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let mut runtime = GatewayRuntime::builder().with_config(config).build().await?;
//!
//!     let engine = runtime.proxy_engine().clone();
//!     // ... serve HTTP with `engine` ...
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{GatewayRuntimeBuilder, RuntimeError};
pub use components::GatewayComponents;
pub use lifecycle::GatewayRuntime;
