//! # Gateway Core
//!
//! Core library for a Solana JSON-RPC gateway backed by independently discovered
//! community nodes.
//!
//! This crate provides:
//!
//! - **[`upstream`]**: The adaptive transport. Target pools with jailing and rate
//!   windows, capability-filtered round-robin selection, retries, and response
//!   classification into user errors and node errors.
//!
//! - **[`proxy`]**: The per-request pipeline (validate, forward, record) and the
//!   endpoint refresher that rebuilds the target pool from storage.
//!
//! - **[`scanner`]**: Gossip discovery and empirical per-method probing of peers,
//!   driven by a worker pool.
//!
//! - **[`storage`]**: `SQLite` persistence for peers, capabilities, enrichment, and
//!   request telemetry.
//!
//! - **[`stats`]**: Buffered, best-effort request telemetry.
//!
//! - **[`metrics`]**: Prometheus metrics collection.
//!
//! - **[`middleware`]**: Inbound JSON-RPC request validation.
//!
//! - **[`runtime`]**: Component wiring and graceful shutdown.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────── scanner process ────────────┐      ┌────────── proxy process ──────────┐
//!  │                                         │      │                                   │
//!  │  Scheduler ──► queue ──► Workers        │      │  EndpointRefresher ──► Transport  │
//!  │                            │            │      │          ▲                 ▲      │
//!  │                     SolanaAdapter       │      │          │                 │      │
//!  │                      │         │        │      │          │            ProxyEngine │
//!  │                  Prober    discover     │      │          │                 ▲      │
//!  └──────────────────────┼─────────┼────────┘      └──────────┼─────────────────┼──────┘
//!                         ▼         ▼                          │                 │
//!                     ┌─────────────────────┐                  │            POST / (axum)
//!                     │   SQLite storage    │ ─────────────────┘
//!                     └─────────────────────┘
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Validation │ ─── Invalid ──► 200/415 + JSON-RPC error
//! └──────┬──────┘
//!        │ Valid
//!        ▼
//! ┌──────────────────┐
//! │ Target selection │ ─── none on first attempt ──► 503 (2000)
//! └──────┬───────────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │  HTTP attempt    │ ─── transport / status / node error ──► jail, retry
//! └──────┬───────────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ Classification   │ ─── user error ──► pass through, no retry
//! └──────┬───────────┘
//!        │ Success
//!        ▼
//!   Response to Client (+ X-NODE-* headers)
//! ```

pub mod config;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod runtime;
pub mod scanner;
pub mod stats;
pub mod storage;
pub mod types;
pub mod upstream;
