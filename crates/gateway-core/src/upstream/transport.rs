use ahash::AHashSet;
use arc_swap::ArcSwap;
use bytes::Bytes;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    config::{AppConfig, FailoverTarget, TransportConfig},
    metrics::MetricsCollector,
    proxy::{context::RequestContext, errors::ProxyError},
    types::{codes, SCANNED_METHODS},
    upstream::{
        classifier::{classify, ResponseClass},
        errors::TransportError,
        http_client::{HttpClient, HttpClientConfig, HttpReply},
        pool::{PoolKind, TargetPool},
        target::{Target, TargetPolicy},
    },
};

/// A primary endpoint as read from storage: URL plus confirmed methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub methods: AHashSet<String>,
}

/// What one `update_targets` call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

impl RefreshSummary {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0
    }
}

/// Result of one attempt, kept so the loop can answer with the last one.
enum AttemptOutcome {
    Reply(HttpReply, ResponseClass),
    Failed(TransportError),
}

/// Adaptive round-tripper over a primary and a failover pool.
///
/// Selection prefers primary targets that support every requested method, falls back
/// to failover targets, and retries node faults on other targets up to
/// `max_attempts` times.
pub struct Transport {
    primary: TargetPool,
    failover: TargetPool,
    scanned: ArcSwap<AHashSet<String>>,
    http_client: Arc<HttpClient>,
    metrics: Arc<MetricsCollector>,
    config: TransportConfig,
}

impl Transport {
    /// Creates an empty transport whose scanned-method set is the static list.
    #[must_use]
    pub fn new(
        config: TransportConfig,
        http_client: Arc<HttpClient>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            primary: TargetPool::new(PoolKind::Primary),
            failover: TargetPool::new(PoolKind::Failover),
            scanned: ArcSwap::from_pointee(
                SCANNED_METHODS.iter().map(|m| (*m).to_string()).collect(),
            ),
            http_client,
            metrics,
            config,
        }
    }

    /// Builds the HTTP client and the failover pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or a failover URL is invalid.
    pub fn from_config(
        config: &AppConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, TransportError> {
        let http_client = Arc::new(HttpClient::with_config(HttpClientConfig {
            concurrent_limit: config.transport.concurrent_limit,
            ..Default::default()
        })?);

        let transport = Self::new(config.transport.clone(), http_client, metrics);
        for failover in &config.failover {
            transport.add_failover(failover)?;
        }

        tracing::info!(failover_targets = transport.failover.len(), "transport initialized");
        Ok(transport)
    }

    #[must_use]
    pub fn primary(&self) -> &TargetPool {
        &self.primary
    }

    #[must_use]
    pub fn failover(&self) -> &TargetPool {
        &self.failover
    }

    /// Adds a failover target with its hourly quota converted to the rate window.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the URL is not absolute http(s).
    pub fn add_failover(&self, failover: &FailoverTarget) -> Result<(), TransportError> {
        validate_target_url(&failover.url)?;
        let quota = failover.window_quota(self.config.rate_window());
        self.failover.add(Arc::new(Target::new(
            failover.url.clone(),
            AHashSet::new(),
            quota,
            TargetPolicy::failover(&self.config),
        )));
        self.metrics.record_target_count(PoolKind::Failover.as_str(), self.failover.len());
        Ok(())
    }

    /// Replaces the globally known scanned-method set.
    pub fn set_scanned_methods(&self, methods: AHashSet<String>) {
        self.scanned.store(Arc::new(methods));
    }

    #[must_use]
    pub fn scanned_methods(&self) -> Arc<AHashSet<String>> {
        self.scanned.load_full()
    }

    /// Reconciles the primary pool with `endpoints`, keyed by URL.
    ///
    /// New URLs are appended, missing URLs removed, and existing targets keep their
    /// health state with their method set updated in place. Endpoints with invalid
    /// URLs are skipped.
    pub fn update_targets(&self, endpoints: &[Endpoint]) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let wanted: AHashSet<&str> = endpoints.iter().map(|e| e.url.as_str()).collect();

        for target in self.primary.targets().iter() {
            if !wanted.contains(target.url()) && self.primary.remove(target.url()) {
                summary.removed += 1;
            }
        }

        for endpoint in endpoints {
            match self.primary.find(&endpoint.url) {
                Some(existing) => {
                    if *existing.methods() != endpoint.methods {
                        existing.set_methods(endpoint.methods.clone());
                        summary.updated += 1;
                    }
                }
                None => {
                    if let Err(e) = validate_target_url(&endpoint.url) {
                        tracing::warn!(error = %e, "skipping endpoint");
                        continue;
                    }
                    self.primary.add(Arc::new(Target::new(
                        endpoint.url.clone(),
                        endpoint.methods.clone(),
                        0,
                        TargetPolicy::primary(&self.config),
                    )));
                    summary.added += 1;
                }
            }
        }

        self.metrics.record_target_count(PoolKind::Primary.as_str(), self.primary.len());
        summary
    }

    /// Selects the next target able to serve `methods`.
    ///
    /// If any method is outside the scanned set, a primary target qualifies when it
    /// supports at least `scanned - unscanned_method_slack` scanned methods. Otherwise
    /// it must support all of them. Failover targets are not filtered by capability.
    #[must_use]
    pub fn next_available_target(&self, methods: &[String]) -> Option<(Arc<Target>, PoolKind)> {
        let scanned = self.scanned.load();
        let has_unscanned = methods.iter().any(|m| !scanned.contains(m.as_str()));

        let primary = if has_unscanned {
            let required = scanned.len().saturating_sub(self.config.unscanned_method_slack);
            self.primary.next_available(|t| t.supported_count(&scanned) >= required)
        } else {
            self.primary.next_available(|t| t.supports_all(methods))
        };

        primary
            .map(|t| (t, PoolKind::Primary))
            .or_else(|| self.failover.next_available(|_| true).map(|t| (t, PoolKind::Failover)))
    }

    /// `true` when at least one target in either pool can be selected.
    #[must_use]
    pub fn has_available_target(&self) -> bool {
        self.primary.available_count() > 0 || self.failover.available_count() > 0
    }

    fn attempt_timeout(&self, ctx: &RequestContext) -> Duration {
        let per_attempt = self.config.attempt_timeout();
        ctx.remaining().map_or(per_attempt, |left| left.min(per_attempt))
    }

    /// Forwards `body` with retries and records the outcome on `ctx`.
    ///
    /// Returns the backend reply to pass through, which may be a user error (flagged
    /// on `ctx.user_error`) or, after exhausting attempts, a JSON-RPC node error from a
    /// 2xx reply (flagged on `ctx.node_error`). A final non-2xx reply is never passed
    /// through.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::Cancelled`] if the token fires or the deadline passes between attempts
    /// - [`ProxyError::NoAvailableTargets`] if no target qualifies on the first attempt
    /// - [`ProxyError::Upstream`] if the last attempt failed at the transport level
    /// - [`ProxyError::AttemptsExceeded`] if no attempt produced any outcome, or the last
    ///   one was a non-success HTTP status
    pub async fn round_trip(
        &self,
        ctx: &mut RequestContext,
        body: Bytes,
    ) -> Result<HttpReply, ProxyError> {
        let mut last: Option<AttemptOutcome> = None;

        for attempt in 0..self.config.max_attempts {
            if ctx.is_cancelled() {
                tracing::debug!(request_id = %ctx.request_id, attempt, "request cancelled");
                ctx.error_code = Some(codes::REQUEST_CANCELLED);
                return Err(ProxyError::Cancelled);
            }

            let Some((target, pool)) = self.next_available_target(&ctx.methods) else {
                if attempt == 0 {
                    self.metrics.record_no_target();
                    ctx.error_code = Some(codes::NO_AVAILABLE_TARGETS);
                    return Err(ProxyError::NoAvailableTargets);
                }
                tracing::debug!(request_id = %ctx.request_id, attempt, "no target left to retry on");
                break;
            };

            ctx.attempts += 1;
            ctx.target = Some(target.url().to_string());

            let timeout = self.attempt_timeout(ctx);
            let started = Instant::now();
            let result = self.http_client.send_request(target.url(), body.clone(), timeout).await;
            ctx.response_time = started.elapsed();

            let reply = match result {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        target_url = %target.url(),
                        pool = pool.as_str(),
                        attempt,
                        kind = e.as_str(),
                        error = %e,
                        "transport error"
                    );
                    target.update_stats(false);
                    self.metrics.record_node_error(target.url());
                    last = Some(AttemptOutcome::Failed(e));
                    continue;
                }
            };

            if !reply.is_success() {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    target_url = %target.url(),
                    status = reply.status,
                    attempt,
                    "backend returned non-success status"
                );
                target.update_stats(false);
                self.metrics.record_node_error(target.url());
                let class = ResponseClass::NodeError {
                    code: None,
                    reason: format!("http status {}", reply.status),
                };
                last = Some(AttemptOutcome::Reply(reply, class));
                continue;
            }

            match classify(&reply.body, &ctx.methods) {
                ResponseClass::Success => {
                    target.update_stats(true);
                    ctx.error_code = None;
                    return Ok(reply);
                }
                ResponseClass::UserError { code } => {
                    tracing::debug!(request_id = %ctx.request_id, code, "user error from backend");
                    target.update_stats(true);
                    ctx.user_error = true;
                    ctx.error_code = Some(code);
                    return Ok(reply);
                }
                class @ ResponseClass::NodeError { .. } => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        target_url = %target.url(),
                        attempt,
                        code = ?class.code(),
                        "node error"
                    );
                    target.update_stats(false);
                    self.metrics.record_node_error(target.url());
                    last = Some(AttemptOutcome::Reply(reply, class));
                }
            }
        }

        match last {
            Some(AttemptOutcome::Reply(reply, class)) if reply.is_success() => {
                ctx.node_error = true;
                ctx.error_code = class.code();
                Ok(reply)
            }
            Some(AttemptOutcome::Reply(reply, _)) => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    status = reply.status,
                    "attempts exhausted on non-success status"
                );
                ctx.node_error = true;
                ctx.error_code = Some(codes::ATTEMPTS_EXCEEDED);
                Err(ProxyError::AttemptsExceeded)
            }
            Some(AttemptOutcome::Failed(e)) => {
                ctx.node_error = true;
                ctx.error_code = Some(codes::ATTEMPTS_EXCEEDED);
                Err(ProxyError::Upstream(e))
            }
            None => {
                ctx.node_error = true;
                ctx.error_code = Some(codes::ATTEMPTS_EXCEEDED);
                Err(ProxyError::AttemptsExceeded)
            }
        }
    }
}

fn validate_target_url(raw: &str) -> Result<(), TransportError> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        _ => Err(TransportError::InvalidUrl(raw.to_string())),
    }
}
