//! Integration tests for target selection, jailing, and pool reconciliation.
//!
//! These exercise the transport through its public API only: pools are filled with
//! `update_targets` and failover config, health is driven with `update_stats`.

use crate::mock_infrastructure::{endpoint, metrics, scanned_except, transport_with_failover};
use gateway_core::{
    config::{AppConfig, TransportConfig},
    upstream::{classify, ResponseClass, Target, TargetPolicy, Transport},
};
use std::{collections::HashMap, sync::Arc, time::Duration};

fn primary_transport(urls: &[&str]) -> Transport {
    let transport = Transport::from_config(&AppConfig::default(), metrics()).unwrap();
    let endpoints: Vec<_> = urls.iter().map(|url| endpoint(url, &["getSlot"])).collect();
    transport.update_targets(&endpoints);
    transport
}

fn methods(names: &[&str]) -> Vec<String> {
    names.iter().map(|m| (*m).to_string()).collect()
}

#[test]
fn test_jailed_target_is_never_selected() {
    let transport = primary_transport(&["http://10.0.0.1:8899", "http://10.0.0.2:8899"]);
    let bad = transport.primary().find("http://10.0.0.1:8899").unwrap();
    bad.update_stats(false);

    for _ in 0..20 {
        let (target, _) = transport.next_available_target(&methods(&["getSlot"])).unwrap();
        assert_eq!(target.url(), "http://10.0.0.2:8899");
    }
}

#[test]
fn test_jailing_disabled_pool_ignores_jail() {
    let config = TransportConfig { primary_jailing: false, ..TransportConfig::default() };
    let target = Target::new("http://10.0.0.1:8899", Default::default(), 0, TargetPolicy::primary(&config));

    target.update_stats(false);
    target.update_stats(false);
    assert!(target.jail_remaining() > Duration::ZERO);
    assert!(target.is_available());
}

#[test]
fn test_jail_grows_until_success_streak_resets() {
    let config = TransportConfig { jail_unit_ms: 10_000, ..TransportConfig::default() };
    let target = Target::new("http://10.0.0.1:8899", Default::default(), 0, TargetPolicy::primary(&config));

    let mut previous = Duration::ZERO;
    for n in 1..=5 {
        target.update_stats(false);
        let jail = target.jail_remaining();
        assert!(jail > previous, "jail after {n} errors should exceed the previous one");
        assert_eq!(target.consecutive_errors(), n);
        previous = jail;
    }

    for _ in 0..config.success_threshold - 1 {
        target.update_stats(true);
    }
    assert_eq!(target.consecutive_errors(), 5);

    target.update_stats(true);
    assert_eq!(target.consecutive_errors(), 0);
    assert_eq!(target.consecutive_successes(), 0);
}

#[test]
fn test_rate_limited_failover_is_skipped() {
    let mut config = AppConfig::default();
    config.failover = vec![gateway_core::config::FailoverTarget {
        url: "http://10.0.0.9:8899".to_string(),
        hourly_quota: 3600,
    }];
    let transport = Transport::from_config(&config, metrics()).unwrap();
    let target = transport.failover().find("http://10.0.0.9:8899").unwrap();

    // 3600/h over a 10s window allows 10 requests.
    assert_eq!(target.rate_limit(), 10);
    for _ in 0..10 {
        assert!(transport.next_available_target(&methods(&["getSlot"])).is_some());
        target.update_stats(true);
    }
    assert!(transport.next_available_target(&methods(&["getSlot"])).is_none());
}

#[test]
fn test_round_robin_visits_each_target_once_per_cycle() {
    let urls = ["http://10.0.0.1:8899", "http://10.0.0.2:8899", "http://10.0.0.3:8899"];
    let transport = primary_transport(&urls);

    for _ in 0..4 {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for _ in 0..urls.len() {
            let (target, _) = transport.next_available_target(&methods(&["getSlot"])).unwrap();
            *seen.entry(target.url().to_string()).or_default() += 1;
        }
        assert_eq!(seen.len(), urls.len());
        assert!(seen.values().all(|&count| count == 1));
    }
}

#[test]
fn test_repeated_refresh_preserves_target_state() {
    let transport = primary_transport(&["http://10.0.0.1:8899"]);
    let before = transport.primary().find("http://10.0.0.1:8899").unwrap();
    before.update_stats(false);

    let summary = transport.update_targets(&[endpoint("http://10.0.0.1:8899", &["getSlot"])]);
    assert!(summary.is_noop());

    let after = transport.primary().find("http://10.0.0.1:8899").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.consecutive_errors(), 1);
}

#[test]
fn test_unscanned_method_prefers_well_covered_primary() {
    let mut config = AppConfig::default();
    let transport = transport_with_failover(&mut config, &["http://10.0.0.9:8899".to_string()]);
    transport.update_targets(&[
        endpoint("http://10.0.0.1:8899", &["getSlot"]),
        endpoint("http://10.0.0.2:8899", &scanned_except(&["getTransaction"])),
    ]);

    for _ in 0..5 {
        let (target, _) = transport.next_available_target(&methods(&["getBlockTime"])).unwrap();
        assert_eq!(target.url(), "http://10.0.0.2:8899");
    }
}

#[test]
fn test_classifier_invalid_params_exceptions() {
    let methods = methods(&["getBlock"]);
    let user = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param: WrongSize"}}"#;
    assert_eq!(classify(user, &methods), ResponseClass::UserError { code: -32602 });

    let blockstore = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"blockstore error"}}"#;
    assert!(matches!(classify(blockstore, &methods), ResponseClass::NodeError { code: Some(-32602), .. }));
}
