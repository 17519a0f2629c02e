//! Route builder behavior driven directly, without the dispatch layer.

use std::sync::Arc;

use skein_routing::{Route, Rule};
use skein_setup::route_builder::build_route;
use skein_setup::SetupError;

use crate::harness::*;

#[tokio::test]
async fn test_empty_route_installs_nothing() {
    let net = MemoryNet::new();
    let messenger = Arc::new(net.messenger(pk(0x55)).await);

    // No visors registered: any dial would fail the build.
    let route_id = build_route(messenger, expiry(), &Route::default(), 1, 2)
        .await
        .unwrap();
    assert_eq!(route_id, 0);
}

#[tokio::test]
async fn test_single_hop_route_commits_on_initiator() {
    let net = MemoryNet::new();
    let messenger = Arc::new(net.messenger(pk(0x55)).await);

    let (a, b) = (pk(1), pk(2));
    let visor_a = Visor::spawn(&net, a, VisorBehaviour::default()).await;
    let visor_b = Visor::spawn(&net, b, VisorBehaviour::default()).await;

    let route = Route(vec![hop(a, b, tp(9))]);
    let route_id = build_route(messenger, expiry(), &route, 5, 6).await.unwrap();

    // B holds the terminal app rule: the remote is the initiator A.
    let b_rules = visor_b.rules().await;
    assert_eq!(b_rules.len(), 1);
    let Rule::App { remote_pk, remote_port, local_port, route_id: b_id, .. } = b_rules[0] else {
        panic!("terminal rule must be an app rule: {b_rules:?}");
    };
    assert_eq!(remote_pk, a);
    assert_eq!(remote_port, 6);
    assert_eq!(local_port, 5);

    // A's commit chains into B's id over the hop transport, and its id is
    // what the caller gets back.
    let a_rules = visor_a.rules().await;
    assert_eq!(a_rules.len(), 1);
    let Rule::Forward { next_route_id, next_transport, route_id: a_id, .. } = a_rules[0] else {
        panic!("initiator rule must be a forward rule: {a_rules:?}");
    };
    assert_eq!(next_route_id, b_id);
    assert_eq!(next_transport, tp(9));
    assert_eq!(route_id, a_id);
}

#[tokio::test]
async fn test_hop_failure_reports_original_error_and_skips_commit() {
    let net = MemoryNet::new();
    let messenger = Arc::new(net.messenger(pk(0x55)).await);

    let (a, b, c) = (pk(1), pk(2), pk(3));
    let visor_a = Visor::spawn(&net, a, VisorBehaviour::default()).await;
    let _visor_b = Visor::spawn(
        &net,
        b,
        VisorBehaviour { fail_route_id: Some("exhausted".into()), ..Default::default() },
    )
    .await;
    let _visor_c = Visor::spawn(&net, c, VisorBehaviour::default()).await;

    let route = Route(vec![hop(a, b, tp(1)), hop(b, c, tp(2))]);
    let err = build_route(messenger, expiry(), &route, 1, 2).await.unwrap_err();

    assert!(!err.is_cancelled(), "cancellation must never be the primary error");
    let message = err.to_string();
    assert!(message.contains("rule setup"), "got: {message}");
    assert!(message.contains("exhausted"), "got: {message}");
    assert!(visor_a.received().await.is_empty(), "no commit on the initiator");
}

#[tokio::test]
async fn test_dial_failure_surfaces_as_transport_error() {
    let net = MemoryNet::new();
    let messenger = Arc::new(net.messenger(pk(0x55)).await);

    let (a, b) = (pk(1), pk(2));
    // Only A exists; the hop target B was never registered.
    let _visor_a = Visor::spawn(&net, a, VisorBehaviour::default()).await;

    let route = Route(vec![hop(a, b, tp(1))]);
    let err = build_route(messenger, expiry(), &route, 1, 2).await.unwrap_err();
    assert!(matches!(err, SetupError::RuleSetup(_)), "got: {err:?}");
    assert!(err.to_string().contains("transport:"), "got: {err}");
}
