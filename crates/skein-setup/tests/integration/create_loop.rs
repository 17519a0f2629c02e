//! Loop creation scenarios: full two-hop provisioning, partial failures,
//! endpoint confirmation rollback, and request independence.

use skein_routing::{Addr, Loop, LoopDescriptor, Route, Rule};
use skein_setup::proto::PacketType;

use crate::harness::*;

fn descriptor(forward: Route, reverse: Route, local_port: u16, remote_port: u16) -> LoopDescriptor {
    let local_pk = forward.first().map(|h| h.from).unwrap_or_else(|| pk(0xA1));
    let remote_pk = reverse.first().map(|h| h.from).unwrap_or_else(|| pk(0xA2));
    LoopDescriptor {
        endpoints: Loop {
            local: Addr { pk: local_pk, port: local_port },
            remote: Addr { pk: remote_pk, port: remote_port },
        },
        forward,
        reverse,
        expiry: expiry(),
    }
}

#[tokio::test]
async fn test_two_hop_loop_provisions_all_hops() {
    let net = MemoryNet::new();
    let setup = TestSetup::start(&net, pk(0x55)).await;

    let (a, b, c) = (pk(1), pk(2), pk(3));
    let visor_a = Visor::spawn(&net, a, VisorBehaviour::default()).await;
    let visor_b = Visor::spawn(&net, b, VisorBehaviour::default()).await;
    let visor_c = Visor::spawn(&net, c, VisorBehaviour::default()).await;

    let (tp1, tp2, tp3, tp4) = (tp(1), tp(2), tp(3), tp(4));
    let forward = Route(vec![hop(a, b, tp1), hop(b, c, tp2)]);
    let reverse = Route(vec![hop(c, b, tp3), hop(b, a, tp4)]);
    let ld = descriptor(forward, reverse, 80, 443);

    let (code, payload) = setup.request_json(PacketType::CreateLoop, &ld).await.unwrap();
    assert_eq!(code, PacketType::RespSuccess.code());
    assert_eq!(payload, b"null");

    // Two route ids and two rules per visor: one as a hop target per
    // direction that touches it, one per initiator commit.
    for visor in [&visor_a, &visor_b, &visor_c] {
        assert_eq!(visor.route_id_requests().await, 2, "visor {}", visor.pk);
        assert_eq!(visor.rules().await.len(), 2, "visor {}", visor.pk);
    }

    // Terminal rule of the forward route: deliver to the app on C, pointing
    // back at the initiator A.
    let c_rules = visor_c.rules().await;
    let app_rule = c_rules
        .iter()
        .find(|r| matches!(r, Rule::App { .. }))
        .expect("C must hold the forward route's app rule");
    let Rule::App { remote_pk, remote_port, local_port, responding_route_id, .. } = *app_rule
    else {
        unreachable!()
    };
    assert_eq!(remote_pk, a);
    assert_eq!(remote_port, 80);
    assert_eq!(local_port, 443);
    assert_eq!(responding_route_id, 0);

    // Chaining: B's forward-route rule rewrites to the route id C issued for
    // the app rule, over the B->C transport.
    let Rule::App { route_id: c_forward_id, .. } = *app_rule else { unreachable!() };
    let b_rules = visor_b.rules().await;
    let chained = b_rules.iter().any(|r| {
        matches!(
            r,
            Rule::Forward { next_route_id, next_transport, .. }
                if *next_route_id == c_forward_id && *next_transport == tp2
        )
    });
    assert!(chained, "B must chain into C's route id over tp2: {b_rules:?}");

    // The initiator commit on A rides the first forward hop's transport.
    let a_rules = visor_a.rules().await;
    assert!(
        a_rules.iter().any(|r| matches!(r, Rule::Forward { next_transport, .. } if *next_transport == tp1)),
        "A's commit must use the A->B transport: {a_rules:?}"
    );

    // One confirmation per endpoint, each seeing the loop from its own side.
    let c_confirms = visor_c.confirmations().await;
    assert_eq!(c_confirms.len(), 1);
    assert_eq!(c_confirms[0].endpoints.local.pk, c);
    assert_eq!(c_confirms[0].endpoints.local.port, 443);
    assert_eq!(c_confirms[0].endpoints.remote.pk, a);
    assert_eq!(c_confirms[0].endpoints.remote.port, 80);

    let a_confirms = visor_a.confirmations().await;
    assert_eq!(a_confirms.len(), 1);
    assert_eq!(a_confirms[0].endpoints.local.pk, a);
    assert_eq!(a_confirms[0].endpoints.remote.pk, c);

    assert!(visor_b.confirmations().await.is_empty(), "hops are never confirmed");
    let records = setup.recorder.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].1);
}

#[tokio::test]
async fn test_empty_routes_are_a_noop_success() {
    let net = MemoryNet::new();
    let setup = TestSetup::start(&net, pk(0x55)).await;

    let ld = descriptor(Route::default(), Route::default(), 1, 2);
    let (code, _) = setup.request_json(PacketType::CreateLoop, &ld).await.unwrap();

    // No visor is registered, so any dial would have failed the request.
    assert_eq!(code, PacketType::RespSuccess.code());
    let records = setup.recorder.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].1, "empty-route creation must not record an error");
}

#[tokio::test]
async fn test_middle_hop_failure_skips_initiator_commit() {
    let net = MemoryNet::new();
    let setup = TestSetup::start(&net, pk(0x55)).await;

    let (a, b, c) = (pk(1), pk(2), pk(3));
    let visor_a = Visor::spawn(&net, a, VisorBehaviour::default()).await;
    let _visor_b = Visor::spawn(
        &net,
        b,
        VisorBehaviour { fail_add_rule: Some("busy".into()), ..Default::default() },
    )
    .await;
    let _visor_c = Visor::spawn(&net, c, VisorBehaviour::default()).await;

    let forward = Route(vec![hop(a, b, tp(1)), hop(b, c, tp(2))]);
    let ld = descriptor(forward, Route::default(), 80, 443);

    let (code, payload) = setup.request_json(PacketType::CreateLoop, &ld).await.unwrap();
    assert_eq!(code, PacketType::RespFailure.code());
    let message = failure_message(&payload);
    assert!(message.contains("rule setup"), "got: {message}");
    assert!(message.contains("busy"), "got: {message}");

    // The initiator commit never happened.
    assert!(visor_a.received().await.is_empty(), "A must not be touched");
    assert_eq!(setup.recorder.records().len(), 1);
    assert!(setup.recorder.records()[0].1);
}

#[tokio::test]
async fn test_initiator_confirm_failure_rolls_back_responder() {
    let net = MemoryNet::new();
    let setup = TestSetup::start(&net, pk(0x55)).await;

    let (a, b) = (pk(1), pk(2));
    let visor_a = Visor::spawn(
        &net,
        a,
        VisorBehaviour { fail_confirm: Some("no binding slot".into()), ..Default::default() },
    )
    .await;
    let visor_b = Visor::spawn(&net, b, VisorBehaviour::default()).await;

    let forward = Route(vec![hop(a, b, tp(1))]);
    let reverse = Route(vec![hop(b, a, tp(2))]);
    let ld = descriptor(forward, reverse, 80, 443);

    let (code, payload) = setup.request_json(PacketType::CreateLoop, &ld).await.unwrap();
    assert_eq!(code, PacketType::RespFailure.code());
    let message = failure_message(&payload);
    assert!(message.contains("loop connect"), "got: {message}");
    assert!(message.contains("no binding slot"), "got: {message}");

    // Responder was confirmed first, then rolled back with exactly one
    // LoopClosed carrying the same loop data.
    let confirms = visor_b.confirmations().await;
    assert_eq!(confirms.len(), 1);
    let closed = visor_b.closed_loops().await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0], confirms[0]);

    // The failing initiator got its confirmation attempt and nothing else
    // afterwards.
    assert_eq!(visor_a.confirmations().await.len(), 1);
    assert!(visor_a.closed_loops().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_loops_fail_independently() {
    let net = MemoryNet::new();
    let setup = TestSetup::start(&net, pk(0x55)).await;

    let (a1, b1) = (pk(0x11), pk(0x12));
    let (a2, b2) = (pk(0x21), pk(0x22));
    let _v_a1 = Visor::spawn(&net, a1, VisorBehaviour::default()).await;
    let _v_b1 = Visor::spawn(&net, b1, VisorBehaviour::default()).await;
    let _v_a2 = Visor::spawn(&net, a2, VisorBehaviour::default()).await;
    let _v_b2 = Visor::spawn(
        &net,
        b2,
        VisorBehaviour { fail_add_rule: Some("out of rules".into()), ..Default::default() },
    )
    .await;

    let healthy = descriptor(
        Route(vec![hop(a1, b1, tp(1))]),
        Route(vec![hop(b1, a1, tp(2))]),
        10,
        20,
    );
    let doomed = descriptor(
        Route(vec![hop(a2, b2, tp(3))]),
        Route(vec![hop(b2, a2, tp(4))]),
        30,
        40,
    );

    let (healthy_resp, doomed_resp) = tokio::join!(
        setup.request_json(PacketType::CreateLoop, &healthy),
        setup.request_json(PacketType::CreateLoop, &doomed),
    );

    let (healthy_code, _) = healthy_resp.unwrap();
    let (doomed_code, doomed_payload) = doomed_resp.unwrap();
    assert_eq!(healthy_code, PacketType::RespSuccess.code());
    assert_eq!(doomed_code, PacketType::RespFailure.code());
    assert!(failure_message(&doomed_payload).contains("out of rules"));

    let records = setup.recorder.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|(_, is_error)| *is_error).count(), 1);
}
