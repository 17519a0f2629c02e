//! CloseLoop dispatch: the recipient is the other channel edge and sees the
//! loop from its own perspective.

use skein_routing::{Addr, Loop, LoopData};
use skein_setup::proto::{PacketType, SetupProtocol};

use crate::harness::*;

#[tokio::test]
async fn test_close_loop_forwards_to_other_edge_swapped() {
    let net = MemoryNet::new();
    let setup = TestSetup::start(&net, pk(0x55)).await;

    // X is both the requesting edge and the LoopClosed recipient.
    let visor_x = Visor::spawn(&net, pk(7), VisorBehaviour::default()).await;

    let local = Addr { pk: pk(7), port: 10 };
    let remote = Addr { pk: pk(8), port: 20 };
    let ld = LoopData { endpoints: Loop { local, remote }, route_id: 7 };

    let payload = serde_json::to_vec(&ld).unwrap();
    let (code, resp_payload) = send_raw(
        &visor_x.messenger,
        setup.setup_pk,
        PacketType::CloseLoop.code(),
        &payload,
    )
    .await
    .unwrap();
    assert_eq!(code, PacketType::RespSuccess.code());
    assert_eq!(resp_payload, b"null");

    let closed = visor_x.closed_loops().await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].route_id, 7, "route id must be preserved");
    assert_eq!(closed[0].endpoints.local, remote, "local/remote must be swapped");
    assert_eq!(closed[0].endpoints.remote, local);
}

#[tokio::test]
async fn test_close_loop_rejects_foreign_edges_without_dialling() {
    let net = MemoryNet::new();
    let setup = TestSetup::start(&net, pk(0x55)).await;
    let visor_x = Visor::spawn(&net, pk(7), VisorBehaviour::default()).await;

    let ld = LoopData {
        endpoints: Loop {
            local: Addr { pk: pk(7), port: 10 },
            remote: Addr { pk: pk(8), port: 20 },
        },
        route_id: 3,
    };

    // A channel whose edges do not include the setup node's own key.
    let channel = net.connect_with_edges(setup.setup_pk, [pk(0xD1), pk(0xD2)]).await;
    let mut proto = SetupProtocol::new(channel);
    proto
        .write_frame(PacketType::CloseLoop.code(), &serde_json::to_vec(&ld).unwrap())
        .await
        .unwrap();
    let resp = proto.read_frame().await.unwrap();

    assert_eq!(resp.packet_type, PacketType::RespFailure.code());
    assert_eq!(failure_message(&resp.payload), "configured PubKey not found in edges");
    assert!(visor_x.received().await.is_empty(), "no peer may be dialled");

    let records = setup.recorder.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].1);
}
