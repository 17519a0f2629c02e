//! Route builder -- concurrent rule provisioning across the hops of a route.
//!
//! All hops acquire route ids in parallel; each hop waits only for its
//! successor's route id before installing its forwarding rule. The first
//! failure cancels the remaining hop tasks and wins error reporting. The
//! initiator-side rule is committed only after every hop succeeded, so a
//! partially provisioned route is never reachable; abandoned hop rules age
//! out through their expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use skein_routing::{Hop, Port, PublicKey, Route, RouteID, Rule, TransportID};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::SetupError;
use crate::hop_client::HopClient;
use crate::messenger::Messenger;

/// Provision `route` and return the route id the initiator tags outgoing
/// packets with. An empty route installs nothing and yields route id 0.
///
/// `rport`/`lport` shape the terminal delivery rule: the application on the
/// terminal visor listens on `rport` and sees the initiator at `lport`.
pub async fn build_route<M: Messenger>(
    messenger: Arc<M>,
    expiry: DateTime<Utc>,
    route: &Route,
    rport: Port,
    lport: Port,
) -> Result<RouteID, SetupError> {
    if route.is_empty() {
        return Ok(0);
    }

    tracing::info!(%route, hops = route.len(), "provisioning route");
    let n = route.len();
    let initiator = route[0].from;
    let token = CancellationToken::new();

    // One slot per adjacent pair: hop i+1 publishes its route id, hop i awaits
    // it before forming its forwarding rule.
    let mut publish: Vec<Option<oneshot::Sender<RouteID>>> = (0..n).map(|_| None).collect();
    let mut successor: Vec<Option<oneshot::Receiver<RouteID>>> = (0..n).map(|_| None).collect();
    for i in 0..n - 1 {
        let (tx, rx) = oneshot::channel();
        publish[i + 1] = Some(tx);
        successor[i] = Some(rx);
    }

    let mut tasks: JoinSet<Result<(usize, RouteID), SetupError>> = JoinSet::new();
    for i in (0..n).rev() {
        tasks.spawn(provision_hop(HopTask {
            messenger: messenger.clone(),
            token: token.clone(),
            index: i,
            hop: route[i],
            next_tp: route.get(i + 1).map(|hop| hop.tp),
            publish: publish[i].take(),
            successor: successor[i].take(),
            expiry,
            initiator,
            rport,
            lport,
        }));
    }

    let mut hop_ids = vec![0 as RouteID; n];
    let mut first_err: Option<SetupError> = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .unwrap_or_else(|e| Err(SetupError::Internal(format!("hop task failed: {e}"))));
        match result {
            Ok((index, route_id)) => hop_ids[index] = route_id,
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                token.cancel();
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    // Commit on the initiator only now that every hop rule is in place. Runs
    // outside the hop cancellation scope, as a single sequential step.
    let client = HopClient::new(&*messenger);
    let route_id = client
        .request_route_id(initiator)
        .await
        .map_err(|e| SetupError::RouteIdRequest(Box::new(e)))?;
    let rule = Rule::forward(expiry, hop_ids[0], route[0].tp, route_id);
    client
        .add_rule(initiator, &rule)
        .await
        .map_err(|e| SetupError::RuleSetup(Box::new(e)))?;

    tracing::info!(%initiator, route_id, "route committed");
    Ok(route_id)
}

struct HopTask<M: Messenger> {
    messenger: Arc<M>,
    token: CancellationToken,
    index: usize,
    hop: Hop,
    /// Transport of the successor hop; `None` on the terminal hop.
    next_tp: Option<TransportID>,
    /// Where to announce this hop's route id to its predecessor.
    publish: Option<oneshot::Sender<RouteID>>,
    /// The successor's route id, once it has one.
    successor: Option<oneshot::Receiver<RouteID>>,
    expiry: DateTime<Utc>,
    initiator: PublicKey,
    rport: Port,
    lport: Port,
}

async fn provision_hop<M: Messenger>(task: HopTask<M>) -> Result<(usize, RouteID), SetupError> {
    let client = HopClient::new(&*task.messenger);

    let route_id = cancellable(&task.token, client.request_route_id(task.hop.to))
        .await
        .map_err(SetupError::rule_setup)?;

    if let Some(publish) = task.publish {
        // The predecessor may already be gone when its task failed.
        let _ = publish.send(route_id);
    }

    let rule = match task.successor {
        Some(receiver) => {
            let next_id = tokio::select! {
                _ = task.token.cancelled() => return Err(SetupError::Cancelled),
                id = receiver => id.map_err(|_| SetupError::Cancelled)?,
            };
            let next_tp = task
                .next_tp
                .ok_or_else(|| SetupError::Internal("missing successor transport".into()))?;
            Rule::forward(task.expiry, next_id, next_tp, route_id)
        }
        None => Rule::app(task.expiry, 0, task.initiator, task.lport, task.rport, route_id),
    };

    cancellable(&task.token, client.add_rule(task.hop.to, &rule))
        .await
        .map_err(SetupError::rule_setup)?;

    Ok((task.index, route_id))
}

async fn cancellable<T>(
    token: &CancellationToken,
    operation: impl std::future::Future<Output = Result<T, SetupError>>,
) -> Result<T, SetupError> {
    tokio::select! {
        _ = token.cancelled() => Err(SetupError::Cancelled),
        result = operation => result,
    }
}
