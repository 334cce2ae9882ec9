use crate::link::{EgressLinkBuilder, IngressLinkBuilder, Link, LinkBuilder, TokioRunnable};
use crate::utils::test::harness::run_link;
use std::fmt::Debug;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

pub(crate) fn build_runtime() -> Runtime {
    Builder::new()
        .threaded_scheduler()
        .enable_all()
        .build()
        .expect("could not start the tokio runtime")
}

/// Spawns every runnable of a graph and waits for all of them.
async fn spawn_all(runnables: Vec<TokioRunnable>) {
    debug!(tasks = runnables.len(), "spawning link runnables");
    let tasks: Vec<_> = runnables.into_iter().map(tokio::spawn).collect();
    for task in tasks {
        task.await.expect("link task panicked");
    }
}

/// Builds a graph with `link_builder` and runs it on a fresh runtime until every task is done.
/// Whatever comes out of each egress stream is returned in egress order. Only finishes once
/// every input ends, so this suits tests and one-shot runs.
pub fn runner<OutputPacket: Debug + Send + Clone + 'static>(
    link_builder: fn() -> Link<OutputPacket>,
) -> Vec<Vec<OutputPacket>> {
    build_runtime().block_on(run_link(link_builder()))
}

/// Puts an ingress link in front of each receiver and an egress link behind each of the
/// graph's egressors, then runs the whole thing. Egressors and senders pair up in order.
pub fn build_and_run<
    IngressPacket,
    IngressLink: IngressLinkBuilder<IngressPacket>,
    EgressPacket,
    EgressLink: EgressLinkBuilder<EgressPacket>,
    Graph: LinkBuilder<IngressPacket, EgressPacket>,
>(
    ingress_receivers: Vec<IngressLink::Receiver>,
    egress_senders: Vec<EgressLink::Sender>,
    graph: Graph,
) {
    build_runtime().block_on(async {
        let mut tasks = vec![];
        let mut sources = vec![];
        for receiver in ingress_receivers {
            let (runnables, streams) = IngressLink::new().channel(receiver).build_link();
            tasks.extend(runnables);
            sources.extend(streams);
        }

        let (graph_runnables, graph_egressors) = graph.ingressors(sources).build_link();
        tasks.extend(graph_runnables);

        assert_eq!(
            graph_egressors.len(),
            egress_senders.len(),
            "graph egressors and egress senders must pair up"
        );
        for (egressor, sender) in graph_egressors.into_iter().zip(egress_senders) {
            let (sinks, _) = EgressLink::new().ingressor(egressor).channel(sender).build_link();
            tasks.extend(sinks);
        }

        spawn_all(tasks).await;
    })
}
