use offload::{Communicator, LocalCluster};
use std::sync::Arc;

/// Run `f` on every rank of a fresh local cluster concurrently and collect
/// the per-rank results in rank order. Keeps all communicators alive until
/// every task completes.
pub async fn run_ranks<F, Fut, T>(world_size: u32, f: F) -> Vec<T>
where
    F: Fn(Arc<Communicator>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let comms = LocalCluster::bootstrap(world_size).unwrap();
    let comms: Vec<Arc<Communicator>> = comms.into_iter().map(Arc::new).collect();

    let f = Arc::new(f);
    let mut handles = Vec::new();
    for c in &comms {
        let c = Arc::clone(c);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(c).await }));
    }
    let mut results = Vec::new();
    for h in handles {
        results.push(h.await.unwrap());
    }
    results
}
