use super::Communicator;
use crate::error::{OffloadError, Result};
use crate::types::Rank;
use std::future::Future;
use std::time::Duration;

async fn bounded<T>(
    timeout: Option<Duration>,
    peer: Rank,
    operation: &'static str,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some(limit) = timeout else {
        return fut.await;
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(OffloadError::CollectiveFailed {
            operation,
            rank: peer,
            reason: format!("{what} timed out after {:?}", limit),
        }),
    }
}

/// Send bytes to a peer, bounded by the communicator's timeout.
pub(crate) async fn collective_send(
    comm: &Communicator,
    dest: Rank,
    data: &[u8],
    operation: &'static str,
) -> Result<()> {
    bounded(
        comm.timeout(),
        dest,
        operation,
        "send",
        comm.send_bytes(dest, data),
    )
    .await
}

/// Receive bytes from a peer, bounded by the communicator's timeout.
pub(crate) async fn collective_recv(
    comm: &Communicator,
    src: Rank,
    operation: &'static str,
) -> Result<Vec<u8>> {
    bounded(comm.timeout(), src, operation, "recv", comm.recv_bytes(src)).await
}
