use std::{
    net::{TcpListener, ToSocketAddrs},
    sync::Arc,
};

use tracing::{debug, info};

use crate::{
    layers::DefaultResponseGroup,
    tasks::{ConnectionTask, TaskPool},
    Result, Router,
};

/// Serves `router` on `address`. Returns only when binding or accepting fails.
///
/// Each connection is handed to a worker of a thread pool that keeps at least
/// [`Config::threads`](crate::Config::threads) threads alive.
pub fn serve(router: Router, address: impl ToSocketAddrs) -> Result<()> {
    let incoming = TcpListener::bind(address)?;

    let timeout = router.config().timeout;
    let max_body = router.config().max_body;
    let task_pool = TaskPool::new(router.config().threads);

    let router = Arc::new(router);
    let response_layer = Arc::new(DefaultResponseGroup::new());

    info!(
        address = ?incoming.local_addr().ok(),
        threads = task_pool.min_threads(),
        "server started"
    );

    loop {
        let (stream, addr) = incoming.accept()?;

        debug!(%addr, "accepted connection");

        task_pool.send_task(ConnectionTask {
            stream,
            router: router.clone(),
            response_layer: response_layer.clone(),
            timeout,
            max_body,
        });
    }
}
