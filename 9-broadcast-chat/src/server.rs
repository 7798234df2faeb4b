use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::{JoinError, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
    broadcaster::Broadcaster,
    config::ServerConfig,
    event::{ConnectionId, event_queue},
    registry::ClientRegistry,
    session::{SessionContext, SessionEnd, run_session},
};

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<ClientRegistry>,
    next_id: AtomicU64,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        Ok(Self::new(listener, config))
    }

    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            config,
            registry: Arc::new(ClientRegistry::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared handle on the live registry, e.g. to wait for clients in tests.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Accepts connections until `shutdown` resolves, then aborts the live
    /// sessions and waits for the broadcaster to drain the queue.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let (events, queue) = event_queue(self.config.queue_capacity);
        let broadcaster = Broadcaster::new(
            Arc::clone(&self.registry),
            queue,
            self.config.delivery_failure,
        );
        let broadcaster = tokio::spawn(broadcaster.run());

        let ctx = SessionContext {
            registry: Arc::clone(&self.registry),
            events,
            policy: self.config.delivery_failure,
        };
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!(live = sessions.len(), "server shutting down");
                    break;
                }
                accept_result = self.listener.accept() => {
                    self.handle_accept_result(accept_result, &ctx, &mut sessions);
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    handle_finished_session(finished);
                }
            }
        }

        sessions.shutdown().await;
        // The broadcaster exits once the last sender, held by `ctx`, is gone.
        drop(ctx);
        broadcaster.await.context("broadcaster task failed")?;
        info!("server stopped");

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }

    fn handle_accept_result(
        &self,
        result: std::io::Result<(TcpStream, SocketAddr)>,
        ctx: &SessionContext,
        sessions: &mut JoinSet<(ConnectionId, SocketAddr, Result<SessionEnd>)>,
    ) {
        match result {
            Ok((stream, peer)) => {
                let id = self.next_id();
                debug!(%id, %peer, "accepted connection");
                let ctx = ctx.clone();
                sessions.spawn(async move { (id, peer, run_session(id, stream, peer, ctx).await) });
            }
            Err(err) => warn!(error = ?err, "failed to accept connection"),
        }
    }
}

fn handle_finished_session(
    finished: Result<(ConnectionId, SocketAddr, Result<SessionEnd>), JoinError>,
) {
    match finished {
        Ok((id, peer, Ok(end))) => debug!(%id, %peer, ?end, "session finished"),
        Ok((id, peer, Err(err))) => debug!(%id, %peer, error = ?err, "session ended before joining"),
        Err(err) if err.is_cancelled() => {}
        Err(err) => warn!(error = ?err, "session task panicked"),
    }
}
