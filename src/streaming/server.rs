use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;

use super::{
    codec::{FramedReader, FramedWriter, MessageReader, MessageWriter},
    connection::{Connection, ServerContext},
    supervisor::{spawn_supervisor, ConnectionEntry, SupervisorHandle},
};

const SUPERVISOR_BUFFER: usize = 100;

/// Turns byte streams into supervised connection tasks. Independent of the
/// transport so in-memory streams can be attached directly.
#[derive(Clone)]
pub struct StreamingHub {
    context: Arc<ServerContext>,
    supervisor: SupervisorHandle,
}

impl StreamingHub {
    pub fn new(context: Arc<ServerContext>) -> (Self, JoinHandle<()>) {
        let (supervisor_task, supervisor) = spawn_supervisor(SUPERVISOR_BUFFER);
        (
            Self {
                context,
                supervisor,
            },
            supervisor_task,
        )
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    pub async fn attach(
        &self,
        reader: Box<dyn MessageReader>,
        writer: Box<dyn MessageWriter>,
        peer: String,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        let connection = Connection::open(id, self.context.clone(), reader, writer)?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let supervisor = self.supervisor.clone();
        let task = tokio::spawn(async move {
            debug!("Connection {} starting task", id);
            let result = connection.run(shutdown_rx).await;
            if let Err(e) = supervisor.remove(id).await {
                debug!("Could not deregister {}: {}", id, e);
            }
            result
        });
        self.supervisor
            .add(ConnectionEntry {
                id,
                peer,
                task,
                shutdown_tx,
            })
            .await
    }

    pub async fn connections(&self) -> Result<Vec<(Uuid, String)>, AppError> {
        self.supervisor.list().await
    }

    pub async fn disconnect(&self, id: Uuid) -> Result<bool, AppError> {
        self.supervisor.remove(id).await
    }

    /// Stops every connection and waits for their tasks to release their
    /// cameras. Returns how many were running.
    pub async fn shutdown(&self) -> Result<usize, AppError> {
        let tasks = self.supervisor.shutdown_all().await?;
        let count = tasks.len();
        for result in join_all(tasks).await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Connection ended with {}", e),
                Err(e) => warn!("Connection task failed: {}", e),
            }
        }
        Ok(count)
    }
}

/// TCP front door: every accepted socket becomes a connection on the hub.
pub struct StreamingServer {
    listener: TcpListener,
    hub: StreamingHub,
    supervisor_task: JoinHandle<()>,
}

impl StreamingServer {
    pub async fn bind(context: Arc<ServerContext>) -> Result<Self, AppError> {
        let address = format!(
            "{}:{}",
            context.settings.streaming.host, context.settings.streaming.port
        );
        info!("Starting streaming server on {}", address);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| AppError::Bind(e, address.clone()))?;
        let (hub, supervisor_task) = StreamingHub::new(context);
        Ok(Self {
            listener,
            hub,
            supervisor_task,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        self.listener.local_addr().map_err(AppError::Accept)
    }

    pub fn hub(&self) -> &StreamingHub {
        &self.hub
    }

    /// Accepts until `shutdown` is cancelled, then stops every connection.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), AppError> {
        if let Ok(address) = self.listener.local_addr() {
            info!("Listening on {}", address);
        }
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("New peer attempting to connect: {:?}", peer);
                        match self.handle_client(stream, peer).await {
                            Ok(id) => info!("Peer {} connected as {}", peer, id),
                            Err(e) => warn!("Could not start connection for {}: {}", peer, e),
                        }
                    }
                    Err(e) => error!("{}", AppError::Accept(e)),
                },
            }
        }
        let stopped = self.hub.shutdown().await?;
        info!("Streaming server stopped, closed {} connections", stopped);
        self.supervisor_task.abort();
        Ok(())
    }

    async fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<Uuid, AppError> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", peer, e);
        }
        let max_length = self.hub.context().settings.streaming.max_message_bytes;
        let (stream_rx, stream_tx) = stream.into_split();
        let reader = FramedReader::new(stream_rx, max_length);
        let writer = FramedWriter::new(stream_tx, max_length);
        self.hub
            .attach(Box::new(reader), Box::new(writer), peer.to_string())
            .await
    }
}
