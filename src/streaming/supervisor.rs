use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::AppError;

pub type ConnectionTask = JoinHandle<Result<(), AppError>>;

pub struct ConnectionEntry {
    pub id: Uuid,
    pub peer: String,
    pub task: ConnectionTask,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl ConnectionEntry {
    pub fn send_shutdown(&self) -> Result<(), AppError> {
        match self.shutdown_tx.send(()) {
            Ok(_) => Ok(()),
            Err(_) if self.task.is_finished() => Ok(()),
            Err(e) => {
                error!("Error sending shutdown to connection {}: {}", self.id, e);
                Err(AppError::ClientShutdown(self.id))
            }
        }
    }
}

pub enum SupervisorCommand {
    AddConnection {
        entry: ConnectionEntry,
        responder: oneshot::Sender<Uuid>,
    },
    RemoveConnection {
        id: Uuid,
        responder: oneshot::Sender<bool>,
    },
    ListConnections {
        responder: oneshot::Sender<Vec<(Uuid, String)>>,
    },
    /// Signals every connection and hands back their tasks to await.
    ShutdownAll {
        responder: oneshot::Sender<Vec<ConnectionTask>>,
    },
}

/// Owns the live connection entries. Only the supervisor task touches it.
#[derive(Default)]
pub struct ConnectionSupervisor {
    connections: Vec<ConnectionEntry>,
}

impl ConnectionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune_finished(&mut self) {
        self.connections.retain(|entry| {
            let live = !entry.task.is_finished();
            if !live {
                debug!("Dropping finished connection {}", entry.id);
            }
            live
        });
    }

    pub fn handle_command(&mut self, command: SupervisorCommand) {
        match command {
            SupervisorCommand::AddConnection { entry, responder } => {
                let id = entry.id;
                info!("Connection {} from {} registered", id, entry.peer);
                self.connections.push(entry);
                let _ = responder.send(id);
            }
            SupervisorCommand::RemoveConnection { id, responder } => {
                let before = self.connections.len();
                self.connections.retain(|entry| {
                    if entry.id != id {
                        return true;
                    }
                    if let Err(e) = entry.send_shutdown() {
                        debug!("{}", e);
                    }
                    false
                });
                let _ = responder.send(self.connections.len() != before);
            }
            SupervisorCommand::ListConnections { responder } => {
                self.prune_finished();
                let live = self
                    .connections
                    .iter()
                    .map(|entry| (entry.id, entry.peer.clone()))
                    .collect();
                let _ = responder.send(live);
            }
            SupervisorCommand::ShutdownAll { responder } => {
                let mut tasks = Vec::with_capacity(self.connections.len());
                for entry in self.connections.drain(..) {
                    if let Err(e) = entry.send_shutdown() {
                        debug!("{}", e);
                    }
                    tasks.push(entry.task);
                }
                let _ = responder.send(tasks);
            }
        }
    }
}

#[derive(Clone)]
pub struct SupervisorHandle {
    command_tx: mpsc::Sender<SupervisorCommand>,
}

fn supervisor_gone() -> AppError {
    AppError::Client("connection supervisor stopped".to_string())
}

impl SupervisorHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SupervisorCommand,
    ) -> Result<T, AppError> {
        let (responder, response_rx) = oneshot::channel();
        self.command_tx
            .send(command(responder))
            .await
            .map_err(|_| supervisor_gone())?;
        response_rx.await.map_err(|_| supervisor_gone())
    }

    pub async fn add(&self, entry: ConnectionEntry) -> Result<Uuid, AppError> {
        self.request(|responder| SupervisorCommand::AddConnection { entry, responder })
            .await
    }

    /// Stops the connection if it is still running. `false` when unknown.
    pub async fn remove(&self, id: Uuid) -> Result<bool, AppError> {
        self.request(|responder| SupervisorCommand::RemoveConnection { id, responder })
            .await
    }

    pub async fn list(&self) -> Result<Vec<(Uuid, String)>, AppError> {
        self.request(|responder| SupervisorCommand::ListConnections { responder })
            .await
    }

    pub async fn shutdown_all(&self) -> Result<Vec<ConnectionTask>, AppError> {
        self.request(|responder| SupervisorCommand::ShutdownAll { responder })
            .await
    }
}

pub fn spawn_supervisor(buffer: usize) -> (JoinHandle<()>, SupervisorHandle) {
    let (command_tx, mut command_rx) = mpsc::channel::<SupervisorCommand>(buffer.max(1));
    let task = tokio::spawn(async move {
        let mut supervisor = ConnectionSupervisor::new();
        while let Some(command) = command_rx.recv().await {
            supervisor.handle_command(command);
        }
        debug!("Connection supervisor stopped");
    });
    (task, SupervisorHandle { command_tx })
}
