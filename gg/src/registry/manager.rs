//! JobRegistry - actor that owns the in-memory job records
//!
//! Records live only as long as the process. All access goes through the
//! command channel; mutation additionally requires a [`JobWriter`], which
//! only one caller per job can obtain.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{JobUpdate, RegistryCommand, RegistryError, RegistryResponse};
use crate::domain::{JobRecord, JobStatus, Plan};

/// Handle to send commands to the JobRegistry
#[derive(Clone)]
pub struct JobRegistry {
    tx: mpsc::Sender<RegistryCommand>,
}

impl JobRegistry {
    /// Spawn a new JobRegistry actor
    pub fn spawn() -> Self {
        debug!("JobRegistry::spawn: called");
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(rx));
        info!("JobRegistry spawned");
        Self { tx }
    }

    /// Insert a new record, returning its id
    pub async fn insert(&self, record: JobRecord) -> RegistryResponse<String> {
        debug!(id = %record.id, "insert: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Insert {
                record,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Snapshot of a record
    pub async fn get(&self, id: &str) -> RegistryResponse<Option<JobRecord>> {
        debug!(%id, "get: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Get {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)
    }

    /// Snapshots of all records, oldest first
    pub async fn list(&self) -> RegistryResponse<Vec<JobRecord>> {
        debug!("list: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::List { reply: reply_tx })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)
    }

    /// Take single-writer ownership of a job
    ///
    /// Fails when the job is unknown, already claimed, or already terminal.
    pub async fn claim(&self, id: &str) -> RegistryResponse<JobWriter> {
        debug!(%id, "claim: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Claim {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)??;
        Ok(JobWriter {
            id: id.to_string(),
            registry: self.clone(),
        })
    }

    async fn update(&self, id: &str, update: JobUpdate) -> RegistryResponse<JobRecord> {
        debug!(%id, ?update, "update: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::Update {
                id: id.to_string(),
                update,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Stop the actor
    pub async fn shutdown(&self) -> RegistryResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(RegistryCommand::Shutdown)
            .await
            .map_err(|_| RegistryError::ChannelError)
    }
}

/// Exclusive write access to one job record
pub struct JobWriter {
    id: String,
    registry: JobRegistry,
}

impl JobWriter {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn set_status(&self, status: JobStatus) -> RegistryResponse<JobRecord> {
        self.registry.update(&self.id, JobUpdate::Status(status)).await
    }

    pub async fn set_base(&self, base_game_id: impl Into<String>) -> RegistryResponse<JobRecord> {
        self.registry.update(&self.id, JobUpdate::Base(base_game_id.into())).await
    }

    /// Move to Ready with the job's outputs
    ///
    /// `base_game_id` replaces the requested base: it names the artifact the
    /// bundle was actually derived from, if any.
    pub async fn finish(self, plan: Plan, game_url: String, base_game_id: Option<String>) -> RegistryResponse<JobRecord> {
        self.registry
            .update(
                &self.id,
                JobUpdate::Finish {
                    plan,
                    game_url,
                    base_game_id,
                },
            )
            .await
    }

    /// Move to Failed with `error` as the job's error text
    pub async fn fail(self, error: impl Into<String>) -> RegistryResponse<JobRecord> {
        self.registry.update(&self.id, JobUpdate::Fail(error.into())).await
    }
}

/// Apply an update to a record, enforcing the status order
fn apply_update(record: &mut JobRecord, update: JobUpdate) -> RegistryResponse<()> {
    if let Some(next) = update.target_status()
        && !record.status.can_transition_to(next)
    {
        return Err(RegistryError::InvalidTransition {
            id: record.id.clone(),
            from: record.status,
            to: next,
        });
    }
    if record.is_terminal() {
        return Err(RegistryError::InvalidTransition {
            id: record.id.clone(),
            from: record.status,
            to: record.status,
        });
    }

    match update {
        JobUpdate::Status(status) => record.set_status(status),
        JobUpdate::Base(base) => record.base_game_id = Some(base),
        JobUpdate::Finish {
            plan,
            game_url,
            base_game_id,
        } => {
            record.plan = Some(plan);
            record.game_url = Some(game_url);
            record.base_game_id = base_game_id;
            record.set_status(JobStatus::Ready);
        }
        JobUpdate::Fail(error) => {
            record.set_error(error);
            record.set_status(JobStatus::Failed);
        }
    }
    Ok(())
}

/// The actor loop that processes commands
async fn actor_loop(mut rx: mpsc::Receiver<RegistryCommand>) {
    debug!("actor_loop: called");
    let mut jobs: HashMap<String, JobRecord> = HashMap::new();
    let mut claimed: HashSet<String> = HashSet::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RegistryCommand::Insert { record, reply } => {
                debug!(id = %record.id, "actor_loop: Insert command");
                let result = if jobs.contains_key(&record.id) {
                    Err(RegistryError::AlreadyExists(record.id))
                } else {
                    let id = record.id.clone();
                    jobs.insert(id.clone(), record);
                    Ok(id)
                };
                let _ = reply.send(result);
            }

            RegistryCommand::Get { id, reply } => {
                debug!(%id, "actor_loop: Get command");
                let _ = reply.send(jobs.get(&id).cloned());
            }

            RegistryCommand::List { reply } => {
                debug!("actor_loop: List command");
                let mut records: Vec<JobRecord> = jobs.values().cloned().collect();
                records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
                let _ = reply.send(records);
            }

            RegistryCommand::Claim { id, reply } => {
                debug!(%id, "actor_loop: Claim command");
                let result = match jobs.get(&id) {
                    None => Err(RegistryError::NotFound(id)),
                    Some(record) if record.is_terminal() || claimed.contains(&id) => {
                        warn!(%id, "Rejected second claim on job");
                        Err(RegistryError::AlreadyClaimed(id))
                    }
                    Some(_) => {
                        claimed.insert(id);
                        Ok(())
                    }
                };
                let _ = reply.send(result);
            }

            RegistryCommand::Update { id, update, reply } => {
                debug!(%id, "actor_loop: Update command");
                let result = match jobs.get_mut(&id) {
                    None => Err(RegistryError::NotFound(id)),
                    Some(record) => apply_update(record, update).map(|()| record.clone()),
                };
                if let Ok(record) = &result {
                    debug!(id = %record.id, status = %record.status, "actor_loop: record updated");
                }
                let _ = reply.send(result);
            }

            RegistryCommand::Shutdown => {
                info!("JobRegistry shutting down");
                break;
            }
        }
    }

    debug!("JobRegistry actor stopped");
}
