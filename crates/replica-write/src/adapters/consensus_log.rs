//! Single-replica consensus log.
//!
//! Proposals are sequenced under a lock, assigned a lease applied index and
//! applied in order by one background task. Application checks the lease
//! the command was evaluated under, commits the engine batch and releases
//! the command's latches before replying to the proposer.

use super::engine::InMemoryEngine;
use super::lease::InMemoryLeaseAuthority;
use crate::domain::{
    LatchGuard, LeaseRequest, LogicalOpLog, Proposal, ProposalError, ProposalHandle,
    ProposalResult, WriteError,
};
use crate::ports::{ConsensusLog, LeaseAuthority};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{CommandId, LeaseAppliedIndex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

struct LogEntry {
    proposal: Proposal,
    guard: LatchGuard,
    max_lease_index: LeaseAppliedIndex,
    reply: oneshot::Sender<ProposalResult>,
    abandoned: Arc<AtomicBool>,
}

#[derive(Default)]
struct LogState {
    /// Last lease applied index handed out.
    next_lai: LeaseAppliedIndex,
    applied_lai: LeaseAppliedIndex,
    applied_commands: HashSet<CommandId>,
    /// Logical op logs of applied commands, in application order.
    op_logs: Vec<LogicalOpLog>,
    closed: bool,
}

pub struct InMemoryConsensusLog {
    tx: mpsc::UnboundedSender<LogEntry>,
    state: Arc<Mutex<LogState>>,
    paused: watch::Sender<bool>,
}

impl InMemoryConsensusLog {
    /// Start the log and its applier task on the current runtime.
    pub fn spawn(engine: InMemoryEngine, lease_authority: Arc<InMemoryLeaseAuthority>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (paused, paused_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(LogState::default()));
        let applier = Applier {
            rx,
            paused: paused_rx,
            engine,
            lease_authority,
            state: state.clone(),
        };
        tokio::spawn(applier.run());
        Self { tx, state, paused }
    }

    /// Stop applying commands. Proposals are still accepted and queue up.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Refuse all further proposals. Queued commands still apply.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn applied_index(&self) -> LeaseAppliedIndex {
        self.state.lock().applied_lai
    }

    /// Drain the logical op logs of applied commands.
    pub fn take_op_logs(&self) -> Vec<LogicalOpLog> {
        std::mem::take(&mut self.state.lock().op_logs)
    }
}

#[async_trait]
impl ConsensusLog for InMemoryConsensusLog {
    async fn propose(
        &self,
        proposal: Proposal,
        guard: LatchGuard,
    ) -> Result<ProposalHandle, ProposalError> {
        let (reply, completion) = oneshot::channel();
        let abandoned = Arc::new(AtomicBool::new(false));

        let mut state = self.state.lock();
        if state.closed {
            return Err(ProposalError::new(WriteError::ProposalRejected(
                "log closed".into(),
            )));
        }
        // Lease requests are not sequenced by lease applied index.
        let max_lease_index = if proposal.is_lease_request {
            0
        } else {
            state.next_lai + 1
        };
        let entry = LogEntry {
            proposal,
            guard,
            max_lease_index,
            reply,
            abandoned: abandoned.clone(),
        };
        if self.tx.send(entry).is_err() {
            return Err(ProposalError::new(WriteError::ProposalRejected(
                "applier stopped".into(),
            )));
        }
        if max_lease_index != 0 {
            state.next_lai = max_lease_index;
        }
        drop(state);

        Ok(ProposalHandle {
            completion,
            abandon: Box::new(move || abandoned.store(true, Ordering::SeqCst)),
            max_lease_index,
        })
    }
}

struct Applier {
    rx: mpsc::UnboundedReceiver<LogEntry>,
    paused: watch::Receiver<bool>,
    engine: InMemoryEngine,
    lease_authority: Arc<InMemoryLeaseAuthority>,
    state: Arc<Mutex<LogState>>,
}

impl Applier {
    async fn run(mut self) {
        debug!("consensus log applier started");
        while let Some(entry) = self.rx.recv().await {
            // A dropped log cannot be paused any more.
            let _ = self.paused.wait_for(|paused| !*paused).await;
            self.apply(entry);
        }
        debug!("consensus log applier stopped");
    }

    fn apply(&self, entry: LogEntry) {
        let LogEntry {
            proposal,
            mut guard,
            max_lease_index,
            reply,
            abandoned,
        } = entry;
        let command_id = proposal.command_id;

        let result = match self.check(&proposal, max_lease_index) {
            Ok(()) => self.commit(proposal),
            Err(err) => {
                warn!(%command_id, %err, "rejected command at application");
                proposal.write.batch.close();
                ProposalResult::from_error(err)
            }
        };

        guard.release();
        if abandoned.load(Ordering::SeqCst) {
            debug!(%command_id, "proposer abandoned command before it applied");
            return;
        }
        let _ = reply.send(result);
    }

    fn check(&self, proposal: &Proposal, max_lease_index: LeaseAppliedIndex) -> Result<(), WriteError> {
        if !proposal.is_lease_request {
            let current = self.lease_authority.current_lease();
            if !current.as_ref().is_some_and(|cur| cur.equivalent(&proposal.lease)) {
                return Err(WriteError::NotLeaseHolder {
                    range_id: proposal.range_id,
                    replica: proposal.lease.replica,
                    lease_holder: current.map(|cur| cur.replica),
                });
            }
        }

        let mut state = self.state.lock();
        if !state.applied_commands.insert(proposal.command_id) {
            return Err(WriteError::ProposalRejected(format!(
                "command {} already applied",
                proposal.command_id
            )));
        }
        if max_lease_index != 0 {
            if max_lease_index <= state.applied_lai {
                return Err(WriteError::ProposalRejected(format!(
                    "lease applied index {} at or below applied index {}",
                    max_lease_index, state.applied_lai
                )));
            }
            state.applied_lai = max_lease_index;
        }
        Ok(())
    }

    fn commit(&self, proposal: Proposal) -> ProposalResult {
        let Proposal {
            command_id,
            lease,
            summary,
            write,
            ..
        } = proposal;
        let mut effects = write.effects;

        if let Some(new_lease) = effects.new_lease.take() {
            let req = LeaseRequest {
                lease: new_lease,
                prev_lease: lease,
            };
            if let Err(err) = self.lease_authority.install_lease(&req) {
                write.batch.close();
                return ProposalResult::from_error(err);
            }
        }

        if let Err(err) = write.batch.commit() {
            return ProposalResult::from_error(err);
        }
        self.engine.apply_stats(&write.stats);

        if effects.gossip_system_config {
            info!(%command_id, "system config changed; gossiping");
        }
        if let Some(span) = &effects.gossip_node_liveness {
            info!(%command_id, ?span, "node liveness changed; gossiping");
        }
        if let Some(log) = effects.logical_op_log.take() {
            self.state.lock().op_logs.push(log);
        }
        debug!(%command_id, batch = %summary, "applied command");
        ProposalResult::from_response(write.response, effects)
    }
}
