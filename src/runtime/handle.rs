use std::sync::{Arc, Mutex, PoisonError};

use hashbrown::{hash_map::Entry, HashMap, HashSet};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    core::ledger::{CastOutcome, VoteLedger},
    error::VoteError,
    identity::{Identity, IdentityProvider},
    persist::RecordStore,
    types::{Polarity, TargetId, VoterId},
    vote::VoteView,
};

use super::events::VoteEvent;

/// Failure of a handle call.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The ledger rejected or failed the operation.
    #[error(transparent)]
    Vote(#[from] VoteError),
    /// The runtime loop has stopped.
    #[error("vote runtime channel closed")]
    ChannelClosed,
}

/// Queue sizes for the runtime loop.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bound of the command queue.
    pub command_queue_bound: usize,
    /// Capacity of the event broadcast buffer.
    pub event_queue_bound: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_queue_bound: 1024,
        }
    }
}

type ViewKey = (VoterId, TargetId);

/// Clonable handle to a running ledger loop.
pub struct VoteLedgerHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<VoteEvent>,
    in_flight: Arc<Mutex<HashSet<ViewKey>>>,
}

impl Clone for VoteLedgerHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

enum Command {
    OpenView {
        viewer: Option<Identity>,
        target: TargetId,
        resp: oneshot::Sender<Result<VoteView, VoteError>>,
    },
    Cast {
        voter: Option<Identity>,
        target: TargetId,
        requested: Polarity,
        /// Held until the cast resolves, even if the caller stops waiting.
        guard: Option<InFlightGuard>,
        resp: oneshot::Sender<Result<CastOutcome, VoteError>>,
    },
    CloseView {
        voter: VoterId,
        target: TargetId,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Releases an in-flight slot when dropped by the runtime loop after the cast
/// resolves, or by the caller if the command was never queued.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<ViewKey>>>,
    key: ViewKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Starts the single-writer loop that owns `ledger` and the open views.
pub fn spawn_vote_ledger<S>(ledger: VoteLedger<S>, config: RuntimeConfig) -> VoteLedgerHandle
where
    S: RecordStore + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (events_tx, _) = broadcast::channel::<VoteEvent>(config.event_queue_bound);
    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut views: HashMap<ViewKey, VoteView> = HashMap::new();
        while let Some(cmd) = cmd_rx.recv().await {
            if handle_command(cmd, &ledger, &mut views, &events_tx_loop).await {
                break;
            }
        }
        tracing::debug!(open_views = views.len(), "vote runtime stopped");
    });

    VoteLedgerHandle {
        cmd_tx,
        events_tx,
        in_flight: Arc::new(Mutex::new(HashSet::new())),
    }
}

impl VoteLedgerHandle {
    /// Subscribes to cast and drift events.
    pub fn subscribe(&self) -> broadcast::Receiver<VoteEvent> {
        self.events_tx.subscribe()
    }

    /// Loads (and, for a signed-in viewer, caches) the view of `target`.
    pub async fn open_view(
        &self,
        viewer: Option<Identity>,
        target: TargetId,
    ) -> Result<VoteView, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::OpenView {
                viewer,
                target,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(rx.await.map_err(|_| RuntimeError::ChannelClosed)??)
    }

    /// Casts a raw `vote_type` (1 or -1) on `target`.
    ///
    /// A second cast by the same voter on the same target while the first is
    /// unresolved fails with [`VoteError::VoteInFlight`]. A queued cast stays
    /// in flight until the runtime resolves it, even if this future is dropped.
    pub async fn cast_vote(
        &self,
        voter: Option<Identity>,
        target: TargetId,
        vote_type: i64,
    ) -> Result<CastOutcome, RuntimeError> {
        let requested = Polarity::try_from(vote_type)?;
        let guard = match &voter {
            Some(identity) => Some(self.claim(identity.id, target)?),
            None => None,
        };

        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Cast {
                voter,
                target,
                requested,
                guard,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(rx.await.map_err(|_| RuntimeError::ChannelClosed)??)
    }

    /// Casts as whoever `provider` reports as signed in.
    pub async fn cast_current(
        &self,
        provider: &dyn IdentityProvider,
        target: TargetId,
        vote_type: i64,
    ) -> Result<CastOutcome, RuntimeError> {
        self.cast_vote(provider.current_user(), target, vote_type)
            .await
    }

    /// Discards the cached view of `target` for `voter`.
    pub async fn close_view(&self, voter: VoterId, target: TargetId) -> Result<(), RuntimeError> {
        self.cmd_tx
            .send(Command::CloseView { voter, target })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Stops the loop after queued commands drain.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    fn claim(&self, voter: VoterId, target: TargetId) -> Result<InFlightGuard, RuntimeError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !set.insert((voter, target)) {
            return Err(VoteError::VoteInFlight { target }.into());
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key: (voter, target),
        })
    }
}

async fn handle_command<S: RecordStore>(
    cmd: Command,
    ledger: &VoteLedger<S>,
    views: &mut HashMap<ViewKey, VoteView>,
    events_tx: &broadcast::Sender<VoteEvent>,
) -> bool {
    match cmd {
        Command::OpenView {
            viewer,
            target,
            resp,
        } => {
            let res = ledger.open_view(viewer.as_ref(), target).await;
            if let (Ok(view), Some(identity)) = (&res, &viewer) {
                views.insert((identity.id, target), view.clone());
            }
            let _ = resp.send(res);
        }
        Command::Cast {
            voter,
            target,
            requested,
            guard,
            resp,
        } => {
            let res = cast(ledger, views, voter.as_ref(), target, requested).await;
            drop(guard);
            match (&res, &voter) {
                (Ok(outcome), Some(identity)) => {
                    let _ = events_tx.send(VoteEvent::Cast {
                        voter: identity.id,
                        target,
                        from: outcome.transition.from,
                        to: outcome.transition.to,
                        counters: outcome.counters,
                    });
                }
                (
                    Err(VoteError::CounterUpdateFailed {
                        voter: drifted,
                        compensated,
                        ..
                    }),
                    _,
                ) => {
                    let _ = events_tx.send(VoteEvent::CounterDrift {
                        voter: *drifted,
                        target,
                        compensated: *compensated,
                    });
                }
                _ => {}
            }
            let _ = resp.send(res);
        }
        Command::CloseView { voter, target } => {
            views.remove(&(voter, target));
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}

async fn cast<S: RecordStore>(
    ledger: &VoteLedger<S>,
    views: &mut HashMap<ViewKey, VoteView>,
    voter: Option<&Identity>,
    target: TargetId,
    requested: Polarity,
) -> Result<CastOutcome, VoteError> {
    let identity = voter.ok_or(VoteError::Unauthenticated)?;
    let view = match views.entry((identity.id, target)) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => entry.insert(ledger.open_view(Some(identity), target).await?),
    };
    ledger.cast_vote(Some(identity), view, requested).await
}
