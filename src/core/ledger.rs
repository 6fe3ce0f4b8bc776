//! Vote ledger: plans each cast, applies it optimistically to the view, and
//! commits it through the record store.

use tracing::{debug, error, warn};

use crate::{
    config::{CounterFailurePolicy, LedgerConfig},
    error::VoteError,
    identity::Identity,
    op::{CounterDelta, RecordOp, Transition},
    persist::{CommitError, CounterWriteError, RecordStore, StoreError},
    types::{Polarity, TargetId},
    vote::{TargetCounters, VoteRecord, VoteView},
};

/// Result of a successful cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastOutcome {
    /// Applied transition.
    pub transition: Transition,
    /// Counters now shown to the voter.
    pub counters: TargetCounters,
}

/// What a compensation managed to revert.
#[derive(Debug, Default, Clone, Copy)]
struct Undo {
    record: bool,
    counters: bool,
}

/// Owns the vote transition protocol over a [`RecordStore`].
pub struct VoteLedger<S: RecordStore> {
    store: S,
    config: LedgerConfig,
}

impl<S: RecordStore> VoteLedger<S> {
    /// Ledger with default config.
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    /// Ledger with explicit config.
    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active config.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Loads what `viewer` sees for `target`: stored counters and, when
    /// signed in, the viewer's own vote.
    pub async fn open_view(
        &self,
        viewer: Option<&Identity>,
        target: TargetId,
    ) -> Result<VoteView, VoteError> {
        let counters = self
            .store
            .read_counters(target)
            .await
            .map_err(|source| VoteError::ReadFailed { target, source })?;
        let current_vote = match viewer {
            Some(identity) => self.load_vote(identity, target).await?,
            None => None,
        };
        Ok(VoteView::new(
            target,
            viewer.map(|i| i.id),
            counters,
            current_vote,
        ))
    }

    /// Re-reads counters and the viewer's vote into a settled view.
    pub async fn refresh_view(&self, view: &mut VoteView) -> Result<(), VoteError> {
        if view.is_pending() {
            return Err(VoteError::VoteInFlight {
                target: view.target,
            });
        }
        let target = view.target;
        view.counters = self
            .store
            .read_counters(target)
            .await
            .map_err(|source| VoteError::ReadFailed { target, source })?;
        if let Some(voter) = view.viewer {
            view.current_vote = self.load_vote(&Identity::new(voter), target).await?;
        }
        Ok(())
    }

    /// Casts `requested` on the view's target as `voter`.
    ///
    /// The view is updated optimistically before the store is touched and
    /// stays pending until the store resolves. A failed record write rolls
    /// the view back. A failed counter write leaves the record changed
    /// unless the config asks for compensation. `compensated` is reported only
    /// when both the record and any partially applied counters were reverted.
    pub async fn cast_vote(
        &self,
        voter: Option<&Identity>,
        view: &mut VoteView,
        requested: Polarity,
    ) -> Result<CastOutcome, VoteError> {
        let voter = voter.ok_or(VoteError::Unauthenticated)?;
        let target = view.target;
        if view.is_pending() {
            return Err(VoteError::VoteInFlight { target });
        }
        if view.viewer != Some(voter.id) {
            view.current_vote = self.load_vote(voter, target).await?;
            view.viewer = Some(voter.id);
        }

        let transition = Transition::plan(view.current_vote, requested);
        let before = view.clone();
        view.begin(&transition);

        let committed = self
            .store
            .commit_transition(voter.id, target, &transition)
            .await;
        view.settle();

        match committed {
            Ok(()) => {
                debug!(
                    %target,
                    voter = %voter.id,
                    kind = ?transition.kind(),
                    from = ?transition.from,
                    to = ?transition.to,
                    score = view.score(),
                    "vote applied"
                );
                Ok(CastOutcome {
                    transition,
                    counters: view.counters,
                })
            }
            Err(CommitError::Record(source)) => {
                *view = before;
                warn!(%target, voter = %voter.id, error = %source, "vote write failed");
                Err(VoteError::VoteWriteFailed { target, source })
            }
            Err(CommitError::Counter {
                removed,
                source: CounterWriteError { applied, source },
            }) => {
                let undo = match self.config.counter_failure {
                    CounterFailurePolicy::AcceptDrift => Undo::default(),
                    CounterFailurePolicy::Compensate => {
                        self.compensate(voter, &transition, removed, applied, target)
                            .await
                    }
                };
                if undo.record {
                    *view = before;
                }
                let compensated = undo.record && undo.counters;
                error!(
                    %target,
                    voter = %voter.id,
                    kind = ?transition.kind(),
                    ?applied,
                    compensated,
                    error = %source,
                    "counter update failed after vote write"
                );
                Err(VoteError::CounterUpdateFailed {
                    target,
                    voter: voter.id,
                    compensated,
                    source,
                })
            }
        }
    }

    /// Reverts the record write, then any part of the counter delta that
    /// landed. Counters are only touched once the record is back.
    async fn compensate(
        &self,
        voter: &Identity,
        transition: &Transition,
        removed: Option<VoteRecord>,
        applied: CounterDelta,
        target: TargetId,
    ) -> Undo {
        let reverted = match (transition.inverse, removed) {
            (RecordOp::Insert(_), Some(record)) => self.store.insert_vote(record).await,
            (inverse, _) => self
                .store
                .apply_record_op(voter.id, target, inverse)
                .await
                .map(|_| ()),
        };
        if let Err(err) = reverted {
            error!(%target, voter = %voter.id, error = %err, "compensating vote write failed");
            return Undo::default();
        }
        if applied.is_zero() {
            return Undo {
                record: true,
                counters: true,
            };
        }
        match self.store.adjust_counters(target, applied.negated()).await {
            Ok(()) => Undo {
                record: true,
                counters: true,
            },
            Err(err) => {
                error!(
                    %target,
                    voter = %voter.id,
                    ?applied,
                    error = %err,
                    "compensating counter write failed"
                );
                Undo {
                    record: true,
                    counters: false,
                }
            }
        }
    }

    async fn load_vote(
        &self,
        voter: &Identity,
        target: TargetId,
    ) -> Result<Option<Polarity>, VoteError> {
        self.store
            .find_vote(voter.id, target)
            .await
            .map(|record| record.map(|r| r.polarity))
            .map_err(|source: StoreError| VoteError::ReadFailed { target, source })
    }
}
