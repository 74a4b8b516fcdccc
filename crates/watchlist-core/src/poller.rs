use tracing::{debug, trace, warn};

use crate::{batch::Batch, registry::PresenceRegistry, types::WatchCommand};

/// One round of pull queries and the answers still expected for it.
#[derive(Debug, Clone)]
pub struct PollCycle {
    id: u64,
    batches: Vec<Batch>,
    outstanding: usize,
    started_ms: u64,
}

impl PollCycle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn started_ms(&self) -> u64 {
        self.started_ms
    }

    /// Consume the oldest unanswered batch (FIFO against issue order).
    fn answer_next(&mut self) -> Option<Batch> {
        if self.outstanding == 0 {
            return None;
        }
        let position = self.batches.len() - self.outstanding;
        self.outstanding -= 1;
        self.batches.get(position).cloned()
    }
}

/// Timer-driven issuer of pull queries, at most one cycle in flight.
#[derive(Debug, Clone)]
pub struct PresencePoller {
    batch_limit: usize,
    stale_cycle_timeout_ms: Option<u64>,
    cycle: Option<PollCycle>,
    next_cycle_id: u64,
}

impl PresencePoller {
    pub fn new(batch_limit: usize, stale_cycle_timeout_ms: Option<u64>) -> Self {
        Self {
            batch_limit: batch_limit.max(1),
            stale_cycle_timeout_ms,
            cycle: None,
            next_cycle_id: 0,
        }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Number of queries of the current cycle still awaiting an answer.
    pub fn outstanding(&self) -> usize {
        self.cycle.as_ref().map_or(0, PollCycle::outstanding)
    }

    pub fn current_cycle(&self) -> Option<&PollCycle> {
        self.cycle.as_ref()
    }

    /// Start a cycle unless one is still outstanding.
    ///
    /// Returns one `POLL` command per batch, in issue order.
    pub fn on_timer_fire(
        &mut self,
        registry: &PresenceRegistry,
        now_ms: u64,
    ) -> Vec<WatchCommand> {
        if let Some(cycle) = &self.cycle {
            if !self.is_stale(cycle, now_ms) {
                trace!(
                    cycle = cycle.id,
                    outstanding = cycle.outstanding,
                    "poll cycle still in flight; skipping tick"
                );
                return Vec::new();
            }
            warn!(
                cycle = cycle.id,
                outstanding = cycle.outstanding,
                age_ms = now_ms.saturating_sub(cycle.started_ms),
                "abandoning stale poll cycle"
            );
            self.cycle = None;
        }

        let batches = registry.batches(self.batch_limit);
        if batches.is_empty() {
            return Vec::new();
        }

        let commands = batches
            .iter()
            .map(|batch| WatchCommand::Poll {
                identities: batch.to_strings(),
            })
            .collect::<Vec<_>>();

        let id = self.next_cycle_id;
        self.next_cycle_id = self.next_cycle_id.wrapping_add(1);
        debug!(cycle = id, queries = batches.len(), "starting poll cycle");
        self.cycle = Some(PollCycle {
            id,
            outstanding: batches.len(),
            batches,
            started_ms: now_ms,
        });

        commands
    }

    /// Match one response to the batch it answers.
    ///
    /// `None` means no query is outstanding and the response is unsolicited.
    pub fn answer_next(&mut self) -> Option<Batch> {
        let cycle = self.cycle.as_mut()?;
        let batch = cycle.answer_next();
        if cycle.outstanding == 0 {
            trace!(cycle = cycle.id, "poll cycle complete");
            self.cycle = None;
        }
        batch
    }

    /// Drop the current cycle without waiting for its answers.
    pub fn abandon(&mut self) {
        if let Some(cycle) = self.cycle.take() {
            debug!(
                cycle = cycle.id,
                outstanding = cycle.outstanding,
                "dropping poll cycle"
            );
        }
    }

    fn is_stale(&self, cycle: &PollCycle, now_ms: u64) -> bool {
        self.stale_cycle_timeout_ms
            .is_some_and(|timeout| now_ms.saturating_sub(cycle.started_ms) >= timeout)
    }
}
