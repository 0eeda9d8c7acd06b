use std::collections::VecDeque;

use log::{error, trace};

use crate::error::{Inconsistency, MatchError};
use crate::transition::online::state::{SettledState, TimeStep};

/// The sliding window of time steps held by the online decoder.
///
/// Every state outside the newest step is the predecessor of at least one
/// state in the step after it (its vote count). A state losing its last
/// vote can no longer lie on any decoded path and is pruned, which may in
/// turn remove the last vote of its own predecessor.
///
/// States are settled (emitted) oldest first, so the settled states always
/// form a prefix of the steps pushed so far.
#[derive(Clone, Debug, Default)]
pub struct SequenceMemory {
    steps: VecDeque<TimeStep>,
    /// Steps numbered below this are settled.
    frontier: u64,
}

impl SequenceMemory {
    pub fn new() -> Self {
        SequenceMemory::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = &TimeStep> {
        self.steps.iter()
    }

    pub fn step(&self, index: usize) -> Option<&TimeStep> {
        self.steps.get(index)
    }

    pub fn first(&self) -> Option<&TimeStep> {
        self.steps.front()
    }

    pub fn last(&self) -> Option<&TimeStep> {
        self.steps.back()
    }

    /// Whether the step numbered `step` has been settled.
    pub fn is_settled(&self, step: u64) -> bool {
        step < self.frontier
    }

    /// Time span between the oldest and the newest step.
    pub fn span(&self) -> f64 {
        match (self.steps.front(), self.steps.back()) {
            (Some(first), Some(last)) => last.time() - first.time(),
            _ => 0.0,
        }
    }

    /// Appends the newest step.
    ///
    /// Each predecessor named by the step must be a live state of the
    /// current newest step. Its vote is counted, then every state of the
    /// current newest step left without a vote is pruned.
    ///
    /// A step without any predecessor starts a new chain. The window is
    /// flushed first, so the old chain is settled rather than pruned away;
    /// the flushed states are returned.
    pub fn expand(&mut self, step: TimeStep) -> Result<Vec<SettledState>, MatchError> {
        let Some(last) = self.steps.back() else {
            self.steps.push_back(step);
            return Ok(vec![]);
        };

        if step.time() < last.time() || step.number <= last.number {
            return Err(self.inconsistent(Inconsistency::TimeOrder(step.number)));
        }

        let predecessors = step
            .live()
            .filter_map(|(_, state)| state.predecessor)
            .collect::<Vec<_>>();

        if predecessors.is_empty() {
            trace!("Step {} starts a new chain, flushing the window", step.number);
            let flushed = self.flush()?;
            self.steps.push_back(step);
            return Ok(flushed);
        }

        for predecessor in &predecessors {
            if predecessor.step != last.number || last.state(predecessor.slot).is_none() {
                return Err(self.inconsistent(Inconsistency::DanglingPredecessor {
                    step: predecessor.step,
                    slot: predecessor.slot,
                }));
            }
        }

        let newest = self.steps.len() - 1;
        for predecessor in &predecessors {
            if let Some(state) = self.steps[newest].state_mut(predecessor.slot) {
                state.votes += 1;
            }
        }

        let orphans = self.steps[newest]
            .live()
            .filter(|(_, state)| state.votes == 0)
            .map(|(slot, _)| slot)
            .collect::<Vec<_>>();

        for slot in orphans {
            self.remove(newest, slot);
        }

        self.steps.push_back(step);
        Ok(vec![])
    }

    /// Prunes the state at `slot` of step `index`, cascading backwards
    /// through predecessors left without votes.
    fn remove(&mut self, mut index: usize, mut slot: usize) {
        loop {
            let Some(state) = self.steps[index].states.get_mut(slot).and_then(Option::take) else {
                return;
            };

            let Some(predecessor) = state.predecessor else {
                return;
            };

            let Some(previous) = index.checked_sub(1) else {
                return;
            };

            let Some(parent) = self.steps[previous].state_mut(predecessor.slot) else {
                return;
            };

            parent.votes = parent.votes.saturating_sub(1);
            if parent.votes > 0 {
                return;
            }

            index = previous;
            slot = predecessor.slot;
        }
    }

    /// Settles the most likely chain ending at step `index`, from its best
    /// filtered state back to the first unsettled step.
    pub fn reverse(&mut self, index: usize) -> Result<Vec<SettledState>, MatchError> {
        let Some(from) = self.steps.get(index) else {
            return Ok(vec![]);
        };

        let mut settled = Vec::new();
        let mut cursor = from.best().map(|(slot, _)| slot);

        for step in self.steps.range(..=index).rev() {
            if step.number < self.frontier {
                break;
            }

            // A chain which ends before the first step resumes from the
            // most likely state of the step it broke at.
            let slot = match cursor {
                Some(slot) => slot,
                None => match step.best() {
                    Some((slot, _)) => slot,
                    None => break,
                },
            };

            let Some(state) = step.state(slot) else {
                return Err(self.inconsistent(Inconsistency::PrunedState {
                    step: step.number,
                    slot,
                }));
            };

            settled.push(SettledState::from_step(step, state));

            cursor = match state.predecessor {
                Some(predecessor) if predecessor.step + 1 == step.number => Some(predecessor.slot),
                Some(predecessor) => {
                    return Err(self.inconsistent(Inconsistency::DanglingPredecessor {
                        step: predecessor.step,
                        slot: predecessor.slot,
                    }));
                }
                None => None,
            };
        }

        if let Some(last) = settled.first() {
            self.frontier = self.frontier.max(last.step + 1);
        }

        settled.reverse();
        Ok(settled)
    }

    /// Drops the oldest step from the window. Unless already settled, its
    /// state at `slot` is settled, or its best filtered state without one.
    pub fn evict_first(&mut self, slot: Option<usize>) -> Option<SettledState> {
        let first = self.steps.pop_front()?;

        let chosen = match slot {
            Some(slot) => first.state(slot),
            None => first.best().map(|(_, state)| state),
        };

        let settled = chosen
            .filter(|_| first.number >= self.frontier)
            .map(|state| SettledState::from_step(&first, state));

        self.frontier = self.frontier.max(first.number + 1);
        self.detach();
        settled
    }

    /// Drops the oldest steps until only `keep` remain. Dropped steps
    /// must have been settled already.
    pub fn truncate_front(&mut self, keep: usize) {
        let mut dropped = false;
        while self.steps.len() > keep {
            if let Some(step) = self.steps.pop_front() {
                self.frontier = self.frontier.max(step.number + 1);
                dropped = true;
            }
        }

        if dropped {
            self.detach();
        }
    }

    /// Takes the newest step out of the window. The step before it
    /// becomes the newest, so its votes are cleared.
    pub fn split_last(&mut self) -> Option<TimeStep> {
        let last = self.steps.pop_back()?;
        if let Some(previous) = self.steps.back_mut() {
            for state in previous.states.iter_mut().flatten() {
                state.votes = 0;
            }
        }
        Some(last)
    }

    /// Settles a step taken out of an emptied window on its best filtered state.
    pub fn settle_alone(&mut self, step: TimeStep) -> Option<SettledState> {
        if self.is_settled(step.number) {
            return None;
        }

        self.frontier = self.frontier.max(step.number + 1);
        step.best().map(|(_, state)| SettledState::from_step(&step, state))
    }

    /// Settles everything left and empties the window.
    pub fn flush(&mut self) -> Result<Vec<SettledState>, MatchError> {
        if self.steps.is_empty() {
            return Ok(vec![]);
        }

        let settled = self.reverse(self.steps.len() - 1)?;
        if let Some(last) = self.steps.back() {
            self.frontier = self.frontier.max(last.number + 1);
        }
        self.steps.clear();
        Ok(settled)
    }

    /// The oldest step has no window predecessor, its states start the chains.
    fn detach(&mut self) {
        if let Some(first) = self.steps.front_mut() {
            for state in first.states.iter_mut().flatten() {
                state.predecessor = None;
            }
        }
    }

    fn inconsistent(&self, inconsistency: Inconsistency) -> MatchError {
        error!("Sequence memory of {} steps is inconsistent: {inconsistency}", self.steps.len());
        inconsistency.into()
    }
}
