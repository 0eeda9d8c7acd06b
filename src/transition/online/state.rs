use crate::transition::{Candidate, Observation, RoadPath};

/// Address of a decoded state: the absolute step number and the slot
/// within that step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateRef {
    pub step: u64,
    pub slot: usize,
}

/// A candidate of one observation, decorated by the forward filter.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedState {
    pub candidate: Candidate,
    /// Emission probability (not logarithmic).
    pub emission: f64,
    /// Filtered probability, normalised over the states of its step.
    pub filtered: f64,
    /// Log-probability of the transition from the predecessor, zero without one.
    pub transition_log: f64,
    pub predecessor: Option<StateRef>,
    /// The road path from the predecessor. Kept after the predecessor
    /// itself has left the window.
    pub transition: Option<RoadPath>,
    /// Number of states in the following step naming this one as predecessor.
    pub(crate) votes: usize,
}

impl DecodedState {
    /// A state opening a new chain, with no predecessor.
    pub fn seed(candidate: Candidate, emission: f64, filtered: f64) -> Self {
        DecodedState {
            candidate,
            emission,
            filtered,
            transition_log: 0.0,
            predecessor: None,
            transition: None,
            votes: 0,
        }
    }

    #[inline]
    pub fn votes(&self) -> usize {
        self.votes
    }
}

/// All states decoded for one observation.
///
/// Pruned states leave a tombstone so that slot numbers stay stable.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeStep {
    /// Absolute step number, increasing by one per step pushed.
    pub number: u64,
    /// Index of the observation within the trajectory.
    pub observation_index: usize,
    pub observation: Observation,
    pub(crate) states: Vec<Option<DecodedState>>,
}

impl TimeStep {
    pub fn new(
        number: u64,
        observation_index: usize,
        observation: Observation,
        states: Vec<DecodedState>,
    ) -> Self {
        TimeStep {
            number,
            observation_index,
            observation,
            states: states.into_iter().map(Some).collect(),
        }
    }

    #[inline]
    pub fn state(&self, slot: usize) -> Option<&DecodedState> {
        self.states.get(slot).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn state_mut(&mut self, slot: usize) -> Option<&mut DecodedState> {
        self.states.get_mut(slot).and_then(Option::as_mut)
    }

    /// The live states with their slots.
    pub fn live(&self) -> impl Iterator<Item = (usize, &DecodedState)> {
        self.states
            .iter()
            .enumerate()
            .filter_map(|(slot, state)| state.as_ref().map(|state| (slot, state)))
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    /// The live state of highest filtered probability, the lowest slot on ties.
    pub fn best(&self) -> Option<(usize, &DecodedState)> {
        self.live().fold(None, |best, (slot, state)| match best {
            Some((_, current)) if current.filtered >= state.filtered => best,
            _ => Some((slot, state)),
        })
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.observation.time
    }
}

/// A state the window has committed to, no longer subject to revision.
#[derive(Clone, Debug, PartialEq)]
pub struct SettledState {
    pub step: u64,
    pub observation_index: usize,
    pub observation: Observation,
    pub state: DecodedState,
}

impl SettledState {
    pub(crate) fn from_step(step: &TimeStep, state: &DecodedState) -> Self {
        SettledState {
            step: step.number,
            observation_index: step.observation_index,
            observation: step.observation,
            state: state.clone(),
        }
    }
}
