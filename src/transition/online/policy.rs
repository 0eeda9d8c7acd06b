use log::trace;

use crate::config::{PolicyKind, WindowConfig};
use crate::error::{Inconsistency, MatchError};
use crate::transition::online::memory::SequenceMemory;
use crate::transition::online::state::SettledState;

/// Decides when the online decoder commits to the oldest states of its
/// window, trading latency against the chance of a later revision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EvictionPolicy {
    /// Bounds the window by step count and by time span, settling the
    /// oldest step on its best filtered state.
    Fixed {
        max_state_num: Option<usize>,
        max_waiting_time: Option<f64>,
    },
    /// Settles everything up to a step once all hypotheses run through a
    /// single state of it, otherwise bounded like [`EvictionPolicy::Fixed`].
    Goh {
        max_state_num: Option<usize>,
        max_waiting_time: Option<f64>,
    },
    /// Settles the oldest step once the entropy of the probability mass
    /// flowing through its states drops below `gamma` times the window span.
    Eddy { gamma: f64 },
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::from_config(&WindowConfig::default())
    }
}

impl EvictionPolicy {
    pub fn from_config(window: &WindowConfig) -> Self {
        match window.policy {
            PolicyKind::Fixed => EvictionPolicy::Fixed {
                max_state_num: window.max_state_num,
                max_waiting_time: window.max_waiting_time,
            },
            PolicyKind::Goh => EvictionPolicy::Goh {
                max_state_num: window.max_state_num,
                max_waiting_time: window.max_waiting_time,
            },
            PolicyKind::Eddy => EvictionPolicy::Eddy {
                gamma: window.gamma,
            },
        }
    }

    /// Shrinks the window after a step was appended, returning the newly
    /// settled states oldest first.
    pub fn shrink(&self, memory: &mut SequenceMemory) -> Result<Vec<SettledState>, MatchError> {
        match *self {
            EvictionPolicy::Fixed {
                max_state_num,
                max_waiting_time,
            } => Ok(bounded(memory, max_state_num, max_waiting_time)),
            EvictionPolicy::Goh {
                max_state_num,
                max_waiting_time,
            } => converged(memory, max_state_num, max_waiting_time),
            EvictionPolicy::Eddy { gamma } => entropy(memory, gamma),
        }
    }

    /// Settles the remaining window at the end of the stream.
    ///
    /// [`EvictionPolicy::Eddy`] runs its uncertainty check once more over
    /// the window without the newest step, settles the rest of that window,
    /// then settles the newest step on its own best filtered state.
    pub fn finish(&self, memory: &mut SequenceMemory) -> Result<Vec<SettledState>, MatchError> {
        let EvictionPolicy::Eddy { gamma } = *self else {
            let mut settled = self.shrink(memory)?;
            settled.extend(memory.flush()?);
            return Ok(settled);
        };

        let Some(newest) = memory.split_last() else {
            return Ok(vec![]);
        };

        let mut settled = entropy(memory, gamma)?;
        settled.extend(memory.flush()?);
        settled.extend(memory.settle_alone(newest));
        Ok(settled)
    }
}

fn bounded(
    memory: &mut SequenceMemory,
    max_state_num: Option<usize>,
    max_waiting_time: Option<f64>,
) -> Vec<SettledState> {
    let mut settled = Vec::new();

    while memory.len() > 1
        && (max_state_num.is_some_and(|max| memory.len() > max)
            || max_waiting_time.is_some_and(|wait| memory.span() > wait))
    {
        settled.extend(memory.evict_first(None));
    }

    debug_assert!(max_state_num.map_or(true, |max| memory.len() <= max.max(1)));
    settled
}

fn converged(
    memory: &mut SequenceMemory,
    max_state_num: Option<usize>,
    max_waiting_time: Option<f64>,
) -> Result<Vec<SettledState>, MatchError> {
    let len = memory.len();
    let single = len > 1
        && memory
            .step(len - 2)
            .is_some_and(|step| step.live_count() == 1);

    if !single {
        return Ok(bounded(memory, max_state_num, max_waiting_time));
    }

    trace!("Window converged at its second newest step, settling {} steps", len - 1);
    let settled = memory.reverse(len - 2)?;
    memory.truncate_front(2);
    Ok(settled)
}

fn entropy(memory: &mut SequenceMemory, gamma: f64) -> Result<Vec<SettledState>, MatchError> {
    let mut settled = Vec::new();

    while memory.len() > 1 {
        let mass = mass_through_first(memory)?;

        let live = mass.iter().filter(|(_, mass)| mass.is_some()).count();
        if live == 0 {
            break;
        }

        let accuracy = -mass
            .iter()
            .filter_map(|(_, mass)| *mass)
            .filter(|mass| *mass > 0.0)
            .map(|mass| mass * mass.ln())
            .sum::<f64>()
            / live as f64;

        let latency = gamma * memory.span();
        if accuracy > latency {
            break;
        }

        // The state of the oldest step carrying the most mass, the lowest slot on ties.
        let slot = mass
            .iter()
            .filter_map(|(slot, mass)| mass.map(|mass| (*slot, mass)))
            .fold(None, |best: Option<(usize, f64)>, (slot, mass)| match best {
                Some((_, current)) if current >= mass => best,
                _ => Some((slot, mass)),
            })
            .map(|(slot, _)| slot);

        trace!("Window uncertainty {accuracy} within latency cost {latency}, settling its oldest step");
        settled.extend(memory.evict_first(slot));
    }

    Ok(settled)
}

/// Sums the filtered probability of the newest step's states over the
/// oldest step state each one descends from. Slots of pruned states hold
/// `None`.
///
/// A new chain always flushes the window, so every chain reaches the
/// oldest step.
fn mass_through_first(memory: &SequenceMemory) -> Result<Vec<(usize, Option<f64>)>, MatchError> {
    let (Some(first), Some(last)) = (memory.first(), memory.last()) else {
        return Ok(vec![]);
    };

    let mut mass = (0..first.states.len())
        .map(|slot| (slot, first.state(slot).map(|_| 0.0)))
        .collect::<Vec<_>>();

    let newest = memory.len() - 1;

    for (slot, state) in last.live() {
        let (mut index, mut slot, mut current) = (newest, slot, state);

        while index > 0 {
            let Some(predecessor) = current.predecessor else {
                return Err(Inconsistency::Unrooted {
                    step: memory.step(index).map_or(0, |step| step.number),
                    slot,
                }
                .into());
            };

            let parent = memory
                .step(index - 1)
                .and_then(|step| step.state(predecessor.slot))
                .ok_or(Inconsistency::PrunedState {
                    step: predecessor.step,
                    slot: predecessor.slot,
                })?;

            index -= 1;
            slot = predecessor.slot;
            current = parent;
        }

        if let Some((_, Some(total))) = mass.get_mut(slot) {
            *total += state.filtered;
        }
    }

    Ok(mass)
}
