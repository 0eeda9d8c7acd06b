use std::collections::BTreeMap;

use log::{debug, trace};
use smallvec::SmallVec;

use crate::config::MatchConfig;
use crate::error::{Inconsistency, MatchError};
use crate::network::MapView;
use crate::transition::online::memory::SequenceMemory;
use crate::transition::online::policy::EvictionPolicy;
use crate::transition::online::state::{DecodedState, SettledState, StateRef, TimeStep};
use crate::transition::{
    BreakKind, Candidate, CandidateGenerator, MatchResult, Observation, ResultAssembler,
    SequenceState, StateKind, Trajectory, TransitionSolver,
};

/// Matches a stream of observations one at a time in bounded memory.
///
/// Each pushed observation runs one step of the forward filter against
/// the newest step of the window. The eviction policy then decides which
/// of the oldest steps to settle; settled states are final and returned
/// from [`OnlineDecoder::push`] as soon as they are known.
///
/// ```rust
/// use geo::Point;
/// use roadmatch::config::{MatchConfig, PolicyKind};
/// use roadmatch::network::{Planar, RoadNetwork};
/// use roadmatch::transition::{Observation, OnlineDecoder};
///
/// let mut builder = RoadNetwork::builder(Planar);
/// builder.add_node(1, Point::new(0.0, 0.0))?;
/// builder.add_node(2, Point::new(1000.0, 0.0))?;
/// builder.add_road("east", [1, 2])?;
/// let network = builder.build()?;
///
/// let config = MatchConfig::default().with_policy(PolicyKind::Goh);
/// let mut decoder = OnlineDecoder::new(&network, &config).with_id("stream");
///
/// for i in 0..10 {
///     let observation = Observation::new(i as f64, Point::new(10.0 + 12.0 * i as f64, 2.0));
///     decoder.push(observation)?;
/// }
///
/// let result = decoder.finish()?;
/// assert_eq!(result.best().expect("one rank").roads(), vec!["east".into()]);
/// # Ok::<(), roadmatch::Error>(())
/// ```
pub struct OnlineDecoder<'a, M: MapView> {
    generator: CandidateGenerator<'a, M>,
    solver: TransitionSolver<'a, M>,
    policy: EvictionPolicy,
    memory: SequenceMemory,
    max_time_gap: f64,

    id: String,
    /// Observations pushed so far.
    count: usize,
    next_step: u64,
    previous_time: Option<f64>,
    /// Settled states not yet handed out by [`OnlineDecoder::drain_settled`].
    settled: Vec<SettledState>,
    drained: usize,
    breaks: BTreeMap<usize, BreakKind>,
}

impl<'a, M: MapView> OnlineDecoder<'a, M> {
    pub fn new(map: &'a M, config: &MatchConfig) -> Self {
        OnlineDecoder {
            generator: CandidateGenerator::new(map, config),
            solver: TransitionSolver::new(map, config),
            policy: EvictionPolicy::from_config(&config.window),
            memory: SequenceMemory::new(),
            max_time_gap: config.max_time_gap,
            id: String::new(),
            count: 0,
            next_step: 0,
            previous_time: None,
            settled: vec![],
            drained: 0,
            breaks: BTreeMap::new(),
        }
    }

    /// Names the decoded stream in the final result.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn memory(&self) -> &SequenceMemory {
        &self.memory
    }

    /// States settled and not yet drained, oldest first.
    pub fn settled(&self) -> &[SettledState] {
        &self.settled
    }

    /// Hands out the states settled so far, releasing them from the
    /// decoder. A stream drained this way ends with [`OnlineDecoder::close`],
    /// as [`OnlineDecoder::finish`] needs every settled state.
    pub fn drain_settled(&mut self) -> Vec<SettledState> {
        self.drained += self.settled.len();
        std::mem::take(&mut self.settled)
    }

    /// Settles the remaining window, returning every settled state not
    /// yet drained.
    pub fn close(mut self) -> Result<Vec<SettledState>, MatchError> {
        let remaining = self.policy.finish(&mut self.memory)?;
        self.settled.extend(remaining);
        Ok(self.settled)
    }

    pub fn breaks(&self) -> &BTreeMap<usize, BreakKind> {
        &self.breaks
    }

    /// Decodes the next observation of the stream, returning the states
    /// this settled.
    pub fn push(&mut self, observation: Observation) -> Result<Vec<SettledState>, MatchError> {
        let index = self.count;

        if let Some(previous) = self.previous_time {
            let delta = observation.time - previous;
            if delta <= 0.0 || delta.is_nan() {
                return Err(MatchError::NonIncreasingTime { index, delta });
            }
        }

        self.count += 1;
        self.previous_time = Some(observation.time);

        let connected = self
            .memory
            .last()
            .filter(|last| observation.time - last.time() <= self.max_time_gap);

        let fresh = self.generator.generate(&observation);
        let candidates = match connected {
            Some(last) if !fresh.is_empty() => {
                let predecessors = last
                    .live()
                    .map(|(_, state)| &state.candidate)
                    .collect::<Vec<_>>();

                self.generator
                    .with_continuity(&last.observation, &observation, fresh, &predecessors)
            }
            _ => fresh,
        };

        if candidates.is_empty() {
            debug!("Observation {index} of {} has no candidate", self.id);
            self.breaks.insert(index, BreakKind::NoCandidate);
            return Ok(vec![]);
        }

        let mut states = match connected {
            Some(last) => self.forward(last, &observation, candidates.clone())?,
            None => {
                if self.memory.last().is_some() {
                    debug!("Time gap before observation {index} of {}, re-seeding", self.id);
                }
                vec![]
            }
        };

        if states.is_empty() {
            if connected.is_some() {
                debug!("Observation {index} of {} is unreachable, re-seeding", self.id);
                self.breaks.insert(index, BreakKind::NoConnectivity);
            }

            states = seed(candidates);
        }

        if states.is_empty() {
            debug!("Observation {index} of {} has no likely candidate", self.id);
            self.breaks.insert(index, BreakKind::NoCandidate);
            return Ok(vec![]);
        }

        let step = TimeStep::new(self.next_step, index, observation, states);
        self.next_step += 1;

        let mut settled = self.memory.expand(step)?;
        settled.extend(self.policy.shrink(&mut self.memory)?);

        if !settled.is_empty() {
            trace!("Settled {} states, window holds {} steps", settled.len(), self.memory.len());
        }

        self.settled.extend(settled.iter().cloned());
        Ok(settled)
    }

    /// One step of the forward filter from the states of `last`.
    ///
    /// Mass is combined in log space, so that transitions far below the
    /// range of `f64` still connect the steps.
    fn forward(
        &self,
        last: &TimeStep,
        observation: &Observation,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<DecodedState>, MatchError> {
        let sources = last.live().collect::<Vec<_>>();
        let matches = sources
            .iter()
            .map(|(_, state)| &state.candidate.matched)
            .collect::<Vec<_>>();

        let mut transitions = self
            .solver
            .solve(&last.observation, &matches, observation, &candidates)?;

        let mut scored = Vec::with_capacity(candidates.len());
        for (target, candidate) in candidates.into_iter().enumerate() {
            let weights = sources
                .iter()
                .enumerate()
                .filter(|(_, (_, state))| state.filtered > 0.0)
                .filter_map(|(source, (_, state))| {
                    let transition = transitions[source][target].as_ref()?;
                    let weight = state.filtered.ln() + transition.log_probability;
                    weight.is_finite().then_some((source, weight))
                })
                .collect::<SmallVec<[(usize, f64); 8]>>();

            // The predecessor contributing the most mass, the lowest slot on ties.
            let best = weights
                .iter()
                .fold(None, |best: Option<(usize, f64)>, &(source, weight)| match best {
                    Some((_, current)) if current >= weight => best,
                    _ => Some((source, weight)),
                });

            let Some((source, peak)) = best else {
                continue;
            };

            let spread = weights
                .iter()
                .map(|(_, weight)| (weight - peak).exp())
                .sum::<f64>();
            let log_filtered = candidate.emission + peak + spread.ln();

            let Some(transition) = transitions[source][target].take() else {
                continue;
            };

            let state = DecodedState {
                emission: candidate.emission.exp(),
                filtered: 0.0,
                transition_log: transition.log_probability,
                predecessor: Some(StateRef {
                    step: last.number,
                    slot: sources[source].0,
                }),
                transition: Some(transition.path),
                votes: 0,
                candidate,
            };

            scored.push((state, log_filtered));
        }

        Ok(normalize(scored))
    }

    /// Settles the remaining window and assembles the result of the stream.
    pub fn finish(mut self) -> Result<MatchResult, MatchError> {
        if self.count == 0 {
            return Err(MatchError::NoPointsProvided);
        }

        if self.drained > 0 {
            return Err(MatchError::SettledDrained(self.drained));
        }

        let remaining = self.policy.finish(&mut self.memory)?;
        self.settled.extend(remaining);

        let mut states: Vec<Option<SequenceState>> = vec![None; self.count];
        let mut log_probability: Option<f64> = None;

        for settled in self.settled {
            let index = settled.observation_index;
            let slot = states
                .get_mut(index)
                .filter(|slot| slot.is_none())
                .ok_or(Inconsistency::Misaligned(index))?;

            let state = settled.state;
            *log_probability.get_or_insert(0.0) += state.candidate.emission + state.transition_log;

            let kind = match state.transition {
                Some(path) => StateKind::Routed(path),
                None => StateKind::Origin,
            };

            *slot = Some(SequenceState {
                observation: index,
                matched: Some(state.candidate.matched),
                kind,
            });
        }

        let states = states
            .into_iter()
            .enumerate()
            .map(|(index, state)| state.unwrap_or_else(|| SequenceState::unmatched(index)))
            .collect();

        Ok(ResultAssembler::new(self.count).assemble(
            &self.id,
            vec![(states, log_probability)],
            self.breaks,
            vec![],
        ))
    }

    /// Decodes a whole trajectory as a stream.
    pub fn decode(mut self, trajectory: &Trajectory) -> Result<MatchResult, MatchError> {
        self.id.clone_from(&trajectory.id);

        for observation in &trajectory.observations {
            self.push(*observation)?;
        }

        self.finish()
    }
}

/// States opening a new chain, weighted by emission alone.
fn seed(candidates: Vec<Candidate>) -> Vec<DecodedState> {
    normalize(
        candidates
            .into_iter()
            .map(|candidate| {
                let log = candidate.emission;
                (DecodedState::seed(candidate, log.exp(), 0.0), log)
            })
            .collect(),
    )
}

/// Turns the unnormalised log filtered probabilities of a step into
/// probabilities summing to one. States whose share rounds to zero are dropped.
fn normalize(scored: Vec<(DecodedState, f64)>) -> Vec<DecodedState> {
    let peak = scored
        .iter()
        .map(|(_, log)| *log)
        .fold(f64::NEG_INFINITY, f64::max);

    if !peak.is_finite() {
        return vec![];
    }

    let total = scored.iter().map(|(_, log)| (log - peak).exp()).sum::<f64>();

    scored
        .into_iter()
        .filter_map(|(mut state, log)| {
            state.filtered = (log - peak).exp() / total;
            (state.filtered > 0.0).then_some(state)
        })
        .collect()
}
