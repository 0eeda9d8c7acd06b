use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error, info, warn};
use measure_time::debug_time;

use crate::config::MatchConfig;
use crate::error::{Inconsistency, MatchError};
use crate::network::{DistanceFunction, MapView};
use crate::transition::candidate::{min_distance, nearest};
use crate::transition::offline::lattice::Lattice;
use crate::transition::{
    BreakKind, Candidate, CandidateGenerator, MatchResult, ProbabilityModel, ResultAssembler,
    SequenceState, Trajectory, TransitionSolver, UnmatchedTrajectory,
};

/// A partially merged sequence of one rank.
#[derive(Clone, Debug, Default)]
struct Accumulator {
    states: Vec<SequenceState>,
    /// `None` until the first run is merged.
    log_probability: Option<f64>,
}

/// Matches whole trajectories at once with a rank-K Viterbi lattice.
///
/// Runs of connected observations are decoded independently. A run ends
/// at the end of the trajectory, at a time gap longer than
/// `max_time_gap`, or when connectivity is lost and never regained.
/// Observations between runs become breaks, which are snapped to their
/// nearest candidate or left unmatched.
///
/// ```rust
/// use geo::Point;
/// use roadmatch::config::MatchConfig;
/// use roadmatch::network::{Planar, RoadNetwork};
/// use roadmatch::transition::{Observation, OfflineDecoder, Trajectory};
///
/// let mut builder = RoadNetwork::builder(Planar);
/// builder.add_node(1, Point::new(0.0, 0.0))?;
/// builder.add_node(2, Point::new(1000.0, 0.0))?;
/// builder.add_road("east", [1, 2])?;
/// let network = builder.build()?;
///
/// let trajectory = Trajectory::new(
///     "trip",
///     (0..10)
///         .map(|i| Observation::new(i as f64, Point::new(10.0 + 12.0 * i as f64, 2.0)))
///         .collect(),
/// );
///
/// let config = MatchConfig::default();
/// let result = OfflineDecoder::new(&network, &config).decode(&trajectory)?;
///
/// let best = result.best().expect("one rank");
/// assert_eq!(best.roads(), vec!["east".into()]);
/// # Ok::<(), roadmatch::Error>(())
/// ```
pub struct OfflineDecoder<'a, M: MapView> {
    map: &'a M,
    config: MatchConfig,
    model: ProbabilityModel,
    generator: CandidateGenerator<'a, M>,
    solver: TransitionSolver<'a, M>,
}

impl<'a, M: MapView> OfflineDecoder<'a, M> {
    pub fn new(map: &'a M, config: &MatchConfig) -> Self {
        OfflineDecoder {
            map,
            config: config.clone(),
            model: ProbabilityModel::from_config(config),
            generator: CandidateGenerator::new(map, config),
            solver: TransitionSolver::new(map, config),
        }
    }

    pub fn decode(&self, trajectory: &Trajectory) -> Result<MatchResult, MatchError> {
        debug_time!("decoded trajectory {}", trajectory.id);

        let observations = &trajectory.observations;
        let n = observations.len();
        if n == 0 {
            return Err(MatchError::NoPointsProvided);
        }

        validate_times(trajectory)?;

        let candidates = {
            debug_time!("generated candidates of {} observations", n);
            observations
                .iter()
                .map(|observation| self.generator.generate(observation))
                .collect::<Vec<_>>()
        };

        let rank_length = self.config.rank_length.max(1);
        let mut merged = vec![Accumulator::default(); rank_length];
        let mut breaks: BTreeMap<usize, BreakKind> = BTreeMap::new();
        let mut lattice = Lattice::new(rank_length);

        // The last observation successfully added to the lattice.
        let mut previous: Option<usize> = None;
        // The last good observation before the current loss of connectivity.
        let mut before_break: Option<usize> = None;

        let mut i = 0;
        while i < n {
            if candidates[i].is_empty() {
                debug!("Observation {i} of {} has no candidate", trajectory.id);
                breaks.insert(i, BreakKind::NoCandidate);
            } else if let Some(prev) = previous {
                let time_diff = observations[i].time - observations[prev].time;

                if time_diff > self.config.max_time_gap {
                    debug!("Time gap of {time_diff}s before observation {i}, closing the run");

                    if let Some(last_good) = before_break.take() {
                        self.merge(&mut merged, &lattice, trajectory, &breaks, last_good + 1, &candidates)?;
                        i = last_good + 1;
                    } else {
                        self.merge(&mut merged, &lattice, trajectory, &breaks, i, &candidates)?;
                    }

                    lattice.clear();
                    previous = None;
                    continue;
                }

                let Some(last) = lattice.last() else {
                    return Err(Inconsistency::Misaligned(prev).into());
                };

                let sources = last
                    .candidates
                    .iter()
                    .map(|candidate| &candidate.matched)
                    .collect::<Vec<_>>();

                let transitions = self.solver.solve(
                    &observations[prev],
                    &sources,
                    &observations[i],
                    &candidates[i],
                )?;

                if lattice.advance(i, candidates[i].clone(), transitions) {
                    before_break = None;
                    breaks.remove(&i);
                    previous = Some(i);
                } else {
                    debug!("Observation {i} of {} is unreachable", trajectory.id);

                    if before_break.is_none() {
                        let mut last_good = i - 1;
                        while breaks
                            .get(&last_good)
                            .is_some_and(|kind| *kind != BreakKind::Restart)
                        {
                            let Some(earlier) = last_good.checked_sub(1) else {
                                break;
                            };
                            last_good = earlier;
                        }

                        if last_good < merged[0].states.len() {
                            let inconsistency = Inconsistency::BreakInsideResult {
                                index: last_good,
                                merged: merged[0].states.len(),
                            };
                            error!("{inconsistency}");
                            return Err(inconsistency.into());
                        }

                        before_break = Some(last_good);
                    }

                    breaks.insert(i, BreakKind::NoConnectivity);
                }
            } else {
                lattice.start(i, candidates[i].clone());
                if let Some(kind) = breaks.get_mut(&i) {
                    *kind = BreakKind::Restart;
                }
                previous = Some(i);
            }

            if i == n - 1 {
                if let Some(last_good) = before_break.take() {
                    // Connectivity never returned, restart just after the last good observation.
                    self.merge(&mut merged, &lattice, trajectory, &breaks, last_good + 1, &candidates)?;
                    lattice.clear();
                    previous = None;
                    i = last_good + 1;
                    continue;
                }

                self.merge(&mut merged, &lattice, trajectory, &breaks, n, &candidates)?;
            }

            i += 1;
        }

        let unmatched = if breaks.is_empty() {
            vec![]
        } else {
            self.unmatched_trajectories(trajectory, &breaks, &candidates, &merged[0])
        };

        if !breaks.is_empty() {
            info!(
                "Trajectory {} matched with {} breaks, {} unmatched spans",
                trajectory.id,
                breaks.len(),
                unmatched.len()
            );
        }

        let sequences = merged
            .into_iter()
            .map(|accumulator| (accumulator.states, accumulator.log_probability))
            .collect();

        Ok(ResultAssembler::new(n).assemble(&trajectory.id, sequences, breaks, unmatched))
    }

    /// Appends the decoded run, and every break before `destination`,
    /// onto each rank's accumulator.
    fn merge(
        &self,
        merged: &mut [Accumulator],
        lattice: &Lattice,
        trajectory: &Trajectory,
        breaks: &BTreeMap<usize, BreakKind>,
        destination: usize,
        candidates: &[Vec<Candidate>],
    ) -> Result<(), MatchError> {
        let runs = lattice.ranked();
        if runs.is_empty() {
            warn!("Run of {} ending at {destination} has no decoded sequence", trajectory.id);
        }

        for (rank, accumulator) in merged.iter_mut().enumerate() {
            // Ranks beyond the decoded ones repeat the last decoded sequence.
            let run = runs.get(rank).or(runs.last());
            let mut decoded = run.map(|(states, _)| states.iter()).into_iter().flatten();

            let start = accumulator.states.len();
            let mut unmatched_log = 0.0;

            for k in start..destination {
                match breaks.get(&k) {
                    Some(kind @ (BreakKind::NoCandidate | BreakKind::NoConnectivity)) => {
                        let state = match (kind, nearest(&candidates[k])) {
                            (BreakKind::NoConnectivity, Some(candidate)) => {
                                SequenceState::snapped(k, candidate.matched.clone())
                            }
                            _ => SequenceState::unmatched(k),
                        };

                        accumulator.states.push(state);
                        unmatched_log += self
                            .model
                            .emission_log_probability(self.config.candidate_range);

                        if k != 0 {
                            unmatched_log += self.max_transition(trajectory, k)?;
                        }
                    }
                    _ => {
                        let state = decoded
                            .next()
                            .filter(|state| state.observation == k)
                            .ok_or(Inconsistency::Misaligned(k))
                            .inspect_err(|e| error!("{e}"))?;

                        accumulator.states.push(state.clone());
                    }
                }
            }

            let current = run.map_or(0.0, |(_, log)| *log);
            accumulator.log_probability = match accumulator.log_probability {
                _ if current == f64::NEG_INFINITY => Some(f64::NEG_INFINITY),
                Some(f64::NEG_INFINITY) => Some(f64::NEG_INFINITY),
                None => Some(current + unmatched_log),
                Some(prior) => {
                    let joint = if start > 0 {
                        self.max_transition(trajectory, start)?
                    } else {
                        0.0
                    };
                    Some(prior + current + unmatched_log + joint)
                }
            };
        }

        Ok(())
    }

    /// The max transition log-probability between observations `k - 1` and `k`.
    fn max_transition(&self, trajectory: &Trajectory, k: usize) -> Result<f64, MatchError> {
        let (before, after) = (&trajectory.observations[k - 1], &trajectory.observations[k]);
        let linear = self.map.metric().distance(before.position, after.position);

        self.model
            .max_transition_log_probability(linear, after.time - before.time)
    }

    /// Grows every break outwards over neighbours lying further than
    /// `gap_extension_dist` from all of their candidates.
    fn extend_breaks(
        &self,
        breaks: &BTreeMap<usize, BreakKind>,
        candidates: &[Vec<Candidate>],
    ) -> BTreeSet<usize> {
        let n = candidates.len();
        let gap = self.config.gap_extension_dist;
        let far = |index: usize| min_distance(&candidates[index]) > gap;

        let mut extended = BTreeSet::new();
        let mut last_unmatched = 0;

        for &i in breaks.keys() {
            let mut has_neighbour = false;

            let mut p = 1;
            while i > last_unmatched + p {
                if far(i - p) {
                    extended.insert(i - p);
                } else {
                    if p != 1 {
                        has_neighbour = true;
                    }
                    break;
                }
                p += 1;
            }

            let mut p = 1;
            while i + p < n {
                if far(i + p) {
                    extended.insert(i + p);
                    has_neighbour = true;
                } else {
                    if p == 1 && !has_neighbour {
                        break;
                    }
                    extended.insert(i);
                    last_unmatched = i + p - 1;
                    has_neighbour = false;
                    break;
                }
                p += 1;
            }

            if has_neighbour {
                extended.insert(i);
                last_unmatched = i;
            }
        }

        extended
    }

    /// Contiguous spans of extended breaks, excluding those touching either
    /// end of the trajectory, bounded by the best rank's matched roads.
    fn unmatched_trajectories(
        &self,
        trajectory: &Trajectory,
        breaks: &BTreeMap<usize, BreakKind>,
        candidates: &[Vec<Candidate>],
        best: &Accumulator,
    ) -> Vec<UnmatchedTrajectory> {
        let n = trajectory.observations.len();
        let extended = self.extend_breaks(breaks, candidates);

        let mut spans: Vec<(usize, usize)> = Vec::new();
        for index in extended {
            match spans.last_mut() {
                Some((_, end)) if *end + 1 == index => *end = index,
                _ => spans.push((index, index)),
            }
        }

        let road_at = |index: usize| {
            best.states
                .get(index)
                .and_then(|state| state.matched.as_ref())
                .map(|matched| matched.road.clone())
        };

        let mut unmatched = Vec::new();
        for (start, end) in spans {
            if start == 0 || end == n - 1 || start == end {
                continue;
            }

            let (Some(preceding), Some(succeeding)) = (road_at(start - 1), road_at(end + 1)) else {
                continue;
            };

            unmatched.push(UnmatchedTrajectory {
                id: format!("{}U{}", trajectory.id, unmatched.len()),
                start,
                end,
                observations: trajectory.observations[start..=end].to_vec(),
                preceding,
                succeeding,
            });
        }

        unmatched
    }
}

/// Observation times must strictly increase.
pub(crate) fn validate_times(trajectory: &Trajectory) -> Result<(), MatchError> {
    for (index, pair) in trajectory.observations.windows(2).enumerate() {
        let delta = pair[1].time - pair[0].time;
        if delta <= 0.0 || delta.is_nan() {
            return Err(MatchError::NonIncreasingTime {
                index: index + 1,
                delta,
            });
        }
    }

    Ok(())
}
