use geo::Point;
use itertools::Itertools;
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;
use crate::network::{heading_difference, DistanceFunction, MapView, PointMatch, SegmentIx};
use crate::transition::ProbabilityModel;

/// Fractions closer than this to a segment end are considered at the end.
const FRACTION_EPSILON: f64 = 1e-6;

/// A single timestamped GPS fix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Seconds, on any monotonic scale.
    pub time: f64,
    pub position: Point,
    /// Compass heading of travel in degrees, when the device reports one.
    pub heading: Option<f64>,
}

impl Observation {
    pub fn new(time: f64, position: Point) -> Self {
        Observation {
            time,
            position,
            heading: None,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }
}

/// An identified, time ordered sequence of observations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: String,
    pub observations: Vec<Observation>,
}

impl Trajectory {
    pub fn new(id: impl Into<String>, observations: Vec<Observation>) -> Self {
        Trajectory {
            id: id.into(),
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// A possible road position of one observation.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub matched: PointMatch,
    /// Distance between the observation and the matched point.
    pub distance: f64,
    /// Emission log-probability of the observation given this candidate.
    pub emission: f64,
}

/// Produces the candidate set of each observation.
pub struct CandidateGenerator<'a, M: MapView> {
    map: &'a M,
    model: ProbabilityModel,
    range: f64,
    minimize: bool,
}

impl<'a, M: MapView> CandidateGenerator<'a, M> {
    pub fn new(map: &'a M, config: &MatchConfig) -> Self {
        CandidateGenerator {
            map,
            model: ProbabilityModel::from_config(config),
            range: config.candidate_range,
            minimize: config.minimize_candidates,
        }
    }

    /// All road positions strictly within the candidate range of the
    /// observation, nearest first. An empty output is not an error,
    /// the decoders record it as a break.
    pub fn generate(&self, observation: &Observation) -> Vec<Candidate> {
        let mut matches = self.map.query(observation.position, self.range);

        if self.minimize {
            matches = self.minimized(matches);
        }

        matches
            .into_iter()
            .map(|matched| self.candidate(observation, matched))
            .collect()
    }

    /// Scores `matched` as a candidate of `observation`.
    pub fn candidate(&self, observation: &Observation, matched: PointMatch) -> Candidate {
        let distance = self
            .map
            .metric()
            .distance(observation.position, matched.point);

        Candidate {
            emission: self.model.emission_log_probability(distance),
            distance,
            matched,
        }
    }

    /// Replaces fresh candidates which sit behind a predecessor on the
    /// same road by that predecessor's point match.
    ///
    /// A GPS fix drifting backwards along the road by less than the noise
    /// deviation would otherwise force a route around the block. The travel
    /// direction is the previous observation's heading, or the bearing
    /// between the two observations when no heading was reported.
    pub fn with_continuity(
        &self,
        previous: &Observation,
        current: &Observation,
        fresh: Vec<Candidate>,
        predecessors: &[&Candidate],
    ) -> Vec<Candidate> {
        let metric = self.map.metric();
        let heading = match previous.heading {
            Some(heading) => heading,
            None if previous.position != current.position => {
                metric.heading(previous.position, current.position)
            }
            None => return fresh,
        };

        let mut candidates = fresh;
        for predecessor in predecessors {
            let prior = &predecessor.matched;
            let Some(index) = candidates.iter().position(|candidate| {
                candidate.matched.road == prior.road
                    && metric.distance(candidate.matched.point, prior.point) < self.model.sigma()
            }) else {
                continue;
            };

            let line = candidates[index].matched.line;
            let bearing = metric.heading(line.start_point(), line.end_point());
            let difference = heading_difference(bearing, heading);

            let fresh_remaining = metric.distance(candidates[index].matched.point, line.end_point());
            let prior_remaining = metric.distance(prior.point, line.end_point());

            let behind = (difference < 45.0 && fresh_remaining > prior_remaining)
                || (difference >= 135.0 && fresh_remaining < prior_remaining);

            if behind {
                trace!("Holding {} at its previous position", prior.road);
                candidates[index] = self.candidate(current, prior.clone());
            }
        }

        candidates
            .into_iter()
            .sorted_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.matched.segment.cmp(&b.matched.segment))
            })
            .dedup_by(|a, b| a.matched == b.matched)
            .collect()
    }

    /// Removes candidates which are redundant as routes through the area:
    /// a candidate at the very start of a segment whose predecessor segment
    /// also holds a candidate, and a candidate at the very end of a segment
    /// whose successors all hold candidates.
    fn minimized(&self, matches: Vec<PointMatch>) -> Vec<PointMatch> {
        let metric = self.map.metric();
        let fractions = matches
            .iter()
            .map(|matched| (matched.segment, metric.fraction(matched.point, &matched.line)))
            .collect::<FxHashMap<SegmentIx, f64>>();

        let mut misses: FxHashMap<SegmentIx, usize> = FxHashMap::default();
        let mut removes: FxHashSet<SegmentIx> = FxHashSet::default();

        for matched in &matches {
            let missed = misses.entry(matched.segment).or_default();

            for successor in self.map.successors(matched.segment) {
                match fractions.get(&successor) {
                    None => *missed += 1,
                    Some(fraction) if *fraction < FRACTION_EPSILON => {
                        removes.insert(successor);
                        *missed += 1;
                    }
                    Some(_) => {}
                }
            }
        }

        for matched in &matches {
            let at_end = fractions
                .get(&matched.segment)
                .is_some_and(|fraction| *fraction > 1.0 - FRACTION_EPSILON);

            if at_end && misses.get(&matched.segment) == Some(&0) {
                removes.insert(matched.segment);
            }
        }

        matches
            .into_iter()
            .filter(|matched| !removes.contains(&matched.segment))
            .collect()
    }
}

/// The candidate nearest its observation. Ties resolve to the earliest.
pub fn nearest(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// The distance from an observation to its nearest candidate, or
/// infinity when it has none.
pub fn min_distance(candidates: &[Candidate]) -> f64 {
    nearest(candidates).map_or(f64::INFINITY, |candidate| candidate.distance)
}
