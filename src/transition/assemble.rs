use std::collections::BTreeMap;

use geo::Point;

use crate::network::{PointMatch, RoadId};
use crate::transition::{BreakKind, MatchResult, RankedMatch, RoadPath, Route, UnmatchedTrajectory};

/// How a decoded observation was reached.
#[derive(Clone, Debug, PartialEq)]
pub enum StateKind {
    /// The first match of a run, with no incoming route.
    Origin,
    /// Reached from the previous match along a road path.
    Routed(RoadPath),
    /// A break, snapped to its nearest candidate.
    Snapped,
    /// A break without any candidate.
    Unmatched,
}

/// The decoded state of a single observation within a sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceState {
    pub observation: usize,
    pub matched: Option<PointMatch>,
    pub kind: StateKind,
}

impl SequenceState {
    pub fn unmatched(observation: usize) -> Self {
        SequenceState {
            observation,
            matched: None,
            kind: StateKind::Unmatched,
        }
    }

    pub fn snapped(observation: usize, matched: PointMatch) -> Self {
        SequenceState {
            observation,
            matched: Some(matched),
            kind: StateKind::Snapped,
        }
    }

    #[inline]
    pub fn point(&self) -> Option<Point> {
        self.matched.as_ref().map(|matched| matched.point)
    }
}

/// Turns decoded sequences into a [`MatchResult`].
pub struct ResultAssembler {
    trajectory_len: usize,
}

impl ResultAssembler {
    pub fn new(trajectory_len: usize) -> Self {
        ResultAssembler { trajectory_len }
    }

    pub fn assemble(
        &self,
        trajectory: &str,
        sequences: Vec<(Vec<SequenceState>, Option<f64>)>,
        breaks: BTreeMap<usize, BreakKind>,
        unmatched: Vec<UnmatchedTrajectory>,
    ) -> MatchResult {
        let ranks = sequences
            .into_iter()
            .map(|(states, log_probability)| self.rank(states, log_probability))
            .collect();

        MatchResult {
            trajectory: trajectory.to_string(),
            ranks,
            breaks,
            unmatched,
        }
    }

    /// Builds a single ranked match. An absent log-probability (an empty
    /// sequence) yields probability zero.
    pub fn rank(&self, states: Vec<SequenceState>, log_probability: Option<f64>) -> RankedMatch {
        let mut breakpoints = vec![false; states.len()];
        let mut routes = Vec::with_capacity(states.len());
        let mut points = Vec::with_capacity(states.len());
        let mut previous_end: Option<Point> = None;

        for (j, state) in states.into_iter().enumerate() {
            let at = state.point();

            match state.kind {
                StateKind::Routed(path) => {
                    if previous_end.is_some_and(|end| end != path.from.point) {
                        breakpoints[j] = true;
                    }

                    previous_end = Some(path.to.point);
                    routes.push(Route {
                        start: Some(path.from.point),
                        end: Some(path.to.point),
                        roads: collapse(&path),
                    });
                }
                StateKind::Origin if j == 0 => {
                    let roads = state
                        .matched
                        .as_ref()
                        .map(|matched| vec![matched.road.clone()])
                        .unwrap_or_default();

                    routes.push(Route {
                        start: at,
                        end: at,
                        roads,
                    });
                }
                StateKind::Unmatched if j == 0 => routes.push(Route::empty(at)),
                StateKind::Origin | StateKind::Snapped | StateKind::Unmatched => {
                    breakpoints[j] = true;
                    routes.push(Route::empty(at));
                }
            }

            points.push(state.matched);
        }

        let probability = match log_probability {
            Some(log) if !points.is_empty() && self.trajectory_len > 0 => {
                (log / self.trajectory_len as f64).exp()
            }
            _ => 0.0,
        };

        RankedMatch {
            points,
            routes,
            log_probability: log_probability.unwrap_or(f64::NEG_INFINITY),
            probability,
            breakpoints,
        }
    }
}

/// The roads of a path with the endpoint roads attached and
/// consecutive duplicates removed.
pub fn collapse(path: &RoadPath) -> Vec<RoadId> {
    let (from, to) = (&path.from.road, &path.to.road);

    if path.roads.is_empty() {
        return if from == to {
            vec![from.clone()]
        } else {
            vec![from.clone(), to.clone()]
        };
    }

    let mut roads: Vec<RoadId> = Vec::with_capacity(path.roads.len() + 2);
    if path.roads.first() != Some(from) {
        roads.push(from.clone());
    }

    for road in &path.roads {
        if roads.last() != Some(road) {
            roads.push(road.clone());
        }
    }

    if roads.last() != Some(to) {
        roads.push(to.clone());
    }

    roads
}
