use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::network::{heading_difference, DistanceFunction, MapView, PointMatch, Reachable, RoadId};
use crate::transition::{Candidate, Observation, ProbabilityModel};

/// Turn cost of a near right-angle turn (45° to 135°).
const TURN_COST: f64 = 1.0;
/// Turn cost of a sharp turn (135° to 180°).
const SHARP_TURN_COST: f64 = 2.0;
/// Turn cost of a full reversal.
const REVERSAL_COST: f64 = 10.0;

/// The road travelled between two consecutive point matches.
#[derive(Clone, Debug, PartialEq)]
pub struct RoadPath {
    pub from: PointMatch,
    pub to: PointMatch,
    /// Roads passed through, in order, without consecutive repeats.
    pub roads: Vec<RoadId>,
}

/// A scored transition between two candidates of consecutive observations.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub path: RoadPath,
    /// Route length including any penalties.
    pub route_length: f64,
    pub log_probability: f64,
}

/// Computes transitions between the candidates of two observations,
/// shared by the offline and online decoders.
pub struct TransitionSolver<'a, M: MapView> {
    map: &'a M,
    model: ProbabilityModel,
    u_turn_penalty: f64,
    turn_weight: f64,
}

impl<'a, M: MapView> TransitionSolver<'a, M> {
    pub fn new(map: &'a M, config: &MatchConfig) -> Self {
        TransitionSolver {
            map,
            model: ProbabilityModel::from_config(config),
            u_turn_penalty: config.u_turn_penalty,
            turn_weight: config.turn_weight,
        }
    }

    /// The transitions from every source to every target, indexed as
    /// `[source][target]`. Unreachable pairs are `None`.
    pub fn solve(
        &self,
        previous: &Observation,
        sources: &[&PointMatch],
        current: &Observation,
        targets: &[Candidate],
    ) -> Result<Vec<Vec<Option<Transition>>>, MatchError> {
        let time_diff = current.time - previous.time;
        let linear = self
            .map
            .metric()
            .distance(previous.position, current.position);

        let bound = ProbabilityModel::max_route_distance(linear, time_diff);
        let destinations = targets
            .iter()
            .map(|candidate| candidate.matched.clone())
            .collect::<Vec<_>>();

        sources
            .iter()
            .map(|source| {
                let reached = self.map.shortest_paths(source, &destinations, bound);

                reached
                    .into_iter()
                    .zip(&destinations)
                    .map(|(reach, target)| {
                        if !reach.is_reachable() {
                            return Ok(None);
                        }

                        let route_length = self.route_length(source, &reach);
                        let log_probability =
                            self.model
                                .transition_log_probability(route_length, linear, time_diff)?;

                        if log_probability == f64::NEG_INFINITY {
                            return Ok(None);
                        }

                        Ok(Some(Transition {
                            path: RoadPath {
                                from: (*source).clone(),
                                to: target.clone(),
                                roads: reach.path,
                            },
                            route_length,
                            log_probability,
                        }))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    /// The route length with the U-turn and turn penalties applied.
    fn route_length(&self, from: &PointMatch, reach: &Reachable) -> f64 {
        let mut length = reach.distance;

        let reverse = from.road.reverse();
        if reach.path.contains(&reverse) {
            length += self.u_turn_penalty;
        }

        if self.turn_weight > 0.0 {
            length += self.turn_weight * self.turn_cost(&reach.path);
        }

        length
    }

    /// Sums the cost of every change of bearing between consecutive roads.
    pub fn turn_cost(&self, roads: &[RoadId]) -> f64 {
        roads
            .windows(2)
            .filter_map(|pair| {
                let (_, leaving) = self.map.road_bearings(&pair[0])?;
                let (entering, _) = self.map.road_bearings(&pair[1])?;
                Some(turn_cost(heading_difference(leaving, entering)))
            })
            .sum()
    }
}

/// Cost of a single change of bearing, `difference` in `[0, 180]`.
#[inline]
pub fn turn_cost(difference: f64) -> f64 {
    const EPSILON: f64 = 1e-9;

    if difference >= 180.0 - EPSILON {
        REVERSAL_COST
    } else if difference >= 135.0 {
        SHARP_TURN_COST
    } else if difference >= 45.0 {
        TURN_COST
    } else {
        0.0
    }
}
