use std::collections::BTreeMap;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::network::{PointMatch, RoadId};
use crate::transition::Observation;

/// Why the chain of matches broke at an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BreakKind {
    /// No road lies within the candidate range.
    NoCandidate = 1,
    /// No candidate is reachable from the previous observation.
    NoConnectivity = 2,
    /// A former break which a new run of matches starts from.
    Restart = 3,
}

/// The roads travelled to reach one observation's match.
///
/// The route of a break carries no roads. Its endpoints are the
/// snapped position, or absent when the observation has no match.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub start: Option<Point>,
    pub end: Option<Point>,
    pub roads: Vec<RoadId>,
}

impl Route {
    pub fn empty(at: Option<Point>) -> Self {
        Route {
            start: at,
            end: at,
            roads: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roads.is_empty()
    }
}

/// One ranked interpretation of a whole trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedMatch {
    /// The match of every observation, `None` where nothing was matched.
    pub points: Vec<Option<PointMatch>>,
    /// The route into every observation's match.
    pub routes: Vec<Route>,
    pub log_probability: f64,
    /// Per-observation geometric mean of the sequence probability.
    pub probability: f64,
    /// Observations at which the sequence restarts somewhere other than
    /// where the previous route ended.
    pub breakpoints: Vec<bool>,
}

impl RankedMatch {
    /// The matched roads of every observation, `None` where unmatched.
    pub fn matched_roads(&self) -> Vec<Option<&RoadId>> {
        self.points
            .iter()
            .map(|point| point.as_ref().map(|point| &point.road))
            .collect()
    }

    /// All routes concatenated, joining a route onto the previous one
    /// where it continues on the same road.
    pub fn roads(&self) -> Vec<RoadId> {
        let mut roads: Vec<RoadId> = Vec::new();

        for route in self.routes.iter().filter(|route| !route.is_empty()) {
            let skip = usize::from(roads.last() == route.roads.first());
            roads.extend(route.roads.iter().skip(skip).cloned());
        }

        roads
    }

    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.iter().filter(|b| **b).count()
    }
}

/// A stretch of observations which could not be matched, bounded by
/// the roads matched immediately before and after it.
#[derive(Clone, Debug, PartialEq)]
pub struct UnmatchedTrajectory {
    pub id: String,
    /// Index of the first unmatched observation.
    pub start: usize,
    /// Index of the last unmatched observation (inclusive).
    pub end: usize,
    pub observations: Vec<Observation>,
    pub preceding: RoadId,
    pub succeeding: RoadId,
}

/// The outcome of matching one trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    pub trajectory: String,
    /// Best first. Never longer than the configured rank length.
    pub ranks: Vec<RankedMatch>,
    pub breaks: BTreeMap<usize, BreakKind>,
    pub unmatched: Vec<UnmatchedTrajectory>,
}

impl MatchResult {
    pub fn best(&self) -> Option<&RankedMatch> {
        self.ranks.first()
    }

    pub fn is_broken(&self) -> bool {
        !self.breaks.is_empty()
    }
}
