use crate::network::RoadId;

use thiserror::Error;

/// The crate-wide error, wrapping the error of each submodule.
#[derive(Error, Debug)]
pub enum Error {
    #[error("match failed: {0}")]
    Match(MatchError),

    #[error("road network rejected: {0}")]
    Network(NetworkError),

    #[error("invalid configuration: {0}")]
    Config(ConfigError),

    #[error("could not build worker pool: {0}")]
    WorkerPool(rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lifts each concern's error into the matching [`Error`] variant, so
/// `?` works across module boundaries.
macro_rules! wrap_errors {
    ($($from:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$from> for Error {
                fn from(value: $from) -> Self {
                    Error::$variant(value)
                }
            }
        )+
    };
}

wrap_errors! {
    MatchError => Match,
    NetworkError => Network,
    ConfigError => Config,
    rayon::ThreadPoolBuildError => WorkerPool,
}

/// Failures raised while decoding a single trajectory.
///
/// Breaks (missing candidates, missing connectivity) are not errors, they
/// are recorded on the [`MatchResult`](crate::transition::MatchResult).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("no input points were given")]
    NoPointsProvided,

    #[error("observation {index} is not later than its predecessor (Δt = {delta}s)")]
    NonIncreasingTime { index: usize, delta: f64 },

    #[error("time difference between observations must be positive, got {0}s")]
    NonPositiveTimeDelta(f64),

    #[error("cannot assemble a result, {0} settled states were already drained")]
    SettledDrained(usize),

    #[error("inconsistent decoder bookkeeping: {0}")]
    Inconsistent(Inconsistency),
}

/// Internal bookkeeping failures. Any of these signals a bug in the
/// eviction logic rather than bad input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Inconsistency {
    #[error("predecessor {step}:{slot} is not a live state of the previous step")]
    DanglingPredecessor { step: u64, slot: usize },

    #[error("step {0} is older than the newest step in the window")]
    TimeOrder(u64),

    #[error("state {step}:{slot} has no predecessor but is not in the oldest step")]
    Unrooted { step: u64, slot: usize },

    #[error("backtracking reached pruned state {step}:{slot}")]
    PrunedState { step: u64, slot: usize },

    #[error("break index {index} falls inside the already merged result ({merged} states)")]
    BreakInsideResult { index: usize, merged: usize },

    #[error("decoded run does not line up with observation {0}")]
    Misaligned(usize),
}

impl From<Inconsistency> for MatchError {
    fn from(value: Inconsistency) -> Self {
        MatchError::Inconsistent(value)
    }
}

/// Failures raised while building or editing a road network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("node {0} was declared twice")]
    DuplicateNode(u64),

    #[error("road {road} references unknown node {node}")]
    UnknownNode { road: RoadId, node: u64 },

    #[error("road {0} was declared twice")]
    DuplicateRoad(RoadId),

    #[error("road {0} needs at least two nodes")]
    DegenerateRoad(RoadId),

    #[error("nodes {0} -> {1} are already joined by another road")]
    ParallelSegment(u64, u64),

    #[error("no road with id {0}")]
    UnknownRoad(RoadId),

    #[error("road {0} is not a temporary road")]
    PermanentRoad(RoadId),
}

/// Failures raised while reading configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{key} could not be parsed from {value:?}")]
    Unparsable { key: &'static str, value: String },

    #[error("{key} must be {requirement}, got {value}")]
    OutOfRange {
        key: &'static str,
        requirement: &'static str,
        value: f64,
    },
}
