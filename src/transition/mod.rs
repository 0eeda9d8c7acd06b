//! A Hidden-Markov-Model (HMM) matching
//! module which decodes noisy observations
//! onto the roads of a network, either
//! offline per trajectory or online as a stream.

pub mod assemble;
pub mod candidate;
pub mod offline;
pub mod online;
pub mod probability;
pub mod result;
pub mod step;

#[cfg(test)]
mod test;

// Re-Exports
#[doc(inline)]
pub use assemble::{collapse, ResultAssembler, SequenceState, StateKind};
#[doc(inline)]
pub use candidate::{Candidate, CandidateGenerator, Observation, Trajectory};
#[doc(inline)]
pub use offline::{BatchMatcher, OfflineDecoder};
#[doc(inline)]
pub use online::{
    DecodedState, EvictionPolicy, OnlineDecoder, SequenceMemory, SettledState, StateRef, TimeStep,
};
#[doc(inline)]
pub use probability::ProbabilityModel;
#[doc(inline)]
pub use result::{BreakKind, MatchResult, RankedMatch, Route, UnmatchedTrajectory};
#[doc(inline)]
pub use step::{RoadPath, Transition, TransitionSolver};
