//! Whole-trajectory decoding with a rank-K Viterbi lattice.

#[doc(hidden)]
pub mod batch;
#[doc(hidden)]
pub mod decoder;
mod lattice;

#[doc(inline)]
pub use batch::BatchMatcher;
#[doc(inline)]
pub use decoder::OfflineDecoder;
