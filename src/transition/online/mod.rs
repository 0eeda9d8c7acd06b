//! Streaming decoding with a forward filter over a sliding window.

#[doc(hidden)]
pub mod decoder;
#[doc(hidden)]
pub mod memory;
#[doc(hidden)]
pub mod policy;
#[doc(hidden)]
pub mod state;

#[doc(inline)]
pub use decoder::OnlineDecoder;
#[doc(inline)]
pub use memory::SequenceMemory;
#[doc(inline)]
pub use policy::EvictionPolicy;
#[doc(inline)]
pub use state::{DecodedState, SettledState, StateRef, TimeStep};
