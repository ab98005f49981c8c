//! # crosstalk-harness
//!
//! In-memory transport for exercising `crosstalk-core` end to end: an
//! unreliable broadcast bus where every attached endpoint hears every other
//! endpoint, so router-side trust filtering does all the work it would do
//! on a real shared channel.

pub mod bus;

pub use bus::{MemoryBus, MemoryEndpoint};
