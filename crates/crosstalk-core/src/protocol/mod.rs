//! Protocol layer: wire envelope codec and error marshalling

pub mod remote_error;
pub mod wire;

pub use remote_error::{ErrorRecord, RemoteError};
pub use wire::{Envelope, EnvelopeBody};
