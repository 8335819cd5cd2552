//! Wire protocol and inbound dispatch.

pub mod envelope;
pub mod router;

pub use envelope::{tags, Envelope, EnvelopeError, ForwardEnvelope};
pub use router::{Dispatch, MessageRouter};
