/// Wire format of the stream protocol.
///
/// This module defines the argument-list encoding of invocation messages and
/// of the per-invocation result envelopes.
mod envelope;
mod invocation;

pub use envelope::Envelope;
pub use invocation::InvocationMessage;
