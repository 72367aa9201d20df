//! The seams between the generic engine and a concrete protocol binding.

use std::fmt::{Debug, Display};

use crate::error::Error;

/// Something that arrived from the peer.
///
/// The end of the connection is an event like any message so that conversations can
/// route on it, e.g. a peer may answer with either an alert or an immediate close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<M> {
    Message(M),
    Closed,
}

impl<M> Inbound<M> {
    pub fn message(&self) -> Option<&M> {
        match self {
            Inbound::Message(message) => Some(message),
            Inbound::Closed => None,
        }
    }
}

/// Sending and receiving of whole protocol messages.
pub trait Stream<M, H> {
    /// Transmits `message`, with `hooks` in effect for this single send only.
    fn send(&mut self, message: &M, hooks: &H) -> Result<(), Error>;

    /// Blocks until the next message or the end of the connection.
    /// Running out of time is an error, not an [`Inbound`] event.
    fn receive(&mut self) -> Result<Inbound<M>, Error>;
}

/// Binds the engine to one protocol.
pub trait ProtocolBehavior: 'static {
    type Message: Debug;
    /// Per-send overrides of the transport, e.g. corrupting a MAC.
    type Hooks: Default + Debug;
    /// Connection state shared by all nodes of a conversation.
    type State: Stream<Self::Message, Self::Hooks> + Default;
}

/// Node which changes local state and never talks to the peer.
pub trait Command<PB: ProtocolBehavior>: Display {
    fn process(&mut self, state: &mut PB::State) -> Result<(), Error>;
}

/// Node which produces a single message for the peer.
pub trait Generator<PB: ProtocolBehavior>: Display {
    fn generate(&mut self, state: &mut PB::State) -> Result<PB::Message, Error>;

    /// Transport overrides which must be active while the generated message is sent.
    fn install_hooks(&self, _hooks: &mut PB::Hooks) {}

    /// Runs strictly after `sent` has been handed to the transport.
    fn post_send(&mut self, _state: &mut PB::State, _sent: &PB::Message) -> Result<(), Error> {
        Ok(())
    }
}

/// Node which consumes one inbound event.
pub trait Expect<PB: ProtocolBehavior>: Display {
    /// Type level check without side effects. Decides routing between a node and its
    /// alternate.
    fn is_match(&self, inbound: &Inbound<PB::Message>) -> bool;

    /// Field level checks and state updates for an event which passed [`Expect::is_match`].
    fn process(
        &mut self,
        state: &mut PB::State,
        inbound: &Inbound<PB::Message>,
    ) -> Result<(), Error>;
}
