use prober::accumulator::Accumulator;
use prober::protocol::ProtocolBehavior;
use prober::tree::{Conversation, NodeKind};

use crate::hooks::SendHooks;
use crate::state::ConnectionState;
use crate::tls::message::Message;

/// Binds the engine to TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsProtocol;

impl ProtocolBehavior for TlsProtocol {
    type Message = Message;
    type Hooks = SendHooks;
    type State = ConnectionState;
}

pub type TlsConversation = Conversation<TlsProtocol>;
pub type TlsNode = NodeKind<TlsProtocol>;

/// Records which a split message left behind for later generators.
pub type FragmentList = Accumulator<Message>;

/// Named values copied out of the connection, in the order they were copied.
pub type VariableLog = Accumulator<(String, Vec<u8>)>;

/// Nonces of sealed records.
pub type NonceLog = Accumulator<Vec<u8>>;
