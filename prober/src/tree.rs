//! Conversations are trees of nodes stored in an arena.
//!
//! A node has an ordered list of children of which the runner only ever follows the first,
//! and at most one alternate expectation which is offered the inbound event when the node
//! itself does not match it. Alternates are a single level deep: an alternate cannot have an
//! alternate of its own.
//!
//! Optional repeated messages are modelled by [`Conversation::repeat_while_matches`] instead of a
//! node being its own child. A repeating expectation matches zero up to `max` times, and the
//! first event it does not match is handed to its first child, the exit.

use std::fmt;

use crate::error::Error;
use crate::protocol::{Command, Expect, Generator, ProtocolBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub enum NodeKind<PB: ProtocolBehavior> {
    Command(Box<dyn Command<PB>>),
    Generator(Box<dyn Generator<PB>>),
    Expect(Box<dyn Expect<PB>>),
}

impl<PB: ProtocolBehavior> NodeKind<PB> {
    pub fn command<C: Command<PB> + 'static>(command: C) -> Self {
        NodeKind::Command(Box::new(command))
    }

    pub fn generator<G: Generator<PB> + 'static>(generator: G) -> Self {
        NodeKind::Generator(Box::new(generator))
    }

    pub fn expect<E: Expect<PB> + 'static>(expect: E) -> Self {
        NodeKind::Expect(Box::new(expect))
    }

    pub fn is_expect(&self) -> bool {
        matches!(self, NodeKind::Expect(_))
    }
}

impl<PB: ProtocolBehavior> fmt::Display for NodeKind<PB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Command(command) => write!(f, "{}", command),
            NodeKind::Generator(generator) => write!(f, "{}", generator),
            NodeKind::Expect(expect) => write!(f, "{}", expect),
        }
    }
}

pub struct Node<PB: ProtocolBehavior> {
    pub(crate) kind: NodeKind<PB>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) alternate: Option<NodeId>,
    pub(crate) repeat: Option<usize>,
    is_alternate: bool,
}

impl<PB: ProtocolBehavior> Node<PB> {
    fn new(kind: NodeKind<PB>) -> Self {
        Self {
            kind,
            children: Vec::new(),
            alternate: None,
            repeat: None,
            is_alternate: false,
        }
    }

    pub fn kind(&self) -> &NodeKind<PB> {
        &self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn alternate(&self) -> Option<NodeId> {
        self.alternate
    }

    /// Upper bound of matches if the node repeats.
    pub fn repeat(&self) -> Option<usize> {
        self.repeat
    }
}

pub struct Conversation<PB: ProtocolBehavior> {
    nodes: Vec<Node<PB>>,
}

impl<PB: ProtocolBehavior> Conversation<PB> {
    pub fn new(root: NodeKind<PB>) -> Self {
        Self {
            nodes: vec![Node::new(root)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node<PB>, Error> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::Configuration(format!("node {} does not exist", id)))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<PB>, Error> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::Configuration(format!("node {} does not exist", id)))
    }

    fn push(&mut self, kind: NodeKind<PB>) -> NodeId {
        self.nodes.push(Node::new(kind));
        NodeId(self.nodes.len() - 1)
    }

    /// Appends a child to `parent` and returns it, so that linear conversations read top
    /// to bottom: `node = conversation.add_child(node, ...)?`.
    pub fn add_child(&mut self, parent: NodeId, kind: NodeKind<PB>) -> Result<NodeId, Error> {
        self.node(parent)?;
        let child = self.push(kind);
        self.node_mut(parent)?.children.push(child);
        Ok(child)
    }

    /// Sets the expectation which is offered an inbound event that `node` does not match.
    pub fn set_alternate(&mut self, node: NodeId, kind: NodeKind<PB>) -> Result<NodeId, Error> {
        let primary = self.node(node)?;
        if !primary.kind.is_expect() || !kind.is_expect() {
            return Err(Error::Configuration(format!(
                "alternates link two expectations, {} is not one",
                if primary.kind.is_expect() { &kind } else { &primary.kind }
            )));
        }
        if primary.is_alternate {
            return Err(Error::Configuration(format!(
                "{} is an alternate itself, alternates do not chain",
                primary.kind
            )));
        }
        if primary.repeat.is_some() {
            return Err(Error::Configuration(format!(
                "{} repeats, its exit child takes what it does not match",
                primary.kind
            )));
        }
        if let Some(previous) = primary.alternate {
            return Err(Error::Configuration(format!(
                "{} already has the alternate {}",
                primary.kind,
                self.node(previous)?.kind
            )));
        }

        let alternate = self.push(kind);
        self.node_mut(alternate)?.is_alternate = true;
        self.node_mut(node)?.alternate = Some(alternate);
        Ok(alternate)
    }

    /// Lets the expectation `node` match up to `max` consecutive events. The first child
    /// added to it receives the first event it does not match.
    pub fn repeat_while_matches(&mut self, node: NodeId, max: usize) -> Result<(), Error> {
        let target = self.node_mut(node)?;
        if !target.kind.is_expect() {
            return Err(Error::Configuration(format!(
                "only expectations can repeat, {} is not one",
                target.kind
            )));
        }
        if target.alternate.is_some() {
            return Err(Error::Configuration(format!(
                "{} has an alternate and can not repeat",
                target.kind
            )));
        }
        if max == 0 {
            return Err(Error::Configuration(format!(
                "{} must be allowed to match at least once",
                target.kind
            )));
        }
        target.repeat = Some(max);
        Ok(())
    }

    /// Descriptions of the nodes on the primary path, handy for logging a conversation.
    pub fn describe(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = Some(self.root());
        while let Some(id) = current {
            let Ok(node) = self.node(id) else { break };
            out.push(node.kind.to_string());
            current = node.children.first().copied().filter(|child| *child != id);
        }
        out
    }
}
