//! Walks a [`Conversation`] against a live peer.
//!
//! The runner is a small state machine. In [`RunnerState::Ready`] the selected node is
//! processed according to its kind, [`RunnerState::Advancing`] picks the node to process next,
//! and [`RunnerState::Failed`] and [`RunnerState::Done`] are terminal.
//!
//! Anything the peer or the transport does wrong ends the conversation as
//! [`Outcome::Failed`]. Errors for which [`Error::is_programmer_error`] holds are returned as
//! `Err` instead, because they mean the conversation itself is broken.

use log::{debug, trace, warn};

use crate::error::Error;
use crate::protocol::{Expect, Inbound, ProtocolBehavior, Stream};
use crate::tree::{Conversation, NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub node: NodeId,
    pub description: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    Ready(NodeId),
    Advancing(NodeId),
    Failed(Failure),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Failed(Failure),
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done)
    }
}

pub struct Runner<'c, PB: ProtocolBehavior> {
    conversation: &'c mut Conversation<PB>,
    state: PB::State,
    runner_state: RunnerState,
    /// Event which a repeating expectation did not match, waiting for the exit node.
    pending: Option<Inbound<PB::Message>>,
    repeats: usize,
}

impl<'c, PB: ProtocolBehavior> Runner<'c, PB> {
    pub fn new(conversation: &'c mut Conversation<PB>, state: PB::State) -> Self {
        let root = conversation.root();
        Self {
            conversation,
            state,
            runner_state: RunnerState::Ready(root),
            pending: None,
            repeats: 0,
        }
    }

    pub fn state(&self) -> &PB::State {
        &self.state
    }

    pub fn into_state(self) -> PB::State {
        self.state
    }

    pub fn runner_state(&self) -> &RunnerState {
        &self.runner_state
    }

    pub fn run(&mut self) -> Result<Outcome, Error> {
        loop {
            let next = match self.runner_state.clone() {
                RunnerState::Ready(id) => match self.process(id) {
                    Ok(next) => next,
                    Err(err) => self.fail(id, err)?,
                },
                RunnerState::Advancing(id) => self.advance(id)?,
                RunnerState::Failed(failure) => return Ok(Outcome::Failed(failure)),
                RunnerState::Done => return Ok(Outcome::Done),
            };
            self.runner_state = next;
        }
    }

    fn fail(&self, id: NodeId, err: Error) -> Result<RunnerState, Error> {
        if err.is_programmer_error() {
            return Err(err);
        }

        let description = self.conversation.node(id)?.kind().to_string();
        warn!("{} failed: {}", description, err);
        Ok(RunnerState::Failed(Failure {
            node: id,
            description,
            reason: err.to_string(),
        }))
    }

    fn process(&mut self, id: NodeId) -> Result<RunnerState, Error> {
        let node = self.conversation.node_mut(id)?;
        debug!("processing {}", node.kind);

        match &mut node.kind {
            NodeKind::Expect(_) => self.expect(id),
            _ if self.pending.is_some() => Err(Error::Configuration(format!(
                "{} follows a repeating expectation but can not take the event it left over",
                node.kind
            ))),
            NodeKind::Command(command) => {
                command.process(&mut self.state)?;
                Ok(RunnerState::Advancing(id))
            }
            NodeKind::Generator(generator) => {
                let message = generator.generate(&mut self.state)?;
                let mut hooks = PB::Hooks::default();
                generator.install_hooks(&mut hooks);
                trace!("sending {:?} with {:?}", message, hooks);

                self.state.send(&message, &hooks)?;
                generator.post_send(&mut self.state, &message)?;
                Ok(RunnerState::Advancing(id))
            }
        }
    }

    fn expect(&mut self, id: NodeId) -> Result<RunnerState, Error> {
        let inbound = match self.pending.take() {
            Some(inbound) => inbound,
            None => self.state.receive()?,
        };
        trace!("received {:?}", inbound);

        let node = self.conversation.node(id)?;
        let (repeat, alternate) = (node.repeat(), node.alternate());
        let exit = node.children().first().copied();
        let matched = as_expect(&node.kind)?.is_match(&inbound);

        if let Some(max) = repeat {
            if !matched {
                self.repeats = 0;
                let exit = exit.ok_or_else(|| {
                    Error::Protocol(format!("unexpected {:?} while waiting for {}", inbound, node.kind))
                })?;
                self.pending = Some(inbound);
                return Ok(RunnerState::Ready(exit));
            }

            self.repeats += 1;
            if self.repeats > max {
                return Err(Error::Protocol(format!(
                    "{} matched more than {} times in a row",
                    node.kind, max
                )));
            }
            self.process_expect(id, &inbound)?;
            return Ok(RunnerState::Advancing(id));
        }

        if matched {
            self.process_expect(id, &inbound)?;
            return Ok(RunnerState::Advancing(id));
        }

        if let Some(alternate) = alternate {
            let fallback = self.conversation.node(alternate)?;
            if as_expect(&fallback.kind)?.is_match(&inbound) {
                debug!("{} did not match, continuing with {}", node.kind, fallback.kind);
                self.process_expect(alternate, &inbound)?;
                return Ok(RunnerState::Advancing(alternate));
            }
            return Err(Error::Protocol(format!(
                "unexpected {:?}, expected {} or {}",
                inbound, node.kind, fallback.kind
            )));
        }

        Err(Error::Protocol(format!(
            "unexpected {:?}, expected {}",
            inbound, node.kind
        )))
    }

    fn process_expect(&mut self, id: NodeId, inbound: &Inbound<PB::Message>) -> Result<(), Error> {
        match &mut self.conversation.node_mut(id)?.kind {
            NodeKind::Expect(expect) => expect.process(&mut self.state, inbound),
            other => Err(Error::Configuration(format!("{} is not an expectation", other))),
        }
    }

    fn advance(&mut self, id: NodeId) -> Result<RunnerState, Error> {
        let node = self.conversation.node(id)?;
        if node.repeat().is_some() {
            return Ok(RunnerState::Ready(id));
        }

        match node.children().first() {
            Some(child) => Ok(RunnerState::Ready(*child)),
            None => {
                if let Some(left) = &self.pending {
                    debug!("conversation ended with {:?} unconsumed", left);
                }
                Ok(RunnerState::Done)
            }
        }
    }
}

fn as_expect<PB: ProtocolBehavior>(kind: &NodeKind<PB>) -> Result<&dyn Expect<PB>, Error> {
    match kind {
        NodeKind::Expect(expect) => Ok(expect.as_ref()),
        other => Err(Error::Configuration(format!("{} is not an expectation", other))),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::test_utils::{expect, send, ExpectText, Lookup, MockProtocol, MockState, Note, Send};

    fn run(
        conversation: &mut Conversation<MockProtocol>,
        state: MockState,
    ) -> (Result<Outcome, Error>, MockState) {
        let mut runner = Runner::new(conversation, state);
        let outcome = runner.run();
        (outcome, runner.into_state())
    }

    #[test]
    fn test_linear_conversation() {
        let mut conversation = Conversation::new(NodeKind::command(Note("connect")));
        let mut node = conversation.root();
        node = conversation.add_child(node, send("hello")).unwrap();
        node = conversation.add_child(node, expect("world")).unwrap();
        conversation.add_child(node, expect("<close>")).unwrap();

        let (outcome, state) = run(&mut conversation, MockState::replying(["world", "<close>"]));
        assert_eq!(outcome.unwrap(), Outcome::Done);
        assert_eq!(state.sent, vec!["hello"]);
        assert_eq!(
            state.notes,
            vec!["connect", "sent hello", "got world", "got <close>"]
        );
    }

    #[test]
    fn test_post_send_runs_after_send() {
        let mut conversation = Conversation::new(NodeKind::generator(Send {
            text: "ping",
            suffix: Some("!"),
        }));
        let (outcome, state) = run(&mut conversation, MockState::default());
        assert!(outcome.unwrap().is_done());
        // hooks change what goes on the wire, the generator still sees its own message
        assert_eq!(state.sent, vec!["ping!"]);
        assert_eq!(state.notes, vec!["sent ping"]);
    }

    #[test]
    fn test_hooks_do_not_outlive_their_send() {
        let mut conversation = Conversation::new(NodeKind::generator(Send {
            text: "a",
            suffix: Some("*"),
        }));
        let root = conversation.root();
        conversation.add_child(root, send("b")).unwrap();

        let (outcome, state) = run(&mut conversation, MockState::default());
        assert!(outcome.unwrap().is_done());
        assert_eq!(state.sent, vec!["a*", "b"]);
    }

    #[test]
    fn test_alternate_taken_only_on_mismatch() {
        let build = || {
            let mut conversation = Conversation::new(expect("alert"));
            let root = conversation.root();
            conversation.add_child(root, expect("<close>")).unwrap();
            conversation.set_alternate(root, expect("<close>")).unwrap();
            conversation
        };

        let mut primary = build();
        let (outcome, state) = run(&mut primary, MockState::replying(["alert", "<close>"]));
        assert!(outcome.unwrap().is_done());
        assert_eq!(state.notes, vec!["got alert", "got <close>"]);

        let mut fallback = build();
        let (outcome, state) = run(&mut fallback, MockState::replying(["<close>"]));
        assert!(outcome.unwrap().is_done());
        assert_eq!(state.notes, vec!["got <close>"]);
    }

    #[test]
    fn test_alternate_mismatch_fails_on_primary() {
        let mut conversation = Conversation::new(NodeKind::command(Note("start")));
        let root = conversation.root();
        let node = conversation.add_child(root, expect("alert")).unwrap();
        conversation.set_alternate(node, expect("<close>")).unwrap();

        let (outcome, _) = run(&mut conversation, MockState::replying(["data"]));
        match outcome.unwrap() {
            Outcome::Failed(failure) => {
                assert_eq!(failure.node, node);
                assert_eq!(failure.description, "Expect(alert)");
                assert!(failure.reason.contains("data"));
            }
            Outcome::Done => panic!("unexpected message must fail"),
        }
    }

    #[test]
    fn test_field_level_failure_does_not_try_alternate() {
        let mut conversation = Conversation::new(NodeKind::expect(ExpectText {
            text: "alert",
            reject: true,
        }));
        let root = conversation.root();
        conversation.set_alternate(root, expect("alert")).unwrap();

        let (outcome, _) = run(&mut conversation, MockState::replying(["alert"]));
        assert!(matches!(outcome.unwrap(), Outcome::Failed(_)));
    }

    #[test]
    fn test_repeat_zero_or_more() {
        let build = || {
            let mut conversation = Conversation::new(NodeKind::command(Note("start")));
            let root = conversation.root();
            let ticket = conversation.add_child(root, expect("ticket")).unwrap();
            conversation.repeat_while_matches(ticket, 3).unwrap();
            conversation.add_child(ticket, expect("data")).unwrap();
            conversation
        };

        for replies in [
            vec!["data"],
            vec!["ticket", "data"],
            vec!["ticket", "ticket", "ticket", "data"],
        ] {
            let tickets = replies.len() - 1;
            let mut conversation = build();
            let (outcome, state) = run(&mut conversation, MockState::replying(replies));
            assert!(outcome.unwrap().is_done());
            assert_eq!(state.notes.iter().filter(|n| *n == "got ticket").count(), tickets);
            assert_eq!(state.notes.last().unwrap(), "got data");
        }
    }

    #[test]
    fn test_repeat_is_bounded() {
        let mut conversation = Conversation::new(expect("ticket"));
        let root = conversation.root();
        conversation.repeat_while_matches(root, 2).unwrap();
        conversation.add_child(root, expect("data")).unwrap();

        let (outcome, _) = run(
            &mut conversation,
            MockState::replying(["ticket", "ticket", "ticket", "data"]),
        );
        match outcome.unwrap() {
            Outcome::Failed(failure) => assert!(failure.reason.contains("more than 2")),
            Outcome::Done => panic!("repeat bound must be enforced"),
        }
    }

    #[test]
    fn test_repeat_exit_must_consume() {
        let mut conversation = Conversation::new(expect("ticket"));
        let root = conversation.root();
        conversation.repeat_while_matches(root, 2).unwrap();
        conversation.add_child(root, send("oops")).unwrap();

        let (outcome, _) = run(&mut conversation, MockState::replying(["data"]));
        assert!(matches!(outcome, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_timeout_is_a_failure() {
        let mut conversation = Conversation::new(expect("world"));
        let root = conversation.root();
        conversation.set_alternate(root, expect("<close>")).unwrap();

        let (outcome, _) = run(&mut conversation, MockState::default());
        match outcome.unwrap() {
            Outcome::Failed(failure) => assert!(failure.reason.contains("timeout")),
            Outcome::Done => panic!("a timeout must not be routed"),
        }
    }

    #[test]
    fn test_programmer_errors_are_not_failures() {
        let mut conversation = Conversation::new(NodeKind::command(Lookup("master_secret")));
        let root = conversation.root();
        conversation.add_child(root, send("never")).unwrap();

        let (outcome, state) = run(&mut conversation, MockState::default());
        assert_eq!(outcome, Err(Error::Lookup("master_secret".into())));
        assert!(state.sent.is_empty());
    }
}
