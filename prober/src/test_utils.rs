//! Scripted in-memory protocol for exercising the engine without a socket.

use std::collections::VecDeque;
use std::fmt;

use crate::error::Error;
use crate::protocol::{Command, Expect, Generator, Inbound, ProtocolBehavior, Stream};
use crate::tree::NodeKind;

pub struct MockProtocol;

#[derive(Debug, Default, Clone)]
pub struct MockHooks {
    pub suffix: Option<String>,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub inbound: VecDeque<Inbound<String>>,
    pub sent: Vec<String>,
    pub notes: Vec<String>,
}

impl MockState {
    pub fn replying<I: IntoIterator<Item = &'static str>>(replies: I) -> Self {
        let inbound = replies
            .into_iter()
            .map(|reply| match reply {
                "<close>" => Inbound::Closed,
                other => Inbound::Message(other.to_string()),
            })
            .collect();
        Self {
            inbound,
            ..Self::default()
        }
    }
}

impl Stream<String, MockHooks> for MockState {
    fn send(&mut self, message: &String, hooks: &MockHooks) -> Result<(), Error> {
        let mut wire = message.clone();
        if let Some(suffix) = &hooks.suffix {
            wire.push_str(suffix);
        }
        self.sent.push(wire);
        Ok(())
    }

    fn receive(&mut self) -> Result<Inbound<String>, Error> {
        self.inbound
            .pop_front()
            .ok_or_else(|| Error::Timeout("nothing scripted".into()))
    }
}

impl ProtocolBehavior for MockProtocol {
    type Message = String;
    type Hooks = MockHooks;
    type State = MockState;
}

pub struct Note(pub &'static str);

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Note({})", self.0)
    }
}

impl Command<MockProtocol> for Note {
    fn process(&mut self, state: &mut MockState) -> Result<(), Error> {
        state.notes.push(self.0.to_string());
        Ok(())
    }
}

pub struct Lookup(pub &'static str);

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lookup({})", self.0)
    }
}

impl Command<MockProtocol> for Lookup {
    fn process(&mut self, _state: &mut MockState) -> Result<(), Error> {
        Err(Error::Lookup(self.0.to_string()))
    }
}

pub struct Send {
    pub text: &'static str,
    pub suffix: Option<&'static str>,
}

impl fmt::Display for Send {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Send({})", self.text)
    }
}

impl Generator<MockProtocol> for Send {
    fn generate(&mut self, _state: &mut MockState) -> Result<String, Error> {
        Ok(self.text.to_string())
    }

    fn install_hooks(&self, hooks: &mut MockHooks) {
        hooks.suffix = self.suffix.map(str::to_string);
    }

    fn post_send(&mut self, state: &mut MockState, sent: &String) -> Result<(), Error> {
        state.notes.push(format!("sent {}", sent));
        Ok(())
    }
}

/// Matches one exact message, or the close event for `"<close>"`.
pub struct ExpectText {
    pub text: &'static str,
    /// Field level failure after a successful match.
    pub reject: bool,
}

impl fmt::Display for ExpectText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expect({})", self.text)
    }
}

impl Expect<MockProtocol> for ExpectText {
    fn is_match(&self, inbound: &Inbound<String>) -> bool {
        match inbound {
            Inbound::Message(message) => message == self.text,
            Inbound::Closed => self.text == "<close>",
        }
    }

    fn process(&mut self, state: &mut MockState, _inbound: &Inbound<String>) -> Result<(), Error> {
        if self.reject {
            return Err(Error::Protocol(format!("{} rejected", self.text)));
        }
        state.notes.push(format!("got {}", self.text));
        Ok(())
    }
}

pub fn send(text: &'static str) -> NodeKind<MockProtocol> {
    NodeKind::generator(Send { text, suffix: None })
}

pub fn expect(text: &'static str) -> NodeKind<MockProtocol> {
    NodeKind::expect(ExpectText {
        text,
        reject: false,
    })
}
