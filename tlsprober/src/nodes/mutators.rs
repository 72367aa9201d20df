//! Wrappers which inject one fault into what a generator sends.
//!
//! Some edit the generated message itself, the others install a hook on the record layer for
//! the single send of the wrapped message. Wrappers nest, e.g.
//! `fuzz_mac(fuzz_padding(generator, ..), ..)`. When two wrappers use the same hook the outer
//! one wins.

use std::fmt;

use prober::codec::{u24, Codec};
use prober::error::Error;
use prober::mutation::MutationSpec;
use prober::protocol::Generator;

use crate::hooks::{PaddingHook, PlaintextHook, SendHooks};
use crate::protocol::{FragmentList, TlsProtocol};
use crate::state::ConnectionState;
use crate::tls::enums::ContentType;
use crate::tls::message::Message;

/// Largest body a handshake header can describe.
const MAX_HANDSHAKE_LEN: usize = 1 << 24;

/// Edits the bytes of the generated message, the handshake header included. The transcript
/// records the edited message.
pub struct FuzzMessage<G> {
    inner: G,
    spec: MutationSpec,
}

pub fn fuzz_message<G: Generator<TlsProtocol>>(inner: G, spec: MutationSpec) -> FuzzMessage<G> {
    FuzzMessage { inner, spec }
}

impl<G: Generator<TlsProtocol>> fmt::Display for FuzzMessage<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fuzz_message({}, {})", self.inner, self.spec)
    }
}

impl<G: Generator<TlsProtocol>> Generator<TlsProtocol> for FuzzMessage<G> {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        let mut message = self.inner.generate(state)?;
        self.spec.apply(&mut message.payload)?;
        Ok(message)
    }

    fn install_hooks(&self, hooks: &mut SendHooks) {
        self.inner.install_hooks(hooks);
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        self.inner.post_send(state, sent)
    }
}

/// Appends padding to a handshake message, or cuts bytes off its end, and fixes up the length
/// in the handshake header to match.
pub struct PadHandshake<G> {
    inner: G,
    size: isize,
    pad_byte: u8,
    /// Appended instead of `size` copies of `pad_byte`.
    pad: Option<Vec<u8>>,
}

/// Pads the body by `size` bytes of `pad_byte`. A negative `size` removes bytes instead.
pub fn pad_handshake<G: Generator<TlsProtocol>>(
    inner: G,
    size: isize,
    pad_byte: u8,
) -> PadHandshake<G> {
    PadHandshake {
        inner,
        size,
        pad_byte,
        pad: None,
    }
}

/// Pads the body with exactly `pad`.
pub fn pad_handshake_with<G: Generator<TlsProtocol>>(inner: G, pad: Vec<u8>) -> PadHandshake<G> {
    PadHandshake {
        inner,
        size: 0,
        pad_byte: 0,
        pad: Some(pad),
    }
}

/// Removes the last `size` bytes of the body.
pub fn truncate_handshake<G: Generator<TlsProtocol>>(inner: G, size: usize) -> PadHandshake<G> {
    pad_handshake(inner, -(size as isize), 0)
}

impl<G: Generator<TlsProtocol>> PadHandshake<G> {
    fn resize(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
        let mut body = body.to_vec();
        if let Some(pad) = &self.pad {
            body.extend_from_slice(pad);
        } else if self.size >= 0 {
            body.resize(body.len() + self.size.unsigned_abs(), self.pad_byte);
        } else {
            let cut = self.size.unsigned_abs();
            if cut > body.len() {
                return Err(Error::Configuration(format!(
                    "can not remove {} bytes of a {} byte body",
                    cut,
                    body.len()
                )));
            }
            body.truncate(body.len() - cut);
        }
        if body.len() >= MAX_HANDSHAKE_LEN {
            return Err(Error::Configuration(format!(
                "a handshake body of {} bytes",
                body.len()
            )));
        }
        Ok(body)
    }
}

impl<G: Generator<TlsProtocol>> fmt::Display for PadHandshake<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pad {
            Some(pad) => write!(f, "pad_handshake({}, pad of {} bytes)", self.inner, pad.len()),
            None if self.size < 0 => {
                write!(f, "truncate_handshake({}, {})", self.inner, self.size.unsigned_abs())
            }
            None => write!(
                f,
                "pad_handshake({}, {}, {:#04x})",
                self.inner, self.size, self.pad_byte
            ),
        }
    }
}

impl<G: Generator<TlsProtocol>> Generator<TlsProtocol> for PadHandshake<G> {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        let message = self.inner.generate(state)?;
        if message.typ != ContentType::Handshake || message.payload.len() < 4 {
            return Err(Error::Configuration(format!(
                "{} does not generate a handshake message",
                self.inner
            )));
        }

        let body = self.resize(&message.payload[4..])?;
        let mut payload = Vec::with_capacity(4 + body.len());
        payload.push(message.payload[0]);
        u24(body.len() as u32).encode(&mut payload);
        payload.extend_from_slice(&body);
        Ok(Message::new(message.typ, payload))
    }

    fn install_hooks(&self, hooks: &mut SendHooks) {
        self.inner.install_hooks(hooks);
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        self.inner.post_send(state, sent)
    }
}

/// The record layer hook a [`Hooked`] wrapper installs.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Injection {
    Mac(MutationSpec),
    Padding(PaddingHook),
    Plaintext(PlaintextHook),
    Ciphertext(MutationSpec),
}

/// Installs a record layer hook for the send of the wrapped message.
pub struct Hooked<G> {
    inner: G,
    injection: Injection,
}

/// Edits the MAC of every record the message is sent in, or the tag under an AEAD cipher.
pub fn fuzz_mac<G: Generator<TlsProtocol>>(inner: G, spec: MutationSpec) -> Hooked<G> {
    Hooked {
        inner,
        injection: Injection::Mac(spec),
    }
}

/// Edits the CBC padding, optionally after growing it to at least `min_length` bytes.
pub fn fuzz_padding<G: Generator<TlsProtocol>>(
    inner: G,
    min_length: Option<u8>,
    spec: MutationSpec,
) -> Hooked<G> {
    Hooked {
        inner,
        injection: Injection::Padding(PaddingHook { min_length, spec }),
    }
}

/// Edits the whole CBC plaintext, explicit IV, MAC and padding included.
pub fn fuzz_plaintext<G: Generator<TlsProtocol>>(inner: G, spec: MutationSpec) -> Hooked<G> {
    Hooked {
        inner,
        injection: Injection::Plaintext(PlaintextHook::Fuzz(spec)),
    }
}

/// Encrypts `data` instead of the real CBC plaintext.
pub fn replace_plaintext<G: Generator<TlsProtocol>>(inner: G, data: Vec<u8>) -> Hooked<G> {
    Hooked {
        inner,
        injection: Injection::Plaintext(PlaintextHook::Replace(data)),
    }
}

/// Edits the protected fragment of every record the message is sent in.
pub fn fuzz_encrypted_message<G: Generator<TlsProtocol>>(inner: G, spec: MutationSpec) -> Hooked<G> {
    Hooked {
        inner,
        injection: Injection::Ciphertext(spec),
    }
}

impl<G: Generator<TlsProtocol>> fmt::Display for Hooked<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.injection {
            Injection::Mac(spec) => write!(f, "fuzz_mac({}, {})", self.inner, spec),
            Injection::Padding(PaddingHook { min_length, spec }) => match min_length {
                Some(min_length) => write!(
                    f,
                    "fuzz_padding({}, min_length={}, {})",
                    self.inner, min_length, spec
                ),
                None => write!(f, "fuzz_padding({}, {})", self.inner, spec),
            },
            Injection::Plaintext(PlaintextHook::Fuzz(spec)) => {
                write!(f, "fuzz_plaintext({}, {})", self.inner, spec)
            }
            Injection::Plaintext(PlaintextHook::Replace(data)) => write!(
                f,
                "replace_plaintext({}, {} bytes)",
                self.inner,
                data.len()
            ),
            Injection::Ciphertext(spec) => {
                write!(f, "fuzz_encrypted_message({}, {})", self.inner, spec)
            }
        }
    }
}

impl<G: Generator<TlsProtocol>> Generator<TlsProtocol> for Hooked<G> {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        self.inner.generate(state)
    }

    fn install_hooks(&self, hooks: &mut SendHooks) {
        self.inner.install_hooks(hooks);
        match &self.injection {
            Injection::Mac(spec) => hooks.mac = Some(spec.clone()),
            Injection::Padding(hook) => hooks.padding = Some(hook.clone()),
            Injection::Plaintext(hook) => hooks.plaintext = Some(hook.clone()),
            Injection::Ciphertext(spec) => hooks.ciphertext = Some(spec.clone()),
        }
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        self.inner.post_send(state, sent)
    }
}

/// Cuts the generated message into messages of `size` bytes. The first one is sent, the
/// others wait in a fragment list for [`PopMessageFromList`] or [`FlushMessageList`].
///
/// The transcript records the whole message at once.
///
/// [`PopMessageFromList`]: crate::nodes::generators::PopMessageFromList
/// [`FlushMessageList`]: crate::nodes::generators::FlushMessageList
pub struct SplitMessage<G> {
    inner: G,
    fragments: FragmentList,
    size: usize,
    whole: Option<Message>,
}

pub fn split_message<G: Generator<TlsProtocol>>(
    inner: G,
    fragments: FragmentList,
    size: usize,
) -> SplitMessage<G> {
    SplitMessage {
        inner,
        fragments,
        size,
        whole: None,
    }
}

impl<G: Generator<TlsProtocol>> fmt::Display for SplitMessage<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "split_message({}, {})", self.inner, self.size)
    }
}

impl<G: Generator<TlsProtocol>> Generator<TlsProtocol> for SplitMessage<G> {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        if self.size == 0 {
            return Err(Error::Configuration(
                "messages can not be split into empty fragments".into(),
            ));
        }
        let message = self.inner.generate(state)?;
        for chunk in message.payload.chunks(self.size) {
            self.fragments.push(Message::new(message.typ, chunk.to_vec()));
        }
        self.whole = Some(message);
        self.fragments
            .pop()
            .ok_or_else(|| Error::Configuration("nothing to split".into()))
    }

    fn install_hooks(&self, hooks: &mut SendHooks) {
        self.inner.install_hooks(hooks);
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        match self.whole.take() {
            Some(whole) => self.inner.post_send(state, &whole),
            None => self.inner.post_send(state, sent),
        }
    }
}
