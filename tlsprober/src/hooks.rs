//! Per-send overrides of the record layer.
//!
//! A generator describes the faults it wants in [`SendHooks`]. The runner hands them to the
//! connection for exactly one send, and [`HookGuard`] puts the previous set back once that
//! send returns, whichever way it returns.

use std::ops::{Deref, DerefMut};

use prober::mutation::MutationSpec;

use crate::record::RecordLayer;

/// Overrides the CBC padding of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaddingHook {
    /// Pad to at least this many bytes, the length byte included, instead of the minimum.
    pub min_length: Option<u8>,
    /// Edits of the padding, -1 being the length byte.
    pub spec: MutationSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaintextHook {
    /// Edit the block aligned plaintext of a CBC record, IV block, MAC and padding included.
    Fuzz(MutationSpec),
    /// Encrypt these bytes instead. The length must be a multiple of the block size.
    Replace(Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendHooks {
    /// Edits of the MAC of CBC records, or of the tag of AEAD records.
    pub mac: Option<MutationSpec>,
    pub padding: Option<PaddingHook>,
    pub plaintext: Option<PlaintextHook>,
    /// Edits of the finished record fragment, i.e. what follows the record header.
    pub ciphertext: Option<MutationSpec>,
}

impl SendHooks {
    pub fn is_empty(&self) -> bool {
        *self == SendHooks::default()
    }
}

/// Keeps `hooks` installed on a record layer while it lives.
pub struct HookGuard<'a> {
    layer: &'a mut RecordLayer,
    previous: Option<SendHooks>,
}

impl<'a> HookGuard<'a> {
    pub fn install(layer: &'a mut RecordLayer, hooks: SendHooks) -> Self {
        let previous = std::mem::replace(layer.hooks_mut(), hooks);
        Self {
            layer,
            previous: Some(previous),
        }
    }
}

impl Deref for HookGuard<'_> {
    type Target = RecordLayer;

    fn deref(&self) -> &RecordLayer {
        self.layer
    }
}

impl DerefMut for HookGuard<'_> {
    fn deref_mut(&mut self) -> &mut RecordLayer {
        self.layer
    }
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.layer.hooks_mut() = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};

    use test_log::test;

    use super::*;

    fn layer() -> RecordLayer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        RecordLayer::new(stream)
    }

    #[test]
    fn test_guard_restores_previous_hooks() {
        let mut layer = layer();
        let outer = SendHooks {
            mac: Some(MutationSpec::new().xor(-1, 0x01)),
            ..SendHooks::default()
        };
        *layer.hooks_mut() = outer.clone();

        {
            let mut guard = HookGuard::install(
                &mut layer,
                SendHooks {
                    ciphertext: Some(MutationSpec::new().xor(0, 0xff)),
                    ..SendHooks::default()
                },
            );
            assert!(guard.hooks_mut().mac.is_none());
            assert!(guard.hooks_mut().ciphertext.is_some());
        }
        assert_eq!(*layer.hooks_mut(), outer);
    }

    #[test]
    fn test_empty_hooks() {
        assert!(SendHooks::default().is_empty());
        let padding = SendHooks {
            padding: Some(PaddingHook::default()),
            ..SendHooks::default()
        };
        assert!(!padding.is_empty());
    }
}
