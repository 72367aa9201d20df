//! The TLS node catalogue.
//!
//! Commands change the connection without talking to the peer, generators build one message
//! each and expectations check one inbound event. The [`mutators`] wrap generators to inject
//! faults into what they send.

use prober::codec::Codec;
use prober::error::Error;

use crate::tls::enums::HandshakeType;
use crate::tls::handshake::HandshakeMessage;
use crate::tls::message::Message;

pub mod commands;
pub mod expect;
pub mod generators;
pub mod mutators;

/// The handshake message of type `typ` which `message` carries.
pub(crate) fn handshake(message: &Message, typ: HandshakeType) -> Result<HandshakeMessage, Error> {
    let parsed = HandshakeMessage::from_message(message)
        .ok_or_else(|| Error::Codec(format!("malformed {:?} message", typ)))?;
    if parsed.typ != typ {
        return Err(Error::Protocol(format!(
            "expected {:?}, got {:?}",
            typ, parsed.typ
        )));
    }
    Ok(parsed)
}

/// Reads a `T` which must span all of `body`.
pub(crate) fn decode<T: Codec>(typ: HandshakeType, body: &[u8]) -> Result<T, Error> {
    T::read_bytes(body).ok_or_else(|| Error::Codec(format!("malformed {:?} body", typ)))
}

/// Writes `bytes` in a short form for node descriptions.
pub(crate) fn short_hex(bytes: &[u8]) -> String {
    const SHOWN: usize = 16;
    if bytes.len() > SHOWN {
        format!("{}..({} bytes)", hex::encode(&bytes[..SHOWN]), bytes.len())
    } else {
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tls::enums::ContentType;

    #[test]
    fn test_handshake_type_is_checked() {
        let done = Message::new(ContentType::Handshake, vec![0x0e, 0, 0, 0]);
        assert!(handshake(&done, HandshakeType::ServerHelloDone).is_ok());
        assert!(matches!(
            handshake(&done, HandshakeType::Finished),
            Err(Error::Protocol(_))
        ));

        let truncated = Message::new(ContentType::Handshake, vec![0x14, 0, 0, 12, 1]);
        assert!(matches!(
            handshake(&truncated, HandshakeType::Finished),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xab, 0x01]), "ab01");
        assert_eq!(
            short_hex(&[0u8; 20]),
            format!("{}..(20 bytes)", "00".repeat(16))
        );
    }
}
