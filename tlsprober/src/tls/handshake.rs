//! Handshake messages and the bodies of the ones conversations build or inspect.

use prober::codec::{
    encode_prefixed, encode_vec_u16, encode_vec_u8, read_vec_u16, read_vec_u8, u24, Codec,
    Reader,
};

use crate::tls::enums::{
    CipherSuite, Compression, ContentType, ECCurveType, ExtensionType, HandshakeType,
    NamedGroup, ProtocolVersion, SignatureScheme,
};
use crate::tls::extensions::{self, Extension};
use crate::tls::message::Message;

/// Random of a ServerHello which is really a HelloRetryRequest.
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8, 0x91,
    0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8, 0x33, 0x9c,
];

/// Upper bound for certificate chains we parse.
const MAX_CERTIFICATE_LIST: usize = 0x4_0000;

/// A handshake message with a typed header and an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub typ: HandshakeType,
    pub body: Vec<u8>,
}

impl Codec for HandshakeMessage {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        encode_prefixed(bytes, 3, |out| out.extend_from_slice(&self.body));
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let typ = HandshakeType::read(r)?;
        let len = usize::from(u24::read(r)?);
        let body = r.take(len)?.to_vec();
        Some(Self { typ, body })
    }
}

impl HandshakeMessage {
    pub fn new<C: Codec>(typ: HandshakeType, body: &C) -> Self {
        Self {
            typ,
            body: body.get_encoding(),
        }
    }

    pub fn from_message(message: &Message) -> Option<Self> {
        match message.typ {
            ContentType::Handshake => Self::read_bytes(&message.payload),
            _ => None,
        }
    }

    pub fn into_message(self) -> Message {
        Message::new(ContentType::Handshake, self.get_encoding())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub version: ProtocolVersion,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression: Vec<Compression>,
    /// `None` leaves out the extensions block entirely, as SSLv3 era clients do.
    pub extensions: Option<Vec<Extension>>,
}

impl Codec for ClientHello {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.version.encode(bytes);
        bytes.extend_from_slice(&self.random);
        encode_prefixed(bytes, 1, |out| out.extend_from_slice(&self.session_id));
        encode_vec_u16(bytes, &self.cipher_suites);
        encode_vec_u8(bytes, &self.compression);
        if let Some(extensions) = &self.extensions {
            encode_vec_u16(bytes, extensions);
        }
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let version = ProtocolVersion::read(r)?;
        let random = r.take(32)?.try_into().ok()?;
        let session_id_len = usize::from(u8::read(r)?);
        let session_id = r.take(session_id_len)?.to_vec();
        let cipher_suites = read_vec_u16(r)?;
        let compression = read_vec_u8(r)?;
        let extensions = if r.any_left() {
            Some(read_vec_u16(r)?)
        } else {
            None
        };
        Some(Self {
            version,
            random,
            session_id,
            cipher_suites,
            compression,
            extensions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version: ProtocolVersion,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub compression: Compression,
    pub extensions: Vec<Extension>,
}

impl Codec for ServerHello {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.version.encode(bytes);
        bytes.extend_from_slice(&self.random);
        encode_prefixed(bytes, 1, |out| out.extend_from_slice(&self.session_id));
        self.cipher_suite.encode(bytes);
        self.compression.encode(bytes);
        if !self.extensions.is_empty() {
            encode_vec_u16(bytes, &self.extensions);
        }
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let version = ProtocolVersion::read(r)?;
        let random = r.take(32)?.try_into().ok()?;
        let session_id_len = usize::from(u8::read(r)?);
        let session_id = r.take(session_id_len)?.to_vec();
        let cipher_suite = CipherSuite::read(r)?;
        let compression = Compression::read(r)?;
        let extensions = if r.any_left() {
            read_vec_u16(r)?
        } else {
            Vec::new()
        };
        Some(Self {
            version,
            random,
            session_id,
            cipher_suite,
            compression,
            extensions,
        })
    }
}

impl ServerHello {
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }

    pub fn extension(&self, typ: ExtensionType) -> Option<&Extension> {
        extensions::find(&self.extensions, typ)
    }

    /// The version the server picked, taking supported_versions into account.
    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        match self.extension(ExtensionType::SupportedVersions) {
            Some(ext) => extensions::parse_selected_version(&ext.data),
            None => Some(self.version),
        }
    }
}

/// Certificate chain, in the TLS 1.2 layout or the TLS 1.3 one with a request context and
/// per certificate extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePayload {
    pub context: Option<Vec<u8>>,
    pub certificates: Vec<Vec<u8>>,
}

impl CertificatePayload {
    pub fn tls12(certificates: Vec<Vec<u8>>) -> Self {
        Self {
            context: None,
            certificates,
        }
    }

    pub fn tls13(context: Vec<u8>, certificates: Vec<Vec<u8>>) -> Self {
        Self {
            context: Some(context),
            certificates,
        }
    }

    pub fn read_version(r: &mut Reader, version: ProtocolVersion) -> Option<Self> {
        let context = if version.is_tls13() {
            let len = usize::from(u8::read(r)?);
            Some(r.take(len)?.to_vec())
        } else {
            None
        };

        let len = usize::from(u24::read(r)?);
        if len > MAX_CERTIFICATE_LIST {
            return None;
        }
        let mut list = r.sub(len)?;
        let mut certificates = Vec::new();
        while list.any_left() {
            let cert_len = usize::from(u24::read(&mut list)?);
            certificates.push(list.take(cert_len)?.to_vec());
            if context.is_some() {
                let ext_len = usize::from(u16::read(&mut list)?);
                list.take(ext_len)?;
            }
        }
        Some(Self {
            context,
            certificates,
        })
    }
}

impl Codec for CertificatePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        if let Some(context) = &self.context {
            encode_prefixed(bytes, 1, |out| out.extend_from_slice(context));
        }
        encode_prefixed(bytes, 3, |list| {
            for cert in &self.certificates {
                encode_prefixed(list, 3, |out| out.extend_from_slice(cert));
                if self.context.is_some() {
                    0u16.encode(list);
                }
            }
        });
    }

    /// Reads the TLS 1.2 layout, see [`CertificatePayload::read_version`].
    fn read(r: &mut Reader) -> Option<Self> {
        Self::read_version(r, ProtocolVersion::TLSv1_2)
    }
}

/// Named curve parameters of an ECDHE ServerKeyExchange together with the signature over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdheServerKeyExchange {
    pub group: NamedGroup,
    pub public: Vec<u8>,
    /// The parameters exactly as received, they are what the signature covers.
    pub params: Vec<u8>,
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
}

impl Codec for EcdheServerKeyExchange {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.params);
        self.scheme.encode(bytes);
        encode_prefixed(bytes, 2, |out| out.extend_from_slice(&self.signature));
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let mut params = Reader::init(r.peek(r.left())?);
        if ECCurveType::read(&mut params)? != ECCurveType::NamedCurve {
            return None;
        }
        let group = NamedGroup::read(&mut params)?;
        let len = usize::from(u8::read(&mut params)?);
        let public = params.take(len)?.to_vec();
        let params = r.take(params.used())?.to_vec();

        let scheme = SignatureScheme::read(r)?;
        let len = usize::from(u16::read(r)?);
        let signature = r.take(len)?.to_vec();
        Some(Self {
            group,
            public,
            params,
            scheme,
            signature,
        })
    }
}

impl EcdheServerKeyExchange {
    pub fn params(group: NamedGroup, public: &[u8]) -> Vec<u8> {
        let mut params = Vec::new();
        ECCurveType::NamedCurve.encode(&mut params);
        group.encode(&mut params);
        encode_prefixed(&mut params, 1, |out| out.extend_from_slice(public));
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub context: Option<Vec<u8>>,
    pub certificate_types: Vec<u8>,
    pub schemes: Vec<SignatureScheme>,
}

impl CertificateRequest {
    pub fn read_version(r: &mut Reader, version: ProtocolVersion) -> Option<Self> {
        if version.is_tls13() {
            let len = usize::from(u8::read(r)?);
            let context = r.take(len)?.to_vec();
            let extensions: Vec<Extension> = read_vec_u16(r)?;
            let schemes = extensions::find(
                &extensions,
                ExtensionType::SignatureAlgorithms,
            )
            .and_then(|ext| extensions::parse_signature_algorithms(&ext.data))
            .unwrap_or_default();
            return Some(Self {
                context: Some(context),
                certificate_types: Vec::new(),
                schemes,
            });
        }

        let certificate_types = read_vec_u8(r)?;
        let schemes = read_vec_u16(r)?;
        let len = usize::from(u16::read(r)?);
        r.take(len)?;
        Some(Self {
            context: None,
            certificate_types,
            schemes,
        })
    }
}

/// Body of a CertificateVerify, and the signed tail of other messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    pub scheme: SignatureScheme,
    pub signature: Vec<u8>,
}

impl Codec for DigitallySigned {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.scheme.encode(bytes);
        encode_prefixed(bytes, 2, |out| out.extend_from_slice(&self.signature));
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let scheme = SignatureScheme::read(r)?;
        let len = usize::from(u16::read(r)?);
        let signature = r.take(len)?.to_vec();
        Some(Self { scheme, signature })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket {
    pub lifetime: u32,
    pub age_add: u32,
    pub nonce: Vec<u8>,
    pub ticket: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl Codec for NewSessionTicket {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.lifetime.encode(bytes);
        self.age_add.encode(bytes);
        encode_prefixed(bytes, 1, |out| out.extend_from_slice(&self.nonce));
        encode_prefixed(bytes, 2, |out| out.extend_from_slice(&self.ticket));
        encode_vec_u16(bytes, &self.extensions);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let lifetime = u32::read(r)?;
        let age_add = u32::read(r)?;
        let len = usize::from(u8::read(r)?);
        let nonce = r.take(len)?.to_vec();
        let len = usize::from(u16::read(r)?);
        let ticket = r.take(len)?.to_vec();
        let extensions = read_vec_u16(r)?;
        Some(Self {
            lifetime,
            age_add,
            nonce,
            ticket,
            extensions,
        })
    }
}

/// Opaque byte strings with a length prefix of the given width, as used by the
/// ClientKeyExchange variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixedBytes {
    pub width: usize,
    pub bytes: Vec<u8>,
}

impl PrefixedBytes {
    /// Encrypted premaster secret of an RSA key exchange.
    pub fn rsa_premaster(bytes: Vec<u8>) -> Self {
        Self { width: 2, bytes }
    }

    /// Public point of an ECDHE key exchange.
    pub fn ecdh_point(bytes: Vec<u8>) -> Self {
        Self { width: 1, bytes }
    }
}

impl Codec for PrefixedBytes {
    fn encode(&self, bytes: &mut Vec<u8>) {
        encode_prefixed(bytes, self.width, |out| out.extend_from_slice(&self.bytes));
    }

    /// Reads a two byte prefix.
    fn read(r: &mut Reader) -> Option<Self> {
        let len = usize::from(u16::read(r)?);
        Some(Self::rsa_premaster(r.take(len)?.to_vec()))
    }
}

/// Finished and other bodies which are nothing but their bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBody(pub Vec<u8>);

impl Codec for RawBody {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        Some(Self(r.rest().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_client_hello_layout() {
        let hello = ClientHello {
            version: ProtocolVersion::TLSv1_2,
            random: [7; 32],
            session_id: vec![],
            cipher_suites: vec![CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256],
            compression: vec![Compression::Null],
            extensions: None,
        };
        let message = HandshakeMessage::new(HandshakeType::ClientHello, &hello).into_message();
        // header, version, random, session id, suites, compression
        assert_eq!(message.payload.len(), 4 + 2 + 32 + 1 + 4 + 2);
        assert_eq!(&message.payload[..4], &[0x01, 0x00, 0x00, 0x29]);
        assert_eq!(&message.payload[39..43], &[0x00, 0x02, 0x00, 0x9c]);

        let parsed = HandshakeMessage::from_message(&message).unwrap();
        assert_eq!(ClientHello::read_bytes(&parsed.body), Some(hello));
    }

    #[test]
    fn test_server_hello_version() {
        let mut hello = ServerHello {
            version: ProtocolVersion::TLSv1_2,
            random: [1; 32],
            session_id: vec![9; 32],
            cipher_suite: CipherSuite::TLS13_AES_128_GCM_SHA256,
            compression: Compression::Null,
            extensions: vec![],
        };
        assert_eq!(hello.negotiated_version(), Some(ProtocolVersion::TLSv1_2));
        hello.extensions.push(Extension::new(
            ExtensionType::SupportedVersions,
            vec![0x03, 0x04],
        ));
        assert_eq!(hello.negotiated_version(), Some(ProtocolVersion::TLSv1_3));
        assert!(!hello.is_hello_retry_request());
    }

    #[test]
    fn test_certificate_layouts() {
        let chain = vec![vec![0xde, 0xad], vec![0xbe, 0xef, 0x00]];
        let tls12 = CertificatePayload::tls12(chain.clone()).get_encoding();
        assert_eq!(&tls12[..3], &[0, 0, 11]);

        let tls13 = CertificatePayload::tls13(vec![], chain.clone()).get_encoding();
        assert_eq!(&tls13[..4], &[0, 0, 0, 15]);
        let parsed =
            CertificatePayload::read_version(&mut Reader::init(&tls13), ProtocolVersion::TLSv1_3)
                .unwrap();
        assert_eq!(parsed.certificates, chain);
    }

    #[test]
    fn test_server_key_exchange_keeps_signed_params() {
        let params = EcdheServerKeyExchange::params(NamedGroup::X25519, &[5; 32]);
        let mut body = params.clone();
        DigitallySigned {
            scheme: SignatureScheme::RSA_PSS_RSAE_SHA256,
            signature: vec![1, 2, 3],
        }
        .encode(&mut body);

        let ske = EcdheServerKeyExchange::read_bytes(&body).unwrap();
        assert_eq!(ske.params, params);
        assert_eq!(ske.public, vec![5; 32]);
        assert_eq!(ske.group, NamedGroup::X25519);
        assert_eq!(ske.signature, vec![1, 2, 3]);
    }
}
