//! Nodes which build one message for the peer.
//!
//! Handshake generators append exactly what went out to the transcript in `post_send`, so a
//! fault injected into the bytes of a message is part of every hash computed afterwards.

use std::fmt;

use itertools::Itertools;
use log::debug;
use prober::codec::{Codec, Reader};
use prober::error::Error;
use prober::mutation::MutationSpec;
use prober::protocol::Generator;
use rand::Rng;
use rsa::RsaPrivateKey;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::kx::KeyShare;
use crate::crypto::rsa::{modulus, pkcs1_encrypt, pkcs1_sign, pss_sign};
use crate::crypto::{prf, tls13};
use crate::nodes::{handshake, short_hex};
use crate::protocol::{FragmentList, TlsProtocol};
use crate::state::{ConnectionState, CLIENT_HS_TRAFFIC, CLIENT_VERIFY_DATA, MASTER_SECRET_12, PREMASTER_SECRET};
use crate::tls::enums::{
    AlertDescription, AlertLevel, CipherSuite, Compression, ContentType, ExtensionType,
    HandshakeType, HeartbeatMessageType, NamedGroup, ProtocolVersion, SignatureScheme,
};
use crate::tls::extensions::Extension;
use crate::tls::handshake::{
    CertificatePayload, CertificateRequest, ClientHello, DigitallySigned, HandshakeMessage,
    PrefixedBytes, RawBody,
};
use crate::tls::message::{Alert, Heartbeat, Message};
use crate::tls::suites::{self, KeyExchange};

/// Sends any content type with any payload, protected by the current write state.
#[derive(Debug, Clone)]
pub struct RawMessageGenerator {
    pub typ: ContentType,
    pub data: Vec<u8>,
    pub description: Option<String>,
}

impl RawMessageGenerator {
    pub fn new(typ: ContentType, data: Vec<u8>) -> Self {
        Self {
            typ,
            data,
            description: None,
        }
    }

    pub fn described<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for RawMessageGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawMessageGenerator({:?}, {}", self.typ, short_hex(&self.data))?;
        if let Some(description) = &self.description {
            write!(f, ", {:?}", description)?;
        }
        write!(f, ")")
    }
}

impl Generator<TlsProtocol> for RawMessageGenerator {
    fn generate(&mut self, _state: &mut ConnectionState) -> Result<Message, Error> {
        Ok(Message::new(self.typ, self.data.clone()))
    }
}

/// One entry of the extension list of a ClientHello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelloExtension {
    /// Sent exactly as given.
    Raw(Extension),
    /// The type with an empty body.
    Empty(ExtensionType),
    /// renegotiation_info with the client verify data of the previous handshake.
    RenegotiationInfo,
    /// Fresh key shares for these groups. Their private halves are kept for the ServerHello.
    KeyShare(Vec<NamedGroup>),
}

impl HelloExtension {
    pub fn typ(&self) -> ExtensionType {
        match self {
            HelloExtension::Raw(ext) => ext.typ,
            HelloExtension::Empty(typ) => *typ,
            HelloExtension::RenegotiationInfo => ExtensionType::RenegotiationInfo,
            HelloExtension::KeyShare(_) => ExtensionType::KeyShare,
        }
    }

    fn build(&self, state: &mut ConnectionState) -> Result<Extension, Error> {
        match self {
            HelloExtension::Raw(ext) => Ok(ext.clone()),
            HelloExtension::Empty(typ) => Ok(Extension::empty(*typ)),
            HelloExtension::RenegotiationInfo => Ok(Extension::renegotiation_info(
                state.key.get(CLIENT_VERIFY_DATA)?,
            )),
            HelloExtension::KeyShare(groups) => {
                let shares = groups
                    .iter()
                    .map(|group| KeyShare::generate(*group))
                    .collect::<Result<Vec<_>, _>>()?;
                let public: Vec<_> = shares
                    .iter()
                    .map(|share| (share.group(), share.public().to_vec()))
                    .collect();
                state.key_shares = shares;
                Ok(Extension::key_share(&public))
            }
        }
    }
}

impl From<Extension> for HelloExtension {
    fn from(ext: Extension) -> Self {
        HelloExtension::Raw(ext)
    }
}

#[derive(Debug, Clone)]
pub struct ClientHelloGenerator {
    pub ciphers: Vec<CipherSuite>,
    /// `None` leaves out the extension block.
    pub extensions: Option<Vec<HelloExtension>>,
    /// Defaults to the client version of the connection.
    pub version: Option<ProtocolVersion>,
    /// Defaults to the session of the connection. A TLS 1.3 hello without one gets a random
    /// id for middlebox compatibility.
    pub session_id: Option<Vec<u8>>,
    /// Replaces the client random of the connection, which starts out as zeros.
    pub random: Option<[u8; 32]>,
    pub compression: Vec<Compression>,
}

impl ClientHelloGenerator {
    pub fn new(ciphers: Vec<CipherSuite>) -> Self {
        Self {
            ciphers,
            extensions: None,
            version: None,
            session_id: None,
            random: None,
            compression: vec![Compression::Null],
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<HelloExtension>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_session_id(mut self, session_id: Vec<u8>) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_random(mut self, random: [u8; 32]) -> Self {
        self.random = Some(random);
        self
    }

    fn offers(&self, typ: ExtensionType) -> bool {
        self.extensions
            .iter()
            .flatten()
            .any(|ext| ext.typ() == typ)
    }
}

impl fmt::Display for ClientHelloGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientHelloGenerator(ciphers=[{:?}]", self.ciphers.iter().format(", "))?;
        if let Some(version) = self.version {
            write!(f, ", version={:?}", version)?;
        }
        if let Some(extensions) = &self.extensions {
            write!(
                f,
                ", extensions=[{:?}]",
                extensions.iter().map(HelloExtension::typ).format(", ")
            )?;
        }
        if let Some(session_id) = &self.session_id {
            write!(f, ", session_id={}", short_hex(session_id))?;
        }
        write!(f, ")")
    }
}

impl Generator<TlsProtocol> for ClientHelloGenerator {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        let version = self.version.unwrap_or(state.client_version);
        if let Some(random) = self.random {
            state.client_random = random.to_vec();
        }
        if state.client_random.is_empty() {
            state.client_random = vec![0; 32];
        }
        let random: [u8; 32] = state.client_random.as_slice().try_into().map_err(|_| {
            Error::Configuration(format!(
                "a client random of {} bytes",
                state.client_random.len()
            ))
        })?;

        let session_id = match &self.session_id {
            Some(session_id) => session_id.clone(),
            None if !state.session_id.is_empty() => state.session_id.clone(),
            None if self.offers(ExtensionType::SupportedVersions) => {
                let mut session_id = vec![0u8; 32];
                rand::thread_rng().fill(session_id.as_mut_slice());
                session_id
            }
            None => Vec::new(),
        };

        let extensions = match &self.extensions {
            Some(extensions) => Some(
                extensions
                    .iter()
                    .map(|ext| ext.build(state))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        let hello = ClientHello {
            version,
            random,
            session_id,
            cipher_suites: self.ciphers.clone(),
            compression: self.compression.clone(),
            extensions,
        };
        state.client_version = version;
        Ok(HandshakeMessage::new(HandshakeType::ClientHello, &hello).into_message())
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        state.record_handshake(sent);
        Ok(())
    }
}

/// ClientKeyExchange for the RSA and ECDHE key exchanges.
///
/// With RSA the premaster secret starts with the client version and is encrypted to the key
/// of the server certificate, with `padding` applied to the PKCS#1 padding. With ECDHE the
/// share generated when the ServerKeyExchange arrived is sent.
#[derive(Debug, Clone, Default)]
pub struct ClientKeyExchangeGenerator {
    /// Defaults to the negotiated suite.
    pub cipher: Option<CipherSuite>,
    /// Version written into the premaster secret, the one of the ClientHello by default.
    pub client_version: Option<ProtocolVersion>,
    /// 48 zero bytes by default. The first two are always overwritten with the version.
    pub premaster_secret: Option<Vec<u8>>,
    pub padding: MutationSpec,
    /// Sent instead of our ECDHE share.
    pub ecdh_yc: Option<Vec<u8>>,
    /// Sent instead of the encrypted premaster secret.
    pub encrypted_premaster: Option<Vec<u8>>,
    /// Send the modulus of the server key as the encrypted premaster secret.
    pub modulus_as_encrypted_premaster: bool,
}

impl ClientKeyExchangeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn rsa(&self, state: &mut ConnectionState) -> Result<PrefixedBytes, Error> {
        if let Some(encrypted) = &self.encrypted_premaster {
            return Ok(PrefixedBytes::rsa_premaster(encrypted.clone()));
        }
        let server_key = state.server_key.as_ref().ok_or_else(|| {
            Error::Configuration("RSA key exchange without a server certificate".into())
        })?;
        let key = server_key.rsa()?;
        if self.modulus_as_encrypted_premaster {
            return Ok(PrefixedBytes::rsa_premaster(modulus(key)));
        }

        let mut premaster = self
            .premaster_secret
            .clone()
            .unwrap_or_else(|| vec![0; 48]);
        if premaster.len() < 2 {
            return Err(Error::Configuration(
                "the premaster secret must hold the client version".into(),
            ));
        }
        let version = self
            .client_version
            .unwrap_or(state.client_version)
            .get_u16()
            .to_be_bytes();
        premaster[..2].copy_from_slice(&version);

        let encrypted = pkcs1_encrypt(key, &premaster, &self.padding)?;
        state.key.insert(PREMASTER_SECRET, premaster);
        Ok(PrefixedBytes::rsa_premaster(encrypted))
    }
}

impl fmt::Display for ClientKeyExchangeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientKeyExchangeGenerator(")?;
        let mut fields = Vec::new();
        if let Some(cipher) = self.cipher {
            fields.push(format!("cipher={:?}", cipher));
        }
        if !self.padding.is_empty() {
            fields.push(format!("padding={}", self.padding));
        }
        if let Some(premaster) = &self.premaster_secret {
            fields.push(format!("premaster_secret={}", short_hex(premaster)));
        }
        if let Some(encrypted) = &self.encrypted_premaster {
            fields.push(format!("encrypted_premaster={}", short_hex(encrypted)));
        }
        if self.modulus_as_encrypted_premaster {
            fields.push("modulus_as_encrypted_premaster".to_string());
        }
        if let Some(yc) = &self.ecdh_yc {
            fields.push(format!("ecdh_yc={}", short_hex(yc)));
        }
        write!(f, "{})", fields.join(", "))
    }
}

impl Generator<TlsProtocol> for ClientKeyExchangeGenerator {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        let suite = match self.cipher {
            Some(suite) => suite,
            None => state.cipher_suite.ok_or_else(|| {
                Error::Configuration("no cipher suite to pick the key exchange".into())
            })?,
        };
        let body = match suites::lookup(suite)?.kx {
            KeyExchange::Rsa => self.rsa(state)?,
            KeyExchange::Ecdhe => {
                let public = match &self.ecdh_yc {
                    Some(public) => public.clone(),
                    None => state.client_kx_public.clone().ok_or_else(|| {
                        Error::Configuration(
                            "ECDHE key exchange before a ServerKeyExchange".into(),
                        )
                    })?,
                };
                PrefixedBytes::ecdh_point(public)
            }
            KeyExchange::Tls13 => {
                return Err(Error::Configuration(
                    "TLS 1.3 has no ClientKeyExchange".into(),
                ))
            }
        };
        Ok(HandshakeMessage::new(HandshakeType::ClientKeyExchange, &body).into_message())
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        state.record_handshake(sent);
        // the session hash of the extended master secret ends here
        state.certificate_verify_handshake_hashes = Some(state.handshake_hashes.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CertificateGenerator {
    /// DER certificates, leaf first. May be empty to decline a certificate request.
    pub certs: Vec<Vec<u8>>,
    /// Layout of the message, the negotiated version by default.
    pub version: Option<ProtocolVersion>,
}

impl CertificateGenerator {
    pub fn new(certs: Vec<Vec<u8>>) -> Self {
        Self {
            certs,
            version: None,
        }
    }
}

impl fmt::Display for CertificateGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertificateGenerator({} certificates)", self.certs.len())
    }
}

impl Generator<TlsProtocol> for CertificateGenerator {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        let version = self.version.unwrap_or(state.version);
        let payload = if version.is_tls13() {
            let context = match state.last_handshake(HandshakeType::CertificateRequest) {
                Some(message) => {
                    let request = handshake(message, HandshakeType::CertificateRequest)?;
                    let mut rd = Reader::init(&request.body);
                    CertificateRequest::read_version(&mut rd, version)
                        .and_then(|request| request.context)
                        .unwrap_or_default()
                }
                None => Vec::new(),
            };
            CertificatePayload::tls13(context, self.certs.clone())
        } else {
            CertificatePayload::tls12(self.certs.clone())
        };
        Ok(HandshakeMessage::new(HandshakeType::Certificate, &payload).into_message())
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        state.record_handshake(sent);
        Ok(())
    }
}

/// Hash and padding of the RSA signature schemes.
fn rsa_scheme(scheme: SignatureScheme) -> Option<(HashAlgorithm, bool)> {
    let params = match scheme {
        SignatureScheme::RSA_PKCS1_SHA1 => (HashAlgorithm::Sha1, false),
        SignatureScheme::RSA_PKCS1_SHA256 => (HashAlgorithm::Sha256, false),
        SignatureScheme::RSA_PKCS1_SHA384 => (HashAlgorithm::Sha384, false),
        SignatureScheme::RSA_PKCS1_SHA512 => (HashAlgorithm::Sha512, false),
        SignatureScheme::RSA_PSS_RSAE_SHA256 | SignatureScheme::RSA_PSS_PSS_SHA256 => {
            (HashAlgorithm::Sha256, true)
        }
        SignatureScheme::RSA_PSS_RSAE_SHA384 | SignatureScheme::RSA_PSS_PSS_SHA384 => {
            (HashAlgorithm::Sha384, true)
        }
        SignatureScheme::RSA_PSS_RSAE_SHA512 | SignatureScheme::RSA_PSS_PSS_SHA512 => {
            (HashAlgorithm::Sha512, true)
        }
        _ => return None,
    };
    Some(params)
}

/// CertificateVerify signed with an RSA key.
///
/// The scheme in the message defaults to the first one of the last CertificateRequest our key
/// can produce, RSA-PSS always and PKCS#1 v1.5 only before TLS 1.3. The signature can be
/// made with a different scheme or version, replaced outright, or have its padding edited
/// before the private key operation.
#[derive(Clone, Default)]
pub struct CertificateVerifyGenerator {
    pub private_key: Option<RsaPrivateKey>,
    pub msg_version: Option<ProtocolVersion>,
    pub msg_alg: Option<SignatureScheme>,
    /// Version whose rules decide what is signed, `msg_version` by default.
    pub sig_version: Option<ProtocolVersion>,
    /// Scheme the signature is really made with, `msg_alg` by default.
    pub sig_alg: Option<SignatureScheme>,
    pub signature: Option<Vec<u8>>,
    /// The digest length by default.
    pub rsa_pss_salt_len: Option<usize>,
    pub padding: MutationSpec,
    /// The hash of the scheme by default.
    pub mgf1_hash: Option<HashAlgorithm>,
}

impl fmt::Debug for CertificateVerifyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateVerifyGenerator")
            .field("has_key", &self.private_key.is_some())
            .field("msg_alg", &self.msg_alg)
            .field("sig_alg", &self.sig_alg)
            .field("padding", &self.padding)
            .finish()
    }
}

impl CertificateVerifyGenerator {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self {
            private_key: Some(private_key),
            ..Self::default()
        }
    }

    fn select_scheme(&self, offered: &[SignatureScheme], sig_version: ProtocolVersion) -> Option<SignatureScheme> {
        if self.private_key.is_none() {
            return offered.first().copied();
        }
        offered.iter().copied().find(|scheme| match rsa_scheme(*scheme) {
            Some((_, true)) => !matches!(
                scheme,
                SignatureScheme::RSA_PSS_PSS_SHA256
                    | SignatureScheme::RSA_PSS_PSS_SHA384
                    | SignatureScheme::RSA_PSS_PSS_SHA512
            ),
            Some((_, false)) => !sig_version.is_tls13(),
            None => false,
        })
    }

    fn sign(
        &self,
        state: &ConnectionState,
        scheme: SignatureScheme,
        sig_version: ProtocolVersion,
    ) -> Result<Vec<u8>, Error> {
        let key = self.private_key.as_ref().ok_or_else(|| {
            Error::Configuration("a signature needs a private key".into())
        })?;
        let (hash, pss) = rsa_scheme(scheme).ok_or_else(|| {
            Error::Configuration(format!("can not sign with {:?} using an RSA key", scheme))
        })?;

        let content = if sig_version.is_tls13() {
            tls13::certificate_verify_content(false, &state.transcript_hash()?)
        } else {
            state.handshake_hashes.messages().to_vec()
        };

        if pss {
            let mgf1_hash = self.mgf1_hash.unwrap_or(hash);
            let salt_len = self.rsa_pss_salt_len.unwrap_or_else(|| hash.output_len());
            pss_sign(key, hash, mgf1_hash, &content, salt_len, &self.padding)
        } else {
            pkcs1_sign(key, hash, &content, &self.padding)
        }
    }
}

impl fmt::Display for CertificateVerifyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertificateVerifyGenerator(")?;
        let mut fields = Vec::new();
        if let Some(alg) = self.msg_alg {
            fields.push(format!("msg_alg={:?}", alg));
        }
        if let Some(alg) = self.sig_alg {
            fields.push(format!("sig_alg={:?}", alg));
        }
        if let Some(signature) = &self.signature {
            fields.push(format!("signature={}", short_hex(signature)));
        }
        if !self.padding.is_empty() {
            fields.push(format!("padding={}", self.padding));
        }
        write!(f, "{})", fields.join(", "))
    }
}

impl Generator<TlsProtocol> for CertificateVerifyGenerator {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        let msg_version = self.msg_version.unwrap_or(state.version);
        let sig_version = self.sig_version.unwrap_or(msg_version);

        let msg_alg = match self.msg_alg {
            Some(alg) => alg,
            None => {
                let offered = match state.last_handshake(HandshakeType::CertificateRequest) {
                    Some(message) => {
                        let request = handshake(message, HandshakeType::CertificateRequest)?;
                        let mut rd = Reader::init(&request.body);
                        CertificateRequest::read_version(&mut rd, state.version)
                            .map(|request| request.schemes)
                            .unwrap_or_default()
                    }
                    None => Vec::new(),
                };
                self.select_scheme(&offered, sig_version)
                    .unwrap_or(SignatureScheme::RSA_PKCS1_SHA1)
            }
        };
        let sig_alg = self.sig_alg.unwrap_or(msg_alg);

        let signature = match &self.signature {
            Some(signature) => signature.clone(),
            None => self.sign(state, sig_alg, sig_version)?,
        };
        debug!("CertificateVerify with {:?} signed as {:?}", msg_alg, sig_alg);

        let body = DigitallySigned {
            scheme: msg_alg,
            signature,
        };
        Ok(HandshakeMessage::new(HandshakeType::CertificateVerify, &body).into_message())
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        state.record_handshake(sent);
        Ok(())
    }
}

/// ChangeCipherSpec. Before TLS 1.3 sending it switches the write state to freshly derived
/// keys, unless `fake` is set.
#[derive(Debug, Clone, Default)]
pub struct ChangeCipherSpecGenerator {
    /// Overrides whether the master secret is the extended one.
    pub extended_master_secret: Option<bool>,
    pub fake: bool,
}

impl ChangeCipherSpecGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for ChangeCipherSpecGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeCipherSpecGenerator(")?;
        if let Some(ems) = self.extended_master_secret {
            write!(f, "extended_master_secret={}", ems)?;
        }
        if self.fake {
            write!(f, "fake")?;
        }
        write!(f, ")")
    }
}

impl Generator<TlsProtocol> for ChangeCipherSpecGenerator {
    fn generate(&mut self, _state: &mut ConnectionState) -> Result<Message, Error> {
        Ok(Message::new(ContentType::ChangeCipherSpec, vec![1]))
    }

    fn post_send(&mut self, state: &mut ConnectionState, _sent: &Message) -> Result<(), Error> {
        if state.version.is_tls13() || self.fake {
            return Ok(());
        }

        // a resumed session derives its keys when the server CCS arrives
        if !state.resuming {
            let extended = self
                .extended_master_secret
                .unwrap_or(state.extended_master_secret);
            state.calc_master_secret(extended)?;
            state.calc_pending_states()?;
        }
        state.change_write_state()
    }
}

/// Python style slice bound: negative indexes count from the end, anything out of range is
/// clamped.
fn clamp(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        index.unsigned_abs().min(len)
    }
}

/// Finished, with optional truncation and padding of the verify data.
///
/// In TLS 1.3 sending it switches the write state to the application traffic keys and derives
/// the resumption master secret.
#[derive(Debug, Clone, Default)]
pub struct FinishedGenerator {
    /// Rules to compute the verify data by, the negotiated version by default.
    pub protocol: Option<ProtocolVersion>,
    pub trunc_start: isize,
    pub trunc_end: Option<isize>,
    pub pad_byte: u8,
    pub pad_left: usize,
    pub pad_right: usize,
}

impl FinishedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn verify_data(&self, state: &ConnectionState) -> Result<Vec<u8>, Error> {
        let protocol = self.protocol.unwrap_or(state.version);
        let alg = state.prf_hash()?;
        let transcript = state.transcript_hash()?;
        if protocol.is_tls13() {
            tls13::finished_verify_data(alg, state.key.get(CLIENT_HS_TRAFFIC)?, &transcript)
        } else {
            Ok(prf::finished_verify_data(
                alg,
                state.key.get(MASTER_SECRET_12)?,
                true,
                &transcript,
            ))
        }
    }
}

impl fmt::Display for FinishedGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FinishedGenerator(")?;
        let mut fields = Vec::new();
        if let Some(protocol) = self.protocol {
            fields.push(format!("protocol={:?}", protocol));
        }
        if self.trunc_start != 0 || self.trunc_end.is_some() {
            fields.push(format!("trunc={}..{:?}", self.trunc_start, self.trunc_end));
        }
        if self.pad_left != 0 || self.pad_right != 0 {
            fields.push(format!(
                "pad={}+{} of {:#04x}",
                self.pad_left, self.pad_right, self.pad_byte
            ));
        }
        write!(f, "{})", fields.join(", "))
    }
}

impl Generator<TlsProtocol> for FinishedGenerator {
    fn generate(&mut self, state: &mut ConnectionState) -> Result<Message, Error> {
        let full = self.verify_data(state)?;
        let start = clamp(self.trunc_start, full.len());
        let end = self.trunc_end.map_or(full.len(), |end| clamp(end, full.len()));

        let mut verify_data = vec![self.pad_byte; self.pad_left];
        verify_data.extend_from_slice(&full[start..end.max(start)]);
        verify_data.resize(verify_data.len() + self.pad_right, self.pad_byte);

        state.key.insert(CLIENT_VERIFY_DATA, verify_data.clone());
        Ok(HandshakeMessage::new(HandshakeType::Finished, &RawBody(verify_data)).into_message())
    }

    fn post_send(&mut self, state: &mut ConnectionState, sent: &Message) -> Result<(), Error> {
        state.record_handshake(sent);
        state.resuming = false;
        if !state.version.is_tls13() {
            return Ok(());
        }
        state.change_write_state()?;
        state.derive_resumption_secret()
    }
}

#[derive(Debug, Clone)]
pub struct AlertGenerator {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl AlertGenerator {
    pub fn new(level: AlertLevel, description: AlertDescription) -> Self {
        Self { level, description }
    }
}

impl Default for AlertGenerator {
    fn default() -> Self {
        Self::new(AlertLevel::Warning, AlertDescription::CloseNotify)
    }
}

impl fmt::Display for AlertGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AlertGenerator({:?}, {:?})", self.level, self.description)
    }
}

impl Generator<TlsProtocol> for AlertGenerator {
    fn generate(&mut self, _state: &mut ConnectionState) -> Result<Message, Error> {
        let alert = Alert {
            level: self.level,
            description: self.description,
        };
        Ok(Message::new(ContentType::Alert, alert.get_encoding()))
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationDataGenerator(pub Vec<u8>);

impl fmt::Display for ApplicationDataGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApplicationDataGenerator({})", short_hex(&self.0))
    }
}

impl Generator<TlsProtocol> for ApplicationDataGenerator {
    fn generate(&mut self, _state: &mut ConnectionState) -> Result<Message, Error> {
        Ok(Message::new(ContentType::ApplicationData, self.0.clone()))
    }
}

/// Heartbeat request or response. The padding is random and drawn once, when the node is
/// built.
#[derive(Debug, Clone)]
pub struct HeartbeatGenerator {
    pub typ: HeartbeatMessageType,
    pub payload: Vec<u8>,
    pub padding: Vec<u8>,
}

impl HeartbeatGenerator {
    pub fn new(payload: Vec<u8>) -> Self {
        Self::with_padding_len(payload, HeartbeatMessageType::Request, 16)
    }

    pub fn with_padding_len(payload: Vec<u8>, typ: HeartbeatMessageType, len: usize) -> Self {
        let mut padding = vec![0u8; len];
        rand::thread_rng().fill(padding.as_mut_slice());
        Self {
            typ,
            payload,
            padding,
        }
    }
}

impl fmt::Display for HeartbeatGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HeartbeatGenerator({:?}, {}, {} bytes of padding)",
            self.typ,
            short_hex(&self.payload),
            self.padding.len()
        )
    }
}

impl Generator<TlsProtocol> for HeartbeatGenerator {
    fn generate(&mut self, _state: &mut ConnectionState) -> Result<Message, Error> {
        let heartbeat = Heartbeat {
            typ: self.typ,
            payload: self.payload.clone(),
            padding: self.padding.clone(),
        };
        Ok(Message::new(ContentType::Heartbeat, heartbeat.get_encoding()))
    }
}

/// Sends the oldest fragment a split message left behind.
#[derive(Debug, Clone)]
pub struct PopMessageFromList(pub FragmentList);

impl fmt::Display for PopMessageFromList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PopMessageFromList")
    }
}

impl Generator<TlsProtocol> for PopMessageFromList {
    fn generate(&mut self, _state: &mut ConnectionState) -> Result<Message, Error> {
        self.0
            .pop()
            .ok_or_else(|| Error::Configuration("the fragment list is empty".into()))
    }
}

/// Sends every fragment left behind as a single message. They must share one content type.
#[derive(Debug, Clone)]
pub struct FlushMessageList(pub FragmentList);

impl fmt::Display for FlushMessageList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlushMessageList")
    }
}

impl Generator<TlsProtocol> for FlushMessageList {
    fn generate(&mut self, _state: &mut ConnectionState) -> Result<Message, Error> {
        let mut fragments = self.0.drain().into_iter();
        let mut message = fragments
            .next()
            .ok_or_else(|| Error::Configuration("the fragment list is empty".into()))?;
        for fragment in fragments {
            if fragment.typ != message.typ {
                return Err(Error::Configuration(format!(
                    "can not join {:?} and {:?} fragments",
                    message.typ, fragment.typ
                )));
            }
            message.payload.extend_from_slice(&fragment.payload);
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::Pkcs1v15Encrypt;
    use test_log::test;

    use super::*;
    use crate::crypto::cert::PeerKey;
    use crate::tls::extensions;

    const RSA_CERT: &[u8] = include_bytes!("../../assets/rsa-cert.der");

    fn private_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(include_str!("../../assets/rsa-key.pem")).unwrap()
    }

    /// Parses the body of a handshake message one of the generators built.
    fn sent_body<T: Codec>(message: &Message, typ: HandshakeType) -> T {
        let parsed = crate::nodes::handshake(message, typ).unwrap();
        crate::nodes::decode(typ, &parsed.body).unwrap()
    }

    fn negotiated(suite: CipherSuite) -> ConnectionState {
        ConnectionState {
            cipher_suite: Some(suite),
            client_random: vec![1; 32],
            server_random: vec![2; 32],
            server_key: Some(PeerKey::from_certificate(RSA_CERT).unwrap()),
            ..ConnectionState::default()
        }
    }

    #[test]
    fn test_client_hello_defaults() {
        let mut state = ConnectionState::default();
        let mut generator = ClientHelloGenerator::new(vec![CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256]);
        let message = generator.generate(&mut state).unwrap();

        let hello: ClientHello = sent_body(&message, HandshakeType::ClientHello);
        assert_eq!(hello.version, ProtocolVersion::TLSv1_2);
        assert_eq!(hello.random, [0; 32]);
        assert!(hello.session_id.is_empty());
        assert_eq!(hello.compression, vec![Compression::Null]);
        assert_eq!(hello.extensions, None);
        assert_eq!(state.client_random, vec![0; 32]);

        // nothing is hashed until the message went out
        assert!(state.handshake_hashes.is_empty());
        generator.post_send(&mut state, &message).unwrap();
        assert_eq!(state.handshake_hashes.messages(), message.payload.as_slice());
    }

    #[test]
    fn test_raw_message_and_session_id() {
        let mut state = ConnectionState::default();
        let mut raw = RawMessageGenerator::new(ContentType::Heartbeat, vec![1, 2]).described("short");
        assert_eq!(raw.to_string(), "RawMessageGenerator(Heartbeat, 0102, \"short\")");
        assert_eq!(raw.generate(&mut state).unwrap().payload, vec![1, 2]);

        let mut generator = ClientHelloGenerator::new(vec![CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA])
            .with_session_id(vec![5; 8]);
        let message = generator.generate(&mut state).unwrap();
        let hello: ClientHello = sent_body(&message, HandshakeType::ClientHello);
        assert_eq!(hello.session_id, vec![5; 8]);
    }

    #[test]
    fn test_client_hello_for_tls13() {
        let mut state = ConnectionState::default();
        let mut generator = ClientHelloGenerator::new(vec![CipherSuite::TLS13_AES_128_GCM_SHA256])
            .with_extensions(vec![
                Extension::supported_versions(&[ProtocolVersion::TLSv1_3]).into(),
                HelloExtension::KeyShare(vec![NamedGroup::X25519]),
                HelloExtension::RenegotiationInfo,
            ])
            .with_random([9; 32]);
        let message = generator.generate(&mut state).unwrap();

        let hello: ClientHello = sent_body(&message, HandshakeType::ClientHello);
        assert_eq!(hello.session_id.len(), 32);
        assert_eq!(state.client_random, vec![9; 32]);
        assert_eq!(state.key_shares.len(), 1);

        let extensions = hello.extensions.unwrap();
        let key_share = extensions::find(&extensions, ExtensionType::KeyShare).unwrap();
        assert_eq!(&key_share.data[2..4], &[0x00, 0x1d]);
        assert_eq!(&key_share.data[6..], state.key_shares[0].public());
        let reneg = extensions::find(&extensions, ExtensionType::RenegotiationInfo).unwrap();
        assert_eq!(reneg.data, vec![0]);
    }

    #[test]
    fn test_rsa_client_key_exchange() {
        let mut state = negotiated(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        let mut generator = ClientKeyExchangeGenerator::new();
        let message = generator.generate(&mut state).unwrap();

        let parsed = crate::nodes::handshake(&message, HandshakeType::ClientKeyExchange).unwrap();
        let encrypted = PrefixedBytes::read(&mut Reader::init(&parsed.body)).unwrap();
        assert_eq!(encrypted.bytes.len(), 256);

        let premaster = private_key().decrypt(Pkcs1v15Encrypt, &encrypted.bytes).unwrap();
        let mut expected = vec![0x03, 0x03];
        expected.resize(48, 0);
        assert_eq!(premaster, expected);
        assert_eq!(state.key.get(PREMASTER_SECRET).unwrap(), expected.as_slice());

        generator.post_send(&mut state, &message).unwrap();
        assert_eq!(
            state
                .certificate_verify_handshake_hashes
                .as_ref()
                .map(|hh| hh.messages().to_vec()),
            Some(message.payload.clone())
        );
    }

    #[test]
    fn test_client_key_exchange_overrides() {
        let mut state = negotiated(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let mut generator = ClientKeyExchangeGenerator {
            encrypted_premaster: Some(vec![0xaa; 4]),
            ..ClientKeyExchangeGenerator::default()
        };
        let message = generator.generate(&mut state).unwrap();
        assert_eq!(&message.payload[4..], &[0x00, 0x04, 0xaa, 0xaa, 0xaa, 0xaa]);
        assert!(!state.key.contains(PREMASTER_SECRET));

        let mut modulus_generator = ClientKeyExchangeGenerator {
            modulus_as_encrypted_premaster: true,
            ..ClientKeyExchangeGenerator::default()
        };
        let message = modulus_generator.generate(&mut state).unwrap();
        assert_eq!(&message.payload[6..], modulus(&private_key().to_public_key()).as_slice());

        let mut ecdhe = ClientKeyExchangeGenerator::new();
        state.cipher_suite = Some(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256);
        assert!(ecdhe.generate(&mut state).unwrap_err().is_programmer_error());
        state.client_kx_public = Some(vec![4; 65]);
        let message = ecdhe.generate(&mut state).unwrap();
        assert_eq!(message.payload[4], 65);
    }

    #[test]
    fn test_certificate_verify_signature() {
        let mut state = negotiated(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        state.record_handshake(&Message::new(ContentType::Handshake, vec![0x01, 0, 0, 1, 0]));
        // a request which offers PKCS#1 v1.5 first
        let mut request = vec![0x0d, 0, 0, 9, 1, 1, 0, 4, 0x04, 0x01, 0x08, 0x04, 0, 0];
        request[3] = (request.len() - 4) as u8;
        state.record_handshake(&Message::new(ContentType::Handshake, request));

        let mut generator = CertificateVerifyGenerator::new(private_key());
        let message = generator.generate(&mut state).unwrap();
        let signed: DigitallySigned = sent_body(&message, HandshakeType::CertificateVerify);
        assert_eq!(signed.scheme, SignatureScheme::RSA_PKCS1_SHA256);

        let peer = state.server_key.clone().unwrap();
        peer.verify(
            signed.scheme,
            state.handshake_hashes.messages(),
            &signed.signature,
        )
        .unwrap();
    }

    #[test]
    fn test_certificate_verify_without_key() {
        let mut state = negotiated(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        let mut generator = CertificateVerifyGenerator::default();
        assert!(generator.generate(&mut state).unwrap_err().is_programmer_error());

        let mut explicit = CertificateVerifyGenerator {
            signature: Some(vec![1, 2, 3]),
            msg_alg: Some(SignatureScheme::RSA_PSS_RSAE_SHA256),
            ..CertificateVerifyGenerator::default()
        };
        let message = explicit.generate(&mut state).unwrap();
        assert_eq!(&message.payload[4..], &[0x08, 0x04, 0x00, 0x03, 1, 2, 3]);
    }

    #[test]
    fn test_finished_truncation_and_padding() {
        let mut state = negotiated(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        state.key.insert(MASTER_SECRET_12, vec![5; 48]);
        let full = FinishedGenerator::new()
            .generate(&mut state)
            .unwrap();
        assert_eq!(full.payload.len(), 4 + 12);

        let mut generator = FinishedGenerator {
            trunc_end: Some(-1),
            pad_byte: 0xff,
            pad_left: 2,
            ..FinishedGenerator::default()
        };
        let message = generator.generate(&mut state).unwrap();
        assert_eq!(message.payload[3], 13);
        assert_eq!(&message.payload[4..6], &[0xff, 0xff]);
        assert_eq!(&message.payload[6..], &full.payload[4..15]);
        assert_eq!(state.key.get(CLIENT_VERIFY_DATA).unwrap(), &message.payload[4..]);

        assert_eq!(clamp(-20, 12), 0);
        assert_eq!(clamp(20, 12), 12);
    }

    #[test]
    fn test_change_cipher_spec_switches_keys() {
        let mut state = negotiated(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        state.key.insert(PREMASTER_SECRET, vec![3; 48]);
        let mut generator = ChangeCipherSpecGenerator::new();
        let message = generator.generate(&mut state).unwrap();
        assert_eq!(message.payload, vec![1]);

        // keys are derived, the switch itself needs a connection
        let err = generator.post_send(&mut state, &message).unwrap_err();
        assert!(err.is_programmer_error());
        assert!(state.key.contains(MASTER_SECRET_12));

        let mut fake = ChangeCipherSpecGenerator {
            fake: true,
            ..ChangeCipherSpecGenerator::default()
        };
        assert!(fake.post_send(&mut state, &message).is_ok());
    }

    #[test]
    fn test_fragment_lists() {
        let list = FragmentList::new();
        list.push(Message::new(ContentType::Handshake, vec![1, 2]));
        list.push(Message::new(ContentType::Handshake, vec![3]));
        let mut state = ConnectionState::default();

        let mut flush = FlushMessageList(list.clone());
        assert_eq!(flush.generate(&mut state).unwrap().payload, vec![1, 2, 3]);
        assert!(flush.generate(&mut state).unwrap_err().is_programmer_error());

        list.push(Message::new(ContentType::Handshake, vec![1]));
        list.push(Message::new(ContentType::Alert, vec![1, 0]));
        assert!(flush.generate(&mut state).is_err());

        list.push(Message::new(ContentType::Alert, vec![2, 40]));
        let mut pop = PopMessageFromList(list);
        assert_eq!(pop.generate(&mut state).unwrap().typ, ContentType::Alert);
    }

    #[test]
    fn test_alert_and_heartbeat() {
        let mut state = ConnectionState::default();
        let alert = AlertGenerator::default().generate(&mut state).unwrap();
        assert_eq!(alert.payload, vec![1, 0]);

        let heartbeat = HeartbeatGenerator::new(vec![7; 3])
            .generate(&mut state)
            .unwrap();
        assert_eq!(heartbeat.payload.len(), 1 + 2 + 3 + 16);
    }
}
