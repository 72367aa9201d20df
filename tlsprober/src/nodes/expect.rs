//! Nodes which check one inbound event.
//!
//! `is_match` only looks at the content type and the handshake type. Everything else is
//! checked in `process`, where a mismatch fails the conversation instead of routing to an
//! alternate.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use log::{debug, info};
use prober::codec::{read_vec_u16, Codec, Reader};
use prober::error::Error;
use prober::protocol::{Expect, Inbound};

use crate::crypto::cert::PeerKey;
use crate::crypto::kx::KeyShare;
use crate::crypto::{prf, tls13};
use crate::nodes::{decode, handshake, short_hex};
use crate::protocol::TlsProtocol;
use crate::state::{
    ConnectionState, CLIENT_VERIFY_DATA, DH_SHARED_SECRET, MASTER_SECRET_12, PREMASTER_SECRET,
    SERVER_HS_TRAFFIC, SERVER_VERIFY_DATA, SH_KEY_SHARE, SKE_KEY_SHARE,
};
use crate::tls::enums::{
    AlertDescription, AlertLevel, CipherSuite, ContentType, ExtensionType, HandshakeType,
    HeartbeatMessageType, ProtocolVersion, SignatureScheme,
};
use crate::tls::extensions::{self, Extension};
use crate::tls::handshake::{
    CertificatePayload, CertificateRequest, ClientHello, DigitallySigned,
    EcdheServerKeyExchange, NewSessionTicket, RawBody, ServerHello,
};
use crate::tls::message::{Heartbeat, Message, MAX_FRAGMENT_LEN};
use crate::tls::suites::KeyExchange;

type TlsInbound = Inbound<Message>;

fn is_handshake(inbound: &TlsInbound, typ: HandshakeType) -> bool {
    inbound.message().map_or(false, |message| message.is_handshake(typ))
}

fn is_content(inbound: &TlsInbound, typ: ContentType) -> bool {
    inbound.message().map_or(false, |message| message.typ == typ)
}

fn received(inbound: &TlsInbound) -> Result<&Message, Error> {
    inbound
        .message()
        .ok_or_else(|| Error::Protocol("the connection is closed".into()))
}

/// Body of the handshake message of type `typ` which `inbound` carries.
fn body(inbound: &TlsInbound, typ: HandshakeType) -> Result<Vec<u8>, Error> {
    Ok(handshake(received(inbound)?, typ)?.body)
}

fn types(extensions: &[Extension]) -> BTreeSet<ExtensionType> {
    extensions.iter().map(|ext| ext.typ).collect()
}

fn check_extension_types(
    message: HandshakeType,
    expected: &Option<Vec<ExtensionType>>,
    extensions: &[Extension],
) -> Result<(), Error> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let got = types(extensions);
    let wanted: BTreeSet<_> = expected.iter().copied().collect();
    if got != wanted {
        return Err(Error::Protocol(format!(
            "{:?} with extensions [{:?}], expected [{:?}]",
            message,
            got.iter().format(", "),
            wanted.iter().format(", ")
        )));
    }
    Ok(())
}

/// Largest plaintext the peer accepts according to its record_size_limit extension.
fn record_size_limit(ext: &Extension, tls13: bool) -> Result<usize, Error> {
    let limit = extensions::parse_record_size_limit(&ext.data)
        .ok_or_else(|| Error::Codec("malformed record_size_limit".into()))?;
    if limit < 64 {
        return Err(Error::Protocol(format!(
            "record_size_limit of {} is below the minimum of 64",
            limit
        )));
    }
    // the TLS 1.3 limit covers the inner content type too
    Ok(usize::from(limit).min(MAX_FRAGMENT_LEN + usize::from(tls13)))
}

/// ServerHello, and with it the negotiated version, suite and session.
///
/// The server may only answer extensions the last ClientHello offered, with the exception of
/// renegotiation_info when the hello carried the signalling suite instead. A HelloRetryRequest
/// fails the conversation.
#[derive(Debug, Clone, Default)]
pub struct ExpectServerHello {
    /// Exact set of extension types the hello must carry.
    pub extensions: Option<Vec<ExtensionType>>,
    pub version: Option<ProtocolVersion>,
    pub cipher: Option<CipherSuite>,
    /// Fail unless the server resumes the session.
    pub resume: bool,
}

impl ExpectServerHello {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(mut self, extensions: Vec<ExtensionType>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn resumed(mut self) -> Self {
        self.resume = true;
        self
    }

    fn check_solicited(state: &ConnectionState, hello: &ServerHello) -> Result<(), Error> {
        let Some(sent) = state.last_handshake(HandshakeType::ClientHello) else {
            return Ok(());
        };
        let client_hello: ClientHello = decode(
            HandshakeType::ClientHello,
            &handshake(sent, HandshakeType::ClientHello)?.body,
        )?;

        if !client_hello.cipher_suites.contains(&hello.cipher_suite) {
            return Err(Error::Protocol(format!(
                "server selected {:?} which was not offered",
                hello.cipher_suite
            )));
        }

        let offered = types(client_hello.extensions.as_deref().unwrap_or_default());
        let scsv = client_hello
            .cipher_suites
            .contains(&CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);
        match hello.extensions.iter().find(|ext| {
            !offered.contains(&ext.typ) && !(scsv && ext.typ == ExtensionType::RenegotiationInfo)
        }) {
            Some(ext) => Err(Error::Protocol(format!(
                "server sent the unsolicited extension {:?}",
                ext.typ
            ))),
            None => Ok(()),
        }
    }

    fn process_extensions(
        state: &mut ConnectionState,
        hello: &ServerHello,
        tls13: bool,
    ) -> Result<(), Error> {
        if hello.extension(ExtensionType::EncryptThenMac).is_some() {
            return Err(Error::Configuration(
                "the server selected encrypt_then_mac which is not supported".into(),
            ));
        }

        if !state.resuming {
            state.extended_master_secret =
                hello.extension(ExtensionType::ExtendedMasterSecret).is_some();
        }

        if let Some(ext) = hello.extension(ExtensionType::RenegotiationInfo) {
            let got = extensions::parse_renegotiation_info(&ext.data)
                .ok_or_else(|| Error::Codec("malformed renegotiation_info".into()))?;
            let expected = [
                state.key.get(CLIENT_VERIFY_DATA)?,
                state.key.get(SERVER_VERIFY_DATA)?,
            ]
            .concat();
            if got != expected {
                return Err(Error::Protocol(format!(
                    "renegotiation_info is {}, expected {}",
                    short_hex(&got),
                    short_hex(&expected)
                )));
            }
        }

        if let Some(ext) = hello.extension(ExtensionType::RecordSizeLimit) {
            state.send_record_limit = record_size_limit(ext, tls13)?;
        }

        if let Some(ext) = hello.extension(ExtensionType::KeyShare) {
            let (group, public) = extensions::parse_server_key_share(&ext.data)
                .ok_or_else(|| Error::Codec("malformed server key_share".into()))?;
            let shared = state.agree(group, &public)?;
            state.key.insert(SH_KEY_SHARE, public);
            state.key.insert(DH_SHARED_SECRET, shared);
        }
        Ok(())
    }
}

impl fmt::Display for ExpectServerHello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectServerHello(")?;
        let mut fields = Vec::new();
        if let Some(version) = self.version {
            fields.push(format!("version={:?}", version));
        }
        if let Some(cipher) = self.cipher {
            fields.push(format!("cipher={:?}", cipher));
        }
        if let Some(extensions) = &self.extensions {
            fields.push(format!("extensions=[{:?}]", extensions.iter().format(", ")));
        }
        if self.resume {
            fields.push("resume".to_string());
        }
        write!(f, "{})", fields.join(", "))
    }
}

impl Expect<TlsProtocol> for ExpectServerHello {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::ServerHello)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let message = received(inbound)?;
        let hello: ServerHello = decode(
            HandshakeType::ServerHello,
            &handshake(message, HandshakeType::ServerHello)?.body,
        )?;
        if hello.is_hello_retry_request() {
            return Err(Error::Protocol(
                "server answered with a HelloRetryRequest".into(),
            ));
        }

        let version = hello
            .negotiated_version()
            .ok_or_else(|| Error::Codec("malformed supported_versions".into()))?;
        if let Some(expected) = self.version {
            if version != expected {
                return Err(Error::Protocol(format!(
                    "server negotiated {:?}, expected {:?}",
                    version, expected
                )));
            }
        }
        if let Some(expected) = self.cipher {
            if hello.cipher_suite != expected {
                return Err(Error::Protocol(format!(
                    "server selected {:?}, expected {:?}",
                    hello.cipher_suite, expected
                )));
            }
        }
        Self::check_solicited(state, &hello)?;
        check_extension_types(HandshakeType::ServerHello, &self.extensions, &hello.extensions)?;

        let tls13 = version.is_tls13();
        state.resuming = !tls13
            && !hello.session_id.is_empty()
            && hello.session_id == state.session_id;
        if state.resuming {
            if state.cipher_suite != Some(hello.cipher_suite) {
                return Err(Error::Protocol(format!(
                    "session resumed with {:?} instead of {:?}",
                    hello.cipher_suite, state.cipher_suite
                )));
            }
            info!("server resumed session {}", short_hex(&hello.session_id));
        } else if self.resume {
            return Err(Error::Protocol("server did not resume the session".into()));
        }

        state.version = version;
        state.cipher_suite = Some(hello.cipher_suite);
        state.server_random = hello.random.to_vec();
        state.session_id = hello.session_id.clone();
        Self::process_extensions(state, &hello, tls13)?;
        state.record_handshake(message);

        if let Some(layer) = state.layer.as_mut() {
            layer.set_version(hello.version);
        }
        debug!("negotiated {:?} with {:?}", version, hello.cipher_suite);
        if tls13 {
            state.derive_handshake_secrets()?;
        }
        Ok(())
    }
}

/// Certificate. The key of the leaf is what later signatures are checked with.
#[derive(Debug, Clone, Default)]
pub struct ExpectCertificate;

impl fmt::Display for ExpectCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectCertificate")
    }
}

impl Expect<TlsProtocol> for ExpectCertificate {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::Certificate)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let body = body(inbound, HandshakeType::Certificate)?;
        let mut rd = Reader::init(&body);
        let payload = CertificatePayload::read_version(&mut rd, state.version)
            .filter(|_| !rd.any_left())
            .ok_or_else(|| Error::Codec("malformed Certificate".into()))?;
        let leaf = payload
            .certificates
            .first()
            .ok_or_else(|| Error::Protocol("server sent an empty certificate chain".into()))?;
        state.server_key = Some(PeerKey::from_certificate(leaf)?);
        state.record_handshake(received(inbound)?);
        Ok(())
    }
}

/// ECDHE ServerKeyExchange. The signature must verify with the certificate key, and the
/// client share for the ClientKeyExchange is generated right away.
#[derive(Debug, Clone, Default)]
pub struct ExpectServerKeyExchange {
    /// Schemes the server may sign with. Any scheme is accepted if unset.
    pub valid_sig_algs: Option<Vec<SignatureScheme>>,
}

impl ExpectServerKeyExchange {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for ExpectServerKeyExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.valid_sig_algs {
            Some(algs) => write!(
                f,
                "ExpectServerKeyExchange(valid_sig_algs=[{:?}])",
                algs.iter().format(", ")
            ),
            None => write!(f, "ExpectServerKeyExchange"),
        }
    }
}

impl Expect<TlsProtocol> for ExpectServerKeyExchange {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::ServerKeyExchange)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        if state.suite_info()?.kx != KeyExchange::Ecdhe {
            return Err(Error::Protocol(format!(
                "ServerKeyExchange for {:?}",
                state.cipher_suite
            )));
        }
        let ske: EcdheServerKeyExchange = decode(
            HandshakeType::ServerKeyExchange,
            &body(inbound, HandshakeType::ServerKeyExchange)?,
        )?;
        if let Some(valid) = &self.valid_sig_algs {
            if !valid.contains(&ske.scheme) {
                return Err(Error::Protocol(format!(
                    "ServerKeyExchange signed with {:?}",
                    ske.scheme
                )));
            }
        }

        let server_key = state.server_key.as_ref().ok_or_else(|| {
            Error::Protocol("ServerKeyExchange without a server certificate".into())
        })?;
        let signed = [
            state.client_random.as_slice(),
            state.server_random.as_slice(),
            ske.params.as_slice(),
        ]
        .concat();
        server_key.verify(ske.scheme, &signed, &ske.signature)?;

        let share = KeyShare::generate(ske.group)?;
        state.client_kx_public = Some(share.public().to_vec());
        let premaster = share.agree(&ske.public)?;
        state.key.insert(SKE_KEY_SHARE, ske.public);
        state.key.insert(PREMASTER_SECRET, premaster);
        state.record_handshake(received(inbound)?);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpectCertificateRequest {
    /// Exact list of signature schemes the request must carry.
    pub sig_algs: Option<Vec<SignatureScheme>>,
}

impl fmt::Display for ExpectCertificateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectCertificateRequest")
    }
}

impl Expect<TlsProtocol> for ExpectCertificateRequest {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::CertificateRequest)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let body = body(inbound, HandshakeType::CertificateRequest)?;
        let mut rd = Reader::init(&body);
        let request = CertificateRequest::read_version(&mut rd, state.version)
            .filter(|_| !rd.any_left())
            .ok_or_else(|| Error::Codec("malformed CertificateRequest".into()))?;
        if let Some(expected) = &self.sig_algs {
            if &request.schemes != expected {
                return Err(Error::Protocol(format!(
                    "CertificateRequest with [{:?}]",
                    request.schemes.iter().format(", ")
                )));
            }
        }
        state.record_handshake(received(inbound)?);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpectServerHelloDone;

impl fmt::Display for ExpectServerHelloDone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectServerHelloDone")
    }
}

impl Expect<TlsProtocol> for ExpectServerHelloDone {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::ServerHelloDone)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        if !body(inbound, HandshakeType::ServerHelloDone)?.is_empty() {
            return Err(Error::Codec("ServerHelloDone with a body".into()));
        }
        state.record_handshake(received(inbound)?);
        Ok(())
    }
}

/// TLS 1.3 EncryptedExtensions. A record_size_limit applies to the records we send from now
/// on.
#[derive(Debug, Clone, Default)]
pub struct ExpectEncryptedExtensions {
    pub extensions: Option<Vec<ExtensionType>>,
}

impl fmt::Display for ExpectEncryptedExtensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.extensions {
            Some(extensions) => write!(
                f,
                "ExpectEncryptedExtensions([{:?}])",
                extensions.iter().format(", ")
            ),
            None => write!(f, "ExpectEncryptedExtensions"),
        }
    }
}

impl Expect<TlsProtocol> for ExpectEncryptedExtensions {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::EncryptedExtensions)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let body = body(inbound, HandshakeType::EncryptedExtensions)?;
        let mut rd = Reader::init(&body);
        let extensions: Vec<Extension> = read_vec_u16(&mut rd)
            .filter(|_| !rd.any_left())
            .ok_or_else(|| Error::Codec("malformed EncryptedExtensions".into()))?;
        check_extension_types(
            HandshakeType::EncryptedExtensions,
            &self.extensions,
            &extensions,
        )?;

        if let Some(ext) = extensions::find(&extensions, ExtensionType::RecordSizeLimit) {
            let limit = record_size_limit(ext, true)?;
            state.send_record_limit = limit;
            if let Some(layer) = state.layer.as_mut() {
                layer.set_send_limit(limit);
            }
        }
        state.record_handshake(received(inbound)?);
        Ok(())
    }
}

/// TLS 1.3 server CertificateVerify over the transcript up to the Certificate.
#[derive(Debug, Clone, Default)]
pub struct ExpectCertificateVerify;

impl fmt::Display for ExpectCertificateVerify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectCertificateVerify")
    }
}

impl Expect<TlsProtocol> for ExpectCertificateVerify {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::CertificateVerify)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let signed: DigitallySigned = decode(
            HandshakeType::CertificateVerify,
            &body(inbound, HandshakeType::CertificateVerify)?,
        )?;
        let server_key = state.server_key.as_ref().ok_or_else(|| {
            Error::Protocol("CertificateVerify without a server certificate".into())
        })?;
        let content = tls13::certificate_verify_content(true, &state.transcript_hash()?);
        server_key.verify(signed.scheme, &content, &signed.signature)?;
        state.record_handshake(received(inbound)?);
        Ok(())
    }
}

/// ChangeCipherSpec. Before TLS 1.3 the read state switches to the keys derived for it.
#[derive(Debug, Clone, Default)]
pub struct ExpectChangeCipherSpec;

impl fmt::Display for ExpectChangeCipherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectChangeCipherSpec")
    }
}

impl Expect<TlsProtocol> for ExpectChangeCipherSpec {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_content(inbound, ContentType::ChangeCipherSpec)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let message = received(inbound)?;
        if message.payload != [1] {
            return Err(Error::Protocol(format!(
                "ChangeCipherSpec of {}",
                short_hex(&message.payload)
            )));
        }
        if state.version.is_tls13() {
            return Ok(());
        }
        // a resumed session speaks first, the keys are not derived yet
        if state.resuming {
            state.calc_pending_states()?;
        }
        state.change_read_state()
    }
}

/// Finished from the server. In TLS 1.3 this is where the application secrets are derived
/// and the read state switches to them.
#[derive(Debug, Clone, Default)]
pub struct ExpectFinished {
    /// Rules to check the verify data by, the negotiated version by default.
    pub version: Option<ProtocolVersion>,
}

impl ExpectFinished {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for ExpectFinished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => write!(f, "ExpectFinished({:?})", version),
            None => write!(f, "ExpectFinished"),
        }
    }
}

impl Expect<TlsProtocol> for ExpectFinished {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::Finished)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let RawBody(verify_data) = decode::<RawBody>(
            HandshakeType::Finished,
            &body(inbound, HandshakeType::Finished)?,
        )?;
        let version = self.version.unwrap_or(state.version);
        let alg = state.prf_hash()?;
        let transcript = state.transcript_hash()?;
        let expected = if version.is_tls13() {
            tls13::finished_verify_data(alg, state.key.get(SERVER_HS_TRAFFIC)?, &transcript)?
        } else {
            prf::finished_verify_data(alg, state.key.get(MASTER_SECRET_12)?, false, &transcript)
        };
        if verify_data != expected {
            return Err(Error::Protocol(format!(
                "Finished with verify data {}, expected {}",
                short_hex(&verify_data),
                short_hex(&expected)
            )));
        }

        state.key.insert(SERVER_VERIFY_DATA, verify_data);
        state.record_handshake(received(inbound)?);
        if version.is_tls13() {
            state.derive_application_secrets()?;
        }
        Ok(())
    }
}

/// TLS 1.3 NewSessionTicket. Tickets are kept on the connection and are not part of the
/// transcript.
#[derive(Debug, Clone, Default)]
pub struct ExpectNewSessionTicket;

impl fmt::Display for ExpectNewSessionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectNewSessionTicket")
    }
}

impl Expect<TlsProtocol> for ExpectNewSessionTicket {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_handshake(inbound, HandshakeType::NewSessionTicket)
    }

    fn process(&mut self, state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        if !state.version.is_tls13() {
            return Err(Error::Configuration(
                "session tickets are only supported in TLS 1.3".into(),
            ));
        }
        let ticket: NewSessionTicket = decode(
            HandshakeType::NewSessionTicket,
            &body(inbound, HandshakeType::NewSessionTicket)?,
        )?;
        debug!(
            "session ticket valid for {}s: {}",
            ticket.lifetime,
            short_hex(&ticket.ticket)
        );
        state.session_tickets.push(ticket);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpectApplicationData {
    pub data: Option<Vec<u8>>,
}

impl ExpectApplicationData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exactly(data: Vec<u8>) -> Self {
        Self { data: Some(data) }
    }
}

impl fmt::Display for ExpectApplicationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(data) => write!(f, "ExpectApplicationData({})", short_hex(data)),
            None => write!(f, "ExpectApplicationData"),
        }
    }
}

impl Expect<TlsProtocol> for ExpectApplicationData {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_content(inbound, ContentType::ApplicationData)
    }

    fn process(&mut self, _state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let message = received(inbound)?;
        match &self.data {
            Some(expected) if &message.payload != expected => Err(Error::Protocol(format!(
                "application data {}, expected {}",
                short_hex(&message.payload),
                short_hex(expected)
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpectAlert {
    pub level: Option<AlertLevel>,
    pub description: Option<AlertDescription>,
}

impl ExpectAlert {
    pub fn new(level: AlertLevel, description: AlertDescription) -> Self {
        Self {
            level: Some(level),
            description: Some(description),
        }
    }

    pub fn any() -> Self {
        Self::default()
    }
}

impl fmt::Display for ExpectAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectAlert(")?;
        if let Some(level) = self.level {
            write!(f, "{:?}", level)?;
        }
        if let Some(description) = self.description {
            write!(f, ", {:?}", description)?;
        }
        write!(f, ")")
    }
}

impl Expect<TlsProtocol> for ExpectAlert {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_content(inbound, ContentType::Alert)
    }

    fn process(&mut self, _state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let alert = received(inbound)?
            .alert()
            .ok_or_else(|| Error::Codec("malformed alert".into()))?;
        let level_ok = self.level.map_or(true, |level| level == alert.level);
        let description_ok = self
            .description
            .map_or(true, |description| description == alert.description);
        if !level_ok || !description_ok {
            return Err(Error::Protocol(format!(
                "got alert {:?} {:?}",
                alert.level, alert.description
            )));
        }
        Ok(())
    }
}

/// The peer closing the connection.
#[derive(Debug, Clone, Default)]
pub struct ExpectClose;

impl fmt::Display for ExpectClose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpectClose")
    }
}

impl Expect<TlsProtocol> for ExpectClose {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        matches!(inbound, Inbound::Closed)
    }

    fn process(&mut self, state: &mut ConnectionState, _inbound: &TlsInbound) -> Result<(), Error> {
        state.close()
    }
}

/// Heartbeat response, optionally echoing an exact payload.
#[derive(Debug, Clone, Default)]
pub struct ExpectHeartbeat {
    pub payload: Option<Vec<u8>>,
}

impl fmt::Display for ExpectHeartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "ExpectHeartbeat({})", short_hex(payload)),
            None => write!(f, "ExpectHeartbeat"),
        }
    }
}

impl Expect<TlsProtocol> for ExpectHeartbeat {
    fn is_match(&self, inbound: &TlsInbound) -> bool {
        is_content(inbound, ContentType::Heartbeat)
    }

    fn process(&mut self, _state: &mut ConnectionState, inbound: &TlsInbound) -> Result<(), Error> {
        let heartbeat = Heartbeat::read_bytes(&received(inbound)?.payload)
            .ok_or_else(|| Error::Codec("malformed heartbeat".into()))?;
        if heartbeat.typ != HeartbeatMessageType::Response {
            return Err(Error::Protocol(format!("heartbeat {:?}", heartbeat.typ)));
        }
        match &self.payload {
            Some(expected) if &heartbeat.payload != expected => Err(Error::Protocol(format!(
                "heartbeat payload {}, expected {}",
                short_hex(&heartbeat.payload),
                short_hex(expected)
            ))),
            _ => Ok(()),
        }
    }
}
