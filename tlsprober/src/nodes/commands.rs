//! Nodes which change the connection without sending or receiving anything.

use std::fmt;
use std::time::Duration;

use log::debug;
use prober::error::Error;
use prober::protocol::Command;

use crate::crypto::cipher::RecordCipher;
use crate::nodes::short_hex;
use crate::protocol::{NonceLog, TlsProtocol, VariableLog};
use crate::record::{PaddingStrategy, RecordLayer};
use crate::state::{ConnectionState, CLIENT_VERIFY_DATA, SERVER_VERIFY_DATA};
use crate::tls::enums::{ContentType, ProtocolVersion};
use crate::tls::message::{Message, MAX_FRAGMENT_LEN};

/// Opens the TCP connection all later nodes talk over.
#[derive(Debug, Clone)]
pub struct Connect {
    pub host: String,
    pub port: u16,
    /// Version in the header of the records we send until a ServerHello says otherwise.
    pub version: ProtocolVersion,
    pub timeout: Duration,
}

impl Connect {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            version: ProtocolVersion::TLSv1_0,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for Connect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connect({}:{}, {:?})", self.host, self.port, self.version)
    }
}

impl Command<TlsProtocol> for Connect {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        if state.layer.is_some() {
            return Err(Error::Configuration("already connected".into()));
        }
        let mut layer = RecordLayer::connect(&self.host, self.port, self.timeout)?;
        layer.set_version(self.version);
        state.layer = Some(layer);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Close;

impl fmt::Display for Close {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Close")
    }
}

impl Command<TlsProtocol> for Close {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.close()
    }
}

/// Changes the version in the header of the records we send.
#[derive(Debug, Clone)]
pub struct SetRecordVersion(pub ProtocolVersion);

impl fmt::Display for SetRecordVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetRecordVersion({:?})", self.0)
    }
}

impl Command<TlsProtocol> for SetRecordVersion {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.layer_mut()?.set_version(self.0);
        Ok(())
    }
}

/// Starts a new transcript for a renegotiation or a resumption on the same connection.
///
/// Secrets a resumption needs, like the master secret, survive. Record size limits go back to
/// their defaults as the extension has to be negotiated again.
#[derive(Debug, Clone, Default)]
pub struct ResetHandshakeHashes;

impl fmt::Display for ResetHandshakeHashes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResetHandshakeHashes")
    }
}

impl Command<TlsProtocol> for ResetHandshakeHashes {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.reset_handshake();
        Ok(())
    }
}

/// Overwrites the verify data secure renegotiation binds the next handshake to, empty unless
/// given.
#[derive(Debug, Clone, Default)]
pub struct ResetRenegotiationInfo {
    pub client: Option<Vec<u8>>,
    pub server: Option<Vec<u8>>,
}

impl fmt::Display for ResetRenegotiationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |data: &Option<Vec<u8>>| data.as_deref().map(short_hex).unwrap_or_default();
        write!(
            f,
            "ResetRenegotiationInfo(client={}, server={})",
            show(&self.client),
            show(&self.server)
        )
    }
}

impl Command<TlsProtocol> for ResetRenegotiationInfo {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state
            .key
            .insert(CLIENT_VERIFY_DATA, self.client.clone().unwrap_or_default());
        state
            .key
            .insert(SERVER_VERIFY_DATA, self.server.clone().unwrap_or_default());
        Ok(())
    }
}

/// Largest fragment of the records we send. `None` is the protocol maximum.
#[derive(Debug, Clone)]
pub struct SetMaxRecordSize(pub Option<usize>);

impl fmt::Display for SetMaxRecordSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(size) => write!(f, "SetMaxRecordSize({})", size),
            None => write!(f, "SetMaxRecordSize(default)"),
        }
    }
}

impl Command<TlsProtocol> for SetMaxRecordSize {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        let size = self.0.unwrap_or(MAX_FRAGMENT_LEN);
        if size == 0 {
            return Err(Error::Configuration("records must carry some content".into()));
        }
        state.layer_mut()?.set_max_fragment(size);
        Ok(())
    }
}

/// Pads the inner plaintext of TLS 1.3 records. `None` turns padding off again.
#[derive(Debug, Clone)]
pub struct SetPaddingCallback(pub Option<PaddingStrategy>);

impl SetPaddingCallback {
    pub fn fixed(size: usize) -> Self {
        Self(Some(PaddingStrategy::Fixed(size)))
    }

    pub fn fill() -> Self {
        Self(Some(PaddingStrategy::Fill))
    }

    pub fn add_fixed(size: usize) -> Self {
        Self(Some(PaddingStrategy::AddFixed(size)))
    }
}

impl fmt::Display for SetPaddingCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetPaddingCallback({:?})", self.0)
    }
}

impl Command<TlsProtocol> for SetPaddingCallback {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.layer_mut()?.set_padding(self.0);
        Ok(())
    }
}

/// Holds back written records until [`TcpBufferingFlush`], so that several messages leave in
/// one TCP segment.
#[derive(Debug, Clone, Default)]
pub struct TcpBufferingEnable;

impl fmt::Display for TcpBufferingEnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpBufferingEnable")
    }
}

impl Command<TlsProtocol> for TcpBufferingEnable {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.layer_mut()?.set_buffering(true);
        Ok(())
    }
}

/// Writes records as they are sent again. What is already buffered stays until a flush.
#[derive(Debug, Clone, Default)]
pub struct TcpBufferingDisable;

impl fmt::Display for TcpBufferingDisable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpBufferingDisable")
    }
}

impl Command<TlsProtocol> for TcpBufferingDisable {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.layer_mut()?.set_buffering(false);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TcpBufferingFlush;

impl fmt::Display for TcpBufferingFlush {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpBufferingFlush")
    }
}

impl Command<TlsProtocol> for TcpBufferingFlush {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.layer_mut()?.flush()
    }
}

/// Sends in the clear again, whatever has been negotiated.
#[derive(Debug, Clone, Default)]
pub struct ResetWriteConnectionState;

impl fmt::Display for ResetWriteConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResetWriteConnectionState")
    }
}

impl Command<TlsProtocol> for ResetWriteConnectionState {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.layer_mut()?.set_write_cipher(RecordCipher::null());
        Ok(())
    }
}

/// Collects the nonce of every AEAD record we send until the write state changes.
#[derive(Debug, Clone)]
pub struct CollectNonces(pub NonceLog);

impl fmt::Display for CollectNonces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectNonces")
    }
}

impl Command<TlsProtocol> for CollectNonces {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        state.layer_mut()?.collect_nonces(self.0.clone());
        Ok(())
    }
}

pub const CLIENT_HELLO_RANDOM: &str = "ClientHello.random";
pub const SERVER_HELLO_RANDOM: &str = "ServerHello.random";
pub const SERVER_HELLO_SESSION_ID: &str = "ServerHello.session_id";

/// Appends the current value of each named variable to a log.
///
/// Besides the names of key material, the randoms and the session id of the hellos can be
/// copied. Place it right after the node which sets the values of interest.
#[derive(Debug, Clone)]
pub struct CopyVariables {
    pub log: VariableLog,
    pub names: Vec<String>,
}

impl CopyVariables {
    pub fn new<I, S>(log: VariableLog, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            log,
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CopyVariables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CopyVariables({})", self.names.join(", "))
    }
}

impl Command<TlsProtocol> for CopyVariables {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        for name in &self.names {
            let value = match name.as_str() {
                CLIENT_HELLO_RANDOM => state.client_random.clone(),
                SERVER_HELLO_RANDOM => state.server_random.clone(),
                SERVER_HELLO_SESSION_ID => state.session_id.clone(),
                other => state.key.get(other)?.to_vec(),
            };
            self.log.push((name.clone(), value));
        }
        Ok(())
    }
}

/// Sends a single record in the clear, even after encryption started.
///
/// Neither the transcript nor the record layer state notice, and the data is not fragmented.
#[derive(Debug, Clone)]
pub struct PlaintextMessageGenerator {
    pub typ: ContentType,
    pub data: Vec<u8>,
    pub description: Option<String>,
}

impl PlaintextMessageGenerator {
    pub fn new(typ: ContentType, data: Vec<u8>) -> Self {
        Self {
            typ,
            data,
            description: None,
        }
    }
}

impl fmt::Display for PlaintextMessageGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlaintextMessageGenerator({:?}, {}",
            self.typ,
            short_hex(&self.data)
        )?;
        if let Some(description) = &self.description {
            write!(f, ", {:?}", description)?;
        }
        write!(f, ")")
    }
}

impl Command<TlsProtocol> for PlaintextMessageGenerator {
    fn process(&mut self, state: &mut ConnectionState) -> Result<(), Error> {
        debug!("sending {} bytes of {:?} in the clear", self.data.len(), self.typ);
        state
            .layer_mut()?
            .send_plaintext(&Message::new(self.typ, self.data.clone()))
    }
}
