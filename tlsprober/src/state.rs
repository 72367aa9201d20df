//! State of one connection and the points of the key schedule where it changes.
//!
//! Nodes never derive keys themselves. They call into [`ConnectionState`] once the transcript
//! holds what the derivation needs, e.g. the ServerHello for the TLS 1.3 handshake secrets or
//! the ClientKeyExchange for an extended master secret.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, trace};
use prober::error::Error;
use prober::protocol::{Inbound, Stream};

use crate::crypto::cert::PeerKey;
use crate::crypto::cipher::{KeyBlock, RecordCipher};
use crate::crypto::hash::{HandshakeHash, HashAlgorithm};
use crate::crypto::kx::KeyShare;
use crate::crypto::{prf, tls13};
use crate::hooks::{HookGuard, SendHooks};
use crate::record::RecordLayer;
use crate::tls::enums::{CipherSuite, HandshakeType, NamedGroup, ProtocolVersion};
use crate::tls::handshake::NewSessionTicket;
use crate::tls::message::{Message, MAX_FRAGMENT_LEN};
use crate::tls::suites::{self, SuiteInfo};

pub const PREMASTER_SECRET: &str = "premaster_secret";
pub const MASTER_SECRET_12: &str = "master_secret";
pub const DH_SHARED_SECRET: &str = "DH shared secret";
pub const PSK_SECRET: &str = "PSK secret";
pub const EARLY_SECRET: &str = "early secret";
pub const HANDSHAKE_SECRET: &str = "handshake secret";
pub const CLIENT_HS_TRAFFIC: &str = "client handshake traffic secret";
pub const SERVER_HS_TRAFFIC: &str = "server handshake traffic secret";
pub const MASTER_SECRET_13: &str = "master secret";
pub const CLIENT_AP_TRAFFIC: &str = "client application traffic secret";
pub const SERVER_AP_TRAFFIC: &str = "server application traffic secret";
pub const EXPORTER_MASTER: &str = "exporter master secret";
pub const RESUMPTION_MASTER: &str = "resumption master secret";
pub const CLIENT_VERIFY_DATA: &str = "client_verify_data";
pub const SERVER_VERIFY_DATA: &str = "server_verify_data";
pub const SKE_KEY_SHARE: &str = "ServerKeyExchange.key_share";
pub const SH_KEY_SHARE: &str = "ServerHello.extensions.key_share.key_exchange";

/// Named secrets. Reading an entry nobody stored is a bug in the conversation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeyMaterial {
    entries: BTreeMap<String, Vec<u8>>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl KeyMaterial {
    pub fn get(&self, name: &str) -> Result<&[u8], Error> {
        self.entries
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Lookup(format!("key material {:?}", name)))
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, value: Vec<u8>) {
        let name = name.into();
        trace!("{} = {}", name, hex::encode(&value));
        self.entries.insert(name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

pub struct ConnectionState {
    /// Present between Connect and Close.
    pub layer: Option<RecordLayer>,
    pub version: ProtocolVersion,
    /// Version the last ClientHello offered.
    pub client_version: ProtocolVersion,
    pub cipher_suite: Option<CipherSuite>,
    pub handshake_hashes: HandshakeHash,
    /// Every handshake message of the transcript, whole and in order.
    pub handshake_messages: Vec<Message>,
    /// Transcript up to and including the ClientKeyExchange.
    pub certificate_verify_handshake_hashes: Option<HandshakeHash>,
    pub key: KeyMaterial,
    pub client_random: Vec<u8>,
    pub server_random: Vec<u8>,
    pub session_id: Vec<u8>,
    pub resuming: bool,
    pub extended_master_secret: bool,
    /// Largest record we may send once the next write state is in effect.
    pub send_record_limit: usize,
    /// Largest record we promised to accept.
    pub recv_record_limit: usize,
    /// Private halves of the key shares the last ClientHello offered.
    pub key_shares: Vec<KeyShare>,
    /// Public value for an ECDHE ClientKeyExchange, the secret is already agreed on.
    pub client_kx_public: Option<Vec<u8>>,
    pub server_key: Option<PeerKey>,
    pub session_tickets: Vec<NewSessionTicket>,
    pub(crate) pending_write: Option<RecordCipher>,
    pub(crate) pending_read: Option<RecordCipher>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        // nothing to bind a first handshake to
        let mut key = KeyMaterial::default();
        key.insert(CLIENT_VERIFY_DATA, Vec::new());
        key.insert(SERVER_VERIFY_DATA, Vec::new());

        Self {
            layer: None,
            version: ProtocolVersion::TLSv1_2,
            client_version: ProtocolVersion::TLSv1_2,
            cipher_suite: None,
            handshake_hashes: HandshakeHash::new(),
            handshake_messages: Vec::new(),
            certificate_verify_handshake_hashes: None,
            key,
            client_random: Vec::new(),
            server_random: Vec::new(),
            session_id: Vec::new(),
            resuming: false,
            extended_master_secret: false,
            send_record_limit: MAX_FRAGMENT_LEN,
            recv_record_limit: MAX_FRAGMENT_LEN,
            key_shares: Vec::new(),
            client_kx_public: None,
            server_key: None,
            session_tickets: Vec::new(),
            pending_write: None,
            pending_read: None,
        }
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("connected", &self.layer.is_some())
            .field("version", &self.version)
            .field("cipher_suite", &self.cipher_suite)
            .field("resuming", &self.resuming)
            .field("extended_master_secret", &self.extended_master_secret)
            .field("key", &self.key)
            .finish()
    }
}

fn not_connected() -> Error {
    Error::Configuration("the conversation is not connected".into())
}

impl ConnectionState {
    pub fn layer(&self) -> Result<&RecordLayer, Error> {
        self.layer.as_ref().ok_or_else(not_connected)
    }

    pub fn layer_mut(&mut self) -> Result<&mut RecordLayer, Error> {
        self.layer.as_mut().ok_or_else(not_connected)
    }

    pub fn suite_info(&self) -> Result<&'static SuiteInfo, Error> {
        let suite = self.cipher_suite.ok_or_else(|| {
            Error::Configuration("no cipher suite has been negotiated yet".into())
        })?;
        suites::lookup(suite)
    }

    pub fn prf_hash(&self) -> Result<HashAlgorithm, Error> {
        Ok(self.suite_info()?.prf)
    }

    /// Appends a whole handshake message to the transcript.
    pub fn record_handshake(&mut self, message: &Message) {
        self.handshake_hashes.update(&message.payload);
        self.handshake_messages.push(message.clone());
    }

    pub fn last_handshake(&self, typ: HandshakeType) -> Option<&Message> {
        self.handshake_messages
            .iter()
            .rev()
            .find(|message| message.is_handshake(typ))
    }

    pub fn transcript_hash(&self) -> Result<Vec<u8>, Error> {
        Ok(self.handshake_hashes.digest(self.prf_hash()?))
    }

    /// The TLS 1.2 master secret, extended if `extended` is set.
    pub fn calc_master_secret(&mut self, extended: bool) -> Result<(), Error> {
        let alg = self.prf_hash()?;
        let premaster = self.key.get(PREMASTER_SECRET)?;
        let master = if extended {
            let session_hash = self
                .certificate_verify_handshake_hashes
                .as_ref()
                .unwrap_or(&self.handshake_hashes)
                .digest(alg);
            prf::extended_master_secret(alg, premaster, &session_hash)
        } else {
            prf::master_secret(alg, premaster, &self.client_random, &self.server_random)
        };
        self.key.insert(MASTER_SECRET_12, master);
        Ok(())
    }

    /// Derives the TLS 1.2 key block and keeps both directions ready for the next switch.
    pub fn calc_pending_states(&mut self) -> Result<(), Error> {
        let info = self.suite_info()?;
        let block = prf::key_block(
            info.prf,
            self.key.get(MASTER_SECRET_12)?,
            &self.client_random,
            &self.server_random,
            info.key_block_len(),
        );
        let keys = KeyBlock::split(info, &block)?;
        self.pending_write = Some(RecordCipher::tls12(info, &keys.client)?);
        self.pending_read = Some(RecordCipher::tls12(info, &keys.server)?);
        Ok(())
    }

    pub fn change_write_state(&mut self) -> Result<(), Error> {
        let layer = self.layer.as_mut().ok_or_else(not_connected)?;
        let cipher = self.pending_write.take().ok_or_else(|| {
            Error::Configuration("no pending write state to switch to".into())
        })?;
        layer.set_write_cipher(cipher);
        layer.set_send_limit(self.send_record_limit);
        Ok(())
    }

    pub fn change_read_state(&mut self) -> Result<(), Error> {
        let layer = self.layer.as_mut().ok_or_else(not_connected)?;
        let cipher = self.pending_read.take().ok_or_else(|| {
            Error::Configuration("no pending read state to switch to".into())
        })?;
        layer.set_read_cipher(cipher);
        Ok(())
    }

    pub fn has_pending_write(&self) -> bool {
        self.pending_write.is_some()
    }

    /// Agrees on a secret with the server share of `group` using the private key the
    /// ClientHello offered for it.
    pub fn agree(&mut self, group: NamedGroup, peer: &[u8]) -> Result<Vec<u8>, Error> {
        let index = self
            .key_shares
            .iter()
            .position(|share| share.group() == group)
            .ok_or_else(|| {
                Error::Protocol(format!("server picked {:?} which was not offered", group))
            })?;
        self.key_shares.swap_remove(index).agree(peer)
    }

    /// TLS 1.3 handshake secrets. Both directions switch to handshake traffic keys, as the
    /// transcript now ends with the ServerHello.
    pub fn derive_handshake_secrets(&mut self) -> Result<(), Error> {
        let info = self.suite_info()?;
        let alg = info.prf;
        let zeros = vec![0u8; alg.output_len()];

        let psk = match self.key.contains(PSK_SECRET) {
            true => Some(self.key.get(PSK_SECRET)?.to_vec()),
            false => None,
        };
        let early = tls13::hkdf_extract(alg, &zeros, psk.as_deref().unwrap_or(&zeros));
        // only a psk_ke handshake goes without a shared secret
        let shared = match (&psk, self.key.contains(DH_SHARED_SECRET)) {
            (Some(_), false) => zeros.clone(),
            _ => self.key.get(DH_SHARED_SECRET)?.to_vec(),
        };
        let handshake = tls13::next_stage(alg, &early, &shared)?;

        let hash = self.handshake_hashes.digest(alg);
        let client = tls13::derive_secret(alg, &handshake, b"c hs traffic", &hash)?;
        let server = tls13::derive_secret(alg, &handshake, b"s hs traffic", &hash)?;

        let layer = self.layer_mut()?;
        layer.set_write_cipher(RecordCipher::tls13(info, &client)?);
        layer.set_read_cipher(RecordCipher::tls13(info, &server)?);

        self.key.insert(EARLY_SECRET, early);
        self.key.insert(HANDSHAKE_SECRET, handshake);
        self.key.insert(CLIENT_HS_TRAFFIC, client);
        self.key.insert(SERVER_HS_TRAFFIC, server);
        Ok(())
    }

    /// TLS 1.3 application secrets, once the transcript ends with the server Finished. The
    /// read side switches now, the write side after our own Finished went out.
    pub fn derive_application_secrets(&mut self) -> Result<(), Error> {
        let info = self.suite_info()?;
        let alg = info.prf;
        let zeros = vec![0u8; alg.output_len()];

        let master = tls13::next_stage(alg, self.key.get(HANDSHAKE_SECRET)?, &zeros)?;
        let hash = self.handshake_hashes.digest(alg);
        let client = tls13::derive_secret(alg, &master, b"c ap traffic", &hash)?;
        let server = tls13::derive_secret(alg, &master, b"s ap traffic", &hash)?;
        let exporter = tls13::derive_secret(alg, &master, b"exp master", &hash)?;

        self.layer_mut()?
            .set_read_cipher(RecordCipher::tls13(info, &server)?);
        self.pending_write = Some(RecordCipher::tls13(info, &client)?);

        self.key.insert(MASTER_SECRET_13, master);
        self.key.insert(CLIENT_AP_TRAFFIC, client);
        self.key.insert(SERVER_AP_TRAFFIC, server);
        self.key.insert(EXPORTER_MASTER, exporter);
        Ok(())
    }

    /// TLS 1.3 resumption master secret, once the transcript ends with the client Finished.
    pub fn derive_resumption_secret(&mut self) -> Result<(), Error> {
        let alg = self.prf_hash()?;
        let hash = self.handshake_hashes.digest(alg);
        let resumption =
            tls13::derive_secret(alg, self.key.get(MASTER_SECRET_13)?, b"res master", &hash)?;
        self.key.insert(RESUMPTION_MASTER, resumption);
        Ok(())
    }

    /// Starts a new handshake on the same connection. Secrets a resumption needs survive.
    pub fn reset_handshake(&mut self) {
        debug!("resetting the handshake transcript");
        self.handshake_hashes = HandshakeHash::new();
        self.handshake_messages.clear();
        self.certificate_verify_handshake_hashes = None;
        for name in [PSK_SECRET, DH_SHARED_SECRET, PREMASTER_SECRET] {
            self.key.remove(name);
        }
        self.send_record_limit = MAX_FRAGMENT_LEN;
        self.recv_record_limit = MAX_FRAGMENT_LEN;
    }

    pub fn close(&mut self) -> Result<(), Error> {
        match self.layer.take() {
            Some(mut layer) => layer.close(),
            None => Ok(()),
        }
    }
}

impl Stream<Message, SendHooks> for ConnectionState {
    fn send(&mut self, message: &Message, hooks: &SendHooks) -> Result<(), Error> {
        let mut layer = HookGuard::install(self.layer_mut()?, hooks.clone());
        layer.send(message)
    }

    fn receive(&mut self) -> Result<Inbound<Message>, Error> {
        self.layer_mut()?.receive()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::tls::enums::ContentType;

    fn tls12_state() -> ConnectionState {
        let mut state = ConnectionState {
            cipher_suite: Some(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256),
            client_random: vec![1; 32],
            server_random: vec![2; 32],
            ..ConnectionState::default()
        };
        state.key.insert(PREMASTER_SECRET, vec![3; 48]);
        state
    }

    #[test]
    fn test_undefined_key_material_is_a_lookup_error() {
        let state = ConnectionState::default();
        assert_eq!(
            state.key.get(MASTER_SECRET_12),
            Err(Error::Lookup("key material \"master_secret\"".into()))
        );
        assert!(ConnectionState::default().calc_master_secret(false).is_err());
    }

    #[test]
    fn test_extended_master_secret_uses_snapshot() {
        let mut state = tls12_state();
        state.record_handshake(&Message::new(ContentType::Handshake, vec![0x10, 0, 0, 0]));
        state.certificate_verify_handshake_hashes = Some(state.handshake_hashes.clone());
        state.record_handshake(&Message::new(ContentType::Handshake, vec![0x0f, 0, 0, 0]));

        state.calc_master_secret(true).unwrap();
        let extended = state.key.get(MASTER_SECRET_12).unwrap().to_vec();
        let expected = prf::extended_master_secret(
            HashAlgorithm::Sha256,
            &[3; 48],
            &HashAlgorithm::Sha256.hash(&[0x10, 0, 0, 0]),
        );
        assert_eq!(extended, expected);

        state.calc_master_secret(false).unwrap();
        assert_ne!(state.key.get(MASTER_SECRET_12).unwrap(), extended.as_slice());
    }

    #[test]
    fn test_reset_is_idempotent_for_key_material() {
        let mut state = tls12_state();
        let client_hello = Message::new(ContentType::Handshake, vec![0x01, 0, 0, 1, 7]);
        state.record_handshake(&client_hello);
        state.calc_master_secret(true).unwrap();
        let first = state.key.get(MASTER_SECRET_12).unwrap().to_vec();
        state.key.insert(RESUMPTION_MASTER, vec![9; 32]);

        state.reset_handshake();
        assert!(state.handshake_hashes.is_empty());
        assert!(!state.key.contains(PREMASTER_SECRET));
        assert!(state.key.contains(RESUMPTION_MASTER));

        state.key.insert(PREMASTER_SECRET, vec![3; 48]);
        state.record_handshake(&client_hello);
        state.calc_master_secret(true).unwrap();
        assert_eq!(state.key.get(MASTER_SECRET_12).unwrap(), first.as_slice());
    }

    #[test]
    fn test_pending_states() {
        let mut state = tls12_state();
        state.calc_master_secret(false).unwrap();
        state.calc_pending_states().unwrap();
        // keys are ready but nothing is connected to switch
        assert!(matches!(
            state.change_write_state(),
            Err(Error::Configuration(_))
        ));
        assert!(state.has_pending_write());
    }

    #[test]
    fn test_tls13_handshake_secret_needs_a_key_exchange() {
        let mut state = ConnectionState {
            cipher_suite: Some(CipherSuite::TLS13_AES_128_GCM_SHA256),
            ..ConnectionState::default()
        };
        assert!(matches!(
            state.derive_handshake_secrets(),
            Err(Error::Lookup(_))
        ));
        assert!(!state.key.contains(HANDSHAKE_SECRET));

        // psk_ke gets past the lookups and stops at the missing connection
        state.key.insert(PSK_SECRET, vec![4; 32]);
        assert!(matches!(
            state.derive_handshake_secrets(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_last_handshake_of_type() {
        let mut state = ConnectionState::default();
        state.record_handshake(&Message::new(ContentType::Handshake, vec![0x0d, 0, 0, 1, 1]));
        state.record_handshake(&Message::new(ContentType::Handshake, vec![0x0d, 0, 0, 1, 2]));
        assert_eq!(
            state
                .last_handshake(HandshakeType::CertificateRequest)
                .map(|m| m.payload[4]),
            Some(2)
        );
        assert!(state.last_handshake(HandshakeType::Finished).is_none());
    }

    #[test]
    fn test_sending_needs_a_connection() {
        let mut state = ConnectionState::default();
        let alert = Message::new(ContentType::Alert, vec![1, 0]);
        assert!(matches!(
            state.send(&alert, &SendHooks::default()),
            Err(Error::Configuration(_))
        ));
        assert!(state.close().is_ok());
    }
}
