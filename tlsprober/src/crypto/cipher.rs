//! Record protection: TLS 1.2 CBC with MAC-then-encrypt, TLS 1.2 AEAD and TLS 1.3.
//!
//! Sealing honours the [`SendHooks`] of the current send. Every hook edits one well defined
//! intermediate buffer, so a fault lands exactly where a conversation put it while the rest
//! of the record stays valid.

use std::fmt;

use aes::{Aes128, Aes256};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use prober::error::Error;
use rand::RngCore;
use ring::aead;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::tls13;
use crate::hooks::{PaddingHook, PlaintextHook, SendHooks};
use crate::tls::enums::{ContentType, ProtocolVersion};
use crate::tls::suites::{BulkCipher, SuiteInfo};

const BLOCK_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Keys of one direction out of a TLS 1.2 key block.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectionKeys {
    pub mac_key: Vec<u8>,
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DirectionKeys(mac {}, key {}, iv {})",
            self.mac_key.len(),
            self.key.len(),
            self.iv.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlock {
    pub client: DirectionKeys,
    pub server: DirectionKeys,
}

impl KeyBlock {
    /// Splits a key block into client MAC, server MAC, client key, server key, client IV,
    /// server IV, RFC 5246 section 6.3.
    pub fn split(info: &SuiteInfo, block: &[u8]) -> Result<Self, Error> {
        if block.len() < info.key_block_len() {
            return Err(Error::Crypto(format!(
                "key block of {} bytes is too short for {:?}",
                block.len(),
                info.suite
            )));
        }

        let mut rest = block;
        let mut take = |len: usize| {
            let (head, tail) = rest.split_at(len);
            rest = tail;
            head.to_vec()
        };
        let (client_mac, server_mac) = (take(info.mac_len()), take(info.mac_len()));
        let (client_key, server_key) = (take(info.key_len()), take(info.key_len()));
        let (client_iv, server_iv) = (take(info.fixed_iv_len()), take(info.fixed_iv_len()));

        Ok(Self {
            client: DirectionKeys {
                mac_key: client_mac,
                key: client_key,
                iv: client_iv,
            },
            server: DirectionKeys {
                mac_key: server_mac,
                key: server_key,
                iv: server_iv,
            },
        })
    }
}

/// A record ready for framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub typ: ContentType,
    pub fragment: Vec<u8>,
    /// The full AEAD nonce the record was sealed with.
    pub nonce: Option<Vec<u8>>,
}

enum Protection {
    Null,
    Cbc {
        bulk: BulkCipher,
        mac: HashAlgorithm,
        mac_key: Vec<u8>,
        key: Vec<u8>,
    },
    Aead {
        key: aead::LessSafeKey,
        iv: Vec<u8>,
        /// TLS 1.2 GCM sends the sequence number as the explicit part of the nonce.
        explicit_nonce: bool,
        tls13: bool,
    },
}

pub struct RecordCipher {
    protection: Protection,
    seq: u64,
}

impl fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match &self.protection {
            Protection::Null => "null",
            Protection::Cbc { .. } => "CBC",
            Protection::Aead { tls13: false, .. } => "AEAD",
            Protection::Aead { tls13: true, .. } => "TLS 1.3 AEAD",
        };
        write!(f, "RecordCipher({}, seq {})", name, self.seq)
    }
}

impl Default for RecordCipher {
    fn default() -> Self {
        Self::null()
    }
}

fn aead_key(bulk: BulkCipher, key: &[u8]) -> Result<aead::LessSafeKey, Error> {
    let alg = match bulk {
        BulkCipher::Aes128Gcm => &aead::AES_128_GCM,
        BulkCipher::Aes256Gcm => &aead::AES_256_GCM,
        BulkCipher::Chacha20Poly1305 => &aead::CHACHA20_POLY1305,
        other => {
            return Err(Error::Configuration(format!(
                "{:?} is not an AEAD cipher",
                other
            )))
        }
    };
    let unbound = aead::UnboundKey::new(alg, key)
        .map_err(|_| Error::Crypto(format!("{} byte key for {:?}", key.len(), bulk)))?;
    Ok(aead::LessSafeKey::new(unbound))
}

/// `iv` with the sequence number xored into its last eight bytes.
fn xor_nonce(iv: &[u8], seq: u64) -> Result<[u8; 12], Error> {
    let mut nonce: [u8; 12] = iv
        .try_into()
        .map_err(|_| Error::Crypto(format!("IV of {} bytes, need 12", iv.len())))?;
    for (byte, seq_byte) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
        *byte ^= seq_byte;
    }
    Ok(nonce)
}

fn div_ceil(dividend: usize, divisor: usize) -> usize {
    (dividend + divisor - 1) / divisor
}

/// CBC padding for `data_len` bytes, RFC 5246 section 6.2.3.2, with the overrides of `hook`.
pub fn cbc_padding(data_len: usize, hook: Option<&PaddingHook>) -> Result<Vec<u8>, Error> {
    let mut padding = match hook.and_then(|hook| hook.min_length) {
        None => {
            let len = BLOCK_LEN - 1 - data_len % BLOCK_LEN;
            vec![len as u8; len + 1]
        }
        Some(min_length) => {
            let total =
                div_ceil(data_len + min_length as usize, BLOCK_LEN) * BLOCK_LEN - data_len;
            if total > 256 {
                return Err(Error::Configuration(format!(
                    "minimum padding of {} needs {} padding bytes",
                    min_length, total
                )));
            }
            vec![total.saturating_sub(1) as u8; total]
        }
    };
    if let Some(hook) = hook {
        hook.spec.apply(&mut padding)?;
    }
    Ok(padding)
}

fn cbc_encrypt(bulk: BulkCipher, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() % BLOCK_LEN != 0 {
        return Err(Error::Configuration(format!(
            "CBC plaintext of {} bytes is not block aligned",
            data.len()
        )));
    }
    // the first plaintext block is random, its ciphertext doubles as the explicit IV
    let iv = [0u8; BLOCK_LEN];
    let invalid = |_| Error::Crypto(format!("{} byte key for {:?}", key.len(), bulk));
    match bulk {
        BulkCipher::Aes128Cbc => Ok(cbc::Encryptor::<Aes128>::new_from_slices(key, &iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<NoPadding>(data)),
        BulkCipher::Aes256Cbc => Ok(cbc::Encryptor::<Aes256>::new_from_slices(key, &iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<NoPadding>(data)),
        other => Err(Error::Configuration(format!("{:?} is not a CBC cipher", other))),
    }
}

fn cbc_decrypt(bulk: BulkCipher, key: &[u8], fragment: &[u8]) -> Result<Vec<u8>, Error> {
    if fragment.len() < 2 * BLOCK_LEN || fragment.len() % BLOCK_LEN != 0 {
        return Err(Error::Crypto(format!(
            "CBC record of {} bytes is malformed",
            fragment.len()
        )));
    }
    let (iv, data) = fragment.split_at(BLOCK_LEN);
    let invalid = |_| Error::Crypto(format!("{} byte key for {:?}", key.len(), bulk));
    let unpad = |_| Error::Crypto("CBC decryption failed".to_string());
    match bulk {
        BulkCipher::Aes128Cbc => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<NoPadding>(data)
            .map_err(unpad),
        BulkCipher::Aes256Cbc => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<NoPadding>(data)
            .map_err(unpad),
        other => Err(Error::Configuration(format!("{:?} is not a CBC cipher", other))),
    }
}

fn bad_record_mac() -> Error {
    Error::Crypto("bad record MAC".to_string())
}

impl RecordCipher {
    pub fn null() -> Self {
        Self {
            protection: Protection::Null,
            seq: 0,
        }
    }

    /// TLS 1.2 protection of one direction.
    pub fn tls12(info: &SuiteInfo, keys: &DirectionKeys) -> Result<Self, Error> {
        let protection = match info.mac_algorithm() {
            Some(mac) => Protection::Cbc {
                bulk: info.bulk,
                mac,
                mac_key: keys.mac_key.clone(),
                key: keys.key.clone(),
            },
            None => Protection::Aead {
                key: aead_key(info.bulk, &keys.key)?,
                iv: keys.iv.clone(),
                explicit_nonce: info.bulk != BulkCipher::Chacha20Poly1305,
                tls13: false,
            },
        };
        Ok(Self { protection, seq: 0 })
    }

    /// TLS 1.3 protection under `traffic_secret`.
    pub fn tls13(info: &SuiteInfo, traffic_secret: &[u8]) -> Result<Self, Error> {
        let (key, iv) = tls13::traffic_key_and_iv(info.prf, traffic_secret, info.key_len())?;
        Ok(Self {
            protection: Protection::Aead {
                key: aead_key(info.bulk, &key)?,
                iv,
                explicit_nonce: false,
                tls13: true,
            },
            seq: 0,
        })
    }

    pub fn is_tls13(&self) -> bool {
        matches!(self.protection, Protection::Aead { tls13: true, .. })
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn next_seq(&mut self) -> Result<u64, Error> {
        let seq = self.seq;
        self.seq = seq
            .checked_add(1)
            .ok_or_else(|| Error::Crypto("record sequence number exhausted".to_string()))?;
        Ok(seq)
    }

    fn nonce(iv: &[u8], seq: u64, explicit_nonce: bool) -> Result<[u8; 12], Error> {
        if explicit_nonce {
            let mut nonce = [0u8; 12];
            if iv.len() != 4 {
                return Err(Error::Crypto(format!("GCM salt of {} bytes", iv.len())));
            }
            nonce[..4].copy_from_slice(iv);
            nonce[4..].copy_from_slice(&seq.to_be_bytes());
            Ok(nonce)
        } else {
            xor_nonce(iv, seq)
        }
    }

    /// Protects one record. `padding_len` zero bytes pad the inner plaintext of TLS 1.3
    /// records and are ignored otherwise.
    pub fn seal(
        &mut self,
        typ: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
        hooks: &SendHooks,
        padding_len: usize,
    ) -> Result<Sealed, Error> {
        let mut sealed = match self.protection {
            Protection::Null => {
                if hooks.mac.is_some() || hooks.padding.is_some() || hooks.plaintext.is_some() {
                    return Err(Error::Configuration(
                        "MAC, padding and plaintext hooks need an encrypting connection".into(),
                    ));
                }
                Sealed {
                    typ,
                    fragment: plaintext.to_vec(),
                    nonce: None,
                }
            }
            // middlebox compatibility CCS, never protected
            Protection::Aead { tls13: true, .. } if typ == ContentType::ChangeCipherSpec => {
                Sealed {
                    typ,
                    fragment: plaintext.to_vec(),
                    nonce: None,
                }
            }
            Protection::Cbc { .. } => self.seal_cbc(typ, version, plaintext, hooks)?,
            Protection::Aead { .. } => self.seal_aead(typ, version, plaintext, hooks, padding_len)?,
        };

        if let Some(spec) = &hooks.ciphertext {
            spec.apply(&mut sealed.fragment)?;
        }
        Ok(sealed)
    }

    fn seal_cbc(
        &mut self,
        typ: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
        hooks: &SendHooks,
    ) -> Result<Sealed, Error> {
        let seq = self.next_seq()?;
        let Protection::Cbc {
            bulk,
            mac,
            mac_key,
            key,
        } = &self.protection
        else {
            return Err(Error::Configuration("not a CBC cipher".into()));
        };

        let header = mac_header(seq, typ, version, plaintext.len());
        let mut tag = mac.hmac_parts(mac_key, &[header.as_slice(), plaintext]);
        if let Some(spec) = &hooks.mac {
            spec.apply(&mut tag)?;
        }

        let mut data = vec![0u8; BLOCK_LEN];
        rand::thread_rng().fill_bytes(&mut data);
        data.extend_from_slice(plaintext);
        data.extend_from_slice(&tag);
        let padding = cbc_padding(data.len(), hooks.padding.as_ref())?;
        data.extend_from_slice(&padding);

        match &hooks.plaintext {
            Some(PlaintextHook::Fuzz(spec)) => spec.apply(&mut data)?,
            Some(PlaintextHook::Replace(replacement)) => {
                if replacement.len() % BLOCK_LEN != 0 {
                    return Err(Error::Configuration(format!(
                        "replacement plaintext of {} bytes is not block aligned",
                        replacement.len()
                    )));
                }
                data = replacement.clone();
            }
            None => {}
        }

        Ok(Sealed {
            typ,
            fragment: cbc_encrypt(*bulk, key, &data)?,
            nonce: None,
        })
    }

    fn seal_aead(
        &mut self,
        typ: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
        hooks: &SendHooks,
        padding_len: usize,
    ) -> Result<Sealed, Error> {
        if hooks.padding.is_some() || hooks.plaintext.is_some() {
            return Err(Error::Configuration(
                "padding and plaintext hooks need a CBC cipher".into(),
            ));
        }
        let seq = self.next_seq()?;
        let Protection::Aead {
            key,
            iv,
            explicit_nonce,
            tls13,
        } = &self.protection
        else {
            return Err(Error::Configuration("not an AEAD cipher".into()));
        };
        let nonce = Self::nonce(iv, seq, *explicit_nonce)?;

        let (outer_typ, mut data, aad) = if *tls13 {
            let mut inner = plaintext.to_vec();
            inner.push(typ.get_u8());
            inner.resize(inner.len() + padding_len, 0);
            let len = inner.len() + TAG_LEN;
            let aad = tls13_aad(len)?;
            (ContentType::ApplicationData, inner, aad.to_vec())
        } else {
            let header = mac_header(seq, typ, version, plaintext.len());
            (typ, plaintext.to_vec(), header)
        };

        let tag = key
            .seal_in_place_separate_tag(
                aead::Nonce::assume_unique_for_key(nonce),
                aead::Aad::from(aad.as_slice()),
                &mut data,
            )
            .map_err(|_| Error::Crypto("AEAD sealing failed".into()))?;
        let mut tag = tag.as_ref().to_vec();
        if let Some(spec) = &hooks.mac {
            spec.apply(&mut tag)?;
        }

        let mut fragment = Vec::with_capacity(8 + data.len() + tag.len());
        if *explicit_nonce {
            fragment.extend_from_slice(&seq.to_be_bytes());
        }
        fragment.extend_from_slice(&data);
        fragment.extend_from_slice(&tag);

        Ok(Sealed {
            typ: outer_typ,
            fragment,
            nonce: Some(nonce.to_vec()),
        })
    }

    /// Removes the protection of one record and returns its real content type and content.
    pub fn open(
        &mut self,
        typ: ContentType,
        version: ProtocolVersion,
        fragment: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        // change cipher spec is never protected, and in TLS 1.3 neither is anything which
        // is not disguised as application data
        let passthrough = match &self.protection {
            Protection::Null => true,
            Protection::Aead { tls13: true, .. } => typ != ContentType::ApplicationData,
            _ => typ == ContentType::ChangeCipherSpec,
        };
        if passthrough {
            return Ok((typ, fragment.to_vec()));
        }

        let seq = self.next_seq()?;
        match &self.protection {
            Protection::Null => Ok((typ, fragment.to_vec())),
            Protection::Cbc {
                bulk,
                mac,
                mac_key,
                key,
            } => {
                let data = cbc_decrypt(*bulk, key, fragment)?;
                let pad_len = *data.last().ok_or_else(bad_record_mac)? as usize;
                let mac_len = mac.output_len();
                if data.len() < pad_len + 1 + mac_len {
                    return Err(bad_record_mac());
                }
                let (rest, padding) = data.split_at(data.len() - pad_len - 1);
                let (content, tag) = rest.split_at(rest.len() - mac_len);
                let header = mac_header(seq, typ, version, content.len());
                let expected = mac.hmac_parts(mac_key, &[header.as_slice(), content]);
                if padding.iter().any(|byte| *byte as usize != pad_len) || expected != tag {
                    return Err(bad_record_mac());
                }
                Ok((typ, content.to_vec()))
            }
            Protection::Aead {
                key,
                iv,
                explicit_nonce,
                tls13,
            } => {
                let body = if *explicit_nonce {
                    fragment.get(8..).ok_or_else(bad_record_mac)?
                } else {
                    fragment
                };
                if body.len() < TAG_LEN {
                    return Err(bad_record_mac());
                }
                let nonce = if *explicit_nonce {
                    let mut nonce = [0u8; 12];
                    nonce[..4].copy_from_slice(iv.get(..4).ok_or_else(bad_record_mac)?);
                    nonce[4..].copy_from_slice(&fragment[..8]);
                    nonce
                } else {
                    xor_nonce(iv, seq)?
                };
                let aad = if *tls13 {
                    tls13_aad(fragment.len())?.to_vec()
                } else {
                    mac_header(seq, typ, version, body.len() - TAG_LEN)
                };

                let mut in_out = body.to_vec();
                let opened = key
                    .open_in_place(
                        aead::Nonce::assume_unique_for_key(nonce),
                        aead::Aad::from(aad.as_slice()),
                        &mut in_out,
                    )
                    .map_err(|_| bad_record_mac())?;
                let mut content = opened.to_vec();

                if !*tls13 {
                    return Ok((typ, content));
                }
                let end = content
                    .iter()
                    .rposition(|byte| *byte != 0)
                    .ok_or_else(|| Error::Protocol("TLS 1.3 record without content type".into()))?;
                let inner = ContentType::from(content[end]);
                content.truncate(end);
                Ok((inner, content))
            }
        }
    }
}

/// seq_num + type + version + length, the pseudo header of the TLS 1.2 MAC and AAD.
fn mac_header(seq: u64, typ: ContentType, version: ProtocolVersion, len: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(13);
    header.extend_from_slice(&seq.to_be_bytes());
    header.push(typ.get_u8());
    header.extend_from_slice(&version.get_u16().to_be_bytes());
    header.extend_from_slice(&(len as u16).to_be_bytes());
    header
}

fn tls13_aad(len: usize) -> Result<[u8; 5], Error> {
    let len = u16::try_from(len)
        .map_err(|_| Error::Codec(format!("record of {} bytes", len)))?
        .to_be_bytes();
    Ok([0x17, 0x03, 0x03, len[0], len[1]])
}

/// A key block counting up from zero.
#[cfg(test)]
pub(crate) fn test_keys(info: &SuiteInfo) -> KeyBlock {
    let block: Vec<u8> = (0..info.key_block_len()).map(|i| i as u8).collect();
    KeyBlock::split(info, &block).unwrap()
}

#[cfg(test)]
mod tests {
    use prober::mutation::MutationSpec;
    use test_log::test;

    use super::*;
    use crate::tls::enums::CipherSuite;
    use crate::tls::suites::lookup;

    const V12: ProtocolVersion = ProtocolVersion::TLSv1_2;

    fn pair(suite: CipherSuite) -> (RecordCipher, RecordCipher) {
        let info = lookup(suite).unwrap();
        let keys = test_keys(info);
        (
            RecordCipher::tls12(info, &keys.client).unwrap(),
            RecordCipher::tls12(info, &keys.client).unwrap(),
        )
    }

    #[test]
    fn test_key_block_split() {
        let info = lookup(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
        let keys = test_keys(info);
        assert_eq!(keys.client.mac_key, (0..20).collect::<Vec<u8>>());
        assert_eq!(keys.server.mac_key, (20..40).collect::<Vec<u8>>());
        assert_eq!(keys.client.key, (40..56).collect::<Vec<u8>>());
        assert_eq!(keys.server.key, (56..72).collect::<Vec<u8>>());
        assert!(keys.client.iv.is_empty());

        let gcm = lookup(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256).unwrap();
        let keys = test_keys(gcm);
        assert_eq!(keys.client.iv, vec![32, 33, 34, 35]);
        assert_eq!(keys.server.iv, vec![36, 37, 38, 39]);
    }

    #[test]
    fn test_tls12_suites_open_what_they_seal() {
        for suite in [
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ] {
            let (mut writer, mut reader) = pair(suite);
            for message in [&b"first"[..], &[0u8; 100][..], b""] {
                let sealed = writer
                    .seal(ContentType::Handshake, V12, message, &SendHooks::default(), 0)
                    .unwrap();
                assert_eq!(sealed.typ, ContentType::Handshake);
                let (typ, opened) = reader.open(sealed.typ, V12, &sealed.fragment).unwrap();
                assert_eq!(typ, ContentType::Handshake);
                assert_eq!(opened, message);
            }
            assert_eq!(writer.seq(), 3);
        }
    }

    #[test]
    fn test_empty_hooks_leave_records_unchanged() {
        let empty = [
            SendHooks {
                mac: Some(MutationSpec::new()),
                ..SendHooks::default()
            },
            SendHooks {
                ciphertext: Some(MutationSpec::new()),
                ..SendHooks::default()
            },
        ];
        for suite in [
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
            CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ] {
            for hooks in &empty {
                let (mut plain, _) = pair(suite);
                let (mut hooked, mut reader) = pair(suite);
                let expected = plain
                    .seal(ContentType::ApplicationData, V12, b"GET /", &SendHooks::default(), 0)
                    .unwrap();
                let sealed = hooked
                    .seal(ContentType::ApplicationData, V12, b"GET /", hooks, 0)
                    .unwrap();
                assert_eq!(sealed.fragment, expected.fragment, "{:?} {:?}", suite, hooks);
                assert!(reader.open(sealed.typ, V12, &sealed.fragment).is_ok());
            }
        }

        // CBC records carry a random IV, so only their size and content can be compared
        let cbc = [
            SendHooks {
                mac: Some(MutationSpec::new()),
                ..SendHooks::default()
            },
            SendHooks {
                padding: Some(PaddingHook::default()),
                ..SendHooks::default()
            },
            SendHooks {
                plaintext: Some(PlaintextHook::Fuzz(MutationSpec::new())),
                ..SendHooks::default()
            },
        ];
        for hooks in &cbc {
            let (mut plain, _) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
            let (mut hooked, mut reader) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
            let expected = plain
                .seal(ContentType::ApplicationData, V12, b"GET /", &SendHooks::default(), 0)
                .unwrap();
            let sealed = hooked
                .seal(ContentType::ApplicationData, V12, b"GET /", hooks, 0)
                .unwrap();
            assert_eq!(sealed.fragment.len(), expected.fragment.len(), "{:?}", hooks);
            let (_, opened) = reader.open(sealed.typ, V12, &sealed.fragment).unwrap();
            assert_eq!(opened, b"GET /");
        }
    }

    #[test]
    fn test_gcm_explicit_nonce() {
        let (mut writer, _) = pair(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        writer
            .seal(ContentType::Alert, V12, &[1, 0], &SendHooks::default(), 0)
            .unwrap();
        let sealed = writer
            .seal(ContentType::Alert, V12, &[1, 0], &SendHooks::default(), 0)
            .unwrap();
        assert_eq!(&sealed.fragment[..8], &1u64.to_be_bytes());
        assert_eq!(sealed.fragment.len(), 8 + 2 + 16);
        assert_eq!(
            sealed.nonce.unwrap(),
            vec![32, 33, 34, 35, 0, 0, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_mac_hook_breaks_only_one_record() {
        for suite in [
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
        ] {
            let (mut writer, mut reader) = pair(suite);
            let hooks = SendHooks {
                mac: Some(MutationSpec::new().xor(-1, 0x01)),
                ..SendHooks::default()
            };
            let broken = writer
                .seal(ContentType::ApplicationData, V12, b"GET /", &hooks, 0)
                .unwrap();
            assert!(matches!(
                reader.open(broken.typ, V12, &broken.fragment),
                Err(Error::Crypto(_))
            ));

            let fine = writer
                .seal(ContentType::ApplicationData, V12, b"GET /", &SendHooks::default(), 0)
                .unwrap();
            assert_eq!(reader.open(fine.typ, V12, &fine.fragment).unwrap().1, b"GET /");
        }
    }

    #[test]
    fn test_padding_hooks() {
        // 16 bytes IV + 5 bytes data + 20 bytes MAC leave 7 bytes of padding
        let (mut writer, mut reader) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let sealed = writer
            .seal(ContentType::ApplicationData, V12, b"hello", &SendHooks::default(), 0)
            .unwrap();
        assert_eq!(sealed.fragment.len(), 48);
        reader.open(sealed.typ, V12, &sealed.fragment).unwrap();

        let long = SendHooks {
            padding: Some(PaddingHook {
                min_length: Some(200),
                spec: MutationSpec::new(),
            }),
            ..SendHooks::default()
        };
        let sealed = writer
            .seal(ContentType::ApplicationData, V12, b"hello", &long, 0)
            .unwrap();
        assert_eq!(sealed.fragment.len(), 256);
        assert_eq!(reader.open(sealed.typ, V12, &sealed.fragment).unwrap().1, b"hello");

        let broken = SendHooks {
            padding: Some(PaddingHook {
                min_length: None,
                spec: MutationSpec::new().xor(0, 0xff),
            }),
            ..SendHooks::default()
        };
        let sealed = writer
            .seal(ContentType::ApplicationData, V12, b"hello", &broken, 0)
            .unwrap();
        assert!(reader.open(sealed.typ, V12, &sealed.fragment).is_err());
    }

    #[test]
    fn test_cbc_padding() {
        assert_eq!(cbc_padding(15, None).unwrap(), vec![0]);
        assert_eq!(cbc_padding(16, None).unwrap(), vec![15; 16]);
        let hook = PaddingHook {
            min_length: Some(255),
            spec: MutationSpec::new(),
        };
        assert_eq!(cbc_padding(0, Some(&hook)).unwrap(), vec![255; 256]);
        assert_eq!(cbc_padding(1, Some(&hook)).unwrap(), vec![254; 255]);
        assert!(matches!(
            cbc_padding(2, Some(&hook)),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_plaintext_hooks() {
        let (mut writer, _) = pair(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        let replace = SendHooks {
            plaintext: Some(PlaintextHook::Replace(vec![0; 32])),
            ..SendHooks::default()
        };
        let sealed = writer
            .seal(ContentType::ApplicationData, V12, b"ignored", &replace, 0)
            .unwrap();
        assert_eq!(sealed.fragment.len(), 32);

        let misaligned = SendHooks {
            plaintext: Some(PlaintextHook::Replace(vec![0; 31])),
            ..SendHooks::default()
        };
        assert!(matches!(
            writer.seal(ContentType::ApplicationData, V12, b"x", &misaligned, 0),
            Err(Error::Configuration(_))
        ));

        let (mut aead, _) = pair(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        assert!(matches!(
            aead.seal(ContentType::ApplicationData, V12, b"x", &replace, 0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_ciphertext_hook_and_null_cipher() {
        let mut null = RecordCipher::null();
        let hooks = SendHooks {
            ciphertext: Some(MutationSpec::new().substitute(0, 0x02)),
            ..SendHooks::default()
        };
        let sealed = null
            .seal(ContentType::Alert, V12, &[1, 0], &hooks, 0)
            .unwrap();
        assert_eq!(sealed.fragment, vec![2, 0]);

        let mac = SendHooks {
            mac: Some(MutationSpec::new().xor(0, 1)),
            ..SendHooks::default()
        };
        assert!(null.seal(ContentType::Alert, V12, &[1, 0], &mac, 0).is_err());
    }

    #[test]
    fn test_tls13_inner_type_and_padding() {
        let info = lookup(CipherSuite::TLS13_AES_128_GCM_SHA256).unwrap();
        let mut writer = RecordCipher::tls13(info, &[7; 32]).unwrap();
        let mut reader = RecordCipher::tls13(info, &[7; 32]).unwrap();

        let sealed = writer
            .seal(ContentType::Handshake, V12, b"finished", &SendHooks::default(), 10)
            .unwrap();
        assert_eq!(sealed.typ, ContentType::ApplicationData);
        assert_eq!(sealed.fragment.len(), 8 + 1 + 10 + 16);

        let (typ, content) = reader.open(sealed.typ, V12, &sealed.fragment).unwrap();
        assert_eq!(typ, ContentType::Handshake);
        assert_eq!(content, b"finished");

        // plaintext change cipher spec passes through untouched
        assert_eq!(
            reader.open(ContentType::ChangeCipherSpec, V12, &[1]).unwrap(),
            (ContentType::ChangeCipherSpec, vec![1])
        );
        assert_eq!(reader.seq(), 1);
    }
}
