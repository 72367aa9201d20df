//! What a negotiated cipher suite means for the key schedule and the record layer.

use prober::error::Error;

use crate::crypto::hash::HashAlgorithm;
use crate::tls::enums::CipherSuite;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchange {
    Rsa,
    Ecdhe,
    /// Negotiated through extensions, the suite does not say.
    Tls13,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCipher {
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
    Chacha20Poly1305,
}

impl BulkCipher {
    pub fn is_aead(self) -> bool {
        !matches!(self, BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    /// Authentication is part of the bulk cipher.
    Aead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteInfo {
    pub suite: CipherSuite,
    pub kx: KeyExchange,
    pub bulk: BulkCipher,
    pub mac: MacAlgorithm,
    /// Hash of the PRF in TLS 1.2 and of HKDF in TLS 1.3.
    pub prf: HashAlgorithm,
}

impl SuiteInfo {
    pub fn key_len(&self) -> usize {
        match self.bulk {
            BulkCipher::Aes128Cbc | BulkCipher::Aes128Gcm => 16,
            BulkCipher::Aes256Cbc | BulkCipher::Aes256Gcm | BulkCipher::Chacha20Poly1305 => 32,
        }
    }

    /// Implicit part of the nonce which comes out of the TLS 1.2 key block.
    pub fn fixed_iv_len(&self) -> usize {
        match self.bulk {
            BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc => 0,
            BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm => 4,
            BulkCipher::Chacha20Poly1305 => 12,
        }
    }

    pub fn mac_algorithm(&self) -> Option<HashAlgorithm> {
        match self.mac {
            MacAlgorithm::Sha1 => Some(HashAlgorithm::Sha1),
            MacAlgorithm::Sha256 => Some(HashAlgorithm::Sha256),
            MacAlgorithm::Sha384 => Some(HashAlgorithm::Sha384),
            MacAlgorithm::Aead => None,
        }
    }

    pub fn mac_len(&self) -> usize {
        self.mac_algorithm().map_or(0, HashAlgorithm::output_len)
    }

    pub fn block_len(&self) -> usize {
        if self.bulk.is_aead() {
            0
        } else {
            16
        }
    }

    /// Length of the TLS 1.2 key block, both directions.
    pub fn key_block_len(&self) -> usize {
        2 * (self.mac_len() + self.key_len() + self.fixed_iv_len())
    }

    pub fn is_tls13(&self) -> bool {
        self.kx == KeyExchange::Tls13
    }
}

macro_rules! suite {
    ($suite:ident, $kx:ident, $bulk:ident, $mac:ident, $prf:ident) => {
        SuiteInfo {
            suite: CipherSuite::$suite,
            kx: KeyExchange::$kx,
            bulk: BulkCipher::$bulk,
            mac: MacAlgorithm::$mac,
            prf: HashAlgorithm::$prf,
        }
    };
}

static SUITES: &[SuiteInfo] = &[
    suite!(TLS_RSA_WITH_AES_128_CBC_SHA, Rsa, Aes128Cbc, Sha1, Sha256),
    suite!(TLS_RSA_WITH_AES_256_CBC_SHA, Rsa, Aes256Cbc, Sha1, Sha256),
    suite!(TLS_RSA_WITH_AES_128_CBC_SHA256, Rsa, Aes128Cbc, Sha256, Sha256),
    suite!(TLS_RSA_WITH_AES_256_CBC_SHA256, Rsa, Aes256Cbc, Sha256, Sha256),
    suite!(TLS_RSA_WITH_AES_128_GCM_SHA256, Rsa, Aes128Gcm, Aead, Sha256),
    suite!(TLS_RSA_WITH_AES_256_GCM_SHA384, Rsa, Aes256Gcm, Aead, Sha384),
    suite!(TLS13_AES_128_GCM_SHA256, Tls13, Aes128Gcm, Aead, Sha256),
    suite!(TLS13_AES_256_GCM_SHA384, Tls13, Aes256Gcm, Aead, Sha384),
    suite!(TLS13_CHACHA20_POLY1305_SHA256, Tls13, Chacha20Poly1305, Aead, Sha256),
    suite!(TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA, Ecdhe, Aes128Cbc, Sha1, Sha256),
    suite!(TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA, Ecdhe, Aes256Cbc, Sha1, Sha256),
    suite!(TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA, Ecdhe, Aes128Cbc, Sha1, Sha256),
    suite!(TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA, Ecdhe, Aes256Cbc, Sha1, Sha256),
    suite!(TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256, Ecdhe, Aes128Cbc, Sha256, Sha256),
    suite!(TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384, Ecdhe, Aes256Cbc, Sha384, Sha384),
    suite!(TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256, Ecdhe, Aes128Cbc, Sha256, Sha256),
    suite!(TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384, Ecdhe, Aes256Cbc, Sha384, Sha384),
    suite!(TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256, Ecdhe, Aes128Gcm, Aead, Sha256),
    suite!(TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384, Ecdhe, Aes256Gcm, Aead, Sha384),
    suite!(TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256, Ecdhe, Aes128Gcm, Aead, Sha256),
    suite!(TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384, Ecdhe, Aes256Gcm, Aead, Sha384),
    suite!(TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256, Ecdhe, Chacha20Poly1305, Aead, Sha256),
    suite!(TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256, Ecdhe, Chacha20Poly1305, Aead, Sha256),
];

/// Parameters of `suite`. Suites the record layer can not protect with are a peer error,
/// as only the server picks them.
pub fn lookup(suite: CipherSuite) -> Result<&'static SuiteInfo, Error> {
    SUITES
        .iter()
        .find(|info| info.suite == suite)
        .ok_or_else(|| Error::Protocol(format!("cipher suite {:?} is not supported", suite)))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_key_block_lengths() {
        let cbc = lookup(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA).unwrap();
        assert_eq!(cbc.key_block_len(), 2 * (20 + 16));
        assert_eq!(cbc.block_len(), 16);

        let gcm = lookup(CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384).unwrap();
        assert_eq!(gcm.key_block_len(), 2 * (32 + 4));
        assert_eq!(gcm.prf, HashAlgorithm::Sha384);

        let chacha = lookup(CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256).unwrap();
        assert_eq!(chacha.fixed_iv_len(), 12);
    }

    #[test]
    fn test_unknown_suites() {
        assert!(lookup(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV).is_err());
        assert!(lookup(CipherSuite::Unknown(0x0a0a)).is_err());
        assert!(lookup(CipherSuite::TLS13_AES_128_GCM_SHA256)
            .unwrap()
            .is_tls13());
    }
}
