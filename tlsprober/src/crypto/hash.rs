//! Hash functions and the running handshake transcript.

use ring::{digest, hmac};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn digest_algorithm(self) -> &'static digest::Algorithm {
        match self {
            HashAlgorithm::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            HashAlgorithm::Sha256 => &digest::SHA256,
            HashAlgorithm::Sha384 => &digest::SHA384,
            HashAlgorithm::Sha512 => &digest::SHA512,
        }
    }

    pub fn hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            HashAlgorithm::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            HashAlgorithm::Sha256 => hmac::HMAC_SHA256,
            HashAlgorithm::Sha384 => hmac::HMAC_SHA384,
            HashAlgorithm::Sha512 => hmac::HMAC_SHA512,
        }
    }

    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        digest::digest(self.digest_algorithm(), data)
            .as_ref()
            .to_vec()
    }

    pub fn hmac(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        let key = hmac::Key::new(self.hmac_algorithm(), key);
        hmac::sign(&key, data).as_ref().to_vec()
    }

    /// HMAC over the concatenation of `parts`.
    pub fn hmac_parts(self, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
        let key = hmac::Key::new(self.hmac_algorithm(), key);
        let mut ctx = hmac::Context::with_key(&key);
        for part in parts {
            ctx.update(part);
        }
        ctx.sign().as_ref().to_vec()
    }
}

/// Every handshake message sent or received, in order, with running digests.
///
/// The digests the key schedules ask for most are kept incrementally. Anything else, e.g.
/// the SHA-1 a TLS 1.2 CertificateVerify may be signed with, is computed over the kept
/// messages.
#[derive(Clone)]
pub struct HandshakeHash {
    messages: Vec<u8>,
    sha256: digest::Context,
    sha384: digest::Context,
}

impl Default for HandshakeHash {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            sha256: digest::Context::new(&digest::SHA256),
            sha384: digest::Context::new(&digest::SHA384),
        }
    }
}

impl std::fmt::Debug for HandshakeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandshakeHash({} bytes)", self.messages.len())
    }
}

impl HandshakeHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, message: &[u8]) {
        self.messages.extend_from_slice(message);
        self.sha256.update(message);
        self.sha384.update(message);
    }

    pub fn digest(&self, alg: HashAlgorithm) -> Vec<u8> {
        match alg {
            HashAlgorithm::Sha256 => self.sha256.clone().finish().as_ref().to_vec(),
            HashAlgorithm::Sha384 => self.sha384.clone().finish().as_ref().to_vec(),
            other => other.hash(&self.messages),
        }
    }

    pub fn messages(&self) -> &[u8] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
