//! TLS binding of the prober.
//!
//! [`protocol::TlsProtocol`] plugs the TLS message codec of [`tls`], the [`record`] layer and
//! the key schedule kept in [`state::ConnectionState`] into the engine. The node catalogue in
//! [`nodes`] builds client flights, checks what the server answers and corrupts chosen parts
//! of the records on the way out through the one-shot [`hooks`].
//!
//! ### Cryptographic libraries
//!
//! [ring](https://github.com/briansmith/ring) provides digests, HMAC, HKDF, AEAD and ECDHE.
//! RSA goes through the [rsa](https://github.com/RustCrypto/RSA) crate with its hazmat
//! primitives, so that PKCS#1 padding can be tampered with, and CBC record protection through
//! the RustCrypto block ciphers.

pub mod conversations;
pub mod crypto;
pub mod hooks;
pub mod nodes;
pub mod protocol;
pub mod record;
pub mod state;
#[allow(clippy::upper_case_acronyms)]
pub mod tls;
