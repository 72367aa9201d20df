//! Cryptographic helpers on top of `ring`, `rsa`, `x509-cert`, `aes` and `cbc`.

pub mod cert;
pub mod cipher;
pub mod hash;
pub mod kx;
pub mod prf;
pub mod rsa;
pub mod tls13;
