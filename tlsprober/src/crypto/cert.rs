//! Public keys of peer certificates and signature verification with them.

use prober::error::Error;
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::RsaPublicKey;
use x509_cert::der::Decode;
use x509_cert::spki::ObjectIdentifier;
use x509_cert::Certificate;

use crate::tls::enums::SignatureScheme;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// The key a certificate binds, ready for verification with ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerKey {
    /// PKCS#1 RSAPublicKey DER and the parsed key, which the RSA key exchange encrypts to.
    Rsa { der: Vec<u8>, key: RsaPublicKey },
    EcdsaP256(Vec<u8>),
    EcdsaP384(Vec<u8>),
    Ed25519(Vec<u8>),
}

impl PeerKey {
    pub fn from_certificate(der: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(der)
            .map_err(|err| Error::Codec(format!("malformed certificate: {}", err)))?;
        let spki = &cert.tbs_certificate.subject_public_key_info;
        let bits = spki.subject_public_key.raw_bytes().to_vec();

        match spki.algorithm.oid {
            oid if oid == RSA_ENCRYPTION => {
                let key = RsaPublicKey::from_pkcs1_der(&bits)
                    .map_err(|err| Error::Codec(format!("malformed RSA key: {}", err)))?;
                Ok(PeerKey::Rsa { der: bits, key })
            }
            // named curves are told apart by the size of the uncompressed point
            oid if oid == EC_PUBLIC_KEY && bits.len() == 65 => Ok(PeerKey::EcdsaP256(bits)),
            oid if oid == EC_PUBLIC_KEY && bits.len() == 97 => Ok(PeerKey::EcdsaP384(bits)),
            oid if oid == ED25519 => Ok(PeerKey::Ed25519(bits)),
            oid => Err(Error::Protocol(format!(
                "certificate key {} is not supported",
                oid
            ))),
        }
    }

    pub fn rsa(&self) -> Result<&RsaPublicKey, Error> {
        match self {
            PeerKey::Rsa { key, .. } => Ok(key),
            other => Err(Error::Protocol(format!(
                "RSA key exchange needs an RSA certificate, got {:?}",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PeerKey::Rsa { .. } => "RSA",
            PeerKey::EcdsaP256(_) => "ECDSA P-256",
            PeerKey::EcdsaP384(_) => "ECDSA P-384",
            PeerKey::Ed25519(_) => "Ed25519",
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            PeerKey::Rsa { der, .. } => der,
            PeerKey::EcdsaP256(point) | PeerKey::EcdsaP384(point) | PeerKey::Ed25519(point) => {
                point
            }
        }
    }

    fn algorithm(
        &self,
        scheme: SignatureScheme,
    ) -> Option<&'static dyn VerificationAlgorithm> {
        let alg: &'static dyn VerificationAlgorithm = match (self, scheme) {
            (PeerKey::Rsa { .. }, SignatureScheme::RSA_PKCS1_SHA1) => {
                &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY
            }
            (PeerKey::Rsa { .. }, SignatureScheme::RSA_PKCS1_SHA256) => {
                &signature::RSA_PKCS1_2048_8192_SHA256
            }
            (PeerKey::Rsa { .. }, SignatureScheme::RSA_PKCS1_SHA384) => {
                &signature::RSA_PKCS1_2048_8192_SHA384
            }
            (PeerKey::Rsa { .. }, SignatureScheme::RSA_PKCS1_SHA512) => {
                &signature::RSA_PKCS1_2048_8192_SHA512
            }
            (PeerKey::Rsa { .. }, SignatureScheme::RSA_PSS_RSAE_SHA256) => {
                &signature::RSA_PSS_2048_8192_SHA256
            }
            (PeerKey::Rsa { .. }, SignatureScheme::RSA_PSS_RSAE_SHA384) => {
                &signature::RSA_PSS_2048_8192_SHA384
            }
            (PeerKey::Rsa { .. }, SignatureScheme::RSA_PSS_RSAE_SHA512) => {
                &signature::RSA_PSS_2048_8192_SHA512
            }
            (PeerKey::EcdsaP256(_), SignatureScheme::ECDSA_NISTP256_SHA256) => {
                &signature::ECDSA_P256_SHA256_ASN1
            }
            (PeerKey::EcdsaP384(_), SignatureScheme::ECDSA_NISTP384_SHA384) => {
                &signature::ECDSA_P384_SHA384_ASN1
            }
            (PeerKey::Ed25519(_), SignatureScheme::ED25519) => &signature::ED25519,
            _ => return None,
        };
        Some(alg)
    }

    /// Checks `sig` over `message`. A scheme which does not fit the key is a peer error.
    pub fn verify(
        &self,
        scheme: SignatureScheme,
        message: &[u8],
        sig: &[u8],
    ) -> Result<(), Error> {
        let alg = self.algorithm(scheme).ok_or_else(|| {
            Error::Protocol(format!(
                "signature scheme {:?} can not be used with an {} key",
                scheme,
                self.kind()
            ))
        })?;
        UnparsedPublicKey::new(alg, self.bytes())
            .verify(message, sig)
            .map_err(|_| Error::Crypto(format!("{:?} signature does not verify", scheme)))
    }
}

#[cfg(test)]
mod tests {
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::RsaPrivateKey;
    use test_log::test;

    use super::*;
    use crate::crypto::hash::HashAlgorithm;
    use crate::crypto::rsa::pkcs1_sign;
    use prober::mutation::MutationSpec;

    const RSA_CERT: &[u8] = include_bytes!("../../assets/rsa-cert.der");
    const EC_CERT: &[u8] = include_bytes!("../../assets/ec-cert.der");

    #[test]
    fn test_rsa_certificate() {
        let peer = PeerKey::from_certificate(RSA_CERT).unwrap();
        let private =
            RsaPrivateKey::from_pkcs8_pem(include_str!("../../assets/rsa-key.pem")).unwrap();
        assert_eq!(peer.rsa().unwrap(), &private.to_public_key());

        let sig = pkcs1_sign(&private, HashAlgorithm::Sha256, b"params", &MutationSpec::new())
            .unwrap();
        peer.verify(SignatureScheme::RSA_PKCS1_SHA256, b"params", &sig)
            .unwrap();
        assert!(matches!(
            peer.verify(SignatureScheme::RSA_PKCS1_SHA256, b"other", &sig),
            Err(Error::Crypto(_))
        ));
        assert!(matches!(
            peer.verify(SignatureScheme::ECDSA_NISTP256_SHA256, b"params", &sig),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_ec_certificate() {
        let peer = PeerKey::from_certificate(EC_CERT).unwrap();
        assert!(matches!(peer, PeerKey::EcdsaP256(ref point) if point[0] == 0x04));
        assert!(peer.rsa().is_err());
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(
            PeerKey::from_certificate(&[0x30, 0x03, 0x02, 0x01]),
            Err(Error::Codec(_))
        ));
    }
}
