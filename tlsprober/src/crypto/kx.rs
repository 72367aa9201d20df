use std::fmt;

use prober::error::Error;
use ring::agreement;
use ring::rand::SystemRandom;

use crate::tls::enums::NamedGroup;

fn agreement_algorithm(group: NamedGroup) -> Result<&'static agreement::Algorithm, Error> {
    match group {
        NamedGroup::X25519 => Ok(&agreement::X25519),
        NamedGroup::secp256r1 => Ok(&agreement::ECDH_P256),
        NamedGroup::secp384r1 => Ok(&agreement::ECDH_P384),
        other => Err(Error::Configuration(format!(
            "key exchange in group {:?} is not supported",
            other
        ))),
    }
}

/// An ephemeral key pair for one (EC)DHE exchange.
pub struct KeyShare {
    group: NamedGroup,
    private: agreement::EphemeralPrivateKey,
    public: Vec<u8>,
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyShare({:?}, {})", self.group, hex::encode(&self.public))
    }
}

impl KeyShare {
    pub fn generate(group: NamedGroup) -> Result<Self, Error> {
        let rng = SystemRandom::new();
        let private = agreement::EphemeralPrivateKey::generate(agreement_algorithm(group)?, &rng)
            .map_err(|_| Error::Crypto(format!("generating a {:?} key", group)))?;
        let public = private
            .compute_public_key()
            .map_err(|_| Error::Crypto(format!("computing a {:?} public key", group)))?
            .as_ref()
            .to_vec();
        Ok(Self {
            group,
            private,
            public,
        })
    }

    pub fn group(&self) -> NamedGroup {
        self.group
    }

    pub fn public(&self) -> &[u8] {
        &self.public
    }

    /// Consumes the private key and returns the shared secret with `peer`.
    pub fn agree(self, peer: &[u8]) -> Result<Vec<u8>, Error> {
        let peer = agreement::UnparsedPublicKey::new(agreement_algorithm(self.group)?, peer);
        agreement::agree_ephemeral(self.private, &peer, |secret| secret.to_vec())
            .map_err(|_| Error::Crypto(format!("{:?} key agreement failed", self.group)))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_both_sides_agree() {
        for group in [
            NamedGroup::X25519,
            NamedGroup::secp256r1,
            NamedGroup::secp384r1,
        ] {
            let client = KeyShare::generate(group).unwrap();
            let server = KeyShare::generate(group).unwrap();
            let client_public = client.public().to_vec();
            let server_public = server.public().to_vec();

            let a = client.agree(&server_public).unwrap();
            let b = server.agree(&client_public).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_invalid_peer_share() {
        let client = KeyShare::generate(NamedGroup::secp256r1).unwrap();
        assert!(matches!(client.agree(&[4, 1, 2, 3]), Err(Error::Crypto(_))));
        assert!(matches!(
            KeyShare::generate(NamedGroup::FFDHE2048),
            Err(Error::Configuration(_))
        ));
    }
}
