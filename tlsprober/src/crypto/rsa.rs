//! RSA operations with access to the padding.
//!
//! The padded block is built here and handed to the raw RSA primitive, so that conversations
//! can corrupt the padding of an encryption or a signature while the rest stays valid. An
//! empty [`MutationSpec`] yields ordinary PKCS#1 v1.5 and PSS results.

use prober::error::Error;
use prober::mutation::MutationSpec;
use rand::Rng;
use rsa::hazmat::{rsa_decrypt_and_check, rsa_encrypt};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use crate::crypto::hash::HashAlgorithm;

fn rsa_err(context: &'static str) -> impl FnOnce(rsa::Error) -> Error {
    move |err| Error::Crypto(format!("{}: {}", context, err))
}

/// Big endian encoding of `n`, left padded to `len` bytes.
fn to_fixed(n: &BigUint, len: usize) -> Vec<u8> {
    let bytes = n.to_bytes_be();
    let mut out = vec![0u8; len.saturating_sub(bytes.len())];
    out.extend_from_slice(&bytes);
    out
}

pub fn modulus(key: &RsaPublicKey) -> Vec<u8> {
    to_fixed(key.n(), key.size())
}

/// The DER prefix of a DigestInfo for `hash`, RFC 8017 section 9.2.
fn digest_info_prefix(hash: HashAlgorithm) -> &'static [u8] {
    match hash {
        HashAlgorithm::Sha1 => &[
            0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04,
            0x14,
        ],
        HashAlgorithm::Sha256 => &[
            0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x01, 0x05, 0x00, 0x04, 0x20,
        ],
        HashAlgorithm::Sha384 => &[
            0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x02, 0x05, 0x00, 0x04, 0x30,
        ],
        HashAlgorithm::Sha512 => &[
            0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x03, 0x05, 0x00, 0x04, 0x40,
        ],
    }
}

/// PKCS#1 v1.5 encryption. `padding` edits the first `k - message.len()` bytes of the encoded
/// block, i.e. `00 02 PS 00`.
pub fn pkcs1_encrypt(
    key: &RsaPublicKey,
    message: &[u8],
    padding: &MutationSpec,
) -> Result<Vec<u8>, Error> {
    let k = key.size();
    if message.len() + 11 > k {
        return Err(Error::Crypto(format!(
            "{} bytes do not fit a {} byte modulus",
            message.len(),
            k
        )));
    }

    let mut rng = rand::thread_rng();
    let mut block = Vec::with_capacity(k);
    block.extend_from_slice(&[0x00, 0x02]);
    block.extend((0..k - 3 - message.len()).map(|_| rng.gen_range(1..=255u8)));
    block.push(0x00);
    padding.apply(&mut block)?;
    block.extend_from_slice(message);

    let m = BigUint::from_bytes_be(&block);
    let c = rsa_encrypt(key, &m).map_err(rsa_err("raw RSA encryption"))?;
    Ok(to_fixed(&c, k))
}

/// The private key operation on an arbitrary block, reduced modulo n if the block exceeds it.
pub fn raw_sign(key: &RsaPrivateKey, block: &[u8]) -> Result<Vec<u8>, Error> {
    let mut m = BigUint::from_bytes_be(block);
    if &m >= key.n() {
        m = m % key.n();
    }
    let s = rsa_decrypt_and_check(key, Some(&mut rand::thread_rng()), &m)
        .map_err(rsa_err("raw RSA signature"))?;
    Ok(to_fixed(&s, key.size()))
}

/// PKCS#1 v1.5 signature of `message`. `padding` edits the whole `00 01 FF.. 00 DigestInfo`
/// block before the private key operation.
pub fn pkcs1_sign(
    key: &RsaPrivateKey,
    hash: HashAlgorithm,
    message: &[u8],
    padding: &MutationSpec,
) -> Result<Vec<u8>, Error> {
    let k = key.size();
    let prefix = digest_info_prefix(hash);
    let t_len = prefix.len() + hash.output_len();
    if t_len + 11 > k {
        return Err(Error::Crypto(format!(
            "{:?} DigestInfo does not fit a {} byte modulus",
            hash, k
        )));
    }

    let mut block = Vec::with_capacity(k);
    block.extend_from_slice(&[0x00, 0x01]);
    block.resize(k - t_len - 1, 0xff);
    block.push(0x00);
    block.extend_from_slice(prefix);
    block.extend_from_slice(&hash.hash(message));
    padding.apply(&mut block)?;

    raw_sign(key, &block)
}

fn mgf1(hash: HashAlgorithm, seed: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + hash.output_len());
    let mut counter = 0u32;
    while out.len() < len {
        out.extend_from_slice(&hash.hash(&[seed, &counter.to_be_bytes()[..]].concat()));
        counter += 1;
    }
    out.truncate(len);
    out
}

/// RSASSA-PSS signature of `message`, RFC 8017 section 8.1. `padding` edits the encoded
/// message, left padded to the modulus size, before the private key operation.
pub fn pss_sign(
    key: &RsaPrivateKey,
    hash: HashAlgorithm,
    mgf1_hash: HashAlgorithm,
    message: &[u8],
    salt_len: usize,
    padding: &MutationSpec,
) -> Result<Vec<u8>, Error> {
    let k = key.size();
    let h_len = hash.output_len();
    let em_bits = key.n().bits() - 1;
    let em_len = (em_bits + 7) / 8;
    if em_len < h_len + salt_len + 2 {
        return Err(Error::Crypto(format!(
            "a salt of {} bytes does not fit a {} byte modulus",
            salt_len, k
        )));
    }

    let m_hash = hash.hash(message);
    let mut salt = vec![0u8; salt_len];
    rand::thread_rng().fill(salt.as_mut_slice());
    let h = hash.hash(&[&[0u8; 8][..], m_hash.as_slice(), salt.as_slice()].concat());

    let mut db = vec![0u8; em_len - salt_len - h_len - 2];
    db.push(0x01);
    db.extend_from_slice(&salt);
    let mask = mgf1(mgf1_hash, &h, db.len());
    db.iter_mut().zip(mask).for_each(|(byte, mask)| *byte ^= mask);
    db[0] &= 0xff >> (8 * em_len - em_bits);

    let mut block = vec![0u8; k - em_len];
    block.extend_from_slice(&db);
    block.extend_from_slice(&h);
    block.push(0xbc);
    padding.apply(&mut block)?;

    raw_sign(key, &block)
}

#[cfg(test)]
mod tests {
    use ring::signature;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::Pkcs1v15Encrypt;
    use test_log::test;

    use super::*;

    fn private_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(include_str!("../../assets/rsa-key.pem")).unwrap()
    }

    fn public_der(key: &RsaPrivateKey) -> Vec<u8> {
        key.to_public_key()
            .to_pkcs1_der()
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    #[test]
    fn test_unmodified_encryption_decrypts() {
        let key = private_key();
        let premaster = [3u8; 48];
        let ciphertext =
            pkcs1_encrypt(&key.to_public_key(), &premaster, &MutationSpec::new()).unwrap();
        assert_eq!(ciphertext.len(), 256);
        assert_eq!(
            key.decrypt(Pkcs1v15Encrypt, &ciphertext).unwrap(),
            premaster.to_vec()
        );
    }

    #[test]
    fn test_broken_block_type_is_rejected() {
        let key = private_key();
        let ciphertext = pkcs1_encrypt(
            &key.to_public_key(),
            &[3u8; 48],
            &MutationSpec::new().xor(1, 0x01),
        )
        .unwrap();
        assert!(key.decrypt(Pkcs1v15Encrypt, &ciphertext).is_err());
    }

    #[test]
    fn test_padding_offsets_must_exist() {
        let key = private_key();
        // the padding of a 48 byte message in a 256 byte block is 208 bytes long
        assert!(pkcs1_encrypt(
            &key.to_public_key(),
            &[0; 48],
            &MutationSpec::new().substitute(208, 0)
        )
        .is_err());
    }

    #[test]
    fn test_pkcs1_signature_verifies() {
        let key = private_key();
        let sig = pkcs1_sign(&key, HashAlgorithm::Sha256, b"transcript", &MutationSpec::new())
            .unwrap();
        let public = signature::UnparsedPublicKey::new(
            &signature::RSA_PKCS1_2048_8192_SHA256,
            public_der(&key),
        );
        public.verify(b"transcript", &sig).unwrap();

        let broken = pkcs1_sign(
            &key,
            HashAlgorithm::Sha256,
            b"transcript",
            &MutationSpec::new().substitute(1, 0x02),
        )
        .unwrap();
        assert!(public.verify(b"transcript", &broken).is_err());
    }

    #[test]
    fn test_pss_signature_verifies() {
        let key = private_key();
        let sig = pss_sign(
            &key,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha256,
            b"transcript",
            32,
            &MutationSpec::new(),
        )
        .unwrap();
        let public = signature::UnparsedPublicKey::new(
            &signature::RSA_PSS_2048_8192_SHA256,
            public_der(&key),
        );
        public.verify(b"transcript", &sig).unwrap();

        let broken = pss_sign(
            &key,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha256,
            b"transcript",
            32,
            &MutationSpec::new().xor(-1, 0xff),
        )
        .unwrap();
        assert!(public.verify(b"transcript", &broken).is_err());
    }
}
