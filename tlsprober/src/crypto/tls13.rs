//! HKDF based derivations of the TLS 1.3 key schedule, RFC 8446 section 7.1.

use prober::error::Error;
use ring::hkdf;

use crate::crypto::hash::HashAlgorithm;

/// Output length for ring's HKDF, which wants a type rather than a number.
struct Len(usize);

impl hkdf::KeyType for Len {
    fn len(&self) -> usize {
        self.0
    }
}

fn hkdf_algorithm(alg: HashAlgorithm) -> Result<hkdf::Algorithm, Error> {
    match alg {
        HashAlgorithm::Sha256 => Ok(hkdf::HKDF_SHA256),
        HashAlgorithm::Sha384 => Ok(hkdf::HKDF_SHA384),
        HashAlgorithm::Sha512 => Ok(hkdf::HKDF_SHA512),
        HashAlgorithm::Sha1 => Err(Error::Configuration(
            "TLS 1.3 does not use SHA-1 for key derivation".into(),
        )),
    }
}

/// HKDF-Extract. An empty `salt` behaves like a string of zeros, as HMAC pads keys anyway.
pub fn hkdf_extract(alg: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
    alg.hmac(salt, ikm)
}

pub fn hkdf_expand_label(
    alg: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    len: usize,
) -> Result<Vec<u8>, Error> {
    const PREFIX: &[u8] = b"tls13 ";
    let out_len = u16::try_from(len)
        .map_err(|_| Error::Configuration(format!("can not expand {} bytes", len)))?
        .to_be_bytes();
    let label_len = [(PREFIX.len() + label.len()) as u8];
    let context_len = [context.len() as u8];
    let info: [&[u8]; 6] = [
        &out_len,
        &label_len,
        PREFIX,
        label,
        &context_len,
        context,
    ];

    let prk = hkdf::Prk::new_less_safe(hkdf_algorithm(alg)?, secret);
    let mut out = vec![0u8; len];
    prk.expand(&info, Len(len))
        .and_then(|okm| okm.fill(&mut out))
        .map_err(|_| Error::Crypto(format!("HKDF-Expand-Label({:?})", label)))?;
    Ok(out)
}

/// Derive-Secret(secret, label, messages) with the transcript hash already computed.
pub fn derive_secret(
    alg: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    hkdf_expand_label(alg, secret, label, transcript_hash, alg.output_len())
}

/// Secret of the next stage: Extract(Derive-Secret(previous, "derived", ""), ikm).
pub fn next_stage(alg: HashAlgorithm, previous: &[u8], ikm: &[u8]) -> Result<Vec<u8>, Error> {
    let salt = derive_secret(alg, previous, b"derived", &alg.hash(&[]))?;
    Ok(hkdf_extract(alg, &salt, ikm))
}

pub fn finished_verify_data(
    alg: HashAlgorithm,
    base_key: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    let finished_key = hkdf_expand_label(alg, base_key, b"finished", &[], alg.output_len())?;
    Ok(alg.hmac(&finished_key, transcript_hash))
}

/// What the signature of a TLS 1.3 CertificateVerify covers, RFC 8446 section 4.4.3.
pub fn certificate_verify_content(from_server: bool, transcript_hash: &[u8]) -> Vec<u8> {
    let context: &[u8] = if from_server {
        b"TLS 1.3, server CertificateVerify"
    } else {
        b"TLS 1.3, client CertificateVerify"
    };
    let mut content = vec![0x20; 64];
    content.extend_from_slice(context);
    content.push(0);
    content.extend_from_slice(transcript_hash);
    content
}

/// Record protection key and IV of a traffic secret.
pub fn traffic_key_and_iv(
    alg: HashAlgorithm,
    traffic_secret: &[u8],
    key_len: usize,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let key = hkdf_expand_label(alg, traffic_secret, b"key", &[], key_len)?;
    let iv = hkdf_expand_label(alg, traffic_secret, b"iv", &[], 12)?;
    Ok((key, iv))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn early_secret() -> Vec<u8> {
        hkdf_extract(HashAlgorithm::Sha256, &[0; 32], &[0; 32])
    }

    #[test]
    fn test_early_and_derived_secret() {
        assert_eq!(
            hex::encode(early_secret()),
            "33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a"
        );
        let derived = derive_secret(
            HashAlgorithm::Sha256,
            &early_secret(),
            b"derived",
            &HashAlgorithm::Sha256.hash(&[]),
        )
        .unwrap();
        assert_eq!(
            hex::encode(derived),
            "6f2615a108c702c5678f54fc9dbab69716c076189c48250cebeac3576c3611ba"
        );
    }

    #[test]
    fn test_empty_salt_equals_zero_salt() {
        assert_eq!(
            hkdf_extract(HashAlgorithm::Sha256, &[], &[0; 32]),
            early_secret()
        );
    }

    #[test]
    fn test_traffic_key_and_iv() {
        let (key, iv) = traffic_key_and_iv(HashAlgorithm::Sha256, &early_secret(), 16).unwrap();
        assert_eq!(hex::encode(key), "ebbf95bddc9e43bd09465c5516ab2d5f");
        assert_eq!(hex::encode(iv), "a7bf78a10cf9feb156a93f7a");
    }

    #[test]
    fn test_finished_key() {
        let finished_key = hkdf_expand_label(
            HashAlgorithm::Sha256,
            &early_secret(),
            b"finished",
            &[],
            32,
        )
        .unwrap();
        assert_eq!(
            hex::encode(&finished_key),
            "b0b770a6c7649f57eb690b7b23fd4bb8f11382fd0bd3afaaa81d02a8410c587c"
        );

        let transcript = HashAlgorithm::Sha256.hash(b"messages");
        assert_eq!(
            finished_verify_data(HashAlgorithm::Sha256, &early_secret(), &transcript).unwrap(),
            HashAlgorithm::Sha256.hmac(&finished_key, &transcript)
        );
    }

    #[test]
    fn test_sha1_is_rejected() {
        assert!(hkdf_expand_label(HashAlgorithm::Sha1, &[0; 20], b"key", &[], 16).is_err());
    }

    #[test]
    fn test_certificate_verify_content() {
        let content = certificate_verify_content(true, &[0xaa; 32]);
        assert_eq!(content.len(), 64 + 33 + 1 + 32);
        assert!(content[..64].iter().all(|b| *b == 0x20));
        assert_eq!(&content[64..97], b"TLS 1.3, server CertificateVerify");
        assert_eq!(content[97], 0);
        assert_ne!(certificate_verify_content(false, &[0xaa; 32]), content);
    }
}
