//! The TLS 1.2 pseudo random function and what the handshake derives with it.

use crate::crypto::hash::HashAlgorithm;

/// P_hash of RFC 5246, section 5.
fn p_hash(alg: HashAlgorithm, out: &mut [u8], secret: &[u8], seed: &[u8]) {
    let mut a = alg.hmac(secret, seed);
    let mut offset = 0;
    while offset < out.len() {
        let block = alg.hmac_parts(secret, &[a.as_slice(), seed]);
        let take = block.len().min(out.len() - offset);
        out[offset..offset + take].copy_from_slice(&block[..take]);
        offset += take;
        a = alg.hmac(secret, &a);
    }
}

pub fn prf(alg: HashAlgorithm, secret: &[u8], label: &[u8], seed: &[u8], len: usize) -> Vec<u8> {
    let mut joined = Vec::with_capacity(label.len() + seed.len());
    joined.extend_from_slice(label);
    joined.extend_from_slice(seed);
    let mut out = vec![0u8; len];
    p_hash(alg, &mut out, secret, &joined);
    out
}

pub fn master_secret(
    alg: HashAlgorithm,
    premaster_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Vec<u8> {
    let seed = [client_random, server_random].concat();
    prf(alg, premaster_secret, b"master secret", &seed, 48)
}

/// RFC 7627: the master secret bound to the session hash instead of the randoms.
pub fn extended_master_secret(
    alg: HashAlgorithm,
    premaster_secret: &[u8],
    session_hash: &[u8],
) -> Vec<u8> {
    prf(
        alg,
        premaster_secret,
        b"extended master secret",
        session_hash,
        48,
    )
}

/// Key expansion. Note the randoms are in the opposite order than for the master secret.
pub fn key_block(
    alg: HashAlgorithm,
    master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    len: usize,
) -> Vec<u8> {
    let seed = [server_random, client_random].concat();
    prf(alg, master_secret, b"key expansion", &seed, len)
}

pub fn finished_verify_data(
    alg: HashAlgorithm,
    master_secret: &[u8],
    from_client: bool,
    handshake_hash: &[u8],
) -> Vec<u8> {
    let label: &[u8] = if from_client {
        b"client finished"
    } else {
        b"server finished"
    };
    prf(alg, master_secret, label, handshake_hash, 12)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_sha256_vector() {
        let secret = hex::decode("9bbe436ba940f017b17652849a71db35").unwrap();
        let seed = hex::decode("a0ba9f936cda311827a6f796ffd5198c").unwrap();
        let out = prf(HashAlgorithm::Sha256, &secret, b"test label", &seed, 100);
        assert_eq!(
            hex::encode(out),
            "e3f229ba727be17b8d122620557cd453c2aab21d07c3d495329b52d4e61edb5a\
             6b301791e90d35c9c9a46b4e14baf9af0fa022f7077def17abfd3797c0564bab\
             4fbc91666e9def9b97fce34f796789baa48082d122ee42c5a72e5a5110fff701\
             87347b66"
        );
    }

    #[test]
    fn test_output_is_prefix_stable() {
        let long = prf(HashAlgorithm::Sha384, b"secret", b"label", b"seed", 120);
        let short = prf(HashAlgorithm::Sha384, b"secret", b"label", b"seed", 13);
        assert_eq!(&long[..13], short.as_slice());
    }

    #[test]
    fn test_master_secret_depends_on_random_order() {
        let pms = [3u8; 48];
        let a = master_secret(HashAlgorithm::Sha256, &pms, &[1; 32], &[2; 32]);
        let b = master_secret(HashAlgorithm::Sha256, &pms, &[2; 32], &[1; 32]);
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }
}
