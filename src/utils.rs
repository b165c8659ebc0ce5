//! Shared cryptographic helpers: the SHA-256 and HMAC-SHA-256 primitives,
//! the iterated `Hi` stretch, proof derivation, and the random values used
//! across the handshake.

use rand::distributions::Alphanumeric;
use rand::{CryptoRng, Rng, RngCore};
use ring::digest::{digest, SHA256};
use ring::hmac;
use zeroize::Zeroize;

use crate::{KEY_LEN, NONCE_LEN, SALT_LEN, TOKEN_LEN};

pub(crate) const CLIENT_KEY_TEXT: &[u8] = b"Client Key";
pub(crate) const SERVER_KEY_TEXT: &[u8] = b"Server Key";

/// Computes the SHA-256 digest of `data`.
pub(crate) fn sha256(data: &[u8]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// The HMAC-SHA-256 keyed hash defined in RFC 2104.
pub(crate) fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; KEY_LEN] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(hmac::sign(&key, message).as_ref());
    out
}

/// The iterated `Hi` hash from RFC 5802: `U1 = HMAC(password, salt ‖
/// iter_count as four big-endian bytes)`, `Ui = HMAC(password, U(i-1))`,
/// XOR-folded over all `Ui`.
///
/// Runs exactly `iter_count` HMAC invocations under one reusable key; the
/// iteration count directly gates brute-force cost. The trailing four bytes
/// are the iteration count itself, so a stock PBKDF2 (which appends a block
/// index there) produces different output.
pub(crate) fn hi(password: &[u8], salt: &[u8], iter_count: u32) -> [u8; KEY_LEN] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, password);

    let mut seed = Vec::with_capacity(salt.len() + 4);
    seed.extend_from_slice(salt);
    seed.extend_from_slice(&iter_count.to_be_bytes());

    let mut u = [0u8; KEY_LEN];
    u.copy_from_slice(hmac::sign(&key, &seed).as_ref());
    let mut out = u;

    for _ in 1..iter_count {
        let next = hmac::sign(&key, &u);
        u.copy_from_slice(next.as_ref());
        for (acc, byte) in out.iter_mut().zip(u.iter()) {
            *acc ^= *byte;
        }
    }

    out
}

/// Derives the client proof and the server signature for one exchange from
/// the salted password and the assembled auth message.
pub(crate) fn find_proofs(
    salted_password: &[u8],
    auth_message: &[u8],
) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
    let mut client_key = hmac_sha256(salted_password, CLIENT_KEY_TEXT);
    let stored_key = sha256(&client_key);
    let client_signature = hmac_sha256(&stored_key, auth_message);

    let server_key = hmac_sha256(salted_password, SERVER_KEY_TEXT);
    let server_signature = hmac_sha256(&server_key, auth_message);

    let mut client_proof = [0u8; KEY_LEN];
    for (proof, (key, sig)) in client_proof
        .iter_mut()
        .zip(client_key.iter().zip(client_signature.iter()))
    {
        *proof = key ^ sig;
    }
    client_key.zeroize();

    (client_proof, server_signature)
}

/// A fresh 30-byte nonce from the injected random source.
pub(crate) fn random_nonce<R: Rng + CryptoRng>(rng: &mut R) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);
    nonce
}

/// A fresh 24-byte salt for credential enrollment.
pub(crate) fn random_salt<R: Rng + CryptoRng>(rng: &mut R) -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    salt
}

/// A fresh 30-character opaque token drawn from the 62-symbol alphanumeric
/// alphabet.
pub(crate) fn new_token<R: Rng + CryptoRng>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}
