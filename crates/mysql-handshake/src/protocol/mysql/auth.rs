//! mysql_native_password on the server side
//!
//! Salt generation and verification of the client's scrambled password.
//! Reference: <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_authentication_methods_native_password_authentication.html>

use rand::Rng;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

use super::packets::SALT_LEN;

/// Name of the only auth method this server understands
pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";

/// Generate a fresh 20-byte salt
///
/// NUL bytes would end the second salt fragment early in clients that treat
/// it as a C string, so they are avoided, as is 0xFF.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];

    for byte in salt.iter_mut() {
        *byte = loop {
            let b: u8 = rng.gen();
            if b != 0 && b != 0xFF {
                break b;
            }
        };
    }

    salt
}

/// Stored form of a password: `SHA1(SHA1(password))`, as in `mysql.user`
pub fn hash_password(password: &str) -> [u8; 20] {
    let stage1 = Sha1::digest(password.as_bytes());
    let mut stored = [0u8; 20];
    stored.copy_from_slice(&Sha1::digest(stage1));
    stored
}

/// Client-side scramble:
///
/// ```text
/// SHA1( password ) XOR SHA1( salt + SHA1( SHA1( password ) ) )
/// ```
///
/// Empty passwords produce an empty response.
pub fn compute_auth_response(password: &str, salt: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stage2);
    let stage3 = hasher.finalize();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// Verify a client auth response against a stored `SHA1(SHA1(password))`
pub fn verify_auth_response(auth_response: &[u8], salt: &[u8], stored_hash: &[u8; 20]) -> bool {
    if auth_response.len() != 20 || salt.len() != SALT_LEN {
        return false;
    }

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stored_hash);
    let stage3 = hasher.finalize();

    // XOR gives back SHA1(password)
    let recovered_stage1: Vec<u8> = auth_response
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect();

    let computed = Sha1::digest(&recovered_stage1);

    computed.as_slice().ct_eq(&stored_hash[..]).into()
}
