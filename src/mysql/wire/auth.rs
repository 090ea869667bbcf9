//! Authentication scrambles for the MySQL handshake.
//!
//! Implements:
//! - `mysql_native_password` (SHA1-based, legacy)
//! - `caching_sha2_password` (SHA256-based, MySQL 8+ default)

use sha1::{Digest as Sha1Digest, Sha1};
use sha2::Sha256;

/// `mysql_native_password` response.
///
/// Formula: SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))
pub(crate) fn scramble_native_password(password: &[u8], scramble: &[u8]) -> [u8; 20] {
    let password_hash = Sha1::digest(password);
    let password_hash2 = Sha1::digest(password_hash);

    let mut mixer = Sha1::new();
    mixer.update(scramble);
    mixer.update(password_hash2);
    let mix = mixer.finalize();

    let mut response = [0u8; 20];
    for (i, byte) in response.iter_mut().enumerate() {
        *byte = password_hash[i] ^ mix[i];
    }
    response
}

/// `caching_sha2_password` fast-path response.
///
/// Formula: SHA256(password) XOR SHA256(SHA256(SHA256(password)) + scramble)
pub(crate) fn scramble_caching_sha2(password: &[u8], scramble: &[u8]) -> [u8; 32] {
    let password_hash = Sha256::digest(password);
    let password_hash2 = Sha256::digest(password_hash);

    let mut mixer = Sha256::new();
    mixer.update(password_hash2);
    mixer.update(scramble);
    let mix = mixer.finalize();

    let mut response = [0u8; 32];
    for (i, byte) in response.iter_mut().enumerate() {
        *byte = password_hash[i] ^ mix[i];
    }
    response
}
