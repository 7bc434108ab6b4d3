use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::{rng, Rng, RngCore};
use sha2::{Digest, Sha256};

pub(crate) const OTP_TTL_MINUTES: i64 = 10;
pub(crate) const RESET_TOKEN_TTL_MINUTES: i64 = 15;
const RESET_TOKEN_BYTES: usize = 32;

/// Six-digit verification code.
pub(crate) fn generate_otp() -> String {
    rng().random_range(100_000..=999_999_u32).to_string()
}

pub(crate) fn generate_urlsafe_token(bytes: usize) -> String {
    let mut buffer = vec![0_u8; bytes];
    rng().fill_bytes(buffer.as_mut_slice());
    URL_SAFE_NO_PAD.encode(buffer)
}

pub(crate) fn generate_reset_token() -> String {
    let mut buffer = [0_u8; RESET_TOKEN_BYTES];
    rng().fill_bytes(&mut buffer);
    hex_encode(&buffer)
}

pub(crate) fn sha256_hex(value: &str) -> String {
    hex_encode(&Sha256::digest(value.as_bytes()))
}

pub(crate) fn pkce_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

pub(crate) fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let mut diff = 0_u8;
    for (a, b) in lhs.iter().zip(rhs.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(format!("{:02x}", byte).as_str());
    }
    out
}

pub(crate) async fn hash_password(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("password hashing task failed")?
        .context("password hashing failed")
}

pub(crate) async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, hash.as_str()))
        .await
        .context("password verification task failed")?
        .context("stored password hash is unreadable")
}
