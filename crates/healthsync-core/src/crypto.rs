use ed25519_dalek::{
    Signature as EdSignature, Signer as _, SigningKey as EdSigningKey, VerifyingKey as EdVerifyingKey,
};
use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{
    Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Generates the Ed25519 key that signs the audit log's hash chain.
pub fn generate_audit_signing_key() -> EdSigningKey {
    EdSigningKey::generate(&mut OsRng)
}

pub fn sign_audit_entry(key: &EdSigningKey, bytes: &[u8]) -> EdSignature {
    key.sign(bytes)
}

pub fn verify_audit_entry(
    public: &EdVerifyingKey,
    bytes: &[u8],
    sig: &EdSignature,
) -> anyhow::Result<()> {
    public
        .verify_strict(bytes, sig)
        .map_err(|e| anyhow::anyhow!("audit signature verify failed: {e}"))
}

/// Generates the P-256 keypair used to self-sign the TLS server certificate.
pub fn generate_tls_signing_key() -> P256SigningKey {
    P256SigningKey::random(&mut OsRng)
}

pub fn sign_tbs(key: &P256SigningKey, tbs_der: &[u8]) -> P256Signature {
    key.sign(tbs_der)
}

/// Uncompressed SEC1 point (0x04 || X || Y) — the form the certificate's
/// subjectPublicKeyInfo BIT STRING wraps.
pub fn uncompressed_public_point(key: &P256VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(false).as_bytes().to_vec()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Constant-time comparison over the full length of both inputs: rejects on
/// length mismatch first, then XOR-accumulates every byte regardless of
/// whether a mismatch was already found.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
