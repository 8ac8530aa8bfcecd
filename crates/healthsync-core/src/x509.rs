//! Builds the single certificate shape this system ever issues: a
//! self-signed ECDSA P-256 leaf with no extensions, trusted only by pinned
//! SHA-256 fingerprint. See der.rs for the byte-level primitives.

use crate::crypto::{sha256_bytes, sign_tbs, uncompressed_public_point};
use crate::der;
use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::{Signature as P256Signature, SigningKey, VerifyingKey};
use rand::RngCore;

const OID_ECDSA_WITH_SHA256: &[u64] = &[1, 2, 840, 10045, 4, 3, 2];
const OID_ID_EC_PUBLIC_KEY: &[u64] = &[1, 2, 840, 10045, 2, 1];
const OID_PRIME256V1: &[u64] = &[1, 2, 840, 10045, 3, 1, 7];
const OID_COMMON_NAME: &[u64] = &[2, 5, 4, 3];

const SUBJECT_CN: &str = "HealthSync Local";
const VALIDITY_DAYS: i64 = 365;

fn signature_algorithm_identifier() -> Vec<u8> {
    der::sequence(&[der::oid(OID_ECDSA_WITH_SHA256), der::null()].concat())
}

fn name(cn: &str) -> Vec<u8> {
    let attr = der::sequence(&[der::oid(OID_COMMON_NAME), der::utf8_string(cn)].concat());
    der::sequence(&der::set(&attr))
}

fn validity(not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Vec<u8> {
    der::sequence(&[der::utc_time(not_before), der::utc_time(not_after)].concat())
}

fn subject_public_key_info(verifying_key: &VerifyingKey) -> Vec<u8> {
    let alg_id = der::sequence(&[der::oid(OID_ID_EC_PUBLIC_KEY), der::oid(OID_PRIME256V1)].concat());
    let bit_string = der::bit_string(&uncompressed_public_point(verifying_key));
    der::sequence(&[alg_id, bit_string].concat())
}

fn build_tbs(
    serial: u64,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    verifying_key: &VerifyingKey,
) -> Vec<u8> {
    let version = der::context_explicit(0, &der::integer_u64(2));
    let serial_der = der::integer(&serial.to_be_bytes());
    let sig_alg = signature_algorithm_identifier();
    let issuer = name(SUBJECT_CN);
    let validity_der = validity(not_before, not_after);
    let subject = name(SUBJECT_CN);
    let spki = subject_public_key_info(verifying_key);
    der::sequence(&[version, serial_der, sig_alg, issuer, validity_der, subject, spki].concat())
}

fn der_signature(sig: &P256Signature) -> Vec<u8> {
    let bytes = sig.to_bytes();
    der::sequence(&[der::integer(&bytes[..32]), der::integer(&bytes[32..])].concat())
}

/// Builds and signs a fresh self-signed certificate for `signing_key`.
pub fn build_self_signed_certificate(signing_key: &SigningKey) -> Vec<u8> {
    let verifying_key = signing_key.verifying_key();
    let mut serial_bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut serial_bytes);
    let serial = u64::from_be_bytes(serial_bytes);

    let not_before = Utc::now();
    let not_after = not_before + Duration::days(VALIDITY_DAYS);
    let tbs = build_tbs(serial, not_before, not_after, &verifying_key);

    let signature = sign_tbs(signing_key, &tbs);
    let sig_alg = signature_algorithm_identifier();
    let sig_bit_string = der::bit_string(&der_signature(&signature));

    der::sequence(&[tbs, sig_alg, sig_bit_string].concat())
}

pub fn fingerprint_sha256(cert_der: &[u8]) -> [u8; 32] {
    sha256_bytes(cert_der)
}

pub fn fingerprint_sha256_hex(cert_der: &[u8]) -> String {
    crate::crypto::sha256_hex(cert_der)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_is_well_formed_der_sequence() {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let cert = build_self_signed_certificate(&key);
        assert_eq!(cert[0], 0x30); // SEQUENCE tag
        assert!(cert.len() > 100);
    }

    #[test]
    fn fingerprint_is_deterministic_for_same_bytes() {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let cert = build_self_signed_certificate(&key);
        assert_eq!(fingerprint_sha256(&cert), fingerprint_sha256(&cert));
        assert_eq!(fingerprint_sha256_hex(&cert).len(), 64);
    }

    #[test]
    fn two_certificates_from_different_keys_differ() {
        let key_a = SigningKey::random(&mut rand::rngs::OsRng);
        let key_b = SigningKey::random(&mut rand::rngs::OsRng);
        let cert_a = build_self_signed_certificate(&key_a);
        let cert_b = build_self_signed_certificate(&key_b);
        assert_ne!(fingerprint_sha256(&cert_a), fingerprint_sha256(&cert_b));
    }
}
