//! Minimal hand-rolled ASN.1 DER encoder.
//!
//! Covers exactly the constructs the self-signed certificate shape needs:
//! SEQUENCE, SET, INTEGER (leading-zero rule), OBJECT IDENTIFIER (base-128
//! arcs), UTF8String, PrintableString, UTCTime, BIT STRING, NULL, and
//! EXPLICIT context-specific wrappers. No decoder — the service never
//! parses certificates, only builds them and pins their SHA-256 fingerprint.

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_UTF8_STRING: u8 = 0x0c;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;

fn encode_length(len: usize) -> Vec<u8> {
    if len < 128 {
        vec![len as u8]
    } else {
        let mut bytes = Vec::new();
        let mut n = len;
        while n > 0 {
            bytes.insert(0, (n & 0xff) as u8);
            n >>= 8;
        }
        let mut out = vec![0x80 | bytes.len() as u8];
        out.extend(bytes);
        out
    }
}

fn tlv(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_length(contents.len()));
    out.extend_from_slice(contents);
    out
}

pub fn sequence(contents: &[u8]) -> Vec<u8> {
    tlv(TAG_SEQUENCE, contents)
}

pub fn set(contents: &[u8]) -> Vec<u8> {
    tlv(TAG_SET, contents)
}

pub fn null() -> Vec<u8> {
    tlv(TAG_NULL, &[])
}

/// Positive INTEGER from a big-endian byte string. Strips redundant leading
/// zero bytes, then reinstates a single leading zero if the high bit of the
/// first remaining byte is set (else DER would read it as negative).
pub fn integer(bytes: &[u8]) -> Vec<u8> {
    let mut trimmed = bytes;
    while trimmed.len() > 1 && trimmed[0] == 0 && trimmed[1] & 0x80 == 0 {
        trimmed = &trimmed[1..];
    }
    let mut content = Vec::new();
    if trimmed.is_empty() {
        content.push(0);
    } else if trimmed[0] & 0x80 != 0 {
        content.push(0);
        content.extend_from_slice(trimmed);
    } else {
        content.extend_from_slice(trimmed);
    }
    tlv(TAG_INTEGER, &content)
}

pub fn integer_u64(value: u64) -> Vec<u8> {
    integer(&value.to_be_bytes())
}

/// OBJECT IDENTIFIER. First two arcs are combined as `40*a + b`; the
/// remainder is base-128 encoded with the continuation bit set on every
/// byte but the last of each arc.
pub fn oid(arcs: &[u64]) -> Vec<u8> {
    assert!(arcs.len() >= 2, "OID needs at least two arcs");
    let mut content = Vec::new();
    content.extend(base128(40 * arcs[0] + arcs[1]));
    for &arc in &arcs[2..] {
        content.extend(base128(arc));
    }
    tlv(TAG_OID, &content)
}

fn base128(mut value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let mut groups = Vec::new();
    while value > 0 {
        groups.push((value & 0x7f) as u8);
        value >>= 7;
    }
    groups.reverse();
    let last = groups.len() - 1;
    groups
        .iter()
        .enumerate()
        .map(|(i, &b)| if i == last { b } else { b | 0x80 })
        .collect()
}

pub fn utf8_string(s: &str) -> Vec<u8> {
    tlv(TAG_UTF8_STRING, s.as_bytes())
}

pub fn printable_string(s: &str) -> Vec<u8> {
    tlv(TAG_PRINTABLE_STRING, s.as_bytes())
}

/// UTCTime in `YYMMDDhhmmssZ` form.
pub fn utc_time(dt: chrono::DateTime<chrono::Utc>) -> Vec<u8> {
    let formatted = dt.format("%y%m%d%H%M%SZ").to_string();
    tlv(TAG_UTC_TIME, formatted.as_bytes())
}

/// BIT STRING with a leading "unused bits" byte (always 0 here — every
/// caller passes a whole number of bytes).
pub fn bit_string(bytes: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(bytes.len() + 1);
    content.push(0);
    content.extend_from_slice(bytes);
    tlv(TAG_BIT_STRING, &content)
}

/// EXPLICIT context-specific wrapper `[n]` around an already-encoded TLV.
pub fn context_explicit(tag_number: u8, inner_der: &[u8]) -> Vec<u8> {
    tlv(0xa0 | tag_number, inner_der)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_length() {
        let t = sequence(&[0u8; 10]);
        assert_eq!(t[1], 10);
    }

    #[test]
    fn long_form_length() {
        let contents = vec![0u8; 200];
        let t = sequence(&contents);
        assert_eq!(t[1], 0x81);
        assert_eq!(t[2], 200);
    }

    #[test]
    fn integer_gets_leading_zero_when_high_bit_set() {
        let t = integer(&[0x80]);
        // tag, length 2, leading zero, 0x80
        assert_eq!(t, vec![TAG_INTEGER, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn integer_strips_redundant_leading_zeros() {
        let t = integer(&[0x00, 0x00, 0x01]);
        assert_eq!(t, vec![TAG_INTEGER, 0x01, 0x01]);
    }

    #[test]
    fn oid_ecdsa_with_sha256() {
        // 1.2.840.10045.4.3.2
        let t = oid(&[1, 2, 840, 10045, 4, 3, 2]);
        assert_eq!(t, vec![0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02]);
    }

    #[test]
    fn bit_string_has_unused_bits_prefix() {
        let t = bit_string(&[0xff, 0x00]);
        assert_eq!(t, vec![TAG_BIT_STRING, 0x03, 0x00, 0xff, 0x00]);
    }
}
