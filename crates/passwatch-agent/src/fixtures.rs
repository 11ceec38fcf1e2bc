//! Hand-built OpenPGP packets for tests.

use crate::packet::{TAG_ENCRYPTED_SESSION_KEY, TAG_PUBLIC_KEY, TAG_PUBLIC_SUBKEY};

pub const RSA_KEY_ID: u64 = 0x839D_730A_0D3B_B649;
pub const RSA_FINGERPRINT_SHORT: &str = "0D3BB649";
pub const RSA_KEYGRIP: &str = "05FE88881D24AE9F09F2084FF1742D3804133019";
pub const DSA_KEY_ID: u64 = 0xFE37_C5D2_F892_CB27;
pub const DSA_FINGERPRINT_SHORT: &str = "F892CB27";
/// Low 64 bits of [`rsa_modulus`].
pub const V3_RSA_KEY_ID: u64 = 0x7879_7A7B_7C7D_7E7F;

const CREATED: [u8; 4] = [0x5F, 0x00, 0x00, 0x00];

pub fn new_packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xC0 | tag];
    let len = body.len();
    if len < 192 {
        out.push(len as u8);
    } else if len < 8384 {
        let rest = len - 192;
        out.push((rest >> 8) as u8 + 192);
        out.push(rest as u8);
    } else {
        out.push(255);
        out.extend((len as u32).to_be_bytes());
    }
    out.extend_from_slice(body);
    out
}

pub fn old_packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len();
    let mut out = Vec::new();
    if len < 256 {
        out.push(0x80 | (tag << 2));
        out.push(len as u8);
    } else {
        out.push(0x80 | (tag << 2) | 1);
        out.extend((len as u16).to_be_bytes());
    }
    out.extend_from_slice(body);
    out
}

pub fn mpi(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let bytes = &bytes[start..];
    let bits = match bytes.first() {
        Some(first) => (bytes.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    };
    let mut out = (bits as u16).to_be_bytes().to_vec();
    out.extend_from_slice(bytes);
    out
}

/// 1024-bit modulus: `0xC0` followed by the bytes 1..=127.
pub fn rsa_modulus() -> Vec<u8> {
    let mut modulus = vec![0xC0];
    modulus.extend(1u8..128);
    modulus
}

pub fn rsa_key_body() -> Vec<u8> {
    key_body(1, &[mpi(&rsa_modulus()), mpi(&[1, 0, 1])])
}

pub fn dsa_key_body() -> Vec<u8> {
    let mut p = vec![0x80];
    p.extend([0x11; 127]);
    let mut q = vec![0x90];
    q.extend([0x22; 19]);
    key_body(17, &[mpi(&p), mpi(&q), mpi(&[0x05]), mpi(&[0x33; 128])])
}

/// Version 3 key over the same modulus as [`rsa_key_body`].
pub fn v3_rsa_key_body() -> Vec<u8> {
    let mut body = vec![3];
    body.extend(CREATED);
    body.extend([0, 0]); // never expires
    body.push(1);
    body.extend(mpi(&rsa_modulus()));
    body.extend(mpi(&[1, 0, 1]));
    body
}

/// ECDSA key on NIST P-256 with an uncompressed 65-byte point.
pub fn ecdsa_p256_key_body() -> Vec<u8> {
    let oid = [0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
    let mut material = vec![oid.len() as u8];
    material.extend(oid);
    let mut point = vec![0x04];
    point.extend([0x5C; 64]);
    material.extend(mpi(&point));
    key_body(19, &[material])
}

/// Key body for an algorithm whose material this crate does not parse.
pub fn eddsa_key_body() -> Vec<u8> {
    let oid = [0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];
    let mut material = vec![oid.len() as u8];
    material.extend(oid);
    material.extend(mpi(&[0x40; 33]));
    key_body(22, &[material])
}

fn key_body(algorithm: u8, material: &[Vec<u8>]) -> Vec<u8> {
    let mut body = vec![4];
    body.extend(CREATED);
    body.push(algorithm);
    for part in material {
        body.extend_from_slice(part);
    }
    body
}

/// Keyring from `(tag, body)` pairs, with a user id after each primary key.
pub fn keyring(keys: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (tag, body) in keys {
        out.extend(new_packet(*tag, body));
        if *tag == TAG_PUBLIC_KEY {
            out.extend(new_packet(13, b"Test User <test@example.org>"));
        }
    }
    out
}

/// Primary DSA key with the RSA key as encryption subkey.
pub fn default_keyring() -> Vec<u8> {
    keyring(&[
        (TAG_PUBLIC_KEY, dsa_key_body()),
        (TAG_PUBLIC_SUBKEY, rsa_key_body()),
    ])
}

/// Session key packet for `key_id` followed by a partially-framed data packet.
pub fn encrypted_file(key_id: u64) -> Vec<u8> {
    let mut pkesk = vec![3];
    pkesk.extend(key_id.to_be_bytes());
    pkesk.push(1);
    pkesk.extend(mpi(&[0x5A; 128]));

    let mut out = old_packet(TAG_ENCRYPTED_SESSION_KEY, &pkesk);
    out.extend([0xC0 | 18, 0xE5]); // 32-byte partial chunk
    out.extend([0x01; 32]);
    out.extend([4, 0x02, 0x02, 0x02, 0x02]);
    out
}
