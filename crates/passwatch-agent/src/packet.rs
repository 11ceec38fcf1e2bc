//! Minimal OpenPGP (RFC 4880) packet reader.
//!
//! Only what key lookup needs: packet framing, the recipient key id of public
//! key encrypted session key packets, and version 3 and 4 public (sub)key
//! packets.

use std::{borrow::Cow, fs, path::Path};

use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::debug;

/// Public-key encrypted session key packet.
pub const TAG_ENCRYPTED_SESSION_KEY: u8 = 1;
pub const TAG_PUBLIC_KEY: u8 = 6;
pub const TAG_PUBLIC_SUBKEY: u8 = 14;

/// Errors produced while reading packet data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet data truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("invalid packet header {byte:#04x} at offset {offset}")]
    InvalidHeader { byte: u8, offset: usize },
    #[error("unsupported key packet version {version}")]
    UnsupportedVersion { version: u8 },
}

/// One packet: its tag and body.
///
/// Bodies split into partial chunks are reassembled, everything else borrows
/// from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<'a> {
    pub tag: u8,
    pub body: Cow<'a, [u8]>,
}

/// Iterates over the packets in a byte buffer. Stops after the first error.
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8, PacketError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(PacketError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(PacketError::Truncated { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn be_len(&mut self, width: usize) -> Result<usize, PacketError> {
        let bytes = self.take_bytes(width)?;
        Ok(bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
    }

    fn read_packet(&mut self) -> Result<Packet<'a>, PacketError> {
        let offset = self.pos;
        let header = self.byte()?;
        if header & 0x80 == 0 {
            return Err(PacketError::InvalidHeader {
                byte: header,
                offset,
            });
        }

        if header & 0x40 == 0 {
            // Old format: tag in bits 5..2, length type in bits 1..0.
            let tag = (header >> 2) & 0x0f;
            let len = match header & 0x03 {
                0 => self.be_len(1)?,
                1 => self.be_len(2)?,
                2 => self.be_len(4)?,
                _ => self.data.len() - self.pos,
            };
            let body = self.take_bytes(len)?;
            return Ok(Packet {
                tag,
                body: Cow::Borrowed(body),
            });
        }

        let tag = header & 0x3f;
        let mut chunks: Option<Vec<u8>> = None;
        loop {
            let first = self.byte()?;
            let (len, partial) = match first {
                0..=191 => (usize::from(first), false),
                192..=223 => {
                    let second = self.byte()?;
                    ((usize::from(first - 192) << 8) + usize::from(second) + 192, false)
                }
                255 => (self.be_len(4)?, false),
                _ => (1usize << (first & 0x1f), true),
            };
            let chunk = self.take_bytes(len)?;

            if let Some(buf) = chunks.as_mut() {
                buf.extend_from_slice(chunk);
            } else if partial {
                chunks = Some(chunk.to_vec());
            } else {
                return Ok(Packet {
                    tag,
                    body: Cow::Borrowed(chunk),
                });
            }
            if !partial {
                break;
            }
        }

        Ok(Packet {
            tag,
            body: Cow::Owned(chunks.unwrap_or_default()),
        })
    }
}

impl<'a> Iterator for PacketReader<'a> {
    type Item = Result<Packet<'a>, PacketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let packet = self.read_packet();
        if packet.is_err() {
            self.pos = self.data.len();
        }
        Some(packet)
    }
}

/// Recipient key id of the first version 3 encrypted session key packet.
///
/// Returns `None` when the data holds no such packet, is malformed before one
/// is found, or names the anonymous recipient (key id 0).
pub fn encrypted_key_id(data: &[u8]) -> Option<u64> {
    for packet in PacketReader::new(data) {
        let packet = match packet {
            Ok(packet) => packet,
            Err(err) => {
                debug!(%err, "stopped scanning for session key packet");
                return None;
            }
        };
        if packet.tag != TAG_ENCRYPTED_SESSION_KEY {
            continue;
        }
        match packet.body.get(..9) {
            Some([3, id @ ..]) => {
                let mut key_id = [0u8; 8];
                key_id.copy_from_slice(id);
                return Some(u64::from_be_bytes(key_id)).filter(|id| *id != 0);
            }
            _ => debug!("skipping unsupported session key packet"),
        }
    }
    None
}

/// [`encrypted_key_id`] of a file on disk. Unreadable files have no key id.
pub fn find_key_id(path: &Path) -> Option<u64> {
    match fs::read(path) {
        Ok(data) => encrypted_key_id(&data),
        Err(err) => {
            debug!(path = %path.display(), %err, "cannot read credential file");
            None
        }
    }
}

/// Public-key algorithm families this crate knows how to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyAlgorithm {
    Rsa,
    RsaEncryptOnly,
    RsaSignOnly,
    ElGamal,
    Dsa,
    Ecdh,
    Ecdsa,
    Unknown(u8),
}

impl From<u8> for PublicKeyAlgorithm {
    fn from(id: u8) -> Self {
        match id {
            1 => Self::Rsa,
            2 => Self::RsaEncryptOnly,
            3 => Self::RsaSignOnly,
            16 => Self::ElGamal,
            17 => Self::Dsa,
            18 => Self::Ecdh,
            19 => Self::Ecdsa,
            other => Self::Unknown(other),
        }
    }
}

impl PublicKeyAlgorithm {
    /// Fixed display name, `None` for unknown algorithms.
    pub fn display_name(self) -> Option<&'static str> {
        match self {
            Self::Rsa => Some("RSA"),
            Self::RsaEncryptOnly => Some("RSA Encrypt only"),
            Self::RsaSignOnly => Some("RSA Sign only"),
            Self::ElGamal => Some("ElGamal"),
            Self::Dsa => Some("DSA"),
            Self::Ecdh => Some("ECDH"),
            Self::Ecdsa => Some("ECDSA"),
            Self::Unknown(_) => None,
        }
    }

    /// Whether a keygrip can be derived for agent cache queries.
    ///
    /// Only plain RSA is supported; the other families hash different key
    /// material and are reported as not cached.
    pub fn supports_keygrip(self) -> bool {
        matches!(self, Self::Rsa)
    }
}

/// A version 3 or 4 public key or subkey from a keyring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub algorithm: PublicKeyAlgorithm,
    /// SHA-1 fingerprint, `None` for version 3 keys.
    pub fingerprint: Option<[u8; 20]>,
    pub key_id: u64,
    pub is_subkey: bool,
    /// Bit length of the modulus or prime, or the size of the named curve.
    pub bit_length: u16,
    /// RSA modulus without leading zero bytes (RSA families only).
    pub rsa_modulus: Option<Vec<u8>>,
}

impl PublicKey {
    /// Parse the body of a public key or public subkey packet.
    pub fn parse(body: &[u8], is_subkey: bool) -> Result<Self, PacketError> {
        let mut reader = PacketReader::new(body);
        let version = reader.byte()?;
        match version {
            // Creation time, then days of validity.
            3 => reader.take_bytes(6)?,
            4 => reader.take_bytes(4)?,
            _ => return Err(PacketError::UnsupportedVersion { version }),
        };
        let algorithm = PublicKeyAlgorithm::from(reader.byte()?);

        let (bit_length, rsa_modulus) = match algorithm {
            PublicKeyAlgorithm::Rsa
            | PublicKeyAlgorithm::RsaEncryptOnly
            | PublicKeyAlgorithm::RsaSignOnly => {
                let modulus = strip_leading_zeros(read_mpi(&mut reader)?);
                (bit_len(modulus), Some(modulus.to_vec()))
            }
            PublicKeyAlgorithm::Dsa | PublicKeyAlgorithm::ElGamal => {
                (bit_len(read_mpi(&mut reader)?), None)
            }
            PublicKeyAlgorithm::Ecdh | PublicKeyAlgorithm::Ecdsa => {
                let oid_len = usize::from(reader.byte()?);
                let oid = reader.take_bytes(oid_len)?;
                let bits = curve_bits(oid).unwrap_or_else(|| {
                    debug!(oid = %hex::encode(oid), "unknown curve");
                    0
                });
                (bits, None)
            }
            PublicKeyAlgorithm::Unknown(_) => (0, None),
        };

        if version == 3 {
            // Version 3 key ids are the low 64 bits of the RSA modulus.
            let Some(modulus) = rsa_modulus.as_deref().filter(|m| m.len() >= 8) else {
                return Err(PacketError::UnsupportedVersion { version });
            };
            let mut key_id = [0u8; 8];
            key_id.copy_from_slice(&modulus[modulus.len() - 8..]);
            return Ok(Self {
                algorithm,
                fingerprint: None,
                key_id: u64::from_be_bytes(key_id),
                is_subkey,
                bit_length,
                rsa_modulus,
            });
        }

        let fingerprint = v4_fingerprint(body);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&fingerprint[12..]);

        Ok(Self {
            algorithm,
            fingerprint: Some(fingerprint),
            key_id: u64::from_be_bytes(key_id),
            is_subkey,
            bit_length,
            rsa_modulus,
        })
    }

    /// Low 32 bits of the key id as uppercase hex, e.g. `0D3BB649`.
    pub fn fingerprint_short(&self) -> String {
        format!("{:08X}", self.key_id as u32)
    }
}

/// Every version 3 or 4 public key and subkey in a binary keyring.
///
/// Keys with other versions or malformed bodies are skipped; framing errors
/// abort the parse.
pub fn parse_keyring(data: &[u8]) -> Result<Vec<PublicKey>, PacketError> {
    let mut keys = Vec::new();
    for packet in PacketReader::new(data) {
        let packet = packet?;
        let is_subkey = match packet.tag {
            TAG_PUBLIC_KEY => false,
            TAG_PUBLIC_SUBKEY => true,
            _ => continue,
        };
        match PublicKey::parse(&packet.body, is_subkey) {
            Ok(key) => keys.push(key),
            Err(err) => debug!(%err, "skipping key packet"),
        }
    }
    Ok(keys)
}

fn read_mpi<'a>(reader: &mut PacketReader<'a>) -> Result<&'a [u8], PacketError> {
    let bits = reader.be_len(2)?;
    reader.take_bytes(bits.div_ceil(8))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn bit_len(bytes: &[u8]) -> u16 {
    let bytes = strip_leading_zeros(bytes);
    let Some(first) = bytes.first() else {
        return 0;
    };
    let bits = (bytes.len() - 1) * 8 + (8 - first.leading_zeros() as usize);
    u16::try_from(bits).unwrap_or(u16::MAX)
}

/// Field size in bits of a named elliptic curve, keyed by its DER OID body.
fn curve_bits(oid: &[u8]) -> Option<u16> {
    match oid {
        [0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07] => Some(256), // NIST P-256
        [0x2B, 0x81, 0x04, 0x00, 0x22] => Some(384),                   // NIST P-384
        [0x2B, 0x81, 0x04, 0x00, 0x23] => Some(521),                   // NIST P-521
        [0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x07] => Some(256),
        [0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0B] => Some(384),
        [0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x0D] => Some(512),
        [0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01] => Some(255), // Curve25519
        _ => None,
    }
}

fn v4_fingerprint(body: &[u8]) -> [u8; 20] {
    let len = u16::try_from(body.len()).unwrap_or(u16::MAX);
    let mut hasher = Sha1::new();
    hasher.update([0x99]);
    hasher.update(len.to_be_bytes());
    hasher.update(body);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, RSA_FINGERPRINT_SHORT, RSA_KEY_ID};

    #[test]
    fn reads_new_format_lengths() {
        let short = fixtures::new_packet(13, &[7; 10]);
        let two_octet = fixtures::new_packet(13, &[7; 1000]);
        let five_octet = fixtures::new_packet(13, &[7; 9000]);
        let data = [short, two_octet, five_octet].concat();

        let lens: Vec<usize> = PacketReader::new(&data)
            .map(|packet| packet.expect("packet").body.len())
            .collect();
        assert_eq!(lens, vec![10, 1000, 9000]);
    }

    #[test]
    fn reads_old_format_lengths() {
        let data = [
            fixtures::old_packet(2, &[1; 5]),
            fixtures::old_packet(2, &[1; 300]),
        ]
        .concat();
        let packets: Vec<_> = PacketReader::new(&data)
            .collect::<Result<_, _>>()
            .expect("packets");
        assert_eq!(packets[0].tag, 2);
        assert_eq!(packets[1].body.len(), 300);
    }

    #[test]
    fn reassembles_partial_bodies() {
        // 512-byte partial chunk followed by a final 3-byte chunk.
        let mut data = vec![0xC0 | 18, 0xE9];
        data.extend(std::iter::repeat(0xAB).take(512));
        data.extend([3, 1, 2, 3]);

        let packet = PacketReader::new(&data)
            .next()
            .expect("one packet")
            .expect("valid packet");
        assert_eq!(packet.tag, 18);
        assert_eq!(packet.body.len(), 515);
        assert_eq!(&packet.body[512..], &[1, 2, 3]);
    }

    #[test]
    fn stops_after_framing_errors() {
        let data = [0x00, 0x01, 0x02];
        let mut reader = PacketReader::new(&data);
        assert!(matches!(
            reader.next(),
            Some(Err(PacketError::InvalidHeader { byte: 0, offset: 0 }))
        ));
        assert!(reader.next().is_none());

        let truncated = [0xC0 | 1, 20, 3, 0];
        assert!(matches!(
            PacketReader::new(&truncated).next(),
            Some(Err(PacketError::Truncated { .. }))
        ));
    }

    #[test]
    fn extracts_recipient_key_id() {
        let data = fixtures::encrypted_file(RSA_KEY_ID);
        assert_eq!(encrypted_key_id(&data), Some(RSA_KEY_ID));
    }

    #[test]
    fn symmetric_or_garbage_data_has_no_key_id() {
        let symmetric = fixtures::new_packet(3, &[4, 9, 3, 2]);
        assert_eq!(encrypted_key_id(&symmetric), None);
        assert_eq!(encrypted_key_id(b"plain text password"), None);
        assert_eq!(encrypted_key_id(&[]), None);
        assert_eq!(encrypted_key_id(&fixtures::encrypted_file(0)), None);
    }

    #[test]
    fn missing_files_have_no_key_id() {
        assert_eq!(find_key_id(Path::new("/definitely/not/here.gpg")), None);
    }

    #[test]
    fn parses_rsa_key_fingerprint_and_modulus() {
        let body = fixtures::rsa_key_body();
        let key = PublicKey::parse(&body, true).expect("rsa key");

        assert_eq!(key.algorithm, PublicKeyAlgorithm::Rsa);
        assert_eq!(key.key_id, RSA_KEY_ID);
        assert_eq!(key.fingerprint_short(), RSA_FINGERPRINT_SHORT);
        assert_eq!(key.bit_length, 1024);
        assert_eq!(key.rsa_modulus.as_deref(), Some(fixtures::rsa_modulus().as_slice()));
        assert!(key.is_subkey);
    }

    #[test]
    fn parses_dsa_bit_length() {
        let key = PublicKey::parse(&fixtures::dsa_key_body(), false).expect("dsa key");
        assert_eq!(key.algorithm, PublicKeyAlgorithm::Dsa);
        assert_eq!(key.bit_length, 1024);
        assert_eq!(key.key_id, fixtures::DSA_KEY_ID);
        assert_eq!(key.rsa_modulus, None);
    }

    #[test]
    fn parses_version_3_rsa_keys() {
        let key = PublicKey::parse(&fixtures::v3_rsa_key_body(), false).expect("v3 key");

        assert_eq!(key.algorithm, PublicKeyAlgorithm::Rsa);
        assert_eq!(key.key_id, fixtures::V3_RSA_KEY_ID);
        assert_eq!(key.fingerprint, None);
        assert_eq!(key.fingerprint_short(), "7C7D7E7F");
        assert_eq!(key.bit_length, 1024);
        assert_eq!(key.rsa_modulus.as_deref(), Some(fixtures::rsa_modulus().as_slice()));
    }

    #[test]
    fn curve_keys_report_the_curve_size() {
        let key = PublicKey::parse(&fixtures::ecdsa_p256_key_body(), false).expect("ecdsa key");
        assert_eq!(key.algorithm, PublicKeyAlgorithm::Ecdsa);
        assert_eq!(key.bit_length, 256);
        assert!(key.fingerprint.is_some());

        assert_eq!(curve_bits(&[0x2B, 0x81, 0x04, 0x00, 0x23]), Some(521));
        assert_eq!(curve_bits(&[0x2B, 0x06, 0x01]), None);
    }

    #[test]
    fn rejects_other_key_versions() {
        let err = PublicKey::parse(&[5, 0, 0, 0, 0, 1], false).expect_err("v5");
        assert_eq!(err, PacketError::UnsupportedVersion { version: 5 });
        let err = PublicKey::parse(&[2, 0, 0, 0, 0, 0, 0, 1], false).expect_err("v2");
        assert_eq!(err, PacketError::UnsupportedVersion { version: 2 });
    }

    #[test]
    fn keyring_collects_keys_and_subkeys() {
        let keyring = fixtures::keyring(&[
            (TAG_PUBLIC_KEY, fixtures::dsa_key_body()),
            (TAG_PUBLIC_SUBKEY, fixtures::rsa_key_body()),
        ]);
        let keys = parse_keyring(&keyring).expect("keyring");

        let ids: Vec<u64> = keys.iter().map(|key| key.key_id).collect();
        assert_eq!(ids, vec![fixtures::DSA_KEY_ID, RSA_KEY_ID]);
    }

    #[test]
    fn maps_algorithm_ids_to_names() {
        assert_eq!(PublicKeyAlgorithm::from(1).display_name(), Some("RSA"));
        assert_eq!(PublicKeyAlgorithm::from(16).display_name(), Some("ElGamal"));
        assert_eq!(PublicKeyAlgorithm::from(22), PublicKeyAlgorithm::Unknown(22));
        assert_eq!(PublicKeyAlgorithm::Unknown(22).display_name(), None);
        assert!(PublicKeyAlgorithm::Rsa.supports_keygrip());
        assert!(!PublicKeyAlgorithm::RsaEncryptOnly.supports_keygrip());
    }
}
