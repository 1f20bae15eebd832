//! Universal Key Scheme (UKS) codec: a 160-bit structured object
//! identifier (spec.md §6/GLOSSARY). The bit-packing helper itself is an
//! external collaborator per spec.md §1, but its on-wire hex textual
//! form is part of the interface, so the codec lives here.
//!
//! Field layout, MSB to LSB (`hash` is the high field, `class`/`replica`
//! the low field — mirrors `dpl_uks_gen_key_raw`'s bit offsets in
//! `examples/original_source/libdroplet/uks/uks.c`):
//!
//! ```text
//! hash(24) | object_id(64) | volume_id(32) | service_id(8) | specific(24) | class(4) | replica(4)
//! ```
//!
//! Every field happens to be byte-aligned, so the codec works byte-wise
//! rather than bit-by-bit.

use crate::error::DplError;

const KEY_BYTES: usize = 20;

/// A decoded UKS key. `hash` is always the low 24 bits of
/// `MD5(payload)`, where `payload` is the 136-bit (17-byte) prefix
/// formed by every field except `hash` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UksKey {
    pub replica: u8,
    pub class: u8,
    pub specific: u32,
    pub service_id: u8,
    pub volume_id: u32,
    pub object_id: u64,
    pub hash: u32,
}

impl UksKey {
    /// Builds a key from its fields, computing `hash` as the low 24 bits
    /// of `MD5` over the other fields (spec.md §6: "The hash field is
    /// computed as the low 24 bits of MD5 over the payload fields that
    /// were set by mask").
    #[must_use]
    pub fn build(replica: u8, class: u8, specific: u32, service_id: u8, volume_id: u32, object_id: u64) -> Self {
        let mut key = UksKey {
            replica: replica & 0xf,
            class: class & 0xf,
            specific: specific & 0x00ff_ffff,
            service_id,
            volume_id,
            object_id,
            hash: 0,
        };
        key.hash = key.compute_hash();
        key
    }

    fn payload_bytes(&self) -> [u8; 17] {
        let mut buf = [0u8; 17];
        buf[0..8].copy_from_slice(&self.object_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.volume_id.to_be_bytes());
        buf[12] = self.service_id;
        let specific_be = self.specific.to_be_bytes();
        buf[13..16].copy_from_slice(&specific_be[1..4]);
        buf[16] = (self.class << 4) | (self.replica & 0xf);
        buf
    }

    fn compute_hash(&self) -> u32 {
        let digest = droplet_crypto::md5_bytes(&self.payload_bytes());
        let low3 = &digest[13..16];
        u32::from_be_bytes([0, low3[0], low3[1], low3[2]])
    }

    /// Renders the key as fixed-width, zero-padded, uppercase hex
    /// (spec.md §6).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.to_bytes())
    }

    /// Renders the key's 20 raw bytes, big-endian (`hash` first).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; KEY_BYTES] {
        let mut buf = [0u8; KEY_BYTES];
        let hash_be = self.hash.to_be_bytes();
        buf[0..3].copy_from_slice(&hash_be[1..4]);
        buf[3..20].copy_from_slice(&self.payload_bytes());
        buf
    }

    /// Parses a 40-character hex string produced by [`Self::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, DplError> {
        let bytes = hex::decode(s).map_err(|_| DplError::Einval)?;
        let arr: [u8; KEY_BYTES] = bytes.try_into().map_err(|_| DplError::Einval)?;
        Ok(Self::from_bytes(&arr))
    }

    /// Parses the key's 20 raw bytes, big-endian.
    #[must_use]
    pub fn from_bytes(buf: &[u8; KEY_BYTES]) -> Self {
        let hash = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]);
        let object_id = u64::from_be_bytes(buf[3..11].try_into().unwrap());
        let volume_id = u32::from_be_bytes(buf[11..15].try_into().unwrap());
        let service_id = buf[15];
        let specific = u32::from_be_bytes([0, buf[16], buf[17], buf[18]]);
        let class = buf[19] >> 4;
        let replica = buf[19] & 0xf;
        UksKey {
            replica,
            class,
            specific,
            service_id,
            volume_id,
            object_id,
            hash,
        }
    }

    /// Whether this key's `hash` field matches a freshly recomputed hash
    /// of its other fields (a key received over the wire can be
    /// validated this way before trusting it).
    #[must_use]
    pub fn hash_is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn to_hex_is_forty_uppercase_chars() {
        let key = UksKey::build(1, 2, 3, 4, 5, 6);
        let hex = key.to_hex();
        assert_eq!(hex.len(), 40);
        assert_eq!(hex, hex.to_uppercase());
    }

    #[rstest]
    fn built_key_hash_validates() {
        let key = UksKey::build(0xf, 0xa, 0x00ab_cdef, 7, 0x1234_5678, 0xdead_beef_cafe_babe);
        assert!(key.hash_is_valid());
    }

    proptest! {
        #[test]
        fn hex_roundtrip(
            replica in 0u8..16,
            class in 0u8..16,
            specific in 0u32..0x0100_0000,
            service_id in 0u8..=255,
            volume_id in any::<u32>(),
            object_id in any::<u64>(),
        ) {
            let key = UksKey::build(replica, class, specific, service_id, volume_id, object_id);
            let hex = key.to_hex();
            let parsed = UksKey::from_hex(&hex).unwrap();
            prop_assert_eq!(parsed, key);
        }
    }
}
