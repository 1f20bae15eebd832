//! ntinydb codec: the length-prefixed (key, value) sequence Scality
//! backends carry, base64-wrapped, in a single metadata header (spec.md
//! §6: `((klen:u32_be)(k)(pad to 4-byte)(vlen:u32_be)(v)(pad))*`).

use droplet_core::Dict;

use crate::error::DplError;

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Serializes a dictionary's entries as an ntinydb blob (not yet
/// base64-encoded — callers wrap the result themselves, since sproxyd
/// and SRWS both reuse this encoding but under different header names).
#[must_use]
pub fn encode(dict: &Dict) -> Vec<u8> {
    let mut out = Vec::new();
    for (k, v) in dict.iter() {
        let Some(value_bytes) = v.as_bytes() else { continue };
        encode_pair(&mut out, k.as_bytes(), value_bytes);
    }
    out
}

fn encode_pair(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(&(key.len() as u32).to_be_bytes());
    out.extend_from_slice(key);
    out.resize(out.len() + (padded_len(key.len()) - key.len()), 0);
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
    out.resize(out.len() + (padded_len(value.len()) - value.len()), 0);
}

/// Parses an ntinydb blob into key/value pairs. Each value is returned as
/// raw bytes; callers decide whether to interpret it as UTF-8 metadata.
pub fn decode(blob: &[u8]) -> Result<Vec<(String, Vec<u8>)>, DplError> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < blob.len() {
        let (key, next) = read_field(blob, pos)?;
        let (value, next) = read_field(blob, next)?;
        out.push((String::from_utf8(key).map_err(|_| DplError::Einval)?, value));
        pos = next;
    }
    Ok(out)
}

fn read_field(blob: &[u8], pos: usize) -> Result<(Vec<u8>, usize), DplError> {
    if pos + 4 > blob.len() {
        return Err(DplError::Einval);
    }
    let len = u32::from_be_bytes(blob[pos..pos + 4].try_into().unwrap()) as usize;
    let data_start = pos + 4;
    let data_end = data_start.checked_add(len).ok_or(DplError::Einval)?;
    if data_end > blob.len() {
        return Err(DplError::Einval);
    }
    let data = blob[data_start..data_end].to_vec();
    let next = data_start + padded_len(len);
    Ok((data, next))
}

/// Decodes an ntinydb blob directly into a [`Dict`] of string-valued
/// entries, as used by the sproxyd/SRWS reply parsers.
pub fn decode_into_dict(blob: &[u8]) -> Result<Dict, DplError> {
    let mut dict = Dict::default();
    for (k, v) in decode(blob)? {
        dict.add(&k, v, false);
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn scenario_sproxyd_put_with_metadata() {
        // spec.md §8 scenario 3.
        let mut dict = Dict::default();
        dict.add("k1", "v1", false);
        let blob = encode(&dict);
        let mut expected = Vec::new();
        expected.extend_from_slice(&2u32.to_be_bytes());
        expected.extend_from_slice(b"k1");
        expected.extend_from_slice(&[0, 0]); // pad "k1" (len 2) to 4
        expected.extend_from_slice(&2u32.to_be_bytes());
        expected.extend_from_slice(b"v1");
        expected.extend_from_slice(&[0, 0]);
        assert_eq!(blob, expected);
    }

    #[rstest]
    fn decode_reverses_encode() {
        let mut dict = Dict::default();
        dict.add("alpha", "one", false);
        dict.add("b", "2", false);
        let blob = encode(&dict);
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], ("alpha".to_string(), b"one".to_vec()));
        assert_eq!(decoded[1], ("b".to_string(), b"2".to_vec()));
    }

    #[rstest]
    fn truncated_blob_is_rejected() {
        assert!(decode(&[0, 0, 0, 5, b'a']).is_err());
    }
}
