//! Aggregation-bit decoding.
//!
//! The beacon node encodes which committee members signed an attestation as
//! a hex string. Turning that into "which validators attested" is a small
//! fixed pipeline: hex to bits, per-byte endian swap, trailing-delimiter
//! trim, then OR-aggregate and mask-select against the committee's duty
//! list. Each step is a pure function over `BitVec` so the pipeline and its
//! edge cases can be unit tested independently of any HTTP response.

use bitvec::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitError {
    #[error("hex string has odd length or invalid characters")]
    InvalidHex,
    #[error("aggregation bits contain no delimiter bit")]
    NoDelimiterBit,
    #[error("aggregate_bits requires at least one vector")]
    EmptyVectorList,
    #[error("aggregate_bits requires all vectors to share one length")]
    LengthMismatch,
    #[error("apply_mask requires items and bits to share one length")]
    MaskLengthMismatch,
}

/// Step 1: hex (optionally `0x`-prefixed) to a flat bit list, MSB-first per
/// nibble. `"0x0F0A"` becomes `00001111 00001010`.
pub fn hex_to_binary(hex_str: &str) -> Result<BitVec<u8, Msb0>, BitError> {
    let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(trimmed).map_err(|_| BitError::InvalidHex)?;
    Ok(BitVec::from_vec(bytes))
}

/// Step 2: reverse each consecutive 8-bit group. After this, bit `i`
/// corresponds to the `i`-th validator in committee order.
pub fn switch_endianness(bits: &BitSlice<u8, Msb0>) -> BitVec<u8, Msb0> {
    let mut out = BitVec::with_capacity(bits.len());
    for byte in bits.chunks(8) {
        for bit in byte.iter().rev() {
            out.push(*bit);
        }
    }
    out
}

/// Step 3: find the position of the last `1` bit (the sentinel delimiter)
/// and discard it together with everything after it.
pub fn delete_zero_bits(bits: &BitSlice<u8, Msb0>) -> Result<BitVec<u8, Msb0>, BitError> {
    match bits.iter().rposition(|b| *b) {
        Some(last_one) => Ok(bits[..last_one].to_bitvec()),
        None => Err(BitError::NoDelimiterBit),
    }
}

/// Decodes a beacon `aggregation_bits` hex string into one bit per committee
/// member, in committee order.
pub fn decode_aggregation_bits(hex_str: &str) -> Result<BitVec<u8, Msb0>, BitError> {
    let raw = hex_to_binary(hex_str)?;
    let swapped = switch_endianness(&raw);
    delete_zero_bits(&swapped)
}

/// Per-position OR across equal-length bit vectors.
pub fn aggregate_bits(vectors: &[BitVec<u8, Msb0>]) -> Result<BitVec<u8, Msb0>, BitError> {
    let first = vectors.first().ok_or(BitError::EmptyVectorList)?;
    let len = first.len();
    if vectors.iter().any(|v| v.len() != len) {
        return Err(BitError::LengthMismatch);
    }
    let mut acc = bitvec![u8, Msb0; 0; len];
    for vector in vectors {
        for (mut out_bit, in_bit) in acc.iter_mut().zip(vector.iter()) {
            *out_bit |= *in_bit;
        }
    }
    Ok(acc)
}

/// Returns the items whose matching bit is `1`.
pub fn apply_mask<T: Clone>(items: &[T], bits: &BitSlice<u8, Msb0>) -> Result<Vec<T>, BitError> {
    if items.len() != bits.len() {
        return Err(BitError::MaskLengthMismatch);
    }
    Ok(items
        .iter()
        .zip(bits.iter())
        .filter_map(|(item, bit)| if *bit { Some(item.clone()) } else { None })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv(bits: &[u8]) -> BitVec<u8, Msb0> {
        bits.iter().map(|b| *b != 0).collect()
    }

    #[test]
    fn hex_decode_scenario() {
        // Spec §8 scenario 1: "0x0F0A" -> 00001111 00001010.
        let raw = hex_to_binary("0x0F0A").unwrap();
        assert_eq!(raw, bv(&[0, 0, 0, 0, 1, 1, 1, 1, 0, 0, 0, 0, 1, 0, 1, 0]));

        let swapped = switch_endianness(&raw);
        assert_eq!(
            swapped,
            bv(&[1, 1, 1, 1, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0, 0, 0])
        );

        // Last `1` is at index 9 (0-based); everything from there on is discarded.
        let trimmed = delete_zero_bits(&swapped).unwrap();
        assert_eq!(trimmed, bv(&[1, 1, 1, 1, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn delete_zero_bits_rejects_all_zero_input() {
        let zeros = bv(&[0, 0, 0, 0]);
        assert_eq!(delete_zero_bits(&zeros), Err(BitError::NoDelimiterBit));
    }

    #[test]
    fn aggregate_bits_identity_and_absorption() {
        let v = bv(&[1, 0, 1]);
        let zero = bv(&[0, 0, 0]);
        assert_eq!(aggregate_bits(&[v.clone()]).unwrap(), v);
        assert_eq!(aggregate_bits(&[v.clone(), zero]).unwrap(), v);
    }

    #[test]
    fn aggregate_bits_rejects_length_mismatch() {
        let a = bv(&[1, 0]);
        let b = bv(&[1, 0, 1]);
        assert_eq!(
            aggregate_bits(&[a, b]),
            Err(BitError::LengthMismatch)
        );
    }

    #[test]
    fn apply_mask_all_true_and_all_false() {
        let items = vec!["a", "b", "c"];
        let all_true = bv(&[1, 1, 1]);
        let all_false = bv(&[0, 0, 0]);
        assert_eq!(apply_mask(&items, &all_true).unwrap(), items);
        assert_eq!(apply_mask(&items, &all_false).unwrap(), Vec::<&str>::new());
    }
}
