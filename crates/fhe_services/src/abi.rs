//! Encoding of decrypted clear values as submitted to the ledger's
//! verification entry point: one 32-byte big-endian word per value.

use thiserror::Error;

pub const WORD_LEN: usize = 32;
const VALUE_OFFSET: usize = WORD_LEN - std::mem::size_of::<u64>();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("encoded clear values length {0} is not a multiple of {WORD_LEN}")]
    Misaligned(usize),
    #[error("word {index} does not fit in 64 bits")]
    Overflow { index: usize },
}

pub fn encode_clear_values(values: &[u64]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * WORD_LEN];
    for (word, value) in out.chunks_exact_mut(WORD_LEN).zip(values) {
        word[VALUE_OFFSET..].copy_from_slice(&value.to_be_bytes());
    }
    out
}

pub fn decode_clear_values(encoded: &[u8]) -> Result<Vec<u64>, AbiError> {
    if encoded.len() % WORD_LEN != 0 {
        return Err(AbiError::Misaligned(encoded.len()));
    }

    encoded
        .chunks_exact(WORD_LEN)
        .enumerate()
        .map(|(index, word)| {
            if word[..VALUE_OFFSET].iter().any(|byte| *byte != 0) {
                return Err(AbiError::Overflow { index });
            }
            let mut value = [0u8; 8];
            value.copy_from_slice(&word[VALUE_OFFSET..]);
            Ok(u64::from_be_bytes(value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn places_value_in_low_order_bytes() {
        let encoded = encode_clear_values(&[42]);
        assert_eq!(encoded.len(), WORD_LEN);
        assert!(encoded[..31].iter().all(|byte| *byte == 0));
        assert_eq!(encoded[31], 42);
        assert_eq!(decode_clear_values(&encoded), Ok(vec![42]));
    }

    #[test]
    fn rejects_misaligned_and_oversized_words() {
        assert_eq!(decode_clear_values(&[0u8; 33]), Err(AbiError::Misaligned(33)));

        let mut encoded = encode_clear_values(&[1, 2]);
        encoded[WORD_LEN] = 1;
        assert_eq!(
            decode_clear_values(&encoded),
            Err(AbiError::Overflow { index: 1 })
        );
    }
}
