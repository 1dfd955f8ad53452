//! Hard-decision demodulation: quantizing soft-decision sample bytes to
//! bits with a fixed threshold.
//!
//! The modem represents a soft bit as one byte, 0 meaning "very likely 0"
//! and 255 "very likely 1". The hard decision maps each byte to a single
//! bit at the midpoint. The threshold is the system's fixed quantization
//! point and is deliberately not configurable; consumers needing a
//! different cut apply their own post-processing.

/// Sample values at or above this decode as bit 1.
pub const HARD_DECISION_THRESHOLD: u8 = 0x80;

/// Iterator yielding one bit (0 or 1) per input sample byte.
pub struct HardDecisionIterator<'a> {
    samples: &'a [u8],
    position: usize,
}

impl<'a> Iterator for HardDecisionIterator<'a> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.samples.len() {
            return None;
        }
        let bit = (self.samples[self.position] >= HARD_DECISION_THRESHOLD) as u8;
        self.position += 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.samples.len() - self.position;
        (remaining, Some(remaining))
    }
}

/// Hard-decision view over raw sample bytes. Pure; every byte value is a
/// valid input.
pub fn hard_decision(samples: &[u8]) -> HardDecisionIterator<'_> {
    HardDecisionIterator { samples, position: 0 }
}

/// Fill a fixed buffer with decided bits. Returns the number of bits
/// written, `min(samples.len(), bits.len())`.
pub fn hard_decision_into(samples: &[u8], bits: &mut [u8]) -> usize {
    let count = samples.len().min(bits.len());
    for (bit, decided) in bits[..count].iter_mut().zip(hard_decision(samples)) {
        *bit = decided;
    }
    count
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary() {
        let bits: Vec<u8> = hard_decision(&[0x7F, 0x80]).collect();
        assert_eq!(bits, vec![0, 1]);
    }

    #[test]
    fn one_bit_per_sample_byte() {
        let samples: Vec<u8> = (0..=255).collect();
        let bits: Vec<u8> = hard_decision(&samples).collect();
        assert_eq!(bits.len(), 256);
        assert_eq!(bits[0x00], 0);
        assert_eq!(bits[0x7F], 0);
        assert_eq!(bits[0x80], 1);
        assert_eq!(bits[0xFF], 1);
        assert!(bits.iter().all(|b| *b == 0 || *b == 1));
    }

    #[test]
    fn empty_input_yields_no_bits() {
        assert_eq!(hard_decision(&[]).next(), None);
    }

    #[test]
    fn fill_buffer_truncates_to_smaller_side() {
        let samples = [0xFF, 0x00, 0xFF, 0x00];
        let mut bits = [9u8; 3];
        assert_eq!(hard_decision_into(&samples, &mut bits), 3);
        assert_eq!(bits, [1, 0, 1]);

        let mut wide = [9u8; 8];
        assert_eq!(hard_decision_into(&samples, &mut wide), 4);
        assert_eq!(&wide[..4], &[1, 0, 1, 0]);
        assert_eq!(&wide[4..], &[9, 9, 9, 9]);
    }
}
