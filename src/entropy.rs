//! VP8 residual coefficient (token) decoding
//!
//! Coefficients are decoded per 4x4 block in zigzag order through the
//! shared coefficient tree. Probabilities are selected by block type,
//! coefficient band and a trinary context tracking the previous
//! coefficient's magnitude; the first coefficient of a block takes its
//! context from the neighboring blocks' has-nonzero flags.

use crate::bool_decoder::BoolDecoder;
use crate::tables::{
    CAT1_PROBS, CAT2_PROBS, CAT3_PROBS, CAT4_PROBS, CAT5_PROBS, CAT6_PROBS, COEFF_BANDS,
    COEFF_TOKEN_TREE, COEFF_UPDATE_PROBS, DCT_CAT1, DCT_CAT_BASE, DCT_EOB,
    DEFAULT_COEFF_PROBS, NUM_BLOCK_TYPES, NUM_COEFF_BANDS, NUM_ENTROPY_NODES,
    NUM_PREV_COEFF_CONTEXTS, ZIGZAG,
};

/// Block type selecting the coefficient probability plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum TokenPlane {
    /// Luma block whose DC coefficient lives in the Y2 block
    YAfterY2 = 0,
    /// Second-order luma DC block
    Y2 = 1,
    /// Chroma block
    Uv = 2,
    /// Luma block carrying its own DC (B_PRED macroblocks)
    Y = 3,
}

impl TokenPlane {
    /// Starting coefficient position: 1 when the DC is carried by Y2
    pub fn first_coeff(self) -> usize {
        match self {
            TokenPlane::YAfterY2 => 1,
            _ => 0,
        }
    }
}

/// Coefficient probabilities for the current frame
#[derive(Clone)]
pub struct CoeffProbs {
    pub probs:
        [[[[u8; NUM_ENTROPY_NODES]; NUM_PREV_COEFF_CONTEXTS]; NUM_COEFF_BANDS]; NUM_BLOCK_TYPES],
}

impl Default for CoeffProbs {
    fn default() -> Self {
        CoeffProbs {
            probs: DEFAULT_COEFF_PROBS,
        }
    }
}

impl CoeffProbs {
    /// Apply the frame header's per-position probability updates
    pub fn update(&mut self, bd: &mut BoolDecoder) {
        for (block_type, update_block) in self.probs.iter_mut().zip(&COEFF_UPDATE_PROBS) {
            for (band, update_band) in block_type.iter_mut().zip(update_block) {
                for (ctx, update_ctx) in band.iter_mut().zip(update_band) {
                    for (prob, &update_prob) in ctx.iter_mut().zip(update_ctx) {
                        if bd.read_bool(update_prob) {
                            *prob = bd.read_literal(8) as u8;
                        }
                    }
                }
            }
        }
    }
}

/// Read the extra bits for a category token and return the magnitude
fn read_category_magnitude(bd: &mut BoolDecoder, category: i8) -> i16 {
    let probs: &[u8] = match category - DCT_CAT1 {
        0 => &CAT1_PROBS,
        1 => &CAT2_PROBS,
        2 => &CAT3_PROBS,
        3 => &CAT4_PROBS,
        4 => &CAT5_PROBS,
        _ => &CAT6_PROBS,
    };

    let mut extra = 0i16;
    for &prob in probs {
        extra = (extra << 1) | i16::from(bd.read_bool(prob));
    }

    DCT_CAT_BASE[(category - DCT_CAT1) as usize] as i16 + extra
}

/// Decode one block's coefficients into `coeffs` (raster order via the
/// zigzag permutation).
///
/// `ctx` is the initial context from the neighbor has-nonzero flags
/// (0, 1, or 2). Returns true if any decoded coefficient is non-zero,
/// which the caller publishes to the downstream neighbors.
pub fn decode_block_coeffs(
    bd: &mut BoolDecoder,
    probs: &CoeffProbs,
    plane: TokenPlane,
    ctx: usize,
    coeffs: &mut [i16; 16],
) -> bool {
    debug_assert!(ctx <= 2);

    let plane_probs = &probs.probs[plane as usize];
    let mut has_nonzero = false;
    let mut ctx = ctx;
    let mut prev_was_zero = false;

    for i in plane.first_coeff()..16 {
        let band_probs = &plane_probs[COEFF_BANDS[i]][ctx];

        // After a zero token the end-of-block branch is skipped
        let start_node = if prev_was_zero { 2 } else { 0 };
        let token = bd.read_tree_from(&COEFF_TOKEN_TREE, band_probs, start_node);

        if token == DCT_EOB {
            break;
        }

        if token == 0 {
            prev_was_zero = true;
            ctx = 0;
            continue;
        }
        prev_was_zero = false;

        let magnitude = if token < DCT_CAT1 {
            i16::from(token)
        } else {
            read_category_magnitude(bd, token)
        };

        ctx = magnitude.min(2) as usize;

        let value = if bd.read_flag() { -magnitude } else { magnitude };
        coeffs[ZIGZAG[i]] = value;
        has_nonzero = true;
    }

    has_nonzero
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_probs_initialized() {
        let probs = CoeffProbs::default();
        assert_eq!(probs.probs[1][0][0][0], 198);
        assert_eq!(probs.probs[0][1][0][0], 253);
    }

    #[test]
    fn test_update_with_zero_stream_is_noop() {
        // An all-zero source decodes every update gate as false for gate
        // probabilities above zero, leaving the table untouched.
        let mut probs = CoeffProbs::default();
        let data = vec![0u8; 64];
        let mut bd = BoolDecoder::new(&data);
        probs.update(&mut bd);
        assert_eq!(probs.probs, DEFAULT_COEFF_PROBS);
    }

    #[test]
    fn test_zero_stream_decodes_eob() {
        // With an all-zero source the first tree branch resolves to EOB
        // for any probability above zero.
        let data = vec![0u8; 16];
        let mut bd = BoolDecoder::new(&data);
        let probs = CoeffProbs::default();
        let mut coeffs = [0i16; 16];
        let has_nonzero = decode_block_coeffs(&mut bd, &probs, TokenPlane::Y, 0, &mut coeffs);
        assert!(!has_nonzero);
        assert_eq!(coeffs, [0i16; 16]);
    }

    #[test]
    fn test_first_coeff_positions() {
        assert_eq!(TokenPlane::YAfterY2.first_coeff(), 1);
        assert_eq!(TokenPlane::Y2.first_coeff(), 0);
        assert_eq!(TokenPlane::Uv.first_coeff(), 0);
        assert_eq!(TokenPlane::Y.first_coeff(), 0);
    }

    #[test]
    fn test_category_bases_are_contiguous() {
        // Category N starts where the extra bits of category N-1 end
        let widths = [1usize, 2, 3, 4, 5, 11];
        for i in 0..5 {
            let base = DCT_CAT_BASE[i] as u16;
            let span = 1u16 << widths[i];
            assert_eq!(base + span, DCT_CAT_BASE[i + 1] as u16);
        }
    }
}
