//! VP8 quantization lookup and dequantization
//!
//! The frame header transmits a base quantizer index for luma AC plus five
//! signed deltas; segments may override the base index. Each index selects a
//! step size from fixed lookup tables, with plane-specific adjustments.

#[rustfmt::skip]
/// DC quantizer step sizes (quantizer index 0-127)
pub const DC_QUANT: [i16; 128] = [
      4,   5,   6,   7,   8,   9,  10,  10,
     11,  12,  13,  14,  15,  16,  17,  17,
     18,  19,  20,  20,  21,  21,  22,  22,
     23,  23,  24,  25,  25,  26,  27,  28,
     29,  30,  31,  32,  33,  34,  35,  36,
     37,  37,  38,  39,  40,  41,  42,  43,
     44,  45,  46,  46,  47,  48,  49,  50,
     51,  52,  53,  54,  55,  56,  57,  58,
     59,  60,  61,  62,  63,  64,  65,  66,
     67,  68,  69,  70,  71,  72,  73,  74,
     75,  76,  76,  77,  78,  79,  80,  81,
     82,  83,  84,  85,  86,  87,  88,  89,
     91,  93,  95,  96,  98, 100, 101, 102,
    104, 106, 108, 110, 112, 114, 116, 118,
    122, 124, 126, 128, 130, 132, 134, 136,
    138, 140, 143, 145, 148, 151, 154, 157,
];

#[rustfmt::skip]
/// AC quantizer step sizes (quantizer index 0-127)
pub const AC_QUANT: [i16; 128] = [
      4,   5,   6,   7,   8,   9,  10,  11,
     12,  13,  14,  15,  16,  17,  18,  19,
     20,  21,  22,  23,  24,  25,  26,  27,
     28,  29,  30,  31,  32,  33,  34,  35,
     36,  37,  38,  39,  40,  41,  42,  43,
     44,  45,  46,  47,  48,  49,  50,  51,
     52,  53,  54,  55,  56,  57,  58,  60,
     62,  64,  66,  68,  70,  72,  74,  76,
     78,  80,  82,  84,  86,  88,  90,  92,
     94,  96,  98, 100, 102, 104, 106, 108,
    110, 112, 114, 116, 119, 122, 125, 128,
    131, 134, 137, 140, 143, 146, 149, 152,
    155, 158, 161, 164, 167, 170, 173, 177,
    181, 185, 189, 193, 197, 201, 205, 209,
    213, 217, 221, 225, 229, 234, 239, 245,
    249, 254, 259, 264, 269, 274, 279, 284,
];

/// Quantizer index deltas transmitted in the frame header
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantIndices {
    pub y_ac_qi: u8,
    pub y_dc_delta: i8,
    pub y2_dc_delta: i8,
    pub y2_ac_delta: i8,
    pub uv_dc_delta: i8,
    pub uv_ac_delta: i8,
}

/// Per-plane quantization factors for one macroblock
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantizer {
    pub y_dc: i16,
    pub y_ac: i16,
    pub y2_dc: i16,
    pub y2_ac: i16,
    pub uv_dc: i16,
    pub uv_ac: i16,
}

fn lookup(table: &[i16; 128], qi: i16) -> i16 {
    table[qi.clamp(0, 127) as usize]
}

impl Quantizer {
    /// Build the factors for a base luma-AC index, applying the header's
    /// per-plane deltas. The second-order luma DC step is doubled, its AC
    /// step scaled by 155/100 with a floor of 8, and the chroma DC step is
    /// capped at 132.
    pub fn new(indices: &QuantIndices, base_qi: i16) -> Self {
        let d = |delta: i8| base_qi + i16::from(delta);

        Quantizer {
            y_dc: lookup(&DC_QUANT, d(indices.y_dc_delta)),
            y_ac: lookup(&AC_QUANT, base_qi),
            y2_dc: lookup(&DC_QUANT, d(indices.y2_dc_delta)) * 2,
            y2_ac: ((i32::from(lookup(&AC_QUANT, d(indices.y2_ac_delta))) * 155 / 100).max(8))
                as i16,
            uv_dc: lookup(&DC_QUANT, d(indices.uv_dc_delta)).min(132),
            uv_ac: lookup(&AC_QUANT, d(indices.uv_ac_delta)),
        }
    }

    /// Factors for the frame-wide quantizer
    pub fn frame_default(indices: &QuantIndices) -> Self {
        Self::new(indices, i16::from(indices.y_ac_qi))
    }
}

/// Dequantize a 4x4 coefficient block in place, splitting DC from AC at
/// position 0
#[inline]
pub fn dequantize(coeffs: &mut [i16; 16], dc_factor: i16, ac_factor: i16) {
    coeffs[0] = coeffs[0].saturating_mul(dc_factor);
    for coeff in &mut coeffs[1..] {
        *coeff = coeff.saturating_mul(ac_factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_default_factors() {
        let indices = QuantIndices {
            y_ac_qi: 64,
            ..Default::default()
        };
        let q = Quantizer::frame_default(&indices);
        assert_eq!(q.y_ac, AC_QUANT[64]);
        assert_eq!(q.y_dc, DC_QUANT[64]);
        assert_eq!(q.y2_dc, DC_QUANT[64] * 2);
        assert_eq!(q.y2_ac, (i32::from(AC_QUANT[64]) * 155 / 100) as i16);
    }

    #[test]
    fn test_y2_ac_floor() {
        let indices = QuantIndices::default();
        let q = Quantizer::frame_default(&indices);
        // qi 0: AC step 4, 155% of that is 6, floored to 8
        assert_eq!(q.y2_ac, 8);
    }

    #[test]
    fn test_uv_dc_cap() {
        let indices = QuantIndices {
            y_ac_qi: 127,
            ..Default::default()
        };
        let q = Quantizer::frame_default(&indices);
        assert_eq!(q.uv_dc, 132);
        assert_eq!(q.y_dc, DC_QUANT[127]);
    }

    #[test]
    fn test_delta_clamps_index() {
        let indices = QuantIndices {
            y_ac_qi: 2,
            y_dc_delta: -15,
            ..Default::default()
        };
        let q = Quantizer::new(&indices, 2);
        assert_eq!(q.y_dc, DC_QUANT[0]);
    }

    #[test]
    fn test_dequantize_splits_dc() {
        let mut coeffs = [1i16; 16];
        dequantize(&mut coeffs, 10, 20);
        assert_eq!(coeffs[0], 10);
        assert!(coeffs[1..].iter().all(|&c| c == 20));
    }
}
