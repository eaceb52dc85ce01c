//! VP8 frame header parsing
//!
//! Covers the uncompressed chunk (frame tag plus key-frame start code and
//! dimensions) and the bool-coded frame header carried by the first data
//! partition. Header parsing mutates the persistent [`DecoderState`]
//! (segmentation, loop-filter deltas, probability tables) and yields the
//! per-frame [`FrameHeader`] from which [`DerivedQuantities`] are
//! precomputed once per frame.

use crate::bool_decoder::BoolDecoder;
use crate::entropy::CoeffProbs;
use crate::error::{Error, Result};
use crate::filter::FilterParameters;
use crate::quant::{QuantIndices, Quantizer};
use crate::tables::{
    ColorSpace, FilterType, FrameType, SegmentFeatureMode, DEFAULT_MV_PROBS, DEFAULT_SEGMENT_PROBS,
    DEFAULT_UVMODE_PROBS, DEFAULT_YMODE_PROBS, MAX_SEGMENTS, MV_UPDATE_PROBS,
};

/// Key-frame start code bytes
pub const START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

/// The three-byte frame tag heading every frame payload
#[derive(Debug, Clone, Copy)]
pub struct FrameTag {
    pub frame_type: FrameType,
    pub version: u8,
    pub show_frame: bool,
    pub first_partition_size: u32,
}

impl FrameTag {
    /// Parse the frame tag from the start of a frame payload
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(Error::invalid_stream("frame too small for tag"));
        }

        let tag = u32::from(data[0]) | u32::from(data[1]) << 8 | u32::from(data[2]) << 16;

        let frame_type = if tag & 1 == 0 {
            FrameType::KeyFrame
        } else {
            FrameType::InterFrame
        };

        Ok(FrameTag {
            frame_type,
            version: ((tag >> 1) & 0x7) as u8,
            show_frame: (tag >> 4) & 1 != 0,
            first_partition_size: tag >> 5,
        })
    }
}

/// Dimensions from a key frame's uncompressed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyFrameDimensions {
    pub width: u16,
    pub horizontal_scale: u8,
    pub height: u16,
    pub vertical_scale: u8,
}

impl KeyFrameDimensions {
    /// Parse the seven bytes following the frame tag on key frames:
    /// start code, then 14-bit width and height with 2-bit scale fields
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 7 {
            return Err(Error::invalid_stream("key frame too small for start code"));
        }
        if data[0..3] != START_CODE {
            return Err(Error::invalid_stream(format!(
                "bad key frame start code {:02x} {:02x} {:02x}",
                data[0], data[1], data[2]
            )));
        }

        let w = u16::from(data[3]) | u16::from(data[4]) << 8;
        let h = u16::from(data[5]) | u16::from(data[6]) << 8;

        Ok(KeyFrameDimensions {
            width: w & 0x3fff,
            horizontal_scale: (w >> 14) as u8,
            height: h & 0x3fff,
            vertical_scale: (h >> 14) as u8,
        })
    }
}

/// Probability tables restored at end of frame when the header clears
/// `refresh_entropy_probs`
#[derive(Clone)]
pub struct SavedProbs {
    pub coeff_probs: CoeffProbs,
    pub y_mode_probs: [u8; 4],
    pub uv_mode_probs: [u8; 3],
    pub mv_probs: [[u8; 19]; 2],
}

/// Decoder state that persists across frames and is mutated only during
/// header parsing and at end-of-frame probability restore
#[derive(Clone)]
pub struct DecoderState {
    pub coeff_probs: CoeffProbs,
    pub y_mode_probs: [u8; 4],
    pub uv_mode_probs: [u8; 3],
    pub mv_probs: [[u8; 19]; 2],

    pub segmentation_enabled: bool,
    pub segment_feature_mode: SegmentFeatureMode,
    pub segment_quant: [i8; MAX_SEGMENTS],
    pub segment_filter_level: [i8; MAX_SEGMENTS],
    pub mb_segment_tree_probs: [u8; 3],

    pub loopfilter_ref_adjustments: [i8; 4],
    pub loopfilter_mode_adjustments: [i8; 4],

    pub sign_bias_golden: bool,
    pub sign_bias_altref: bool,
}

impl Default for DecoderState {
    fn default() -> Self {
        DecoderState {
            coeff_probs: CoeffProbs::default(),
            y_mode_probs: DEFAULT_YMODE_PROBS,
            uv_mode_probs: DEFAULT_UVMODE_PROBS,
            mv_probs: DEFAULT_MV_PROBS,
            segmentation_enabled: false,
            segment_feature_mode: SegmentFeatureMode::Delta,
            segment_quant: [0; MAX_SEGMENTS],
            segment_filter_level: [0; MAX_SEGMENTS],
            mb_segment_tree_probs: DEFAULT_SEGMENT_PROBS,
            loopfilter_ref_adjustments: [0; 4],
            loopfilter_mode_adjustments: [0; 4],
            sign_bias_golden: false,
            sign_bias_altref: false,
        }
    }
}

impl DecoderState {
    /// Key frames reset every probability table to its default and clear
    /// the reference sign biases
    pub fn reset_probabilities(&mut self) {
        self.coeff_probs = CoeffProbs::default();
        self.y_mode_probs = DEFAULT_YMODE_PROBS;
        self.uv_mode_probs = DEFAULT_UVMODE_PROBS;
        self.mv_probs = DEFAULT_MV_PROBS;
        self.sign_bias_golden = false;
        self.sign_bias_altref = false;
    }

    pub fn save_probs(&self) -> SavedProbs {
        SavedProbs {
            coeff_probs: self.coeff_probs.clone(),
            y_mode_probs: self.y_mode_probs,
            uv_mode_probs: self.uv_mode_probs,
            mv_probs: self.mv_probs,
        }
    }

    pub fn restore_probs(&mut self, saved: &SavedProbs) {
        self.coeff_probs = saved.coeff_probs.clone();
        self.y_mode_probs = saved.y_mode_probs;
        self.uv_mode_probs = saved.uv_mode_probs;
        self.mv_probs = saved.mv_probs;
    }
}

/// Per-frame header fields decoded from the first partition
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub frame_type: FrameType,

    // Key frame only
    pub color_space: ColorSpace,
    pub clamping_required: bool,

    pub update_mb_segmentation_map: bool,

    pub filter_type: FilterType,
    pub loop_filter_level: u8,
    pub sharpness_level: u8,
    pub loop_filter_adj_enable: bool,

    pub log2_token_partitions: u8,

    pub quant: QuantIndices,

    pub refresh_golden_frame: bool,
    pub refresh_altref_frame: bool,
    pub copy_buffer_to_golden: u8,
    pub copy_buffer_to_altref: u8,
    pub refresh_last: bool,
    pub refresh_entropy_probs: bool,

    pub prob_skip_false: Option<u8>,

    // Inter frame only
    pub prob_inter: u8,
    pub prob_references_last: u8,
    pub prob_references_golden: u8,
}

impl FrameHeader {
    /// Decode the frame header, applying persistent updates to `state`.
    ///
    /// Returns the header and, when the frame clears
    /// `refresh_entropy_probs`, the snapshot to restore at end of frame.
    pub fn parse(
        bd: &mut BoolDecoder,
        frame_type: FrameType,
        state: &mut DecoderState,
    ) -> Result<(Self, Option<SavedProbs>)> {
        let key_frame = frame_type == FrameType::KeyFrame;

        if key_frame {
            state.reset_probabilities();
        }

        let mut header = FrameHeader {
            frame_type,
            color_space: ColorSpace::YCbCr,
            clamping_required: false,
            update_mb_segmentation_map: false,
            filter_type: FilterType::Normal,
            loop_filter_level: 0,
            sharpness_level: 0,
            loop_filter_adj_enable: false,
            log2_token_partitions: 0,
            quant: QuantIndices::default(),
            refresh_golden_frame: key_frame,
            refresh_altref_frame: key_frame,
            copy_buffer_to_golden: 0,
            copy_buffer_to_altref: 0,
            refresh_last: key_frame,
            refresh_entropy_probs: false,
            prob_skip_false: None,
            prob_inter: 0,
            prob_references_last: 0,
            prob_references_golden: 0,
        };

        if key_frame {
            header.color_space = if bd.read_flag() {
                ColorSpace::Reserved
            } else {
                ColorSpace::YCbCr
            };
            header.clamping_required = bd.read_flag();
        }

        Self::parse_segmentation(bd, &mut header, state)?;

        header.filter_type = if bd.read_flag() {
            FilterType::Simple
        } else {
            FilterType::Normal
        };
        header.loop_filter_level = bd.read_literal(6) as u8;
        header.sharpness_level = bd.read_literal(3) as u8;

        Self::parse_loop_filter_adjustments(bd, &mut header, state);

        header.log2_token_partitions = bd.read_literal(2) as u8;

        header.quant = Self::parse_quant_indices(bd);

        if key_frame {
            header.refresh_entropy_probs = bd.read_flag();
        } else {
            header.refresh_golden_frame = bd.read_flag();
            header.refresh_altref_frame = bd.read_flag();
            if !header.refresh_golden_frame {
                header.copy_buffer_to_golden = bd.read_literal(2) as u8;
            }
            if !header.refresh_altref_frame {
                header.copy_buffer_to_altref = bd.read_literal(2) as u8;
            }
            state.sign_bias_golden = bd.read_flag();
            state.sign_bias_altref = bd.read_flag();
            header.refresh_entropy_probs = bd.read_flag();
            header.refresh_last = bd.read_flag();
        }

        let saved = if header.refresh_entropy_probs {
            None
        } else {
            Some(state.save_probs())
        };

        state.coeff_probs.update(bd);

        if bd.read_flag() {
            header.prob_skip_false = Some(bd.read_literal(8) as u8);
        }

        if !key_frame {
            header.prob_inter = bd.read_literal(8) as u8;
            header.prob_references_last = bd.read_literal(8) as u8;
            header.prob_references_golden = bd.read_literal(8) as u8;

            if bd.read_flag() {
                for prob in &mut state.y_mode_probs {
                    *prob = bd.read_literal(8) as u8;
                }
            }
            if bd.read_flag() {
                for prob in &mut state.uv_mode_probs {
                    *prob = bd.read_literal(8) as u8;
                }
            }

            for (probs, update_probs) in state.mv_probs.iter_mut().zip(&MV_UPDATE_PROBS) {
                for (prob, &update_prob) in probs.iter_mut().zip(update_probs) {
                    if bd.read_bool(update_prob) {
                        let val = bd.read_literal(7) as u8;
                        *prob = if val == 0 { 1 } else { val << 1 };
                    }
                }
            }
        }

        Ok((header, saved))
    }

    fn parse_segmentation(
        bd: &mut BoolDecoder,
        header: &mut FrameHeader,
        state: &mut DecoderState,
    ) -> Result<()> {
        state.segmentation_enabled = bd.read_flag();
        if !state.segmentation_enabled {
            return Ok(());
        }

        header.update_mb_segmentation_map = bd.read_flag();
        let update_feature_data = bd.read_flag();

        if update_feature_data {
            state.segment_feature_mode = if bd.read_flag() {
                SegmentFeatureMode::Absolute
            } else {
                SegmentFeatureMode::Delta
            };

            // Features without an update flag reset to zero
            state.segment_quant = [0; MAX_SEGMENTS];
            for quant in &mut state.segment_quant {
                *quant = bd.read_optional_signed(7, 0);
            }

            state.segment_filter_level = [0; MAX_SEGMENTS];
            for level in &mut state.segment_filter_level {
                *level = bd.read_optional_signed(6, 0);
                if state.segment_feature_mode == SegmentFeatureMode::Absolute && *level < 0 {
                    return Err(Error::invalid_stream(
                        "absolute loop-filter update with out-of-bounds value",
                    ));
                }
            }
        }

        if header.update_mb_segmentation_map {
            for prob in &mut state.mb_segment_tree_probs {
                *prob = if bd.read_flag() {
                    bd.read_literal(8) as u8
                } else {
                    255
                };
            }
        }

        Ok(())
    }

    fn parse_loop_filter_adjustments(
        bd: &mut BoolDecoder,
        header: &mut FrameHeader,
        state: &mut DecoderState,
    ) {
        header.loop_filter_adj_enable = bd.read_flag();
        if header.loop_filter_adj_enable && bd.read_flag() {
            for delta in &mut state.loopfilter_ref_adjustments {
                *delta = bd.read_optional_signed(6, *delta);
            }
            for delta in &mut state.loopfilter_mode_adjustments {
                *delta = bd.read_optional_signed(6, *delta);
            }
        }
    }

    fn parse_quant_indices(bd: &mut BoolDecoder) -> QuantIndices {
        QuantIndices {
            y_ac_qi: bd.read_literal(7) as u8,
            y_dc_delta: bd.read_optional_signed(4, 0),
            y2_dc_delta: bd.read_optional_signed(4, 0),
            y2_ac_delta: bd.read_optional_signed(4, 0),
            uv_dc_delta: bd.read_optional_signed(4, 0),
            uv_ac_delta: bd.read_optional_signed(4, 0),
        }
    }
}

/// Quantities derived once per frame from the header and decoder state
#[derive(Clone, Copy)]
pub struct DerivedQuantities {
    pub frame_quantizer: Quantizer,
    pub segment_quantizers: [Quantizer; MAX_SEGMENTS],
    pub frame_filter: FilterParameters,
    pub segment_filters: [FilterParameters; MAX_SEGMENTS],
}

impl DerivedQuantities {
    pub fn compute(header: &FrameHeader, state: &DecoderState) -> Self {
        let base_qi = i16::from(header.quant.y_ac_qi);
        let absolute = state.segment_feature_mode == SegmentFeatureMode::Absolute;

        let frame_filter = FilterParameters {
            filter_type: header.filter_type,
            filter_level: i32::from(header.loop_filter_level),
            sharpness_level: header.sharpness_level,
        };

        let mut segment_quantizers = [Quantizer::default(); MAX_SEGMENTS];
        let mut segment_filters = [frame_filter; MAX_SEGMENTS];

        for id in 0..MAX_SEGMENTS {
            let seg_qi = if absolute {
                i16::from(state.segment_quant[id])
            } else {
                base_qi + i16::from(state.segment_quant[id])
            };
            segment_quantizers[id] = Quantizer::new(&header.quant, seg_qi.clamp(0, 127));

            segment_filters[id].filter_level = if absolute {
                i32::from(state.segment_filter_level[id])
            } else {
                i32::from(header.loop_filter_level) + i32::from(state.segment_filter_level[id])
            };
        }

        DerivedQuantities {
            frame_quantizer: Quantizer::frame_default(&header.quant),
            segment_quantizers,
            frame_filter,
            segment_filters,
        }
    }

    /// Quantizer for a macroblock, honoring its segment when segmentation
    /// is active
    pub fn quantizer(&self, segment_id: Option<u8>) -> &Quantizer {
        match segment_id {
            Some(id) => &self.segment_quantizers[id as usize],
            None => &self.frame_quantizer,
        }
    }

    /// Loop-filter parameters for a macroblock before adjustment
    pub fn filter_parameters(&self, segment_id: Option<u8>) -> FilterParameters {
        match segment_id {
            Some(id) => self.segment_filters[id as usize],
            None => self.frame_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_tag_key_frame() {
        // Tag bytes for a key frame: bit 0 clear, show-frame set,
        // partition size in the top 19 bits
        let size = 1337u32;
        let tag = (size << 5) | 0x10;
        let data = [tag as u8, (tag >> 8) as u8, (tag >> 16) as u8];
        let parsed = FrameTag::parse(&data).unwrap();
        assert_eq!(parsed.frame_type, FrameType::KeyFrame);
        assert!(parsed.show_frame);
        assert_eq!(parsed.first_partition_size, size);
        assert_eq!(parsed.version, 0);
    }

    #[test]
    fn test_frame_tag_inter_frame() {
        let data = [0x01, 0x00, 0x00];
        let parsed = FrameTag::parse(&data).unwrap();
        assert_eq!(parsed.frame_type, FrameType::InterFrame);
        assert!(!parsed.show_frame);
    }

    #[test]
    fn test_frame_tag_too_short() {
        assert!(FrameTag::parse(&[0x00, 0x01]).is_err());
    }

    #[test]
    fn test_key_frame_dimensions() {
        let data = [0x9d, 0x01, 0x2a, 17, 0, 17, 0];
        let dims = KeyFrameDimensions::parse(&data).unwrap();
        assert_eq!(dims.width, 17);
        assert_eq!(dims.height, 17);
        assert_eq!(dims.horizontal_scale, 0);
        assert_eq!(dims.vertical_scale, 0);
    }

    #[test]
    fn test_key_frame_dimensions_with_scale() {
        // Scale bits live in the top two bits of each 16-bit field
        let w: u16 = 640 | (1 << 14);
        let h: u16 = 480 | (2 << 14);
        let data = [
            0x9d,
            0x01,
            0x2a,
            w as u8,
            (w >> 8) as u8,
            h as u8,
            (h >> 8) as u8,
        ];
        let dims = KeyFrameDimensions::parse(&data).unwrap();
        assert_eq!(dims.width, 640);
        assert_eq!(dims.horizontal_scale, 1);
        assert_eq!(dims.height, 480);
        assert_eq!(dims.vertical_scale, 2);
    }

    #[test]
    fn test_bad_start_code() {
        let data = [0x9d, 0x01, 0x2b, 0, 0, 0, 0];
        assert!(KeyFrameDimensions::parse(&data).is_err());
    }

    #[test]
    fn test_key_frame_header_all_defaults() {
        // An all-zero first partition decodes every flag as false and
        // every literal as zero.
        let data = vec![0u8; 256];
        let mut bd = BoolDecoder::new(&data);
        let mut state = DecoderState::default();
        let (header, saved) =
            FrameHeader::parse(&mut bd, FrameType::KeyFrame, &mut state).unwrap();

        assert_eq!(header.color_space, ColorSpace::YCbCr);
        assert!(!state.segmentation_enabled);
        assert_eq!(header.filter_type, FilterType::Normal);
        assert_eq!(header.loop_filter_level, 0);
        assert_eq!(header.sharpness_level, 0);
        assert_eq!(header.log2_token_partitions, 0);
        assert_eq!(header.quant.y_ac_qi, 0);
        assert!(header.refresh_last);
        assert!(header.refresh_golden_frame);
        assert!(header.refresh_altref_frame);
        assert!(!header.refresh_entropy_probs);
        assert!(header.prob_skip_false.is_none());
        // Probability snapshot taken because refresh is clear
        assert!(saved.is_some());
        assert_eq!(state.coeff_probs.probs, CoeffProbs::default().probs);
    }

    #[test]
    fn test_derived_quantities_segment_absolute_filter() {
        let mut state = DecoderState::default();
        state.segmentation_enabled = true;
        state.segment_feature_mode = SegmentFeatureMode::Absolute;
        state.segment_filter_level = [0, 10, 0, 0];

        let data = vec![0u8; 64];
        let mut bd = BoolDecoder::new(&data);
        let mut scratch = state.clone();
        let (mut header, _) =
            FrameHeader::parse(&mut bd, FrameType::KeyFrame, &mut scratch).unwrap();
        header.loop_filter_level = 20;

        let derived = DerivedQuantities::compute(&header, &state);
        assert_eq!(derived.segment_filters[0].filter_level, 0);
        assert_eq!(derived.segment_filters[1].filter_level, 10);
        assert_eq!(derived.frame_filter.filter_level, 20);
    }

    #[test]
    fn test_derived_quantities_segment_delta_quant() {
        let mut state = DecoderState::default();
        state.segmentation_enabled = true;
        state.segment_feature_mode = SegmentFeatureMode::Delta;
        state.segment_quant = [0, 10, -10, 0];

        let header = FrameHeader {
            quant: QuantIndices {
                y_ac_qi: 60,
                ..Default::default()
            },
            ..synthetic_header(FrameType::KeyFrame)
        };

        let derived = DerivedQuantities::compute(&header, &state);
        assert_eq!(
            derived.segment_quantizers[1].y_ac,
            crate::quant::AC_QUANT[70]
        );
        assert_eq!(
            derived.segment_quantizers[2].y_ac,
            crate::quant::AC_QUANT[50]
        );
        assert_eq!(derived.frame_quantizer.y_ac, crate::quant::AC_QUANT[60]);
    }

    fn synthetic_header(frame_type: FrameType) -> FrameHeader {
        let data = vec![0u8; 64];
        let mut bd = BoolDecoder::new(&data);
        let mut state = DecoderState::default();
        FrameHeader::parse(&mut bd, frame_type, &mut state).unwrap().0
    }
}
