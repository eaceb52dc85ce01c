//! Macroblock header, prediction-mode and token decoding
//!
//! Macroblocks decode in raster-scan order; all sequential dependencies
//! flow through neighbor lookups (prediction modes, motion vectors,
//! has-nonzero flags) into the already-parsed grid to the left and above.

use crate::bool_decoder::BoolDecoder;
use crate::entropy::{decode_block_coeffs, TokenPlane};
use crate::error::{Error, Result};
use crate::frame::{DecoderState, FrameHeader};
use crate::tables::{
    ChromaMode, FrameType, LumaMode, MotionVector, MvRefMode, MvSplit, RefFrame, SubMvRef,
    SubblockMode, BMODE_TREE, INVARIANT_BMODE_PROBS, KF_BMODE_PROBS, KF_UVMODE_PROBS,
    KF_YMODE_PROBS, KF_YMODE_TREE, LONG_MV_BIT_ORDER, MV_COUNTS_TO_PROBS, MV_REF_TREE,
    MV_SPLIT_PROBS, MV_SPLIT_TREE, SEGMENT_ID_TREE, SMALL_MV_TREE, SUB_MV_REF_PROBS,
    SUB_MV_REF_TREE, UV_MODE_TREE, YMODE_TREE,
};

/// Coefficient block count per macroblock: 16 luma, 4+4 chroma, 1 Y2
pub const BLOCKS_PER_MB: usize = 25;

/// Block index of the Y2 block within a macroblock
pub const Y2_BLOCK: usize = 24;

/// Fully parsed state of one macroblock
#[derive(Clone)]
pub struct Macroblock {
    pub segment_id: Option<u8>,
    pub skip_coeff: bool,

    pub reference: RefFrame,
    pub motion_vectors_flipped: bool,

    pub luma_mode: LumaMode,
    pub chroma_mode: ChromaMode,
    pub subblock_modes: [SubblockMode; 16],

    pub mv_mode: Option<MvRefMode>,
    /// Per 4x4 luma subblock motion vectors; uniform except for SPLITMV
    pub sub_mvs: [MotionVector; 16],

    pub has_nonzero: bool,
    /// Per-block nonzero flags in coefficient order (Y 0-15, U 16-19,
    /// V 20-23, Y2 24)
    pub nonzero: [bool; BLOCKS_PER_MB],
    pub coeffs: [[i16; 16]; BLOCKS_PER_MB],
}

impl Default for Macroblock {
    fn default() -> Self {
        Macroblock {
            segment_id: None,
            skip_coeff: false,
            reference: RefFrame::Current,
            motion_vectors_flipped: false,
            luma_mode: LumaMode::Dc,
            chroma_mode: ChromaMode::Dc,
            subblock_modes: [SubblockMode::BDc; 16],
            mv_mode: None,
            sub_mvs: [MotionVector::ZERO; 16],
            has_nonzero: false,
            nonzero: [false; BLOCKS_PER_MB],
            coeffs: [[0; 16]; BLOCKS_PER_MB],
        }
    }
}

impl Macroblock {
    pub fn is_inter(&self) -> bool {
        self.reference != RefFrame::Current
    }

    /// The base motion vector neighbors vote with: the bottom-right
    /// subblock's vector
    pub fn base_motion_vector(&self) -> MotionVector {
        self.sub_mvs[15]
    }

    /// Whether this macroblock carries a Y2 block
    pub fn has_y2(&self) -> bool {
        match self.mv_mode {
            Some(MvRefMode::Split) => false,
            Some(_) => true,
            None => self.luma_mode != LumaMode::B,
        }
    }

    /// Interior subblock edges are filtered only for macroblocks with
    /// per-subblock structure or residual energy
    pub fn skip_subblock_edges(&self) -> bool {
        self.has_y2() && !self.has_nonzero
    }
}

/// Parsed neighbors of the macroblock being decoded; absent at edges
pub struct Neighbors<'a> {
    pub above: Option<&'a Macroblock>,
    pub left: Option<&'a Macroblock>,
    pub above_left: Option<&'a Macroblock>,
}

/// Position of a macroblock within the frame grid
#[derive(Debug, Clone, Copy)]
pub struct MbPosition {
    pub col: usize,
    pub row: usize,
    pub cols: usize,
    pub rows: usize,
}

fn implied_subblock_mode(y_mode: LumaMode) -> SubblockMode {
    match y_mode {
        LumaMode::Dc => SubblockMode::BDc,
        LumaMode::V => SubblockMode::BVe,
        LumaMode::H => SubblockMode::BHe,
        LumaMode::Tm => SubblockMode::BTm,
        LumaMode::B => unreachable!("B_PRED subblock modes are decoded"),
    }
}

/// Decode the header and prediction modes for one macroblock
pub fn decode_macroblock(
    bd: &mut BoolDecoder,
    header: &FrameHeader,
    state: &DecoderState,
    neighbors: &Neighbors<'_>,
    position: MbPosition,
) -> Result<Macroblock> {
    let mut mb = Macroblock::default();

    if header.update_mb_segmentation_map {
        let id = bd.read_tree(&SEGMENT_ID_TREE, &state.mb_segment_tree_probs);
        if id < 0 || id > 3 {
            return Err(Error::invalid_stream(format!("segment id {id}")));
        }
        mb.segment_id = Some(id as u8);
    }

    if let Some(prob) = header.prob_skip_false {
        mb.skip_coeff = bd.read_bool(prob);
    }

    if header.frame_type == FrameType::KeyFrame {
        decode_key_frame_modes(bd, neighbors, &mut mb)?;
    } else {
        let is_inter = bd.read_bool(header.prob_inter);
        if is_inter {
            decode_inter_modes(bd, header, state, neighbors, position, &mut mb)?;
        } else {
            decode_intra_modes_in_inter_frame(bd, state, &mut mb)?;
        }
    }

    Ok(mb)
}

fn decode_key_frame_modes(
    bd: &mut BoolDecoder,
    neighbors: &Neighbors<'_>,
    mb: &mut Macroblock,
) -> Result<()> {
    mb.luma_mode = LumaMode::from_i8(bd.read_tree(&KF_YMODE_TREE, &KF_YMODE_PROBS))?;

    if mb.luma_mode == LumaMode::B {
        for i in 0..16 {
            let above_mode = if i >= 4 {
                mb.subblock_modes[i - 4]
            } else {
                neighbors
                    .above
                    .map_or(SubblockMode::BDc, |above| above.subblock_modes[12 + i])
            };
            let left_mode = if i % 4 > 0 {
                mb.subblock_modes[i - 1]
            } else {
                neighbors
                    .left
                    .map_or(SubblockMode::BDc, |left| left.subblock_modes[i + 3])
            };

            let probs = &KF_BMODE_PROBS[above_mode as usize][left_mode as usize];
            mb.subblock_modes[i] = SubblockMode::from_i8(bd.read_tree(&BMODE_TREE, probs))?;
        }
    } else {
        mb.subblock_modes = [implied_subblock_mode(mb.luma_mode); 16];
    }

    mb.chroma_mode = ChromaMode::from_i8(bd.read_tree(&UV_MODE_TREE, &KF_UVMODE_PROBS))?;
    Ok(())
}

fn decode_intra_modes_in_inter_frame(
    bd: &mut BoolDecoder,
    state: &DecoderState,
    mb: &mut Macroblock,
) -> Result<()> {
    mb.luma_mode = LumaMode::from_i8(bd.read_tree(&YMODE_TREE, &state.y_mode_probs))?;

    if mb.luma_mode == LumaMode::B {
        // Intra macroblocks in inter frames are simpler than in key
        // frames: subblock modes are not neighbor-conditioned.
        for mode in &mut mb.subblock_modes {
            *mode = SubblockMode::from_i8(bd.read_tree(&BMODE_TREE, &INVARIANT_BMODE_PROBS))?;
        }
    } else {
        mb.subblock_modes = [implied_subblock_mode(mb.luma_mode); 16];
    }

    mb.chroma_mode = ChromaMode::from_i8(bd.read_tree(&UV_MODE_TREE, &state.uv_mode_probs))?;
    Ok(())
}

/// Motion-vector census: neighbors vote for their base motion vector,
/// weighted above=2, left=2, above-left=1. Absent neighbors vote for the
/// zero vector; intra neighbors do not vote.
struct Scorer {
    scores: Vec<(u8, MotionVector)>,
    splitmv_score: u8,
    motion_vectors_flipped: bool,
    best: (u8, MotionVector),
    nearest: (u8, MotionVector),
    near: (u8, MotionVector),
}

impl Scorer {
    fn new(motion_vectors_flipped: bool) -> Self {
        Scorer {
            scores: Vec::with_capacity(3),
            splitmv_score: 0,
            motion_vectors_flipped,
            best: (0, MotionVector::ZERO),
            nearest: (0, MotionVector::ZERO),
            near: (0, MotionVector::ZERO),
        }
    }

    fn add_vote(&mut self, score: u8, mv: MotionVector) {
        for entry in &mut self.scores {
            if entry.1 == mv {
                entry.0 += score;
                return;
            }
        }
        self.scores.push((score, mv));
    }

    fn add(&mut self, score: u8, neighbor: Option<&Macroblock>) {
        match neighbor {
            Some(mb) if mb.is_inter() => {
                let mut mv = mb.base_motion_vector();
                if mb.motion_vectors_flipped != self.motion_vectors_flipped {
                    mv = -mv;
                }
                self.add_vote(score, mv);
                if mb.mv_mode == Some(MvRefMode::Split) {
                    self.splitmv_score += score;
                }
            }
            Some(_) => {}
            None => self.add_vote(score, MotionVector::ZERO),
        }
    }

    fn calculate(&mut self) {
        self.scores.sort_by(|a, b| b.0.cmp(&a.0));
        while self.scores.len() < 3 {
            self.scores.push((0, MotionVector::ZERO));
        }

        self.best = self.scores[0];
        if self.scores[0].1.is_zero() {
            self.nearest = self.scores[1];
            self.near = self.scores[2];
        } else {
            self.nearest = self.scores[0];
            self.near = self.scores[1];
        }
    }

    /// Census scores indexing the fixed mv-ref probability table
    fn mode_contexts(&self) -> [u8; 4] {
        [
            self.best.0,
            self.nearest.0,
            self.near.0,
            self.splitmv_score,
        ]
    }
}

/// Clamp a motion vector so the referenced block stays within a
/// 16-pixel band around the frame (eighth-pel units)
fn clamp_mv(mv: MotionVector, position: MbPosition) -> MotionVector {
    let margin = 16 << 3;
    let min_x = -(((position.col * 16) << 3) as i32) - margin;
    let max_x = (((position.cols - 1 - position.col) * 16) << 3) as i32 + margin;
    let min_y = -(((position.row * 16) << 3) as i32) - margin;
    let max_y = (((position.rows - 1 - position.row) * 16) << 3) as i32 + margin;

    MotionVector {
        x: i32::from(mv.x).clamp(min_x, max_x) as i16,
        y: i32::from(mv.y).clamp(min_y, max_y) as i16,
    }
}

/// Decode one motion-vector component: a small-magnitude tree below 8,
/// a ten-bit form above, then a sign bit for non-zero values
fn decode_mv_component(bd: &mut BoolDecoder, probs: &[u8; 19]) -> i16 {
    let magnitude = if !bd.read_bool(probs[0]) {
        i16::from(bd.read_tree(&SMALL_MV_TREE, &probs[2..9]))
    } else {
        let long_probs = &probs[9..];
        let mut raw = 0i16;
        for &bit in &LONG_MV_BIT_ORDER {
            raw |= i16::from(bd.read_bool(long_probs[bit])) << bit;
        }
        // Bit 3 is forced when the upper bits are all clear; the short
        // form already covers magnitudes below 8
        if raw & 0x3f0 != 0 {
            raw |= i16::from(bd.read_bool(long_probs[3])) << 3;
        } else {
            raw |= 1 << 3;
        }
        raw
    };

    if magnitude != 0 && bd.read_bool(probs[1]) {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a full motion vector, row component first, in eighth-pel units
fn read_motion_vector(bd: &mut BoolDecoder, state: &DecoderState) -> MotionVector {
    let y = decode_mv_component(bd, &state.mv_probs[0]);
    let x = decode_mv_component(bd, &state.mv_probs[1]);
    MotionVector {
        x: x * 2,
        y: y * 2,
    }
}

fn decode_inter_modes(
    bd: &mut BoolDecoder,
    header: &FrameHeader,
    state: &DecoderState,
    neighbors: &Neighbors<'_>,
    position: MbPosition,
    mb: &mut Macroblock,
) -> Result<()> {
    let sel1 = bd.read_bool(header.prob_references_last);
    mb.reference = if !sel1 {
        RefFrame::Last
    } else if !bd.read_bool(header.prob_references_golden) {
        RefFrame::Golden
    } else {
        RefFrame::Altref
    };

    mb.motion_vectors_flipped = match mb.reference {
        RefFrame::Golden => state.sign_bias_golden,
        RefFrame::Altref => state.sign_bias_altref,
        _ => false,
    };

    let mut census = Scorer::new(mb.motion_vectors_flipped);
    census.add(2, neighbors.above);
    census.add(2, neighbors.left);
    census.add(1, neighbors.above_left);
    census.calculate();

    let counts = census.mode_contexts();
    let mv_ref_probs = [
        MV_COUNTS_TO_PROBS[counts[0] as usize][0],
        MV_COUNTS_TO_PROBS[counts[1] as usize][1],
        MV_COUNTS_TO_PROBS[counts[2] as usize][2],
        MV_COUNTS_TO_PROBS[counts[3] as usize][3],
    ];

    let mode = MvRefMode::from_i8(bd.read_tree(&MV_REF_TREE, &mv_ref_probs))?;
    mb.mv_mode = Some(mode);

    let best = clamp_mv(census.best.1, position);
    let nearest = clamp_mv(census.nearest.1, position);
    let near = clamp_mv(census.near.1, position);

    match mode {
        MvRefMode::Zero => mb.sub_mvs = [MotionVector::ZERO; 16],
        MvRefMode::Nearest => mb.sub_mvs = [nearest; 16],
        MvRefMode::Near => mb.sub_mvs = [near; 16],
        MvRefMode::New => {
            let mv = best + read_motion_vector(bd, state);
            mb.sub_mvs = [mv; 16];
        }
        MvRefMode::Split => decode_split_mvs(bd, state, neighbors, best, mb)?,
    }

    Ok(())
}

/// Left/above sub-vector context for one subblock of a SPLITMV partition
fn sub_mv_context(
    neighbors: &Neighbors<'_>,
    mb: &Macroblock,
    x: usize,
    y: usize,
) -> (MotionVector, MotionVector) {
    let left = if x > 0 {
        mb.sub_mvs[y * 4 + x - 1]
    } else {
        neighbors
            .left
            .map_or(MotionVector::ZERO, |l| l.sub_mvs[y * 4 + 3])
    };
    let above = if y > 0 {
        mb.sub_mvs[(y - 1) * 4 + x]
    } else {
        neighbors
            .above
            .map_or(MotionVector::ZERO, |a| a.sub_mvs[12 + x])
    };
    (left, above)
}

fn decode_sub_mv(
    bd: &mut BoolDecoder,
    state: &DecoderState,
    left: MotionVector,
    above: MotionVector,
    best: MotionVector,
) -> Result<MotionVector> {
    let ctx = if left == above {
        if left.is_zero() {
            4
        } else {
            3
        }
    } else if above.is_zero() {
        2
    } else if left.is_zero() {
        1
    } else {
        0
    };

    let mode = SubMvRef::from_i8(bd.read_tree(&SUB_MV_REF_TREE, &SUB_MV_REF_PROBS[ctx]))?;
    Ok(match mode {
        SubMvRef::Left => left,
        SubMvRef::Above => above,
        SubMvRef::Zero => MotionVector::ZERO,
        SubMvRef::New => best + read_motion_vector(bd, state),
    })
}

fn decode_split_mvs(
    bd: &mut BoolDecoder,
    state: &DecoderState,
    neighbors: &Neighbors<'_>,
    best: MotionVector,
    mb: &mut Macroblock,
) -> Result<()> {
    let split = MvSplit::from_i8(bd.read_tree(&MV_SPLIT_TREE, &MV_SPLIT_PROBS))?;

    // Partition anchors: the first subblock of each partition decodes a
    // sub-vector, which then fills the rest of the partition.
    match split {
        MvSplit::TopBottom => {
            for &anchor_y in &[0usize, 2] {
                let (left, above) = sub_mv_context(neighbors, mb, 0, anchor_y);
                let mv = decode_sub_mv(bd, state, left, above, best)?;
                for y in anchor_y..anchor_y + 2 {
                    for x in 0..4 {
                        mb.sub_mvs[y * 4 + x] = mv;
                    }
                }
            }
        }
        MvSplit::LeftRight => {
            for &anchor_x in &[0usize, 2] {
                let (left, above) = sub_mv_context(neighbors, mb, anchor_x, 0);
                let mv = decode_sub_mv(bd, state, left, above, best)?;
                for y in 0..4 {
                    for x in anchor_x..anchor_x + 2 {
                        mb.sub_mvs[y * 4 + x] = mv;
                    }
                }
            }
        }
        MvSplit::Quarters => {
            for &anchor_y in &[0usize, 2] {
                for &anchor_x in &[0usize, 2] {
                    let (left, above) = sub_mv_context(neighbors, mb, anchor_x, anchor_y);
                    let mv = decode_sub_mv(bd, state, left, above, best)?;
                    for y in anchor_y..anchor_y + 2 {
                        for x in anchor_x..anchor_x + 2 {
                            mb.sub_mvs[y * 4 + x] = mv;
                        }
                    }
                }
            }
        }
        MvSplit::Sixteenths => {
            for y in 0..4 {
                for x in 0..4 {
                    let (left, above) = sub_mv_context(neighbors, mb, x, y);
                    mb.sub_mvs[y * 4 + x] = decode_sub_mv(bd, state, left, above, best)?;
                }
            }
        }
    }

    Ok(())
}

/// Running has-nonzero context for token decoding, one entry per 4x4
/// block column plus a left edge that resets at each macroblock row
pub struct TokenContext {
    above_y: Vec<u8>,
    above_u: Vec<u8>,
    above_v: Vec<u8>,
    above_y2: Vec<u8>,
    left_y: [u8; 4],
    left_u: [u8; 2],
    left_v: [u8; 2],
    left_y2: u8,
}

impl TokenContext {
    pub fn new(mb_cols: usize) -> Self {
        TokenContext {
            above_y: vec![0; mb_cols * 4],
            above_u: vec![0; mb_cols * 2],
            above_v: vec![0; mb_cols * 2],
            above_y2: vec![0; mb_cols],
            left_y: [0; 4],
            left_u: [0; 2],
            left_v: [0; 2],
            left_y2: 0,
        }
    }

    /// Reset the left edge at the start of a macroblock row
    pub fn start_row(&mut self) {
        self.left_y = [0; 4];
        self.left_u = [0; 2];
        self.left_v = [0; 2];
        self.left_y2 = 0;
    }
}

/// Decode (or skip) the residual tokens for one macroblock, updating the
/// running neighbor context
pub fn parse_tokens(
    bd: &mut BoolDecoder,
    state: &DecoderState,
    ctx: &mut TokenContext,
    mb_col: usize,
    mb: &mut Macroblock,
) {
    let has_y2 = mb.has_y2();

    if mb.skip_coeff {
        // No tokens are consumed; downstream context sees all-zero
        // blocks. The Y2 context is left alone for macroblocks without a
        // Y2 block so it keeps propagating across them.
        ctx.left_y = [0; 4];
        ctx.left_u = [0; 2];
        ctx.left_v = [0; 2];
        ctx.above_y[mb_col * 4..mb_col * 4 + 4].fill(0);
        ctx.above_u[mb_col * 2..mb_col * 2 + 2].fill(0);
        ctx.above_v[mb_col * 2..mb_col * 2 + 2].fill(0);
        if has_y2 {
            ctx.left_y2 = 0;
            ctx.above_y2[mb_col] = 0;
        }
        return;
    }

    let probs = &state.coeff_probs;

    if has_y2 {
        let first_ctx = usize::from(ctx.left_y2 + ctx.above_y2[mb_col]);
        let nz = decode_block_coeffs(
            bd,
            probs,
            TokenPlane::Y2,
            first_ctx,
            &mut mb.coeffs[Y2_BLOCK],
        );
        mb.nonzero[Y2_BLOCK] = nz;
        mb.has_nonzero |= nz;
        let flag = u8::from(nz);
        ctx.left_y2 = flag;
        ctx.above_y2[mb_col] = flag;
    }

    let y_plane = if has_y2 {
        TokenPlane::YAfterY2
    } else {
        TokenPlane::Y
    };
    for i in 0..16 {
        let x = i % 4;
        let y = i / 4;
        let first_ctx = usize::from(ctx.left_y[y] + ctx.above_y[mb_col * 4 + x]);
        let nz = decode_block_coeffs(bd, probs, y_plane, first_ctx, &mut mb.coeffs[i]);
        mb.nonzero[i] = nz;
        mb.has_nonzero |= nz;
        let flag = u8::from(nz);
        ctx.left_y[y] = flag;
        ctx.above_y[mb_col * 4 + x] = flag;
    }

    for i in 0..4 {
        let x = i % 2;
        let y = i / 2;
        let first_ctx = usize::from(ctx.left_u[y] + ctx.above_u[mb_col * 2 + x]);
        let nz = decode_block_coeffs(bd, probs, TokenPlane::Uv, first_ctx, &mut mb.coeffs[16 + i]);
        mb.nonzero[16 + i] = nz;
        mb.has_nonzero |= nz;
        let flag = u8::from(nz);
        ctx.left_u[y] = flag;
        ctx.above_u[mb_col * 2 + x] = flag;
    }

    for i in 0..4 {
        let x = i % 2;
        let y = i / 2;
        let first_ctx = usize::from(ctx.left_v[y] + ctx.above_v[mb_col * 2 + x]);
        let nz = decode_block_coeffs(bd, probs, TokenPlane::Uv, first_ctx, &mut mb.coeffs[20 + i]);
        mb.nonzero[20 + i] = nz;
        mb.has_nonzero |= nz;
        let flag = u8::from(nz);
        ctx.left_v[y] = flag;
        ctx.above_v[mb_col * 2 + x] = flag;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::FrameType;

    fn no_neighbors() -> Neighbors<'static> {
        Neighbors {
            above: None,
            left: None,
            above_left: None,
        }
    }

    fn origin_position() -> MbPosition {
        MbPosition {
            col: 0,
            row: 0,
            cols: 4,
            rows: 4,
        }
    }

    #[test]
    fn test_key_frame_modes_from_zero_stream() {
        // All-zero bits walk every tree to its first leaf: B_PRED luma,
        // B_DC_PRED subblocks, DC chroma.
        let data = vec![0u8; 64];
        let mut bd = BoolDecoder::new(&data);
        let state = DecoderState::default();
        let header = synthetic_header(FrameType::KeyFrame);

        let mb = decode_macroblock(
            &mut bd,
            &header,
            &state,
            &no_neighbors(),
            origin_position(),
        )
        .unwrap();
        assert_eq!(mb.luma_mode, LumaMode::B);
        assert!(mb
            .subblock_modes
            .iter()
            .all(|&m| m == SubblockMode::BDc));
        assert_eq!(mb.chroma_mode, ChromaMode::Dc);
        assert!(!mb.is_inter());
        assert!(!mb.has_y2());
    }

    #[test]
    fn test_implied_subblock_modes() {
        assert_eq!(implied_subblock_mode(LumaMode::Dc), SubblockMode::BDc);
        assert_eq!(implied_subblock_mode(LumaMode::V), SubblockMode::BVe);
        assert_eq!(implied_subblock_mode(LumaMode::H), SubblockMode::BHe);
        assert_eq!(implied_subblock_mode(LumaMode::Tm), SubblockMode::BTm);
    }

    #[test]
    fn test_census_absent_neighbors_vote_zero() {
        let mut census = Scorer::new(false);
        census.add(2, None);
        census.add(2, None);
        census.add(1, None);
        census.calculate();

        // All three votes pool on the zero vector
        assert_eq!(census.best, (5, MotionVector::ZERO));
        assert_eq!(census.mode_contexts(), [5, 0, 0, 0]);
    }

    #[test]
    fn test_census_intra_neighbors_do_not_vote() {
        let intra = Macroblock::default();
        let mut census = Scorer::new(false);
        census.add(2, Some(&intra));
        census.add(2, Some(&intra));
        census.add(1, Some(&intra));
        census.calculate();
        assert_eq!(census.mode_contexts(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_census_orders_nearest_and_near() {
        let mv_a = MotionVector { x: 8, y: 0 };
        let mv_b = MotionVector { x: -4, y: 4 };

        let mut above = Macroblock::default();
        above.reference = RefFrame::Last;
        above.sub_mvs = [mv_a; 16];

        let mut left = Macroblock::default();
        left.reference = RefFrame::Last;
        left.sub_mvs = [mv_b; 16];

        let mut above_left = Macroblock::default();
        above_left.reference = RefFrame::Last;
        above_left.sub_mvs = [mv_a; 16];

        let mut census = Scorer::new(false);
        census.add(2, Some(&above));
        census.add(2, Some(&left));
        census.add(1, Some(&above_left));
        census.calculate();

        // mv_a scores 3, mv_b scores 2; both non-zero so nearest=best
        assert_eq!(census.best, (3, mv_a));
        assert_eq!(census.nearest, (3, mv_a));
        assert_eq!(census.near, (2, mv_b));
        assert_eq!(census.mode_contexts(), [3, 3, 2, 0]);
    }

    #[test]
    fn test_census_flips_on_sign_bias_mismatch() {
        let mv = MotionVector { x: 6, y: -2 };
        let mut above = Macroblock::default();
        above.reference = RefFrame::Last;
        above.motion_vectors_flipped = true;
        above.sub_mvs = [mv; 16];

        let mut census = Scorer::new(false);
        census.add(2, Some(&above));
        census.calculate();
        assert_eq!(census.best.1, -mv);
    }

    #[test]
    fn test_census_splitmv_weight() {
        let mut above = Macroblock::default();
        above.reference = RefFrame::Last;
        above.mv_mode = Some(MvRefMode::Split);
        above.sub_mvs = [MotionVector { x: 2, y: 2 }; 16];

        let mut census = Scorer::new(false);
        census.add(2, Some(&above));
        census.add(2, None);
        census.add(1, None);
        census.calculate();
        assert_eq!(census.mode_contexts()[3], 2);
    }

    #[test]
    fn test_clamp_mv_border_band() {
        let position = MbPosition {
            col: 0,
            row: 0,
            cols: 2,
            rows: 2,
        };
        let wild = MotionVector {
            x: -4000,
            y: 4000,
        };
        let clamped = clamp_mv(wild, position);
        // 16-pixel margin in eighth-pel units on each side
        assert_eq!(clamped.x, -128);
        assert_eq!(clamped.y, 16 * 8 + 128);
    }

    #[test]
    fn test_skip_macroblock_consumes_no_tokens() {
        let data = vec![0xffu8; 8];
        let mut bd = BoolDecoder::new(&data);
        let state = DecoderState::default();
        let mut ctx = TokenContext::new(2);

        let mut mb = Macroblock {
            skip_coeff: true,
            luma_mode: LumaMode::Dc,
            ..Default::default()
        };

        let before = bd.position();
        parse_tokens(&mut bd, &state, &mut ctx, 0, &mut mb);
        assert_eq!(bd.position(), before);
        assert!(!mb.has_nonzero);
        assert!(mb.nonzero.iter().all(|&f| !f));
    }

    #[test]
    fn test_parse_tokens_zero_stream() {
        // All-zero token data: every block reads EOB immediately
        let data = vec![0u8; 64];
        let mut bd = BoolDecoder::new(&data);
        let state = DecoderState::default();
        let mut ctx = TokenContext::new(1);
        ctx.start_row();

        let mut mb = Macroblock {
            luma_mode: LumaMode::Dc,
            ..Default::default()
        };
        parse_tokens(&mut bd, &state, &mut ctx, 0, &mut mb);
        assert!(!mb.has_nonzero);
        assert!(mb.coeffs.iter().all(|b| b.iter().all(|&c| c == 0)));
    }

    fn synthetic_header(frame_type: FrameType) -> FrameHeader {
        let data = vec![0u8; 64];
        let mut bd = BoolDecoder::new(&data);
        let mut state = DecoderState::default();
        FrameHeader::parse(&mut bd, frame_type, &mut state)
            .unwrap()
            .0
    }
}
