//! VP8 frame driver
//!
//! Orchestrates the decode of one frame: uncompressed chunk, frame
//! header, derived quantities, then three raster-scan passes over the
//! macroblock grid (header+token parse, reconstruction, loop filter),
//! and finally the reference-slot update. Persistent probability state
//! lives in [`DecoderState`] and is mutated only at defined points.

use tracing::{debug, warn};

use crate::bool_decoder::BoolDecoder;
use crate::error::{Error, Result};
use crate::filter::{self, FilterLimits, MacroblockPlanes};
use crate::frame::{DecoderState, DerivedQuantities, FrameHeader, FrameTag, KeyFrameDimensions};
use crate::macroblock::{
    decode_macroblock, parse_tokens, Macroblock, MbPosition, Neighbors, TokenContext, Y2_BLOCK,
};
use crate::prediction::{self, SubblockEdges};
use crate::quant::{self, Quantizer};
use crate::raster::{Raster, RasterHandle, ReferenceFrames};
use crate::tables::{FilterType, FrameType, LumaMode};
use crate::transform;

/// A VP8 decoder holding persistent state across frames
pub struct Vp8Decoder {
    width: u16,
    height: u16,
    mb_cols: usize,
    mb_rows: usize,
    state: DecoderState,
    references: ReferenceFrames,
    seen_key_frame: bool,
}

impl Vp8Decoder {
    /// Create a decoder with an out-of-band dimension hint for the first
    /// frame; key frames validate against it and adopt their own
    /// dimensions
    pub fn new(width: u16, height: u16) -> Self {
        Vp8Decoder {
            width,
            height,
            mb_cols: (width as usize).div_ceil(16),
            mb_rows: (height as usize).div_ceil(16),
            state: DecoderState::default(),
            references: ReferenceFrames::default(),
            seen_key_frame: false,
        }
    }

    /// Declared luma width in pixels
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Declared luma height in pixels
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Decode one frame payload into the supplied raster.
    ///
    /// The handle is replaced with a freshly allocated raster when it is
    /// still shared with a consumer or has the wrong dimensions. Returns
    /// the frame's show flag. Errors are fatal for the stream; no resync
    /// is attempted.
    pub fn decode_frame(&mut self, data: &[u8], raster: &mut RasterHandle) -> Result<bool> {
        let tag = FrameTag::parse(data)?;
        let key_frame = tag.frame_type == FrameType::KeyFrame;

        let mut offset = 3;
        if key_frame {
            let dims = KeyFrameDimensions::parse(&data[3..])?;
            if dims.width == 0 || dims.height == 0 {
                return Err(Error::invalid_stream("zero frame dimension"));
            }
            if self.seen_key_frame && (dims.width != self.width || dims.height != self.height) {
                debug!(
                    "key frame changes dimensions to {}x{}",
                    dims.width, dims.height
                );
            }
            if !self.seen_key_frame && (dims.width != self.width || dims.height != self.height) {
                warn!(
                    "stream is {}x{}, caller hinted {}x{}",
                    dims.width, dims.height, self.width, self.height
                );
            }
            self.width = dims.width;
            self.height = dims.height;
            self.mb_cols = (self.width as usize).div_ceil(16);
            self.mb_rows = (self.height as usize).div_ceil(16);
            self.seen_key_frame = true;
            offset = 10;
        } else if !self.seen_key_frame {
            return Err(Error::invalid_stream("non-key frame before any key frame"));
        }

        let first_size = tag.first_partition_size as usize;
        if data.len() < offset + first_size {
            return Err(Error::invalid_stream("first partition extends past frame"));
        }
        let first_partition = &data[offset..offset + first_size];
        let rest = &data[offset + first_size..];

        let mut header_bd = BoolDecoder::new(first_partition);
        let (header, saved_probs) =
            FrameHeader::parse(&mut header_bd, tag.frame_type, &mut self.state)?;
        let derived = DerivedQuantities::compute(&header, &self.state);

        debug!(
            "{:?} {}x{} q={} filter={:?}/{} partitions={}",
            tag.frame_type,
            self.width,
            self.height,
            header.quant.y_ac_qi,
            header.filter_type,
            header.loop_filter_level,
            1 << header.log2_token_partitions,
        );

        let token_partitions = split_token_partitions(rest, header.log2_token_partitions)?;
        let mut token_decoders: Vec<BoolDecoder> =
            token_partitions.iter().map(|p| BoolDecoder::new(p)).collect();

        // Pass 1: headers and tokens in raster scan
        let mut grid: Vec<Macroblock> = Vec::with_capacity(self.mb_cols * self.mb_rows);
        let mut token_ctx = TokenContext::new(self.mb_cols);
        for row in 0..self.mb_rows {
            token_ctx.start_row();
            let token_idx = row % token_decoders.len();
            let token_bd = &mut token_decoders[token_idx];
            for col in 0..self.mb_cols {
                let neighbors = Neighbors {
                    above: row
                        .checked_sub(1)
                        .map(|r| &grid[r * self.mb_cols + col]),
                    left: col.checked_sub(1).map(|c| &grid[row * self.mb_cols + c]),
                    above_left: match (row.checked_sub(1), col.checked_sub(1)) {
                        (Some(r), Some(c)) => Some(&grid[r * self.mb_cols + c]),
                        _ => None,
                    },
                };
                let position = MbPosition {
                    col,
                    row,
                    cols: self.mb_cols,
                    rows: self.mb_rows,
                };

                let mut mb =
                    decode_macroblock(&mut header_bd, &header, &self.state, &neighbors, position)?;
                parse_tokens(token_bd, &self.state, &mut token_ctx, col, &mut mb);
                grid.push(mb);
            }
        }

        // Pass 2: dequantize, predict, inverse transform
        let target = self.prepare_raster(raster)?;
        for row in 0..self.mb_rows {
            for col in 0..self.mb_cols {
                let mb = &grid[row * self.mb_cols + col];
                if mb.is_inter() {
                    return Err(Error::unsupported(
                        "inter-frame motion compensation is not implemented",
                    ));
                }
                let quantizer = derived.quantizer(mb.segment_id);
                reconstruct_intra_macroblock(target, mb, row, col, quantizer);
            }
        }

        // Pass 3: loop filter
        if header.loop_filter_level > 0 {
            self.filter_frame(target, &grid, &header, &derived, key_frame);
        }

        // Frame boundary: update reference slots and restore entropy
        // state if this frame's updates were transient
        self.references.update(
            raster,
            header.refresh_golden_frame,
            header.copy_buffer_to_golden,
            header.refresh_altref_frame,
            header.copy_buffer_to_altref,
            header.refresh_last,
        );

        if let Some(saved) = saved_probs {
            self.state.restore_probs(&saved);
        }

        Ok(tag.show_frame)
    }

    /// Ensure the handle points at an exclusively owned raster of the
    /// stream's dimensions
    fn prepare_raster<'a>(&self, raster: &'a mut RasterHandle) -> Result<&'a mut Raster> {
        let needs_new = raster.width() != self.width as usize
            || raster.height() != self.height as usize
            || raster.get_mut().is_none();
        if needs_new {
            *raster = RasterHandle::new(Raster::new(
                u32::from(self.width),
                u32::from(self.height),
            )?);
        }
        raster
            .get_mut()
            .ok_or_else(|| Error::resource_exhausted("raster handle still shared"))
    }

    fn filter_frame(
        &self,
        raster: &mut Raster,
        grid: &[Macroblock],
        header: &FrameHeader,
        derived: &DerivedQuantities,
        key_frame: bool,
    ) {
        let y_stride = raster.y_stride();
        let uv_stride = raster.uv_stride();
        let (y, u, v) = raster.planes_mut();

        for row in 0..self.mb_rows {
            for col in 0..self.mb_cols {
                let mb = &grid[row * self.mb_cols + col];

                let mut params = derived.filter_parameters(mb.segment_id);
                if header.loop_filter_adj_enable {
                    params.adjust(
                        &self.state.loopfilter_ref_adjustments,
                        &self.state.loopfilter_mode_adjustments,
                        mb.reference,
                        mb.luma_mode,
                        mb.mv_mode,
                    );
                }
                if params.filter_level <= 0 {
                    continue;
                }

                let limits = FilterLimits::new(&params, key_frame);
                let skip_subblock_edges = mb.skip_subblock_edges();

                match header.filter_type {
                    FilterType::Normal => {
                        let mut planes = MacroblockPlanes {
                            y: &mut *y,
                            y_stride,
                            u: &mut *u,
                            v: &mut *v,
                            uv_stride,
                        };
                        filter::normal_filter_macroblock(
                            &mut planes,
                            col,
                            row,
                            &limits,
                            skip_subblock_edges,
                        );
                    }
                    FilterType::Simple => {
                        filter::simple_filter_macroblock(
                            &mut *y,
                            y_stride,
                            col,
                            row,
                            &limits,
                            skip_subblock_edges,
                        );
                    }
                }
            }
        }
    }
}

/// Slice the data after the first partition into token partitions: the
/// sizes of all but the last are 3-byte little-endian values up front
fn split_token_partitions(data: &[u8], log2_count: u8) -> Result<Vec<&[u8]>> {
    let count = 1usize << log2_count;
    let table_len = (count - 1) * 3;
    if data.len() < table_len {
        return Err(Error::invalid_stream("token partition table truncated"));
    }

    let mut partitions = Vec::with_capacity(count);
    let mut rest = &data[table_len..];
    for entry in data[..table_len].chunks(3) {
        let size = usize::from(entry[0]) | usize::from(entry[1]) << 8 | usize::from(entry[2]) << 16;
        if rest.len() < size {
            return Err(Error::invalid_stream("token partition extends past frame"));
        }
        let (partition, tail) = rest.split_at(size);
        partitions.push(partition);
        rest = tail;
    }
    partitions.push(rest);

    Ok(partitions)
}

/// Neighbor samples for whole-macroblock prediction, with the 127/129
/// edge substitution applied
struct MbEdges {
    above: [u8; 16],
    left: [u8; 16],
    above_left: u8,
    above_available: bool,
    left_available: bool,
}

fn gather_mb_edges(plane: &[u8], stride: usize, row: usize, col: usize, size: usize) -> MbEdges {
    let x0 = col * size;
    let y0 = row * size;

    let mut above = [127u8; 16];
    if row > 0 {
        let src = &plane[(y0 - 1) * stride + x0..];
        above[..size].copy_from_slice(&src[..size]);
    }

    let mut left = [129u8; 16];
    if col > 0 {
        for (i, cell) in left[..size].iter_mut().enumerate() {
            *cell = plane[(y0 + i) * stride + x0 - 1];
        }
    }

    let above_left = if row == 0 {
        127
    } else if col == 0 {
        129
    } else {
        plane[(y0 - 1) * stride + x0 - 1]
    };

    MbEdges {
        above,
        left,
        above_left,
        above_available: row > 0,
        left_available: col > 0,
    }
}

/// Neighbor samples for one luma subblock of a B_PRED macroblock.
///
/// The four above-right samples of the rightmost subblock column always
/// come from the row above the macroblock, replicated at the frame's
/// right edge; interior rows reuse those same samples.
fn gather_subblock_edges(
    plane: &[u8],
    stride: usize,
    mb_row: usize,
    mb_col: usize,
    mb_cols: usize,
    sbx: usize,
    sby: usize,
) -> SubblockEdges {
    let x0 = mb_col * 16 + sbx * 4;
    let y0 = mb_row * 16 + sby * 4;

    let mut above = [127u8; 8];
    if mb_row > 0 || sby > 0 {
        let src_row = y0 - 1;
        above[..4].copy_from_slice(&plane[src_row * stride + x0..src_row * stride + x0 + 4]);

        if sbx < 3 {
            above[4..].copy_from_slice(
                &plane[src_row * stride + x0 + 4..src_row * stride + x0 + 8],
            );
        } else if mb_row > 0 {
            // Above-right of the rightmost column: the macroblock above
            // and to the right, from the fixed row above this macroblock
            let fixed_row = mb_row * 16 - 1;
            if mb_col + 1 < mb_cols {
                let src = fixed_row * stride + (mb_col + 1) * 16;
                above[4..].copy_from_slice(&plane[src..src + 4]);
            } else {
                above[4..].fill(plane[fixed_row * stride + (mb_col + 1) * 16 - 1]);
            }
        }
        // mb_row == 0 && sbx == 3: above-right stays 127
    }

    let mut left = [129u8; 4];
    if mb_col > 0 || sbx > 0 {
        for (i, cell) in left.iter_mut().enumerate() {
            *cell = plane[(y0 + i) * stride + x0 - 1];
        }
    }

    let above_left = if mb_row == 0 && sby == 0 {
        127
    } else if mb_col == 0 && sbx == 0 {
        129
    } else {
        plane[(y0 - 1) * stride + x0 - 1]
    };

    SubblockEdges {
        above,
        left,
        above_left,
    }
}

/// Apply the inverse transform for one dequantized block and add the
/// residual into the plane
fn apply_residual(
    plane: &mut [u8],
    offset: usize,
    stride: usize,
    coeffs: &[i16; 16],
    has_ac: bool,
) {
    let mut residual = [0i16; 16];
    if has_ac {
        transform::inverse_dct4x4(coeffs, &mut residual);
    } else if coeffs[0] != 0 {
        transform::inverse_dct4x4_dc_only(coeffs[0], &mut residual);
    } else {
        return;
    }
    transform::add_residual(plane, offset, stride, &residual);
}

/// Dequantize, predict and inverse-transform one intra macroblock
fn reconstruct_intra_macroblock(
    raster: &mut Raster,
    mb: &Macroblock,
    row: usize,
    col: usize,
    quantizer: &Quantizer,
) {
    let mut coeffs = mb.coeffs;
    let do_idct = mb.has_nonzero;

    if do_idct {
        for block in coeffs.iter_mut().take(16) {
            quant::dequantize(block, quantizer.y_dc, quantizer.y_ac);
        }
        for block in coeffs.iter_mut().take(24).skip(16) {
            quant::dequantize(block, quantizer.uv_dc, quantizer.uv_ac);
        }

        if mb.has_y2() {
            quant::dequantize(&mut coeffs[Y2_BLOCK], quantizer.y2_dc, quantizer.y2_ac);
            let mut dc = [0i16; 16];
            if mb.nonzero[Y2_BLOCK] {
                transform::inverse_wht4x4(&coeffs[Y2_BLOCK], &mut dc);
            } else if coeffs[Y2_BLOCK][0] != 0 {
                transform::inverse_wht4x4_dc_only(coeffs[Y2_BLOCK][0], &mut dc);
            }
            for (block, &replacement) in coeffs[..16].iter_mut().zip(&dc) {
                block[0] = replacement;
            }
        }
    }

    let y_stride = raster.y_stride();
    let uv_stride = raster.uv_stride();
    let mb_cols = raster.mb_cols();

    // Chroma first, as the original decode order does
    {
        let (_y, u, v) = raster.planes_mut();
        for (plane, base) in [(u, 16usize), (v, 20usize)] {
            let edges = gather_mb_edges(plane, uv_stride, row, col, 8);
            let offset = row * 8 * uv_stride + col * 8;
            prediction::predict_square(
                mb.chroma_mode,
                plane,
                offset,
                uv_stride,
                8,
                &edges.above,
                &edges.left,
                edges.above_left,
                edges.above_available,
                edges.left_available,
            );
            if do_idct {
                for i in 0..4 {
                    let sub_offset = offset + (i / 2) * 4 * uv_stride + (i % 2) * 4;
                    let block = base + i;
                    apply_residual(
                        plane,
                        sub_offset,
                        uv_stride,
                        &coeffs[block],
                        mb.nonzero[block],
                    );
                }
            }
        }
    }

    // Luma
    let y_plane = raster.y_mut();
    let y_offset = row * 16 * y_stride + col * 16;

    if mb.luma_mode == LumaMode::B {
        // Prediction and inverse transform interleave so each subblock
        // sees its reconstructed neighbors
        for i in 0..16 {
            let sbx = i % 4;
            let sby = i / 4;
            let edges = gather_subblock_edges(y_plane, y_stride, row, col, mb_cols, sbx, sby);
            let sub_offset = y_offset + sby * 4 * y_stride + sbx * 4;
            prediction::predict_subblock(
                mb.subblock_modes[i],
                y_plane,
                sub_offset,
                y_stride,
                &edges,
            );
            if do_idct {
                apply_residual(y_plane, sub_offset, y_stride, &coeffs[i], mb.nonzero[i]);
            }
        }
    } else {
        let edges = gather_mb_edges(y_plane, y_stride, row, col, 16);
        prediction::predict_luma(
            mb.luma_mode,
            y_plane,
            y_offset,
            y_stride,
            &edges.above,
            &edges.left,
            edges.above_left,
            edges.above_available,
            edges.left_available,
        );
        if do_idct {
            for i in 0..16 {
                let sub_offset = y_offset + (i / 4) * 4 * y_stride + (i % 4) * 4;
                // DC from the Y2 block counts even when the AC scan was
                // empty
                let has_ac = mb.nonzero[i];
                apply_residual(y_plane, sub_offset, y_stride, &coeffs[i], has_ac);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal key frame: empty first partition and empty token
    /// partition decode entirely from implicit trailing zeros
    fn minimal_key_frame(width: u16, height: u16) -> Vec<u8> {
        let tag = 0x10u32; // key frame, show, first partition size 0
        let mut data = vec![tag as u8, (tag >> 8) as u8, (tag >> 16) as u8];
        data.extend_from_slice(&[0x9d, 0x01, 0x2a]);
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data
    }

    #[test]
    fn test_minimal_key_frame_decodes_uniform_plane() {
        let mut decoder = Vp8Decoder::new(16, 16);
        let mut raster = RasterHandle::new(Raster::new(16, 16).unwrap());
        let data = minimal_key_frame(16, 16);

        let show = decoder.decode_frame(&data, &mut raster).unwrap();
        assert!(show);

        // Every mode tree resolves to its zero-bit leaf: B_PRED with
        // B_DC_PRED subblocks. The first subblock row averages the 127
        // above and 129 left substitutes to 128; below it the 129 left
        // column tips the average to 129, which then propagates.
        for row in 0..4 {
            assert!(raster.y_row(row).iter().all(|&p| p == 128), "row {row}");
        }
        for row in 4..16 {
            assert!(raster.y_row(row).iter().all(|&p| p == 129), "row {row}");
        }
        // Chroma DC prediction drops absent edges instead, staying at 128
        assert!(raster.u().iter().all(|&p| p == 128));
        assert!(raster.v().iter().all(|&p| p == 128));
    }

    #[test]
    fn test_dimensions_17x17() {
        let mut decoder = Vp8Decoder::new(17, 17);
        let mut raster = RasterHandle::new(Raster::new(17, 17).unwrap());
        let data = minimal_key_frame(17, 17);

        decoder.decode_frame(&data, &mut raster).unwrap();
        assert_eq!(decoder.width(), 17);
        assert_eq!(decoder.height(), 17);
        assert_eq!(raster.mb_cols(), 2);
        assert_eq!(raster.mb_rows(), 2);
        assert_eq!(raster.y_row(16).len(), 17);
    }

    #[test]
    fn test_decoder_adopts_stream_dimensions() {
        // Hint disagrees with the stream; the stream wins
        let mut decoder = Vp8Decoder::new(64, 64);
        let mut raster = RasterHandle::new(Raster::new(64, 64).unwrap());
        let data = minimal_key_frame(32, 32);

        decoder.decode_frame(&data, &mut raster).unwrap();
        assert_eq!(decoder.width(), 32);
        assert_eq!(raster.width(), 32);
    }

    #[test]
    fn test_inter_frame_before_key_frame_rejected() {
        let mut decoder = Vp8Decoder::new(16, 16);
        let mut raster = RasterHandle::new(Raster::new(16, 16).unwrap());
        let data = vec![0x01, 0x00, 0x00, 0x00];

        match decoder.decode_frame(&data, &mut raster) {
            Err(Error::InvalidStream(_)) => {}
            other => panic!("expected InvalidStream, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_start_code_rejected() {
        let mut decoder = Vp8Decoder::new(16, 16);
        let mut raster = RasterHandle::new(Raster::new(16, 16).unwrap());
        let mut data = minimal_key_frame(16, 16);
        data[4] = 0x77;

        assert!(decoder.decode_frame(&data, &mut raster).is_err());
    }

    #[test]
    fn test_truncated_first_partition_rejected() {
        let mut decoder = Vp8Decoder::new(16, 16);
        let mut raster = RasterHandle::new(Raster::new(16, 16).unwrap());
        // Key frame tag claiming a 100-byte first partition with no data
        let tag = (100u32 << 5) | 0x10;
        let mut data = vec![tag as u8, (tag >> 8) as u8, (tag >> 16) as u8];
        data.extend_from_slice(&[0x9d, 0x01, 0x2a, 16, 0, 16, 0]);

        assert!(decoder.decode_frame(&data, &mut raster).is_err());
    }

    #[test]
    fn test_key_frame_after_key_frame() {
        let mut decoder = Vp8Decoder::new(16, 16);
        let mut raster = RasterHandle::new(Raster::new(16, 16).unwrap());
        let data = minimal_key_frame(16, 16);

        decoder.decode_frame(&data, &mut raster).unwrap();
        let first = raster.clone();

        let mut second = RasterHandle::new(Raster::new(16, 16).unwrap());
        decoder.decode_frame(&data, &mut second).unwrap();
        assert_eq!(first.y(), second.y());
    }

    #[test]
    fn test_shared_raster_is_replaced() {
        let mut decoder = Vp8Decoder::new(16, 16);
        let mut raster = RasterHandle::new(Raster::new(16, 16).unwrap());
        let retained = raster.clone();
        let data = minimal_key_frame(16, 16);

        decoder.decode_frame(&data, &mut raster).unwrap();
        // The display's retained handle still sees the original zeroed
        // raster; the decoder wrote into a fresh one.
        assert!(retained.y().iter().all(|&p| p == 0));
        assert!(raster.y_row(0).iter().all(|&p| p == 128));
    }

    #[test]
    fn test_split_token_partitions() {
        // Two partitions: 3-byte size table then the data
        let mut data = vec![2, 0, 0];
        data.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
        let parts = split_token_partitions(&data, 1).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], &[0xaa, 0xbb]);
        assert_eq!(parts[1], &[0xcc, 0xdd, 0xee]);
    }

    #[test]
    fn test_split_token_partitions_truncated() {
        let data = vec![200, 0, 0, 1, 2];
        assert!(split_token_partitions(&data, 1).is_err());
    }
}
