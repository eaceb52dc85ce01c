//! VP8 in-loop deblocking filter
//!
//! Two variants exist: the normal filter smooths macroblock and 4x4
//! subblock edges of all three planes with a wide or narrow kernel gated
//! by a high-edge-variance test, while the simple filter touches only the
//! two luma samples either side of each edge. Filter strength derives from
//! the frame (or segment) filter level plus per-macroblock reference and
//! mode adjustments.

use crate::tables::{FilterType, LumaMode, MvRefMode, RefFrame};

/// Loop filter parameters before per-macroblock adjustment
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterParameters {
    pub filter_type: FilterType,
    pub filter_level: i32,
    pub sharpness_level: u8,
}

impl FilterParameters {
    /// Apply the reference-frame and prediction-mode deltas for one
    /// macroblock. Mode deltas index 0 for B_PRED, 1 for ZEROMV, 2 for
    /// other inter modes, 3 for SPLITMV; intra non-B_PRED takes none.
    pub fn adjust(
        &mut self,
        ref_adjustments: &[i8; 4],
        mode_adjustments: &[i8; 4],
        reference: RefFrame,
        luma_mode: LumaMode,
        mv_mode: Option<MvRefMode>,
    ) {
        self.filter_level += i32::from(ref_adjustments[reference as usize]);

        let mode_delta = if reference == RefFrame::Current {
            if luma_mode == LumaMode::B {
                mode_adjustments[0]
            } else {
                0
            }
        } else {
            match mv_mode {
                Some(MvRefMode::Zero) => mode_adjustments[1],
                Some(MvRefMode::Split) => mode_adjustments[3],
                _ => mode_adjustments[2],
            }
        };
        self.filter_level += i32::from(mode_delta);
    }
}

/// Edge limits derived from a clamped filter level and sharpness
///
/// The simple filter uses only the edge limits; the normal filter also
/// tests the interior limit and the high-edge-variance threshold.
#[derive(Debug, Clone, Copy)]
pub struct FilterLimits {
    pub filter_level: u8,
    pub interior_limit: u8,
    pub mb_edge_limit: u8,
    pub sb_edge_limit: u8,
    pub hev_threshold: u8,
}

impl FilterLimits {
    pub fn new(params: &FilterParameters, key_frame: bool) -> Self {
        let filter_level = params.filter_level.clamp(0, 63) as u8;

        let mut interior_limit = filter_level;
        if params.sharpness_level > 0 {
            interior_limit >>= if params.sharpness_level > 4 { 2 } else { 1 };
            let cap = 9 - params.sharpness_level;
            if interior_limit > cap {
                interior_limit = cap;
            }
        }
        if interior_limit < 1 {
            interior_limit = 1;
        }

        let mut hev_threshold = 0;
        if filter_level >= 15 {
            hev_threshold += 1;
        }
        if filter_level >= 40 {
            hev_threshold += 1;
        }
        if filter_level >= 20 && !key_frame {
            hev_threshold += 1;
        }

        FilterLimits {
            filter_level,
            interior_limit,
            mb_edge_limit: (filter_level + 2) * 2 + interior_limit,
            sb_edge_limit: filter_level * 2 + interior_limit,
            hev_threshold,
        }
    }
}

#[inline]
fn clamp_signed(val: i16) -> i16 {
    val.clamp(-128, 127)
}

#[inline]
fn clip_u8(val: i16) -> u8 {
    val.clamp(0, 255) as u8
}

/// Common filter value with the outer-tap term included
#[inline]
fn filter_value(p1: i16, p0: i16, q0: i16, q1: i16) -> i16 {
    clamp_signed(clamp_signed(p1 - q1) + 3 * (q0 - p0))
}

/// Eight-sample mask deciding whether an edge is filtered at all
#[inline]
#[allow(clippy::too_many_arguments)]
fn filter_mask(
    interior_limit: i16,
    edge_limit: i16,
    p3: i16,
    p2: i16,
    p1: i16,
    p0: i16,
    q0: i16,
    q1: i16,
    q2: i16,
    q3: i16,
) -> bool {
    (p0 - q0).abs() * 2 + ((p1 - q1).abs() >> 1) <= edge_limit
        && (p3 - p2).abs() <= interior_limit
        && (p2 - p1).abs() <= interior_limit
        && (p1 - p0).abs() <= interior_limit
        && (q1 - q0).abs() <= interior_limit
        && (q2 - q1).abs() <= interior_limit
        && (q3 - q2).abs() <= interior_limit
}

#[inline]
fn hev_mask(threshold: i16, p1: i16, p0: i16, q0: i16, q1: i16) -> bool {
    (p1 - p0).abs() > threshold || (q1 - q0).abs() > threshold
}

/// One pixel run of the normal filter across an edge.
///
/// `step` is the distance between samples across the edge (1 for a
/// vertical edge, the stride for a horizontal one). `wide` selects the
/// macroblock-edge kernel touching three samples per side.
fn normal_filter_edge(
    plane: &mut [u8],
    center: usize,
    step: usize,
    limits: &FilterLimits,
    edge_limit: u8,
    wide: bool,
) {
    let p3 = i16::from(plane[center - step * 4]);
    let p2 = i16::from(plane[center - step * 3]);
    let p1 = i16::from(plane[center - step * 2]);
    let p0 = i16::from(plane[center - step]);
    let q0 = i16::from(plane[center]);
    let q1 = i16::from(plane[center + step]);
    let q2 = i16::from(plane[center + step * 2]);
    let q3 = i16::from(plane[center + step * 3]);

    if !filter_mask(
        i16::from(limits.interior_limit),
        i16::from(edge_limit),
        p3,
        p2,
        p1,
        p0,
        q0,
        q1,
        q2,
        q3,
    ) {
        return;
    }

    let hev = hev_mask(i16::from(limits.hev_threshold), p1, p0, q0, q1);

    if hev {
        // Narrow kernel with outer taps, adjusting only the edge pair
        let a = filter_value(p1, p0, q0, q1);
        let f_q0 = clamp_signed(a + 4) >> 3;
        let f_p0 = clamp_signed(a + 3) >> 3;
        plane[center - step] = clip_u8(p0 + f_p0);
        plane[center] = clip_u8(q0 - f_q0);
    } else if wide {
        let w = filter_value(p1, p0, q0, q1);
        let a = clamp_signed((27 * w + 63) >> 7);
        plane[center - step] = clip_u8(p0 + a);
        plane[center] = clip_u8(q0 - a);
        let a = clamp_signed((18 * w + 63) >> 7);
        plane[center - step * 2] = clip_u8(p1 + a);
        plane[center + step] = clip_u8(q1 - a);
        let a = clamp_signed((9 * w + 63) >> 7);
        plane[center - step * 3] = clip_u8(p2 + a);
        plane[center + step * 2] = clip_u8(q2 - a);
    } else {
        // Narrow kernel without outer taps, spreading half the adjustment
        // to the second pair
        let a = clamp_signed(3 * (q0 - p0));
        let f_q0 = clamp_signed(a + 4) >> 3;
        let f_p0 = clamp_signed(a + 3) >> 3;
        plane[center - step] = clip_u8(p0 + f_p0);
        plane[center] = clip_u8(q0 - f_q0);
        let half = (f_q0 + 1) >> 1;
        plane[center - step * 2] = clip_u8(p1 + half);
        plane[center + step] = clip_u8(q1 - half);
    }
}

/// One pixel run of the simple filter across an edge
fn simple_filter_edge(plane: &mut [u8], center: usize, step: usize, edge_limit: u8) {
    let p1 = i16::from(plane[center - step * 2]);
    let p0 = i16::from(plane[center - step]);
    let q0 = i16::from(plane[center]);
    let q1 = i16::from(plane[center + step]);

    if (p0 - q0).abs() * 2 + ((p1 - q1).abs() >> 1) > i16::from(edge_limit) {
        return;
    }

    let a = filter_value(p1, p0, q0, q1);
    let f_q0 = clamp_signed(a + 4) >> 3;
    let f_p0 = clamp_signed(a + 3) >> 3;
    plane[center - step] = clip_u8(p0 + f_p0);
    plane[center] = clip_u8(q0 - f_q0);
}

/// Filter a vertical edge at column `x`, rows `y..y+height`
#[allow(clippy::too_many_arguments)]
pub fn normal_filter_vertical_edge(
    plane: &mut [u8],
    stride: usize,
    x: usize,
    y: usize,
    height: usize,
    limits: &FilterLimits,
    edge_limit: u8,
    wide: bool,
) {
    for row in 0..height {
        normal_filter_edge(plane, (y + row) * stride + x, 1, limits, edge_limit, wide);
    }
}

/// Filter a horizontal edge at row `y`, columns `x..x+width`
#[allow(clippy::too_many_arguments)]
pub fn normal_filter_horizontal_edge(
    plane: &mut [u8],
    stride: usize,
    x: usize,
    y: usize,
    width: usize,
    limits: &FilterLimits,
    edge_limit: u8,
    wide: bool,
) {
    for col in 0..width {
        normal_filter_edge(plane, y * stride + x + col, stride, limits, edge_limit, wide);
    }
}

/// Simple-filter a vertical edge at column `x`, rows `y..y+height`
pub fn simple_filter_vertical_edge(
    plane: &mut [u8],
    stride: usize,
    x: usize,
    y: usize,
    height: usize,
    edge_limit: u8,
) {
    for row in 0..height {
        simple_filter_edge(plane, (y + row) * stride + x, 1, edge_limit);
    }
}

/// Simple-filter a horizontal edge at row `y`, columns `x..x+width`
pub fn simple_filter_horizontal_edge(
    plane: &mut [u8],
    stride: usize,
    x: usize,
    y: usize,
    width: usize,
    edge_limit: u8,
) {
    for col in 0..width {
        simple_filter_edge(plane, y * stride + x + col, stride, edge_limit);
    }
}

/// Plane views for one macroblock's filtering pass
pub struct MacroblockPlanes<'a> {
    pub y: &'a mut [u8],
    pub y_stride: usize,
    pub u: &'a mut [u8],
    pub v: &'a mut [u8],
    pub uv_stride: usize,
}

/// Run the normal loop filter over one macroblock.
///
/// Edge order: left macroblock edge, interior vertical edges, top
/// macroblock edge, interior horizontal edges. Interior edges are skipped
/// for non-B_PRED macroblocks with no non-zero coefficients.
pub fn normal_filter_macroblock(
    planes: &mut MacroblockPlanes<'_>,
    mb_col: usize,
    mb_row: usize,
    limits: &FilterLimits,
    skip_subblock_edges: bool,
) {
    let y_x = mb_col * 16;
    let y_y = mb_row * 16;
    let uv_x = mb_col * 8;
    let uv_y = mb_row * 8;
    let mb = limits.mb_edge_limit;
    let sb = limits.sb_edge_limit;

    if mb_col > 0 {
        normal_filter_vertical_edge(planes.y, planes.y_stride, y_x, y_y, 16, limits, mb, true);
        normal_filter_vertical_edge(planes.u, planes.uv_stride, uv_x, uv_y, 8, limits, mb, true);
        normal_filter_vertical_edge(planes.v, planes.uv_stride, uv_x, uv_y, 8, limits, mb, true);
    }

    if !skip_subblock_edges {
        for sub in (4..16).step_by(4) {
            normal_filter_vertical_edge(
                planes.y,
                planes.y_stride,
                y_x + sub,
                y_y,
                16,
                limits,
                sb,
                false,
            );
        }
        normal_filter_vertical_edge(
            planes.u,
            planes.uv_stride,
            uv_x + 4,
            uv_y,
            8,
            limits,
            sb,
            false,
        );
        normal_filter_vertical_edge(
            planes.v,
            planes.uv_stride,
            uv_x + 4,
            uv_y,
            8,
            limits,
            sb,
            false,
        );
    }

    if mb_row > 0 {
        normal_filter_horizontal_edge(planes.y, planes.y_stride, y_x, y_y, 16, limits, mb, true);
        normal_filter_horizontal_edge(planes.u, planes.uv_stride, uv_x, uv_y, 8, limits, mb, true);
        normal_filter_horizontal_edge(planes.v, planes.uv_stride, uv_x, uv_y, 8, limits, mb, true);
    }

    if !skip_subblock_edges {
        for sub in (4..16).step_by(4) {
            normal_filter_horizontal_edge(
                planes.y,
                planes.y_stride,
                y_x,
                y_y + sub,
                16,
                limits,
                sb,
                false,
            );
        }
        normal_filter_horizontal_edge(
            planes.u,
            planes.uv_stride,
            uv_x,
            uv_y + 4,
            8,
            limits,
            sb,
            false,
        );
        normal_filter_horizontal_edge(
            planes.v,
            planes.uv_stride,
            uv_x,
            uv_y + 4,
            8,
            limits,
            sb,
            false,
        );
    }
}

/// Run the simple loop filter over one macroblock (luma only)
pub fn simple_filter_macroblock(
    y_plane: &mut [u8],
    y_stride: usize,
    mb_col: usize,
    mb_row: usize,
    limits: &FilterLimits,
    skip_subblock_edges: bool,
) {
    let x = mb_col * 16;
    let y = mb_row * 16;

    if mb_col > 0 {
        simple_filter_vertical_edge(y_plane, y_stride, x, y, 16, limits.mb_edge_limit);
    }
    if !skip_subblock_edges {
        for sub in (4..16).step_by(4) {
            simple_filter_vertical_edge(y_plane, y_stride, x + sub, y, 16, limits.sb_edge_limit);
        }
    }
    if mb_row > 0 {
        simple_filter_horizontal_edge(y_plane, y_stride, x, y, 16, limits.mb_edge_limit);
    }
    if !skip_subblock_edges {
        for sub in (4..16).step_by(4) {
            simple_filter_horizontal_edge(y_plane, y_stride, x, y + sub, 16, limits.sb_edge_limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(level: i32, sharpness: u8) -> FilterParameters {
        FilterParameters {
            filter_type: FilterType::Normal,
            filter_level: level,
            sharpness_level: sharpness,
        }
    }

    #[test]
    fn test_limit_derivation() {
        let limits = FilterLimits::new(&params(10, 0), true);
        assert_eq!(limits.interior_limit, 10);
        assert_eq!(limits.mb_edge_limit, 2 * (10 + 2) + 10);
        assert_eq!(limits.sb_edge_limit, 2 * 10 + 10);
        assert_eq!(limits.hev_threshold, 0);
    }

    #[test]
    fn test_hev_threshold_inter_frame() {
        // level 20 on a non-key frame: >=15 and >=20-but-not-key both hit
        let limits = FilterLimits::new(&params(20, 0), false);
        assert_eq!(limits.hev_threshold, 2);

        let limits = FilterLimits::new(&params(20, 0), true);
        assert_eq!(limits.hev_threshold, 1);

        let limits = FilterLimits::new(&params(40, 0), true);
        assert_eq!(limits.hev_threshold, 2);
    }

    #[test]
    fn test_sharpness_caps_interior_limit() {
        let limits = FilterLimits::new(&params(63, 5), true);
        // 63 >> 2 = 15, capped at 9 - 5 = 4
        assert_eq!(limits.interior_limit, 4);

        let limits = FilterLimits::new(&params(1, 7), true);
        assert_eq!(limits.interior_limit, 1);
    }

    #[test]
    fn test_level_clamped_to_63() {
        let limits = FilterLimits::new(&params(200, 0), true);
        assert_eq!(limits.filter_level, 63);

        let limits = FilterLimits::new(&params(-5, 0), true);
        assert_eq!(limits.filter_level, 0);
    }

    #[test]
    fn test_adjust_mode_deltas() {
        let ref_adj = [2i8, 0, 0, 0];
        let mode_adj = [4i8, 0, 0, 0];

        let mut p = params(10, 0);
        p.adjust(&ref_adj, &mode_adj, RefFrame::Current, LumaMode::B, None);
        assert_eq!(p.filter_level, 16);

        let mut p = params(10, 0);
        p.adjust(&ref_adj, &mode_adj, RefFrame::Current, LumaMode::Dc, None);
        assert_eq!(p.filter_level, 12);
    }

    #[test]
    fn test_adjust_inter_mode_deltas() {
        let ref_adj = [0i8, 1, 0, 0];
        let mode_adj = [0i8, 10, 20, 30];

        let mut p = params(0, 0);
        p.adjust(
            &ref_adj,
            &mode_adj,
            RefFrame::Last,
            LumaMode::Dc,
            Some(MvRefMode::Zero),
        );
        assert_eq!(p.filter_level, 11);

        let mut p = params(0, 0);
        p.adjust(
            &ref_adj,
            &mode_adj,
            RefFrame::Last,
            LumaMode::Dc,
            Some(MvRefMode::Split),
        );
        assert_eq!(p.filter_level, 31);

        let mut p = params(0, 0);
        p.adjust(
            &ref_adj,
            &mode_adj,
            RefFrame::Last,
            LumaMode::Dc,
            Some(MvRefMode::New),
        );
        assert_eq!(p.filter_level, 21);
    }

    #[test]
    fn test_flat_edge_untouched_by_normal_filter() {
        // A perfectly flat region passes the mask but the filter value is
        // zero, so samples stay put.
        let mut plane = vec![100u8; 16 * 16];
        let limits = FilterLimits::new(&params(32, 0), true);
        normal_filter_vertical_edge(&mut plane, 16, 8, 0, 16, &limits, limits.mb_edge_limit, true);
        assert!(plane.iter().all(|&p| p == 100));
    }

    #[test]
    fn test_hard_edge_rejected_by_mask() {
        // A step bigger than the limits fails the mask and is preserved
        let mut plane = vec![0u8; 16 * 16];
        for row in plane.chunks_mut(16) {
            row[8..].fill(250);
        }
        let before = plane.clone();
        let limits = FilterLimits::new(&params(1, 0), true);
        normal_filter_vertical_edge(&mut plane, 16, 8, 0, 16, &limits, limits.mb_edge_limit, true);
        assert_eq!(plane, before);
    }

    #[test]
    fn test_gentle_edge_smoothed() {
        let mut plane = vec![100u8; 16 * 16];
        for row in plane.chunks_mut(16) {
            row[8..].fill(112);
        }
        let limits = FilterLimits::new(&params(40, 0), true);
        normal_filter_vertical_edge(&mut plane, 16, 8, 0, 16, &limits, limits.mb_edge_limit, true);
        // The step is reduced across the edge
        let p0 = plane[7];
        let q0 = plane[8];
        assert!(p0 > 100);
        assert!(q0 < 112);
    }

    #[test]
    fn test_simple_filter_narrows_step() {
        let mut plane = vec![100u8; 8 * 8];
        for row in plane.chunks_mut(8) {
            row[4..].fill(108);
        }
        simple_filter_vertical_edge(&mut plane, 8, 4, 0, 8, 40);
        assert!(plane[3] > 100);
        assert!(plane[4] < 108);
        // Outer samples untouched by the simple kernel
        assert_eq!(plane[2], 100);
        assert_eq!(plane[5], 108);
    }
}
