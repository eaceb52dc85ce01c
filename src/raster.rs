//! Decoded YUV 4:2:0 rasters and reference-frame slots
//!
//! Planes are stored macroblock-aligned so reconstruction and loop
//! filtering never straddle a partial edge block; the declared dimensions
//! crop the visible region on output. Rasters are shared through
//! reference-counted handles so reference slots and any display consumer
//! keep a frame alive without copies.

use std::io::Write;
use std::sync::Arc;

use crate::error::{Error, Result};

/// One decoded frame: Y, U and V sample planes
pub struct Raster {
    width: usize,
    height: usize,
    mb_cols: usize,
    mb_rows: usize,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

fn alloc_plane(len: usize) -> Result<Vec<u8>> {
    let mut plane = Vec::new();
    plane
        .try_reserve_exact(len)
        .map_err(|_| Error::resource_exhausted(format!("raster plane of {len} bytes")))?;
    plane.resize(len, 0);
    Ok(plane)
}

impl Raster {
    /// Allocate a raster for the given visible luma dimensions
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_stream("zero raster dimension"));
        }

        let width = width as usize;
        let height = height as usize;
        let mb_cols = width.div_ceil(16);
        let mb_rows = height.div_ceil(16);

        Ok(Raster {
            width,
            height,
            mb_cols,
            mb_rows,
            y: alloc_plane(mb_cols * 16 * mb_rows * 16)?,
            u: alloc_plane(mb_cols * 8 * mb_rows * 8)?,
            v: alloc_plane(mb_cols * 8 * mb_rows * 8)?,
        })
    }

    /// Visible luma width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Visible luma height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Visible chroma dimensions
    pub fn chroma_dimensions(&self) -> (usize, usize) {
        (self.width.div_ceil(2), self.height.div_ceil(2))
    }

    pub fn mb_cols(&self) -> usize {
        self.mb_cols
    }

    pub fn mb_rows(&self) -> usize {
        self.mb_rows
    }

    /// Luma plane stride (macroblock aligned)
    pub fn y_stride(&self) -> usize {
        self.mb_cols * 16
    }

    /// Chroma plane stride (macroblock aligned)
    pub fn uv_stride(&self) -> usize {
        self.mb_cols * 8
    }

    pub fn y(&self) -> &[u8] {
        &self.y
    }

    pub fn u(&self) -> &[u8] {
        &self.u
    }

    pub fn v(&self) -> &[u8] {
        &self.v
    }

    pub fn y_mut(&mut self) -> &mut [u8] {
        &mut self.y
    }

    pub fn u_mut(&mut self) -> &mut [u8] {
        &mut self.u
    }

    pub fn v_mut(&mut self) -> &mut [u8] {
        &mut self.v
    }

    /// All three planes, mutable, for the loop-filter pass
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        (&mut self.y, &mut self.u, &mut self.v)
    }

    /// One visible luma row
    pub fn y_row(&self, row: usize) -> &[u8] {
        let stride = self.y_stride();
        &self.y[row * stride..row * stride + self.width]
    }

    /// One visible U-plane row
    pub fn u_row(&self, row: usize) -> &[u8] {
        self.uv_row(&self.u, row)
    }

    /// One visible V-plane row
    pub fn v_row(&self, row: usize) -> &[u8] {
        self.uv_row(&self.v, row)
    }

    /// One visible chroma row from the given plane buffer
    fn uv_row<'a>(&self, plane: &'a [u8], row: usize) -> &'a [u8] {
        let stride = self.uv_stride();
        &plane[row * stride..row * stride + self.width.div_ceil(2)]
    }

    /// Write the visible picture as planar YUV 4:2:0, row by row
    pub fn write_yuv420<W: Write>(&self, out: &mut W) -> Result<()> {
        for row in 0..self.height {
            out.write_all(self.y_row(row))?;
        }
        let (_, chroma_height) = self.chroma_dimensions();
        for row in 0..chroma_height {
            out.write_all(self.uv_row(&self.u, row))?;
        }
        for row in 0..chroma_height {
            out.write_all(self.uv_row(&self.v, row))?;
        }
        Ok(())
    }
}

/// Reference-counted handle to a decoded raster
#[derive(Clone)]
pub struct RasterHandle {
    inner: Arc<Raster>,
}

impl RasterHandle {
    pub fn new(raster: Raster) -> Self {
        RasterHandle {
            inner: Arc::new(raster),
        }
    }

    /// Exclusive access while no other handle shares the raster
    pub fn get_mut(&mut self) -> Option<&mut Raster> {
        Arc::get_mut(&mut self.inner)
    }
}

impl std::ops::Deref for RasterHandle {
    type Target = Raster;

    fn deref(&self) -> &Raster {
        &self.inner
    }
}

/// The three named reference slots updated at each frame boundary
#[derive(Clone, Default)]
pub struct ReferenceFrames {
    pub last: Option<RasterHandle>,
    pub golden: Option<RasterHandle>,
    pub altref: Option<RasterHandle>,
}

impl ReferenceFrames {
    /// Apply the header's refresh and copy rules after a frame decodes.
    ///
    /// Copy selectors read the pre-update slots: 1 copies LAST, 2 copies
    /// the other special slot. LAST is replaced afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        current: &RasterHandle,
        refresh_golden: bool,
        copy_to_golden: u8,
        refresh_altref: bool,
        copy_to_altref: u8,
        refresh_last: bool,
    ) {
        let old_last = self.last.clone();
        let old_golden = self.golden.clone();
        let old_altref = self.altref.clone();

        if refresh_golden {
            self.golden = Some(current.clone());
        } else {
            match copy_to_golden {
                1 => self.golden = old_last.clone(),
                2 => self.golden = old_altref.clone(),
                _ => {}
            }
        }

        if refresh_altref {
            self.altref = Some(current.clone());
        } else {
            match copy_to_altref {
                1 => self.altref = old_last,
                2 => self.altref = old_golden,
                _ => {}
            }
        }

        if refresh_last {
            self.last = Some(current.clone());
        }
    }
}
