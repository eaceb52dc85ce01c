//! Y4M (YUV4MPEG2) output
//!
//! Wraps the `y4m` crate's encoder so decoded rasters can be piped
//! straight into players and encoders that speak YUV4MPEG2. Only the
//! 4:2:0 colorspace the decoder produces is emitted.

use std::io::Write;

use crate::error::{Error, Result};
use crate::raster::Raster;

/// Y4M stream writer for decoded rasters
pub struct Y4mWriter<W: Write> {
    encoder: y4m::Encoder<W>,
    scratch: Vec<u8>,
}

impl<W: Write> Y4mWriter<W> {
    /// Write the stream header for the given picture geometry and frame
    /// rate
    pub fn new(writer: W, width: usize, height: usize, fps_num: u32, fps_den: u32) -> Result<Self> {
        // A zero timebase is legal in IVF headers; fall back to a sane
        // default rather than emitting a malformed Y4M header.
        let (num, den) = if fps_num == 0 || fps_den == 0 {
            (30, 1)
        } else {
            (fps_num as usize, fps_den as usize)
        };

        let encoder = y4m::encode(width, height, y4m::Ratio::new(num, den))
            .with_colorspace(y4m::Colorspace::C420)
            .write_header(writer)
            .map_err(|e| Error::format(format!("Y4M header: {e}")))?;

        Ok(Y4mWriter {
            encoder,
            scratch: Vec::new(),
        })
    }

    /// Write one decoded picture as a Y4M frame
    pub fn write_raster(&mut self, raster: &Raster) -> Result<()> {
        let (chroma_width, chroma_height) = raster.chroma_dimensions();
        let y_len = raster.width() * raster.height();
        let uv_len = chroma_width * chroma_height;

        self.scratch.clear();
        self.scratch.reserve(y_len + 2 * uv_len);
        for row in 0..raster.height() {
            self.scratch.extend_from_slice(raster.y_row(row));
        }
        for row in 0..chroma_height {
            self.scratch.extend_from_slice(raster.u_row(row));
        }
        for row in 0..chroma_height {
            self.scratch.extend_from_slice(raster.v_row(row));
        }

        let frame = y4m::Frame::new(
            [
                &self.scratch[..y_len],
                &self.scratch[y_len..y_len + uv_len],
                &self.scratch[y_len + uv_len..],
            ],
            None,
        );
        self.encoder
            .write_frame(&frame)
            .map_err(|e| Error::format(format!("Y4M frame: {e}")))
    }
}
