//! File playback: IVF demuxing driving the VP8 decoder
//!
//! [`Player`] owns the container reader and the decoder, prefetching one
//! compressed frame so end-of-stream is known before the next
//! [`Player::advance`] call.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::decoder::Vp8Decoder;
use crate::error::{Error, Result};
use crate::format::{IvfFrame, IvfReader};
use crate::raster::{Raster, RasterHandle};

/// Decodes a VP8 elementary stream from an IVF file, one frame per
/// `advance`
pub struct Player {
    reader: IvfReader<BufReader<File>>,
    decoder: Vp8Decoder,
    pending: Option<IvfFrame>,
}

impl Player {
    /// Open an IVF file and prepare to decode its VP8 stream
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = IvfReader::open(path)?;
        if !reader.is_vp8() {
            return Err(Error::unsupported(format!(
                "IVF stream fourcc {:?} is not VP8",
                reader.header().fourcc
            )));
        }

        let decoder = Vp8Decoder::new(reader.header().width, reader.header().height);
        let pending = reader.read_frame()?;

        Ok(Player {
            reader,
            decoder,
            pending,
        })
    }

    /// Declared luma width in pixels
    pub fn width(&self) -> u16 {
        self.decoder.width()
    }

    /// Declared luma height in pixels
    pub fn height(&self) -> u16 {
        self.decoder.height()
    }

    /// Container frame rate as a numerator/denominator pair
    pub fn frame_rate(&self) -> (u32, u32) {
        (self.reader.header().fps_num, self.reader.header().fps_den)
    }

    /// Allocate a raster suitable for the next decoded frame
    pub fn new_raster(&self) -> Result<RasterHandle> {
        Ok(RasterHandle::new(Raster::new(
            u32::from(self.decoder.width()).max(16),
            u32::from(self.decoder.height()).max(16),
        )?))
    }

    /// True once every frame has been decoded
    pub fn eof(&self) -> bool {
        self.pending.is_none()
    }

    /// Decode the next frame into the supplied raster.
    ///
    /// Returns the frame's show flag; hidden frames update decoder state
    /// and reference slots without being intended for display.
    pub fn advance(&mut self, raster: &mut RasterHandle) -> Result<bool> {
        let frame = self
            .pending
            .take()
            .ok_or(Error::EndOfStream)?;

        let show = self.decoder.decode_frame(&frame.data, raster)?;
        self.pending = self.reader.read_frame()?;
        Ok(show)
    }
}
