//! zvp8 - A VP8 video decoder written in Rust
//!
//! zvp8 decodes VP8 bitstreams (RFC 6386) into YUV 4:2:0 rasters,
//! bit-exact with the reference decoder for key frames.
//!
//! # Architecture
//!
//! The decode pipeline is organized leaves-first:
//!
//! - `bool_decoder`: the binary arithmetic decoder every symbol flows
//!   through
//! - `tables`: fixed trees, probability tables and scan orders
//! - `frame`: uncompressed chunk and frame-header parsing, persistent
//!   decoder state, per-frame derived quantities
//! - `macroblock`: per-macroblock headers, prediction modes, motion
//!   vectors and residual tokens
//! - `entropy`, `quant`, `transform`, `prediction`, `filter`: the
//!   coefficient decoder, dequantizer, inverse transforms, intra
//!   predictors and deblocking loop filter
//! - `decoder`: the frame driver orchestrating the raster-scan passes
//! - `raster`: reference-counted YUV frame stores and reference slots
//! - `format`: IVF container reading and Y4M output
//! - `player`: file playback gluing the demuxer to the decoder
//!
//! # Example
//!
//! ```no_run
//! use zvp8_lib::Player;
//!
//! # fn main() -> zvp8_lib::Result<()> {
//! let mut player = Player::new("input.ivf")?;
//! let mut raster = player.new_raster()?;
//! while !player.eof() {
//!     let show = player.advance(&mut raster)?;
//!     if show {
//!         // hand the raster to a display or writer
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bool_decoder;
pub mod decoder;
pub mod entropy;
pub mod error;
pub mod filter;
pub mod format;
pub mod frame;
pub mod macroblock;
pub mod player;
pub mod prediction;
pub mod quant;
pub mod raster;
pub mod tables;
pub mod transform;

pub use decoder::Vp8Decoder;
pub use error::{Error, Result};
pub use player::Player;
pub use raster::{Raster, RasterHandle};

/// zvp8 version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
