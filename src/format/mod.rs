//! Container format handling
//!
//! The decoder core consumes raw frame payloads; this module supplies
//! them from the IVF elementary-stream container and writes decoded
//! pictures as YUV4MPEG2.

pub mod ivf;
pub mod y4m;

pub use ivf::{IvfFrame, IvfHeader, IvfReader};
pub use y4m::Y4mWriter;
