//! IVF demuxing (simple, video-only)
//!
//! IVF is a minimal container commonly used for VPx/AV1 elementary
//! streams: a 32-byte file header followed by frames, each with a
//! 12-byte header carrying the payload size and a timestamp.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// IVF file signature
const SIGNATURE: [u8; 4] = *b"DKIF";

/// Parsed IVF file header
#[derive(Debug, Clone, Copy)]
pub struct IvfHeader {
    pub fourcc: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub fps_num: u32,
    pub fps_den: u32,
    pub frame_count: u32,
}

/// One demuxed frame: an opaque payload and its timestamp
#[derive(Debug, Clone)]
pub struct IvfFrame {
    pub data: Vec<u8>,
    pub timestamp: u64,
}

/// IVF reader over any byte source
pub struct IvfReader<R: Read> {
    reader: R,
    header: IvfHeader,
    frames_read: u32,
}

impl IvfReader<BufReader<File>> {
    /// Open an IVF file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> IvfReader<R> {
    /// Parse the file header from a byte source
    pub fn new(mut reader: R) -> Result<Self> {
        let mut signature = [0u8; 4];
        reader.read_exact(&mut signature)?;
        if signature != SIGNATURE {
            return Err(Error::format("not an IVF file (bad DKIF signature)"));
        }

        let version = reader.read_u16::<LittleEndian>()?;
        if version != 0 {
            return Err(Error::format(format!("unsupported IVF version {version}")));
        }
        let header_size = reader.read_u16::<LittleEndian>()?;

        let mut fourcc = [0u8; 4];
        reader.read_exact(&mut fourcc)?;

        let header = IvfHeader {
            fourcc,
            width: reader.read_u16::<LittleEndian>()?,
            height: reader.read_u16::<LittleEndian>()?,
            fps_num: reader.read_u32::<LittleEndian>()?,
            fps_den: reader.read_u32::<LittleEndian>()?,
            frame_count: reader.read_u32::<LittleEndian>()?,
        };
        // Reserved field, plus any extension the header size declares
        let mut remaining = vec![0u8; usize::from(header_size.max(32)) - 28];
        reader.read_exact(&mut remaining)?;

        Ok(IvfReader {
            reader,
            header,
            frames_read: 0,
        })
    }

    pub fn header(&self) -> &IvfHeader {
        &self.header
    }

    /// Whether the stream carries VP8
    pub fn is_vp8(&self) -> bool {
        &self.header.fourcc == b"VP80"
    }

    /// Read the next frame; `None` at a clean end of stream
    pub fn read_frame(&mut self) -> Result<Option<IvfFrame>> {
        let size = match self.reader.read_u32::<LittleEndian>() {
            Ok(size) => size as usize,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let timestamp = self.reader.read_u64::<LittleEndian>()?;

        let mut data = vec![0u8; size];
        self.reader
            .read_exact(&mut data)
            .map_err(|_| Error::format(format!("frame payload truncated at {size} bytes")))?;

        self.frames_read += 1;
        Ok(Some(IvfFrame { data, timestamp }))
    }

    /// Frames consumed so far
    pub fn frames_read(&self) -> u32 {
        self.frames_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ivf_bytes(fourcc: &[u8; 4], frames: &[&[u8]]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"DKIF");
        data.extend_from_slice(&0u16.to_le_bytes()); // version
        data.extend_from_slice(&32u16.to_le_bytes()); // header size
        data.extend_from_slice(fourcc);
        data.extend_from_slice(&320u16.to_le_bytes());
        data.extend_from_slice(&240u16.to_le_bytes());
        data.extend_from_slice(&30u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&(frames.len() as u32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // reserved

        for (i, frame) in frames.iter().enumerate() {
            data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            data.extend_from_slice(&(i as u64).to_le_bytes());
            data.extend_from_slice(frame);
        }
        data
    }

    #[test]
    fn test_header_parse() {
        let data = ivf_bytes(b"VP80", &[]);
        let reader = IvfReader::new(Cursor::new(data)).unwrap();
        assert!(reader.is_vp8());
        assert_eq!(reader.header().width, 320);
        assert_eq!(reader.header().height, 240);
        assert_eq!(reader.header().fps_num, 30);
        assert_eq!(reader.header().frame_count, 0);
    }

    #[test]
    fn test_bad_signature() {
        let mut data = ivf_bytes(b"VP80", &[]);
        data[0] = b'X';
        assert!(IvfReader::new(Cursor::new(data)).is_err());
    }

    #[test]
    fn test_frame_iteration() {
        let data = ivf_bytes(b"VP80", &[&[1, 2, 3], &[4, 5]]);
        let mut reader = IvfReader::new(Cursor::new(data)).unwrap();

        let first = reader.read_frame().unwrap().unwrap();
        assert_eq!(first.data, vec![1, 2, 3]);
        assert_eq!(first.timestamp, 0);

        let second = reader.read_frame().unwrap().unwrap();
        assert_eq!(second.data, vec![4, 5]);
        assert_eq!(second.timestamp, 1);

        assert!(reader.read_frame().unwrap().is_none());
        assert_eq!(reader.frames_read(), 2);
    }

    #[test]
    fn test_truncated_payload() {
        let mut data = ivf_bytes(b"VP80", &[&[1, 2, 3]]);
        data.truncate(data.len() - 1);
        let mut reader = IvfReader::new(Cursor::new(data)).unwrap();
        assert!(reader.read_frame().is_err());
    }
}
