//! Motion photo layout: locating and reading the embedded video segment

use crate::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Box types that may open an MP4/QuickTime stream
const LEADING_BOX_TYPES: [&[u8; 4]; 6] = [b"ftyp", b"wide", b"free", b"skip", b"moov", b"mdat"];

/// ISO-BMFF / QuickTime box header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Box size in bytes, including the header (0 = extends to end of file)
    pub size: u64,
    /// Four-character box type
    pub kind: [u8; 4],
}

impl BoxHeader {
    /// Reads a box header from a reader
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let size = reader.read_u32::<BigEndian>()?;
        let mut kind = [0u8; 4];
        reader.read_exact(&mut kind)?;

        // size == 1 means a 64-bit size follows the type
        let size = if size == 1 {
            reader.read_u64::<BigEndian>()?
        } else {
            u64::from(size)
        };

        Ok(Self { size, kind })
    }

    /// Box type as text
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }

    /// Returns true if this box type can start a video stream
    pub fn is_leading_box(&self) -> bool {
        LEADING_BOX_TYPES.iter().any(|k| **k == self.kind)
    }
}

/// Position of the video segment inside a motion photo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedSegment {
    /// Total file size in bytes
    pub file_len: u64,
    /// Bytes from end of file back to the start of the video
    pub video_offset: u64,
}

impl EmbeddedSegment {
    /// Locates the segment from the file size and the stored offset
    pub fn locate(file_len: u64, video_offset: u64) -> Result<Self> {
        if video_offset == 0 {
            return Err(Error::InvalidSegment("video offset is zero".to_string()));
        }
        if video_offset > file_len {
            return Err(Error::InvalidSegment(format!(
                "video offset {} exceeds file size {}",
                video_offset, file_len
            )));
        }
        Ok(Self {
            file_len,
            video_offset,
        })
    }

    /// Size of the still image prefix
    pub fn still_len(&self) -> u64 {
        self.file_len - self.video_offset
    }

    /// Absolute position of the first video byte
    pub fn video_start(&self) -> u64 {
        self.still_len()
    }

    /// Reads the box header at the start of the video segment
    pub fn read_leading_box<R: Read + Seek>(&self, reader: &mut R) -> Result<BoxHeader> {
        reader.seek(SeekFrom::Start(self.video_start()))?;
        BoxHeader::read(reader)
    }

    /// Copies the video segment into `writer`, returning the bytes copied
    pub fn extract_video<R: Read + Seek, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<u64> {
        reader.seek(SeekFrom::Start(self.video_start()))?;
        let copied = io::copy(&mut reader.take(self.video_offset), writer)?;
        if copied != self.video_offset {
            return Err(Error::InvalidSegment(format!(
                "expected {} video bytes, found {}",
                self.video_offset, copied
            )));
        }
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn motion_photo(still: &[u8], box_kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut buffer = still.to_vec();
        buffer
            .write_u32::<BigEndian>(8 + payload.len() as u32)
            .unwrap();
        buffer.extend_from_slice(box_kind);
        buffer.extend_from_slice(payload);
        buffer
    }

    #[test]
    fn test_leading_box_at_offset() {
        let data = motion_photo(&[0xFF, 0xD8, 0xFF, 0xD9], b"ftyp", b"qt  ");
        let segment = EmbeddedSegment::locate(data.len() as u64, 12).unwrap();
        assert_eq!(segment.still_len(), 4);

        let header = segment.read_leading_box(&mut Cursor::new(&data)).unwrap();
        assert_eq!(header.kind_str(), "ftyp");
        assert_eq!(header.size, 12);
        assert!(header.is_leading_box());
    }

    #[test]
    fn test_wrong_offset_lands_in_garbage() {
        let data = motion_photo(&[0xFF, 0xD8, 0xFF, 0xD9], b"ftyp", b"qt  ");
        let segment = EmbeddedSegment::locate(data.len() as u64, 15).unwrap();
        let header = segment.read_leading_box(&mut Cursor::new(&data)).unwrap();
        assert!(!header.is_leading_box());
    }

    #[test]
    fn test_large_size_box() {
        let mut data = Vec::new();
        data.write_u32::<BigEndian>(1).unwrap();
        data.extend_from_slice(b"mdat");
        data.write_u64::<BigEndian>(1 << 33).unwrap();

        let header = BoxHeader::read(&mut Cursor::new(data)).unwrap();
        assert_eq!(header.size, 1 << 33);
        assert_eq!(&header.kind, b"mdat");
    }

    #[test]
    fn test_extract_video() {
        let data = motion_photo(b"STILL", b"wide", b"");
        let segment = EmbeddedSegment::locate(data.len() as u64, 8).unwrap();

        let mut video = Vec::new();
        let copied = segment
            .extract_video(&mut Cursor::new(&data), &mut video)
            .unwrap();
        assert_eq!(copied, 8);
        assert_eq!(&video[4..], b"wide");
    }

    #[test]
    fn test_locate_rejects_bad_offsets() {
        assert!(EmbeddedSegment::locate(10, 0).is_err());
        assert!(EmbeddedSegment::locate(10, 11).is_err());
        assert!(EmbeddedSegment::locate(10, 10).is_ok());
    }
}
