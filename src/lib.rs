//! PNG re-encoding pipeline.
//!
//! The stream is walked chunk by chunk, the IDAT payload is inflated, every
//! scanline is unfiltered and filtered again with its own filter, and the
//! result is checked byte for byte against the input before a new PNG is
//! assembled. Chunks other than IDAT are copied verbatim.
//!
//! # Example
//!
//! ```rust,no_run
//! use mosaicu::Reencoder;
//!
//! Reencoder::new()
//!     .set_idat_size(0x10000)
//!     .reencode("tmp/in.png", "tmp/out.png")
//!     .expect("can't re-encode in.png");
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use log::info;

pub mod chunk;
pub mod error;
pub mod filter;
pub mod header;
pub mod scanline;

pub use chunk::{ChunkEntry, ChunkTable, Walk, SIGNATURE};
pub use error::{FormatError, PngError, Result};
pub use filter::{paeth, Filter};
pub use header::ImageHeader;
pub use scanline::{Progress, Stats};

/// Default maximum IDAT payload.
pub const DEF_IDAT_SIZE: usize = 8192;

/// Default zlib level (best).
pub const DEF_LEVEL: u32 = 9;

/// Re-encoder settings.
///
/// # Notes
///
/// Each setter takes ownership and hands the updated settings back.
#[derive(Debug, Clone)]
pub struct Reencoder {
    idat_size: usize,
    level: u32,
    progress: Option<Progress>,
}

impl Default for Reencoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Reencoder {
/// Default settings: 8 KiB IDAT chunks, best compression, no progress.
    pub fn new() -> Self {
        Self {
            idat_size: DEF_IDAT_SIZE,
            level: DEF_LEVEL,
            progress: None,
        }
    }

/// Maximum payload per emitted IDAT chunk.
    pub fn set_idat_size(mut self, idat_size: usize) -> Self {
        self.idat_size = idat_size;
        self
    }

/// zlib level, 0 ..= 9.
    pub fn set_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

/// Set progress callback.
    pub fn set_progress(mut self, new_progress: Progress) -> Self {
        self.progress = Some(new_progress);
        self
    }

/// Clear progress callback.
    pub fn clear_progress(mut self) -> Self {
        self.progress = None;
        self
    }

    fn check(&self) -> Result<()> {
        chunk::check_idat_size(self.idat_size)?;

        if self.level > 9 {
            return Err(PngError::Config(format!("zlib level {} out of range", self.level)))
        }

        Ok(())
    }

/// Re-encode a PNG held in memory.
    pub fn reencode_u8(&self, buf: &[u8]) -> Result<Vec<u8>> {
        Ok(self.reencode_meta_u8(buf)?.0)
    }

/// Re-encode a PNG held in memory and hand back the input's [Meta] from the
/// same walk.
    pub fn reencode_meta_u8(&self, buf: &[u8]) -> Result<(Vec<u8>, Meta)> {
        self.check()?;

        let walked = chunk::walk(buf)?;
        let meta = Meta {
            header: ImageHeader::parse(&walked.header)?,
            chunks: walked.table.histogram(),
        };

        info!("{} x {}, depth {}, color type {}",
            meta.header.width, meta.header.height, meta.header.bit_depth, meta.header.color_type);

        let image = scanline::round_trip(&walked.idat, &meta.header, self.level, self.progress)?;
        let res = chunk::rebuild(&walked.table, SIGNATURE, &image, self.idat_size)?;

        Ok((res, meta))
    }

/// Re-encode `input` into `output`. The output file is only created once
/// the whole image has been verified.
    pub fn reencode(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
        let buf = fs::read(input)?;
        let res = self.reencode_u8(&buf)?;

        fs::write(output, res)?;

        Ok(())
    }
}

/// Re-encode with default settings. For explanations see [Reencoder].
pub fn reencode_png_u8(buf: &[u8]) -> Result<Vec<u8>> {
    Reencoder::new().reencode_u8(buf)
}

/// Re-encode a file with default settings.
pub fn reencode_png(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
    Reencoder::new().reencode(input, output)
}

/// Header and chunk histogram of a PNG.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Meta {
    pub header: ImageHeader,
    /// `(type, occurrences)` in first-seen order.
    pub chunks: Vec<(String, u32)>,
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;

        writeln!(f, "{} x {}, depth {}, color type {}, interlace {}",
            h.width, h.height, h.bit_depth, h.color_type, h.interlace_method)?;

        for (tag, count) in &self.chunks {
            writeln!(f, "{tag} x{count}")?;
        }

        Ok(())
    }
}

/// Walk the chunks without touching the image data.
pub fn read_meta_u8(buf: &[u8]) -> Result<Meta> {
    let walked = chunk::walk(buf)?;

    Ok(Meta {
        header: ImageHeader::parse(&walked.header)?,
        chunks: walked.table.histogram(),
    })
}

/// Read a file's [Meta].
pub fn read_meta(fname: impl AsRef<Path>) -> Result<Meta> {
    read_meta_u8(&fs::read(fname)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(ihdr: &[u8], idat: &[u8]) -> Vec<u8> {
        let mut res = SIGNATURE.to_vec();

        [(chunk::IHDR, ihdr), (chunk::IDAT, idat), (chunk::IEND, &[][..])].iter().for_each(|(tag, data)| {
            res.extend(chunk::png_chunk(tag, data));
        });

        res
    }

    fn gray_2x2() -> Vec<u8> {
        let ihdr = [0, 0, 0, 2, 0, 0, 0, 2, 8, 0, 0, 0, 0];
        png(&ihdr, &scanline::deflate(&[1, 5, 7, 2, 3, 3], 9).unwrap())
    }

    #[test]
    pub fn test_meta() {
        let meta = read_meta_u8(&gray_2x2()).unwrap();

        assert_eq!(meta.header.width, 2);
        assert_eq!(meta.header.bpp(), 1);
        assert_eq!(meta.chunks, vec![
            ("IHDR".to_string(), 1),
            ("IDAT".to_string(), 1),
            ("IEND".to_string(), 1),
        ]);
        assert_eq!(format!("{meta}"), "2 x 2, depth 8, color type 0, interlace 0\nIHDR x1\nIDAT x1\nIEND x1\n");
    }

    #[test]
    pub fn test_reencode_keeps_rows() {
        let out = Reencoder::new().set_idat_size(4).reencode_u8(&gray_2x2()).unwrap();
        let walked = chunk::walk(&out).unwrap();

        assert_eq!(scanline::inflate(&walked.idat).unwrap(), vec![1, 5, 7, 2, 3, 3]);
        assert!(walked.table.count(chunk::IDAT) > 1);
    }

    #[test]
    pub fn test_reencode_meta() {
        let (out, meta) = Reencoder::new().reencode_meta_u8(&gray_2x2()).unwrap();

        assert_eq!(out, reencode_png_u8(&gray_2x2()).unwrap());
        assert_eq!(meta, read_meta_u8(&gray_2x2()).unwrap());
    }

    #[test]
    pub fn test_bad_config() {
        assert!(matches!(Reencoder::new().set_idat_size(0).reencode_u8(&gray_2x2()), Err(PngError::Config(_))));
        assert!(matches!(
            Reencoder::new().set_idat_size(chunk::MAX_CHUNK_LEN as usize + 1).reencode_u8(&gray_2x2()),
            Err(PngError::Config(_))
        ));
        assert!(matches!(Reencoder::new().set_level(10).reencode_u8(&gray_2x2()), Err(PngError::Config(_))));

        // bad settings win over bad input
        assert!(matches!(Reencoder::new().set_idat_size(0).reencode_u8(b"junk"), Err(PngError::Config(_))));
    }

    #[test]
    pub fn test_bad_header_length() {
        let buf = png(&[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0], &scanline::deflate(&[0, 1], 9).unwrap());

        assert!(matches!(reencode_png_u8(&buf), Err(PngError::Format(FormatError::HeaderLength(12)))));
    }
}
