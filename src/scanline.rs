//! Decompress, unfilter, refilter, verify, recompress.

use std::fmt;
use std::io::{Read, Write};
use std::iter::zip;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use flate2::read::ZlibDecoder;
use log::{info, warn};

use crate::error::{FormatError, PngError, Result};
use crate::filter::Filter;
use crate::header::ImageHeader;

/// Progress callback: current row, total rows, pass name.
pub type Progress = fn (cur: usize, total: usize, descr: &str);

/// Rows seen per filter kind.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct Stats {
    pub n_none: usize,
    pub n_sub: usize,
    pub n_up: usize,
    pub n_avg: usize,
    pub n_paeth: usize
}

impl Stats {
    fn count(&mut self, filter: Filter) {
        match filter {
            Filter::None => self.n_none += 1,
            Filter::Sub => self.n_sub += 1,
            Filter::Up => self.n_up += 1,
            Filter::Avg => self.n_avg += 1,
            Filter::Paeth => self.n_paeth += 1
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n:{} / s:{} / u:{} / a:{} / p:{}", self.n_none, self.n_sub, self.n_up, self.n_avg, self.n_paeth)
    }
}

fn read_all(mut deco: impl Read) -> std::result::Result<Vec<u8>, FormatError> {
    let mut unpacked: Vec<u8> = Vec::new();

    if let Err(e) = deco.read_to_end(&mut unpacked) {
        return Err(FormatError::Inflate(e.to_string()))
    }

    Ok(unpacked)
}

pub fn inflate(data: &[u8]) -> std::result::Result<Vec<u8>, FormatError> {
    read_all(ZlibDecoder::new(data))
}

/// Like [inflate], but stops reading one byte past `limit`.
pub fn inflate_at_most(data: &[u8], limit: usize) -> std::result::Result<Vec<u8>, FormatError> {
    let unpacked = read_all(ZlibDecoder::new(data).take((limit as u64).saturating_add(1)))?;

    if unpacked.len() > limit {
        return Err(FormatError::Oversized { limit })
    }

    Ok(unpacked)
}

pub fn deflate(data: &[u8], level: u32) -> std::result::Result<Vec<u8>, FormatError> {
    let mut e = ZlibEncoder::new(Vec::new(), Compression::new(level));

    if let Err(err) = e.write_all(data) {
        return Err(FormatError::Deflate(err.to_string()))
    }

    e.finish().map_err(|err| FormatError::Deflate(err.to_string()))
}

/// Row length for `len` decompressed bytes spread over `height` rows.
pub fn row_stride(len: usize, height: usize) -> std::result::Result<usize, FormatError> {
    if height == 0 {
        return Err(FormatError::ZeroHeight)
    }

    if len % height != 0 {
        return Err(FormatError::Stride { len, height })
    }

    match len / height {
        0 => Err(FormatError::EmptyRow),
        stride => Ok(stride)
    }
}

/// Undo each row's filter, top to bottom. Rows keep their tag byte.
pub fn unfilter(decompressed: &[u8], stride: usize, bpp: usize, progress: Option<Progress>)
    -> std::result::Result<(Vec<Vec<u8>>, Stats), FormatError> {

    if stride == 0 {
        return Err(FormatError::EmptyRow)
    }

    let total = decompressed.len() / stride;
    let mut rows: Vec<Vec<u8>> = Vec::with_capacity(total);
    let mut stats = Stats::default();

    for (y, slice) in decompressed.chunks(stride).enumerate() {
        if let Some(p) = progress {
            p(y, total, "unfilter");
        }

        let mut row = slice.to_vec();
        let filter = Filter::from_tag(row[0])?;

        filter.inverse(&mut row, rows.last().map(|r| &r[..]), bpp)?;
        stats.count(filter);

        rows.push(row);
    }

    Ok((rows, stats))
}

/// Re-apply each raw row's recorded filter against the raw row above it.
pub fn refilter(rows: &[Vec<u8>], bpp: usize, progress: Option<Progress>) -> std::result::Result<Vec<Vec<u8>>, FormatError> {
    zip(0 .. rows.len(), rows.iter()).map(|(y, row)| {
        if let Some(p) = progress {
            p(y, rows.len(), "refilter");
        }

        let above = if y == 0 { None } else { Some(&rows[y - 1][..]) };
        let tag = row.first().copied().ok_or(FormatError::EmptyRow)?;

        Filter::from_tag(tag)?.forward(row, above, bpp)
    }).collect()
}

/// Compare refiltered rows with the original decompressed stream.
pub fn verify(refiltered: &[Vec<u8>], decompressed: &[u8], stride: usize) -> Result<()> {
    if stride == 0 {
        return Err(FormatError::EmptyRow.into())
    }

    for (y, (row, orig)) in zip(refiltered.iter(), decompressed.chunks(stride)).enumerate() {
        if row[..] != orig[..] {
            return Err(PngError::Integrity { row: y, filter: orig[0] })
        }
    }

    let rows = decompressed.len() / stride;

    if refiltered.len() != rows {
        return Err(PngError::Integrity { row: refiltered.len().min(rows), filter: 0 })
    }

    Ok(())
}

/// Full cycle over the concatenated IDAT payload; returns the fresh zlib
/// stream. Nothing is written until the round trip has been verified.
pub fn round_trip(compressed: &[u8], header: &ImageHeader, level: u32, progress: Option<Progress>) -> Result<Vec<u8>> {
    // NOTE interlaced data is not height * stride bytes, left uncapped
    let decompressed = match header.stride().checked_mul(header.height as usize) {
        Some(limit) if !header.is_interlaced() => inflate_at_most(compressed, limit)?,
        _ => inflate(compressed)?
    };

    let stride = row_stride(decompressed.len(), header.height as usize)?;

    if header.is_interlaced() {
        warn!("interlaced image, rows treated as sequential");
    }
    else if stride != header.stride() {
        return Err(FormatError::Geometry { exp: header.stride(), got: stride }.into())
    }

    if header.bpp() == 0 {
        warn!("{} bits per pixel, filters see no left neighbour", header.pixel_bits());
    }

    let (rows, stats) = unfilter(&decompressed, stride, header.bpp(), progress)?;

    info!("{} rows x {} bytes, filters {stats}", rows.len(), stride);

    // NOTE pixel edits on `rows` would go here

    let refiltered = refilter(&rows, header.bpp(), progress)?;

    verify(&refiltered, &decompressed, stride)?;

    Ok(deflate(&refiltered.concat(), level)?)
}
