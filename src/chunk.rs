//! PNG data is stored in chunks: a 4 byte big endian length, a 4 byte ASCII
//! type, the data itself and a CRC-32 over type and data. IEND closes the
//! stream.
//!
//! The walker keeps every chunk verbatim except IDAT, whose payloads are glued
//! into one zlib stream. The writer puts the verbatim chunks back in
//! first-seen order and cuts the fresh zlib stream into new IDAT chunks.

use std::collections::HashMap;

use crc32fast::Hasher;
use log::{debug, warn};

use crate::error::{FormatError, PngError};

/// PNG magic.
pub const SIGNATURE: &[u8; 8] = b"\x89\x50\x4e\x47\x0d\x0a\x1a\x0a";

pub const IHDR: &[u8; 4] = b"IHDR";
pub const IDAT: &[u8; 4] = b"IDAT";
pub const IEND: &[u8; 4] = b"IEND";

/// Largest chunk length allowed on the wire.
pub const MAX_CHUNK_LEN: u32 = 0x7fff_ffff;

/// Chunk type as printable text.
pub fn tag_str(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).to_string()
}

/// Check the 8-byte magic at the start of `buf`.
pub fn check_signature(buf: &[u8]) -> Result<(), FormatError> {
    match buf.get(.. SIGNATURE.len()) {
        Some(head) if head == SIGNATURE => Ok(()),
        _ => Err(FormatError::Signature)
    }
}

/// One chunk, borrowed from the input stream.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub length: u32,
    pub tag: [u8; 4],
    pub data: &'a [u8],
    /// Stored CRC. Never verified.
    pub crc: u32,
    /// `length ∥ type ∥ data ∥ crc` exactly as read.
    pub raw: &'a [u8],
}

fn take(buf: &[u8], offs: usize, len: usize) -> Result<&[u8], FormatError> {
    offs.checked_add(len)
        .and_then(|end| buf.get(offs .. end))
        .ok_or(FormatError::Truncated(buf.len()))
}

/// Read the chunk starting at `offs`.
pub fn get_chunk(buf: &[u8], offs: usize) -> Result<Chunk<'_>, FormatError> {
    let len_bytes = take(buf, offs, 4)?;
    let length = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);

    let mut tag = [0_u8; 4];
    tag.copy_from_slice(take(buf, offs + 4, 4)?);

    if length > MAX_CHUNK_LEN {
        return Err(FormatError::ChunkTooLong { tag: tag_str(&tag), length })
    }

    let data = take(buf, offs + 8, length as usize)?;
    let crc_bytes = take(buf, offs + 8 + length as usize, 4)?;
    let crc = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

    Ok(Chunk {
        length,
        tag,
        data,
        crc,
        raw: take(buf, offs, 12 + length as usize)?,
    })
}

/// Build `length ∥ type ∥ data ∥ crc`. `data` must fit [MAX_CHUNK_LEN].
pub(crate) fn png_chunk(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut res: Vec<u8> = Vec::with_capacity(12 + data.len());
    res.extend((data.len() as u32).to_be_bytes());
    res.extend(tag);
    res.extend(data);

    let mut crc = Hasher::new();
    crc.update(tag);
    crc.update(data);
    res.extend((crc.finalize()).to_be_bytes());

    res
}

/// IDAT payload size must be 1 ..= [MAX_CHUNK_LEN].
pub fn check_idat_size(idat_size: usize) -> Result<(), PngError> {
    if idat_size == 0 || idat_size > MAX_CHUNK_LEN as usize {
        return Err(PngError::Config(format!("IDAT size {idat_size} out of range")))
    }

    Ok(())
}

/// Per-type record: first raw chunk and how many times the type was seen.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ChunkEntry {
    pub raw: Vec<u8>,
    pub count: u32,
}

/// Chunk types in first-seen order.
///
/// Only the first chunk of each type is kept; repeats just bump the count.
/// IDAT entries hold no bytes, the image data lives in the walker's zlib
/// buffer instead.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ChunkTable {
    order: Vec<[u8; 4]>,
    entries: HashMap<[u8; 4], ChunkEntry>,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

/// Note one occurrence of `tag`. Returns true on first sight.
    pub fn record(&mut self, tag: [u8; 4], raw: &[u8]) -> bool {
        if let Some(entry) = self.entries.get_mut(&tag) {
            entry.count += 1;
            return false
        }

        self.order.push(tag);
        self.entries.insert(tag, ChunkEntry { raw: raw.to_vec(), count: 1 });
        true
    }

    pub fn order(&self) -> &[[u8; 4]] {
        &self.order
    }

    pub fn get(&self, tag: &[u8; 4]) -> Option<&ChunkEntry> {
        self.entries.get(tag)
    }

    pub fn count(&self, tag: &[u8; 4]) -> u32 {
        self.entries.get(tag).map(|e| e.count).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

/// `(type, occurrences)` in first-seen order.
    pub fn histogram(&self) -> Vec<(String, u32)> {
        self.order.iter().map(|tag| (tag_str(tag), self.count(tag))).collect()
    }
}

/// Output of [walk].
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Walk {
    pub table: ChunkTable,
    /// IDAT payloads, concatenated in stream order.
    pub idat: Vec<u8>,
    /// Payload of the first IHDR.
    pub header: Vec<u8>,
}

/// Walk every chunk up to and including IEND.
pub fn walk(buf: &[u8]) -> Result<Walk, FormatError> {
    check_signature(buf)?;

    let mut offs = SIGNATURE.len();
    let mut table = ChunkTable::new();
    let mut idat: Vec<u8> = Vec::new();
    let mut header: Option<Vec<u8>> = None;
    let mut ndx = 0_usize;

    loop {
        let chunk = get_chunk(buf, offs)?;

        debug!("{} / {}", tag_str(&chunk.tag), chunk.length);

        offs += chunk.raw.len();

        match &chunk.tag {
            IHDR => {
                if ndx != 0 {
                    warn!("IHDR is chunk #{ndx}, expected first");
                }

                if header.is_none() {
                    header = Some(chunk.data.to_vec());
                }
                else {
                    warn!("repeated IHDR ignored");
                }

                table.record(chunk.tag, chunk.raw);
            },
            IDAT => {
                idat.extend(chunk.data);
                table.record(chunk.tag, &[]);
            },
            _ => {
                table.record(chunk.tag, chunk.raw);
            }
        }

        ndx += 1;

        if &chunk.tag == IEND {
            break
        }
    }

    table.order().iter()
        .filter(|tag| *tag != IDAT && table.count(tag) > 1)
        .for_each(|tag| warn!("{} seen {} times, only the first is kept", tag_str(tag), table.count(tag)));

    match header {
        Some(header) => Ok(Walk { table, idat, header }),
        None => Err(FormatError::MissingHeader)
    }
}

/// Write the signature, then each chunk type once in first-seen order, with
/// IDAT replaced by `image` cut into pieces of at most `idat_size` bytes.
pub fn rebuild(table: &ChunkTable, signature: &[u8; 8], image: &[u8], idat_size: usize) -> Result<Vec<u8>, PngError> {
    check_idat_size(idat_size)?;

    let mut res: Vec<u8> = signature.to_vec();

    table.order().iter().for_each(|tag| {
        if tag == IDAT {
            image.chunks(idat_size).for_each(|segment| res.extend(png_chunk(IDAT, segment)));
        }
        else if let Some(entry) = table.get(tag) {
            res.extend(&entry.raw);
        }
    });

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tag: &[u8; 4], data: &[u8]) -> Vec<u8> {
        png_chunk(tag, data)
    }

    fn stream(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut res = SIGNATURE.to_vec();
        chunks.iter().for_each(|c| res.extend(c));
        res
    }

    fn ihdr() -> Vec<u8> {
        chunk(IHDR, &[0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0])
    }

    #[test]
    pub fn test_signature() {
        assert_eq!(check_signature(SIGNATURE), Ok(()));

        (0 .. SIGNATURE.len()).for_each(|i| {
            let mut bad = SIGNATURE.to_vec();
            bad[i] ^= 0x01;
            assert_eq!(check_signature(&bad), Err(FormatError::Signature));
        });

        let mut bad = SIGNATURE.to_vec();
        bad[0] = 0x88;
        assert_eq!(check_signature(&bad), Err(FormatError::Signature));
        assert_eq!(check_signature(&SIGNATURE[.. 7]), Err(FormatError::Signature));
    }

    #[test]
    pub fn test_png_chunk_layout() {
        let c = chunk(IEND, &[]);

        // well-known IEND CRC
        assert_eq!(c, vec![0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xae, 0x42, 0x60, 0x82]);

        // empty and short payloads keep an honest length field
        assert_eq!(png_chunk(IDAT, &[])[.. 8], [0, 0, 0, 0, b'I', b'D', b'A', b'T']);
        assert_eq!(png_chunk(IDAT, &[7, 7])[.. 4], [0, 0, 0, 2]);
        assert_eq!(get_chunk(&png_chunk(IDAT, &[7, 7]), 0).unwrap().data, &[7, 7]);
    }

    #[test]
    pub fn test_get_chunk() {
        let raw = chunk(b"tEXt", b"a\0b");
        let c = get_chunk(&raw, 0).unwrap();

        assert_eq!(c.length, 3);
        assert_eq!(&c.tag, b"tEXt");
        assert_eq!(c.data, b"a\0b");
        assert_eq!(c.raw, &raw[..]);
        assert_eq!(c.crc.to_be_bytes(), raw[11 .. 15]);
    }

    #[test]
    pub fn test_get_chunk_truncated() {
        let raw = chunk(b"tEXt", b"hello");

        assert!(matches!(get_chunk(&raw[.. raw.len() - 1], 0), Err(FormatError::Truncated(_))));
        assert!(matches!(get_chunk(&raw[.. 3], 0), Err(FormatError::Truncated(_))));
    }

    #[test]
    pub fn test_get_chunk_too_long() {
        let mut raw = vec![0x80, 0, 0, 0];
        raw.extend(b"IDAT");

        assert_eq!(
            get_chunk(&raw, 0),
            Err(FormatError::ChunkTooLong { tag: "IDAT".to_string(), length: 0x8000_0000 })
        );
    }

    #[test]
    pub fn test_crc_not_verified() {
        let mut bad = ihdr();
        let n = bad.len();
        bad[n - 1] ^= 0xff;

        let walked = walk(&stream(&[bad.clone(), chunk(IEND, &[])])).unwrap();
        assert_eq!(walked.table.get(IHDR).unwrap().raw, bad);
    }

    #[test]
    pub fn test_walk() {
        let text_a = chunk(b"tEXt", b"k\0first");
        let text_b = chunk(b"tEXt", b"k\0second");
        let buf = stream(&[
            ihdr(),
            text_a.clone(),
            chunk(IDAT, &[1, 2, 3]),
            chunk(IDAT, &[4, 5]),
            text_b,
            chunk(IEND, &[]),
        ]);

        let walked = walk(&buf).unwrap();

        assert_eq!(walked.header, vec![0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0]);
        assert_eq!(walked.idat, vec![1, 2, 3, 4, 5]);
        assert_eq!(walked.table.order(), &[*IHDR, *b"tEXt", *IDAT, *IEND]);
        assert_eq!(walked.table.count(b"tEXt"), 2);
        assert_eq!(walked.table.count(IDAT), 2);
        assert_eq!(walked.table.get(b"tEXt").unwrap().raw, text_a);
        assert!(walked.table.get(IDAT).unwrap().raw.is_empty());
        assert_eq!(walked.table.histogram(), vec![
            ("IHDR".to_string(), 1),
            ("tEXt".to_string(), 2),
            ("IDAT".to_string(), 2),
            ("IEND".to_string(), 1),
        ]);
    }

    #[test]
    pub fn test_walk_stops_at_iend() {
        let mut buf = stream(&[ihdr(), chunk(IEND, &[])]);
        buf.extend(b"trailing garbage");

        let walked = walk(&buf).unwrap();
        assert_eq!(walked.table.len(), 2);
    }

    #[test]
    pub fn test_walk_no_iend() {
        let buf = stream(&[ihdr(), chunk(IDAT, &[1])]);

        assert!(matches!(walk(&buf), Err(FormatError::Truncated(_))));
    }

    #[test]
    pub fn test_walk_no_header() {
        let buf = stream(&[chunk(IDAT, &[1]), chunk(IEND, &[])]);

        assert_eq!(walk(&buf), Err(FormatError::MissingHeader));
    }

    #[test]
    pub fn test_walk_late_header() {
        // accepted positionally
        let buf = stream(&[chunk(b"gAMA", &[0, 0, 0xb1, 0x8f]), ihdr(), chunk(IEND, &[])]);
        let walked = walk(&buf).unwrap();

        assert_eq!(walked.table.order()[1], *IHDR);
        assert_eq!(walked.header.len(), 13);
    }

    #[test]
    pub fn test_walk_repeated_header() {
        let first = chunk(IHDR, &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]);
        let second = chunk(IHDR, &[0, 0, 0, 9, 0, 0, 0, 9, 8, 6, 0, 0, 0]);
        let buf = stream(&[first.clone(), chunk(IDAT, &[1]), second, chunk(IEND, &[])]);

        let walked = walk(&buf).unwrap();

        assert_eq!(walked.header, vec![0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]);
        assert_eq!(walked.table.count(IHDR), 2);
        assert_eq!(walked.table.get(IHDR).unwrap().raw, first);
        assert_eq!(walked.table.order(), &[*IHDR, *IDAT, *IEND]);
    }

    #[test]
    pub fn test_walk_bad_signature() {
        let mut buf = stream(&[ihdr(), chunk(IEND, &[])]);
        buf[0] = 0x88;

        assert_eq!(walk(&buf), Err(FormatError::Signature));
    }

    #[test]
    pub fn test_rebuild() {
        let text = chunk(b"tEXt", b"k\0v");
        let buf = stream(&[
            ihdr(),
            text.clone(),
            chunk(IDAT, &[9]),
            text.clone(),
            chunk(IEND, &[]),
        ]);

        let walked = walk(&buf).unwrap();
        let out = rebuild(&walked.table, SIGNATURE, &[1, 2, 3, 4, 5], 2).unwrap();

        let exp = stream(&[
            ihdr(),
            text,
            chunk(IDAT, &[1, 2]),
            chunk(IDAT, &[3, 4]),
            chunk(IDAT, &[5]),
            chunk(IEND, &[]),
        ]);

        assert_eq!(out, exp);
    }

    #[test]
    pub fn test_rebuild_bad_idat_size() {
        let walked = walk(&stream(&[ihdr(), chunk(IEND, &[])])).unwrap();

        assert!(matches!(rebuild(&walked.table, SIGNATURE, &[1], 0), Err(PngError::Config(_))));
        assert!(matches!(check_idat_size(MAX_CHUNK_LEN as usize + 1), Err(PngError::Config(_))));
        assert!(check_idat_size(1).is_ok());
        assert!(check_idat_size(MAX_CHUNK_LEN as usize).is_ok());
    }
}
