//! IHDR payload and the geometry derived from it.

use crate::error::FormatError;

/// IHDR payload size.
pub const HEADER_LEN: usize = 13;

/// Image header, decoded from the IHDR payload.
///
/// Field ranges are not validated: an illegal bit depth / color type pair is
/// carried through as-is.
#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub compression_method: u8,
    pub filter_method: u8,
    pub interlace_method: u8,
}

impl ImageHeader {
/// Decode the 13-byte IHDR payload.
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        if data.len() != HEADER_LEN {
            return Err(FormatError::HeaderLength(data.len()))
        }

        let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

        Ok(Self {
            width,
            height,
            bit_depth: data[8],
            color_type: data[9],
            compression_method: data[10],
            filter_method: data[11],
            interlace_method: data[12],
        })
    }

/// Encode back to the 13-byte IHDR payload.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut res = [0_u8; HEADER_LEN];

        res[0 .. 4].copy_from_slice(&self.width.to_be_bytes());
        res[4 .. 8].copy_from_slice(&self.height.to_be_bytes());
        res[8] = self.bit_depth;
        res[9] = self.color_type;
        res[10] = self.compression_method;
        res[11] = self.filter_method;
        res[12] = self.interlace_method;

        res
    }

/// Channels per pixel; 0 for an unknown color type.
    pub fn samples_per_pixel(&self) -> usize {
        match self.color_type {
            0 => 1, // gray
            2 => 3, // RGB
            3 => 1, // palette index
            4 => 2, // gray + alpha
            6 => 4, // RGBA
            _ => 0,
        }
    }

/// Bits per pixel, 0 for an unknown color type.
    pub fn pixel_bits(&self) -> usize {
        self.samples_per_pixel() * self.bit_depth as usize
    }

/// Filter distance in bytes. Truncates to 0 below 8 bits per pixel.
    pub fn bpp(&self) -> usize {
        self.pixel_bits() / 8
    }

/// Scanline length including the leading filter tag.
    pub fn stride(&self) -> usize {
        1 + (self.width as usize * self.pixel_bits()).div_ceil(8)
    }

/// Adam7 interlace.
    pub fn is_interlaced(&self) -> bool {
        self.interlace_method == 1
    }
}
