//! Scanline filters, PNG filter method 0.
//!
//! Every row starts with its filter tag; the remaining bytes are samples. The
//! inverse transforms rebuild a row in place, the forward ones produce a new
//! filtered row from a raw one. Predictors always read raw neighbours.

use crate::error::FormatError;

/// Filter mode.
#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub enum Filter {
/// No filter.
    None,
/// Pixel on left filter.
    Sub,
/// Pixel above filter.
    Up,
/// Average of pixel above and pixel on left.
    Avg,
/// Paeth filter.
    Paeth
}

fn sub(a: u8, b: u8) -> u8 {
    (a as i16 - b as i16) as u8
}

fn add(a: u8, b: u8) -> u8 {
    (a as i16 + b as i16) as u8
}

/// Paeth predictor. Ties go to `a`, then `b`.
pub fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();

    if pa <= pb && pa <= pc {
        a
    }
    else if pb <= pc {
        b
    }
    else {
        c
    }
}

// NOTE bpp 0 (packed pixels) never has a left neighbour
fn left_of(row: &[u8], x: usize, bpp: usize) -> u8 {
    if bpp > 0 && x > bpp { row[x - bpp] } else { 0 }
}

fn above(previous: Option<&[u8]>, x: usize) -> u8 {
    previous.and_then(|p| p.get(x).copied()).unwrap_or(0)
}

fn corner_of(previous: Option<&[u8]>, x: usize, bpp: usize) -> u8 {
    if bpp > 0 && x > bpp { above(previous, x - bpp) } else { 0 }
}

impl Filter {
/// Filter kind for a row tag.
    pub fn from_tag(tag: u8) -> Result<Self, FormatError> {
        match tag {
            0 => Ok(Filter::None),
            1 => Ok(Filter::Sub),
            2 => Ok(Filter::Up),
            3 => Ok(Filter::Avg),
            4 => Ok(Filter::Paeth),
            t => Err(FormatError::UnknownFilter(t))
        }
    }

/// Row tag for the filter kind.
    pub fn tag(self) -> u8 {
        match self {
            Filter::None => 0,
            Filter::Sub => 1,
            Filter::Up => 2,
            Filter::Avg => 3,
            Filter::Paeth => 4
        }
    }

/// Name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Filter::None => "None",
            Filter::Sub => "Sub",
            Filter::Up => "Up",
            Filter::Avg => "Avg",
            Filter::Paeth => "Paeth"
        }
    }

    fn predict(self, left: u8, up: u8, corner: u8) -> u8 {
        match self {
            Filter::None => 0,
            Filter::Sub => left,
            Filter::Up => up,
            Filter::Avg => ((left as u16 + up as u16) >> 1) as u8,
            Filter::Paeth => paeth(left, up, corner)
        }
    }

    fn check_tag(self, row: &[u8]) -> Result<(), FormatError> {
        match row.first() {
            Some(t) if *t == self.tag() => Ok(()),
            Some(t) => Err(FormatError::FilterMismatch { name: self.name(), got: *t }),
            None => Err(FormatError::EmptyRow)
        }
    }

/// Filter a raw row. `raw[0]` must already carry this filter's tag.
    pub fn forward(self, raw: &[u8], previous: Option<&[u8]>, bpp: usize) -> Result<Vec<u8>, FormatError> {
        self.check_tag(raw)?;

        let mut res: Vec<u8> = Vec::with_capacity(raw.len());
        res.push(self.tag());

        res.extend((1 .. raw.len()).map(|x| {
            let pred = self.predict(left_of(raw, x, bpp), above(previous, x), corner_of(previous, x, bpp));
            sub(raw[x], pred)
        }));

        Ok(res)
    }

/// Reconstruct a filtered row in place. `previous` is the reconstructed row above.
    pub fn inverse(self, row: &mut [u8], previous: Option<&[u8]>, bpp: usize) -> Result<(), FormatError> {
        self.check_tag(row)?;

        if self == Filter::None {
            return Ok(())
        }

        (1 .. row.len()).for_each(|x| {
            let pred = self.predict(left_of(row, x, bpp), above(previous, x), corner_of(previous, x, bpp));
            row[x] = add(row[x], pred);
        });

        Ok(())
    }
}
