//! Minimal Netpbm codec: PGM (P5) for [`Frame`] rasters, PFM-style PF for
//! [`ImageF64`] products (§6).
//!
//! The PGM header carries `# key=value` comment lines ahead of the
//! dimensions line, recognizing `epochTimeUs`, `v4l2_field_index`, and
//! `v4l2_field_name`. A reader must tolerate comment lines it doesn't
//! recognize (future headers may be added) and must not require any of
//! them to be present.

use std::io::{self, BufRead, BufReader, Read, Write};

use crate::{FieldOrder, Frame, ImageF64};

#[derive(Debug, thiserror::Error)]
pub enum NetpbmError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic number, expected {expected:?}, got {got:?}")]
    BadMagic { expected: &'static str, got: String },
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("unsupported maxval {0}, only 255 is supported")]
    UnsupportedMaxval(u32),
    #[error("truncated pixel data: expected {expected} bytes, got {got}")]
    TruncatedData { expected: usize, got: usize },
}

type Result<T> = std::result::Result<T, NetpbmError>;

fn field_order_index(fo: FieldOrder) -> u32 {
    match fo {
        FieldOrder::Progressive => 0,
        FieldOrder::Interlaced => 1,
        FieldOrder::InterlacedTopFirst => 2,
        FieldOrder::InterlacedBottomFirst => 3,
    }
}

/// Write a [`Frame`] as Netpbm PGM (P5) raw grayscale.
pub fn write_pgm<W: Write>(mut w: W, frame: &Frame) -> Result<()> {
    writeln!(w, "P5")?;
    writeln!(w, "# epochTimeUs={}", frame.epoch_us())?;
    writeln!(w, "# v4l2_field_index={}", field_order_index(frame.field_order()))?;
    writeln!(w, "# v4l2_field_name={}", frame.field_order().as_str())?;
    writeln!(w, "{} {}", frame.width(), frame.height())?;
    writeln!(w, "255")?;
    w.write_all(frame.samples())?;
    Ok(())
}

/// Read a [`Frame`] from Netpbm PGM (P5) raw grayscale.
pub fn read_pgm<R: Read>(r: R) -> Result<Frame> {
    let mut r = BufReader::new(r);

    let mut magic = String::new();
    read_token_line(&mut r, &mut magic)?;
    if magic.trim() != "P5" {
        return Err(NetpbmError::BadMagic {
            expected: "P5",
            got: magic.trim().to_string(),
        });
    }

    let mut epoch_us: i64 = 0;
    let mut field_order = FieldOrder::Progressive;

    // Comment / header lines, then the dimensions line.
    let dims_line = loop {
        let mut line = String::new();
        if r.read_line(&mut line)? == 0 {
            return Err(NetpbmError::MalformedHeader("unexpected end of file in header".into()));
        }
        let trimmed = line.trim();
        if let Some(kv) = trimmed.strip_prefix('#') {
            let kv = kv.trim();
            if let Some((key, value)) = kv.split_once('=') {
                match key.trim() {
                    "epochTimeUs" => {
                        epoch_us = value.trim().parse().unwrap_or(0);
                    }
                    "v4l2_field_name" => {
                        field_order = FieldOrder::from_str_lossy(value.trim());
                    }
                    _ => {} // unrecognized headers (e.g. v4l2_field_index) are cosmetic only
                }
            }
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        break trimmed.to_string();
    };

    let mut dims = dims_line.split_whitespace();
    let width: u32 = dims
        .next()
        .ok_or_else(|| NetpbmError::MalformedHeader("missing width".into()))?
        .parse()
        .map_err(|_| NetpbmError::MalformedHeader("bad width".into()))?;
    let height: u32 = dims
        .next()
        .ok_or_else(|| NetpbmError::MalformedHeader("missing height".into()))?
        .parse()
        .map_err(|_| NetpbmError::MalformedHeader("bad height".into()))?;

    let mut maxval_line = String::new();
    read_token_line(&mut r, &mut maxval_line)?;
    let maxval: u32 = maxval_line
        .trim()
        .parse()
        .map_err(|_| NetpbmError::MalformedHeader("bad maxval".into()))?;
    if maxval != 255 {
        return Err(NetpbmError::UnsupportedMaxval(maxval));
    }

    let expected = width as usize * height as usize;
    let mut samples = vec![0u8; expected];
    r.read_exact(&mut samples).map_err(|_| NetpbmError::TruncatedData {
        expected,
        got: 0, // exact count not tracked by read_exact's error
    })?;

    Ok(Frame::new(width, height, epoch_us, field_order, samples))
}

/// Read one whitespace-delimited header token, consuming its trailing
/// newline. Netpbm headers place exactly one token per "line" for our
/// purposes (magic number, maxval).
fn read_token_line<R: BufRead>(r: &mut R, out: &mut String) -> Result<()> {
    r.read_line(out)?;
    Ok(())
}

/// Write an [`ImageF64`] as a PF-style Netpbm variant carrying full `f64`
/// precision samples (little-endian) instead of the standard's 32-bit
/// floats, since the calibration products need the extra dynamic range.
/// Header: `PF8`, dimensions line, scale-factor line, then raw `f64` data.
pub fn write_pfm<W: Write>(mut w: W, image: &ImageF64, scale: f64) -> Result<()> {
    writeln!(w, "PF8")?;
    writeln!(w, "# epochTimeUs={}", image.epoch_us())?;
    writeln!(w, "{} {}", image.width(), image.height())?;
    writeln!(w, "{scale}")?;
    for s in image.samples() {
        w.write_all(&s.to_le_bytes())?;
    }
    Ok(())
}

pub fn read_pfm<R: Read>(r: R) -> Result<(ImageF64, f64)> {
    let mut r = BufReader::new(r);

    let mut magic = String::new();
    read_token_line(&mut r, &mut magic)?;
    if magic.trim() != "PF8" {
        return Err(NetpbmError::BadMagic {
            expected: "PF8",
            got: magic.trim().to_string(),
        });
    }

    let mut epoch_us: i64 = 0;
    let dims_line = loop {
        let mut line = String::new();
        if r.read_line(&mut line)? == 0 {
            return Err(NetpbmError::MalformedHeader("unexpected end of file in header".into()));
        }
        let trimmed = line.trim();
        if let Some(kv) = trimmed.strip_prefix('#') {
            if let Some((key, value)) = kv.trim().split_once('=') {
                if key.trim() == "epochTimeUs" {
                    epoch_us = value.trim().parse().unwrap_or(0);
                }
            }
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        break trimmed.to_string();
    };

    let mut dims = dims_line.split_whitespace();
    let width: u32 = dims
        .next()
        .ok_or_else(|| NetpbmError::MalformedHeader("missing width".into()))?
        .parse()
        .map_err(|_| NetpbmError::MalformedHeader("bad width".into()))?;
    let height: u32 = dims
        .next()
        .ok_or_else(|| NetpbmError::MalformedHeader("missing height".into()))?
        .parse()
        .map_err(|_| NetpbmError::MalformedHeader("bad height".into()))?;

    let mut scale_line = String::new();
    read_token_line(&mut r, &mut scale_line)?;
    let scale: f64 = scale_line
        .trim()
        .parse()
        .map_err(|_| NetpbmError::MalformedHeader("bad scale factor".into()))?;

    let n = width as usize * height as usize;
    let mut samples = Vec::with_capacity(n);
    let mut buf = [0u8; 8];
    for _ in 0..n {
        r.read_exact(&mut buf)
            .map_err(|_| NetpbmError::TruncatedData { expected: n * 8, got: 0 })?;
        samples.push(f64::from_le_bytes(buf));
    }

    Ok((ImageF64::new(width, height, epoch_us, samples), scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pgm_round_trips_width_height_epoch_field_order_and_pixels() {
        let frame = Frame::new(
            3,
            2,
            1_600_000_000_123_456,
            FieldOrder::InterlacedTopFirst,
            vec![0, 128, 255, 10, 20, 30],
        );
        let mut buf = Vec::new();
        write_pgm(&mut buf, &frame).unwrap();
        let read_back = read_pgm(&buf[..]).unwrap();

        assert_eq!(read_back.width(), frame.width());
        assert_eq!(read_back.height(), frame.height());
        assert_eq!(read_back.epoch_us(), frame.epoch_us());
        assert_eq!(read_back.field_order(), frame.field_order());
        assert_eq!(read_back.samples(), frame.samples());
    }

    #[test]
    fn pgm_reader_tolerates_unknown_comment_headers() {
        let mut buf = Vec::new();
        write!(buf, "P5\n# someFutureHeader=xyz\n2 1\n255\n").unwrap();
        buf.extend_from_slice(&[7, 9]);
        let frame = read_pgm(&buf[..]).unwrap();
        assert_eq!(frame.samples(), &[7, 9]);
    }

    #[test]
    fn pfm_round_trips_samples_and_scale() {
        let image = ImageF64::new(2, 2, 42, vec![1.5, -2.25, 0.0, 100.125]);
        let mut buf = Vec::new();
        write_pfm(&mut buf, &image, -1.0).unwrap();
        let (read_back, scale) = read_pfm(&buf[..]).unwrap();
        assert_eq!(read_back.samples(), image.samples());
        assert_eq!(scale, -1.0);
    }
}
