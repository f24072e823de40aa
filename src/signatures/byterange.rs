//! ByteRange calculation for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the signature value begins
//! - `offset2` = byte offset where the signature value ends
//! - `length2` = remaining bytes to end of file
//!
//! The signature value is a hex-encoded string within `<` and `>` delimiters.
//!
//! ## Fixed-width slot
//!
//! The array is first written as a marker of [`BYTE_RANGE_SLOT_WIDTH`] bytes,
//! before the final file length is known, and later overwritten in place by
//! the real values padded with spaces. Nothing after the slot moves.

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::bytes::Regex;

/// Largest offset or length a slot can hold (ten decimal digits).
const MAX_SLOT_VALUE: u64 = 9_999_999_999;

/// Width of the ByteRange slot: `[0 ` + three ten-digit numbers + `]`.
pub const BYTE_RANGE_SLOT_WIDTH: usize = 36;

lazy_static! {
    /// Regex for finding ByteRange arrays in PDF files
    static ref RE_BYTE_RANGE: Regex =
        Regex::new(r"/ByteRange\s*(\[\s*(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s*\])").unwrap();
}

/// Calculator for PDF signature byte ranges.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeCalculator {
    /// Reserved bytes for the DER signature
    capacity: usize,
}

impl ByteRangeCalculator {
    /// Create a calculator for a `/Contents` slot of `capacity` signature bytes.
    ///
    /// The placeholder size will be `(capacity * 2) + 2` because the signature
    /// is hex-encoded and enclosed in angle brackets.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Reserved capacity in signature bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the placeholder size (for the /Contents value, brackets included).
    pub fn placeholder_size(&self) -> usize {
        self.capacity * 2 + 2
    }

    /// Generate the zero-filled `/Contents` placeholder.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.capacity * 2))
    }

    /// The ByteRange marker written before offsets are known.
    pub fn slot_marker() -> String {
        format!("[0 {:010} {:010} {:010}]", 0, 0, 0)
    }

    /// Calculate the ByteRange array given the position of the /Contents value.
    ///
    /// `contents_offset` is the offset of the opening `<`.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> Result<[usize; 4]> {
        let after_sig_start = contents_offset + self.placeholder_size();
        if after_sig_start > file_size {
            return Err(Error::DocumentFormat(format!(
                "signature placeholder ends at {} beyond file size {}",
                after_sig_start, file_size
            )));
        }
        Ok([0, contents_offset, after_sig_start, file_size - after_sig_start])
    }

    /// Format a ByteRange array padded with spaces to the slot width.
    ///
    /// The first offset must be zero.
    pub fn format_byte_range(byte_range: &[usize; 4]) -> Result<String> {
        if byte_range[0] != 0 || byte_range.iter().any(|v| *v as u64 > MAX_SLOT_VALUE) {
            return Err(Error::Unsupported(format!(
                "ByteRange {:?} does not fit a {} byte slot",
                byte_range, BYTE_RANGE_SLOT_WIDTH
            )));
        }
        let formatted =
            format!("[{} {} {} {}]", byte_range[0], byte_range[1], byte_range[2], byte_range[3]);
        Ok(format!("{:<width$}", formatted, width = BYTE_RANGE_SLOT_WIDTH))
    }

    /// Overwrite the slot at `slot_offset` with the final values.
    ///
    /// The file length never changes.
    pub fn patch_byte_range(
        pdf_data: &mut [u8],
        slot_offset: usize,
        byte_range: &[usize; 4],
    ) -> Result<()> {
        let formatted = Self::format_byte_range(byte_range)?;
        let end = slot_offset + BYTE_RANGE_SLOT_WIDTH;
        if end > pdf_data.len() || pdf_data[slot_offset] != b'[' {
            return Err(Error::DocumentFormat(format!(
                "no ByteRange slot at offset {}",
                slot_offset
            )));
        }
        pdf_data[slot_offset..end].copy_from_slice(formatted.as_bytes());
        Ok(())
    }

    /// Find the last ByteRange array in the file.
    ///
    /// Returns the offset of its `[` and the parsed values.
    pub fn find_last_byte_range(pdf_data: &[u8]) -> Option<(usize, [usize; 4])> {
        let caps = RE_BYTE_RANGE.captures_iter(pdf_data).last()?;
        let slot = caps.get(1)?;
        let mut values = [0usize; 4];
        for (i, value) in values.iter_mut().enumerate() {
            let digits = std::str::from_utf8(caps.get(i + 2)?.as_bytes()).ok()?;
            *value = digits.parse().ok()?;
        }
        Some((slot.start(), values))
    }

    /// The two signed spans of the file.
    pub fn signed_spans<'a>(pdf_data: &'a [u8], byte_range: &[usize; 4]) -> Result<[&'a [u8]; 2]> {
        let [offset1, length1, offset2, length2] = *byte_range;
        let first = offset1
            .checked_add(length1)
            .filter(|end| *end <= pdf_data.len())
            .ok_or_else(|| {
                Error::DocumentFormat(format!(
                    "ByteRange first range exceeds file size: {} + {} > {}",
                    offset1,
                    length1,
                    pdf_data.len()
                ))
            })?;
        let second = offset2
            .checked_add(length2)
            .filter(|end| *end <= pdf_data.len())
            .ok_or_else(|| {
                Error::DocumentFormat(format!(
                    "ByteRange second range exceeds file size: {} + {} > {}",
                    offset2,
                    length2,
                    pdf_data.len()
                ))
            })?;
        Ok([&pdf_data[offset1..first], &pdf_data[offset2..second]])
    }

    /// Check that a ByteRange covers the entire document except the signature.
    ///
    /// A valid ByteRange starts at offset 0, ends at the file size and leaves
    /// a gap that is exactly one `<hex>` string.
    pub fn validate_byte_range(pdf_data: &[u8], byte_range: &[usize; 4]) -> Result<()> {
        let [offset1, length1, offset2, length2] = *byte_range;

        if offset1 != 0 {
            return Err(Error::DocumentFormat(format!("ByteRange must start at 0, got {}", offset1)));
        }

        let actual_end = offset2.checked_add(length2);
        if actual_end != Some(pdf_data.len()) {
            return Err(Error::DocumentFormat(format!(
                "ByteRange must end at file size {}, got {} + {}",
                pdf_data.len(),
                offset2,
                length2
            )));
        }

        if length1 >= offset2 || offset2 - length1 < 2 {
            return Err(Error::DocumentFormat(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                length1, offset2
            )));
        }

        Self::validate_gap(pdf_data, length1, offset2)
    }

    /// The bytes in `start..end` must be one hex string in angle brackets.
    pub fn validate_gap(pdf_data: &[u8], start: usize, end: usize) -> Result<()> {
        let gap = pdf_data.get(start..end).ok_or_else(|| {
            Error::DocumentFormat(format!("ByteRange gap {}..{} outside file", start, end))
        })?;
        let well_formed = gap.len() >= 2
            && gap[0] == b'<'
            && gap[gap.len() - 1] == b'>'
            && gap[1..gap.len() - 1].iter().all(u8::is_ascii_hexdigit);
        if well_formed {
            Ok(())
        } else {
            Err(Error::DocumentFormat(
                "ByteRange gap is not a hex string placeholder".to_string(),
            ))
        }
    }

    /// Replace the placeholder at `contents_offset` with the DER signature.
    ///
    /// The signature is hex-encoded and right-padded with zeros; the file
    /// length is unchanged.
    pub fn insert_signature(&self, pdf_data: &mut [u8], contents_offset: usize, der: &[u8]) -> Result<()> {
        if der.len() > self.capacity {
            return Err(Error::ReservedSpaceExceeded {
                required: der.len(),
                reserved: self.capacity,
            });
        }

        let end = contents_offset + self.placeholder_size();
        if end > pdf_data.len() {
            return Err(Error::DocumentFormat(
                "Signature insertion would exceed file bounds".to_string(),
            ));
        }
        Self::validate_gap(pdf_data, contents_offset, end)?;

        let hex = bytes_to_hex(der);
        let slot = &mut pdf_data[contents_offset + 1..end - 1];
        slot[..hex.len()].copy_from_slice(hex.as_bytes());
        for byte in &mut slot[hex.len()..] {
            *byte = b'0';
        }
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RESERVED_CAPACITY)
    }
}

/// Convert bytes to an uppercase hex string.
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02X}", b);
        s
    })
}

/// Decode a hex string, ignoring whitespace. `None` on odd length or bad digits.
pub fn hex_to_bytes(hex: &[u8]) -> Option<Vec<u8>> {
    let digits: Vec<u8> = hex.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_size() {
        let calc = ByteRangeCalculator::new(1024);
        // 1024 bytes * 2 (hex) + 2 (brackets) = 2050
        assert_eq!(calc.placeholder_size(), 2050);
        assert_eq!(calc.generate_placeholder().len(), 2050);
        assert_eq!(ByteRangeCalculator::default().capacity(), 16384);
    }

    #[test]
    fn test_generate_placeholder() {
        let placeholder = ByteRangeCalculator::new(4).generate_placeholder();
        assert_eq!(placeholder, "<00000000>");
    }

    #[test]
    fn test_slot_marker_width() {
        assert_eq!(ByteRangeCalculator::slot_marker().len(), BYTE_RANGE_SLOT_WIDTH);
    }

    #[test]
    fn test_calculate_byte_range() {
        let calc = ByteRangeCalculator::new(49); // placeholder of 100
        let byte_range = calc.calculate_byte_range(1000, 400).unwrap();
        assert_eq!(byte_range, [0, 400, 500, 500]);
        assert!(calc.calculate_byte_range(450, 400).is_err());
    }

    #[test]
    fn test_format_byte_range() {
        let formatted = ByteRangeCalculator::format_byte_range(&[0, 100, 200, 300]).unwrap();
        assert_eq!(formatted.len(), BYTE_RANGE_SLOT_WIDTH);
        assert!(formatted.starts_with("[0 100 200 300]"));
        assert!(formatted[15..].bytes().all(|b| b == b' '));

        let max = MAX_SLOT_VALUE as usize;
        let largest = ByteRangeCalculator::format_byte_range(&[0, max, max, max]).unwrap();
        assert_eq!(largest.len(), BYTE_RANGE_SLOT_WIDTH);
        assert!(ByteRangeCalculator::format_byte_range(&[0, 0, 0, max + 1]).is_err());
        assert!(ByteRangeCalculator::format_byte_range(&[1, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_patch_and_find_byte_range() {
        let mut data = format!("<< /ByteRange {} /Contents <0000> >>", ByteRangeCalculator::slot_marker())
            .into_bytes();
        let len = data.len();
        let (slot, values) = ByteRangeCalculator::find_last_byte_range(&data).unwrap();
        assert_eq!(values, [0, 0, 0, 0]);
        assert_eq!(data[slot], b'[');

        ByteRangeCalculator::patch_byte_range(&mut data, slot, &[0, 10, 20, 30]).unwrap();
        assert_eq!(data.len(), len);
        let (_, values) = ByteRangeCalculator::find_last_byte_range(&data).unwrap();
        assert_eq!(values, [0, 10, 20, 30]);
    }

    #[test]
    fn test_find_last_of_many() {
        let data = b"/ByteRange [0 1 2 3] ... /ByteRange[0 4 5 6]";
        let (_, values) = ByteRangeCalculator::find_last_byte_range(data).unwrap();
        assert_eq!(values, [0, 4, 5, 6]);
        assert!(ByteRangeCalculator::find_last_byte_range(b"no range").is_none());
    }

    #[test]
    fn test_signed_spans() {
        let pdf_data = b"AAABBBCCC"; // 9 bytes
        let [a, b] = ByteRangeCalculator::signed_spans(pdf_data, &[0, 3, 6, 3]).unwrap();
        assert_eq!(a, b"AAA");
        assert_eq!(b, b"CCC");
        assert!(ByteRangeCalculator::signed_spans(pdf_data, &[0, 3, 6, 4]).is_err());
    }

    #[test]
    fn test_validate_byte_range() {
        let data = b"AAA<00ff>CCC";
        assert!(ByteRangeCalculator::validate_byte_range(data, &[0, 3, 9, 3]).is_ok());
        // does not start at 0
        assert!(ByteRangeCalculator::validate_byte_range(data, &[1, 2, 9, 3]).is_err());
        // does not end at file size
        assert!(ByteRangeCalculator::validate_byte_range(data, &[0, 3, 9, 2]).is_err());
        // gap is not the hex string
        assert!(ByteRangeCalculator::validate_byte_range(data, &[0, 2, 9, 3]).is_err());
    }

    #[test]
    fn test_insert_signature() {
        let calc = ByteRangeCalculator::new(4);
        let mut pdf_data = b"XX<00000000>YY".to_vec();
        calc.insert_signature(&mut pdf_data, 2, &[0xAB, 0xCD]).unwrap();
        assert_eq!(&pdf_data, b"XX<ABCD0000>YY");
    }

    #[test]
    fn test_insert_signature_too_large() {
        let calc = ByteRangeCalculator::new(4);
        let mut pdf_data = b"XX<00000000>YY".to_vec();
        let err = calc.insert_signature(&mut pdf_data, 2, &[1, 2, 3, 4, 5]).unwrap_err();
        match err {
            Error::ReservedSpaceExceeded { required, reserved } => {
                assert_eq!(required, 5);
                assert_eq!(reserved, 4);
            },
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(&pdf_data, b"XX<00000000>YY");
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(bytes_to_hex(&[0x00, 0x1F, 0xFF]), "001FFF");
        assert_eq!(hex_to_bytes(b"00 1f\nFF"), Some(vec![0x00, 0x1F, 0xFF]));
        assert_eq!(hex_to_bytes(b"abc"), None);
        assert_eq!(hex_to_bytes(b"zz"), None);
    }
}
