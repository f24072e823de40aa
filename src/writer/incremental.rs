//! Append-only incremental updates.
//!
//! An incremental update copies the original file unchanged and appends new
//! or replacement objects, a classic cross-reference section covering only
//! those objects, and a trailer whose `/Prev` points at the previous
//! cross-reference section (ISO 32000-1:2008, 7.5.6). Every byte of the
//! original file, including earlier signatures, keeps its offset.

use super::object_serializer::ObjectSerializer;
use crate::error::{Error, Result};
use lopdf::{Dictionary, Object, ObjectId};
use std::io::Write;

/// Trailer keys carried over from the previous revision.
const INHERITED_TRAILER_KEYS: &[&[u8]] = &[b"Root", b"Info", b"ID"];

/// Writer for one incremental revision.
#[derive(Debug)]
pub struct IncrementalWriter {
    buf: Vec<u8>,
    original_len: usize,
    prev_xref: u64,
    entries: Vec<(u32, u16, usize)>,
    serializer: ObjectSerializer,
}

impl IncrementalWriter {
    /// Start a revision on top of `original`.
    ///
    /// Fails with [`Error::DocumentFormat`] when the file has no `startxref`.
    pub fn new(original: &[u8]) -> Result<Self> {
        let prev_xref = find_prev_xref_offset(original)?;
        let mut buf = Vec::with_capacity(original.len() + 64 * 1024);
        buf.extend_from_slice(original);
        if !matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.push(b'\n');
        }
        Ok(Self {
            buf,
            original_len: original.len(),
            prev_xref,
            entries: Vec::new(),
            serializer: ObjectSerializer::compact(),
        })
    }

    /// Append an indirect object and return its offset.
    pub fn add_object(&mut self, id: ObjectId, obj: &Object) -> Result<usize> {
        let offset = self.buf.len();
        let bytes = self.serializer.serialize_indirect(id.0, id.1, obj)?;
        self.buf.extend_from_slice(&bytes);
        self.entries.push((id.0, id.1, offset));
        Ok(offset)
    }

    /// Append an indirect object whose body is already serialized.
    ///
    /// Returns the absolute offset of the first body byte, so callers can
    /// locate spans inside the body they wrote.
    pub fn add_raw_object(&mut self, id: ObjectId, body: &[u8]) -> Result<usize> {
        let offset = self.buf.len();
        writeln!(self.buf, "{} {} obj", id.0, id.1)?;
        let body_offset = self.buf.len();
        self.buf.extend_from_slice(body);
        write!(self.buf, "\nendobj\n")?;
        self.entries.push((id.0, id.1, offset));
        Ok(body_offset)
    }

    /// Write the cross-reference section and trailer and return the file.
    ///
    /// `previous_trailer` supplies `/Root`, `/Info` and `/ID`; `/Size` covers
    /// both the previous revision and every object added here.
    pub fn finish(mut self, previous_trailer: &Dictionary) -> Result<Vec<u8>> {
        if self.entries.is_empty() {
            return Err(Error::DocumentFormat(
                "incremental update contains no objects".to_string(),
            ));
        }
        // Latest definition of an object number wins.
        self.entries.reverse();
        self.entries.sort_by_key(|(id, _, _)| *id);
        self.entries.dedup_by_key(|(id, _, _)| *id);

        let xref_offset = self.buf.len();
        write!(self.buf, "xref\n")?;
        for run in contiguous_runs(&self.entries) {
            write!(self.buf, "{} {}\n", run[0].0, run.len())?;
            for (_, gen, offset) in run {
                write!(self.buf, "{:010} {:05} n\r\n", offset, gen)?;
            }
        }

        let max_new_id = self.entries.iter().map(|(id, _, _)| *id).max().unwrap_or(0);
        let previous_size = previous_trailer
            .get(b"Size")
            .and_then(Object::as_i64)
            .unwrap_or(0)
            .max(0) as u32;
        let size = previous_size.max(max_new_id + 1);

        let mut trailer = Dictionary::new();
        trailer.set("Size", Object::Integer(i64::from(size)));
        trailer.set("Prev", Object::Integer(self.prev_xref as i64));
        for key in INHERITED_TRAILER_KEYS {
            if let Ok(value) = previous_trailer.get(key) {
                trailer.set(key.to_vec(), value.clone());
            }
        }

        write!(self.buf, "trailer\n")?;
        let trailer_bytes = self.serializer.serialize(&Object::Dictionary(trailer))?;
        self.buf.extend_from_slice(&trailer_bytes);
        write!(self.buf, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;

        log::debug!(
            "Incremental update: {} objects, {} bytes appended, xref at {}",
            self.entries.len(),
            self.buf.len() - self.original_len,
            xref_offset
        );
        Ok(self.buf)
    }
}

/// Split sorted xref entries into runs of consecutive object numbers.
fn contiguous_runs(entries: &[(u32, u16, usize)]) -> Vec<&[(u32, u16, usize)]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=entries.len() {
        if i == entries.len() || entries[i].0 != entries[i - 1].0 + 1 {
            runs.push(&entries[start..i]);
            start = i;
        }
    }
    runs
}

/// Find the offset of the previous xref section from the last `startxref`.
pub fn find_prev_xref_offset(bytes: &[u8]) -> Result<u64> {
    let search = b"startxref";
    let mut pos = bytes.len().saturating_sub(search.len());

    loop {
        if bytes[pos..].starts_with(search) {
            let remaining = &bytes[pos + search.len()..];
            let offset_str: String = remaining
                .iter()
                .skip_while(|&&b| b == b' ' || b == b'\n' || b == b'\r')
                .take_while(|&&b| b.is_ascii_digit())
                .map(|&b| b as char)
                .collect();

            if let Ok(offset) = offset_str.parse::<u64>() {
                return Ok(offset);
            }
        }
        if pos == 0 {
            break;
        }
        pos -= 1;
    }

    Err(Error::DocumentFormat("Could not find startxref in original PDF".to_string()))
}
