//! Dynamic tag-length-value stream supplied per violation.
//!
//! Records are `field_type(u16), length(u16), payload[length]`, terminated by
//! a `(0, 0)` sentinel. Unknown identifiers are skipped by length, so newer
//! producers can add fields freely. The stream is bounded only by the buffer
//! handed to the reader.

use cvabi_contracts::TLV_HEADER_SIZE;
use thiserror::Error;

use crate::bytes::read_u16_ne;
use crate::resolve::decode_fixed;
use crate::{FieldId, FieldKind, FieldValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlvRecord<'a> {
    pub id: FieldId,
    pub payload: &'a [u8],
}

impl<'a> TlvRecord<'a> {
    /// Decodes the payload as `kind` when its length matches exactly;
    /// otherwise the raw payload is returned.
    pub fn value(&self, kind: Option<FieldKind>) -> FieldValue<'a> {
        match kind {
            Some(kind) if self.payload.len() == kind.size() => {
                decode_fixed(kind, self.payload).unwrap_or(FieldValue::Bytes(self.payload))
            }
            _ => FieldValue::Bytes(self.payload),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Running,
    Done,
    Truncated,
}

/// Forward-only reader. Once it stops, it never yields again.
#[derive(Clone, Debug)]
pub struct TlvReader<'a> {
    buf: &'a [u8],
    pos: usize,
    state: State,
}

impl<'a> TlvReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            state: State::Running,
        }
    }

    /// True once the reader stopped on a malformed or out-of-bounds record
    /// rather than on the sentinel.
    pub fn truncated(&self) -> bool {
        self.state == State::Truncated
    }

    /// True once the reader consumed the sentinel.
    pub fn finished(&self) -> bool {
        self.state == State::Done
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// First record for `id`. Records after a malformed one are never seen.
    pub fn find_record(buf: &'a [u8], id: FieldId) -> Option<TlvRecord<'a>> {
        TlvReader::new(buf).find(|r| r.id == id)
    }

    fn stop(&mut self, state: State) -> Option<TlvRecord<'a>> {
        self.state = state;
        None
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = TlvRecord<'a>;

    fn next(&mut self) -> Option<TlvRecord<'a>> {
        if self.state != State::Running {
            return None;
        }
        let (Some(id), Some(len)) = (
            read_u16_ne(self.buf, self.pos),
            read_u16_ne(self.buf, self.pos.saturating_add(2)),
        ) else {
            return self.stop(State::Truncated);
        };
        if id == 0 {
            // Identifier 0 is reserved: a zero length is the sentinel, any
            // other length is malformed.
            let state = if len == 0 { State::Done } else { State::Truncated };
            return self.stop(state);
        }
        let start = self.pos + TLV_HEADER_SIZE;
        let Some(payload) = start
            .checked_add(len as usize)
            .and_then(|end| self.buf.get(start..end))
        else {
            return self.stop(State::Truncated);
        };
        self.pos = start + payload.len();
        Some(TlvRecord {
            id: FieldId(id),
            payload,
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TlvError {
    #[error("field id 0 is reserved for the stream sentinel")]
    ReservedId,
    #[error("payload of {0} bytes exceeds the 65535-byte record limit")]
    PayloadTooLarge(usize),
}

/// Producer for dynamic streams.
#[derive(Debug, Clone, Default)]
pub struct TlvWriter {
    buf: Vec<u8>,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: FieldId, payload: &[u8]) -> Result<&mut Self, TlvError> {
        if id == FieldId::INVALID {
            return Err(TlvError::ReservedId);
        }
        let len = u16::try_from(payload.len())
            .map_err(|_| TlvError::PayloadTooLarge(payload.len()))?;
        self.buf.extend_from_slice(&id.0.to_ne_bytes());
        self.buf.extend_from_slice(&len.to_ne_bytes());
        self.buf.extend_from_slice(payload);
        Ok(self)
    }

    /// Appends the sentinel and returns the stream.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.extend_from_slice(&[0u8; TLV_HEADER_SIZE]);
        self.buf
    }

    /// Returns the stream without a sentinel.
    pub fn into_unterminated(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> Vec<u8> {
        let mut w = TlvWriter::new();
        w.push(FieldId::LINE, &42u32.to_ne_bytes()).unwrap();
        w.push(FieldId(0x0100), b"future").unwrap();
        w.push(FieldId::COMMENT, b"x > 0").unwrap();
        w.finish()
    }

    #[test]
    fn walks_records_and_stops_at_the_sentinel() {
        let buf = stream();
        let mut r = TlvReader::new(&buf);
        let ids: Vec<u16> = r.by_ref().map(|rec| rec.id.0).collect();
        assert_eq!(ids, vec![0x0004, 0x0100, 0x0001]);
        assert!(r.finished());
        assert!(!r.truncated());
        assert_eq!(r.position(), buf.len() - 4);
    }

    #[test]
    fn unknown_records_are_skipped_by_length() {
        let buf = stream();
        let rec = TlvReader::find_record(&buf, FieldId::COMMENT).unwrap();
        assert_eq!(rec.payload, b"x > 0");
        assert_eq!(rec.value(None), FieldValue::Bytes(b"x > 0"));
    }

    #[test]
    fn typed_payloads_decode_only_on_exact_length() {
        let buf = stream();
        let line = TlvReader::find_record(&buf, FieldId::LINE).unwrap();
        assert_eq!(line.value(Some(FieldKind::U32)), FieldValue::U32(42));
        assert_eq!(
            line.value(Some(FieldKind::U8)),
            FieldValue::Bytes(&42u32.to_ne_bytes())
        );
    }

    #[test]
    fn corrupted_length_truncates_instead_of_overreading() {
        let mut buf = stream();
        // Second record's length now runs far past the buffer.
        let second = 4 + 4;
        buf[second + 2..second + 4].copy_from_slice(&0xFFFFu16.to_ne_bytes());
        let mut r = TlvReader::new(&buf);
        assert_eq!(r.next().map(|rec| rec.id), Some(FieldId::LINE));
        assert_eq!(r.next(), None);
        assert!(r.truncated());
        assert_eq!(r.next(), None);
        assert_eq!(TlvReader::find_record(&buf, FieldId::COMMENT), None);
    }

    #[test]
    fn missing_sentinel_is_reported_as_truncation() {
        let mut w = TlvWriter::new();
        w.push(FieldId::LINE, &[1, 2, 3, 4]).unwrap();
        let buf = w.into_unterminated();
        let mut r = TlvReader::new(&buf);
        assert!(r.next().is_some());
        assert!(r.next().is_none());
        assert!(r.truncated());
    }

    #[test]
    fn reserved_id_with_payload_is_malformed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u16.to_ne_bytes());
        buf.extend_from_slice(&2u16.to_ne_bytes());
        buf.extend_from_slice(&[9, 9]);
        let mut r = TlvReader::new(&buf);
        assert!(r.next().is_none());
        assert!(r.truncated());
    }

    #[test]
    fn writer_rejects_reserved_id_and_oversized_payloads() {
        let mut w = TlvWriter::new();
        assert_eq!(w.push(FieldId::INVALID, &[]).unwrap_err(), TlvError::ReservedId);
        let big = vec![0u8; 70_000];
        assert_eq!(
            w.push(FieldId::COMMENT, &big).unwrap_err(),
            TlvError::PayloadTooLarge(70_000)
        );
    }
}
