//! HTTP `Range` header translation.
//!
//! Turns a raw `Range` header into a validated [`ByteRange`] against the
//! object's authoritative size. Nothing is clamped: a range that does not fit
//! the object is `RangeNotSatisfiable`, and the caller answers 416 without
//! opening an upstream read.

use relaycast_common::{ByteRange, Error, Result};

/// Outcome of translating a request's `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No `Range` header: serve the whole object with a 200.
    Full,
    /// A satisfiable byte range: serve it with a 206.
    Partial(ByteRange),
}

/// Translate a `Range` header value against an object of `total` bytes.
///
/// Supported forms:
/// - `bytes=0-499`
/// - `bytes=500-` (to the end of the object)
///
/// Only the first clause of a multi-range request is honored. Suffix ranges
/// (`bytes=-500`) and malformed values are rejected.
pub fn translate(header: Option<&str>, total: u64) -> Result<RangeRequest> {
    let Some(raw) = header else {
        return Ok(RangeRequest::Full);
    };

    let unsatisfiable = || Error::range_not_satisfiable(raw, total);

    let (unit, ranges) = raw.trim().split_once('=').ok_or_else(unsatisfiable)?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(unsatisfiable());
    }

    let first = ranges.split(',').next().unwrap_or_default();
    let (start, end) = first.split_once('-').ok_or_else(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());

    // An empty start is the suffix form, which is never served.
    let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
    let end: u64 = if end.is_empty() {
        total.checked_sub(1).ok_or_else(unsatisfiable)?
    } else {
        end.parse().map_err(|_| unsatisfiable())?
    };

    ByteRange::new(start, end, total)
        .map(RangeRequest::Partial)
        .map_err(|_| unsatisfiable())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn partial(header: &str, total: u64) -> ByteRange {
        match translate(Some(header), total).unwrap() {
            RangeRequest::Partial(range) => range,
            RangeRequest::Full => panic!("expected a partial range for {header}"),
        }
    }

    #[test]
    fn missing_header_is_full() {
        assert_eq!(translate(None, 1000).unwrap(), RangeRequest::Full);
        assert_eq!(translate(None, 0).unwrap(), RangeRequest::Full);
    }

    #[test]
    fn explicit_range_echoes_bounds() {
        let range = partial("bytes=0-499", 1000);
        assert_eq!((range.start(), range.end(), range.len()), (0, 499, 500));
    }

    #[test]
    fn open_end_runs_to_last_byte() {
        let range = partial("bytes=500-", 1000);
        assert_eq!((range.start(), range.end()), (500, 999));
    }

    #[test]
    fn last_byte_only() {
        let range = partial("bytes=999-999", 1000);
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn first_clause_of_multi_range() {
        let range = partial("bytes=0-9, 20-29", 100);
        assert_eq!((range.start(), range.end()), (0, 9));
    }

    #[test]
    fn tolerates_whitespace_and_case() {
        let range = partial(" Bytes= 10 - 19 ", 100);
        assert_eq!((range.start(), range.end()), (10, 19));
    }

    #[test]
    fn end_past_total_is_rejected() {
        assert_matches!(
            translate(Some("bytes=0-1000"), 1000),
            Err(Error::RangeNotSatisfiable { total: 1000, .. })
        );
    }

    #[test]
    fn start_past_end_is_rejected() {
        assert_matches!(
            translate(Some("bytes=500-100"), 1000),
            Err(Error::RangeNotSatisfiable { .. })
        );
    }

    #[test]
    fn start_at_total_is_rejected() {
        assert!(translate(Some("bytes=1000-"), 1000).is_err());
    }

    #[test]
    fn suffix_form_is_rejected() {
        assert!(translate(Some("bytes=-200"), 1000).is_err());
    }

    #[test]
    fn any_range_on_empty_object_is_rejected() {
        assert!(translate(Some("bytes=0-"), 0).is_err());
        assert!(translate(Some("bytes=0-0"), 0).is_err());
    }

    #[test]
    fn malformed_values_are_rejected() {
        for header in ["bytes=-", "bytes=abc-def", "items=0-1", "bytes 0-1", "bytes=0", ""] {
            assert!(translate(Some(header), 1000).is_err(), "{header:?} accepted");
        }
    }

    #[test]
    fn error_carries_raw_header() {
        let err = translate(Some("bytes=5-1"), 10).unwrap_err();
        assert_matches!(err, Error::RangeNotSatisfiable { ref range, total: 10 } if range == "bytes=5-1");
    }
}
