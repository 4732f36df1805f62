//! HTTP Range header parsing (single `bytes=` ranges only)

use super::StreamingError;

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the `Content-Range` header for this range.
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

/// Parses a Range header against a file of `total_size` bytes.
///
/// Returns `Ok(None)` when the header is not a single `bytes=` range, in
/// which case the whole file is served. A missing or out-of-bounds end is
/// clamped to the last byte; `bytes=-N` selects the final `N` bytes.
///
/// # Errors
/// - `StreamingError::RangeNotSatisfiable` - Start at or beyond end of file, or start after end
///
/// # Examples
/// ```
/// use undertow_core::streaming::range::{parse_range_header, ByteRange};
/// let range = parse_range_header("bytes=100-199", 1000).unwrap();
/// assert_eq!(range, Some(ByteRange { start: 100, end: 199 }));
/// ```
pub fn parse_range_header(
    value: &str,
    total_size: u64,
) -> Result<Option<ByteRange>, StreamingError> {
    let Some(range_spec) = value.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };

    if range_spec.contains(',') {
        return Ok(None);
    }

    let Some((start_str, end_str)) = range_spec.trim().split_once('-') else {
        return Ok(None);
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    let not_satisfiable = || StreamingError::RangeNotSatisfiable { total_size };

    if start_str.is_empty() {
        // Suffix form: last N bytes
        let Ok(suffix) = end_str.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || total_size == 0 {
            return Err(not_satisfiable());
        }
        return Ok(Some(ByteRange {
            start: total_size.saturating_sub(suffix),
            end: total_size - 1,
        }));
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return Ok(None);
    };
    let last_byte = total_size.checked_sub(1).ok_or_else(not_satisfiable)?;

    let end = if end_str.is_empty() {
        last_byte
    } else {
        let Ok(end) = end_str.parse::<u64>() else {
            return Ok(None);
        };
        end.min(last_byte)
    };

    if start > last_byte || start > end {
        return Err(not_satisfiable());
    }

    Ok(Some(ByteRange { start, end }))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_range_header_valid() {
        let range = parse_range_header("bytes=100-199", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end, range.len()), (100, 199, 100));
        assert_eq!(range.content_range(1000), "bytes 100-199/1000");
    }

    #[test]
    fn test_parse_range_header_open_end() {
        let range = parse_range_header("bytes=500-", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end, range.len()), (500, 999, 500));
    }

    #[test]
    fn test_parse_range_header_clamps_end() {
        let range = parse_range_header("bytes=100-5000", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end), (100, 999));
    }

    #[test]
    fn test_parse_range_header_suffix() {
        let range = parse_range_header("bytes=-100", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end), (900, 999));

        let range = parse_range_header("bytes=-5000", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end), (0, 999));
    }

    #[test]
    fn test_parse_range_header_ignored_forms() {
        assert_eq!(parse_range_header("invalid", 1000).unwrap(), None);
        assert_eq!(parse_range_header("items=0-10", 1000).unwrap(), None);
        assert_eq!(parse_range_header("bytes=0-10,20-30", 1000).unwrap(), None);
        assert_eq!(parse_range_header("bytes=abc-10", 1000).unwrap(), None);
        assert_eq!(parse_range_header("bytes=5", 1000).unwrap(), None);
    }

    #[test]
    fn test_parse_range_header_not_satisfiable() {
        assert!(matches!(
            parse_range_header("bytes=1000-", 1000),
            Err(StreamingError::RangeNotSatisfiable { total_size: 1000 })
        ));
        assert!(parse_range_header("bytes=500-100", 1000).is_err());
        assert!(parse_range_header("bytes=0-", 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_parsed_range_stays_in_bounds(
            total_size in 1u64..10_000_000,
            start in 0u64..10_000_000,
            end in 0u64..20_000_000,
        ) {
            let header = format!("bytes={start}-{end}");
            match parse_range_header(&header, total_size) {
                Ok(Some(range)) => {
                    prop_assert!(range.start <= range.end);
                    prop_assert!(range.end < total_size);
                    prop_assert_eq!(range.start, start);
                    prop_assert_eq!(range.len(), range.end - range.start + 1);
                }
                Ok(None) => prop_assert!(false, "well-formed header was ignored"),
                Err(_) => prop_assert!(start >= total_size || start > end),
            }
        }

        #[test]
        fn prop_arbitrary_headers_never_panic(header in ".*", total_size in 0u64..1_000_000) {
            let _ = parse_range_header(&header, total_size);
        }
    }
}
