//! Range and time-seek request parsing.
//!
//! HTTP `Range` headers and DLNA `TimeSeekRange.dlna.org` headers share the
//! `unit=start-end[,start-end...]` grammar, so one parser serves both. The
//! unit token is preserved on the parsed request so callers can branch on
//! byte versus time semantics.

/// A parsed range header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// Unit token before the `=` separator (`bytes`, `npt`, ...)
    pub unit: String,
    /// Parsed sub-ranges, at least one
    pub ranges: Vec<RangeSpec>,
}

/// A single sub-range with optional open ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// Errors from parsing or resolving range headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Malformed range header")]
    MalformedRange,

    #[error("Unsatisfiable range")]
    UnsatisfiableRange,
}

/// Parses a range header value into its unit and sub-ranges.
///
/// Sub-ranges where neither end yields a number are skipped, matching the
/// lenient grammar playback clients actually send.
///
/// # Errors
/// - `RangeError::MalformedRange` - No `=` separator
/// - `RangeError::UnsatisfiableRange` - No sub-range survived parsing
pub fn parse_range(header: &str) -> Result<RangeRequest, RangeError> {
    let (unit, spec) = header.split_once('=').ok_or(RangeError::MalformedRange)?;

    let mut ranges = Vec::new();
    for part in spec.split(',') {
        let (start_str, end_str) = part.split_once('-').unwrap_or((part, ""));
        let start = parse_leading_number(start_str);
        let end = parse_leading_number(end_str);

        if start.is_none() && end.is_none() {
            continue;
        }

        ranges.push(RangeSpec { start, end });
    }

    if ranges.is_empty() {
        return Err(RangeError::UnsatisfiableRange);
    }

    Ok(RangeRequest {
        unit: unit.trim().to_string(),
        ranges,
    })
}

/// Parses the leading decimal digits of a token, ignoring any trailing
/// fraction or garbage (`"30.5x"` parses as 30).
fn parse_leading_number(token: &str) -> Option<u64> {
    let trimmed = token.trim();
    let digits: &str = {
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    };
    digits.parse().ok()
}

impl RangeSpec {
    /// Resolves this sub-range against a total length into absolute
    /// inclusive `(start, end)` bounds.
    ///
    /// Suffix ranges (`-N`) resolve from the end of the resource; an open
    /// end clamps to the last byte.
    ///
    /// # Errors
    /// - `RangeError::UnsatisfiableRange` - Start beyond the resource, both
    ///   ends open, inverted bounds, or empty resource
    pub fn resolve(&self, total_len: u64) -> Result<(u64, u64), RangeError> {
        if total_len == 0 {
            return Err(RangeError::UnsatisfiableRange);
        }

        match (self.start, self.end) {
            (None, None) => Err(RangeError::UnsatisfiableRange),
            (Some(start), _) if start >= total_len => Err(RangeError::UnsatisfiableRange),
            (Some(start), None) => Ok((start, total_len - 1)),
            (Some(start), Some(end)) => {
                let end = end.min(total_len - 1);
                if end < start {
                    Err(RangeError::UnsatisfiableRange)
                } else {
                    Ok((start, end))
                }
            }
            (None, Some(suffix)) => {
                if suffix == 0 {
                    return Err(RangeError::UnsatisfiableRange);
                }
                Ok((total_len.saturating_sub(suffix), total_len - 1))
            }
        }
    }
}

/// Formats a duration in seconds as `H:MM:SS.mmm` for DLNA time-seek
/// response headers.
///
/// Negative input clamps to zero; the hour component saturates at 99999
/// per the DLNA presentation rules.
pub fn format_dlna_duration(duration: f64) -> String {
    let (mut hours, minutes, seconds) = if duration < 0.0 {
        (0u64, 0u64, 0.0f64)
    } else {
        let hours = (duration / 3600.0).floor() as u64;
        let minutes = ((duration / 60.0).floor() as u64) % 60;
        let seconds = duration % 60.0;
        (hours, minutes, seconds)
    };

    if hours > 99_999 {
        hours = 99_999;
    }

    format!("{hours}:{minutes:02}:{seconds:06.3}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_byte_range() {
        let request = parse_range("bytes=100-199").unwrap();
        assert_eq!(request.unit, "bytes");
        assert_eq!(
            request.ranges,
            vec![RangeSpec {
                start: Some(100),
                end: Some(199)
            }]
        );
    }

    #[test]
    fn test_parse_open_ended_and_suffix_ranges() {
        let request = parse_range("bytes=500-").unwrap();
        assert_eq!(
            request.ranges,
            vec![RangeSpec {
                start: Some(500),
                end: None
            }]
        );

        let request = parse_range("bytes=-500").unwrap();
        assert_eq!(
            request.ranges,
            vec![RangeSpec {
                start: None,
                end: Some(500)
            }]
        );
    }

    #[test]
    fn test_parse_preserves_time_seek_unit() {
        let request = parse_range("npt=30-").unwrap();
        assert_eq!(request.unit, "npt");
        assert_eq!(request.ranges[0].start, Some(30));
    }

    #[test]
    fn test_parse_multi_range() {
        let request = parse_range("bytes=0-10,20-30").unwrap();
        assert_eq!(request.ranges.len(), 2);
    }

    #[test]
    fn test_parse_missing_separator_is_malformed() {
        assert_eq!(parse_range("bytes 0-10"), Err(RangeError::MalformedRange));
    }

    #[test]
    fn test_parse_no_usable_subrange_is_unsatisfiable() {
        assert_eq!(
            parse_range("bytes=foo-bar"),
            Err(RangeError::UnsatisfiableRange)
        );
        assert_eq!(parse_range("bytes="), Err(RangeError::UnsatisfiableRange));
    }

    #[test]
    fn test_parse_skips_garbage_subranges() {
        let request = parse_range("bytes=foo-bar,100-").unwrap();
        assert_eq!(request.ranges.len(), 1);
        assert_eq!(request.ranges[0].start, Some(100));
    }

    #[test]
    fn test_resolve_basic_bounds() {
        let spec = RangeSpec {
            start: Some(100),
            end: Some(199),
        };
        assert_eq!(spec.resolve(1000), Ok((100, 199)));
    }

    #[test]
    fn test_resolve_clamps_open_and_oversized_ends() {
        let open = RangeSpec {
            start: Some(500),
            end: None,
        };
        assert_eq!(open.resolve(1000), Ok((500, 999)));

        let oversized = RangeSpec {
            start: Some(500),
            end: Some(5000),
        };
        assert_eq!(oversized.resolve(1000), Ok((500, 999)));
    }

    #[test]
    fn test_resolve_suffix_range() {
        let spec = RangeSpec {
            start: None,
            end: Some(200),
        };
        assert_eq!(spec.resolve(1000), Ok((800, 999)));
    }

    #[test]
    fn test_resolve_rejects_unsatisfiable() {
        let beyond = RangeSpec {
            start: Some(1000),
            end: None,
        };
        assert_eq!(beyond.resolve(1000), Err(RangeError::UnsatisfiableRange));

        let inverted = RangeSpec {
            start: Some(200),
            end: Some(100),
        };
        assert_eq!(inverted.resolve(1000), Err(RangeError::UnsatisfiableRange));

        let open_both = RangeSpec {
            start: None,
            end: None,
        };
        assert_eq!(open_both.resolve(1000), Err(RangeError::UnsatisfiableRange));
    }

    #[test]
    fn test_format_dlna_duration() {
        assert_eq!(format_dlna_duration(0.0), "0:00:00.000");
        assert_eq!(format_dlna_duration(-5.0), "0:00:00.000");
        assert_eq!(format_dlna_duration(3661.5), "1:01:01.500");
        assert_eq!(format_dlna_duration(59.999), "0:00:59.999");
    }

    #[test]
    fn test_format_dlna_duration_saturates_hours() {
        let formatted = format_dlna_duration(100_000.0 * 3600.0);
        assert!(formatted.starts_with("99999:"));
    }
}
