//! Byte Range Module
//!
//! Parses HTTP `Range` request headers (RFC 7233) into a canonical set of
//! byte intervals and reduces that set to the single spanning interval used
//! for partial content delivery.
//!
//! Parsing is pure and fails fast: a malformed header is rejected before any
//! resource access happens. The union step is deliberately a bounding box
//! rather than a true multi-interval union, so disjoint requested ranges are
//! served as one contiguous block. That can over-deliver bytes between the
//! requested ranges but never under-delivers, and it avoids the need for
//! `multipart/byteranges` response bodies.

use crate::{Result, VaultError};
use std::collections::HashSet;

/// Required unit prefix of a byte-range header, matched case-insensitively.
const BYTE_UNIT_PREFIX: &str = "bytes=";

/// A single requested byte range from a `Range` header.
///
/// All bounds are inclusive plaintext byte offsets. Suffix and open-ended
/// forms stay symbolic until the resource's decrypted size is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteRange {
    /// Fully specified range `lower-upper`, e.g. `bytes=0-499`.
    Explicit { lower: i64, upper: i64 },
    /// Suffix range `-n`, the last `n` bytes, e.g. `bytes=-500`.
    Suffix(i64),
    /// Open-ended range `lower-`, from `lower` to the end, e.g. `bytes=500-`.
    OpenEnded(i64),
}

/// The single contiguous interval covering every requested sub-range.
///
/// Both bounds are concrete, inclusive offsets with
/// `0 <= start <= end <= size - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanningRange {
    pub start: i64,
    pub end: i64,
}

impl SpanningRange {
    /// Number of bytes covered by this range.
    pub fn len(&self) -> i64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for this range within a resource of
    /// `size` bytes, formatted exactly as `"{start}-{end}/{size}"`.
    pub fn content_range(&self, size: i64) -> String {
        format!("{}-{}/{}", self.start, self.end, size)
    }
}

/// Parse a raw `Range` header value into the set of requested byte ranges.
///
/// Fails with [`VaultError::InvalidRange`] when the header does not start
/// with `bytes=` (case-insensitive), contains no range specifications, a
/// specification does not split into exactly two tokens on `-`, both tokens
/// of a specification are empty, a token is not a valid integer, or an
/// explicit range is inverted.
///
/// Duplicate specifications collapse; ordering is irrelevant to the union.
pub fn parse_range_header(header: &str) -> Result<HashSet<ByteRange>> {
    let header = header.trim();
    if header.len() < BYTE_UNIT_PREFIX.len()
        || !header[..BYTE_UNIT_PREFIX.len()].eq_ignore_ascii_case(BYTE_UNIT_PREFIX)
    {
        return Err(VaultError::InvalidRange(format!(
            "Range header must start with '{}': {}",
            BYTE_UNIT_PREFIX, header
        )));
    }

    let range_set = &header[BYTE_UNIT_PREFIX.len()..];
    let specs: Vec<&str> = range_set
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if specs.is_empty() {
        return Err(VaultError::InvalidRange(format!(
            "No range specifications found: {}",
            header
        )));
    }

    let mut ranges = HashSet::with_capacity(specs.len());
    for spec in specs {
        ranges.insert(parse_single_range_spec(spec, header)?);
    }
    Ok(ranges)
}

/// Parse one `lower-upper` / `lower-` / `-n` token pair.
fn parse_single_range_spec(spec: &str, header: &str) -> Result<ByteRange> {
    let parts: Vec<&str> = spec.split('-').collect();
    if parts.len() != 2 {
        return Err(VaultError::InvalidRange(format!(
            "Range specification must contain exactly one dash: {}",
            header
        )));
    }

    let lower_str = parts[0].trim();
    let upper_str = parts[1].trim();

    match (lower_str.is_empty(), upper_str.is_empty()) {
        (true, true) => Err(VaultError::InvalidRange(format!(
            "Empty range specification: {}",
            header
        ))),
        (true, false) => Ok(ByteRange::Suffix(parse_byte_pos(upper_str, header)?)),
        (false, true) => Ok(ByteRange::OpenEnded(parse_byte_pos(lower_str, header)?)),
        (false, false) => {
            let lower = parse_byte_pos(lower_str, header)?;
            let upper = parse_byte_pos(upper_str, header)?;
            if lower > upper {
                return Err(VaultError::InvalidRange(format!(
                    "Range start cannot be greater than end: {}",
                    header
                )));
            }
            Ok(ByteRange::Explicit { lower, upper })
        }
    }
}

fn parse_byte_pos(token: &str, header: &str) -> Result<i64> {
    token.parse::<i64>().map_err(|_| {
        VaultError::InvalidRange(format!("Invalid byte position '{}': {}", token, header))
    })
}

/// Resolve every range against the resource's decrypted `size` and return
/// the bounding-box union.
///
/// Resolution rules: `Suffix(n)` covers the last `n` bytes, `(size-n, size-1)`
/// with the start clamped to 0 when `n > size`; `OpenEnded(lower)` resolves to
/// `(lower, size-1)`; `Explicit` passes through with the upper bound clamped
/// to `size-1`. Precondition: `size >= 1` and a non-empty range set, both
/// guaranteed by construction in [`parse_range_header`].
///
/// Fails with [`VaultError::InvalidRange`] when no requested range intersects
/// the resource at all (e.g. an explicit range entirely past the end, or a
/// zero-length suffix), which callers surface as an unsatisfiable range.
pub fn union_span(ranges: &HashSet<ByteRange>, size: i64) -> Result<SpanningRange> {
    debug_assert!(size >= 1, "union_span requires a non-empty resource");
    debug_assert!(!ranges.is_empty(), "union_span requires at least one range");

    let last_byte = size - 1;
    let mut start: Option<i64> = None;
    let mut end: Option<i64> = None;

    for range in ranges {
        let (lo, hi) = match *range {
            ByteRange::Suffix(n) => ((size - n).max(0), last_byte),
            ByteRange::OpenEnded(lower) => (lower, last_byte),
            ByteRange::Explicit { lower, upper } => (lower, upper.min(last_byte)),
        };
        if lo > hi {
            continue;
        }
        start = Some(start.map_or(lo, |s: i64| s.min(lo)));
        end = Some(end.map_or(hi, |e: i64| e.max(hi)));
    }

    match (start, end) {
        (Some(start), Some(end)) => Ok(SpanningRange { start, end }),
        _ => Err(VaultError::InvalidRange(format!(
            "No requested range is satisfiable for a resource of {} bytes",
            size
        ))),
    }
}
