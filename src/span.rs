//! Byte-offset source locations.
//!
//! Every token and AST node carries a [`Span`]: a half-open byte range into
//! the query text. Spans are plain value objects; they never own memory and
//! are cheap to copy around.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to a contiguous sequence of bytes in a query.
///
/// The range is half-open: `start` is the index of the first byte and `end`
/// is one past the last byte. A span of `-1, -1` is the *null span* and
/// represents the absence of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Index of the first byte, relative to the beginning of the query.
    pub start: isize,
    /// End index (exclusive), relative to the beginning of the query.
    pub end: isize,
}

impl Span {
    pub fn new(start: isize, end: isize) -> Span {
        Span { start, end }
    }

    /// A zero-length span at the given byte offset.
    pub fn at(index: usize) -> Span {
        Span {
            start: index as isize,
            end: index as isize,
        }
    }

    /// The null span, representing the absence of a location.
    pub fn null() -> Span {
        Span { start: -1, end: -1 }
    }

    /// Reports whether the span has non-negative indices and a
    /// non-negative length.
    pub fn is_valid(self) -> bool {
        self.start >= 0 && self.end >= 0 && self.start <= self.end
    }

    /// Returns the length of the span, or zero if the span is invalid.
    pub fn len(self) -> usize {
        if !self.is_valid() {
            return 0;
        }
        (self.end - self.start) as usize
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Reports whether `self` and `other` intersect.
    ///
    /// Two zero-length spans overlap when they are equal and valid. A
    /// zero-length span overlaps a longer one when its start lies between
    /// the other span's bounds, inclusive.
    pub fn overlaps(self, other: Span) -> bool {
        if !self.is_valid() || !other.is_valid() {
            return false;
        }
        let intersection = Span {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        };
        intersection.is_valid()
    }

    /// Extracts the span's text from the source it indexes into, or ""
    /// when the span does not address a valid range of it.
    pub fn slice(self, source: &str) -> &str {
        if !self.is_valid() {
            return "";
        }
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or("")
    }
}

impl fmt::Display for Span {
    /// Formats the span indices as a mathematical range like `[12,34)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

/// Computes the union of the given spans, ignoring null spans.
///
/// Returns the null span if no valid span was given.
pub fn union_spans<I: IntoIterator<Item = Span>>(spans: I) -> Span {
    let mut union = Span::null();
    for span in spans {
        if !span.is_valid() {
            continue;
        }
        if union.is_valid() {
            union = Span::new(union.start.min(span.start), union.end.max(span.end));
        } else {
            union = span;
        }
    }
    union
}

/// Resolves a byte offset to a 1-based line and column pair.
///
/// A newline advances to the next line; a tab advances the column to the
/// next 8-aligned stop; every other character advances the column by one.
pub fn line_col(source: &str, pos: usize) -> (usize, usize) {
    const TAB_WIDTH: usize = 8;
    let (mut line, mut col) = (1, 1);
    for (i, c) in source.char_indices() {
        if i >= pos {
            break;
        }
        match c {
            '\n' => {
                line += 1;
                col = 1;
            }
            '\t' => {
                col += TAB_WIDTH - (col - 1) % TAB_WIDTH;
            }
            _ => col += 1,
        }
    }
    (line, col)
}

#[test]
fn test_overlaps_zero_length() {
    // A cursor position at either bound of a token's span touches it.
    let token = Span::new(6, 9);
    assert!(Span::new(6, 6).overlaps(token));
    assert!(Span::new(9, 9).overlaps(token));
    assert!(!Span::new(10, 10).overlaps(token));
    assert!(Span::new(4, 4).overlaps(Span::new(4, 4)));
    assert!(!Span::new(4, 4).overlaps(Span::new(5, 5)));
}

#[test]
fn test_union_ignores_null() {
    let u = union_spans([Span::null(), Span::new(3, 5), Span::new(9, 12)]);
    assert_eq!(u, Span::new(3, 12));
    assert_eq!(union_spans([Span::null()]), Span::null());
}
