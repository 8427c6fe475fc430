//! Segment-wise version comparison as used by manifest `VERSION` fields.

use std::cmp::Ordering;

/// Compares two dotted version strings segment by segment.
///
/// Segments are compared as strings, not numbers, so `"2" > "10"`. When one
/// version is a prefix of the other, the longer one is greater.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match x.cmp(y) {
                Ordering::Equal => continue,
                other => return other,
            },
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
        }
    }
}
