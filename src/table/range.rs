use std::ops::{Bound, Range, RangeBounds};

/// Resolves `range` against `row_count` rows. A range reaching past the last
/// row, or ending before it starts, is a caller bug and panics; nothing is
/// clamped.
#[track_caller]
pub(crate) fn resolve_rows<R: RangeBounds<usize>>(range: R, row_count: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.checked_add(1).expect("Row range start overflows"),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.checked_add(1).expect("Row range end overflows"),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => row_count,
    };
    assert!(
        start <= end,
        "Row range {}..{} ends before it starts",
        start,
        end
    );
    assert!(
        end <= row_count,
        "Row range {}..{} out of bounds for {} rows",
        start,
        end,
        row_count
    );
    start..end
}
