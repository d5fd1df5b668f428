//! Top-K ordering for scored candidates.
//!
//! Ordering is by descending score; equal scores keep their input order, so
//! callers that build candidates in a fixed enumeration order get a
//! reproducible ranking.

/// Converts a signed top-K setting into a limit; negative disables truncation.
pub fn topk_limit(topk: i64) -> Option<usize> {
    if topk < 0 {
        None
    } else {
        Some(usize::try_from(topk).unwrap_or(usize::MAX))
    }
}

/// Stable sort by descending score.
pub(crate) fn sort_by_score_desc<T, F>(items: &mut [T], score: F)
where
    F: Fn(&T) -> f32,
{
    items.sort_by(|a, b| score(b).total_cmp(&score(a)));
}

/// Keeps the `topk` best items when truncation applies.
///
/// Items are only reordered when the list is actually cut; otherwise the
/// input order is returned untouched. Returns true if truncation happened.
pub(crate) fn truncate_topk<T, F>(items: &mut Vec<T>, topk: i64, score: F) -> bool
where
    F: Fn(&T) -> f32,
{
    match topk_limit(topk) {
        Some(k) if k < items.len() => {
            sort_by_score_desc(items, score);
            items.truncate(k);
            true
        }
        _ => false,
    }
}
