//! Page count discovery by exponential then binary search

use crate::source::ContentSource;
use tracing::trace;

/// Finds the last existing page of a contiguous run starting at `first`
///
/// `first` is assumed to exist. Candidates `first + 1`, `first + 3`,
/// `first + 7`, ... (offsets doubling) are probed up to `cap`; the gap
/// between the last hit and the first miss is then bisected. Pages are
/// assumed contiguous; a hole in the run ends it.
///
/// For a run of `N` pages this issues at most about `2 * ceil(log2 N)`
/// probes.
pub async fn discover_extent<F>(source: &dyn ContentSource, first: u32, cap: u32, url_for: F) -> u32
where
    F: Fn(u32) -> String,
{
    if cap <= first {
        return first;
    }

    let mut last_found = first;
    let mut first_missing = cap.saturating_add(1);
    let mut span: u32 = 2;
    loop {
        let Some(candidate) = (first - 1).checked_add(span) else {
            break;
        };
        if candidate > cap {
            break;
        }
        if source.exists(&url_for(candidate)).await {
            last_found = candidate;
            match span.checked_mul(2) {
                Some(next) => span = next,
                None => break,
            }
        } else {
            first_missing = candidate;
            break;
        }
    }
    trace!(last_found, first_missing, "Exponential phase done");

    let (mut low, mut high) = (last_found + 1, first_missing - 1);
    while low <= high {
        let mid = low + (high - low) / 2;
        if source.exists(&url_for(mid)).await {
            last_found = mid;
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }
    last_found
}
