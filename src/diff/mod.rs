//! Record diffs and the history built from them.
//!
//! A [`RecordsDiff`] is the net effect of a span of mutations: records
//! added, updated (`from`, `to`), and removed. Diffs compose with
//! [`squash_record_diffs`] and invert with [`reverse_records_diff`].
//!
//! The store tags each diff with its [`ChangeSource`](crate::ChangeSource)
//! as a [`HistoryEntry`] and queues it in a [`HistoryAccumulator`] until the
//! next flush, which squashes contiguous same-source runs.

mod history;
mod records_diff;

pub use history::{squash_history_entries, HistoryAccumulator, HistoryEntry, InterceptorGuard};
pub use records_diff::{apply_records_diff, reverse_records_diff, squash_record_diffs, RecordsDiff};
