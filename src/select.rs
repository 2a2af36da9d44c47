use crate::history::SnapshotRecord;
use crate::utils;
use std::collections::BTreeMap;

/// One chosen record per original path: the latest in-window snapshot of
/// every file under the target root. Keyed by normalized original path so
/// downstream iteration is deterministic.
pub type RestoreSelection = BTreeMap<String, SnapshotRecord>;

/// Reduce an index of snapshot records to the single best record per path.
///
/// A record qualifies when its original path is lexically under
/// `target_root` and its timestamp lies in `[start_ms, end_ms]` (inclusive
/// both ends). Among qualifying records for the same path the one with the
/// strictly greatest timestamp wins; on a timestamp tie the first-encountered
/// record is kept, which keeps the outcome deterministic for a deterministic
/// input order.
pub fn select_latest(
    records: impl IntoIterator<Item = SnapshotRecord>,
    target_root: &str,
    start_ms: i64,
    end_ms: i64,
) -> RestoreSelection {
    let root = utils::normalize_path(target_root);
    let mut selection = RestoreSelection::new();

    for record in records {
        if !utils::is_under(&record.original_path, &root) {
            continue;
        }
        if record.timestamp_ms < start_ms || record.timestamp_ms > end_ms {
            continue;
        }
        match selection.get(&record.original_path) {
            Some(best) if best.timestamp_ms >= record.timestamp_ms => {}
            _ => {
                selection.insert(record.original_path.clone(), record);
            }
        }
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(path: &str, ts: i64, content: &str) -> SnapshotRecord {
        SnapshotRecord {
            original_path: path.to_string(),
            timestamp_ms: ts,
            content_path: PathBuf::from(content),
        }
    }

    #[test]
    fn keeps_only_in_window_records_under_root() {
        let records = vec![
            record("/p/a.txt", 100, "a1"),
            record("/p/a.txt", 50, "a0"),   // below window
            record("/p/b.txt", 300, "b1"),  // above window
            record("/q/c.txt", 150, "c1"),  // wrong root
        ];
        let selection = select_latest(records, "/p", 100, 200);
        assert_eq!(selection.len(), 1);
        assert_eq!(selection["/p/a.txt"].timestamp_ms, 100);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let records = vec![record("/p/a.txt", 100, "lo"), record("/p/b.txt", 200, "hi")];
        let selection = select_latest(records, "/p", 100, 200);
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn latest_timestamp_wins_per_path() {
        let records = vec![
            record("/p/a.txt", 100, "old"),
            record("/p/a.txt", 200, "new"),
            record("/p/a.txt", 150, "mid"),
        ];
        let selection = select_latest(records, "/p", 0, 1000);
        assert_eq!(selection.len(), 1);
        assert_eq!(selection["/p/a.txt"].content_path, PathBuf::from("new"));
    }

    #[test]
    fn equal_timestamps_keep_first_encountered() {
        let records = vec![
            record("/p/a.txt", 100, "first"),
            record("/p/a.txt", 100, "second"),
        ];
        let selection = select_latest(records, "/p", 0, 1000);
        assert_eq!(selection["/p/a.txt"].content_path, PathBuf::from("first"));
    }

    #[test]
    fn no_matches_is_an_empty_selection_not_an_error() {
        let selection = select_latest(Vec::new(), "/p", 0, 1000);
        assert!(selection.is_empty());
    }

    #[test]
    fn trailing_separator_on_root_is_irrelevant() {
        let records = vec![record("/p/sub/a.txt", 100, "a")];
        let selection = select_latest(records, "/p/", 0, 1000);
        assert_eq!(selection.len(), 1);
    }
}
