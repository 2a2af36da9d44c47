use crate::utils;
use crossbeam_channel::bounded;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One captured version of one original file.
///
/// Multiple records may share the same `original_path`; they are never
/// merged, only compared by timestamp during selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    /// Absolute path the editor declared at capture time, normalized.
    pub original_path: String,
    /// Capture time as epoch milliseconds.
    pub timestamp_ms: i64,
    /// Where the captured bytes live inside the history folder.
    pub content_path: PathBuf,
}

/// The result of walking a history root.
#[derive(Debug, Default)]
pub struct Scan {
    pub records: Vec<SnapshotRecord>,
    /// Entry-group folders visited.
    pub groups: usize,
    /// Groups with a missing/unparsable manifest plus manifest entries whose
    /// content file is gone.
    pub skipped: usize,
}

/// Manifest of one entry group (`entries.json`): the declared original file
/// plus every captured version of it.
#[derive(Deserialize)]
struct Manifest {
    /// `file://` URI of the original file.
    resource: String,
    #[serde(default)]
    entries: Vec<ManifestEntry>,
}

#[derive(Deserialize)]
struct ManifestEntry {
    /// Name of the sibling content file holding this version's bytes.
    id: String,
    #[serde(default)]
    timestamp: Option<f64>,
}

/// Manifests store epoch seconds in older versions and epoch milliseconds in
/// newer ones. Anything below this is taken as seconds.
const EPOCH_MS_THRESHOLD: f64 = 1e12;

fn to_epoch_ms(raw: f64) -> i64 {
    if raw.abs() < EPOCH_MS_THRESHOLD {
        (raw * 1000.0) as i64
    } else {
        raw as i64
    }
}

struct GroupScan {
    records: Vec<SnapshotRecord>,
    skipped_entries: usize,
}

/// Parse one entry-group folder. `None` means the whole group is skipped
/// (missing or unparsable manifest).
fn parse_group(dir: &Path) -> Option<GroupScan> {
    let raw = fs::read_to_string(dir.join("entries.json")).ok()?;
    let manifest: Manifest = serde_json::from_str(&raw).ok()?;

    let original_path = utils::normalize_path(&manifest.resource);
    if original_path.is_empty() {
        return None;
    }

    let mut records = Vec::new();
    let mut skipped_entries = 0usize;
    for entry in manifest.entries {
        let Some(ts) = entry.timestamp else {
            skipped_entries += 1;
            continue;
        };
        let content_path = dir.join(&entry.id);
        if !content_path.is_file() {
            skipped_entries += 1;
            continue;
        }
        records.push(SnapshotRecord {
            original_path: original_path.clone(),
            timestamp_ms: to_epoch_ms(ts),
            content_path,
        });
    }
    Some(GroupScan {
        records,
        skipped_entries,
    })
}

/// Walk a history root and index every snapshot it holds.
///
/// Each immediate child directory is one entry group; groups are parsed on a
/// worker pool, then stitched back together in group-name order so the output
/// is deterministic regardless of thread completion order. A bad group never
/// aborts the scan; it only bumps the skip counter.
pub fn scan_history(root: &Path) -> Result<Scan> {
    if !root.is_dir() {
        return Err(eyre!("History directory not found: {}", root.display()));
    }

    let mut group_dirs: Vec<PathBuf> = fs::read_dir(root)
        .wrap_err_with(|| format!("Failed to read history directory: {}", root.display()))?
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    group_dirs.sort();
    let groups = group_dirs.len();

    let (tx, rx) = bounded::<PathBuf>(512);
    let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<(PathBuf, Option<GroupScan>)>();
    let n_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8);

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let rx = rx.clone();
            let outcome_tx = outcome_tx.clone();
            s.spawn(move || {
                while let Ok(dir) = rx.recv() {
                    let parsed = parse_group(&dir);
                    if outcome_tx.send((dir, parsed)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(rx);
        drop(outcome_tx);

        for dir in group_dirs {
            if tx.send(dir).is_err() {
                break;
            }
        }
        drop(tx);
    });

    let mut outcomes: Vec<(PathBuf, Option<GroupScan>)> = outcome_rx.into_iter().collect();
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));

    let mut scan = Scan {
        groups,
        ..Scan::default()
    };
    for (_, outcome) in outcomes {
        match outcome {
            Some(group) => {
                scan.skipped += group.skipped_entries;
                scan.records.extend(group.records);
            }
            None => scan.skipped += 1,
        }
    }
    Ok(scan)
}
