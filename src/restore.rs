use crate::select::RestoreSelection;
use crate::utils;
use eyre::{Context, Result};
use indicatif::ProgressBar;
use std::fs;
use std::path::Path;

/// One file that could not be copied out of the history store.
#[derive(Debug)]
pub struct RestoreFailure {
    pub original_path: String,
    pub reason: String,
}

/// Per-run tally of the restore batch. This is the unit the CLI prints.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub attempted: usize,
    pub restored: usize,
    pub failures: Vec<RestoreFailure>,
}

/// Copy every selected snapshot into `output_root`, recreating the directory
/// structure each original path had below `target_root`.
///
/// Content bytes are copied verbatim and existing destinations are silently
/// overwritten, so repeated runs with the same inputs converge on the same
/// tree. A failed copy is recorded and the batch moves on.
pub fn restore_selection(
    selection: &RestoreSelection,
    target_root: &str,
    output_root: &Path,
    pb: &ProgressBar,
    quiet: bool,
) -> Result<RestoreReport> {
    fs::create_dir_all(output_root).wrap_err_with(|| {
        format!(
            "Failed to create output directory: {}",
            output_root.display()
        )
    })?;

    let mut report = RestoreReport::default();

    for (original_path, record) in selection {
        report.attempted += 1;

        let Some(relative) = utils::relative_to(original_path, target_root) else {
            report.failures.push(RestoreFailure {
                original_path: original_path.clone(),
                reason: format!("not under target root {target_root}"),
            });
            continue;
        };
        if relative.is_empty() {
            report.failures.push(RestoreFailure {
                original_path: original_path.clone(),
                reason: "resolves to the output root itself".to_string(),
            });
            continue;
        }

        let dest = output_root.join(&relative);
        if let Some(parent) = dest.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            report.failures.push(RestoreFailure {
                original_path: original_path.clone(),
                reason: format!("create dir {}: {e}", parent.display()),
            });
            continue;
        }

        match fs::copy(&record.content_path, &dest) {
            Ok(_) => {
                report.restored += 1;
                if !quiet {
                    pb.println(format!(
                        "Restored: {relative} (from {})",
                        utils::format_ms(record.timestamp_ms)
                    ));
                }
            }
            Err(e) => {
                report.failures.push(RestoreFailure {
                    original_path: original_path.clone(),
                    reason: e.to_string(),
                });
            }
        }
        pb.inc(1);
    }

    Ok(report)
}
