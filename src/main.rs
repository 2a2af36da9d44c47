mod extract;
mod history;
mod restore;
mod select;
mod store;
mod utils;
mod workspaces;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use eyre::{Context, Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Recover lost files from Cursor's local history backups and extract code
/// from its chat database. All source stores are opened read-only.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/cursor-recover/config.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Cursor User directory.
    /// Auto-detected per platform if omitted.
    #[arg(long, value_name = "DIR", global = true)]
    cursor_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Restore the latest backed-up version of every file under a directory.
    Restore {
        /// Original directory path to recover (e.g. ~/Projects/MyProject).
        #[arg(short = 'r', long, value_name = "DIR")]
        restore_path: String,

        /// Output directory for restored files.
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Directory containing Cursor history.
        /// Defaults to <cursor-dir>/History.
        #[arg(long, value_name = "DIR")]
        history_dir: Option<PathBuf>,

        /// Window start, "YYYY-MM-DD HH:MM:SS" local time.
        /// Defaults to --days-back before the window end.
        #[arg(short, long, value_name = "TIME")]
        start_time: Option<String>,

        /// Window end, "YYYY-MM-DD HH:MM:SS" local time. Defaults to now.
        #[arg(short, long, value_name = "TIME")]
        end_time: Option<String>,

        /// Number of days back to search (ignored if --start-time is given).
        #[arg(short = 'b', long, value_name = "DAYS", default_value_t = 7)]
        days_back: i64,

        /// Suppress per-file lines. The final summary is always printed.
        #[arg(short, long)]
        quiet: bool,
    },

    /// List Cursor workspaces with their resolved paths and databases.
    Workspaces {
        /// Only show the workspace whose folder contains this path.
        #[arg(value_name = "PATH")]
        path: Option<String>,
    },

    /// List tables in a state database with their schema.
    Tables {
        /// Path to a state.vscdb file. Defaults to the global one.
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
    },

    /// List keys in a key-value table.
    Keys {
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,

        #[arg(short, long, value_name = "TABLE", default_value = store::DEFAULT_TABLE)]
        table: String,

        /// Cap the number of keys returned.
        #[arg(short, long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Search keys with SQL LIKE wildcards (% = any run, _ = one character).
    Search {
        #[arg(value_name = "PATTERN")]
        pattern: String,

        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,

        #[arg(short, long, value_name = "TABLE", default_value = store::DEFAULT_TABLE)]
        table: String,

        #[arg(short, long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Print the value stored under a key.
    Get {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,

        #[arg(short, long, value_name = "TABLE", default_value = store::DEFAULT_TABLE)]
        table: String,
    },

    /// Extract fenced code blocks from chat conversations into files.
    Extract {
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,

        /// Only conversations containing this text (case-sensitive).
        #[arg(short, long, value_name = "TEXT")]
        filter: Option<String>,

        /// Output directory for extracted code.
        #[arg(short, long, value_name = "DIR", default_value = "extracted_code")]
        output_dir: PathBuf,

        /// Suppress per-block lines. The final summary is always printed.
        #[arg(short, long)]
        quiet: bool,
    },
}

#[derive(Deserialize, Default)]
struct FileConfig {
    cursor_dir: Option<PathBuf>,
    history_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

fn default_cursor_dir() -> Option<PathBuf> {
    // macOS: ~/Library/Application Support/Cursor/User
    // Linux: ~/.config/Cursor/User, Windows: %APPDATA%/Cursor/User
    dirs::config_dir().map(|d| d.join("Cursor/User"))
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("cursor-recover/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .wrap_err_with(|| format!("Invalid timestamp (expected YYYY-MM-DD HH:MM:SS): {raw}"))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| eyre!("Ambiguous local time: {raw}"))
}

fn spinner(quiet: bool, message: &'static str) -> ProgressBar {
    if quiet {
        ProgressBar::hidden()
    } else {
        let s = ProgressBar::new_spinner();
        s.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        s.set_message(message);
        s.enable_steady_tick(Duration::from_millis(80));
        s
    }
}

fn progress_bar(quiet: bool, len: u64) -> ProgressBar {
    if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
            )
            .unwrap()
            .progress_chars("=>-"),
        );
        bar
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_cfg = load_file_config(cli.config.as_deref())?;

    // Resolve cursor_dir once (CLI > Config > Auto-detect); both pipelines
    // derive their defaults from it.
    let cursor_dir = cli
        .cursor_dir
        .or(file_cfg.cursor_dir)
        .or_else(default_cursor_dir)
        .ok_or_else(|| {
            eyre!("Could not determine Cursor directory.\nUse --cursor-dir to specify manually.")
        })?;

    match cli.command {
        Command::Restore {
            restore_path,
            output_dir,
            history_dir,
            start_time,
            end_time,
            days_back,
            quiet,
        } => {
            let history_dir = history_dir
                .or(file_cfg.history_dir)
                .unwrap_or_else(|| cursor_dir.join("History"));
            let output_dir = output_dir
                .or(file_cfg.output_dir)
                .unwrap_or_else(|| PathBuf::from("restored"));

            let end = match end_time.as_deref() {
                Some(raw) => parse_time(raw)?,
                None => Utc::now(),
            };
            let start = match start_time.as_deref() {
                Some(raw) => parse_time(raw)?,
                None => end - chrono::Duration::days(days_back),
            };
            if start > end {
                return Err(eyre!("Window start is after window end"));
            }

            let config = utils::RestoreConfig {
                history_dir,
                restore_path,
                output_dir,
                start_ms: utils::to_ms(start),
                end_ms: utils::to_ms(end),
                quiet,
            };
            run_restore(&config)
        }

        Command::Workspaces { path } => {
            let workspaces = workspaces::list_workspaces(&cursor_dir)?;
            if let Some(target) = path {
                match workspaces::workspace_for_path(&workspaces, &target) {
                    Some(ws) => print_workspace(ws),
                    None => println!("No workspace contains {target}"),
                }
                return Ok(());
            }
            if workspaces.is_empty() {
                println!("No workspaces found under {}", cursor_dir.display());
                return Ok(());
            }
            for ws in &workspaces {
                print_workspace(ws);
            }
            Ok(())
        }

        Command::Tables { db } => {
            let db = open_db(db, &cursor_dir)?;
            for (name, schema) in db.list_tables()? {
                println!("{name}");
                if !schema.is_empty() {
                    println!("  {schema}");
                }
            }
            Ok(())
        }

        Command::Keys { db, table, limit } => {
            let db = open_db(db, &cursor_dir)?;
            let keys = db.list_keys(&table, limit)?;
            for key in &keys {
                println!("{key}");
            }
            eprintln!("Total: {} key(s)", keys.len());
            Ok(())
        }

        Command::Search {
            pattern,
            db,
            table,
            limit,
        } => {
            let db = open_db(db, &cursor_dir)?;
            let rows = db.search_keys(&table, &pattern)?;
            let shown = limit.unwrap_or(rows.len()).min(rows.len());
            for (key, _) in &rows[..shown] {
                println!("{key}");
            }
            eprintln!("Total: {} matching key(s)", rows.len());
            Ok(())
        }

        Command::Get { key, db, table } => {
            let db = open_db(db, &cursor_dir)?;
            let value = db.get_value(&table, &key)?;
            print_value(&value);
            Ok(())
        }

        Command::Extract {
            db,
            filter,
            output_dir,
            quiet,
        } => {
            let config = utils::ExtractConfig {
                db_path: db.unwrap_or_else(|| cursor_dir.join("globalStorage/state.vscdb")),
                filter,
                output_dir,
                quiet,
            };
            run_extract(&config)
        }
    }
}

fn open_db(explicit: Option<PathBuf>, cursor_dir: &Path) -> Result<store::StateDb> {
    let path = explicit.unwrap_or_else(|| cursor_dir.join("globalStorage/state.vscdb"));
    Ok(store::StateDb::open(&path)?)
}

/// History pipeline: scan -> select -> restore, then the summary.
fn run_restore(config: &utils::RestoreConfig) -> Result<()> {
    if !config.quiet {
        eprintln!("History directory: {}", config.history_dir.display());
        eprintln!("Restore path:      {}", config.restore_path);
        eprintln!(
            "Time range:        {} to {}",
            utils::format_ms(config.start_ms),
            utils::format_ms(config.end_ms)
        );
    }

    let sp = spinner(config.quiet, "Scanning history...");
    let scan = history::scan_history(&config.history_dir)?;
    sp.finish_and_clear();

    let selection = select::select_latest(
        scan.records,
        &config.restore_path,
        config.start_ms,
        config.end_ms,
    );

    if selection.is_empty() {
        eprintln!(
            "Scanned {} group(s), {} skipped. No files matched the criteria.",
            scan.groups, scan.skipped
        );
        return Ok(());
    }

    let pb = progress_bar(config.quiet, selection.len() as u64);
    let report = restore::restore_selection(
        &selection,
        &config.restore_path,
        &config.output_dir,
        &pb,
        config.quiet,
    )?;
    pb.finish_and_clear();

    // The summary is printed even in quiet mode.
    eprintln!(
        "Scanned {} group(s), {} skipped. Restored {}/{} file(s) to {}.",
        scan.groups,
        scan.skipped,
        report.restored,
        report.attempted,
        config.output_dir.display()
    );
    for failure in &report.failures {
        eprintln!("  failed {}: {}", failure.original_path, failure.reason);
    }

    // Per-file failures do not fail the batch; setup errors already bailed.
    Ok(())
}

/// KV pipeline: open store -> enumerate conversations -> harvest blocks.
fn run_extract(config: &utils::ExtractConfig) -> Result<()> {
    let db = store::StateDb::open(&config.db_path)?;

    if !config.quiet {
        eprintln!("Database: {}", config.db_path.display());
    }

    let pb = spinner(config.quiet, "Extracting code blocks...");
    let report = extract::extract_code(
        &db,
        config.filter.as_deref(),
        &config.output_dir,
        &pb,
        config.quiet,
    )?;
    pb.finish_and_clear();

    eprintln!(
        "{} conversation(s), {} matched, {} decode failure(s). Extracted {} block(s) to {}.",
        report.conversations,
        report.matched,
        report.decode_failures,
        report.blocks,
        config.output_dir.display()
    );
    for failure in &report.failures {
        eprintln!("  failed {}: {}", failure.name, failure.reason);
    }

    Ok(())
}

fn print_workspace(ws: &workspaces::Workspace) {
    println!("{}", ws.id);
    println!("  path: {}", ws.folder);
    println!("  db:   {}", ws.db_path.display());
}

fn print_value(value: &[u8]) {
    match std::str::from_utf8(value) {
        Ok(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_else(|_| text.to_string())
            ),
            Err(_) => println!("{text}"),
        },
        Err(_) => {
            println!("Binary data ({} bytes)", value.len());
        }
    }
}
