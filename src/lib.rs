//! # cursor-recover
//!
//! A CLI tool that recovers lost files from [Cursor](https://cursor.com)'s
//! local backup history and extracts code from its chat database.
//!
//! ## What it does
//!
//! Cursor silently keeps per-file backup snapshots under `User/History`
//! (one folder per tracked file, with an `entries.json` manifest) and
//! persists chat sessions in SQLite `state.vscdb` files. When a working
//! directory is lost, this tool can reconstruct it from whatever the editor
//! retained:
//!
//! - `restore` indexes every snapshot, picks the latest in-window version of
//!   each file under the directory you lost, and copies them into a clean
//!   output tree mirroring the original layout.
//! - `extract` walks chat conversations in the state database and writes
//!   every fenced code block to its own file, named by language.
//! - `workspaces`, `tables`, `keys`, `search` and `get` help locate the
//!   right history root and database to recover from.
//!
//! Every source store is opened **read-only** — nothing in your Cursor
//! profile is ever modified; all writes land in the output directory.
//!
//! ## Usage
//!
//! ```sh
//! # Restore everything under a project from the last 7 days
//! cursor-recover restore -r ~/Projects/MyProject
//!
//! # Widen the window and pick the output location
//! cursor-recover restore -r ~/Projects/MyProject -b 30 -o recovered
//!
//! # Pull code blocks out of chats that mention the project
//! cursor-recover extract --filter MyProject -o recovered-snippets
//! ```
//!
//! Preferences can be persisted in `~/.config/cursor-recover/config.toml`.
//!
//! ## Compatibility
//!
//! Tracks Cursor's internal (undocumented) on-disk layout: the `History`
//! folder format and the `cursorDiskKV` table keyed by `bubbleId:` entries.
//! If a Cursor update breaks either, please open an issue.
