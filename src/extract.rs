use crate::store::{CONVERSATION_KEY_PATTERN, DEFAULT_TABLE, StateDb};
use eyre::{Context, Result};
use indicatif::ProgressBar;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A fenced code block harvested from conversation text. Exists only during
/// the extraction pass; written to disk and discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub filename_hint: Option<String>,
    pub content: String,
}

/// One code block that could not be written to disk.
#[derive(Debug)]
pub struct ExtractFailure {
    pub name: String,
    pub reason: String,
}

/// Per-run tally of the extraction batch.
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Conversation rows enumerated from the store.
    pub conversations: usize,
    /// Rows that passed the free-text filter (all rows when no filter).
    pub matched: usize,
    /// Rows whose value was not valid JSON/UTF-8.
    pub decode_failures: usize,
    /// Code blocks written to disk.
    pub blocks: usize,
    /// Blocks whose output file could not be written.
    pub failures: Vec<ExtractFailure>,
}

/// Harvest fenced code blocks from every conversation row in the store and
/// write each block to its own file under `output_dir`.
///
/// The free-text filter is applied per conversation, before block
/// extraction: a match anywhere in the serialized value includes all of that
/// conversation's blocks. One undecodable row never aborts the batch.
pub fn extract_code(
    db: &StateDb,
    filter: Option<&str>,
    output_dir: &Path,
    pb: &ProgressBar,
    quiet: bool,
) -> Result<ExtractReport> {
    let rows = db.search_keys(DEFAULT_TABLE, CONVERSATION_KEY_PATTERN)?;
    fs::create_dir_all(output_dir).wrap_err_with(|| {
        format!(
            "Failed to create output directory: {}",
            output_dir.display()
        )
    })?;

    let mut report = ExtractReport::default();
    let mut taken: HashSet<String> = HashSet::new();
    let mut ordinal = 0usize;

    for (key, value) in rows {
        report.conversations += 1;

        let Ok(text) = std::str::from_utf8(&value) else {
            report.decode_failures += 1;
            continue;
        };
        let Ok(decoded) = serde_json::from_str::<Value>(text) else {
            report.decode_failures += 1;
            continue;
        };

        // Case-sensitive substring over the serialized conversation.
        if let Some(needle) = filter
            && !text.contains(needle)
        {
            continue;
        }
        report.matched += 1;

        for message in conversation_messages(&decoded) {
            let Some(body) = message_text(message) else {
                continue;
            };
            for block in scan_fenced_blocks(body) {
                ordinal += 1;
                let name = allocate_name(block_filename(&block, ordinal), &mut taken);
                let dest = output_dir.join(&name);
                match fs::write(&dest, &block.content) {
                    Ok(()) => {
                        report.blocks += 1;
                        if !quiet {
                            pb.println(format!("Extracted: {name} (from {key})"));
                        }
                    }
                    Err(e) => {
                        report.failures.push(ExtractFailure {
                            name,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        pb.inc(1);
    }

    Ok(report)
}

/// Locate the message list inside a decoded conversation value. Missing
/// fields mean "no content here", never an error.
fn conversation_messages(value: &Value) -> Vec<&Value> {
    if let Some(list) = value.get("messages").and_then(Value::as_array) {
        return list.iter().collect();
    }
    if let Some(list) = value
        .get("bubbleContent")
        .and_then(|b| b.get("messages"))
        .and_then(Value::as_array)
    {
        return list.iter().collect();
    }
    // Bubble rows may themselves be a single message carrying text.
    if value.get("text").is_some() || value.get("content").is_some() {
        return vec![value];
    }
    Vec::new()
}

fn message_text(message: &Value) -> Option<&str> {
    message
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| message.get("content").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Scan message text for fenced code blocks. A block opens with ``` plus an
/// optional info string and closes with ``` alone on a line; an unclosed
/// fence at end of text is dropped.
pub fn scan_fenced_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(info) = line.trim_start().strip_prefix("```") else {
            continue;
        };
        let (language, filename_hint) = parse_info_string(info);

        let mut content = String::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            if inner.trim() == "```" {
                closed = true;
                break;
            }
            content.push_str(inner);
            content.push('\n');
        }
        if closed {
            blocks.push(CodeBlock {
                language,
                filename_hint,
                content,
            });
        }
    }

    blocks
}

/// Split a fence info string into a language tag and an optional filename
/// hint. Recognized shapes: `lang`, `lang:path`, `lang path`.
fn parse_info_string(info: &str) -> (Option<String>, Option<String>) {
    let mut tokens = info.trim().split_whitespace();
    let Some(first) = tokens.next() else {
        return (None, None);
    };
    let (language, mut filename) = match first.split_once(':') {
        Some((lang, path)) if !path.is_empty() => (lang, Some(path.to_string())),
        _ => (first, None),
    };
    if filename.is_none() {
        filename = tokens.next().map(str::to_string);
    }
    let language = (!language.is_empty()).then(|| language.to_lowercase());
    (language, filename)
}

fn block_filename(block: &CodeBlock, ordinal: usize) -> String {
    if let Some(hint) = &block.filename_hint {
        let base = hint.rsplit(['/', '\\']).next().unwrap_or(hint);
        if !base.is_empty() {
            return base.to_string();
        }
    }
    let ext = block
        .language
        .as_deref()
        .map(extension_for)
        .unwrap_or("txt");
    format!("snippet-{ordinal:03}.{ext}")
}

fn extension_for(language: &str) -> &'static str {
    match language {
        "python" | "py" => "py",
        "rust" | "rs" => "rs",
        "javascript" | "js" | "jsx" => "js",
        "typescript" | "ts" | "tsx" => "ts",
        "go" | "golang" => "go",
        "java" => "java",
        "c" => "c",
        "cpp" | "c++" => "cpp",
        "csharp" | "cs" => "cs",
        "ruby" | "rb" => "rb",
        "php" => "php",
        "swift" => "swift",
        "kotlin" | "kt" => "kt",
        "shell" | "bash" | "sh" | "zsh" => "sh",
        "sql" => "sql",
        "html" => "html",
        "css" => "css",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "markdown" | "md" => "md",
        _ => "txt",
    }
}

// Disambiguate collisions with an incrementing ordinal before the extension.
fn allocate_name(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let (stem, ext) = match base.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), Some(e.to_string())),
        None => (base, None),
    };
    let mut n = 1usize;
    loop {
        let candidate = match &ext {
            Some(e) => format!("{stem}-{n}.{e}"),
            None => format!("{stem}-{n}"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::fixture_db;

    #[test]
    fn scans_tagged_and_untagged_fences() {
        let text = "intro\n```python\nprint('hi')\n```\nmiddle\n```\nplain\n```\n";
        let blocks = scan_fenced_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
        assert_eq!(blocks[0].content, "print('hi')\n");
        assert_eq!(blocks[1].language, None);
        assert_eq!(blocks[1].content, "plain\n");
    }

    #[test]
    fn unclosed_fence_is_dropped() {
        let blocks = scan_fenced_blocks("```rust\nfn main() {}\n");
        assert!(blocks.is_empty());
    }

    #[test]
    fn info_string_carries_filename_hints() {
        assert_eq!(
            parse_info_string("rust:src/lib.rs"),
            (Some("rust".into()), Some("src/lib.rs".into()))
        );
        assert_eq!(
            parse_info_string("python script.py"),
            (Some("python".into()), Some("script.py".into()))
        );
        assert_eq!(parse_info_string(""), (None, None));
    }

    #[test]
    fn name_collisions_get_ordinal_suffixes() {
        let mut taken = HashSet::new();
        assert_eq!(allocate_name("a.py".into(), &mut taken), "a.py");
        assert_eq!(allocate_name("a.py".into(), &mut taken), "a-1.py");
        assert_eq!(allocate_name("a.py".into(), &mut taken), "a-2.py");
    }

    #[test]
    fn extracts_blocks_with_language_appropriate_extensions() {
        let conversation = serde_json::json!({
            "messages": [
                { "text": "```python\nx = 1\n```\nthen\n```\nnotes\n```" }
            ]
        });
        let (_db_tmp, path) =
            fixture_db(&[("bubbleId:1:a", conversation.to_string().as_bytes())]);
        let db = StateDb::open(&path).unwrap();
        let out = tempfile::tempdir().unwrap();

        let report =
            extract_code(&db, None, out.path(), &ProgressBar::hidden(), true).unwrap();

        assert_eq!(report.conversations, 1);
        assert_eq!(report.blocks, 2);
        assert_eq!(
            fs::read_to_string(out.path().join("snippet-001.py")).unwrap(),
            "x = 1\n"
        );
        assert_eq!(
            fs::read_to_string(out.path().join("snippet-002.txt")).unwrap(),
            "notes\n"
        );
    }

    #[test]
    fn malformed_json_is_counted_and_skipped() {
        let good = serde_json::json!({
            "bubbleContent": { "messages": [ { "content": "```sh\nls\n```" } ] }
        });
        let (_db_tmp, path) = fixture_db(&[
            ("bubbleId:1:bad", b"{not json".as_slice()),
            ("bubbleId:2:good", good.to_string().as_bytes()),
        ]);
        let db = StateDb::open(&path).unwrap();
        let out = tempfile::tempdir().unwrap();

        let report =
            extract_code(&db, None, out.path(), &ProgressBar::hidden(), true).unwrap();

        assert_eq!(report.conversations, 2);
        assert_eq!(report.decode_failures, 1);
        assert_eq!(report.blocks, 1);
        assert!(out.path().join("snippet-001.sh").exists());
    }

    #[test]
    fn unwritable_block_is_recorded_and_the_batch_continues() {
        let first = serde_json::json!({
            "messages": [ { "text": "```python\nx = 1\n```" } ]
        });
        let second = serde_json::json!({
            "messages": [ { "text": "```rust\nfn b() {}\n```" } ]
        });
        let (_db_tmp, path) = fixture_db(&[
            ("bubbleId:1:a", first.to_string().as_bytes()),
            ("bubbleId:2:b", second.to_string().as_bytes()),
        ]);
        let db = StateDb::open(&path).unwrap();
        let out = tempfile::tempdir().unwrap();
        // A directory squatting on the first block's destination makes its
        // write fail.
        fs::create_dir_all(out.path().join("snippet-001.py")).unwrap();

        let report =
            extract_code(&db, None, out.path(), &ProgressBar::hidden(), true).unwrap();

        assert_eq!(report.blocks, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "snippet-001.py");
        assert_eq!(
            fs::read_to_string(out.path().join("snippet-002.rs")).unwrap(),
            "fn b() {}\n"
        );
    }

    #[test]
    fn filter_gates_whole_conversations_case_sensitively() {
        let alpha = serde_json::json!({
            "messages": [ { "text": "alpha project\n```rust\nfn a() {}\n```" } ]
        });
        let beta = serde_json::json!({
            "messages": [ { "text": "beta project\n```rust\nfn b() {}\n```" } ]
        });
        let (_db_tmp, path) = fixture_db(&[
            ("bubbleId:1:alpha", alpha.to_string().as_bytes()),
            ("bubbleId:2:beta", beta.to_string().as_bytes()),
        ]);
        let db = StateDb::open(&path).unwrap();
        let out = tempfile::tempdir().unwrap();

        let report =
            extract_code(&db, Some("alpha"), out.path(), &ProgressBar::hidden(), true).unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.blocks, 1);

        // Case-sensitive: "Alpha" matches nothing.
        let out2 = tempfile::tempdir().unwrap();
        let report2 =
            extract_code(&db, Some("Alpha"), out2.path(), &ProgressBar::hidden(), true).unwrap();
        assert_eq!(report2.matched, 0);
        assert_eq!(report2.blocks, 0);
    }

    #[test]
    fn filename_hints_name_the_output_file() {
        let conversation = serde_json::json!({
            "messages": [ { "text": "```rust:src/lib.rs\npub fn x() {}\n```" } ]
        });
        let (_db_tmp, path) =
            fixture_db(&[("bubbleId:1:a", conversation.to_string().as_bytes())]);
        let db = StateDb::open(&path).unwrap();
        let out = tempfile::tempdir().unwrap();

        extract_code(&db, None, out.path(), &ProgressBar::hidden(), true).unwrap();
        assert!(out.path().join("lib.rs").exists());
    }
}
