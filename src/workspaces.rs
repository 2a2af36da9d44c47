use crate::utils;
use eyre::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata about one editor workspace, discovered from
/// `<cursor_dir>/workspaceStorage/<hash>/workspace.json`.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Storage folder name, typically a hash.
    pub id: String,
    /// The filesystem path the workspace pointed at, normalized.
    pub folder: String,
    /// The workspace-local `state.vscdb`.
    pub db_path: PathBuf,
}

#[derive(Deserialize)]
struct WorkspaceManifest {
    folder: Option<String>,
}

/// Enumerate workspaces under a Cursor user directory, sorted by id.
/// Folders without a parsable manifest are skipped; a missing storage
/// directory yields an empty list.
pub fn list_workspaces(cursor_dir: &Path) -> Result<Vec<Workspace>> {
    let storage = cursor_dir.join("workspaceStorage");
    let Ok(entries) = fs::read_dir(&storage) else {
        return Ok(Vec::new());
    };

    let mut workspaces = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Ok(raw) = fs::read_to_string(dir.join("workspace.json")) else {
            continue;
        };
        let Ok(manifest) = serde_json::from_str::<WorkspaceManifest>(&raw) else {
            continue;
        };
        let Some(folder_uri) = manifest.folder else {
            continue;
        };
        workspaces.push(Workspace {
            id: entry.file_name().to_string_lossy().into_owned(),
            folder: utils::normalize_path(&folder_uri),
            db_path: dir.join("state.vscdb"),
        });
    }
    workspaces.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(workspaces)
}

/// The workspace whose folder contains `target`, if any. Uses the same
/// lexical containment rule as snapshot selection.
pub fn workspace_for_path<'a>(workspaces: &'a [Workspace], target: &str) -> Option<&'a Workspace> {
    workspaces
        .iter()
        .find(|ws| utils::is_under(target, &ws.folder))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_workspace(cursor_dir: &Path, id: &str, folder_uri: Option<&str>) {
        let dir = cursor_dir.join("workspaceStorage").join(id);
        fs::create_dir_all(&dir).unwrap();
        match folder_uri {
            Some(uri) => {
                fs::write(
                    dir.join("workspace.json"),
                    format!(r#"{{"folder":"{uri}"}}"#),
                )
                .unwrap();
            }
            None => {
                fs::write(dir.join("workspace.json"), "not json").unwrap();
            }
        }
    }

    #[test]
    fn discovers_workspaces_and_skips_broken_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        seed_workspace(tmp.path(), "bbb", Some("file:///home/user/proj-b"));
        seed_workspace(tmp.path(), "aaa", Some("file:///home/user/proj-a"));
        seed_workspace(tmp.path(), "broken", None);

        let workspaces = list_workspaces(tmp.path()).unwrap();
        assert_eq!(workspaces.len(), 2);
        assert_eq!(workspaces[0].id, "aaa");
        assert_eq!(workspaces[0].folder, "/home/user/proj-a");
        assert!(workspaces[0].db_path.ends_with("state.vscdb"));
    }

    #[test]
    fn missing_storage_dir_is_an_empty_list() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_workspaces(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn matches_workspace_by_path_containment() {
        let tmp = tempfile::tempdir().unwrap();
        seed_workspace(tmp.path(), "x", Some("file:///home/user/proj"));
        let workspaces = list_workspaces(tmp.path()).unwrap();

        let hit = workspace_for_path(&workspaces, "/home/user/proj/src/main.rs");
        assert_eq!(hit.map(|w| w.id.as_str()), Some("x"));
        assert!(workspace_for_path(&workspaces, "/home/user/projects").is_none());
    }
}
