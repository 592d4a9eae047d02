//! Source locator - enumerates candidate plugin files under the plugin roots
//!
//! Layout on disk is one level of category subdirectories per root:
//! `<root>/<category>/<plugin>.lua`. Temp, backup, and hidden files are
//! skipped. Enumeration order is sorted by name so a pass is reproducible.

use super::diagnostics::{FailureReason, LoadFailure};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension recognized as plugin source
pub const PLUGIN_EXTENSION: &str = "lua";

/// A configured plugin root directory
#[derive(Debug, Clone)]
pub struct PluginRoot {
    pub name: String,
    pub path: PathBuf,
}

impl PluginRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("plugins")
            .to_string();
        Self { name, path }
    }
}

/// Identity of one discovered plugin file, valid for a single load attempt
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub path: PathBuf,
    pub category: String,
    pub root_name: String,
}

impl ModuleDescriptor {
    /// Short `root/category/file.lua` form used in logs and diagnostics
    pub fn display_name(&self) -> String {
        let file = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("?");
        format!("{}/{}/{}", self.root_name, self.category, file)
    }
}

/// Result of one discovery sweep across all roots
#[derive(Debug, Default)]
pub struct Discovery {
    pub modules: Vec<ModuleDescriptor>,
    pub failures: Vec<LoadFailure>,
}

/// Whether a file name is loadable plugin source (right extension, not a
/// temp/backup/hidden artifact)
pub fn is_plugin_source(name: &str) -> bool {
    name.ends_with(&format!(".{}", PLUGIN_EXTENSION))
        && !name.starts_with(".temp_")
        && !name.contains(".backup.")
        && !name.starts_with('.')
}

/// Enumerate plugin files across the given roots
///
/// Unreadable roots or categories become `directory_unreadable` diagnostics
/// and never abort the sweep; roots that simply do not exist are skipped.
pub fn discover(roots: &[PluginRoot]) -> Discovery {
    let mut discovery = Discovery::default();

    for root in roots {
        if !root.path.exists() {
            debug!("Plugin root does not exist, skipping: {}", root.path.display());
            continue;
        }

        let categories = match read_sorted_entries(&root.path) {
            Ok(entries) => entries,
            Err(e) => {
                discovery.failures.push(LoadFailure {
                    file: root.name.clone(),
                    path: root.path.clone(),
                    reason: FailureReason::DirectoryUnreadable,
                    errors: vec![e.to_string()],
                    details: None,
                });
                continue;
            }
        };

        for category_path in categories {
            if !category_path.is_dir() {
                continue;
            }
            let category = match category_path.file_name().and_then(|n| n.to_str()) {
                Some(name) if !name.starts_with('.') => name.to_string(),
                _ => continue,
            };

            let files = match read_sorted_entries(&category_path) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "Unable to read plugin category {}: {}",
                        category_path.display(),
                        e
                    );
                    discovery.failures.push(LoadFailure {
                        file: format!("{}/{}", root.name, category),
                        path: category_path.clone(),
                        reason: FailureReason::DirectoryUnreadable,
                        errors: vec![e.to_string()],
                        details: None,
                    });
                    continue;
                }
            };

            for path in files {
                let name = match path.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n,
                    None => continue,
                };
                if !is_plugin_source(name) {
                    continue;
                }
                match path.metadata() {
                    Ok(meta) if meta.is_file() => {}
                    _ => continue,
                }

                discovery.modules.push(ModuleDescriptor {
                    path,
                    category: category.clone(),
                    root_name: root.name.clone(),
                });
            }
        }
    }

    discovery
}

fn read_sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, "return {}").unwrap();
    }

    #[test]
    fn skips_temp_backup_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        let category = dir.path().join("fun");
        std::fs::create_dir(&category).unwrap();
        touch(&category.join("good.lua"));
        touch(&category.join(".temp_draft.lua"));
        touch(&category.join("old.backup.1700000000.lua"));
        touch(&category.join(".hidden.lua"));
        touch(&category.join("notes.txt"));

        let discovery = discover(&[PluginRoot::new(dir.path())]);
        let names: Vec<String> = discovery.modules.iter().map(|m| m.display_name()).collect();
        assert_eq!(names.len(), 1, "got {:?}", names);
        assert!(names[0].ends_with("fun/good.lua"));
    }

    #[test]
    fn only_one_category_level_is_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let category = dir.path().join("tools");
        let nested = category.join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        touch(&category.join("top.lua"));
        touch(&nested.join("buried.lua"));
        // files at the root itself are not in any category
        touch(&dir.path().join("stray.lua"));

        let discovery = discover(&[PluginRoot::new(dir.path())]);
        assert_eq!(discovery.modules.len(), 1);
        assert_eq!(discovery.modules[0].category, "tools");
    }

    #[test]
    fn unreadable_root_is_reported_without_stopping_others() {
        let dir = tempfile::tempdir().unwrap();
        let good_root = dir.path().join("good");
        let category = good_root.join("info");
        std::fs::create_dir_all(&category).unwrap();
        touch(&category.join("ping.lua"));

        // a plain file in place of a directory makes read_dir fail
        let bad_root = dir.path().join("bad");
        std::fs::write(&bad_root, "not a directory").unwrap();

        let discovery = discover(&[
            PluginRoot::new(&bad_root),
            PluginRoot::new(&good_root),
        ]);
        assert_eq!(discovery.modules.len(), 1);
        assert_eq!(discovery.failures.len(), 1);
        assert_eq!(
            discovery.failures[0].reason,
            FailureReason::DirectoryUnreadable
        );
    }

    #[test]
    fn missing_root_is_skipped_silently() {
        let discovery = discover(&[PluginRoot::new("/nonexistent/starling/plugins")]);
        assert!(discovery.modules.is_empty());
        assert!(discovery.failures.is_empty());
    }

    #[test]
    fn enumeration_is_sorted_for_stable_collision_order() {
        let dir = tempfile::tempdir().unwrap();
        let category = dir.path().join("cat");
        std::fs::create_dir(&category).unwrap();
        touch(&category.join("b.lua"));
        touch(&category.join("a.lua"));
        touch(&category.join("c.lua"));

        let discovery = discover(&[PluginRoot::new(dir.path())]);
        let files: Vec<_> = discovery
            .modules
            .iter()
            .map(|m| m.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(files, vec!["a.lua", "b.lua", "c.lua"]);
    }
}
