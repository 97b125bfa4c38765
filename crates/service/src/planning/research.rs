//! Read-only research over a source tree.

use std::fs;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

const SCANNED_EXTENSIONS: &[&str] = &["rs", "toml"];
const SKIPPED_DIRS: &[&str] = &["target", ".git", "node_modules"];
const MAX_DEPTH: usize = 16;
/// Cap on findings reported per category.
const MAX_FINDINGS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub path: String,
    pub detail: String,
}

/// Everything the research phase found, one list per category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Findings {
    pub code_patterns: Vec<Finding>,
    pub analogous_implementations: Vec<Finding>,
    pub test_fixtures: Vec<Finding>,
    pub architectural_constraints: Vec<Finding>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.code_patterns.is_empty()
            && self.analogous_implementations.is_empty()
            && self.test_fixtures.is_empty()
            && self.architectural_constraints.is_empty()
    }
}

pub trait Researcher: Send + Sync {
    /// Non-test source files that mention any keyword.
    fn code_patterns(&self, keywords: &[String]) -> Vec<Finding>;
    /// Files whose name suggests they already implement something similar.
    fn analogous_implementations(&self, keywords: &[String]) -> Vec<Finding>;
    fn test_fixtures(&self, keywords: &[String]) -> Vec<Finding>;
    /// Workspace manifests and the boundaries they declare.
    fn architectural_constraints(&self) -> Vec<Finding>;

    fn research(&self, keywords: &[String]) -> Findings {
        Findings {
            code_patterns: self.code_patterns(keywords),
            analogous_implementations: self.analogous_implementations(keywords),
            test_fixtures: self.test_fixtures(keywords),
            architectural_constraints: self.architectural_constraints(),
        }
    }
}

struct SourceFile {
    rel: String,
    content: String,
}

impl SourceFile {
    fn is_test(&self) -> bool {
        self.rel.split('/').any(|part| part == "tests") || self.content.contains("#[cfg(test)]")
    }

    fn matched<'k>(&self, keywords: &'k [String]) -> Vec<&'k str> {
        let lower = self.content.to_lowercase();
        keywords.iter().filter(|k| lower.contains(k.as_str())).map(String::as_str).collect()
    }
}

/// Scans `.rs` and `.toml` files under a root, reading at most `max_files`.
/// The tree is read once, on first use.
pub struct FsResearcher {
    root: PathBuf,
    max_files: usize,
    files: OnceCell<Vec<SourceFile>>,
}

impl FsResearcher {
    pub fn new(root: impl Into<PathBuf>, max_files: usize) -> Self {
        Self { root: root.into(), max_files, files: OnceCell::new() }
    }

    fn files(&self) -> &[SourceFile] {
        self.files.get_or_init(|| {
            let out = self.walk();
            debug!(root = %self.root.display(), files = out.len(), "research_scan_done");
            out
        })
    }

    /// Symlinks are never followed, so a link cycle or a link out of the
    /// root cannot widen the scan.
    fn walk(&self) -> Vec<SourceFile> {
        let mut out = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .max_depth(MAX_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_skipped(e.file_name().to_str())));
        for entry in walker {
            if out.len() >= self.max_files {
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "research_entry_unreadable");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let scanned = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |ext| SCANNED_EXTENSIONS.contains(&ext));
            if !scanned {
                continue;
            }
            if let Ok(content) = fs::read_to_string(path) {
                let rel = path
                    .strip_prefix(&self.root)
                    .unwrap_or(path)
                    .to_string_lossy()
                    .replace('\\', "/");
                out.push(SourceFile { rel, content });
            }
        }
        out
    }
}

fn is_skipped(name: Option<&str>) -> bool {
    name.map_or(false, |n| SKIPPED_DIRS.contains(&n))
}

fn keyword_finding(file: &SourceFile, hits: &[&str]) -> Finding {
    Finding { path: file.rel.clone(), detail: format!("mentions {}", hits.join(", ")) }
}

impl Researcher for FsResearcher {
    fn code_patterns(&self, keywords: &[String]) -> Vec<Finding> {
        self.files()
            .iter()
            .filter(|f| f.rel.ends_with(".rs") && !f.is_test())
            .filter_map(|f| {
                let hits = f.matched(keywords);
                (!hits.is_empty()).then(|| keyword_finding(f, &hits))
            })
            .take(MAX_FINDINGS)
            .collect()
    }

    fn analogous_implementations(&self, keywords: &[String]) -> Vec<Finding> {
        self.files()
            .iter()
            .filter(|f| f.rel.ends_with(".rs"))
            .filter_map(|f| {
                let stem = f.rel.rsplit('/').next().unwrap_or_default().to_lowercase();
                let hits: Vec<&str> = keywords.iter().filter(|k| stem.contains(k.as_str())).map(String::as_str).collect();
                (!hits.is_empty()).then(|| Finding { path: f.rel.clone(), detail: format!("named after {}", hits.join(", ")) })
            })
            .take(MAX_FINDINGS)
            .collect()
    }

    fn test_fixtures(&self, keywords: &[String]) -> Vec<Finding> {
        self.files()
            .iter()
            .filter(|f| f.rel.ends_with(".rs") && f.is_test())
            .filter_map(|f| {
                let hits = f.matched(keywords);
                (!hits.is_empty()).then(|| keyword_finding(f, &hits))
            })
            .take(MAX_FINDINGS)
            .collect()
    }

    fn architectural_constraints(&self) -> Vec<Finding> {
        self.files()
            .iter()
            .filter(|f| f.rel.ends_with("Cargo.toml"))
            .map(|f| {
                let package = f
                    .content
                    .lines()
                    .find_map(|l| l.trim().strip_prefix("name = ").map(|n| n.trim_matches('"').to_string()))
                    .unwrap_or_else(|| "workspace".to_string());
                let internal: Vec<&str> = f
                    .content
                    .lines()
                    .filter(|l| l.contains("path = \"../"))
                    .filter_map(|l| l.split('=').next().map(str::trim))
                    .collect();
                let detail = if internal.is_empty() {
                    format!("crate {package}")
                } else {
                    format!("crate {package} depends on {}", internal.join(", "))
                };
                Finding { path: f.rel.clone(), detail }
            })
            .take(MAX_FINDINGS)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_tree() -> PathBuf {
        let root = std::env::temp_dir().join(format!("research-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(root.join("svc/src")).unwrap();
        fs::create_dir_all(root.join("svc/tests")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("svc/Cargo.toml"), "[package]\nname = \"svc\"\n\n[dependencies]\nmodels = { path = \"../models\" }\n").unwrap();
        fs::write(root.join("svc/src/invoice_service.rs"), "pub fn bill() { /* invoice totals */ }\n").unwrap();
        fs::write(root.join("svc/src/other.rs"), "pub fn unrelated() {}\n").unwrap();
        fs::write(root.join("svc/tests/invoice_flow.rs"), "#[test]\nfn invoice() {}\n").unwrap();
        fs::write(root.join("target/invoice.rs"), "// build output\n").unwrap();
        root
    }

    #[test]
    fn finds_each_category_and_skips_build_output() {
        let root = fixture_tree();
        let r = FsResearcher::new(&root, 100);
        let keywords = vec!["invoice".to_string()];
        let found = r.research(&keywords);

        assert_eq!(found.code_patterns.len(), 1);
        assert_eq!(found.code_patterns[0].path, "svc/src/invoice_service.rs");
        assert_eq!(found.analogous_implementations.len(), 2);
        assert_eq!(found.test_fixtures[0].path, "svc/tests/invoice_flow.rs");
        assert_eq!(found.architectural_constraints[0].detail, "crate svc depends on models");
        assert!(found.code_patterns.iter().all(|f| !f.path.starts_with("target")));
        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn file_cap_bounds_the_scan() {
        let root = fixture_tree();
        let r = FsResearcher::new(&root, 1);
        assert_eq!(r.files().len(), 1);
        fs::remove_dir_all(root).ok();
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let root = fixture_tree();
        let outside = std::env::temp_dir().join(format!("research-outside-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("invoice_secret.rs"), "pub fn invoice() {}\n").unwrap();
        std::os::unix::fs::symlink(&root, root.join("svc/src/cycle")).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("svc/outside")).unwrap();

        let r = FsResearcher::new(&root, 100);
        let paths: Vec<&str> = r.files().iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(paths, vec!["svc/Cargo.toml", "svc/src/invoice_service.rs", "svc/src/other.rs", "svc/tests/invoice_flow.rs"]);
        fs::remove_dir_all(root).ok();
        fs::remove_dir_all(outside).ok();
    }

    #[test]
    fn missing_root_yields_nothing() {
        let r = FsResearcher::new("/definitely/not/here", 10);
        assert!(r.research(&["x".to_string()]).is_empty());
    }
}
