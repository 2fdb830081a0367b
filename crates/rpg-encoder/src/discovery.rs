//! Git-aware file discovery with glob filtering and a depth cap.
//!
//! The `git` binary is resolved by an explicit PATH scan (never the shell)
//! and cached process-wide; enumeration goes through
//! `git ls-files --cached --others --exclude-standard -z`. Repositories
//! without git fall back to a bounded directory walk with the same filters.

use crate::llm::LlmClient;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Default include globs: the source files of every supported language.
pub const DEFAULT_INCLUDE: &[&str] = &[
    "**/*.py", "**/*.rs", "**/*.ts", "**/*.tsx", "**/*.js", "**/*.jsx", "**/*.mjs",
    "**/*.cjs", "**/*.go", "**/*.java", "**/*.c", "**/*.h", "**/*.cpp", "**/*.cc",
    "**/*.hpp", "**/*.cs", "**/*.rb", "**/*.kt",
];

/// Default exclude globs.
pub const DEFAULT_EXCLUDE: &[&str] =
    &["**/node_modules/**", "**/dist/**", "**/.git/**"];

const DEFAULT_MAX_DEPTH: usize = 10;

/// Options for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_depth: usize,
    pub respect_gitignore: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            include: DEFAULT_INCLUDE.iter().map(|s| (*s).to_string()).collect(),
            exclude: DEFAULT_EXCLUDE.iter().map(|s| (*s).to_string()).collect(),
            max_depth: DEFAULT_MAX_DEPTH,
            respect_gitignore: true,
        }
    }
}

/// Discovered files plus any non-fatal warnings.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    /// Deterministically sorted absolute paths.
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Cached result of the PATH scan. Doubly-optional: the outer None means
/// "not scanned yet".
static GIT_BINARY: RwLock<Option<Option<PathBuf>>> = RwLock::new(None);

/// Resolve the absolute path of the `git` binary by scanning PATH entries
/// directly. The result is cached for the process; see
/// [`reset_git_binary_cache`].
pub fn git_binary() -> Option<PathBuf> {
    if let Some(cached) = GIT_BINARY.read().unwrap().clone() {
        return cached;
    }
    let found = scan_path_for_git();
    *GIT_BINARY.write().unwrap() = Some(found.clone());
    found
}

/// Drop the cached git path so the next lookup re-scans PATH.
pub fn reset_git_binary_cache() {
    *GIT_BINARY.write().unwrap() = None;
}

fn scan_path_for_git() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(if cfg!(windows) { "git.exe" } else { "git" });
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Enumerate the source files of a repository.
pub fn discover_files(repo_path: &Path, options: &DiscoveryOptions) -> Result<DiscoveryResult> {
    let include = build_globset(&options.include).context("invalid include globs")?;
    let exclude = build_globset(&options.exclude).context("invalid exclude globs")?;

    let mut result = DiscoveryResult::default();

    let rel_paths = if options.respect_gitignore {
        match git_ls_files(repo_path) {
            Ok(paths) => Some(paths),
            Err(e) => {
                result.warnings.push(format!(
                    "git enumeration unavailable ({e}); falling back to directory walk"
                ));
                None
            }
        }
    } else {
        None
    };

    let rel_paths = match rel_paths {
        Some(paths) => paths,
        None => walk_files(repo_path, options.max_depth),
    };

    let rel_paths = filter_rpgignore(repo_path, rel_paths);

    let mut files: Vec<PathBuf> = rel_paths
        .into_iter()
        .filter(|rel| {
            depth_of(rel) <= options.max_depth
                && include.is_match(rel)
                && !exclude.is_match(rel)
        })
        .map(|rel| repo_path.join(rel))
        .filter(|abs| abs.is_file())
        .collect();

    files.sort();
    files.dedup();
    result.files = files;
    Ok(result)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn depth_of(rel: &Path) -> usize {
    rel.components().count()
}

/// `git ls-files --cached --others --exclude-standard -z` over the resolved
/// binary, parsed from the NUL-separated output.
fn git_ls_files(repo_path: &Path) -> Result<Vec<PathBuf>> {
    let git = git_binary().ok_or_else(|| anyhow::anyhow!("git binary not found on PATH"))?;
    let output = std::process::Command::new(&git)
        .arg("-C")
        .arg(repo_path)
        .args(["ls-files", "--cached", "--others", "--exclude-standard", "-z"])
        .output()
        .with_context(|| format!("failed to run {}", git.display()))?;

    if !output.status.success() {
        anyhow::bail!(
            "git ls-files failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(output
        .stdout
        .split(|b| *b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| PathBuf::from(String::from_utf8_lossy(chunk).into_owned()))
        .collect())
}

/// Bounded recursive walk fallback, relative paths.
fn walk_files(repo_path: &Path, max_depth: usize) -> Vec<PathBuf> {
    walkdir::WalkDir::new(repo_path)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(repo_path)
                .ok()
                .map(Path::to_path_buf)
        })
        .collect()
}

/// Filter out paths matching `.rpgignore` patterns in the repo root.
/// Missing or unparsable ignore files pass everything through.
fn filter_rpgignore(repo_path: &Path, paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let ignore_path = repo_path.join(".rpgignore");
    if !ignore_path.exists() {
        return paths;
    }
    let (gitignore, err) = ignore::gitignore::Gitignore::new(&ignore_path);
    if let Some(e) = err {
        tracing::warn!("failed to parse .rpgignore: {e}");
    }
    paths
        .into_iter()
        .filter(|rel| {
            !gitignore
                .matched_path_or_any_parents(rel, false)
                .is_ignore()
        })
        .collect()
}

/// Parse an operator-supplied exclusion list: one path per line, blank lines
/// skipped, `#`- and `//`-prefixed lines are comments — nothing else.
pub fn parse_excluded_paths(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with('#') && !line.starts_with("//")
        })
        .map(String::from)
        .collect()
}

/// The exclusion-voting system prompt.
const EXCLUSION_VOTE_SYSTEM: &str = "\
You are auditing a repository file list for an analysis pipeline. Identify
files that should be EXCLUDED: generated code, vendored third-party sources,
fixtures, and build outputs. Respond with a JSON array of the exact paths to
exclude; respond with [] when everything should be kept.";

/// Number of exclusion ballots; a file is excluded by majority.
const EXCLUSION_VOTE_ROUNDS: usize = 3;

/// LLM-mediated file exclusion: exactly 3 ballots over the candidate list;
/// a file is excluded iff at least 2 ballots name it. Ballot failures count
/// as empty ballots.
pub async fn vote_file_exclusions(
    llm: &LlmClient,
    files: &[String],
) -> BTreeSet<String> {
    let candidates: BTreeSet<&str> = files.iter().map(String::as_str).collect();
    let prompt = format!("### Repository files\n{}\n", files.join("\n"));

    let mut votes: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for round in 0..EXCLUSION_VOTE_ROUNDS {
        match llm
            .complete_json::<Vec<String>>(&prompt, EXCLUSION_VOTE_SYSTEM)
            .await
        {
            Ok(ballot) => {
                let seen: BTreeSet<String> = ballot
                    .into_iter()
                    .filter(|path| candidates.contains(path.as_str()))
                    .collect();
                for path in seen {
                    *votes.entry(path).or_insert(0) += 1;
                }
            }
            Err(e) => {
                tracing::warn!("exclusion ballot {} failed: {e}", round + 1);
            }
        }
    }

    votes
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(path, _)| path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::create_dir_all(tmp.path().join("node_modules/pkg")).unwrap();
        fs::write(tmp.path().join("src/main.py"), "def main(): pass\n").unwrap();
        fs::write(tmp.path().join("src/util.py"), "def util(): pass\n").unwrap();
        fs::write(tmp.path().join("README.md"), "# readme\n").unwrap();
        fs::write(tmp.path().join("node_modules/pkg/index.js"), "x\n").unwrap();
        tmp
    }

    #[test]
    fn test_walk_discovery_applies_filters() {
        let tmp = fixture();
        let options = DiscoveryOptions {
            respect_gitignore: false,
            ..DiscoveryOptions::default()
        };
        let result = discover_files(tmp.path(), &options).unwrap();
        let names: Vec<String> = result
            .files
            .iter()
            .map(|p| {
                p.strip_prefix(tmp.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["src/main.py", "src/util.py"]);
    }

    #[test]
    fn test_depth_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let deep = tmp.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("deep.py"), "x = 1\n").unwrap();
        fs::write(tmp.path().join("shallow.py"), "y = 2\n").unwrap();

        let options = DiscoveryOptions {
            respect_gitignore: false,
            max_depth: 2,
            ..DiscoveryOptions::default()
        };
        let result = discover_files(tmp.path(), &options).unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].ends_with("shallow.py"));
    }

    #[test]
    fn test_sorted_deterministic() {
        let tmp = fixture();
        let options = DiscoveryOptions {
            respect_gitignore: false,
            ..DiscoveryOptions::default()
        };
        let a = discover_files(tmp.path(), &options).unwrap();
        let b = discover_files(tmp.path(), &options).unwrap();
        assert_eq!(a.files, b.files);
        let mut sorted = a.files.clone();
        sorted.sort();
        assert_eq!(a.files, sorted);
    }

    #[test]
    fn test_non_git_repo_warns_and_falls_back() {
        let tmp = fixture();
        let result = discover_files(tmp.path(), &DiscoveryOptions::default()).unwrap();
        // Either git enumerated an empty untracked set or the fallback ran;
        // in a non-repo, ls-files fails and the warning is recorded.
        if !result.warnings.is_empty() {
            assert!(result.warnings[0].contains("falling back"));
        }
        assert!(!result.files.is_empty());
    }

    #[test]
    fn test_parse_excluded_paths() {
        let text = "# comment\nsrc/a.py\n\n// another comment\nsrc/b.py\n";
        assert_eq!(parse_excluded_paths(text), vec!["src/a.py", "src/b.py"]);
    }

    #[test]
    fn test_rpgignore_filters_matches() {
        let tmp = fixture();
        fs::write(tmp.path().join(".rpgignore"), "src/util.py\n").unwrap();
        let options = DiscoveryOptions {
            respect_gitignore: false,
            ..DiscoveryOptions::default()
        };
        let result = discover_files(tmp.path(), &options).unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].ends_with("src/main.py"));
    }

    #[test]
    fn test_git_binary_cache_reset() {
        reset_git_binary_cache();
        let first = git_binary();
        let second = git_binary();
        assert_eq!(first, second);
        reset_git_binary_cache();
    }
}
