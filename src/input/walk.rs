//! Filesystem walking for input discovery.
//!
//! Every walk is identified by a [`WalkKey`] so the same root is never
//! enumerated twice, and every visited entry runs through the project's
//! [`ExclusionResolver`]. I/O errors during descent skip the subtree rather
//! than failing the fingerprint.

use crate::{exclude::ExclusionResolver, utils};
use glob::Pattern;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Deduplication key for a single walk request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WalkKey {
    path: PathBuf,
    glob: String,
    recursive: bool,
}

/// Collects regular files for the fingerprint.
pub struct FileWalker<'a> {
    base_dir: &'a Path,
    resolver: &'a ExclusionResolver,
    seen: HashSet<WalkKey>,
    collected: HashSet<PathBuf>,
    files: Vec<PathBuf>,
}

impl<'a> FileWalker<'a> {
    pub fn new(base_dir: &'a Path, resolver: &'a ExclusionResolver) -> Self {
        Self {
            base_dir,
            resolver,
            seen: HashSet::new(),
            collected: HashSet::new(),
            files: Vec::new(),
        }
    }

    /// Walks `root` with the given glob, collecting matching regular files.
    ///
    /// Roots are normalized before deduplication; nonexistent, hidden,
    /// unreadable and excluded roots are skipped. A root that is an ancestor
    /// of the project base dir is walked non-recursively, so an input like
    /// `..` cannot pull the whole repository in.
    pub fn walk(&mut self, root: &Path, glob: &str, recursive: bool) {
        let root = if root.is_absolute() {
            utils::normalize_lexically(root)
        } else {
            utils::normalize_lexically(&self.base_dir.join(root))
        };
        let root = match utils::canonicalize(&root) {
            Ok(canonical) => canonical,
            Err(_) => {
                trace!("skipping nonexistent input root \"{}\"", root.display());
                return;
            }
        };

        let recursive = if utils::is_ancestor_of(&root, self.base_dir) {
            trace!("forcing non-recursive walk of ancestor \"{}\"", root.display());
            false
        } else {
            recursive
        };

        let key = WalkKey { path: root.clone(), glob: glob.to_string(), recursive };
        if !self.seen.insert(key) {
            return;
        }
        if utils::is_hidden(&root) || self.resolver.excludes(&root) {
            return;
        }

        if root.is_file() {
            self.emit(root);
            return;
        }

        let matcher = match Pattern::new(glob) {
            Ok(matcher) => matcher,
            Err(err) => {
                warn!("ignoring walk of \"{}\", invalid glob {glob:?}: {err}", root.display());
                return;
            }
        };

        let max_depth = if recursive { usize::MAX } else { 1 };
        let resolver = self.resolver;
        let walk = WalkDir::new(&root)
            .follow_links(true)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(move |entry| {
                entry.depth() == 0
                    || (!utils::is_hidden(entry.path()) && !resolver.excludes(entry.path()))
            });
        for entry in walk {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // unreadable subtree, fingerprint proceeds without it
                    warn!("skipping unreadable input under \"{}\": {err}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            // the glob applies to the filename only
            let matches = entry
                .path()
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| matcher.matches(name))
                .unwrap_or_default();
            if matches {
                self.emit(entry.path().to_path_buf());
            }
        }
    }

    fn emit(&mut self, file: PathBuf) {
        if self.collected.insert(file.clone()) {
            self.files.push(file);
        }
    }

    /// All collected files, ordered by case-insensitive path.
    pub fn into_sorted_files(self) -> Vec<PathBuf> {
        let mut files = self.files;
        files.sort_by(|a, b| utils::cmp_paths_ignore_case(a, b));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CacheConfig,
        host::{ConfigNode, Coordinates, ProjectModel, Session},
    };
    use std::{collections::BTreeMap, fs};

    fn project(base: &Path) -> ProjectModel {
        ProjectModel {
            coordinates: Coordinates::new("g", "a", "1.0"),
            packaging: "jar".into(),
            base_dir: base.to_path_buf(),
            source_dir: base.join("src/main/java"),
            test_source_dir: base.join("src/test/java"),
            resource_dirs: vec![],
            test_resource_dirs: vec![],
            output_dir: base.join("target/classes"),
            test_output_dir: base.join("target/test-classes"),
            build_dir: base.join("target"),
            dependencies: vec![],
            plugins: vec![],
            properties: BTreeMap::new(),
            remote_repositories: vec![],
            effective_model: ConfigNode::new("project"),
        }
    }

    fn walk_all(base: &Path, roots: &[(&str, &str, bool)]) -> Vec<String> {
        let project = project(base);
        let config = CacheConfig::initialize(&Session::default(), None).unwrap();
        let resolver = ExclusionResolver::new(&project, &config);
        let base = utils::canonicalize(base).unwrap();
        let mut walker = FileWalker::new(&base, &resolver);
        for (root, glob, recursive) in roots {
            walker.walk(Path::new(root), glob, *recursive);
        }
        walker
            .into_sorted_files()
            .into_iter()
            .map(|file| utils::relativize(&file, &base))
            .collect()
    }

    #[test]
    fn collects_matching_files_in_case_insensitive_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("src/main/java")).unwrap();
        fs::write(base.join("src/main/java/b.java"), b"b").unwrap();
        fs::write(base.join("src/main/java/A.java"), b"a").unwrap();
        fs::write(base.join("src/main/java/readme.txt"), b"t").unwrap();

        let files = walk_all(base, &[("src", "*.java", true)]);
        assert_eq!(files, vec!["src/main/java/A.java", "src/main/java/b.java"]);
    }

    #[test]
    fn hidden_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("src/.git")).unwrap();
        fs::write(base.join("src/.git/config"), b"x").unwrap();
        fs::write(base.join("src/.hidden.java"), b"x").unwrap();
        fs::write(base.join("src/Visible.java"), b"x").unwrap();

        let files = walk_all(base, &[("src", "*", true)]);
        assert_eq!(files, vec!["src/Visible.java"]);
    }

    #[test]
    fn duplicate_walks_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("src")).unwrap();
        fs::write(base.join("src/One.java"), b"x").unwrap();

        let files = walk_all(base, &[("src", "*", true), ("src", "*", true)]);
        assert_eq!(files, vec!["src/One.java"]);
    }

    #[test]
    fn ancestor_roots_walk_non_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        let root = root.as_path();
        fs::create_dir_all(root.join("module/src")).unwrap();
        fs::create_dir_all(root.join("sibling")).unwrap();
        fs::write(root.join("top.txt"), b"x").unwrap();
        fs::write(root.join("sibling/deep.txt"), b"x").unwrap();
        fs::write(root.join("module/src/In.java"), b"x").unwrap();

        let base = root.join("module");
        let project = project(&base);
        let config = CacheConfig::initialize(&Session::default(), None).unwrap();
        let resolver = ExclusionResolver::new(&project, &config);
        let base = utils::canonicalize(&base).unwrap();
        let mut walker = FileWalker::new(&base, &resolver);
        walker.walk(root, "*", true);
        let files = walker.into_sorted_files();
        // only the ancestor's direct children, not the sibling subtree
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("top.txt"));
    }

    #[test]
    fn file_roots_are_emitted_directly() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("conf")).unwrap();
        fs::write(base.join("conf/app.yaml"), b"x").unwrap();

        let files = walk_all(base, &[("conf/app.yaml", "*", true)]);
        assert_eq!(files, vec!["conf/app.yaml"]);
    }
}
