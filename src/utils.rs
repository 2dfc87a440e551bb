//! Utility functions

use crate::error::{CacheError, CacheIoError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    cmp::Ordering,
    fs,
    io::Write,
    path::{Component, Path, PathBuf},
};

/// Canonicalize the path, platform-agnostic.
///
/// On windows this will ensure the path only consists of `/` separators.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf, CacheIoError> {
    let path = path.as_ref();
    let res = dunce::canonicalize(path);
    #[cfg(windows)]
    let res = res.map(|p| {
        use path_slash::PathBufExt;
        PathBuf::from(p.to_slash_lossy().as_ref())
    });
    res.map_err(|err| CacheIoError::new(err, path))
}

/// Returns the path rendered with forward slashes regardless of platform.
pub fn to_slash(path: &Path) -> String {
    use path_slash::PathExt;
    path.to_slash_lossy().into_owned()
}

/// Strips `root` from `path` and returns the remainder rendered with forward
/// slashes. Paths outside of `root` are rendered in full.
pub fn relativize(path: &Path, root: &Path) -> String {
    to_slash(path.strip_prefix(root).unwrap_or(path))
}

/// Returns `true` if the file or directory name starts with a `.`.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or_default()
}

/// Returns `true` if `ancestor` is a strict ancestor of `path`.
pub fn is_ancestor_of(ancestor: &Path, path: &Path) -> bool {
    ancestor != path && path.starts_with(ancestor)
}

/// Case-insensitive ordering over paths, applied to their `/`-separated
/// rendering so the order is identical across platforms.
pub fn cmp_paths_ignore_case(a: &Path, b: &Path) -> Ordering {
    let a = to_slash(a);
    let b = to_slash(b);
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(&b))
}

/// Lexically normalizes the path by resolving `.` and `..` components.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Creates the parent directory of the given file path, if it has one.
pub fn create_parent_dir_all(file: impl AsRef<Path>) -> Result<()> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|err| CacheError::io(err, parent))?;
    }
    Ok(())
}

/// Writes `contents` to `<path>.tmp` and renames it into place, so readers
/// never observe a partially written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    create_parent_dir_all(path)?;
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp).map_err(|err| CacheError::io(err, &tmp))?;
    file.write_all(contents).map_err(|err| CacheError::io(err, &tmp))?;
    file.flush().map_err(|err| CacheError::io(err, &tmp))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|err| CacheError::io(err, path))?;
    Ok(())
}

/// Copies `src` into `dest` through a `<dest>.tmp` rename.
pub fn copy_atomic(src: &Path, dest: &Path) -> Result<()> {
    create_parent_dir_all(dest)?;
    let tmp = tmp_path(dest);
    fs::copy(src, &tmp).map_err(|err| CacheError::io(err, src))?;
    fs::rename(&tmp, dest).map_err(|err| CacheError::io(err, dest))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Reads the XML file and deserializes it into the provided type.
pub fn read_xml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|err| CacheError::io(err, path))?;
    quick_xml::de::from_str(&contents).map_err(|err| CacheError::xml(path.display(), err))
}

/// Serializes the provided value to XML and writes it atomically to `path`.
pub fn write_xml_file<T: Serialize>(value: &T, root_tag: &str, path: &Path) -> Result<()> {
    let body = to_xml_string(value, root_tag)?;
    write_atomic(path, body.as_bytes())
}

/// Serializes the provided value to an XML document string.
pub fn to_xml_string<T: Serialize>(value: &T, root_tag: &str) -> Result<String> {
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some(root_tag))
        .map_err(|err| CacheError::xml(root_tag, err))?;
    serializer.indent(' ', 2);
    value.serialize(serializer).map_err(|err| CacheError::xml(root_tag, err))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
}

/// Deserializes a value from an XML document string.
pub fn from_xml_str<T: DeserializeOwned>(what: &str, contents: &str) -> Result<T> {
    quick_xml::de::from_str(contents).map_err(|err| CacheError::xml(what, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_order_is_case_insensitive() {
        let mut paths =
            vec![PathBuf::from("/p/src/B.java"), PathBuf::from("/p/SRC/a.java"), PathBuf::from("/p/src/c.java")];
        paths.sort_by(|a, b| cmp_paths_ignore_case(a, b));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/p/SRC/a.java"),
                PathBuf::from("/p/src/B.java"),
                PathBuf::from("/p/src/c.java")
            ]
        );
    }

    #[test]
    fn lexical_normalization() {
        assert_eq!(normalize_lexically(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_lexically(Path::new("a/./b")), PathBuf::from("a/b"));
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out.txt");
        write_atomic(&file, b"one").unwrap();
        write_atomic(&file, b"two").unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"two");
        assert!(!file.with_file_name("out.txt.tmp").exists());
    }
}
