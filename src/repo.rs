// src/repo.rs

//! Repository access
//!
//! git is the only VCS that is supported. The adapter exposes exactly what
//! the rest of the system needs: ref resolution, tree listing with content
//! hashes, blob reads and ignore checks. Content hashes are MD5 of the raw
//! blob bytes so that they can be compared against hashes reported by
//! coverage tools.

use crate::db::blob::hash_bytes;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct Repository {
    inner: git2::Repository,
}

impl Repository {
    /// Opens the repository containing `path` (which may be the root or any
    /// nested directory).
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = git2::Repository::discover(path)?;
        Ok(Self { inner })
    }

    /// Absolute path of the `.git` directory, where the database and the
    /// configuration live.
    pub fn git_path(&self) -> PathBuf {
        self.inner.path().to_path_buf()
    }

    /// Absolute path of the working directory.
    pub fn worktree_path(&self) -> Result<PathBuf> {
        self.inner
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::not_found("Repository has no working directory".to_string()))
    }

    /// Short name `HEAD` is currently at (branch name, or `HEAD` when
    /// detached).
    pub fn current_ref(&self) -> Result<String> {
        let head = self.inner.head()?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    /// Resolves a symbolic reference into the commit object id it points at.
    pub fn resolve_ref(&self, reference: &str) -> Result<String> {
        let object = self.inner.revparse_single(reference)?;
        let commit = object.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Whether the repository ignores `path`.
    pub fn path_is_ignored(&self, path: &str) -> Result<bool> {
        Ok(self.inner.status_should_ignore(Path::new(path))?)
    }

    /// Lists every file of the tree at `reference` together with the MD5 of
    /// its contents.
    pub fn list_files(&self, reference: &str) -> Result<HashMap<String, String>> {
        let tree = self.ref_tree(reference)?;

        let mut files = HashMap::new();
        let mut walk_error: Option<git2::Error> = None;
        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() != Some(git2::ObjectType::Blob) {
                return git2::TreeWalkResult::Ok;
            }
            let name = match entry.name() {
                Some(name) => name,
                None => return git2::TreeWalkResult::Ok,
            };
            match self.inner.find_blob(entry.id()) {
                Ok(blob) => {
                    files.insert(format!("{dir}{name}"), hash_bytes(blob.content()));
                    git2::TreeWalkResult::Ok
                }
                Err(err) => {
                    walk_error = Some(err);
                    git2::TreeWalkResult::Abort
                }
            }
        })?;

        if let Some(err) = walk_error {
            return Err(err.into());
        }
        Ok(files)
    }

    /// Reads the contents of `path` in the tree at `reference`.
    pub fn read_file(&self, reference: &str, path: &str) -> Result<String> {
        let tree = self.ref_tree(reference)?;
        let entry = tree
            .get_path(Path::new(path))
            .map_err(|_| Error::not_found(format!("No file {path} at {reference}")))?;
        let object = entry.to_object(&self.inner)?;
        let blob = object
            .peel_to_blob()
            .map_err(|_| Error::not_found(format!("Not a file: {path} at {reference}")))?;
        Ok(String::from_utf8_lossy(blob.content()).into_owned())
    }

    fn ref_tree(&self, reference: &str) -> Result<git2::Tree<'_>> {
        let object = self.inner.revparse_single(reference)?;
        let commit = object.peel_to_commit()?;
        Ok(commit.tree()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Creates a repository with one commit containing `files`.
    pub(crate) fn make_test_repo(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();

        for (path, contents) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, contents).unwrap();
        }

        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = git2::Signature::now("test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
            .unwrap();

        dir
    }

    #[test]
    fn test_head_resolution_and_listing() {
        let dir = make_test_repo(&[("a.c", "int main() {}\n"), ("src/b.c", "void f();\n")]);
        let repo = Repository::discover(dir.path()).unwrap();

        let head = repo.resolve_ref("HEAD").unwrap();
        assert_eq!(head.len(), 40);

        let files = repo.list_files(&head).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files["a.c"], hash_bytes(b"int main() {}\n"));
        assert!(files.contains_key("src/b.c"));
    }

    #[test]
    fn test_read_file_at_ref() {
        let dir = make_test_repo(&[("a.c", "contents\n")]);
        let repo = Repository::discover(dir.path()).unwrap();

        let head = repo.resolve_ref("HEAD").unwrap();
        assert_eq!(repo.read_file(&head, "a.c").unwrap(), "contents\n");
        assert!(repo.read_file(&head, "missing.c").is_err());
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let dir = make_test_repo(&[("sub/dir/file.c", "x\n")]);
        let repo = Repository::discover(dir.path().join("sub/dir")).unwrap();
        assert_eq!(
            repo.worktree_path().unwrap().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_ignored_paths() {
        let dir = make_test_repo(&[(".gitignore", "*.o\n"), ("a.c", "x\n")]);
        let repo = Repository::discover(dir.path()).unwrap();

        assert!(repo.path_is_ignored("build.o").unwrap());
        assert!(!repo.path_is_ignored("a.c").unwrap());
    }
}
