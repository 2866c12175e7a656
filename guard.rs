//! Safe resolution of requested names against the storage root.
//!
//! The canonical root is computed once at construction and carried in the
//! value; every lookup canonicalizes the joined candidate and requires
//! component-wise containment. That covers `..` segments, symlinks pointing
//! out of the root, and absolute names (which `Path::join` would otherwise
//! let replace the root entirely).

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use crate::error::ShelterError;

pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Captures the canonical form of `root`. The directory must exist.
    pub async fn new(root: &Path) -> Result<Self, ShelterError> {
        let root = fs::canonicalize(root)
            .await
            .map_err(|e| ShelterError::config(format!("canonicalizing storage root: {}", e)))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a requested relative name to an absolute path inside the
    /// root. Missing files and escaping names are both `NotFound`-shaped on
    /// the wire; escapes additionally log a warning with the offending name.
    pub async fn resolve(&self, requested: &str) -> Result<PathBuf, ShelterError> {
        let candidate = self.root.join(requested);
        let resolved = fs::canonicalize(&candidate)
            .await
            .map_err(|_| ShelterError::NotFound)?;

        // Component-wise containment: a sibling like `uploads2` shares the
        // string prefix of `uploads` but fails here.
        if !resolved.starts_with(&self.root) {
            warn!(requested, resolved = %resolved.display(), "requested name escapes the storage root");
            return Err(ShelterError::Traversal);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn guard_in(tmp: &tempfile::TempDir) -> PathGuard {
        let root = tmp.path().join("uploads");
        fs::create_dir_all(&root).await.unwrap();
        PathGuard::new(&root).await.unwrap()
    }

    #[tokio::test]
    async fn resolves_files_inside_the_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let guard = guard_in(&tmp).await;
        fs::write(guard.root().join("a.txt"), b"x").await.unwrap();

        let resolved = guard.resolve("a.txt").await.unwrap();
        assert!(resolved.starts_with(guard.root()));
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let guard = guard_in(&tmp).await;
        assert!(matches!(
            guard.resolve("nope.txt").await,
            Err(ShelterError::NotFound)
        ));
    }

    #[tokio::test]
    async fn traversal_segments_cannot_escape() {
        let tmp = tempfile::TempDir::new().unwrap();
        let guard = guard_in(&tmp).await;
        // A real file outside the root that traversal would reach.
        fs::write(tmp.path().join("secret.txt"), b"x").await.unwrap();

        let err = guard.resolve("../secret.txt").await.unwrap_err();
        assert!(matches!(err, ShelterError::Traversal));
        assert_eq!(err.code(), "FILE_DOES_NOT_EXIST");
    }

    #[tokio::test]
    async fn absolute_names_cannot_replace_the_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let guard = guard_in(&tmp).await;
        let outside = tmp.path().join("outside.txt");
        fs::write(&outside, b"x").await.unwrap();

        let err = guard
            .resolve(outside.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ShelterError::Traversal));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_out_of_the_root_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let guard = guard_in(&tmp).await;
        let target = tmp.path().join("outside.txt");
        fs::write(&target, b"x").await.unwrap();
        tokio::fs::symlink(&target, guard.root().join("alias.txt"))
            .await
            .unwrap();

        assert!(matches!(
            guard.resolve("alias.txt").await,
            Err(ShelterError::Traversal)
        ));
    }
}
