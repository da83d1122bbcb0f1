use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

/// A file written (or found already present) in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub path: PathBuf,
    pub deduplicated: bool,
}

/// Content-addressed files under `root/<namespace>/<sha256>.<ext>`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    pub fn path_for(&self, namespace: &str, content_hash: &str, extension: &str) -> PathBuf {
        let extension = match extension.trim().trim_start_matches('.') {
            "" => "bin",
            ext => ext,
        };
        self.root
            .join(namespace)
            .join(format!("{content_hash}.{extension}"))
    }

    /// Writes through a uniquely named temp file so readers never see a partial image.
    pub async fn store_bytes(
        &self,
        namespace: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let content_hash = Self::content_hash(bytes);
        let path = self.path_for(namespace, &content_hash, extension);
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;

        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(StoredArtifact {
                content_hash,
                path,
                deduplicated: true,
            });
        }

        let staging = dir.join(format!(".{}.partial", Uuid::new_v4()));
        fs::write(&staging, bytes)
            .await
            .with_context(|| format!("writing {}", staging.display()))?;
        if let Err(err) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err).with_context(|| format!("moving artifact into {}", path.display()));
        }

        Ok(StoredArtifact {
            content_hash,
            path,
            deduplicated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            ArtifactStore::content_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn identical_logos_share_one_file() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let first = store.store_bytes("reference-logos", "png", b"\x89PNG acme").await.unwrap();
        let second = store.store_bytes("reference-logos", ".png", b"\x89PNG acme").await.unwrap();

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.path, second.path);
        assert!(first.path.starts_with(dir.path().join("reference-logos")));
        assert_eq!(std::fs::read(&first.path).unwrap(), b"\x89PNG acme");

        let leftovers = std::fs::read_dir(dir.path().join("reference-logos"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn blank_extension_defaults_to_bin() {
        let store = ArtifactStore::new("/data");
        assert_eq!(store.path_for("logos", "abc", " "), PathBuf::from("/data/logos/abc.bin"));
    }
}
