//! On-disk attachment files referenced by messages.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Public path prefix of every message attachment. Uploaded files live
/// directly in `<root>/uploads/messages/`.
pub const UPLOAD_PREFIX: &str = "/uploads/messages/";

/// Resolves message attachment paths (e.g. `/uploads/messages/a.png`) under
/// the uploads root and removes them once their message is gone.
#[derive(Debug, Clone)]
pub struct AttachmentStorage {
    root: PathBuf,
}

impl AttachmentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds uploaded message files.
    pub fn upload_dir(&self) -> PathBuf {
        self.root.join(UPLOAD_PREFIX.trim_matches('/'))
    }

    /// Public path for a file stored in [`Self::upload_dir`].
    pub fn public_path(file_name: &str) -> String {
        format!("{UPLOAD_PREFIX}{file_name}")
    }

    /// True when `attachment` is `/uploads/messages/<file>` with a single plain
    /// file name after the prefix.
    pub fn is_valid_path(attachment: &str) -> bool {
        let Some(file_name) = attachment.strip_prefix(UPLOAD_PREFIX) else {
            return false;
        };
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return false;
        }

        let mut components = Path::new(file_name).components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }

    /// Map an attachment path onto the filesystem. Anything that is not a
    /// file directly under the upload prefix resolves to `None`.
    pub fn resolve(&self, attachment: &str) -> Option<PathBuf> {
        if !Self::is_valid_path(attachment) {
            return None;
        }
        let file_name = attachment.strip_prefix(UPLOAD_PREFIX)?;
        Some(self.upload_dir().join(file_name))
    }

    /// Delete the files behind `attachments`. Missing files are skipped and
    /// other IO failures are logged; returns the number of files removed.
    pub async fn remove_all(&self, attachments: &[String]) -> usize {
        let mut removed = 0;

        for attachment in attachments {
            let Some(path) = self.resolve(attachment) else {
                warn!(attachment = %attachment, "refusing to remove attachment outside upload directory");
                continue;
            };

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    debug!(path = %path.display(), "removed attachment file");
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove attachment file");
                }
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_joins_under_upload_dir() {
        let storage = AttachmentStorage::new("/srv/parlor");
        assert_eq!(
            storage.resolve("/uploads/messages/a.png"),
            Some(PathBuf::from("/srv/parlor/uploads/messages/a.png"))
        );
        assert_eq!(
            AttachmentStorage::public_path("b.png"),
            "/uploads/messages/b.png"
        );
    }

    #[test]
    fn only_plain_files_under_the_prefix_are_accepted() {
        let storage = AttachmentStorage::new("/srv/parlor");
        for path in [
            "/parlor.db",
            "/parlor.toml",
            "uploads/messages/a.png",
            "/uploads/a.png",
            "/uploads/messages/",
            "/uploads/messages/.",
            "/uploads/messages/..",
            "/uploads/messages/../../etc/passwd",
            "/uploads/messages/nested/a.png",
            "/uploads/messages/..\\parlor.db",
            "/",
            "",
        ] {
            assert!(!AttachmentStorage::is_valid_path(path), "{path} accepted");
            assert_eq!(storage.resolve(path), None, "{path} resolved");
        }
        assert!(AttachmentStorage::is_valid_path("/uploads/messages/cat.2024.png"));
    }

    #[tokio::test]
    async fn remove_all_deletes_existing_and_skips_missing() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("uploads/messages");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.png"), b"png").unwrap();
        std::fs::write(root.path().join("keep.txt"), b"keep").unwrap();

        let storage = AttachmentStorage::new(root.path());
        let removed = storage
            .remove_all(&[
                "/uploads/messages/a.png".to_string(),
                "/uploads/messages/missing.png".to_string(),
                "/../outside.png".to_string(),
                "/keep.txt".to_string(),
            ])
            .await;

        assert_eq!(removed, 1);
        assert!(!dir.join("a.png").exists());
        assert!(root.path().join("keep.txt").exists());
    }
}
