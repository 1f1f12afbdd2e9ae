use std::path::{Path, PathBuf};

use crawld_core::urls;

use crate::StoreError;

/// Domain-sharded body storage: `<root>/<domain>/<encoded-name>`.
///
/// Writes are best-effort by contract: the caller logs a failure and moves
/// on, it never fails the enclosing transaction over one.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub async fn store(
        &self,
        domain: &str,
        normalized_url: &str,
        content: &str,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(domain);
        // create_dir_all is a no-op when the directory already exists.
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(urls::content_file_name(normalized_url));
        tokio::fs::write(&path, content.as_bytes()).await?;
        Ok(path)
    }
}
