use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::error::CoreError;

/// Largest accepted upload.
pub const MAX_BLOB_SIZE: usize = 10 * 1024 * 1024;

/// Sidecar suffix holding a blob's content type.
const CONTENT_TYPE_SUFFIX: &str = ".content-type";

/// On-disk blob storage. A blob at `profile_images/u1.jpg` lives at
/// `{dir}/profile_images/u1.jpg` and is served at
/// `{public_base_url}/files/profile_images/u1.jpg`.
pub struct BlobStore {
    dir: PathBuf,
    public_base_url: String,
}

impl BlobStore {
    pub async fn new(dir: PathBuf, public_base_url: impl Into<String>) -> Result<Self, CoreError> {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoreError::Blob(format!("create {}: {}", dir.display(), e)))?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Map a blob path onto the storage directory, refusing anything that
    /// could escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, CoreError> {
        let clean = !path.ends_with(CONTENT_TYPE_SUFFIX)
            && path.split('/').all(|segment| {
                !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\')
            });
        if !clean {
            return Err(CoreError::InvalidInput(format!("bad blob path {:?}", path)));
        }
        Ok(self.dir.join(path))
    }

    pub fn download_url(&self, path: &str) -> String {
        format!("{}/files/{}", self.public_base_url, path)
    }

    /// Store `bytes` at `path`, replacing any previous blob. Returns the
    /// download URL.
    pub async fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::InvalidInput("empty upload".into()));
        }
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(CoreError::InvalidInput(format!(
                "upload of {} bytes exceeds {} byte limit",
                bytes.len(),
                MAX_BLOB_SIZE
            )));
        }

        let file_path = self.resolve(path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Blob(format!("create {}: {}", parent.display(), e)))?;
        }

        fs::write(&file_path, bytes)
            .await
            .map_err(|e| CoreError::Blob(format!("write {}: {}", file_path.display(), e)))?;
        fs::write(sidecar(&file_path), content_type)
            .await
            .map_err(|e| CoreError::Blob(format!("write {}: {}", file_path.display(), e)))?;

        info!("Stored blob {} ({} bytes, {})", path, bytes.len(), content_type);
        Ok(self.download_url(path))
    }

    /// Read a blob and its content type.
    pub async fn read(&self, path: &str) -> Result<(Vec<u8>, String), CoreError> {
        let file_path = self.resolve(path)?;
        let bytes = match fs::read(&file_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::NotFound(format!("blob {}", path)));
            }
            Err(e) => return Err(CoreError::Blob(format!("read {}: {}", file_path.display(), e))),
        };
        let content_type = fs::read_to_string(sidecar(&file_path))
            .await
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Ok((bytes, content_type))
    }
}

fn sidecar(file_path: &Path) -> PathBuf {
    let mut name = file_path.as_os_str().to_owned();
    name.push(CONTENT_TYPE_SUFFIX);
    PathBuf::from(name)
}
