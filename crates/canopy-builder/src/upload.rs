//! Artifact upload to the object store.
//!
//! The gateway serves a live deployment straight from
//! `__outputs/<deployment_id>/`, so every file under the build output
//! directory is uploaded under that prefix with its path relative to the
//! output root. Upload happens strictly before `LIVE` is published.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions};
use tracing::{debug, info};

use crate::error::{BuildError, BuildResult};

/// Prefix under which all deployment outputs live at the origin.
pub const OUTPUT_PREFIX: &str = "__outputs";

/// Uploads a build output directory to the artifact store.
pub struct ArtifactUploader {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactUploader {
    /// Wrap an object store backend.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload every file under `output_dir`, keyed by its path relative to
    /// that directory. Returns the number of files uploaded.
    pub async fn upload_dir(&self, deployment_id: &str, output_dir: &Path) -> BuildResult<usize> {
        if !output_dir.is_dir() {
            return Err(BuildError::Upload(format!(
                "output directory not found: {}",
                output_dir.display()
            )));
        }

        let files = collect_files(output_dir)?;
        for file in &files {
            let relative = file.strip_prefix(output_dir).map_err(|_| {
                BuildError::Upload(format!("path escapes output dir: {}", file.display()))
            })?;
            let key = object_key(deployment_id, relative);

            let data = tokio::fs::read(file).await?;
            let attributes = Attributes::from_iter([(
                Attribute::ContentType,
                content_type_for(relative),
            )]);
            let options = PutOptions {
                attributes,
                ..Default::default()
            };

            debug!(path = %key, size = data.len(), "uploading artifact");
            let payload = Bytes::from(data);
            match self.store.put_opts(&key, payload.clone().into(), options).await {
                Ok(_) => {}
                // Filesystem backends have nowhere to keep a content type;
                // the bytes still have to land.
                Err(object_store::Error::NotImplemented) => {
                    self.store
                        .put(&key, payload.into())
                        .await
                        .map_err(|e| BuildError::Upload(format!("put {key} failed: {e}")))?;
                }
                Err(e) => {
                    return Err(BuildError::Upload(format!("put {key} failed: {e}")));
                }
            }
        }

        info!(
            deployment_id,
            files = files.len(),
            "artifact upload complete"
        );
        Ok(files.len())
    }
}

impl std::fmt::Debug for ArtifactUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactUploader").finish_non_exhaustive()
    }
}

fn object_key(deployment_id: &str, relative: &Path) -> ObjectPath {
    let rel = relative.to_string_lossy().replace('\\', "/");
    ObjectPath::from(format!("{OUTPUT_PREFIX}/{deployment_id}/{rel}"))
}

/// Recursively collect regular files under `root`, sorted for stable order.
fn collect_files(root: &Path) -> BuildResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Content type by file extension. Unknown extensions are served as opaque
/// bytes.
fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js" | "mjs") => "text/javascript",
        Some("json" | "map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;

    use super::*;

    async fn stored_bytes(store: &InMemory, key: &str) -> Vec<u8> {
        store
            .get(&ObjectPath::from(key))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn uploads_nested_files_under_deployment_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "const x = 1;").unwrap();

        let store = Arc::new(InMemory::new());
        let uploader = ArtifactUploader::new(store.clone());

        let count = uploader.upload_dir("d1", dir.path()).await.unwrap();
        assert_eq!(count, 2);

        assert_eq!(
            stored_bytes(&store, "__outputs/d1/index.html").await,
            b"<h1>hi</h1>"
        );
        assert_eq!(
            stored_bytes(&store, "__outputs/d1/assets/app.js").await,
            b"const x = 1;"
        );
    }

    #[tokio::test]
    async fn missing_output_dir_is_an_upload_error() {
        let store = Arc::new(InMemory::new());
        let uploader = ArtifactUploader::new(store);

        let result = uploader
            .upload_dir("d1", Path::new("/nonexistent/canopy-output"))
            .await;
        assert!(matches!(result, Err(BuildError::Upload(_))));
    }

    #[test]
    fn content_types_follow_extensions() {
        assert_eq!(
            content_type_for(Path::new("index.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_for(Path::new("app.JS")), "text/javascript");
        assert_eq!(
            content_type_for(Path::new("archive.bin")),
            "application/octet-stream"
        );
    }
}
