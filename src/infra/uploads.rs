//! Filesystem storage for post images.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

/// Directory under the upload root that post images are written to.
pub const POST_IMAGE_DIR: &str = "posts";

const COLLISION_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("could not find a free file name for `{0}`")]
    NameExhausted(String),
}

impl UploadStorageError {
    pub fn is_not_found(&self) -> bool {
        match self {
            UploadStorageError::InvalidPath => true,
            UploadStorageError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Storage rooted at `root`, created if missing.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Write a post image and return its path relative to the root.
    ///
    /// The file keeps its sanitized original name (`posts/cat.png`). When that
    /// name is taken a short random suffix is appended to the stem.
    pub async fn store_post_image(
        &self,
        original_name: &str,
        data: &Bytes,
    ) -> Result<String, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }

        let (stem, extension) = sanitize_filename(original_name);
        fs::create_dir_all(self.root.join(POST_IMAGE_DIR)).await?;

        for attempt in 0..COLLISION_ATTEMPTS {
            let stored_path = candidate_path(&stem, extension.as_deref(), attempt > 0);
            let absolute = self.resolve(&stored_path)?;

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&absolute)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            };

            if let Err(err) = write_all(&mut file, data).await {
                drop(file);
                let _ = fs::remove_file(&absolute).await;
                return Err(err.into());
            }

            debug!(
                target = "folio::infra::uploads",
                stored_path = %stored_path,
                size = data.len(),
                "stored post image"
            );
            return Ok(stored_path);
        }

        Err(UploadStorageError::NameExhausted(original_name.to_string()))
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove a stored file. Missing files count as removed.
    pub async fn delete(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    /// Map a stored path onto the filesystem, refusing anything that escapes the root.
    pub fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

async fn write_all(file: &mut fs::File, data: &Bytes) -> Result<(), std::io::Error> {
    file.write_all(data).await?;
    file.flush().await
}

fn candidate_path(stem: &str, extension: Option<&str>, suffixed: bool) -> String {
    let stem = if suffixed {
        let token = Uuid::new_v4().simple().to_string();
        format!("{stem}_{}", &token[..7])
    } else {
        stem.to_string()
    };

    match extension {
        Some(ext) => format!("{POST_IMAGE_DIR}/{stem}.{ext}"),
        None => format!("{POST_IMAGE_DIR}/{stem}"),
    }
}

fn sanitize_filename(original: &str) -> (String, Option<String>) {
    // Browsers on some platforms send the full client path.
    let name = original.rsplit(|ch: char| ch == '/' || ch == '\\').next().unwrap_or(original);
    let cleaned: String = name
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.'))
        .collect();

    let (stem, extension) = match cleaned.rsplit_once('.') {
        Some((stem, extension)) if !stem.trim_matches('.').is_empty() => (stem, Some(extension)),
        _ => (cleaned.as_str(), None),
    };

    let stem = stem.trim_matches('.');
    let stem = if stem.is_empty() { "upload" } else { stem };
    let extension = extension.filter(|value| !value.is_empty()).map(str::to_string);

    (stem.to_string(), extension)
}
