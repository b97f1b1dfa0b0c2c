//! Image uploads stored on local disk and served statically.
//!
//! Files live at `{root}/{category}/{nanoid}.{ext}` and are addressed by the
//! relative path `{category}/{nanoid}.{ext}`, which is what the database keeps.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use axum::body::Bytes;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use tracing::{debug, warn};

pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const FILE_ID_LEN: usize = 21;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("unsupported file type{}", .0.as_deref().map(|t| format!(": {t}")).unwrap_or_default())]
    UnsupportedType(Option<String>),
    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("empty file")]
    Empty,
    #[error("at most {0} files may be uploaded")]
    TooMany(usize),
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCategory {
    Restaurants,
    Reviews,
    Profiles,
}

impl UploadCategory {
    pub fn dir(self) -> &'static str {
        match self {
            Self::Restaurants => "restaurants",
            Self::Reviews => "reviews",
            Self::Profiles => "profiles",
        }
    }
}

/// A file accepted from a multipart body but not yet written.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub extension: &'static str,
    pub bytes: Bytes,
}

/// Text fields and image files read from a multipart body.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<PendingFile>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// A file written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Public URL under the upload prefix.
    pub url: String,
    /// Path relative to the upload root.
    pub file_path: String,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    url_prefix: String,
    max_bytes: usize,
}

/// Resolve the stored extension for an upload, checking both the file name and the declared MIME type.
pub fn image_extension(file_name: Option<&str>, content_type: Option<&str>) -> Result<&'static str, UploadError> {
    if let Some(ct) = content_type
        && ct != "application/octet-stream"
        && !ct.starts_with("image/")
    {
        return Err(UploadError::UnsupportedType(Some(ct.to_string())));
    }

    let from_name = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let candidate = match from_name {
        Some(ext) => ALLOWED_EXTENSIONS.iter().find(|a| **a == ext).copied(),
        None => content_type
            .and_then(mime_guess::get_mime_extensions_str)
            .and_then(|exts| exts.iter().find(|e| ALLOWED_EXTENSIONS.contains(*e)).copied()),
    };
    let ext = candidate.ok_or_else(|| UploadError::UnsupportedType(file_name.map(String::from)))?;

    // The guessed MIME of the extension must itself be an image type.
    let guessed = mime_guess::from_ext(ext).first_or_octet_stream();
    if guessed.type_() != mime_guess::mime::IMAGE {
        return Err(UploadError::UnsupportedType(Some(guessed.to_string())));
    }
    Ok(ext)
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Read every part of a multipart body. Parts named `file_field` must be
    /// images within the size limit; other parts are kept as text fields.
    pub async fn read_multipart(
        &self,
        multipart: &mut Multipart,
        file_field: &str,
        max_files: usize,
    ) -> Result<MultipartForm, UploadError> {
        let mut form = MultipartForm::default();
        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name != file_field {
                form.fields.insert(name, field.text().await?);
                continue;
            }
            // Browsers send an empty part when no file was chosen.
            if field.file_name().is_some_and(str::is_empty) {
                continue;
            }
            if form.files.len() >= max_files {
                return Err(UploadError::TooMany(max_files));
            }
            let extension = image_extension(field.file_name(), field.content_type())?;

            let mut buf = Vec::new();
            while let Some(chunk) = field.chunk().await? {
                if buf.len() + chunk.len() > self.max_bytes {
                    return Err(UploadError::TooLarge { limit: self.max_bytes });
                }
                buf.extend_from_slice(&chunk);
            }
            if buf.is_empty() {
                return Err(UploadError::Empty);
            }
            form.files.push(PendingFile {
                extension,
                bytes: Bytes::from(buf),
            });
        }
        Ok(form)
    }

    pub async fn save(&self, category: UploadCategory, file: &PendingFile) -> Result<StoredFile, UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if file.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge { limit: self.max_bytes });
        }

        let dir = self.root.join(category.dir());
        tokio::fs::create_dir_all(&dir).await?;
        let name = format!("{}.{}", nanoid::nanoid!(FILE_ID_LEN), file.extension);
        tokio::fs::write(dir.join(&name), &file.bytes).await?;

        let file_path = format!("{}/{name}", category.dir());
        debug!(%file_path, bytes = file.bytes.len(), "stored upload");
        Ok(StoredFile {
            url: format!("{}/{file_path}", self.url_prefix),
            file_path,
        })
    }

    /// Map a public URL issued by this store back to its relative file path.
    pub fn file_path_from_url<'u>(&self, url: &'u str) -> Option<&'u str> {
        url.strip_prefix(self.url_prefix.as_str())?
            .strip_prefix('/')
            .filter(|p| !p.is_empty())
    }

    /// Save several files; on failure, already written ones are removed.
    pub async fn save_all(
        &self,
        category: UploadCategory,
        files: &[PendingFile],
    ) -> Result<Vec<StoredFile>, UploadError> {
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            match self.save(category, file).await {
                Ok(s) => stored.push(s),
                Err(e) => {
                    self.delete_all(stored.iter().map(|s| s.file_path.as_str()).collect::<Vec<&str>>()).await;
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    /// Absolute path for a stored relative path, refusing anything that escapes the root.
    fn resolve(&self, file_path: &str) -> Option<PathBuf> {
        let relative = Path::new(file_path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.root.join(relative))
    }

    /// Remove a stored file. Failures are logged, never returned.
    pub async fn delete(&self, file_path: &str) {
        let Some(path) = self.resolve(file_path) else {
            warn!(file_path, "refusing to delete path outside upload root");
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(file_path, "deleted upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file_path, error = %e, "failed to delete upload"),
        }
    }

    pub async fn delete_all<'a>(&self, file_paths: impl IntoIterator<Item = &'a str>) {
        for path in file_paths {
            self.delete(path).await;
        }
    }
}
