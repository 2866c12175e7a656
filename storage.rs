//! The storage pipelines: validated streaming writes into the storage root
//! and guarded streaming reads back out.
//!
//! ## Write path
//!
//! secret check → extension allow-list → compression decision → fresh key
//! (when encryption is on) → exclusive create → raw bytes through
//! [compress?, encrypt?] to disk. A failed write removes the partial object.
//!
//! ## Read path
//!
//! guarded name resolution → readability → key reconstruction → disk bytes
//! through [decrypt?, decompress?] back to the caller. The read chain is the
//! exact reverse of the write chain; which transforms apply is recovered from
//! the stored name (`.gz` marker) and the server-wide encryption flag.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::crypto::{CipherKey, DecryptStage, EncryptStage};
use crate::error::ShelterError;
use crate::guard::PathGuard;
use crate::naming::{self, COMPRESSION_SUFFIX};
use crate::transform::{GzipCompress, GzipDecompress, Transform, TransformChain, CHUNK_SIZE};

/// One upload attempt. Both fields are optional because their absence is
/// part of the validation contract, checked in order.
pub struct UploadRequest<R> {
    pub secret: Option<String>,
    pub file: Option<FilePart<R>>,
}

pub struct FilePart<R> {
    /// Filename as submitted by the client. Untrusted.
    pub filename: String,
    /// Extension without the leading dot, as submitted; compared
    /// case-insensitively against the configured sets.
    pub extension: String,
    pub content: R,
}

/// Successful upload result. `key` is present exactly when encryption is
/// enabled; it is returned to the caller and never persisted here.
#[derive(Debug)]
pub struct StoredFile {
    pub name: String,
    pub key: Option<String>,
}

/// Successful retrieval result.
#[derive(Debug)]
pub struct ReadOutcome {
    pub bytes: u64,
    /// Probed from the stored name with the compression marker stripped.
    pub content_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct StoredEntry {
    pub name: String,
    pub size: u64,
}

/// The storage service: immutable configuration plus the canonical root.
/// Safe to share across request handlers; object names never collide, so
/// writers need no coordination.
pub struct Store {
    guard: PathGuard,
    backup_dir: PathBuf,
    secrets: HashSet<String>,
    allowed_extensions: HashSet<String>,
    compressed_extensions: HashSet<String>,
    encrypt: bool,
    backup_keys: bool,
    listing_enabled: bool,
}

impl Store {
    /// Creates the storage root if needed and captures its canonical form.
    pub async fn new(cfg: &Config) -> Result<Self, ShelterError> {
        fs::create_dir_all(&cfg.upload_folder)
            .await
            .map_err(|e| ShelterError::config(format!("creating storage root: {}", e)))?;
        let guard = PathGuard::new(Path::new(&cfg.upload_folder)).await?;
        info!(root = %guard.root().display(), encrypt = cfg.encrypt, "storage ready");

        Ok(Self {
            guard,
            backup_dir: PathBuf::from(&cfg.key_backup_folder),
            secrets: cfg.secrets.iter().cloned().collect(),
            allowed_extensions: lowercase_set(&cfg.allowed_extensions),
            compressed_extensions: lowercase_set(&cfg.compressed_extensions),
            encrypt: cfg.encrypt,
            backup_keys: cfg.backup_keys,
            listing_enabled: cfg.listing_enabled,
        })
    }

    pub fn listing_enabled(&self) -> bool {
        self.listing_enabled
    }

    /// The encode pipeline. Validation failures report specific codes and
    /// touch nothing on disk; failures past validation are opaque to the
    /// caller and leave no partial object behind.
    pub async fn write<R>(&self, request: UploadRequest<R>) -> Result<StoredFile, ShelterError>
    where
        R: AsyncRead + Unpin,
    {
        let secret = request.secret.ok_or(ShelterError::MissingSecret)?;
        if !self.secrets.contains(&secret) {
            return Err(ShelterError::InvalidSecret);
        }
        let file = request.file.ok_or(ShelterError::MissingFile)?;

        let ext = file.extension.to_ascii_lowercase();
        if !self.allowed_extensions.contains(&ext) {
            return Err(ShelterError::UnsupportedExtension(file.extension));
        }
        let compress = self.compressed_extensions.contains(&ext);

        let key = if self.encrypt {
            Some(CipherKey::generate().map_err(|e| {
                error!(error = %e, "key generation failed");
                e
            })?)
        } else {
            None
        };

        let name = naming::generate(&file.filename, &file.extension, compress);
        let path = self.guard.root().join(&name.stored);
        debug!(file = %name.stored, compress, encrypt = self.encrypt, "storing upload");

        if let Err(err) = self
            .write_object(&path, file.content, compress, key.as_ref())
            .await
        {
            error!(file = %name.stored, error = %err, "file saving failed");
            if let Err(cleanup) = fs::remove_file(&path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(file = %name.stored, error = %cleanup, "could not remove partial object");
                }
            }
            return Err(ShelterError::unexpected("file saving failed"));
        }

        let encoded_key = key.as_ref().map(CipherKey::encode);
        if self.backup_keys {
            if let Some(encoded) = encoded_key.clone() {
                let dir = self.backup_dir.clone();
                let id = name.id.clone();
                tokio::spawn(async move {
                    if let Err(err) = backup_key(&dir, &id, &encoded).await {
                        error!(id = %id, error = %err, "key backup failed");
                    }
                });
            }
        }

        info!(file = %name.stored, compressed = compress, "upload stored");
        Ok(StoredFile {
            name: name.stored,
            key: encoded_key,
        })
    }

    async fn write_object<R>(
        &self,
        path: &Path,
        mut content: R,
        compress: bool,
        key: Option<&CipherKey>,
    ) -> Result<(), ShelterError>
    where
        R: AsyncRead + Unpin,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut out = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let mut stages: Vec<Box<dyn Transform>> = Vec::new();
        if compress {
            stages.push(Box::new(GzipCompress::new()));
        }
        if let Some(key) = key {
            stages.push(Box::new(EncryptStage::new(key)));
        }
        let mut chain = TransformChain::new(stages);

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = content.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let produced = chain.update(&buf[..n])?;
            if !produced.is_empty() {
                out.write_all(&produced).await?;
            }
        }
        let tail = chain.finish()?;
        if !tail.is_empty() {
            out.write_all(&tail).await?;
        }
        out.flush().await?;
        Ok(())
    }

    /// The decode pipeline. Streams the reconstructed bytes into `out`.
    pub async fn read<W>(
        &self,
        requested: &str,
        key: Option<&str>,
        out: &mut W,
    ) -> Result<ReadOutcome, ShelterError>
    where
        W: AsyncWrite + Unpin,
    {
        let path = self.guard.resolve(requested).await?;
        let meta = fs::metadata(&path).await.map_err(|_| ShelterError::NotFound)?;
        if !meta.is_file() {
            return Err(ShelterError::NotFound);
        }

        let mut file = fs::File::open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ShelterError::NotFound,
            ErrorKind::PermissionDenied => ShelterError::ReadPermission,
            _ => ShelterError::file_read(e.to_string()),
        })?;

        let compressed = requested.ends_with(COMPRESSION_SUFFIX);
        let content_type = probe_content_type(requested);

        let key = if self.encrypt {
            let supplied = key.ok_or(ShelterError::MalformedKey)?;
            Some(CipherKey::decode(supplied)?)
        } else {
            None
        };

        let mut stages: Vec<Box<dyn Transform>> = Vec::new();
        if let Some(key) = &key {
            stages.push(Box::new(DecryptStage::new(key)));
        }
        if compressed {
            stages.push(Box::new(GzipDecompress::new()));
        }
        let mut chain = TransformChain::new(stages);

        let mut bytes = 0u64;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| ShelterError::file_read(e.to_string()))?;
            if n == 0 {
                break;
            }
            let produced = chain.update(&buf[..n])?;
            if !produced.is_empty() {
                out.write_all(&produced).await?;
                bytes += produced.len() as u64;
            }
        }
        let tail = chain.finish()?;
        if !tail.is_empty() {
            out.write_all(&tail).await?;
            bytes += tail.len() as u64;
        }
        out.flush().await?;

        debug!(file = requested, bytes, compressed, "object served");
        Ok(ReadOutcome {
            bytes,
            content_type,
        })
    }

    /// Enumerates stored objects, sorted by name.
    pub async fn list(&self) -> Result<Vec<StoredEntry>, ShelterError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(self.guard.root()).await?;

        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            entries.push(StoredEntry {
                name,
                size: meta.len(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn lowercase_set(values: &[String]) -> HashSet<String> {
    values.iter().map(|v| v.to_ascii_lowercase()).collect()
}

fn probe_content_type(name: &str) -> Option<&'static str> {
    let stripped = name.strip_suffix(COMPRESSION_SUFFIX).unwrap_or(name);
    mime_guess::from_path(stripped).first_raw()
}

async fn backup_key(dir: &Path, id: &str, encoded: &str) -> Result<(), ShelterError> {
    fs::create_dir_all(dir).await?;
    fs::write(dir.join(format!("{}.txt", id)), encoded.as_bytes()).await?;
    Ok(())
}
