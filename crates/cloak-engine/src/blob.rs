use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Top-level prefixes inside the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    VoiceNotes,
    Media,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::VoiceNotes => "voice-notes",
            Bucket::Media => "media",
        }
    }
}

/// Content-addressed blob storage on local disk.
///
/// Each object is stored as a flat file at `{dir}/{bucket}/{sha256}.{ext}`
/// and served back under `{public_base_url}/blobs/{key}`.
pub struct BlobStore {
    dir: PathBuf,
    public_base_url: String,
}

impl BlobStore {
    pub async fn new(dir: PathBuf, public_base_url: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Key for `bytes` in `bucket`: the SHA-256 of the content plus extension.
    pub fn key_for(bucket: Bucket, bytes: &[u8], extension: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{}/{}.{}", bucket.as_str(), hex::encode(hasher.finalize()), extension)
    }

    /// Store `bytes` under `key` and return its public URL. Writing the same
    /// key twice keeps the first copy.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        validate_key(key)?;
        let path = self.dir.join(key);

        if fs::try_exists(&path).await? {
            debug!("Blob {} already stored", key);
            return self.get_url(key);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a temp name first so a reader never sees a partial file
        let tmp = path.with_extension("part");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;

        debug!("Stored blob {} ({} bytes)", key, bytes.len());
        self.get_url(key)
    }

    pub fn get_url(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        Ok(format!("{}/blobs/{}", self.public_base_url, key))
    }
}

/// Keys are `/`-separated segments of `[A-Za-z0-9._-]`, with no empty,
/// `.` or `..` segments.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > 512 {
        bail!("invalid blob key length");
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            bail!("invalid blob key '{}'", key);
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            bail!("invalid blob key '{}'", key);
        }
    }
    Ok(())
}
