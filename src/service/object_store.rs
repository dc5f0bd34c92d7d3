use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::OpsError;

const MAX_NAME_LEN: usize = 100;

/// Filesystem-backed bucket holding task attachments.
///
/// Objects live at `{root}/{bucket}/{object_key}`; keys are generated here so
/// callers never pass user-controlled paths.
#[derive(Debug, Clone)]
pub struct LocalBucket {
    name: String,
    dir: PathBuf,
}

impl LocalBucket {
    pub fn new(cfg: &StorageConfig) -> Self {
        Self {
            name: cfg.bucket.clone(),
            dir: cfg.root.join(&cfg.bucket),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `{kitchen}/{task}/{uuid}-{sanitized name}`
    pub fn object_key(kitchen_id: i64, task_id: i64, file_name: &str) -> String {
        format!(
            "{kitchen_id}/{task_id}/{}-{}",
            Uuid::new_v4().simple(),
            sanitize_file_name(file_name)
        )
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, OpsError> {
        let key_path = Path::new(key);
        let safe = key_path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe {
            return Err(OpsError::Validation(format!("invalid object key `{key}`")));
        }
        Ok(self.dir.join(key_path))
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), OpsError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!(bucket = %self.name, key, size = bytes.len(), "stored object");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, OpsError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OpsError::NotFound("object")),
            Err(e) => Err(e.into()),
        }
    }

    /// Missing objects are not an error.
    pub async fn delete(&self, key: &str) -> Result<(), OpsError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(bucket = %self.name, key, "object already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    // ASCII only at this point, so byte slicing is safe; keep the tail for the extension
    let cleaned = &cleaned[cleaned.len().saturating_sub(MAX_NAME_LEN)..];
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\temp\\nota fiscal.pdf"), "nota_fiscal.pdf");
        assert_eq!(sanitize_file_name("cardápio.xlsx"), "card_pio.xlsx");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[test]
    fn long_names_keep_their_extension() {
        let long = format!("{}.pdf", "a".repeat(300));
        let cleaned = sanitize_file_name(&long);
        assert_eq!(cleaned.len(), MAX_NAME_LEN);
        assert!(cleaned.ends_with(".pdf"));
    }

    #[test]
    fn object_keys_are_scoped_and_unique() {
        let a = LocalBucket::object_key(3, 9, "foto.jpg");
        let b = LocalBucket::object_key(3, 9, "foto.jpg");
        assert!(a.starts_with("3/9/"));
        assert!(a.ends_with("-foto.jpg"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bucket = LocalBucket::new(&StorageConfig {
            root: dir.path().to_path_buf(),
            bucket: "task-files".into(),
        });
        let key = LocalBucket::object_key(1, 2, "lista.txt");

        bucket.put(&key, b"arroz, feijao").await.expect("put");
        assert_eq!(bucket.get(&key).await.expect("get"), b"arroz, feijao");

        bucket.delete(&key).await.expect("delete");
        assert!(matches!(bucket.get(&key).await, Err(OpsError::NotFound(_))));
        bucket.delete(&key).await.expect("second delete is a no-op");
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bucket = LocalBucket::new(&StorageConfig {
            root: dir.path().to_path_buf(),
            bucket: "task-files".into(),
        });
        assert!(matches!(
            bucket.put("../escape.txt", b"x").await,
            Err(OpsError::Validation(_))
        ));
    }
}
