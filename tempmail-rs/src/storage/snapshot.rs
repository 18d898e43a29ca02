use crate::error::{MailError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::fs;

/// Write a whole-collection JSON snapshot.
///
/// The data goes to a sibling `.tmp` file first and is then renamed over
/// the target, so readers never observe a half-written snapshot.
pub async fn write_snapshot<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            MailError::Storage(format!("Failed to create directory {:?}: {}", parent, e))
        })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).await?;
    fs::rename(&tmp_path, path).await?;

    Ok(())
}

/// Read a JSON snapshot; `Ok(None)` when the file does not exist yet
pub async fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| {
                MailError::Storage(format!("Corrupt snapshot {}: {}", path.display(), e))
            })?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
