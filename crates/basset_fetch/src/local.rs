//! Reading local asset files.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::FetchError;

/// Reads a local asset, refusing files larger than `max_size`.
pub async fn read_local(path: &Path, max_size: u64) -> Result<Vec<u8>, FetchError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FetchError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut content = Vec::new();
    let read = file.take(max_size.saturating_add(1)).read_to_end(&mut content).await?;
    if read as u64 > max_size {
        return Err(FetchError::TooLarge {
            size: read as u64,
            max: max_size,
        });
    }

    Ok(content)
}
