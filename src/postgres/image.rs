//! Make sure the database image is available locally.

use crate::postgres::error::{PostgresError, Result};
use crate::postgres::runtime::ContainerRuntime;

/// Inspect `image` locally and pull it if it is missing.
///
/// A single pull attempt is made. Inspect failures other than "not found"
/// are returned without pulling.
pub async fn ensure_image(runtime: &dyn ContainerRuntime, image: &str) -> Result<()> {
    let exists = runtime
        .image_exists(image)
        .await
        .map_err(|source| PostgresError::ImageInspect {
            image: image.to_string(),
            source,
        })?;

    if exists {
        tracing::debug!("Image '{}' exists locally", image);
        return Ok(());
    }

    tracing::info!("Pulling image: {}", image);
    runtime
        .pull_image(image)
        .await
        .map_err(|source| PostgresError::ImagePull {
            image: image.to_string(),
            source,
        })?;
    tracing::info!("Pulled image: {}", image);

    Ok(())
}
