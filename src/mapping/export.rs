use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageFormat;

use crate::models::MapArtifact;

pub fn encode_png(artifact: &MapArtifact) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    artifact
        .image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .with_context(|| format!("failed to encode map for mission {}", artifact.mission_id))?;
    Ok(bytes)
}

/// Writes `<dir>/<device>-<mission>.png` plus a JSON sidecar with the
/// transform metadata, returning the image path.
pub fn save_png(artifact: &MapArtifact, device_id: &str, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create map directory {}", dir.display()))?;

    let stem = format!("{device_id}-{}", artifact.mission_id);
    let image_path = dir.join(format!("{stem}.png"));
    std::fs::write(&image_path, encode_png(artifact)?)
        .with_context(|| format!("failed to write {}", image_path.display()))?;

    let meta_path = dir.join(format!("{stem}.json"));
    let metadata = serde_json::json!({
        "missionId": artifact.mission_id,
        "deviceId": device_id,
        "map": artifact.metadata,
    });
    std::fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("failed to write {}", meta_path.display()))?;

    Ok(image_path)
}
