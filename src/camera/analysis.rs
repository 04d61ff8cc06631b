use anyhow::{Context, Result};
use std::path::Path;

/// Mean of the raw bytes of a luma plane. An empty plane reads as 0.
pub fn average_luminosity(plane: &[u8]) -> f64 {
    if plane.is_empty() {
        return 0.0;
    }
    let sum: u64 = plane.iter().map(|&byte| byte as u64).sum();
    sum as f64 / plane.len() as f64
}

/// Decodes a saved photo, reduces it to 8-bit luma and averages it.
pub fn analyze_file(path: &Path) -> Result<f64> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let luma = image.to_luma8();
    Ok(average_luminosity(luma.as_raw()))
}
