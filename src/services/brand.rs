// src/services/brand.rs
use crate::errors::PipelineError;
use crate::models::ComplianceVerdict;
use crate::services::asset_store::AssetStore;
use image::GenericImageView;
use log::{error, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DominantColor {
    Red,
    Green,
    Blue,
    Yellow,
    Other,
}

impl fmt::Display for DominantColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DominantColor::Red => "Red",
            DominantColor::Green => "Green",
            DominantColor::Blue => "Blue",
            DominantColor::Yellow => "Yellow",
            DominantColor::Other => "Other",
        };
        f.write_str(name)
    }
}

pub fn classify_rgb(r: u8, g: u8, b: u8) -> DominantColor {
    if r > 200 && g < 100 && b < 100 {
        DominantColor::Red
    } else if g > 200 && r < 100 && b < 100 {
        DominantColor::Green
    } else if b > 200 && r < 100 && g < 100 {
        DominantColor::Blue
    } else if r > 200 && g > 200 && b < 100 {
        DominantColor::Yellow
    } else {
        DominantColor::Other
    }
}

/// Center pixel of the image as a stand-in for its background color.
/// `None` when the file cannot be decoded.
pub fn dominant_color(path: &Path) -> Option<DominantColor> {
    match image::open(path) {
        Ok(img) => {
            let (width, height) = img.dimensions();
            let pixel = img.get_pixel(width / 2, height / 2);
            let [r, g, b, _] = pixel.0;
            Some(classify_rgb(r, g, b))
        }
        Err(e) => {
            error!("Failed to analyze image color for {}: {}", path.display(), e);
            None
        }
    }
}

/// Rejects a campaign when any of its creatives shows the disallowed
/// background color.
#[derive(Debug, Clone)]
pub struct BrandComplianceChecker {
    store: AssetStore,
    disallowed: DominantColor,
}

impl BrandComplianceChecker {
    pub fn new(store: AssetStore) -> Self {
        Self {
            store,
            disallowed: DominantColor::Red,
        }
    }

    pub async fn evaluate(&self, campaign_id: &str) -> Result<ComplianceVerdict, PipelineError> {
        let campaign_dir = self.store.campaign_dir(campaign_id);
        let images: Vec<PathBuf> = self
            .store
            .campaign_creatives(campaign_id)
            .await?
            .into_values()
            .flatten()
            .collect();

        if images.is_empty() {
            return Ok(ComplianceVerdict::compliant("No images to check"));
        }

        let disallowed = self.disallowed;
        let offending = tokio::task::spawn_blocking(move || {
            images
                .into_iter()
                .filter(|path| dominant_color(path) == Some(disallowed))
                .map(|path| {
                    path.strip_prefix(&campaign_dir)
                        .unwrap_or(path.as_path())
                        .display()
                        .to_string()
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| PipelineError::Composition(format!("Brand check task failed: {}", e)))?;

        if !offending.is_empty() {
            let reason = format!(
                "Brand compliance failure: {} background detected in images: {}",
                self.disallowed,
                offending.join(", ")
            );
            warn!("Campaign {} failed brand compliance: {}", campaign_id, reason);
            return Ok(ComplianceVerdict::violation(reason, offending));
        }

        info!("Campaign {} passed brand compliance checks", campaign_id);
        Ok(ComplianceVerdict::compliant(format!(
            "Brand compliance check passed - no {} backgrounds detected",
            self.disallowed.to_string().to_lowercase()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_jpeg(path: &Path, color: [u8; 3]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(64, 64, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify_rgb(230, 20, 30), DominantColor::Red);
        assert_eq!(classify_rgb(20, 230, 30), DominantColor::Green);
        assert_eq!(classify_rgb(20, 30, 230), DominantColor::Blue);
        assert_eq!(classify_rgb(230, 230, 30), DominantColor::Yellow);
        assert_eq!(classify_rgb(200, 20, 20), DominantColor::Other);
        assert_eq!(classify_rgb(255, 255, 255), DominantColor::Other);
    }

    #[tokio::test]
    async fn test_no_images_is_compliant() {
        let dir = TempDir::new().unwrap();
        let checker = BrandComplianceChecker::new(AssetStore::new(
            dir.path().join("assets"),
            dir.path().join("output"),
        ));
        let verdict = checker.evaluate("nothing").await.unwrap();
        assert!(verdict.is_compliant);
        assert_eq!(verdict.reason, "No images to check");
    }

    #[tokio::test]
    async fn test_red_creative_fails_campaign() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path().join("assets"), dir.path().join("output"));
        write_jpeg(&store.creative_dir("c1", "Cola").join("cola_1x1.jpg"), [240, 10, 10]);
        write_jpeg(&store.creative_dir("c1", "Tea").join("tea_1x1.jpg"), [10, 10, 240]);

        let verdict = BrandComplianceChecker::new(store).evaluate("c1").await.unwrap();
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.flagged.len(), 1);
        assert!(verdict.flagged[0].ends_with("cola_1x1.jpg"));
        assert!(verdict.reason.starts_with("Brand compliance failure: Red background"));
    }

    #[tokio::test]
    async fn test_non_red_creatives_pass() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path().join("assets"), dir.path().join("output"));
        write_jpeg(&store.creative_dir("c2", "Tea").join("tea_1x1.jpg"), [10, 200, 10]);
        std::fs::write(store.creative_dir("c2", "Tea").join("broken.jpg"), b"nope").unwrap();

        let verdict = BrandComplianceChecker::new(store).evaluate("c2").await.unwrap();
        assert!(verdict.is_compliant);
    }
}
