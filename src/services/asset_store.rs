// src/services/asset_store.rs
use crate::errors::PipelineError;
use crate::models::{
    AssetInfo, CampaignImage, ProductAssetCount, StoredFile, is_safe_path_component, product_key,
    validate_product_name,
};
use log::{debug, info};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "bmp"];

pub const IMAGE_CONTENT_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
];

const CREATIVE_EXTENSION: &str = "jpg";

/// Filesystem layout for source assets and generated creatives.
///
/// Source assets live in `<assets>/<product_key>/`, creatives in
/// `<output>/<campaign_id>/<product_key>/`.
#[derive(Debug, Clone)]
pub struct AssetStore {
    assets_dir: PathBuf,
    output_dir: PathBuf,
}

impl AssetStore {
    pub fn new(assets_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub async fn ensure_directories(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.assets_dir).await?;
        fs::create_dir_all(&self.output_dir).await?;
        info!(
            "Asset directories ready: {}, {}",
            self.assets_dir.display(),
            self.output_dir.display()
        );
        Ok(())
    }

    pub fn product_dir(&self, product_name: &str) -> PathBuf {
        self.assets_dir.join(product_key(product_name))
    }

    pub fn campaign_dir(&self, campaign_id: &str) -> PathBuf {
        self.output_dir.join(campaign_id)
    }

    pub fn creative_dir(&self, campaign_id: &str, product_name: &str) -> PathBuf {
        self.campaign_dir(campaign_id).join(product_key(product_name))
    }

    /// Existing source images for a product, sorted by path. A missing
    /// directory simply means there are no assets.
    pub async fn resolve(&self, product_name: &str) -> Vec<PathBuf> {
        let dir = self.product_dir(product_name);
        let assets = match list_files(&dir, &IMAGE_EXTENSIONS).await {
            Ok(assets) => assets,
            Err(e) => {
                debug!("No asset directory for {} ({}): {}", product_name, dir.display(), e);
                Vec::new()
            }
        };

        info!(
            "Asset scan for {}: found {} image files in {}",
            product_name,
            assets.len(),
            dir.display()
        );
        assets
    }

    pub async fn store_upload(
        &self,
        product_name: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredFile, PipelineError> {
        validate_product_name(product_name)?;

        let filename = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| is_safe_path_component(n))
            .ok_or_else(|| PipelineError::Validation(format!("Invalid filename: {:?}", filename)))?;

        let extension = extension_of(Path::new(filename)).ok_or_else(|| {
            PipelineError::Validation(format!("File has no extension: {}", filename))
        })?;
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(PipelineError::Validation(format!(
                "Unsupported file extension .{}; allowed: {}",
                extension,
                IMAGE_EXTENSIONS.join(", ")
            )));
        }

        let content_type = content_type.to_lowercase();
        if !IMAGE_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(PipelineError::Validation(format!(
                "Unsupported content type: {}",
                content_type
            )));
        }

        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("asset");
        let dir = self.product_dir(product_name);
        let path = write_unique(&dir, stem, &extension, data).await?;

        info!("Stored asset for {} at {}", product_name, path.display());

        Ok(StoredFile {
            filename: file_name_of(&path),
            size: data.len() as u64,
            path: path.display().to_string(),
        })
    }

    /// Persists a freshly generated source image where `resolve` will find it.
    pub async fn store_generated(
        &self,
        product_name: &str,
        extension: &str,
        data: &[u8],
    ) -> Result<PathBuf, PipelineError> {
        let key = product_key(product_name);
        let dir = self.assets_dir.join(&key);
        write_unique(&dir, &format!("{}_generated", key), extension, data).await
    }

    pub async fn asset_info(&self) -> Result<AssetInfo, PipelineError> {
        let mut products_with_assets = Vec::new();
        let product_dirs = if fs::try_exists(&self.assets_dir).await? {
            list_dirs(&self.assets_dir).await?
        } else {
            Vec::new()
        };

        for dir in product_dirs {
            let asset_count = list_files(&dir, &IMAGE_EXTENSIONS).await?.len();
            if asset_count > 0 {
                products_with_assets.push(ProductAssetCount {
                    product: file_name_of(&dir),
                    asset_count,
                });
            }
        }

        Ok(AssetInfo {
            assets_directory: self.assets_dir.display().to_string(),
            output_directory: self.output_dir.display().to_string(),
            products_with_assets,
        })
    }

    /// Every creative written for a campaign, grouped by product directory.
    /// Empty when the campaign has no output yet.
    pub async fn campaign_creatives(
        &self,
        campaign_id: &str,
    ) -> Result<BTreeMap<String, Vec<PathBuf>>, PipelineError> {
        let mut creatives = BTreeMap::new();
        let campaign_dir = self.campaign_dir(campaign_id);
        if !fs::try_exists(&campaign_dir).await? {
            return Ok(creatives);
        }

        for product_dir in list_dirs(&campaign_dir).await? {
            let files = list_files(&product_dir, &[CREATIVE_EXTENSION]).await?;
            creatives.insert(file_name_of(&product_dir), files);
        }

        Ok(creatives)
    }

    pub async fn list_campaign_images(
        &self,
        campaign_id: &str,
    ) -> Result<BTreeMap<String, Vec<CampaignImage>>, PipelineError> {
        if !is_safe_path_component(campaign_id)
            || !fs::try_exists(self.campaign_dir(campaign_id)).await?
        {
            return Err(PipelineError::NotFound(format!(
                "Campaign output not found: {}",
                campaign_id
            )));
        }

        let mut images = BTreeMap::new();
        for (product, files) in self.campaign_creatives(campaign_id).await? {
            let mut entries = Vec::with_capacity(files.len());
            for file in files {
                let metadata = fs::metadata(&file).await?;
                entries.push(CampaignImage {
                    filename: file_name_of(&file),
                    aspect_ratio: ratio_from_stem(&file),
                    size: metadata.len(),
                    path: file.display().to_string(),
                });
            }
            images.insert(product, entries);
        }

        Ok(images)
    }

    pub async fn list_campaign_ids(&self) -> Result<Vec<String>, PipelineError> {
        if !fs::try_exists(&self.output_dir).await? {
            return Ok(Vec::new());
        }
        Ok(list_dirs(&self.output_dir)
            .await?
            .iter()
            .map(|d| file_name_of(d))
            .collect())
    }

    pub async fn creative_file(
        &self,
        campaign_id: &str,
        product_dir: &str,
        filename: &str,
    ) -> Result<PathBuf, PipelineError> {
        if ![campaign_id, product_dir, filename]
            .iter()
            .all(|c| is_safe_path_component(c))
        {
            return Err(PipelineError::Validation("Invalid path component".to_string()));
        }

        let path = self
            .campaign_dir(campaign_id)
            .join(product_dir)
            .join(filename);
        if !fs::try_exists(&path).await? {
            return Err(PipelineError::NotFound(format!("Image not found: {}", filename)));
        }
        Ok(path)
    }
}

/// Writes `data` to `<dir>/<stem>.<ext>`, appending `_1`, `_2`, ... to the
/// stem until an unused name is found.
async fn write_unique(
    dir: &Path,
    stem: &str,
    extension: &str,
    data: &[u8],
) -> Result<PathBuf, PipelineError> {
    fs::create_dir_all(dir).await?;

    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}.{}", stem, extension)
        } else {
            format!("{}_{}.{}", stem, attempt, extension)
        };
        let path = dir.join(name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(data).await?;
                file.flush().await?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

async fn list_files(dir: &Path, extensions: &[&str]) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        if extension_of(&path).is_some_and(|ext| extensions.contains(&ext.as_str())) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

async fn list_dirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut dirs = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    Ok(dirs)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `cola_9x16.jpg` -> `9:16`
fn ratio_from_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .map(|r| r.replace('x', ":"))
        .unwrap_or_default()
}
