// src/services/image_generator.rs
use crate::errors::PipelineError;
use crate::services::asset_store::AssetStore;
use crate::services::typography::BitmapFont;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat, Rgb, RgbImage};
use log::{debug, error, info};
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Produces raw encoded bytes for a new product source image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        product_name: &str,
        product_description: &str,
        aspect_ratio: &str,
    ) -> Result<Bytes, PipelineError>;

    fn name(&self) -> &str;
}

const PLACEHOLDER_SIZE: u32 = 1024;

const PLACEHOLDER_PALETTE: [[u8; 3]; 6] = [
    [41, 98, 255],
    [46, 160, 67],
    [250, 204, 21],
    [20, 150, 160],
    [120, 80, 190],
    [90, 100, 115],
];

/// Solid canvas with the product name on it. No network involved.
pub struct PlaceholderGenerator;

impl PlaceholderGenerator {
    pub fn color_for(product_name: &str) -> Rgb<u8> {
        let index = product_name.bytes().map(|b| b as usize).sum::<usize>() % PLACEHOLDER_PALETTE.len();
        Rgb(PLACEHOLDER_PALETTE[index])
    }

    fn render(product_name: &str) -> Result<Vec<u8>, PipelineError> {
        let mut canvas =
            RgbImage::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, Self::color_for(product_name));

        let font = BitmapFont::with_pixel_size(PLACEHOLDER_SIZE / 16);
        font.draw_wrapped(
            &mut canvas,
            40,
            PLACEHOLDER_SIZE / 6,
            PLACEHOLDER_SIZE - 80,
            &product_name.to_uppercase(),
            Rgb([255, 255, 255]),
        );

        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, 90).encode(
            canvas.as_raw(),
            PLACEHOLDER_SIZE,
            PLACEHOLDER_SIZE,
            ColorType::Rgb8,
        )?;
        Ok(output)
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderGenerator {
    async fn generate(
        &self,
        product_name: &str,
        _product_description: &str,
        _aspect_ratio: &str,
    ) -> Result<Bytes, PipelineError> {
        let name = product_name.to_string();
        let data = tokio::task::spawn_blocking(move || Self::render(&name))
            .await
            .map_err(|e| PipelineError::GenerationFailed(format!("Placeholder task failed: {}", e)))??;
        Ok(Bytes::from(data))
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}

/// Text-to-image through the Replicate predictions API.
pub struct ReplicateGenerator {
    api_token: String,
    model: String,
    client: Client,
    api_timeout: Duration,
    download_timeout: Duration,
}

impl ReplicateGenerator {
    pub fn new(
        api_token: String,
        model: String,
        api_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            api_token,
            model,
            client: Client::new(),
            api_timeout,
            download_timeout,
        }
    }

    pub fn prompt(product_name: &str, product_description: &str) -> String {
        format!(
            "Professional high-quality product photography of {}. {}. Clean white background, \
             professional studio lighting, commercial photography, 4K resolution, product catalog style",
            product_name, product_description
        )
    }

    async fn request_image_url(
        &self,
        product_name: &str,
        product_description: &str,
        aspect_ratio: &str,
    ) -> Result<String, PipelineError> {
        let response = self
            .client
            .post(format!(
                "https://api.replicate.com/v1/models/{}/predictions",
                self.model
            ))
            .timeout(self.api_timeout)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Prefer", "wait")
            .json(&json!({
                "input": {
                    "prompt": Self::prompt(product_name, product_description),
                    "aspect_ratio": aspect_ratio,
                    "output_format": "jpg",
                    "output_quality": 90,
                    "num_inference_steps": 28
                }
            }))
            .send()
            .await
            .map_err(|e| {
                PipelineError::GenerationFailed(format!("Replicate request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::GenerationFailed(format!(
                "Replicate error ({}): {}",
                status, error_text
            )));
        }

        let prediction: serde_json::Value = response.json().await.map_err(|e| {
            PipelineError::GenerationFailed(format!("Failed to parse Replicate response: {}", e))
        })?;

        // `Prefer: wait` can return before the model finishes; poll the rest
        // of the way inside the same API timeout.
        tokio::time::timeout(self.api_timeout, self.await_prediction(prediction))
            .await
            .map_err(|_| {
                PipelineError::GenerationFailed(format!(
                    "Replicate prediction for {} did not finish within {:?}",
                    product_name, self.api_timeout
                ))
            })?
    }

    async fn await_prediction(
        &self,
        mut prediction: serde_json::Value,
    ) -> Result<String, PipelineError> {
        loop {
            let poll_url = match prediction_state(&prediction) {
                PredictionState::Ready(url) => return Ok(url),
                PredictionState::Failed(message) => {
                    return Err(PipelineError::GenerationFailed(message));
                }
                PredictionState::Pending(poll_url) => poll_url,
            };

            debug!("Replicate prediction still running, polling {}", poll_url);
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = self
                .client
                .get(&poll_url)
                .header("Authorization", format!("Bearer {}", self.api_token))
                .send()
                .await
                .map_err(|e| {
                    PipelineError::GenerationFailed(format!("Replicate poll failed: {}", e))
                })?;

            if !response.status().is_success() {
                return Err(PipelineError::GenerationFailed(format!(
                    "Replicate poll returned {}",
                    response.status()
                )));
            }

            prediction = response.json().await.map_err(|e| {
                PipelineError::GenerationFailed(format!(
                    "Failed to parse Replicate response: {}",
                    e
                ))
            })?;
        }
    }

    async fn download(&self, url: &str) -> Result<Bytes, PipelineError> {
        if let Some(encoded) = url.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
            let data = general_purpose::STANDARD.decode(encoded.1).map_err(|e| {
                PipelineError::GenerationFailed(format!("Failed to decode image: {}", e))
            })?;
            return Ok(Bytes::from(data));
        }

        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| PipelineError::GenerationFailed(format!("Image download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::GenerationFailed(format!(
                "Image download returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| PipelineError::GenerationFailed(format!("Image download failed: {}", e)))
    }
}

#[async_trait]
impl ImageGenerator for ReplicateGenerator {
    async fn generate(
        &self,
        product_name: &str,
        product_description: &str,
        aspect_ratio: &str,
    ) -> Result<Bytes, PipelineError> {
        let url = self
            .request_image_url(product_name, product_description, aspect_ratio)
            .await?;
        info!("Generated image with Replicate for {}", product_name);
        self.download(&url).await
    }

    fn name(&self) -> &str {
        "replicate"
    }
}

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq, Eq)]
enum PredictionState {
    Ready(String),
    Pending(String),
    Failed(String),
}

fn prediction_state(prediction: &serde_json::Value) -> PredictionState {
    let status = prediction["status"].as_str();
    match status {
        Some("failed") | Some("canceled") => {
            let reason = prediction["error"].as_str().unwrap_or("no error given");
            return PredictionState::Failed(format!(
                "Replicate prediction {}: {}",
                status.unwrap_or_default(),
                reason
            ));
        }
        Some("starting") | Some("processing") => {
            return match prediction["urls"]["get"].as_str() {
                Some(url) => PredictionState::Pending(url.to_string()),
                None => PredictionState::Failed(
                    "Replicate prediction is still running but has no poll URL".to_string(),
                ),
            };
        }
        _ => {}
    }

    match image_url_from_prediction(prediction) {
        Some(url) => PredictionState::Ready(url),
        None => PredictionState::Failed("No valid image URL returned from Replicate".to_string()),
    }
}

/// Replicate returns either a single URL or a list of URLs.
fn image_url_from_prediction(prediction: &serde_json::Value) -> Option<String> {
    let output = &prediction["output"];
    output
        .as_str()
        .or_else(|| output.get(0).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

/// Obtains and persists a source image for a product that has none.
pub struct ImageAcquisition {
    generator: Arc<dyn ImageGenerator>,
    store: AssetStore,
}

impl ImageAcquisition {
    pub fn new(generator: Arc<dyn ImageGenerator>, store: AssetStore) -> Self {
        Self { generator, store }
    }

    pub async fn acquire(
        &self,
        product_name: &str,
        product_description: &str,
    ) -> Result<PathBuf, PipelineError> {
        let data = self
            .generator
            .generate(product_name, product_description, "1:1")
            .await
            .inspect_err(|e| {
                error!(
                    "{} generation failed for {}: {}",
                    self.generator.name(),
                    product_name,
                    e
                )
            })?;

        let extension = image_extension(&data)?;
        let path = self
            .store
            .store_generated(product_name, extension, &data)
            .await
            .map_err(|e| {
                PipelineError::GenerationFailed(format!("Failed to persist generated image: {}", e))
            })?;

        info!(
            "Stored {} image for {} at {}",
            self.generator.name(),
            product_name,
            path.display()
        );
        Ok(path)
    }
}

fn image_extension(data: &[u8]) -> Result<&'static str, PipelineError> {
    let format = image::guess_format(data).map_err(|_| {
        PipelineError::GenerationFailed("Generated payload is not an image".to_string())
    })?;

    let extension = match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        other => {
            return Err(PipelineError::GenerationFailed(format!(
                "Unsupported generated image format: {:?}",
                other
            )));
        }
    };

    image::load_from_memory_with_format(data, format).map_err(|e| {
        PipelineError::GenerationFailed(format!("Generated image cannot be decoded: {}", e))
    })?;

    Ok(extension)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use image::GenericImageView;
    use tempfile::TempDir;

    fn acquisition(generator: Arc<dyn ImageGenerator>) -> (TempDir, AssetStore, ImageAcquisition) {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path().join("assets"), dir.path().join("output"));
        let acquisition = ImageAcquisition::new(generator, store.clone());
        (dir, store, acquisition)
    }

    #[tokio::test]
    async fn test_placeholder_is_persisted_where_resolver_looks() {
        let (_dir, store, acquisition) = acquisition(Arc::new(PlaceholderGenerator));

        let path = acquisition.acquire("Green Tea", "Refreshing").await.unwrap();
        assert!(path.ends_with("green_tea/green_tea_generated.jpg"));
        assert_eq!(store.resolve("Green Tea").await, vec![path.clone()]);

        let img = image::open(&path).unwrap();
        assert_eq!(img.dimensions(), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
    }

    #[tokio::test]
    async fn test_provider_failure_is_generation_failed() {
        let (_dir, store, acquisition) = acquisition(Arc::new(FailingGenerator));
        let err = acquisition.acquire("Cola", "Classic").await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed(_)));
        assert!(store.resolve("Cola").await.is_empty());
    }

    #[tokio::test]
    async fn test_non_image_payload_is_rejected() {
        let (_dir, store, acquisition) = acquisition(Arc::new(GarbageGenerator));
        let err = acquisition.acquire("Cola", "Classic").await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed(_)));
        assert!(store.resolve("Cola").await.is_empty());
    }

    #[test]
    fn test_placeholder_palette_is_deterministic() {
        assert_eq!(
            PlaceholderGenerator::color_for("Cola"),
            PlaceholderGenerator::color_for("Cola")
        );
        assert!(PLACEHOLDER_PALETTE.contains(&PlaceholderGenerator::color_for("Anything").0));
    }

    #[test]
    fn test_prediction_output_shapes() {
        let single = json!({"output": "https://example.com/a.jpg"});
        let list = json!({"output": ["https://example.com/b.jpg"]});
        let empty = json!({"output": null});
        assert_eq!(
            image_url_from_prediction(&single).as_deref(),
            Some("https://example.com/a.jpg")
        );
        assert_eq!(
            image_url_from_prediction(&list).as_deref(),
            Some("https://example.com/b.jpg")
        );
        assert!(image_url_from_prediction(&empty).is_none());
    }

    #[test]
    fn test_unfinished_prediction_is_polled() {
        let running = json!({
            "id": "abc123",
            "status": "processing",
            "output": null,
            "urls": {"get": "https://api.replicate.com/v1/predictions/abc123"}
        });
        assert_eq!(
            prediction_state(&running),
            PredictionState::Pending("https://api.replicate.com/v1/predictions/abc123".to_string())
        );

        let starting = json!({"status": "starting", "output": null});
        assert!(matches!(prediction_state(&starting), PredictionState::Failed(_)));

        let done = json!({"status": "succeeded", "output": ["https://example.com/c.jpg"]});
        assert_eq!(
            prediction_state(&done),
            PredictionState::Ready("https://example.com/c.jpg".to_string())
        );

        let failed = json!({"status": "failed", "error": "NSFW content detected", "output": null});
        match prediction_state(&failed) {
            PredictionState::Failed(message) => assert!(message.contains("NSFW content detected")),
            other => panic!("expected failure, got {:?}", other),
        }

        let succeeded_empty = json!({"status": "succeeded", "output": null});
        assert!(matches!(prediction_state(&succeeded_empty), PredictionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_finished_prediction_needs_no_poll() {
        let generator = ReplicateGenerator::new(
            "token".to_string(),
            "model".to_string(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let url = generator
            .await_prediction(json!({"status": "succeeded", "output": "https://example.com/d.jpg"}))
            .await
            .unwrap();
        assert_eq!(url, "https://example.com/d.jpg");

        let err = generator
            .await_prediction(json!({"status": "canceled", "output": null}))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed(_)));
    }

    #[test]
    fn test_prompt_mentions_product() {
        let prompt = ReplicateGenerator::prompt("Cola", "Classic taste");
        assert!(prompt.starts_with("Professional high-quality product photography of Cola."));
        assert!(prompt.contains("Classic taste."));
    }

    #[tokio::test]
    async fn test_data_uri_is_decoded_without_network() {
        let generator = ReplicateGenerator::new(
            "token".to_string(),
            "model".to_string(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let encoded = general_purpose::STANDARD.encode(b"abc");
        let data = generator
            .download(&format!("data:image/jpeg;base64,{}", encoded))
            .await
            .unwrap();
        assert_eq!(&data[..], b"abc");
    }
}
