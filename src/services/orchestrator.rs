// src/services/orchestrator.rs
use crate::config::{AppConfig, ImageProviderKind, ModerationProviderKind};
use crate::errors::PipelineError;
use crate::models::{
    ASPECT_RATIOS, AspectRatio, AssetStatus, CampaignBrief, ContentKind, FinalStatus,
    MetricsSnapshot, Product, ProductResult,
};
use crate::services::asset_store::AssetStore;
use crate::services::brand::BrandComplianceChecker;
use crate::services::campaign_store::CampaignStore;
use crate::services::compositor::{CreativeCompositor, creative_filename};
use crate::services::image_generator::{
    ImageAcquisition, ImageGenerator, PlaceholderGenerator, ReplicateGenerator,
};
use crate::services::metrics_store::MetricsStore;
use crate::services::moderation::{ContentModerator, KeywordModerator, OpenAIModerator};
use image::DynamicImage;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// How a campaign run ended.
struct Outcome {
    final_status: FinalStatus,
    reason: String,
}

impl Outcome {
    fn new(final_status: FinalStatus, reason: impl Into<String>) -> Self {
        Self {
            final_status,
            reason: reason.into(),
        }
    }
}

/// Drives campaigns from brief to finished creatives.
///
/// `start` registers the campaign and hands it to a bounded pool of
/// background workers; callers poll the [`CampaignStore`] for progress.
pub struct Orchestrator {
    campaigns: CampaignStore,
    assets: AssetStore,
    acquisition: ImageAcquisition,
    compositor: Arc<CreativeCompositor>,
    moderator: Arc<dyn ContentModerator>,
    brand: BrandComplianceChecker,
    metrics: MetricsStore,
    workers: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        campaigns: CampaignStore,
        assets: AssetStore,
        metrics: MetricsStore,
        generator: Arc<dyn ImageGenerator>,
        moderator: Arc<dyn ContentModerator>,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            acquisition: ImageAcquisition::new(generator, assets.clone()),
            brand: BrandComplianceChecker::new(assets.clone()),
            compositor: Arc::new(CreativeCompositor::new()),
            workers: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            campaigns,
            assets,
            moderator,
            metrics,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        campaigns: CampaignStore,
        assets: AssetStore,
        metrics: MetricsStore,
    ) -> Self {
        let generator: Arc<dyn ImageGenerator> = match &config.image_provider {
            ImageProviderKind::Placeholder => Arc::new(PlaceholderGenerator),
            ImageProviderKind::Replicate { api_token, model } => Arc::new(ReplicateGenerator::new(
                api_token.clone(),
                model.clone(),
                config.api_timeout,
                config.download_timeout,
            )),
        };

        let moderator: Arc<dyn ContentModerator> = match &config.moderation_provider {
            ModerationProviderKind::Keywords => Arc::new(KeywordModerator),
            ModerationProviderKind::OpenAI { api_key, model } => Arc::new(OpenAIModerator::new(
                api_key.clone(),
                model.clone(),
                config.api_timeout,
            )),
        };

        info!(
            "Pipeline using {} image generation and {} moderation with {} workers",
            generator.name(),
            moderator.name(),
            config.worker_pool_size
        );

        Self::new(
            campaigns,
            assets,
            metrics,
            generator,
            moderator,
            config.worker_pool_size,
        )
    }

    pub fn campaigns(&self) -> &CampaignStore {
        &self.campaigns
    }

    /// Validates and registers the brief, then schedules the run. Returns the
    /// new campaign id without waiting for any processing.
    pub fn start(self: &Arc<Self>, brief: CampaignBrief) -> Result<String, PipelineError> {
        brief.validate()?;

        let campaign_id = self.campaigns.create(brief.clone()).campaign_id;
        info!(
            "Processing campaign {} for {} products",
            campaign_id,
            brief.products.len()
        );

        let orchestrator = Arc::clone(self);
        let task_id = campaign_id.clone();
        tokio::spawn(async move {
            // The semaphore is never closed, so a permit is always granted eventually.
            let _permit = orchestrator.workers.clone().acquire_owned().await.ok();
            orchestrator.run(&task_id, brief).await;
        });

        Ok(campaign_id)
    }

    /// Runs a registered campaign to its terminal state. Every exit path
    /// writes metrics once and finalizes the record.
    pub async fn run(&self, campaign_id: &str, brief: CampaignBrief) {
        let outcome = match self.execute(campaign_id, &brief).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Campaign {} failed: {}", campaign_id, e);
                self.log(campaign_id, format!("Error: {}", e));
                Outcome::new(
                    FinalStatus::FailedTechnical,
                    format!("Technical error during campaign processing: {}", e),
                )
            }
        };

        self.finish(campaign_id, &brief, outcome).await;
    }

    async fn execute(
        &self,
        campaign_id: &str,
        brief: &CampaignBrief,
    ) -> Result<Outcome, PipelineError> {
        self.log(campaign_id, "Starting content compliance check");

        let checks = [
            (brief.campaign_message.as_str(), ContentKind::Message),
            (brief.target_audience.as_str(), ContentKind::Audience),
        ];
        for (text, kind) in checks {
            let verdict = self.moderator.evaluate(text, kind).await?;
            if !verdict.is_compliant {
                self.log(
                    campaign_id,
                    format!("COMPLIANCE FAILURE: {}", verdict.reason),
                );
                error!(
                    "Campaign {} failed compliance check: {}",
                    campaign_id, verdict.reason
                );
                return Ok(Outcome::new(FinalStatus::FailedCompliance, verdict.reason));
            }
        }

        self.log(campaign_id, "Content compliance check passed");
        self.log(campaign_id, "Starting creative generation");

        for product in &brief.products {
            self.process_product(campaign_id, product, &brief.campaign_message)
                .await?;
        }

        self.log(campaign_id, "Checking brand compliance (background colors)");
        let verdict = self.brand.evaluate(campaign_id).await?;
        if !verdict.is_compliant {
            self.log(
                campaign_id,
                format!("BRAND COMPLIANCE FAILURE: {}", verdict.reason),
            );
            return Ok(Outcome::new(
                FinalStatus::FailedBrandCompliance,
                verdict.reason,
            ));
        }

        self.log(campaign_id, "Brand compliance check passed");
        self.log(campaign_id, "Campaign processing completed successfully");
        Ok(Outcome::new(
            FinalStatus::Completed,
            "Campaign successfully completed with all creatives generated",
        ))
    }

    async fn process_product(
        &self,
        campaign_id: &str,
        product: &Product,
        campaign_message: &str,
    ) -> Result<(), PipelineError> {
        self.log(campaign_id, format!("Processing product: {}", product.name));

        let existing = self.assets.resolve(&product.name).await;
        let (asset_status, source) = match existing.first() {
            Some(first) => {
                self.log(
                    campaign_id,
                    format!(
                        "Found {} existing assets for {} - REUSING {}",
                        existing.len(),
                        product.name,
                        first.display()
                    ),
                );
                (AssetStatus::Reused, first.clone())
            }
            None => {
                self.log(
                    campaign_id,
                    format!(
                        "No existing assets found for {} - WILL GENERATE",
                        product.name
                    ),
                );
                match self
                    .acquisition
                    .acquire(&product.name, &product.description)
                    .await
                {
                    Ok(path) => {
                        self.log(
                            campaign_id,
                            format!("Generated source image {}", path.display()),
                        );
                        (AssetStatus::Generated, path)
                    }
                    Err(e) => {
                        self.log(
                            campaign_id,
                            format!(
                                "Failed to generate source image for {}: {}",
                                product.name, e
                            ),
                        );
                        return Ok(());
                    }
                }
            }
        };

        let output_dir = self.assets.creative_dir(campaign_id, &product.name);
        tokio::fs::create_dir_all(&output_dir).await?;

        let mut result = ProductResult::new(
            asset_status,
            existing.iter().map(|p| p.display().to_string()).collect(),
        );

        match load_image(source.clone()).await {
            Ok(image) => {
                let image = Arc::new(image);
                for ratio in ASPECT_RATIOS.iter() {
                    let path = output_dir.join(creative_filename(&product.key(), ratio));
                    match self
                        .render_creative(Arc::clone(&image), *ratio, campaign_message, product, path.clone())
                        .await
                    {
                        Ok(()) => {
                            info!("Generated creative: {}", path.display());
                            result.record_creative(ratio.label, path.display().to_string());
                        }
                        Err(e) => {
                            warn!(
                                "Failed to generate {} creative for {}: {}",
                                ratio.label, product.name, e
                            );
                            self.log(
                                campaign_id,
                                format!(
                                    "Failed to generate {} creative for {}: {}",
                                    ratio.label, product.name, e
                                ),
                            );
                        }
                    }
                }
            }
            Err(e) => {
                self.log(
                    campaign_id,
                    format!("Failed to load source image {}: {}", source.display(), e),
                );
            }
        }

        let created = result.aspect_ratios.len();
        self.campaigns
            .set_product_result(campaign_id, &product.name, result)?;

        let summary = match asset_status {
            AssetStatus::Reused => format!(
                "Successfully reused assets for {} - {} creatives created",
                product.name, created
            ),
            AssetStatus::Generated => format!(
                "Generated new assets for {} - {} creatives created",
                product.name, created
            ),
        };
        self.log(campaign_id, summary);
        Ok(())
    }

    async fn render_creative(
        &self,
        image: Arc<DynamicImage>,
        ratio: AspectRatio,
        campaign_message: &str,
        product: &Product,
        path: PathBuf,
    ) -> Result<(), PipelineError> {
        let compositor = Arc::clone(&self.compositor);
        let message = campaign_message.to_string();
        let product_name = product.name.clone();

        tokio::task::spawn_blocking(move || {
            let creative = compositor.compose(&image, &ratio, &message, &product_name)?;
            compositor.save_jpeg(&creative, &path)
        })
        .await
        .map_err(|e| PipelineError::Composition(format!("Render task failed: {}", e)))?
    }

    async fn finish(&self, campaign_id: &str, brief: &CampaignBrief, outcome: Outcome) {
        let creatives = self
            .campaigns
            .snapshot(campaign_id)
            .map(|record| record.creatives)
            .unwrap_or_default();

        let snapshot = MetricsSnapshot::new(
            campaign_id,
            brief,
            outcome.final_status,
            creatives,
            outcome.reason.clone(),
        );

        match self.metrics.save(&snapshot).await {
            Ok(_) => self.log(campaign_id, "Campaign metrics saved"),
            Err(e) => {
                error!("Failed to save metrics for campaign {}: {}", campaign_id, e);
                self.log(campaign_id, format!("Failed to save campaign metrics: {}", e));
            }
        }

        if let Err(e) = self
            .campaigns
            .finalize(campaign_id, outcome.final_status.campaign_status())
        {
            error!("Could not finalize campaign {}: {}", campaign_id, e);
            return;
        }

        match outcome.final_status {
            FinalStatus::Completed => info!("Campaign {} completed successfully", campaign_id),
            status => error!(
                "Campaign {} finished as {:?}: {}",
                campaign_id, status, outcome.reason
            ),
        }
    }

    fn log(&self, campaign_id: &str, message: impl Into<String>) {
        if let Err(e) = self.campaigns.append_log(campaign_id, message) {
            warn!("Dropped log line for campaign {}: {}", campaign_id, e);
        }
    }
}

async fn load_image(path: PathBuf) -> Result<DynamicImage, PipelineError> {
    tokio::task::spawn_blocking(move || image::open(&path).map_err(PipelineError::from))
        .await
        .map_err(|e| PipelineError::Composition(format!("Image load task failed: {}", e)))?
}
