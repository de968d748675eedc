// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::PipelineError;

pub const MIN_PRODUCTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub description: String,
}

impl Product {
    /// Storage key shared by the asset library and the output tree.
    pub fn key(&self) -> String {
        product_key(&self.name)
    }
}

pub fn product_key(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Checks that `name` maps to a usable directory name and returns its key.
pub fn validate_product_name(name: &str) -> Result<String, PipelineError> {
    let key = product_key(name);
    if key.is_empty() {
        return Err(PipelineError::Validation(
            "Product name must not be empty".to_string(),
        ));
    }
    if !is_safe_path_component(&key) {
        return Err(PipelineError::Validation(format!(
            "Product name contains illegal characters: {:?}",
            name
        )));
    }
    Ok(key)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignBrief {
    pub products: Vec<Product>,
    pub target_region: String,
    pub target_audience: String,
    pub campaign_message: String,
}

impl CampaignBrief {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.products.len() < MIN_PRODUCTS {
            return Err(PipelineError::Validation(format!(
                "At least {} products are required",
                MIN_PRODUCTS
            )));
        }

        for product in &self.products {
            validate_product_name(&product.name)?;
        }

        Ok(())
    }
}

/// True when `value` can be used as a single directory or file name.
pub fn is_safe_path_component(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && !value.contains('/')
        && !value.contains('\\')
        && !value.contains("..")
        && !value.contains('\0')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Label as used in file names, `9:16` becomes `9x16`.
    pub fn file_label(&self) -> String {
        self.label.replace(':', "x")
    }
}

/// Every creative set is attempted in this order.
pub const ASPECT_RATIOS: [AspectRatio; 3] = [
    AspectRatio {
        label: "1:1",
        width: 1080,
        height: 1080,
    },
    AspectRatio {
        label: "9:16",
        width: 1080,
        height: 1920,
    },
    AspectRatio {
        label: "16:9",
        width: 1920,
        height: 1080,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Processing,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CampaignStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Completed,
    FailedCompliance,
    FailedBrandCompliance,
    FailedTechnical,
}

impl FinalStatus {
    pub fn campaign_status(&self) -> CampaignStatus {
        match self {
            FinalStatus::Completed => CampaignStatus::Completed,
            _ => CampaignStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Reused,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductResult {
    pub asset_status: AssetStatus,
    pub existing_assets_found: usize,
    pub existing_assets_used: Vec<String>,
    pub generated_creatives: BTreeMap<String, String>,
    pub aspect_ratios: Vec<String>,
}

impl ProductResult {
    pub fn new(asset_status: AssetStatus, existing_assets: Vec<String>) -> Self {
        Self {
            asset_status,
            existing_assets_found: existing_assets.len(),
            existing_assets_used: existing_assets,
            generated_creatives: BTreeMap::new(),
            aspect_ratios: Vec::new(),
        }
    }

    pub fn record_creative(&mut self, ratio_label: &str, path: String) {
        if self
            .generated_creatives
            .insert(ratio_label.to_string(), path)
            .is_none()
        {
            self.aspect_ratios.push(ratio_label.to_string());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub campaign_id: String,
    pub status: CampaignStatus,
    pub brief: CampaignBrief,
    pub creatives: BTreeMap<String, ProductResult>,
    pub logs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Message,
    Audience,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub is_compliant: bool,
    pub reason: String,
    pub flagged: Vec<String>,
}

impl ComplianceVerdict {
    pub fn compliant(reason: impl Into<String>) -> Self {
        Self {
            is_compliant: true,
            reason: reason.into(),
            flagged: Vec::new(),
        }
    }

    pub fn violation(reason: impl Into<String>, flagged: Vec<String>) -> Self {
        Self {
            is_compliant: false,
            reason: reason.into(),
            flagged,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefSummary {
    pub products: Vec<Product>,
    pub target_region: String,
    pub target_audience: String,
    pub campaign_message: String,
}

impl From<&CampaignBrief> for BriefSummary {
    fn from(brief: &CampaignBrief) -> Self {
        Self {
            products: brief
                .products
                .iter()
                .map(|p| Product {
                    name: p.name.clone(),
                    description: p.description.clone(),
                })
                .collect(),
            target_region: brief.target_region.clone(),
            target_audience: brief.target_audience.clone(),
            campaign_message: brief.campaign_message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_products: usize,
    pub products_with_existing_assets: usize,
    pub products_with_generated_assets: usize,
    pub total_creatives_generated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub campaign_id: String,
    pub timestamp: DateTime<Utc>,
    pub campaign_brief: BriefSummary,
    pub final_status: FinalStatus,
    pub reason: String,
    pub product_metrics: BTreeMap<String, ProductResult>,
    pub summary: MetricsSummary,
}

impl MetricsSnapshot {
    pub fn new(
        campaign_id: &str,
        brief: &CampaignBrief,
        final_status: FinalStatus,
        product_metrics: BTreeMap<String, ProductResult>,
        reason: impl Into<String>,
    ) -> Self {
        let count_with = |status: AssetStatus| {
            product_metrics
                .values()
                .filter(|p| p.asset_status == status)
                .count()
        };

        let summary = MetricsSummary {
            total_products: brief.products.len(),
            products_with_existing_assets: count_with(AssetStatus::Reused),
            products_with_generated_assets: count_with(AssetStatus::Generated),
            total_creatives_generated: product_metrics
                .values()
                .map(|p| p.aspect_ratios.len())
                .sum(),
        };

        Self {
            campaign_id: campaign_id.to_string(),
            timestamp: Utc::now(),
            campaign_brief: BriefSummary::from(brief),
            final_status,
            reason: reason.into(),
            product_metrics,
            summary,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub filename: String,
    pub size: u64,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAssetCount {
    pub product: String,
    pub asset_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInfo {
    pub assets_directory: String,
    pub output_directory: String,
    pub products_with_assets: Vec<ProductAssetCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignImage {
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub aspect_ratio: String,
}
