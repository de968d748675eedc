// src/services/mod.rs
pub mod asset_store;
pub mod brand;
pub mod campaign_store;
pub mod compositor;
pub mod image_generator;
pub mod metrics_store;
pub mod moderation;
pub mod orchestrator;
pub mod typography;

pub use asset_store::AssetStore;
pub use campaign_store::CampaignStore;
pub use compositor::CreativeCompositor;
pub use metrics_store::MetricsStore;
pub use orchestrator::Orchestrator;
