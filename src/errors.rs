// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Image generation failed: {0}")]
    GenerationFailed(String),

    #[error("Creative composition failed: {0}")]
    Composition(String),

    #[error("Content moderation error: {0}")]
    Moderation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Campaign {0} is already finalized")]
    CampaignClosed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResponseError for PipelineError {
    fn error_response(&self) -> HttpResponse {
        match self {
            PipelineError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation error",
                "message": self.to_string()
            })),
            PipelineError::NotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "Not found",
                "message": self.to_string()
            })),
            PipelineError::GenerationFailed(_) | PipelineError::Moderation(_) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "Upstream service error",
                    "message": self.to_string()
                }))
            }
            PipelineError::Image(_) | PipelineError::Composition(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Image processing error",
                    "message": self.to_string()
                }))
            }
            PipelineError::CampaignClosed(_) => HttpResponse::Conflict().json(serde_json::json!({
                "error": "Campaign finalized",
                "message": self.to_string()
            })),
            PipelineError::Config(_)
            | PipelineError::Io(_)
            | PipelineError::Serialization(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal error",
                    "message": self.to_string()
                }))
            }
        }
    }
}
