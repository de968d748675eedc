// src/services/campaign_store.rs
use crate::errors::PipelineError;
use crate::models::{CampaignBrief, CampaignRecord, CampaignStatus, ProductResult};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use std::sync::Arc;
use uuid::Uuid;

const CAMPAIGN_ID_LEN: usize = 8;

/// In-process table of campaign records.
///
/// A record is created in `processing`, mutated only by the task that owns
/// the campaign, and frozen once it reaches a terminal status. Readers always
/// get a clone.
#[derive(Debug, Clone, Default)]
pub struct CampaignStore {
    records: Arc<DashMap<String, CampaignRecord>>,
}

impl CampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, brief: CampaignBrief) -> CampaignRecord {
        loop {
            let campaign_id = Uuid::new_v4().simple().to_string()[..CAMPAIGN_ID_LEN].to_string();
            if let Entry::Vacant(slot) = self.records.entry(campaign_id.clone()) {
                let now = Utc::now();
                let record = CampaignRecord {
                    logs: vec![format!("Campaign {} started", campaign_id)],
                    campaign_id,
                    status: CampaignStatus::Processing,
                    brief,
                    creatives: Default::default(),
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(record.clone());
                return record;
            }
            debug!("Campaign id collision on {}, retrying", campaign_id);
        }
    }

    pub fn snapshot(&self, campaign_id: &str) -> Option<CampaignRecord> {
        self.records.get(campaign_id).map(|entry| entry.clone())
    }

    #[cfg(test)]
    pub fn contains(&self, campaign_id: &str) -> bool {
        self.records.contains_key(campaign_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn append_log(&self, campaign_id: &str, message: impl Into<String>) -> Result<(), PipelineError> {
        let message = message.into();
        self.mutate(campaign_id, |record| record.logs.push(message))
    }

    pub fn set_product_result(
        &self,
        campaign_id: &str,
        product_name: &str,
        result: ProductResult,
    ) -> Result<(), PipelineError> {
        self.mutate(campaign_id, |record| {
            record.creatives.insert(product_name.to_string(), result);
        })
    }

    /// Moves the record into a terminal status. Succeeds exactly once.
    pub fn finalize(&self, campaign_id: &str, status: CampaignStatus) -> Result<(), PipelineError> {
        if !status.is_terminal() {
            return Err(PipelineError::Validation(format!(
                "{:?} is not a terminal status",
                status
            )));
        }
        self.mutate(campaign_id, |record| record.status = status)
    }

    fn mutate<F>(&self, campaign_id: &str, apply: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut CampaignRecord),
    {
        let mut record = self
            .records
            .get_mut(campaign_id)
            .ok_or_else(|| PipelineError::NotFound(format!("Campaign not found: {}", campaign_id)))?;

        if record.status.is_terminal() {
            warn!("Ignoring mutation of finalized campaign {}", campaign_id);
            return Err(PipelineError::CampaignClosed(campaign_id.to_string()));
        }

        apply(&mut record);
        record.updated_at = Utc::now();
        Ok(())
    }
}
