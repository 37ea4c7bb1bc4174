use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use assessment_flow::{DataStage, KnowledgeStore, MedicalData, Result};

/// Data-lookup stage backed by the knowledge store. The store is optional:
/// when it is absent the stage yields empty results, not errors.
pub struct KnowledgeDataStage {
    store: Option<Arc<dyn KnowledgeStore>>,
}

impl KnowledgeDataStage {
    pub fn new(store: Option<Arc<dyn KnowledgeStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DataStage for KnowledgeDataStage {
    async fn fetch_medical_data(&self, symptoms: &[String]) -> Result<MedicalData> {
        let Some(store) = &self.store else {
            warn!("no knowledge store configured, returning empty medical data");
            return Ok(MedicalData::default());
        };

        let diseases = store.lookup_by_symptoms(symptoms).await;
        info!(matches = diseases.len(), "knowledge store lookup complete");

        let known_symptoms: HashSet<String> = diseases
            .iter()
            .flat_map(|d| d.symptoms.iter().map(|s| s.to_lowercase()))
            .collect();
        let symptoms_found = symptoms
            .iter()
            .filter(|s| known_symptoms.contains(&s.to_lowercase()))
            .cloned()
            .collect();

        Ok(MedicalData {
            risk_factors: dedup(diseases.iter().flat_map(|d| d.risk_factors.clone())),
            treatments: dedup(diseases.iter().flat_map(|d| d.treatments.clone())),
            symptoms_found,
            diseases,
        })
    }
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}
