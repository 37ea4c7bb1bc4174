use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One disease entry in the knowledge store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiseaseRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub complications: Vec<String>,
    #[serde(default)]
    pub treatments: Vec<String>,
    #[serde(default)]
    pub diagnostic_tests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugInteraction {
    pub severity: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllergyRecord {
    pub name: String,
    #[serde(default)]
    pub common_reactions: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// Static lookup of diseases, symptoms and interactions. The store is an
/// external collaborator: its absence yields empty results, not errors.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn lookup_by_disease(&self, id: &str) -> Option<DiseaseRecord>;
    async fn lookup_by_symptoms(&self, names: &[String]) -> Vec<DiseaseRecord>;
    async fn check_interaction(&self, drug_a: &str, drug_b: &str) -> Option<DrugInteraction>;
    async fn check_allergy(&self, name: &str) -> Option<AllergyRecord>;
}

/// In-memory implementation of [`KnowledgeStore`].
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    diseases: DashMap<String, DiseaseRecord>,
    interactions: DashMap<(String, String), DrugInteraction>,
    allergies: DashMap<String, AllergyRecord>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_disease(&self, disease: DiseaseRecord) {
        self.diseases.insert(disease.id.clone(), disease);
    }

    pub fn add_interaction(&self, drug_a: &str, drug_b: &str, interaction: DrugInteraction) {
        self.interactions
            .insert(interaction_key(drug_a, drug_b), interaction);
    }

    pub fn add_allergy(&self, allergy: AllergyRecord) {
        self.allergies
            .insert(allergy.name.to_lowercase(), allergy);
    }
}

// Interaction lookups are symmetric, so the key is order-normalized.
fn interaction_key(drug_a: &str, drug_b: &str) -> (String, String) {
    let a = drug_a.to_lowercase();
    let b = drug_b.to_lowercase();
    if a <= b { (a, b) } else { (b, a) }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn lookup_by_disease(&self, id: &str) -> Option<DiseaseRecord> {
        self.diseases.get(id).map(|entry| entry.clone())
    }

    async fn lookup_by_symptoms(&self, names: &[String]) -> Vec<DiseaseRecord> {
        let wanted: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
        self.diseases
            .iter()
            .filter(|entry| {
                entry
                    .symptoms
                    .iter()
                    .any(|s| wanted.contains(&s.to_lowercase()))
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn check_interaction(&self, drug_a: &str, drug_b: &str) -> Option<DrugInteraction> {
        self.interactions
            .get(&interaction_key(drug_a, drug_b))
            .map(|entry| entry.clone())
    }

    async fn check_allergy(&self, name: &str) -> Option<AllergyRecord> {
        self.allergies
            .get(&name.to_lowercase())
            .map(|entry| entry.clone())
    }
}
