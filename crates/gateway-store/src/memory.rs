//! In-memory store.
//!
//! Limits are computed as the project's total recorded tokens against its
//! configured ceiling. Totals are kept as running counters; only the most
//! recent usage records are retained.

use async_trait::async_trait;
use gateway_config::MemoryStoreSeed;
use gateway_core::{
    hash_secret, ApiKey, GatewayError, GatewayStore, LimitCheckResult, ModelConfig, UsageRecord,
};
use parking_lot::RwLock;
use secrecy::ExposeSecret;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

use crate::StoreError;

/// Usage records retained by default
pub const DEFAULT_USAGE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Inner {
    /// Project id -> token ceiling
    projects: HashMap<String, Option<u64>>,
    models: HashMap<String, ModelConfig>,
    /// Secret hash -> credential
    keys_by_hash: HashMap<String, ApiKey>,
    /// Credential id -> authorized model ids, in order
    key_models: HashMap<String, Vec<String>>,
    /// Credential id -> project id
    key_projects: HashMap<String, String>,
    /// Project id -> total tokens recorded
    project_tokens: HashMap<String, u64>,
    /// Most recent records, oldest first
    recent_usage: VecDeque<UsageRecord>,
}

/// Process-local store
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    usage_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_usage_capacity(DEFAULT_USAGE_CAPACITY)
    }
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store retaining at most `capacity` usage records
    #[must_use]
    pub fn with_usage_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            usage_capacity: capacity,
        }
    }

    /// Build a store from configuration seed data
    pub fn from_seed(seed: &MemoryStoreSeed) -> Result<Self, StoreError> {
        let store = Self::new();

        for project in &seed.projects {
            store.insert_project(&project.id, project.token_limit);
        }
        for model in &seed.models {
            store.insert_model(ModelConfig::new(&model.id, &model.name, &model.provider));
        }
        for key in &seed.api_keys {
            let hash = match (&key.key, &key.key_sha256) {
                (Some(secret), _) => hash_secret(secret.expose_secret()),
                (None, Some(hash)) => hash.to_ascii_lowercase(),
                (None, None) => {
                    return Err(StoreError::Seed(format!("api key '{}' has no secret", key.id)))
                }
            };
            let api_key = ApiKey {
                id: key.id.clone(),
                project_id: key.project_id.clone(),
                owner_id: key.owner_id.clone().unwrap_or_else(|| key.project_id.clone()),
                name: None,
            };
            store.insert_api_key_hash(hash, api_key, key.models.clone())?;
        }

        Ok(store)
    }

    /// Add or replace a project
    pub fn insert_project(&self, id: impl Into<String>, token_limit: Option<u64>) {
        self.inner.write().projects.insert(id.into(), token_limit);
    }

    /// Add or replace a model record
    pub fn insert_model(&self, model: ModelConfig) {
        self.inner.write().models.insert(model.id.clone(), model);
    }

    /// Add a credential by its plain secret
    pub fn insert_api_key(
        &self,
        secret: &str,
        api_key: ApiKey,
        model_ids: Vec<String>,
    ) -> Result<(), StoreError> {
        self.insert_api_key_hash(hash_secret(secret), api_key, model_ids)
    }

    fn insert_api_key_hash(
        &self,
        hash: String,
        api_key: ApiKey,
        model_ids: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();

        if !inner.projects.contains_key(&api_key.project_id) {
            return Err(StoreError::NotFound {
                kind: "project",
                id: api_key.project_id,
            });
        }
        if let Some(missing) = model_ids.iter().find(|id| !inner.models.contains_key(*id)) {
            return Err(StoreError::NotFound {
                kind: "model",
                id: missing.clone(),
            });
        }

        inner.key_models.insert(api_key.id.clone(), model_ids);
        inner
            .key_projects
            .insert(api_key.id.clone(), api_key.project_id.clone());
        inner.keys_by_hash.insert(hash, api_key);
        Ok(())
    }

    /// The most recent usage records, oldest first
    #[must_use]
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.inner.read().recent_usage.iter().cloned().collect()
    }

    /// Provider identifiers referenced by any model record
    #[must_use]
    pub fn referenced_providers(&self) -> BTreeSet<String> {
        self.inner
            .read()
            .models
            .values()
            .map(|m| m.provider.clone())
            .collect()
    }
}

#[async_trait]
impl GatewayStore for MemoryStore {
    async fn find_api_key(&self, secret: &str) -> Result<Option<ApiKey>, GatewayError> {
        Ok(self.inner.read().keys_by_hash.get(&hash_secret(secret)).cloned())
    }

    async fn get_authorized_models(&self, api_key_id: &str) -> Result<Vec<ModelConfig>, GatewayError> {
        let inner = self.inner.read();
        let models = inner
            .key_models
            .get(api_key_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.models.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    async fn check_limits(&self, api_key_id: &str) -> Result<LimitCheckResult, GatewayError> {
        let inner = self.inner.read();
        let project_id = inner
            .key_projects
            .get(api_key_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "api key",
                id: api_key_id.to_string(),
            })?;

        let limit = inner
            .projects
            .get(project_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound {
                kind: "project",
                id: project_id.clone(),
            })?;

        let used = inner.project_tokens.get(project_id).copied().unwrap_or(0);

        Ok(match limit {
            Some(limit) => LimitCheckResult::against(used, limit),
            None => LimitCheckResult::unlimited(used),
        })
    }

    async fn record_usage(&self, record: UsageRecord) -> Result<(), GatewayError> {
        debug!(
            project_id = %record.project_id,
            api_key_id = %record.api_key_id,
            model_id = %record.model_id,
            total_tokens = record.total_tokens,
            "Recording usage"
        );
        let mut inner = self.inner.write();
        let total = inner
            .project_tokens
            .entry(record.project_id.clone())
            .or_insert(0);
        *total = total.saturating_add(record.total_tokens);

        if self.usage_capacity > 0 {
            if inner.recent_usage.len() == self.usage_capacity {
                inner.recent_usage.pop_front();
            }
            inner.recent_usage.push_back(record);
        }
        Ok(())
    }
}
