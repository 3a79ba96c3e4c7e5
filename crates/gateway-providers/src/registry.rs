//! Provider table.
//!
//! Maps a provider id to the completion functions it offers. A provider may
//! offer only one of the two modes; the dispatcher reports a missing function
//! per request.

use gateway_config::{ProviderConfig, ProviderKind};
use gateway_core::{BufferedCompletion, StreamingCompletion};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::openai::{OpenAICompatibleConfig, OpenAICompatibleProvider};
use crate::ProviderError;

/// Completion functions registered for one provider id
#[derive(Clone, Default)]
pub struct ProviderEntry {
    /// Buffered completion function
    pub buffered: Option<Arc<dyn BufferedCompletion>>,
    /// Streaming completion function
    pub streaming: Option<Arc<dyn StreamingCompletion>>,
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("buffered", &self.buffered.is_some())
            .field("streaming", &self.streaming.is_some())
            .finish()
    }
}

/// Provider id to completion functions
#[derive(Debug, Clone, Default)]
pub struct ProviderTable {
    entries: HashMap<String, ProviderEntry>,
}

impl ProviderTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from provider configuration, skipping disabled entries
    pub fn from_config(configs: &[ProviderConfig]) -> Result<Self, ProviderError> {
        let mut table = Self::new();

        for config in configs.iter().filter(|c| c.enabled) {
            match config.kind {
                ProviderKind::OpenaiCompatible => {
                    let provider =
                        Arc::new(OpenAICompatibleProvider::new(OpenAICompatibleConfig::from(config))?);
                    table.register(&config.id, provider);
                }
            }
            info!(provider = %config.id, kind = ?config.kind, "Registered provider");
        }

        Ok(table)
    }

    /// Register both functions of a provider that implements both modes
    pub fn register<P>(&mut self, id: impl Into<String>, provider: Arc<P>) -> &mut Self
    where
        P: BufferedCompletion + StreamingCompletion + 'static,
    {
        let entry = self.entries.entry(id.into()).or_default();
        entry.buffered = Some(provider.clone());
        entry.streaming = Some(provider);
        self
    }

    /// Register a buffered completion function
    pub fn register_buffered(
        &mut self,
        id: impl Into<String>,
        function: Arc<dyn BufferedCompletion>,
    ) -> &mut Self {
        self.entries.entry(id.into()).or_default().buffered = Some(function);
        self
    }

    /// Register a streaming completion function
    pub fn register_streaming(
        &mut self,
        id: impl Into<String>,
        function: Arc<dyn StreamingCompletion>,
    ) -> &mut Self {
        self.entries.entry(id.into()).or_default().streaming = Some(function);
        self
    }

    /// Buffered function for a provider
    #[must_use]
    pub fn buffered(&self, provider: &str) -> Option<Arc<dyn BufferedCompletion>> {
        self.entries.get(provider).and_then(|e| e.buffered.clone())
    }

    /// Streaming function for a provider
    #[must_use]
    pub fn streaming(&self, provider: &str) -> Option<Arc<dyn StreamingCompletion>> {
        self.entries.get(provider).and_then(|e| e.streaming.clone())
    }

    /// Registered provider ids, sorted
    #[must_use]
    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no provider is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that every referenced provider id has at least one function
    pub fn validate<'a, I>(&self, referenced: I) -> Result<(), ProviderError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let missing: BTreeSet<String> = referenced
            .into_iter()
            .filter(|id| !self.entries.contains_key(*id))
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::UnknownProviders(missing.into_iter().collect()))
        }
    }
}
