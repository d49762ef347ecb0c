//! LLM Client Manager
//!
//! Registry of backend drivers plus availability management. The manager
//! selects the active driver from configuration, answers `available()`
//! from a lock-free per-driver cache, and re-probes the active driver on a
//! timer. A probe failure only flips the cached bit; it never raises.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LlmType, RagConfig};

use super::client::LlmClient;
use super::error::{LlmError, Result};
use super::facade::LlmFacade;
use super::prompts::{PromptTemplates, UserLocale};
use super::providers::{GeminiClient, OllamaClient, OpenAiClient};

// ============================================================================
// Availability cache
// ============================================================================

const STATE_UNKNOWN: u8 = 0;
const STATE_UP: u8 = 1;
const STATE_DOWN: u8 = 2;

/// Last-known availability of one driver: a single word, read without
/// locking, written by the probe task. Unknown until first probed.
pub struct AvailabilityCache {
    state: AtomicU8,
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_UNKNOWN),
        }
    }

    pub fn get(&self) -> Option<bool> {
        match self.state.load(Ordering::Relaxed) {
            STATE_UP => Some(true),
            STATE_DOWN => Some(false),
            _ => None,
        }
    }

    /// Store a probe result, returning the previous known state.
    pub fn set(&self, available: bool) -> Option<bool> {
        let next = if available { STATE_UP } else { STATE_DOWN };
        match self.state.swap(next, Ordering::Relaxed) {
            STATE_UP => Some(true),
            STATE_DOWN => Some(false),
            _ => None,
        }
    }
}

impl Default for AvailabilityCache {
    fn default() -> Self {
        Self::new()
    }
}

struct RegisteredClient {
    client: Arc<dyn LlmClient>,
    availability: AvailabilityCache,
}

// ============================================================================
// Manager
// ============================================================================

/// Holds one driver instance per known backend and resolves the active one
/// from configuration.
pub struct LlmClientManager {
    clients: Vec<RegisteredClient>,
    config: Arc<RagConfig>,
    templates: Arc<PromptTemplates>,
}

impl LlmClientManager {
    /// Build the manager with the standard driver set.
    pub fn from_config(config: Arc<RagConfig>, templates: Arc<PromptTemplates>) -> Self {
        let mut manager = Self::with_clients(Vec::new(), config.clone(), templates);
        manager.register(Arc::new(OllamaClient::new(&config)));
        manager.register(Arc::new(OpenAiClient::new(&config)));
        manager.register(Arc::new(GeminiClient::new(&config)));
        manager
    }

    /// Build the manager with an explicit driver set (used by tests).
    pub fn with_clients(
        clients: Vec<Arc<dyn LlmClient>>,
        config: Arc<RagConfig>,
        templates: Arc<PromptTemplates>,
    ) -> Self {
        let mut manager = Self {
            clients: Vec::new(),
            config,
            templates,
        };
        for client in clients {
            manager.register(client);
        }
        manager
    }

    pub fn register(&mut self, client: Arc<dyn LlmClient>) {
        tracing::info!("Loaded LLM client: {}", client.name());
        self.clients.push(RegisteredClient {
            client,
            availability: AvailabilityCache::new(),
        });
    }

    fn active(&self) -> Option<&RegisteredClient> {
        if self.config.llm_type == LlmType::None {
            return None;
        }
        let name = self.config.llm_type.as_str();
        let found = self.clients.iter().find(|c| c.client.name() == name);
        if found.is_none() {
            tracing::warn!("LLM client not found: {}", name);
        }
        found
    }

    /// The active driver, if one is configured and registered.
    pub fn active_client(&self) -> Option<Arc<dyn LlmClient>> {
        self.active().map(|c| c.client.clone())
    }

    /// Whether RAG chat can serve requests: feature on, a backend
    /// configured, and the backend reachable. The first query for a driver
    /// probes synchronously; later queries read the cache.
    pub async fn available(&self) -> bool {
        if !self.config.enabled {
            tracing::debug!("[LLM] Not available. ragChatEnabled=false");
            return false;
        }
        let Some(registered) = self.active() else {
            tracing::debug!("[LLM] Not available. llmType={}", self.config.llm_type);
            return false;
        };
        match registered.availability.get() {
            Some(available) => available,
            None => self.probe(registered).await,
        }
    }

    /// An [`LlmFacade`] over the active driver, or `Unavailable`.
    pub async fn facade(&self, locale: UserLocale) -> Result<LlmFacade> {
        if !self.available().await {
            return Err(LlmError::Unavailable);
        }
        let client = self.active_client().ok_or(LlmError::Unavailable)?;
        Ok(LlmFacade::new(
            client,
            self.templates.clone(),
            self.config.clone(),
            locale,
        ))
    }

    async fn probe(&self, registered: &RegisteredClient) -> bool {
        let current = registered.client.check_availability().await;
        let previous = registered.availability.set(current);
        match previous {
            Some(previous) if previous != current => {
                tracing::info!(
                    "{} availability changed: {} -> {}",
                    registered.client.name(),
                    previous,
                    current
                );
            }
            None => {
                tracing::info!(
                    "{} availability initialized: {}",
                    registered.client.name(),
                    current
                );
            }
            _ => {
                tracing::debug!(
                    "{} availability check completed. available={}",
                    registered.client.name(),
                    current
                );
            }
        }
        current
    }

    /// Probe the active driver once, updating its cache.
    pub async fn refresh_availability(&self) {
        if let Some(registered) = self.active() {
            self.probe(registered).await;
        }
    }

    /// Spawn the periodic availability probe. Returns `None` when the
    /// feature is off or the interval disables scheduling; otherwise the
    /// task handle, which the owner aborts on shutdown.
    pub fn start_availability_task(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.enabled {
            tracing::debug!("RAG chat is disabled. Skipping availability check.");
            return None;
        }
        let interval_secs = self.config.availability_check_interval_secs;
        if interval_secs <= 0 {
            tracing::debug!("Availability check is disabled. interval={}", interval_secs);
            return None;
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs as u64));
            loop {
                interval.tick().await;
                manager.refresh_availability().await;
            }
        });
        tracing::debug!("Started availability check task. interval={}s", interval_secs);
        Some(handle)
    }
}
