//! Named breaker registry.
//!
//! # Toyota Way: Heijunka (平準化)
//! One breaker per downstream, shared by every caller of that downstream,
//! so the whole process sees a single view of its health.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::breaker::CircuitBreaker;
use crate::config::RegistryConfig;
use crate::error::Result;
use crate::settings::Settings;
use crate::state::State;

/// Creates breakers on first use and hands out shared references.
pub struct BreakerRegistry {
    template: Settings,
    overrides: HashMap<String, Settings>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Creates a registry whose breakers are built from `template`,
    /// renamed to the requested name.
    #[must_use]
    pub fn new(template: Settings) -> Self {
        Self {
            template,
            overrides: HashMap::new(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Uses `settings` instead of the template for the breaker it names.
    #[must_use]
    pub fn with_override(mut self, settings: Settings) -> Self {
        self.overrides.insert(settings.name().to_string(), settings);
        self
    }

    /// Builds a registry from a validated configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration does not validate.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Self::from_config_with(config, Settings::new("default"))
    }

    /// Builds a registry from a configuration, starting every breaker from
    /// `base` (its callbacks, observer and clock are kept).
    ///
    /// # Errors
    /// Returns an error if the configuration does not validate.
    pub fn from_config_with(config: &RegistryConfig, base: Settings) -> Result<Self> {
        config.validate()?;

        let template = config.defaults.apply(base);
        let mut registry = Self::new(template.clone());
        for entry in &config.breakers {
            registry = registry.with_override(entry.apply(template.clone().renamed(&entry.name)));
        }

        tracing::info!(
            overrides = config.breakers.len(),
            "breaker registry configured"
        );
        Ok(registry)
    }

    /// Returns the breaker named `name`, creating it on first use.
    ///
    /// Concurrent first calls for the same name all receive the same breaker.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(name) {
            return breaker;
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        let settings = self
            .overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.template.clone().renamed(name));
        let breaker = Arc::new(CircuitBreaker::new(settings));
        breakers.insert(name.to_string(), Arc::clone(&breaker));

        tracing::info!(breaker = %name, "registered circuit breaker");
        breaker
    }

    /// Returns the breaker named `name` if it exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(Arc::clone)
    }

    /// Evicts a breaker. Holders of the old `Arc` keep using it; the next
    /// `get_or_create` builds a fresh one.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        let removed = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if removed.is_some() {
            tracing::info!(breaker = %name, "removed circuit breaker");
        }
        removed
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Returns every breaker's current state, sorted by name.
    #[must_use]
    pub fn states(&self) -> Vec<(String, State)> {
        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, breaker)| (name.clone(), Arc::clone(breaker)))
            .collect();

        let mut states: Vec<(String, State)> = breakers
            .into_iter()
            .map(|(name, breaker)| (name, breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Resets every registered breaker to `Closed`.
    pub fn reset_all(&self) {
        for name in self.names() {
            if let Some(breaker) = self.get(&name) {
                breaker.reset();
            }
        }
    }

    /// Returns the number of registered breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no breaker has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(Settings::new("default"))
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("template", &self.template)
            .field("overrides", &self.overrides.len())
            .field("breakers", &self.names())
            .finish()
    }
}
