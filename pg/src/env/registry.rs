use anyhow::Result;
use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::env::config::EnvConfig;
use crate::error::PgError;
use crate::prelude::{Environment, RenderMode};

/// Creates one environment instance
pub type EnvConstructor = Box<dyn Fn(&EnvConfig, RenderMode) -> Result<Box<dyn Environment>>>;

/// Environment providers by identifier (e.g. `highway-v0`)
#[derive(Default)]
pub struct EnvRegistry {
    constructors: FxHashMap<String, EnvConstructor>,
}

impl EnvRegistry {
    pub fn new() -> Self { Self::default() }

    /// Registers `constructor` under `id`, replacing a previous registration
    pub fn register<F>(
        &mut self,
        id: &str,
        constructor: F,
    ) where
        F: Fn(&EnvConfig, RenderMode) -> Result<Box<dyn Environment>> + 'static,
    {
        if self.constructors.insert(id.to_owned(), Box::new(constructor)).is_some() {
            log::warn!("environment '{}' registered twice - replaced previous provider", id);
        }
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.constructors.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).sorted().collect()
    }

    pub fn make(
        &self,
        config: &EnvConfig,
        render_mode: RenderMode,
    ) -> Result<Box<dyn Environment>> {
        match self.constructors.get(config.id()) {
            Some(constructor) => constructor(config, render_mode),
            None => Err(PgError::config(format!(
                "unknown environment '{}' (registered: [{}])",
                config.id(),
                self.ids().join(", ")
            )))?,
        }
    }
}
