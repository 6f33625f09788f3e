use crate::config::AppConfig;
use crate::core::{CounterStore, Notifier};
use anyhow::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub counter: Arc<CounterStore>,
    pub notifier: Notifier,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        let counter = CounterStore::new(config.counter_path()?);
        let notifier = Notifier::from_config(&config.notifications);
        Ok(Self::with_parts(config, counter, notifier))
    }

    pub fn with_parts(config: AppConfig, counter: CounterStore, notifier: Notifier) -> Self {
        Self {
            config: Arc::new(config),
            counter: Arc::new(counter),
            notifier,
        }
    }
}
