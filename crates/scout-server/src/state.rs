use crate::configuration::Settings;
use scout::relay::{CompletionObserver, LoggingObserver};
use std::sync::Arc;

/// Shared application state. Nothing here changes after startup.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub client: reqwest::Client,
    pub observer: Arc<dyn CompletionObserver>,
}

impl AppState {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            settings: Arc::new(settings),
            client,
            observer: Arc::new(LoggingObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = observer;
        self
    }
}
