use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use recall_lib::review::{
    start_outbox_flusher, Dispatcher, FileGateway, Outbox, OutboxFlusher, ReviewController,
};
use recall_lib::{PersistMode, ReviewConfig};

/// Shared application state for CLI commands
pub struct App {
    pub config: ReviewConfig,
    pub gateway: Arc<FileGateway>,
}

impl App {
    /// Load configuration and open the learner's store
    pub fn new(config_path: Option<&Path>, learner: Option<&str>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => ReviewConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => {
                let default_path = dirs::config_dir().map(|d| d.join("recall").join("config.toml"));
                match default_path {
                    Some(path) if path.exists() => ReviewConfig::from_file(&path)
                        .with_context(|| format!("Failed to load config from {}", path.display()))?,
                    _ => ReviewConfig::default(),
                }
            }
        };

        if let Some(name) = learner {
            config.learner = name.to_string();
            config.validate().context("Invalid learner name")?;
        }

        let data_dir = config.data_dir().context("Failed to get data directory")?;
        let gateway = FileGateway::new(data_dir, &config.learner);
        gateway.init().context("Failed to initialize learner storage")?;

        Ok(Self {
            config,
            gateway: Arc::new(gateway),
        })
    }

    pub fn open_outbox(&self) -> Result<Arc<Outbox>> {
        let path = self.config.outbox_path().context("Failed to resolve outbox path")?;
        let outbox = Outbox::open(&path)
            .with_context(|| format!("Failed to open outbox at {}", path.display()))?;
        Ok(Arc::new(outbox))
    }

    /// Build a controller wired to the configured persistence mode.
    ///
    /// In outbox mode the returned flusher must be shut down before exit so
    /// pending jobs get a final delivery attempt.
    pub fn controller(&self) -> Result<(ReviewController, Option<OutboxFlusher>)> {
        let (dispatcher, flusher) = match self.config.persistence.mode {
            PersistMode::BestEffort => (Dispatcher::BestEffort(self.gateway.clone()), None),
            PersistMode::Outbox => {
                let outbox = self.open_outbox()?;
                let flusher = start_outbox_flusher(
                    Arc::clone(&outbox),
                    self.gateway.clone(),
                    self.config.flusher_timing(),
                );
                (Dispatcher::Outbox(outbox), Some(flusher))
            }
        };

        let controller = ReviewController::new(
            self.gateway.clone(),
            dispatcher,
            self.config.session_options(),
        );
        Ok((controller, flusher))
    }

    /// Parse a comma-separated list of item ids
    pub fn parse_item_ids(list: &str) -> Result<Vec<Uuid>> {
        let ids = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Uuid::parse_str(s).with_context(|| format!("Invalid item id '{}'", s)))
            .collect::<Result<Vec<_>>>()?;

        if ids.is_empty() {
            bail!("No item ids given");
        }
        Ok(ids)
    }
}
