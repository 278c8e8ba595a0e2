use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::{ContextManager, ResolutionCache};
use crate::db::{Database, DatabaseBackend, LibSqlBackend};
use crate::error::Result;
use crate::llm::{LlmProvider, LlmReasoner, ReasoningCapability};
use crate::lock::DistributedMutex;
use crate::pipeline::Pipeline;
use crate::services::{DocumentService, MessageService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn DatabaseBackend>,
    pub llm: LlmProvider,
    pub documents: DocumentService,
    pub messages: MessageService,
}

impl AppState {
    /// Opens the database and wires the LLM-backed reasoner.
    pub async fn from_config(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let raw_db = Database::new(&config.database).await?;
        let db: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(raw_db));

        let llm = LlmProvider::new(config.llm.as_ref());
        if !llm.is_available() {
            tracing::warn!("LLM is not configured; messages will fail until LLM_MODEL is set");
        }
        let reasoner: Arc<dyn ReasoningCapability> = Arc::new(LlmReasoner::new(llm.clone()));

        Self::assemble(config, db, llm, reasoner, shutdown)
    }

    /// Builds every service over an open database and a given reasoner.
    pub fn assemble(
        config: Config,
        db: Arc<dyn DatabaseBackend>,
        llm: LlmProvider,
        reasoner: Arc<dyn ReasoningCapability>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let documents = DocumentService::new(db.clone());
        let cache = ResolutionCache::new(config.pipeline.resolution_cache_capacity);
        let context = ContextManager::new(db.clone(), cache, config.pipeline.resolution_ttl_turns);
        let lock = DistributedMutex::from_config(&config.lock)?;
        let pipeline = Pipeline::new(
            reasoner,
            documents.clone(),
            Duration::from_secs(config.pipeline.stage_timeout_secs),
        );
        let messages = MessageService::new(
            context,
            lock,
            pipeline,
            config.pipeline.clone(),
            shutdown,
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            llm,
            documents,
            messages,
        })
    }
}
