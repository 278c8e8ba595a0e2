#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use parley::config::{DatabaseConfig, LockConfig, PipelineConfig};
use parley::context::{ContextManager, ResolutionCache};
use parley::db::{Database, DatabaseBackend, LibSqlBackend};
use parley::error::{ParleyError, Result};
use parley::llm::ReasoningCapability;
use parley::lock::DistributedMutex;
use parley::pipeline::{Pipeline, Stage};
use parley::services::{DocumentService, MessageService};

/// Answers each call with the next queued decision, optionally after a delay.
#[derive(Default)]
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Value>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedReasoner {
    pub fn push(&self, decision: Value) {
        self.script.lock().unwrap().push_back(decision);
    }

    pub fn push_all(&self, decisions: impl IntoIterator<Item = Value>) {
        for decision in decisions {
            self.push(decision);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were ever running at the same moment.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ReasoningCapability for ScriptedReasoner {
    async fn decide(&self, stage: Stage, _prompt: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ParleyError::Internal(format!("no scripted decision for {stage}")))
    }
}

pub async fn temp_database(dir: &TempDir) -> Arc<dyn DatabaseBackend> {
    let config = DatabaseConfig::local(dir.path().join("parley.db").display().to_string());
    Arc::new(LibSqlBackend::new(
        Database::new(&config).await.expect("open test database"),
    ))
}

pub struct TestApp {
    pub documents: DocumentService,
    pub messages: MessageService,
    pub reasoner: Arc<ScriptedReasoner>,
    pub shutdown: CancellationToken,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(PipelineConfig::default(), LockConfig::default()).await
    }

    pub async fn with_config(pipeline_config: PipelineConfig, lock_config: LockConfig) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db = temp_database(&dir).await;
        let reasoner = Arc::new(ScriptedReasoner::default());

        let documents = DocumentService::new(db.clone());
        let context = ContextManager::new(
            db,
            ResolutionCache::new(pipeline_config.resolution_cache_capacity),
            pipeline_config.resolution_ttl_turns,
        );
        let lock = DistributedMutex::from_config(&lock_config).expect("in-process lock");
        let pipeline = Pipeline::new(
            reasoner.clone(),
            documents.clone(),
            Duration::from_secs(pipeline_config.stage_timeout_secs),
        );
        let shutdown = CancellationToken::new();
        let messages = MessageService::new(
            context,
            lock,
            pipeline,
            pipeline_config,
            shutdown.clone(),
        );

        Self {
            documents,
            messages,
            reasoner,
            shutdown,
            _dir: dir,
        }
    }
}
