//! In-memory providers for pipeline and server tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tagteam_gd::config::PipelineConfig;
use tagteam_gd::models::{AppCommon, AppDetails, AppInfo, CatalogEntry, CatalogPage, GameId};
use tagteam_gd::provider::{CatalogProvider, DetailProvider, DetailSession};
use tagteam_gd::reconcile::{PipelineContext, ReconcileOutcome, ReconciliationDriver};
use tagteam_gd::store::DataFiles;
use tagteam_gd::ProviderError;

// ============================================================================
// Catalog
// ============================================================================

/// Single-page catalog, or one that always fails
pub struct FakeCatalog {
    entries: Vec<CatalogEntry>,
    fail: bool,
    pub calls: Mutex<usize>,
}

impl FakeCatalog {
    pub fn new(entries: &[(GameId, &str)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(id, name)| CatalogEntry {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
            fail: false,
            calls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            entries: Vec::new(),
            fail: true,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl CatalogProvider for FakeCatalog {
    async fn fetch_page(
        &self,
        _cursor: Option<GameId>,
        _max_results: u32,
    ) -> Result<CatalogPage, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(ProviderError::Api {
                status: 429,
                message: "Too Many Requests".to_string(),
            });
        }
        Ok(CatalogPage {
            entries: self.entries.clone(),
            have_more: false,
            last_id: self.entries.last().map(|e| e.id),
        })
    }
}

// ============================================================================
// Details
// ============================================================================

#[derive(Debug, Clone)]
pub enum Reply {
    Found(&'static str),
    Unknown,
    /// Provider unavailable (empty body)
    Fail,
    /// Provider answered with a body that does not parse
    Malformed,
}

#[derive(Default)]
struct Inner {
    /// Scripted replies per id; the last reply repeats, unscripted ids are unknown
    replies: Mutex<HashMap<GameId, VecDeque<Reply>>>,
    requests: Mutex<Vec<GameId>>,
    /// When set, the store size on disk is sampled before every request
    observe: Option<DataFiles>,
    observed: Mutex<Vec<usize>>,
    refuse_connect: bool,
    disconnects: Mutex<usize>,
}

impl Inner {
    fn next_reply(&self, id: GameId) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(&id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Unknown),
            None => Reply::Unknown,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeDetails {
    inner: Arc<Inner>,
}

impl FakeDetails {
    /// Replies for an id are served in script order
    pub fn new(script: &[(GameId, Reply)]) -> Self {
        Self::build(script, None, false)
    }

    /// Records how many store entries were on disk at each request
    pub fn observing(script: &[(GameId, Reply)], files: DataFiles) -> Self {
        Self::build(script, Some(files), false)
    }

    pub fn refusing() -> Self {
        Self::build(&[], None, true)
    }

    fn build(script: &[(GameId, Reply)], observe: Option<DataFiles>, refuse_connect: bool) -> Self {
        let mut replies: HashMap<GameId, VecDeque<Reply>> = HashMap::new();
        for (id, reply) in script {
            replies.entry(*id).or_default().push_back(reply.clone());
        }
        Self {
            inner: Arc::new(Inner {
                replies: Mutex::new(replies),
                observe,
                refuse_connect,
                ..Default::default()
            }),
        }
    }

    pub fn requests(&self) -> Vec<GameId> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn observed(&self) -> Vec<usize> {
        self.inner.observed.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        *self.inner.disconnects.lock().unwrap()
    }
}

#[async_trait]
impl DetailProvider for FakeDetails {
    async fn connect(&self) -> Result<Box<dyn DetailSession>, ProviderError> {
        if self.inner.refuse_connect {
            return Err(ProviderError::Connect("login refused".to_string()));
        }
        Ok(Box::new(FakeSession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct FakeSession {
    inner: Arc<Inner>,
}

#[async_trait]
impl DetailSession for FakeSession {
    async fn app_details(&mut self, id: GameId) -> Result<AppDetails, ProviderError> {
        self.inner.requests.lock().unwrap().push(id);
        if let Some(files) = &self.inner.observe {
            let on_disk = files.load_store().unwrap().len();
            self.inner.observed.lock().unwrap().push(on_disk);
        }

        match self.inner.next_reply(id) {
            Reply::Found(name) => Ok(AppDetails::Found(AppInfo {
                common: Some(AppCommon {
                    name: Some(name.to_string()),
                    ..Default::default()
                }),
            })),
            Reply::Unknown => Ok(AppDetails::Unknown),
            Reply::Fail => Err(ProviderError::EmptyPayload),
            Reply::Malformed => Err(ProviderError::Parse(format!(
                "app {id}: invalid type: map, expected a string"
            ))),
        }
    }

    async fn disconnect(self: Box<Self>) {
        *self.inner.disconnects.lock().unwrap() += 1;
    }
}

// ============================================================================
// Driver helpers
// ============================================================================

pub fn pipeline(checkpoint_period: usize, run_budget: usize) -> PipelineConfig {
    PipelineConfig {
        page_size: 100,
        checkpoint_period,
        run_budget,
        max_consecutive_failures: 0,
    }
}

pub fn driver(
    dir: &Path,
    catalog: FakeCatalog,
    details: &FakeDetails,
    config: PipelineConfig,
) -> ReconciliationDriver {
    ReconciliationDriver::new(
        Arc::new(catalog),
        Arc::new(details.clone()),
        DataFiles::in_dir(dir),
        config,
    )
}

pub fn expect_ready(outcome: ReconcileOutcome) -> PipelineContext {
    match outcome {
        ReconcileOutcome::Ready(context) => context,
        ReconcileOutcome::Blocked(reason) => panic!("expected Ready, got Blocked: {reason}"),
    }
}
