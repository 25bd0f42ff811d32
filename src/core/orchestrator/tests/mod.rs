
use std::sync::Arc;

use crate::core::config::StageTimeouts;
use crate::core::memory::{ProductionRepository, SqliteProductionRepository};
use crate::core::notify::NotificationBridge;
use crate::core::orchestrator::{Orchestrator, StartTarget};
use crate::core::production::{Production, Stage, Status};
use crate::core::stage::StageInvoker;
use crate::core::testing::{CallLog, ScriptedProvider};

pub(super) struct Harness {
    pub orch: Orchestrator,
    pub repo: Arc<SqliteProductionRepository>,
    pub calls: CallLog,
}

pub(super) fn harness(provider: ScriptedProvider) -> Harness {
    let repo = Arc::new(SqliteProductionRepository::open_in_memory().expect("in-memory repo"));
    harness_with_repo(provider, repo.clone(), repo)
}

/// Lets a test put a wrapper between the orchestrator and the store while
/// still inspecting the store directly.
pub(super) fn harness_with_repo(
    provider: ScriptedProvider,
    store: Arc<dyn ProductionRepository>,
    repo: Arc<SqliteProductionRepository>,
) -> Harness {
    let calls = provider.calls();
    let invoker = StageInvoker::new(Arc::new(provider), StageTimeouts::default());
    Harness {
        orch: Orchestrator::new(store, invoker, NotificationBridge::new(32)),
        repo,
        calls,
    }
}

pub(super) fn new_target(name: &str) -> StartTarget {
    StartTarget::New {
        owner_id: "owner-1".to_string(),
        name: name.to_string(),
    }
}

/// Starts a fresh production and checks it parked at the theme touchpoint.
pub(super) async fn started(h: &Harness) -> Production {
    let p = h
        .orch
        .start(new_target("Origin Story"), "Specialty coffee roaster", "curious")
        .await
        .unwrap();
    assert_eq!((p.stage, p.status), (Stage::Ideation, Status::Touchpoint));
    p
}
