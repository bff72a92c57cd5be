//! Run coordinator behaviour against scripted probes

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tunnelwatch::probe::Checker;
use tunnelwatch::{
    CheckResult, CheckStatus, MemoryStore, ProbeOutcome, ProtocolConfig, ProtocolKind,
    RunCoordinator, StatusStore, TransitionListener,
};

/// Returns queued outcomes per protocol id, repeating the last one
#[derive(Default)]
struct ScriptedChecker {
    script: Mutex<HashMap<String, Vec<ProbeOutcome>>>,
    delays: HashMap<String, Duration>,
}

impl ScriptedChecker {
    fn new(script: Vec<(&str, Vec<ProbeOutcome>)>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(|(id, o)| (id.to_string(), o)).collect()),
            delays: HashMap::new(),
        }
    }

    fn with_delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, config: &ProtocolConfig) -> ProbeOutcome {
        if let Some(delay) = self.delays.get(&config.id) {
            tokio::time::sleep(*delay).await;
        }

        let mut script = self.script.lock().await;
        let queue = script.get_mut(&config.id).expect("unscripted protocol");
        if queue.len() > 1 { queue.remove(0) } else { queue[0].clone() }
    }
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(Option<CheckStatus>, String)>>,
}

#[async_trait]
impl TransitionListener for Recorder {
    async fn on_transition(
        &self,
        old: Option<&CheckResult>,
        new: &CheckResult,
        _config: &ProtocolConfig,
    ) -> anyhow::Result<()> {
        self.seen.lock().await.push((old.map(|r| r.status), new.protocol_id.clone()));
        Ok(())
    }
}

struct Failing(AtomicUsize);

#[async_trait]
impl TransitionListener for Failing {
    async fn on_transition(
        &self,
        _old: Option<&CheckResult>,
        _new: &CheckResult,
        _config: &ProtocolConfig,
    ) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("chat service unavailable")
    }
}

struct Panicking;

#[async_trait]
impl TransitionListener for Panicking {
    async fn on_transition(
        &self,
        _old: Option<&CheckResult>,
        _new: &CheckResult,
        _config: &ProtocolConfig,
    ) -> anyhow::Result<()> {
        panic!("listener bug")
    }
}

fn protocol(id: &str) -> ProtocolConfig {
    ProtocolConfig::new(id, ProtocolKind::OpenVpn, "127.0.0.1", 1194)
}

#[tokio::test]
async fn test_one_result_per_protocol() {
    let _ = tracing_subscriber::fmt::try_init();

    let store = Arc::new(MemoryStore::with_protocols(vec![protocol("a"), protocol("b"), protocol("c")]));
    let checker = ScriptedChecker::new(vec![
        ("a", vec![ProbeOutcome::connected(Some(10))]),
        ("b", vec![ProbeOutcome::disconnected("TCP connection failed: refused")]),
        ("c", vec![ProbeOutcome::error("client did not become ready in 10s")]),
    ]);
    let coordinator = RunCoordinator::new(store.clone(), Arc::new(checker));

    let summary = coordinator.run_once().await.unwrap();
    assert_eq!(summary.checked, 3);
    assert_eq!((summary.connected, summary.disconnected, summary.errors), (1, 1, 1));

    let status = store.local_status().await.unwrap();
    assert_eq!(status.len(), 3);
    assert_eq!(status["a"].latency_ms, Some(10));
    assert_eq!(status["b"].status, CheckStatus::Disconnected);
    assert_eq!(status["c"].error.as_deref(), Some("client did not become ready in 10s"));
}

#[tokio::test]
async fn test_notifies_once_per_edge_into_connected() {
    let store = Arc::new(MemoryStore::with_protocols(vec![protocol("p1")]));
    let checker = ScriptedChecker::new(vec![(
        "p1",
        vec![
            ProbeOutcome::disconnected("down"),
            ProbeOutcome::connected(Some(20)),
            ProbeOutcome::connected(Some(25)),
            ProbeOutcome::error("timeout"),
            ProbeOutcome::connected(Some(30)),
        ],
    )]);
    let coordinator = RunCoordinator::new(store, Arc::new(checker));
    let recorder = Arc::new(Recorder::default());
    coordinator.register(recorder.clone());

    let mut notified = Vec::new();
    for _ in 0..5 {
        notified.push(coordinator.run_once().await.unwrap().notified);
    }

    assert_eq!(notified, vec![0, 1, 0, 0, 1]);
    assert_eq!(
        *recorder.seen.lock().await,
        vec![
            (Some(CheckStatus::Disconnected), "p1".to_string()),
            (Some(CheckStatus::Error), "p1".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_first_connected_result_notifies() {
    let store = Arc::new(MemoryStore::with_protocols(vec![protocol("p1")]));
    let checker = ScriptedChecker::new(vec![("p1", vec![ProbeOutcome::connected(None)])]);
    let coordinator = RunCoordinator::new(store, Arc::new(checker));
    let recorder = Arc::new(Recorder::default());
    coordinator.register(recorder.clone());

    coordinator.run_once().await.unwrap();
    coordinator.run_once().await.unwrap();

    assert_eq!(*recorder.seen.lock().await, vec![(None, "p1".to_string())]);
}

#[tokio::test]
async fn test_listener_failures_are_isolated() {
    let store = Arc::new(MemoryStore::with_protocols(vec![protocol("p1"), protocol("p2")]));
    let checker = ScriptedChecker::new(vec![
        ("p1", vec![ProbeOutcome::connected(Some(1))]),
        ("p2", vec![ProbeOutcome::connected(Some(2))]),
    ]);
    let coordinator = RunCoordinator::new(store.clone(), Arc::new(checker));

    let failing = Arc::new(Failing(AtomicUsize::new(0)));
    let recorder = Arc::new(Recorder::default());
    coordinator.register(failing.clone());
    coordinator.register(Arc::new(Panicking));
    coordinator.register(recorder.clone());

    let summary = coordinator.run_once().await.unwrap();

    assert_eq!(summary.notified, 2);
    assert_eq!(failing.0.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.seen.lock().await.len(), 2);
    assert_eq!(store.local_status().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_slow_probe_does_not_delay_others() {
    let store = Arc::new(MemoryStore::with_protocols(vec![
        protocol("slow-1"),
        protocol("slow-2"),
        protocol("slow-3"),
    ]));
    let checker = ScriptedChecker::new(vec![
        ("slow-1", vec![ProbeOutcome::connected(None)]),
        ("slow-2", vec![ProbeOutcome::connected(None)]),
        ("slow-3", vec![ProbeOutcome::connected(None)]),
    ])
    .with_delay("slow-1", Duration::from_millis(400))
    .with_delay("slow-2", Duration::from_millis(400))
    .with_delay("slow-3", Duration::from_millis(400));
    let coordinator = RunCoordinator::new(store, Arc::new(checker));

    let start = Instant::now();
    let summary = coordinator.run_once().await.unwrap();

    assert_eq!(summary.checked, 3);
    assert!(start.elapsed() < Duration::from_millis(1100), "checks ran sequentially");
}

#[tokio::test]
async fn test_removed_protocol_is_not_checked() {
    let store = Arc::new(MemoryStore::with_protocols(vec![protocol("keep"), protocol("drop")]));
    let checker = ScriptedChecker::new(vec![
        ("keep", vec![ProbeOutcome::connected(None)]),
        ("drop", vec![ProbeOutcome::connected(None)]),
    ]);
    let coordinator = RunCoordinator::new(store.clone(), Arc::new(checker));

    coordinator.run_once().await.unwrap();
    assert!(store.remove_protocol("drop").await.unwrap());

    let summary = coordinator.run_once().await.unwrap();
    assert_eq!(summary.checked, 1);

    let status = store.local_status().await.unwrap();
    assert!(status.contains_key("keep"));
    assert!(!status.contains_key("drop"));
}

#[tokio::test]
async fn test_empty_store_is_a_noop_run() {
    let coordinator = RunCoordinator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptedChecker::default()),
    );
    let summary = coordinator.run_once().await.unwrap();
    assert_eq!(summary.checked, 0);
}
