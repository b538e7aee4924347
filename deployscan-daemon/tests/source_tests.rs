//! Event source integration tests.
//!
//! Feeds newline-delimited events through `process_events` with a mock
//! execution platform and in-memory storage.

use std::sync::Arc;

use deployscan_core::clock::{Clock, ManualClock};
use deployscan_daemon::source::process_events;
use deployscan_intake::{EventHandler, EventHandlerBuilder};
use deployscan_scan_job::{ScanJobConfig, ScanJobOrchestrator, StaticSecretStore};
use deployscan_store::MemoryStorage;
use serde_json::json;

// Mock execution platform for integration tests
mod mock {
    use std::sync::Arc;

    use deployscan_scan_job::{ExecutionPlatform, ScanJobError, UnitSpec, UnitStatus};
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    pub struct TestPlatform {
        pub created: Arc<Mutex<Vec<String>>>,
        pub deleted: Arc<Mutex<Vec<String>>>,
    }

    impl ExecutionPlatform for TestPlatform {
        async fn create(&self, spec: &UnitSpec) -> Result<(), ScanJobError> {
            self.created.lock().await.push(spec.name.clone());
            Ok(())
        }

        async fn status(&self, _name: &str) -> Result<UnitStatus, ScanJobError> {
            Ok(UnitStatus::Exited { exit_code: 0 })
        }

        async fn logs(&self, _name: &str) -> Result<String, ScanJobError> {
            Ok(r#"{"scanId":"t-1","summary":{"high":1}}"#.to_owned())
        }

        async fn terminate(&self, _name: &str) -> Result<(), ScanJobError> {
            Ok(())
        }

        async fn delete(&self, name: &str) -> Result<(), ScanJobError> {
            self.deleted.lock().await.push(name.to_owned());
            Ok(())
        }
    }
}

use mock::TestPlatform;

fn handler(platform: &TestPlatform) -> Arc<EventHandler<TestPlatform, MemoryStorage, StaticSecretStore>> {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let scan_config = ScanJobConfig::default();
    let mut secrets = StaticSecretStore::default();
    for mapping in &scan_config.credentials {
        secrets = secrets.with_secret(mapping.secret.clone(), "token");
    }
    let orchestrator =
        ScanJobOrchestrator::new(Arc::new(platform.clone()), scan_config, Arc::clone(&clock));
    Arc::new(
        EventHandlerBuilder::new()
            .orchestrator(orchestrator)
            .storage(Arc::new(MemoryStorage::new()))
            .secrets(Arc::new(secrets))
            .clock(clock)
            .build()
            .unwrap(),
    )
}

fn app_event(id: &str, app: &str, image: &str) -> String {
    json!({
        "id": id,
        "eventType": "Microsoft.Resources.ResourceWriteSuccess",
        "subject": format!("/subscriptions/s/resourceGroups/rg/providers/Microsoft.App/containerApps/{app}"),
        "data": {
            "properties": { "template": { "containers": [ { "name": "main", "image": image } ] } }
        }
    })
    .to_string()
}

#[tokio::test(start_paused = true)]
async fn processes_every_line() {
    let platform = TestPlatform::default();
    let input = [
        app_event("evt-1", "frontend", "nginx:1.25"),
        String::new(),
        "{ not json".to_owned(),
        app_event("evt-2", "backend", "redis:7"),
        app_event("evt-3", "dscan-redis-1-abc", "redis:7"),
    ]
    .join("\n");

    let summary = process_events(
        input.as_bytes(),
        handler(&platform),
        4,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    assert_eq!(summary.events, 4);
    assert_eq!(summary.ignored, 2);
    assert_eq!(summary.images, 2);
    assert_eq!(summary.scanned, 2);
    assert!(summary.is_clean());
    assert_eq!(platform.created.lock().await.len(), 2);
    assert_eq!(platform.deleted.lock().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn single_slot_processes_sequentially() {
    let platform = TestPlatform::default();
    let input = [
        app_event("evt-1", "a", "nginx:1.25"),
        app_event("evt-2", "b", "nginx:1.25"),
    ]
    .join("\n");

    let summary = process_events(
        input.as_bytes(),
        handler(&platform),
        1,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    // the second event sees the cache entry written by the first
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.cache_hits, 1);
    assert_eq!(platform.created.lock().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn batched_line_handles_every_element() {
    let platform = TestPlatform::default();
    let batch: Vec<serde_json::Value> = [
        app_event("evt-1", "frontend", "nginx:1.25"),
        app_event("evt-2", "backend", "redis:7"),
        app_event("evt-3", "worker", "alpine:3.19"),
    ]
    .iter()
    .map(|raw| serde_json::from_str(raw).unwrap())
    .collect();
    let input = serde_json::Value::Array(batch).to_string();

    let summary = process_events(
        input.as_bytes(),
        handler(&platform),
        4,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    assert_eq!(summary.events, 3);
    assert_eq!(summary.ignored, 0);
    assert_eq!(summary.scanned, 3);
    assert_eq!(platform.created.lock().await.len(), 3);
}

#[tokio::test]
async fn shutdown_stops_reading() {
    let platform = TestPlatform::default();
    let input = app_event("evt-1", "a", "nginx:1.25");

    let summary = process_events(
        input.as_bytes(),
        handler(&platform),
        4,
        std::future::ready(()),
    )
    .await
    .unwrap();

    assert_eq!(summary.events, 0);
    assert!(platform.created.lock().await.is_empty());
}
