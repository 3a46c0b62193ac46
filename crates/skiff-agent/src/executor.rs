//! The work-executor contract and its in-memory implementation.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use skiff_core::model::event::{Event, EventKind};
use skiff_core::model::status::{EventResult, ResourceStatus};
use skiff_core::{Error, Result};

/// Executes the payload of one event against the local cluster.
///
/// `validate` runs before any change is applied; `execute` performs the
/// work and reports per-resource outcomes.
#[async_trait]
pub trait EventExecutor: Send + Sync {
    async fn validate(&self, event: &Event) -> Result<()>;
    async fn execute(&self, event: &Event) -> Result<EventResult>;
}

/// In-memory executor for tests and local runs.
///
/// Records every executed event id and fabricates one `created` outcome
/// per manifest. `failing()` builds an executor whose executions fail.
pub struct SimExecutor {
    executed: Mutex<Vec<String>>,
    fail_with: Option<String>,
}

impl SimExecutor {
    pub fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    /// Executor whose `execute` always fails with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    /// Ids of events executed so far
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().expect("executor lock poisoned").clone()
    }
}

impl Default for SimExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull `kind:`/`name:` out of a raw manifest without a YAML parser;
/// enough for simulated outcomes.
fn manifest_field(manifest: &str, field: &str) -> String {
    let prefix = format!("{field}:");
    manifest
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(&prefix))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl EventExecutor for SimExecutor {
    async fn validate(&self, event: &Event) -> Result<()> {
        if let EventKind::K8sResource { manifests } = &event.kind {
            if manifests.iter().any(|m| m.trim().is_empty()) {
                return Err(Error::EmptyManifests {
                    id: event.id.clone(),
                });
            }
        }
        Ok(())
    }

    async fn execute(&self, event: &Event) -> Result<EventResult> {
        self.executed
            .lock()
            .expect("executor lock poisoned")
            .push(event.id.clone());

        if let Some(message) = &self.fail_with {
            return Ok(EventResult {
                success: false,
                resource_status: Vec::new(),
                error_message: message.clone(),
                completed_at: Utc::now(),
                duration_ms: 0,
            });
        }

        let resource_status = match &event.kind {
            EventKind::K8sResource { manifests } => manifests
                .iter()
                .map(|manifest| ResourceStatus {
                    kind: manifest_field(manifest, "kind"),
                    name: manifest_field(manifest, "name"),
                    namespace: manifest_field(manifest, "namespace"),
                    api_version: manifest_field(manifest, "apiVersion"),
                    status: "created".to_string(),
                    message: String::new(),
                })
                .collect(),
            EventKind::Script { .. } | EventKind::Policy { .. } => Vec::new(),
        };

        Ok(EventResult {
            success: true,
            resource_status,
            error_message: String::new(),
            completed_at: Utc::now(),
            duration_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_event() -> Event {
        Event::new(
            EventKind::K8sResource {
                manifests: vec![
                    "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo".into(),
                ],
            },
            "a1",
            "tester",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_execute_reports_per_manifest_outcomes() {
        let executor = SimExecutor::new();
        let event = manifest_event();

        let result = executor.execute(&event).await.unwrap();
        assert!(result.success);
        assert_eq!(result.resource_status.len(), 1);
        assert_eq!(result.resource_status[0].kind, "Namespace");
        assert_eq!(result.resource_status[0].name, "demo");
        assert_eq!(result.resource_status[0].status, "created");

        assert_eq!(executor.executed(), vec![event.id]);
    }

    #[tokio::test]
    async fn test_validate_rejects_blank_manifest() {
        let executor = SimExecutor::new();
        let mut event = manifest_event();
        event.kind = EventKind::K8sResource {
            manifests: vec!["   ".into()],
        };

        assert!(executor.validate(&event).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_executor() {
        let executor = SimExecutor::failing("connection refused");
        let result = executor.execute(&manifest_event()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error_message, "connection refused");
    }

    #[tokio::test]
    async fn test_script_event_has_no_resource_outcomes() {
        let executor = SimExecutor::new();
        let event = Event::new(
            EventKind::Script {
                script: "echo hi".into(),
                args: vec![],
            },
            "a1",
            "tester",
            Utc::now(),
        );

        let result = executor.execute(&event).await.unwrap();
        assert!(result.success);
        assert!(result.resource_status.is_empty());
    }
}
