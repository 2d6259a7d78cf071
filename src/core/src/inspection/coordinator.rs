use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use super::types::{DetailState, DetailView, SelectionToken};
use crate::annotation::{AnnotationRequest, Annotator, Language, RetryPolicy};
use crate::auth::RoleProvider;
use crate::error_handling::types::AnnotationError;
use crate::telemetry::Record;

struct Selection {
    token: SelectionToken,
    record: Option<Record>,
    state: DetailState,
}

/// One dispatched annotation, tagged with the selection that asked for it.
pub struct AnnotationJob {
    token: SelectionToken,
    request: AnnotationRequest,
    annotator: Arc<dyn Annotator>,
    retry: RetryPolicy,
}

impl AnnotationJob {
    pub fn token(&self) -> SelectionToken {
        self.token
    }

    pub fn request(&self) -> &AnnotationRequest {
        &self.request
    }

    /// Calls the annotator under the retry policy. Resolution is left to the
    /// caller so the outcome can be checked against the current token.
    pub async fn execute(self) -> (SelectionToken, Result<String, AnnotationError>) {
        let annotator = self.annotator;
        let request = self.request;
        let outcome = self.retry.run(|| annotator.annotate(&request)).await;
        (self.token, outcome)
    }
}

/// Tracks which record is inspected and its annotation.
///
/// Every `select` mints a new token; `resolve` only applies an outcome whose
/// token is still current, so a late response for an earlier selection can
/// never overwrite the panel.
pub struct DetailCoordinator {
    selection: Mutex<Selection>,
    annotator: Arc<dyn Annotator>,
    roles: Arc<dyn RoleProvider>,
    retry: RetryPolicy,
    language: Language,
}

impl DetailCoordinator {
    pub fn new(
        annotator: Arc<dyn Annotator>,
        roles: Arc<dyn RoleProvider>,
        retry: RetryPolicy,
        language: Language,
    ) -> Self {
        Self {
            selection: Mutex::new(Selection {
                token: SelectionToken(0),
                record: None,
                state: DetailState::Idle,
            }),
            annotator,
            roles,
            retry,
            language,
        }
    }

    pub fn current_token(&self) -> SelectionToken {
        self.lock().token
    }

    pub fn state(&self) -> DetailState {
        self.lock().state.clone()
    }

    /// Selects `record` (or clears the selection with `None`).
    ///
    /// Returns the annotation job to run when the acting principal may
    /// annotate; viewers land in `Restricted` and nothing is dispatched.
    pub fn select(&self, record: Option<Record>) -> Option<AnnotationJob> {
        let role = self.roles.current_role();
        let mut selection = self.lock();
        selection.token = SelectionToken(selection.token.0 + 1);
        let token = selection.token;

        let Some(record) = record else {
            selection.record = None;
            selection.state = DetailState::Idle;
            debug!("Selection cleared ({:?})", token);
            return None;
        };

        let sequence = record.sequence;
        let request = AnnotationRequest::new(
            record.info_text.clone(),
            format!("Protocol: {}, Length: {}", record.protocol_label, record.size_bytes),
            self.language,
        );
        selection.record = Some(record);

        if !role.can_annotate() {
            selection.state = DetailState::Restricted;
            info!("Record #{} selected by {}, annotation restricted", sequence, role);
            return None;
        }

        selection.state = DetailState::Pending;
        debug!("Record #{} selected ({:?}), annotation pending", sequence, token);
        Some(AnnotationJob {
            token,
            request,
            annotator: Arc::clone(&self.annotator),
            retry: self.retry,
        })
    }

    /// Applies `outcome` if `token` is current and the panel is pending.
    /// Returns whether it was applied.
    pub fn resolve(&self, token: SelectionToken, outcome: Result<String, AnnotationError>) -> bool {
        let mut selection = self.lock();
        if selection.token != token || selection.state != DetailState::Pending {
            debug!(
                "Dropping stale annotation for {:?} (current {:?})",
                token, selection.token
            );
            return false;
        }
        selection.state = match outcome {
            Ok(text) => DetailState::Annotated(text),
            Err(e) => {
                warn!("Annotation failed: {}", e);
                DetailState::Failed
            }
        };
        true
    }

    /// Selects `record` and runs its annotation on the runtime.
    pub fn select_and_spawn(self: &Arc<Self>, record: Option<Record>) -> Option<JoinHandle<()>> {
        let job = self.select(record)?;
        let coordinator = Arc::clone(self);
        Some(tokio::spawn(async move {
            let (token, outcome) = job.execute().await;
            coordinator.resolve(token, outcome);
        }))
    }

    /// Current panel contents.
    pub fn detail(&self) -> DetailView {
        let selection = self.lock();
        let record = selection.record.clone().map(|mut record| {
            if let DetailState::Annotated(text) = &selection.state {
                record.annotation = Some(text.clone());
            }
            record
        });
        DetailView {
            state: selection.state.label(),
            token: selection.token,
            record,
            message: selection.state.message().to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Selection> {
        self.selection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, StaticRole};
    use crate::inspection::types::{FAILED_MESSAGE, IDLE_MESSAGE, PENDING_MESSAGE, RESTRICTED_MESSAGE};
    use crate::telemetry::Severity;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Answers `annotation of <summary>`; summaries starting with `slow` wait
    /// for `release`, `hang` never answers, `boom` fails.
    struct MockAnnotator {
        calls: AtomicUsize,
        release: Notify,
    }

    impl MockAnnotator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                release: Notify::new(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Annotator for MockAnnotator {
        async fn annotate(&self, request: &AnnotationRequest) -> Result<String, AnnotationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.summary.starts_with("slow") {
                self.release.notified().await;
            }
            if request.summary.starts_with("hang") {
                std::future::pending::<()>().await;
            }
            if request.summary.starts_with("boom") {
                return Err(AnnotationError::BadStatus(400));
            }
            Ok(format!("annotation of {}", request.summary))
        }

        async fn generate(&self, prompt: &str) -> Result<String, AnnotationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(prompt.to_string())
        }
    }

    fn record(sequence: u64, info: &str) -> Record {
        Record {
            sequence,
            observed_at: Utc::now(),
            source_address: "192.168.1.15".into(),
            destination_address: "10.0.0.7".into(),
            protocol_label: "TCP".into(),
            size_bytes: 60,
            severity: Severity::Info,
            info_text: info.into(),
            annotation: None,
        }
    }

    fn coordinator(annotator: Arc<MockAnnotator>, role: Role) -> Arc<DetailCoordinator> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(DetailCoordinator::new(
            annotator,
            Arc::new(StaticRole(role)),
            RetryPolicy::new(Duration::from_secs(15), 2),
            Language::En,
        ))
    }

    #[test]
    fn starts_idle() {
        let coord = coordinator(MockAnnotator::new(), Role::Admin);
        let view = coord.detail();
        assert_eq!(view.state, "idle");
        assert_eq!(view.message, IDLE_MESSAGE);
        assert!(view.record.is_none());
    }

    #[tokio::test]
    async fn admin_selection_goes_pending_then_annotated() {
        let annotator = MockAnnotator::new();
        let coord = coordinator(annotator.clone(), Role::Admin);

        let job = coord.select(Some(record(4, "X"))).unwrap();
        assert_eq!(coord.state(), DetailState::Pending);
        assert_eq!(coord.detail().message, PENDING_MESSAGE);
        assert_eq!(job.request().context, "Protocol: TCP, Length: 60");

        assert!(coord.resolve(job.token(), Ok("T".to_string())));
        let view = coord.detail();
        assert_eq!(coord.state(), DetailState::Annotated("T".into()));
        assert_eq!(view.record.unwrap().annotation.as_deref(), Some("T"));
        assert_eq!(view.message, "T");
        assert_eq!(annotator.calls(), 0);
    }

    #[tokio::test]
    async fn viewer_selection_is_restricted_with_zero_calls() {
        let annotator = MockAnnotator::new();
        let coord = coordinator(annotator.clone(), Role::Viewer);

        assert!(coord.select_and_spawn(Some(record(1, "X"))).is_none());
        assert!(coord.select(Some(record(2, "Y"))).is_none());

        tokio::task::yield_now().await;
        assert_eq!(coord.state(), DetailState::Restricted);
        let view = coord.detail();
        assert_eq!(view.message, RESTRICTED_MESSAGE);
        assert_eq!(view.record.unwrap().sequence, 2);
        assert_eq!(annotator.calls(), 0);
    }

    #[test]
    fn late_response_for_previous_selection_is_dropped() {
        let coord = coordinator(MockAnnotator::new(), Role::Analyst);

        let job_a = coord.select(Some(record(1, "A"))).unwrap();
        let job_b = coord.select(Some(record(2, "B"))).unwrap();

        assert!(!coord.resolve(job_a.token(), Ok("late A".into())));
        assert_eq!(coord.state(), DetailState::Pending);
        assert_eq!(coord.detail().record.unwrap().sequence, 2);

        assert!(coord.resolve(job_b.token(), Ok("B done".into())));
        assert_eq!(coord.state(), DetailState::Annotated("B done".into()));
    }

    #[test]
    fn clearing_the_selection_invalidates_in_flight_jobs() {
        let coord = coordinator(MockAnnotator::new(), Role::Admin);
        let job = coord.select(Some(record(1, "A"))).unwrap();
        assert!(coord.select(None).is_none());

        assert!(!coord.resolve(job.token(), Ok("late".into())));
        assert_eq!(coord.state(), DetailState::Idle);
    }

    #[test]
    fn second_resolution_is_ignored() {
        let coord = coordinator(MockAnnotator::new(), Role::Admin);
        let job = coord.select(Some(record(1, "A"))).unwrap();
        let token = job.token();
        assert!(coord.resolve(token, Err(AnnotationError::EmptyResponse)));
        assert!(!coord.resolve(token, Ok("after failure".into())));
        assert_eq!(coord.detail().message, FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn spawned_stale_response_never_overwrites_newer_selection() {
        let annotator = MockAnnotator::new();
        let coord = coordinator(annotator.clone(), Role::Admin);

        let slow = coord.select_and_spawn(Some(record(1, "slow A"))).unwrap();
        tokio::task::yield_now().await;
        let fast = coord.select_and_spawn(Some(record(2, "B"))).unwrap();
        fast.await.unwrap();
        assert_eq!(coord.state(), DetailState::Annotated("annotation of B".into()));

        annotator.release.notify_one();
        slow.await.unwrap();

        let view = coord.detail();
        assert_eq!(view.record.as_ref().unwrap().sequence, 2);
        assert_eq!(view.message, "annotation of B");
        assert_eq!(annotator.calls(), 2);
    }

    #[tokio::test]
    async fn annotator_error_shows_fixed_message() {
        let annotator = MockAnnotator::new();
        let coord = coordinator(annotator.clone(), Role::Admin);

        coord
            .select_and_spawn(Some(record(1, "boom")))
            .unwrap()
            .await
            .unwrap();

        let view = coord.detail();
        assert_eq!(view.state, "failed");
        assert_eq!(view.message, FAILED_MESSAGE);
        assert!(view.record.unwrap().annotation.is_none());
        // 400 is not retried
        assert_eq!(annotator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_service_times_out_into_failed() {
        let annotator = MockAnnotator::new();
        let coord = coordinator(annotator.clone(), Role::Admin);

        coord
            .select_and_spawn(Some(record(1, "hang")))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(coord.state(), DetailState::Failed);
        assert_eq!(annotator.calls(), 2);
    }
}
