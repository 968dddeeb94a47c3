//! Verification pipeline
//!
//! One citizen session moving through
//! `START -> DOCUMENT -> BIOMETRICS -> BEHAVIOR -> SCORING -> RESULT`.
//!
//! Every trigger advances at most one stage. A trigger that arrives while the
//! session is busy, or in the wrong stage, changes nothing and comes back as
//! [`Advance::Ignored`]. Failures leave the stage where it was so the caller
//! can retry.
//!
//! The session lives behind a `std::sync::Mutex` that is only ever held for
//! a few field updates, never across an await. The busy flag is what keeps a
//! second trigger out while a capability call is in flight, and [`BusyGuard`]
//! clears it on every exit path, including a dropped request future.

use crate::analysis::{
    BehaviorAssessor, BiometricAssessor, BiometricCapture, DocumentAnalyzer, HumanConfirmation,
    ImagePayload,
};
use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::error::AppError;
use crate::store::AdjudicationStore;
use crate::verification::decision::{decide, ensure_analysis_score, ensure_unit_score};
use crate::verification::outcome::{Outcome, RiskScores};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Start,
    Document,
    Biometrics,
    Behavior,
    Scoring,
    Result,
}

impl Stage {
    /// Position in the flow, 0 for START through 5 for RESULT
    pub fn number(self) -> u8 {
        match self {
            Stage::Start => 0,
            Stage::Document => 1,
            Stage::Biometrics => 2,
            Stage::Behavior => 3,
            Stage::Scoring => 4,
            Stage::Result => 5,
        }
    }

    fn next(self) -> Stage {
        match self {
            Stage::Start => Stage::Document,
            Stage::Document => Stage::Biometrics,
            Stage::Biometrics => Stage::Behavior,
            Stage::Behavior => Stage::Scoring,
            Stage::Scoring | Stage::Result => Stage::Result,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Start => "START",
            Stage::Document => "DOCUMENT",
            Stage::Biometrics => "BIOMETRICS",
            Stage::Behavior => "BEHAVIOR",
            Stage::Scoring => "SCORING",
            Stage::Result => "RESULT",
        };
        f.write_str(name)
    }
}

/// Why a trigger did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum IgnoreReason {
    Busy,
    OutOfOrder { expected: Stage, actual: Stage },
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::Busy => write!(f, "session is busy with a previous step"),
            IgnoreReason::OutOfOrder { expected, actual } => write!(
                f,
                "step belongs to stage {} but the session is in {}",
                expected, actual
            ),
        }
    }
}

/// Result of a pipeline trigger
#[derive(Debug, Clone)]
pub enum Advance {
    Moved(SessionView),
    Ignored(IgnoreReason),
}

impl Advance {
    /// Collapse into a view, reporting an ignored trigger as `StageIgnored`
    pub fn into_result(self) -> Result<SessionView, AppError> {
        match self {
            Advance::Moved(view) => Ok(view),
            Advance::Ignored(reason) => Err(AppError::StageIgnored(reason.to_string())),
        }
    }

    #[cfg(test)]
    pub fn is_moved(&self) -> bool {
        matches!(self, Advance::Moved(_))
    }
}

/// Read-only snapshot of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub stage: Stage,
    pub stage_number: u8,
    pub busy: bool,
    pub document_risk: Option<f64>,
    pub biometric_risk: Option<f64>,
    pub behavior_risk: Option<f64>,
    pub is_synthetic_document: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// Collaborators shared by every pipeline
pub struct VerificationServices {
    pub document: Arc<dyn DocumentAnalyzer>,
    pub biometrics: Arc<dyn BiometricAssessor>,
    pub behavior: Arc<dyn BehaviorAssessor>,
    pub store: Arc<dyn AdjudicationStore>,
    pub audit: Arc<AuditLog>,
    /// Bound on each capability call
    pub analysis_timeout: Duration,
    /// Simulated aggregation delay before the decision rule runs
    pub scoring_latency: Duration,
    pub max_document_bytes: usize,
}

#[derive(Debug)]
struct Session {
    id: Uuid,
    stage: Stage,
    busy: bool,
    document_risk: Option<f64>,
    biometric_risk: Option<f64>,
    behavior_risk: Option<f64>,
    is_synthetic_document: bool,
    document_reasoning: Option<String>,
    document_digest: Option<String>,
    /// Built on the first scoring attempt and re-submitted by every retry
    pending_outcome: Option<Outcome>,
    outcome: Option<Outcome>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: Stage::Start,
            busy: false,
            document_risk: None,
            biometric_risk: None,
            behavior_risk: None,
            is_synthetic_document: false,
            document_reasoning: None,
            document_digest: None,
            pending_outcome: None,
            outcome: None,
        }
    }

    fn check(&self, required: Stage) -> Option<IgnoreReason> {
        if self.busy {
            Some(IgnoreReason::Busy)
        } else if self.stage != required {
            Some(IgnoreReason::OutOfOrder {
                expected: required,
                actual: self.stage,
            })
        } else {
            None
        }
    }

    fn scores(&self) -> Result<RiskScores, AppError> {
        match (self.document_risk, self.biometric_risk, self.behavior_risk) {
            (Some(document_risk), Some(biometric_risk), Some(behavior_risk)) => Ok(RiskScores {
                document_risk,
                biometric_risk,
                behavior_risk,
            }),
            _ => Err(AppError::Internal(format!(
                "Session {} reached scoring with missing sub-scores",
                self.id
            ))),
        }
    }

    fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id,
            stage: self.stage,
            stage_number: self.stage.number(),
            busy: self.busy,
            document_risk: self.document_risk,
            biometric_risk: self.biometric_risk,
            behavior_risk: self.behavior_risk,
            is_synthetic_document: self.is_synthetic_document,
            outcome: self.outcome.clone(),
        }
    }
}

fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the busy flag when dropped
struct BusyGuard<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        lock_session(self.session).busy = false;
    }
}

pub struct VerificationPipeline {
    services: Arc<VerificationServices>,
    session: Mutex<Session>,
}

impl VerificationPipeline {
    pub fn new(services: Arc<VerificationServices>) -> Self {
        Self {
            services,
            session: Mutex::new(Session::new()),
        }
    }

    pub fn view(&self) -> SessionView {
        self.lock().view()
    }

    #[cfg(test)]
    pub fn session_id(&self) -> Uuid {
        self.lock().id
    }

    /// START -> DOCUMENT
    pub fn begin(&self) -> Advance {
        {
            let mut session = self.lock();
            if let Some(reason) = session.check(Stage::Start) {
                drop(session);
                return self.ignore(reason);
            }
            session.stage = Stage::Document;
            debug!("Session {} started", session.id);
        }
        Advance::Moved(self.view())
    }

    /// DOCUMENT -> BIOMETRICS after document forensics
    pub async fn submit_document(&self, image: ImagePayload) -> Result<Advance, AppError> {
        let guard = match self.enter(Stage::Document) {
            Ok(guard) => guard,
            Err(reason) => return Ok(self.ignore(reason)),
        };

        if image.bytes.len() > self.services.max_document_bytes {
            return Err(AppError::InvalidInput(format!(
                "Document is {} bytes, limit is {}",
                image.bytes.len(),
                self.services.max_document_bytes
            )));
        }

        let analysis = self
            .bounded(
                "Document analysis",
                self.services.document.analyze_document(&image),
            )
            .await?;

        ensure_analysis_score("documentRisk", analysis.score)?;

        let digest = image.digest();
        info!(
            "Document analyzed: risk {:.3}, synthetic {}",
            analysis.score, analysis.is_synthetic_document
        );

        Ok(self.commit(guard, |session| {
            session.document_risk = Some(analysis.score);
            session.is_synthetic_document = analysis.is_synthetic_document;
            session.document_reasoning = Some(analysis.reasoning);
            session.document_digest = Some(digest);
        }))
    }

    /// BIOMETRICS -> BEHAVIOR
    pub async fn submit_biometrics(&self, capture: BiometricCapture) -> Result<Advance, AppError> {
        let guard = match self.enter(Stage::Biometrics) {
            Ok(guard) => guard,
            Err(reason) => return Ok(self.ignore(reason)),
        };

        let risk = self
            .bounded("Biometric analysis", self.services.biometrics.assess(&capture))
            .await?;
        let risk = ensure_unit_score("biometricRisk", risk)?;
        info!("Biometrics assessed: risk {:.3}", risk);

        Ok(self.commit(guard, |session| session.biometric_risk = Some(risk)))
    }

    /// BEHAVIOR -> SCORING
    pub async fn submit_behavior(&self, signal: HumanConfirmation) -> Result<Advance, AppError> {
        let guard = match self.enter(Stage::Behavior) {
            Ok(guard) => guard,
            Err(reason) => return Ok(self.ignore(reason)),
        };

        let risk = self
            .bounded("Behavior analysis", self.services.behavior.assess(signal))
            .await?;
        let risk = ensure_unit_score("behaviorRisk", risk)?;
        info!(
            "Behavior assessed: risk {:.3} (confirmed: {})",
            risk, signal.confirmed
        );

        Ok(self.commit(guard, |session| session.behavior_risk = Some(risk)))
    }

    /// SCORING -> RESULT. Runs the decision rule and commits the outcome.
    ///
    /// The outcome and its id are fixed by the first attempt. A retry after a
    /// failed or abandoned commit re-submits that same record, so a session
    /// stores at most one outcome.
    pub async fn run_scoring(&self) -> Result<Advance, AppError> {
        let guard = match self.enter(Stage::Scoring) {
            Ok(guard) => guard,
            Err(reason) => return Ok(self.ignore(reason)),
        };

        if !self.services.scoring_latency.is_zero() {
            tokio::time::sleep(self.services.scoring_latency).await;
        }

        let (session_id, digest, outcome, retry) = {
            let mut session = self.lock();
            let retry = session.pending_outcome.is_some();
            let outcome = match session.pending_outcome.clone() {
                Some(outcome) => outcome,
                None => {
                    let scores = session.scores()?;
                    let verdict = decide(
                        scores.document_risk,
                        scores.biometric_risk,
                        scores.behavior_risk,
                        session.is_synthetic_document,
                    )?;
                    let outcome = Outcome::from_verdict(
                        scores,
                        session.is_synthetic_document,
                        verdict,
                        session.document_reasoning.as_deref(),
                    );
                    session.pending_outcome = Some(outcome.clone());
                    outcome
                }
            };
            (session.id, session.document_digest.clone(), outcome, retry)
        };

        let stored = self.store_outcome(outcome, retry).await?;

        self.services
            .audit
            .record(
                AuditEntry::new(AuditAction::OutcomeCreated)
                    .resource(&stored.id)
                    .details(json!({
                        "sessionId": session_id,
                        "decision": stored.decision,
                        "riskLevel": stored.risk_level,
                        "aggregateRisk": stored.aggregate_risk,
                        "isSyntheticDocument": stored.is_synthetic_document,
                        "documentDigest": digest,
                    })),
            )
            .await;

        info!(
            "Session {} completed: {} {} (aggregate risk {:.3})",
            session_id, stored.id, stored.decision, stored.aggregate_risk
        );

        Ok(self.commit(guard, |session| {
            session.pending_outcome = None;
            session.outcome = Some(stored);
        }))
    }

    /// Discard the session and start over with a fresh one. Only while idle.
    pub fn reset(&self) -> Advance {
        {
            let mut session = self.lock();
            if session.busy {
                drop(session);
                return self.ignore(IgnoreReason::Busy);
            }
            let previous = session.id;
            *session = Session::new();
            debug!("Session {} reset to {}", previous, session.id);
        }
        Advance::Moved(self.view())
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        lock_session(&self.session)
    }

    fn enter(&self, required: Stage) -> Result<BusyGuard<'_>, IgnoreReason> {
        let mut session = self.lock();
        if let Some(reason) = session.check(required) {
            return Err(reason);
        }
        session.busy = true;
        Ok(BusyGuard {
            session: &self.session,
        })
    }

    fn commit(&self, guard: BusyGuard<'_>, apply: impl FnOnce(&mut Session)) -> Advance {
        {
            let mut session = self.lock();
            apply(&mut session);
            session.stage = session.stage.next();
        }
        drop(guard);
        Advance::Moved(self.view())
    }

    fn ignore(&self, reason: IgnoreReason) -> Advance {
        debug!("Ignored trigger: {}", reason);
        Advance::Ignored(reason)
    }

    /// Create the outcome record. On a retry, `DuplicateId` for the same record
    /// means an earlier attempt already landed.
    async fn store_outcome(&self, outcome: Outcome, retry: bool) -> Result<Outcome, AppError> {
        let store = &self.services.store;
        match self.bounded("Outcome store", store.create(outcome.clone())).await {
            Ok(stored) => Ok(stored),
            Err(AppError::DuplicateId(message)) => {
                if retry {
                    let existing = self.bounded("Outcome store", store.get(&outcome.id)).await?;
                    if existing.created_at == outcome.created_at {
                        debug!("Outcome {} already committed by an earlier attempt", existing.id);
                        return Ok(existing);
                    }
                }
                // Collision with another session's id; the next attempt draws a new one
                self.lock().pending_outcome = None;
                Err(AppError::DuplicateId(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let limit = self.services.analysis_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} exceeded {:?}", operation, limit);
                Err(AppError::ServiceTimeout(format!(
                    "{} did not complete within {} ms",
                    operation,
                    limit.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DocumentAnalysis, SimulatedBehaviorAssessor, SimulatedBiometricAssessor};
    use crate::store::{Amended, InMemoryAdjudicationStore};
    use crate::verification::decision::{Decision, RiskLevel};
    use crate::verification::outcome::Amendment;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    enum FakeDocument {
        Returns(DocumentAnalysis),
        Fails,
        Sleeps(Duration),
        WaitsFor(Arc<Notify>),
    }

    #[async_trait]
    impl DocumentAnalyzer for FakeDocument {
        async fn analyze_document(
            &self,
            _image: &ImagePayload,
        ) -> Result<DocumentAnalysis, AppError> {
            match self {
                FakeDocument::Returns(result) => Ok(result.clone()),
                FakeDocument::Fails => Err(AppError::AnalysisFailed("model unavailable".into())),
                FakeDocument::Sleeps(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(clean_document())
                }
                FakeDocument::WaitsFor(notify) => {
                    notify.notified().await;
                    Ok(clean_document())
                }
            }
        }
    }

    struct FixedBiometrics(f64);

    #[async_trait]
    impl BiometricAssessor for FixedBiometrics {
        async fn assess(&self, _capture: &BiometricCapture) -> Result<f64, AppError> {
            Ok(self.0)
        }
    }

    /// Store whose next `create` fails, either before or after the record lands
    struct FlakyStore {
        inner: InMemoryAdjudicationStore,
        fail_next: AtomicBool,
        lands_before_failing: bool,
    }

    impl FlakyStore {
        fn new(lands_before_failing: bool) -> Self {
            Self {
                inner: InMemoryAdjudicationStore::new(),
                fail_next: AtomicBool::new(true),
                lands_before_failing,
            }
        }
    }

    #[async_trait]
    impl AdjudicationStore for FlakyStore {
        async fn create(&self, outcome: Outcome) -> Result<Outcome, AppError> {
            if !self.fail_next.swap(false, Ordering::SeqCst) {
                return self.inner.create(outcome).await;
            }
            if self.lands_before_failing {
                self.inner.create(outcome).await?;
            }
            Err(AppError::Storage("disk full".into()))
        }

        async fn get(&self, id: &str) -> Result<Outcome, AppError> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Vec<Outcome> {
            self.inner.list().await
        }

        async fn amend(&self, id: &str, amendment: Amendment) -> Result<Amended, AppError> {
            self.inner.amend(id, amendment).await
        }

        async fn clear(&self) -> Result<(), AppError> {
            self.inner.clear().await
        }
    }

    fn clean_document() -> DocumentAnalysis {
        DocumentAnalysis {
            is_synthetic_document: false,
            score: 0.1,
            reasoning: "No artifacts.".to_string(),
        }
    }

    fn image() -> ImagePayload {
        ImagePayload::new("image/jpeg", b"passport".to_vec()).unwrap()
    }

    struct Harness {
        pipeline: Arc<VerificationPipeline>,
        store: Arc<InMemoryAdjudicationStore>,
        audit: Arc<AuditLog>,
    }

    fn pipeline_with(
        document: FakeDocument,
        biometrics: Arc<dyn BiometricAssessor>,
        store: Arc<dyn AdjudicationStore>,
        audit: Arc<AuditLog>,
    ) -> Arc<VerificationPipeline> {
        let services = Arc::new(VerificationServices {
            document: Arc::new(document),
            biometrics,
            behavior: Arc::new(SimulatedBehaviorAssessor::new(Duration::ZERO)),
            store,
            audit,
            analysis_timeout: Duration::from_millis(200),
            scoring_latency: Duration::ZERO,
            max_document_bytes: 1024,
        });
        Arc::new(VerificationPipeline::new(services))
    }

    fn harness_with(document: FakeDocument, biometrics: Arc<dyn BiometricAssessor>) -> Harness {
        let store = Arc::new(InMemoryAdjudicationStore::new());
        let audit = Arc::new(AuditLog::new());
        Harness {
            pipeline: pipeline_with(document, biometrics, store.clone(), audit.clone()),
            store,
            audit,
        }
    }

    fn harness(document: FakeDocument) -> Harness {
        harness_with(
            document,
            Arc::new(SimulatedBiometricAssessor::new(Duration::ZERO)),
        )
    }

    async fn run_to_scoring(pipeline: &VerificationPipeline) {
        assert!(pipeline.begin().is_moved());
        assert!(assert_ok!(pipeline.submit_document(image()).await).is_moved());
        assert!(
            assert_ok!(pipeline.submit_biometrics(BiometricCapture::default()).await).is_moved()
        );
        assert!(assert_ok!(
            pipeline
                .submit_behavior(HumanConfirmation { confirmed: true })
                .await
        )
        .is_moved());
    }

    async fn wait_until_busy(pipeline: &VerificationPipeline) {
        while !pipeline.view().busy {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_happy_path_commits_outcome_on_result() {
        let h = harness(FakeDocument::Returns(clean_document()));
        run_to_scoring(&h.pipeline).await;
        assert_eq!(h.pipeline.view().stage, Stage::Scoring);
        assert_eq!(h.store.count().await, 0);

        let view = assert_ok!(h.pipeline.run_scoring().await).into_result().unwrap();
        assert_eq!(view.stage, Stage::Result);
        assert_eq!(view.stage_number, 5);
        assert!(!view.busy);

        let outcome = view.outcome.unwrap();
        assert_eq!(outcome.decision, Decision::Accept);
        assert_eq!(outcome.risk_level, RiskLevel::Low);
        assert!((outcome.aggregate_risk - (0.1 + 0.15 + 0.05) / 3.0).abs() < 1e-9);
        assert_eq!(
            outcome.rationale,
            "Standard identity profile. Document analysis: No artifacts."
        );

        let stored = h.store.list().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, outcome.id);

        let audit = h.audit.entries(Some(&outcome.id), 10).await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::OutcomeCreated);
        assert_eq!(
            audit[0].details.as_ref().unwrap()["documentDigest"],
            image().digest()
        );
    }

    #[tokio::test]
    async fn test_out_of_order_triggers_are_ignored() {
        let h = harness(FakeDocument::Returns(clean_document()));

        let advance = assert_ok!(h.pipeline.submit_biometrics(BiometricCapture::default()).await);
        match advance {
            Advance::Ignored(reason) => assert_eq!(
                reason,
                IgnoreReason::OutOfOrder {
                    expected: Stage::Biometrics,
                    actual: Stage::Start,
                }
            ),
            Advance::Moved(_) => panic!("biometrics must not run from START"),
        }

        assert!(h.pipeline.begin().is_moved());
        assert!(!h.pipeline.begin().is_moved());
        assert_eq!(h.pipeline.view().stage, Stage::Document);
    }

    #[tokio::test]
    async fn test_scoring_runs_once() {
        let h = harness(FakeDocument::Returns(clean_document()));
        run_to_scoring(&h.pipeline).await;
        assert!(assert_ok!(h.pipeline.run_scoring().await).is_moved());

        let again = assert_ok!(h.pipeline.run_scoring().await);
        assert!(matches!(
            again.into_result(),
            Err(AppError::StageIgnored(_))
        ));
        assert_eq!(h.store.count().await, 1);
    }

    #[tokio::test]
    async fn test_trigger_while_busy_is_ignored() {
        let notify = Arc::new(Notify::new());
        let h = harness(FakeDocument::WaitsFor(notify.clone()));
        h.pipeline.begin();

        let pipeline = h.pipeline.clone();
        let first = tokio::spawn(async move { pipeline.submit_document(image()).await });
        wait_until_busy(&h.pipeline).await;

        let second = assert_ok!(h.pipeline.submit_document(image()).await);
        assert!(matches!(second, Advance::Ignored(IgnoreReason::Busy)));
        assert!(matches!(h.pipeline.reset(), Advance::Ignored(IgnoreReason::Busy)));
        assert_eq!(h.pipeline.view().stage, Stage::Document);

        notify.notify_one();
        let first = assert_ok!(first.await.unwrap());
        assert!(first.is_moved());

        let view = h.pipeline.view();
        assert_eq!(view.stage, Stage::Biometrics);
        assert!(!view.busy);
    }

    #[tokio::test]
    async fn test_failure_clears_busy_and_keeps_stage() {
        let h = harness(FakeDocument::Fails);
        h.pipeline.begin();

        let err = assert_err!(h.pipeline.submit_document(image()).await);
        assert!(matches!(err, AppError::AnalysisFailed(_)));

        let view = h.pipeline.view();
        assert_eq!(view.stage, Stage::Document);
        assert!(!view.busy);
        assert_eq!(view.document_risk, None);
    }

    #[tokio::test]
    async fn test_slow_analysis_times_out() {
        let h = harness(FakeDocument::Sleeps(Duration::from_secs(30)));
        h.pipeline.begin();

        let err = assert_err!(h.pipeline.submit_document(image()).await);
        assert!(matches!(err, AppError::ServiceTimeout(_)));
        assert!(!h.pipeline.view().busy);
        assert_eq!(h.pipeline.view().stage, Stage::Document);
    }

    #[tokio::test]
    async fn test_dropped_caller_clears_busy() {
        let h = harness(FakeDocument::Sleeps(Duration::from_secs(30)));
        h.pipeline.begin();

        let pipeline = h.pipeline.clone();
        let task = tokio::spawn(async move { pipeline.submit_document(image()).await });
        wait_until_busy(&h.pipeline).await;

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!h.pipeline.view().busy);
        assert_eq!(h.pipeline.view().stage, Stage::Document);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_are_rejected_before_mutation() {
        let h = harness(FakeDocument::Returns(DocumentAnalysis {
            score: 1.5,
            ..clean_document()
        }));
        h.pipeline.begin();
        let err = assert_err!(h.pipeline.submit_document(image()).await);
        assert!(matches!(err, AppError::AnalysisFailed(_)));
        assert_eq!(h.pipeline.view().document_risk, None);

        let h = harness_with(
            FakeDocument::Returns(clean_document()),
            Arc::new(FixedBiometrics(f64::NAN)),
        );
        h.pipeline.begin();
        assert_ok!(h.pipeline.submit_document(image()).await);
        let err = assert_err!(h.pipeline.submit_biometrics(BiometricCapture::default()).await);
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(h.pipeline.view().stage, Stage::Biometrics);
    }

    #[tokio::test]
    async fn test_oversized_document_is_invalid_input() {
        let h = harness(FakeDocument::Returns(clean_document()));
        h.pipeline.begin();
        let big = ImagePayload::new("image/png", vec![0u8; 2048]).unwrap();

        let err = assert_err!(h.pipeline.submit_document(big).await);
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(!h.pipeline.view().busy);
    }

    #[tokio::test]
    async fn test_synthetic_document_rejects() {
        let h = harness(FakeDocument::Returns(DocumentAnalysis {
            is_synthetic_document: true,
            score: 0.2,
            reasoning: "GAN texture.".to_string(),
        }));
        run_to_scoring(&h.pipeline).await;

        let view = assert_ok!(h.pipeline.run_scoring().await).into_result().unwrap();
        let outcome = view.outcome.unwrap();
        assert_eq!(outcome.decision, Decision::Reject);
        assert_eq!(outcome.risk_level, RiskLevel::High);
        assert!(outcome.rationale.starts_with("Synthetic document artifacts detected."));
    }

    #[tokio::test]
    async fn test_failed_challenge_routes_to_review() {
        let h = harness(FakeDocument::Returns(clean_document()));
        h.pipeline.begin();
        assert_ok!(h.pipeline.submit_document(image()).await);
        assert_ok!(h.pipeline.submit_biometrics(BiometricCapture::default()).await);
        assert_ok!(
            h.pipeline
                .submit_behavior(HumanConfirmation { confirmed: false })
                .await
        );

        let view = assert_ok!(h.pipeline.run_scoring().await).into_result().unwrap();
        assert_eq!(view.behavior_risk, Some(1.0));
        assert_eq!(view.outcome.unwrap().decision, Decision::Review);
    }

    #[tokio::test]
    async fn test_scoring_retry_after_lost_commit_stores_one_outcome() {
        let store = Arc::new(FlakyStore::new(true));
        let audit = Arc::new(AuditLog::new());
        let pipeline = pipeline_with(
            FakeDocument::Returns(clean_document()),
            Arc::new(SimulatedBiometricAssessor::new(Duration::ZERO)),
            store.clone(),
            audit.clone(),
        );
        run_to_scoring(&pipeline).await;

        let err = assert_err!(pipeline.run_scoring().await);
        assert!(matches!(err, AppError::Storage(_)));
        let view = pipeline.view();
        assert_eq!(view.stage, Stage::Scoring);
        assert!(!view.busy);
        assert_eq!(store.list().await.len(), 1);

        let view = assert_ok!(pipeline.run_scoring().await).into_result().unwrap();
        assert_eq!(view.stage, Stage::Result);

        let stored = store.list().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(view.outcome.unwrap().id, stored[0].id);
        assert_eq!(audit.entries(None, 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_scoring_retry_after_failed_commit_reuses_outcome_id() {
        let store = Arc::new(FlakyStore::new(false));
        let pipeline = pipeline_with(
            FakeDocument::Returns(clean_document()),
            Arc::new(SimulatedBiometricAssessor::new(Duration::ZERO)),
            store.clone(),
            Arc::new(AuditLog::new()),
        );
        run_to_scoring(&pipeline).await;

        assert_err!(pipeline.run_scoring().await);
        assert!(store.list().await.is_empty());
        let pending = pipeline.lock().pending_outcome.clone().unwrap();

        let view = assert_ok!(pipeline.run_scoring().await).into_result().unwrap();
        assert_eq!(view.outcome.unwrap().id, pending.id);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_from_result_starts_fresh_session() {
        let h = harness(FakeDocument::Returns(clean_document()));
        run_to_scoring(&h.pipeline).await;
        assert_ok!(h.pipeline.run_scoring().await);
        let before = h.pipeline.session_id();

        let view = h.pipeline.reset().into_result().unwrap();
        assert_eq!(view.stage, Stage::Start);
        assert_ne!(view.session_id, before);
        assert!(view.outcome.is_none());
        assert_eq!(view.document_risk, None);
        assert_eq!(h.store.count().await, 1);
    }
}
