use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerDraft, AnswerId, CategoryId, Difficulty, ExamConfig, ExamResult, Question,
    QuestionDraft, QuestionId,
};
use exam_core::time::fixed_clock;
use services::{
    ExamError, ExamEvent, ExamSession, ExamSessionService, ExamStatus, SubmitRequest,
    review_items,
};
use storage::fixtures::StaticQuestionSet;
use storage::repository::{
    ExamResultRow, InMemoryRepository, LoadError, QuestionSetLoader, ResultsStore, StorageError,
};
use tokio::sync::Notify;

fn draft(id: u64, correct: u64) -> QuestionDraft {
    QuestionDraft {
        id: QuestionId::new(id),
        text: format!("Question {id}"),
        explanation: None,
        difficulty: Difficulty::Medium,
        category_id: CategoryId::new(1),
        answers: (0..3)
            .map(|i| AnswerDraft::new(AnswerId::new(id * 10 + i), format!("A{i}"), i == correct))
            .collect(),
    }
}

fn question(id: u64, correct: u64) -> Question {
    draft(id, correct).validate().unwrap()
}

fn assert_rejected<T: std::fmt::Debug>(res: Result<T, ExamError>) {
    assert!(
        matches!(res, Err(ExamError::InvalidStateTransition { .. })),
        "expected rejection, got {res:?}"
    );
}

struct FailingStore;

#[async_trait]
impl ResultsStore for FailingStore {
    async fn save(&self, _: &ExamResult, _: DateTime<Utc>) -> Result<i64, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn get_result(&self, _: i64) -> Result<ExamResultRow, StorageError> {
        Err(StorageError::NotFound)
    }

    async fn list_results(&self, _: u32) -> Result<Vec<ExamResultRow>, StorageError> {
        Ok(Vec::new())
    }
}

/// Loader that holds its questions back until the gate opens.
struct GatedLoader {
    gate: Arc<Notify>,
}

#[async_trait]
impl QuestionSetLoader for GatedLoader {
    async fn load(&self, _desired_count: u32) -> Result<Vec<Question>, LoadError> {
        self.gate.notified().await;
        Ok(vec![question(1, 0), question(2, 0)])
    }
}

#[tokio::test(start_paused = true)]
async fn untouched_exam_auto_submits_at_the_deadline() {
    let store = Arc::new(InMemoryRepository::new());
    let session = ExamSession::create(vec![question(1, 0)], 1, 1, store.clone(), fixed_clock())
        .unwrap();
    let mut events = session.events();

    let done = session.finished().await.unwrap();
    assert_eq!(done.status, ExamStatus::Submitted);
    assert_eq!(done.remaining_secs, 0);

    let outcome = done.outcome.unwrap();
    assert_eq!(outcome.result.time_spent_secs(), 1);
    assert_eq!(outcome.result.correct_answers(), 0);
    assert!(!outcome.result.passed());
    assert_eq!(outcome.result_id, Some(1));
    assert_eq!(outcome.store_error, None);

    assert_eq!(
        events.recv().await.unwrap(),
        ExamEvent::ConfirmRequested {
            auto_triggered: true
        }
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        ExamEvent::Submitted(_)
    ));

    assert_rejected(session.cancel_submit().await);
    assert_rejected(session.request_submit().await);
    assert_rejected(session.navigate(1).await);
    assert_rejected(session.select_current(AnswerId::new(10)).await);
    assert_eq!(store.list_results(10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_during_manual_confirmation_takes_over() {
    let store = Arc::new(InMemoryRepository::new());
    let session = ExamSession::create(vec![question(1, 0)], 2, 1, store, fixed_clock()).unwrap();

    session.select_current(AnswerId::new(10)).await.unwrap();
    assert_eq!(
        session.request_submit().await.unwrap(),
        SubmitRequest::Pending
    );

    let done = session.finished().await.unwrap();
    assert_eq!(done.status, ExamStatus::Submitted);
    let outcome = done.outcome.unwrap();
    assert!(outcome.result.passed());
    // Remaining time froze when the confirmation opened.
    assert_eq!(outcome.result.time_spent_secs(), 0);
    assert_rejected(session.cancel_submit().await);
}

#[tokio::test(start_paused = true)]
async fn submit_request_racing_the_deadline_yields_one_result() {
    let store = Arc::new(InMemoryRepository::new());
    let session = ExamSession::create(vec![question(1, 0)], 5, 1, store.clone(), fixed_clock())
        .unwrap();
    let mut events = session.events();

    tokio::time::sleep(Duration::from_millis(4500)).await;

    // Queue the request, then cross the deadline before the session runs again.
    let request = session.request_submit();
    tokio::pin!(request);
    tokio::select! {
        biased;
        res = &mut request => panic!("answered before the session ran: {res:?}"),
        () = std::future::ready(()) => {}
    }
    tokio::time::advance(Duration::from_secs(1)).await;

    let res = request.await;
    assert!(
        matches!(res, Ok(SubmitRequest::Pending | SubmitRequest::Superseded)),
        "unexpected reply {res:?}"
    );

    let done = session.finished().await.unwrap();
    assert_eq!(done.status, ExamStatus::Submitted);
    assert_eq!(done.outcome.unwrap().result.time_spent_secs(), 5);

    let mut auto_confirm = false;
    loop {
        match events.recv().await.unwrap() {
            ExamEvent::ConfirmRequested {
                auto_triggered: true,
            } => auto_confirm = true,
            ExamEvent::Submitted(_) => break,
            _ => {}
        }
    }
    assert!(auto_confirm);

    assert_rejected(session.cancel_submit().await);
    assert_eq!(store.list_results(10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unusable_durations_are_rejected_up_front() {
    let store = Arc::new(InMemoryRepository::new());

    let res = ExamSession::create(vec![question(1, 0)], u64::MAX, 1, store.clone(), fixed_clock());
    assert!(matches!(res, Err(ExamError::Config(_))));

    let res = ExamSession::load(Arc::new(StaticQuestionSet), 3, 0, 1, store, fixed_clock());
    assert!(matches!(res, Err(ExamError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn countdown_only_decreases_and_freezes_on_submit() {
    let store = Arc::new(InMemoryRepository::new());
    let session =
        ExamSession::create(vec![question(1, 0), question(2, 1)], 10, 1, store, fixed_clock())
            .unwrap();
    assert_eq!(session.current_state().remaining_secs, 10);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(session.current_state().remaining_secs, 7);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(session.current_state().remaining_secs, 4);

    session.request_submit().await.unwrap();
    let outcome = session.confirm_submit().await.unwrap();
    assert_eq!(outcome.result.time_spent_secs(), 6);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let state = session.current_state();
    assert_eq!(state.status, ExamStatus::Submitted);
    assert_eq!(state.remaining_secs, 4);
}

#[tokio::test(start_paused = true)]
async fn store_failure_still_delivers_the_result() {
    let session =
        ExamSession::create(vec![question(1, 0)], 60, 1, Arc::new(FailingStore), fixed_clock())
            .unwrap();
    session.select_current(AnswerId::new(10)).await.unwrap();
    session.request_submit().await.unwrap();

    let outcome = session.confirm_submit().await.unwrap();
    assert!(outcome.result.passed());
    assert_eq!(outcome.result_id, None);
    assert_eq!(
        outcome.store_error,
        Some(StorageError::Connection("offline".into()))
    );
    assert_eq!(session.current_state().outcome, Some(outcome));
}

#[tokio::test(start_paused = true)]
async fn navigation_and_cancel_keep_the_exam_running() {
    let store = Arc::new(InMemoryRepository::new());
    let session = ExamSession::create(
        vec![question(1, 0), question(2, 1), question(3, 2)],
        600,
        2,
        store,
        fixed_clock(),
    )
    .unwrap();

    assert_eq!(session.navigate(-1).await.unwrap(), 0);
    session.select_current(AnswerId::new(10)).await.unwrap();
    assert_eq!(session.navigate(1).await.unwrap(), 1);
    session.select_current(AnswerId::new(20)).await.unwrap();

    let state = session.current_state();
    assert_eq!(state.answered_count(), 2);
    assert_eq!(state.selected_for_current(), Some(AnswerId::new(20)));
    assert!(!state.is_last_question());

    session.request_submit().await.unwrap();
    assert_rejected(session.navigate(1).await);
    session.cancel_submit().await.unwrap();
    assert_eq!(session.navigate(1).await.unwrap(), 2);
    assert!(session.current_state().is_last_question());

    session.request_submit().await.unwrap();
    let outcome = session.confirm_submit().await.unwrap();
    assert_eq!(outcome.result.correct_answers(), 1);
    assert!(!outcome.result.passed());

    let questions = session.current_state().questions;
    let review = review_items(&outcome.result, &questions);
    assert_eq!(review[2].selected_answer, "Not answered");
}

#[tokio::test(start_paused = true)]
async fn commands_are_rejected_while_loading() {
    let gate = Arc::new(Notify::new());
    let session = ExamSession::load(
        Arc::new(GatedLoader { gate: gate.clone() }),
        2,
        60,
        1,
        Arc::new(InMemoryRepository::new()),
        fixed_clock(),
    )
    .unwrap();

    assert_eq!(
        session.navigate(1).await,
        Err(ExamError::InvalidStateTransition {
            operation: services::Operation::Navigate,
            status: "loading",
        })
    );
    assert_rejected(session.request_submit().await);

    gate.notify_one();
    let mut state = session.subscribe();
    state
        .wait_for(|s| s.status == ExamStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(session.navigate(1).await.unwrap(), 1);
}

#[tokio::test]
async fn empty_bank_fails_and_sample_set_recovers() {
    let repo = InMemoryRepository::new();
    let service =
        ExamSessionService::new(fixed_clock(), Arc::new(repo.clone()), Arc::new(repo.clone()))
            .with_config(ExamConfig::new(3, 60, 2).unwrap());

    let failed = service.start_exam().unwrap().finished().await.unwrap();
    assert_eq!(
        failed.status,
        ExamStatus::LoadError(LoadError::NoQuestionsAvailable)
    );

    let fallback = service
        .start_exam_from(Arc::new(StaticQuestionSet))
        .unwrap();
    let mut state = fallback.subscribe();
    let started = state
        .wait_for(|s| s.status == ExamStatus::InProgress)
        .await
        .unwrap()
        .clone();
    assert_eq!(started.total_questions(), 3);
}

#[tokio::test]
async fn submitted_results_show_up_in_history() {
    let repo = InMemoryRepository::with_questions(vec![draft(1, 0), draft(2, 1)]);
    let service =
        ExamSessionService::new(fixed_clock(), Arc::new(repo.clone()), Arc::new(repo.clone()))
            .with_config(ExamConfig::new(2, 60, 1).unwrap());

    let session = service.start_exam().unwrap();
    let mut state = session.subscribe();
    state
        .wait_for(|s| s.status == ExamStatus::InProgress)
        .await
        .unwrap();

    session
        .select_answer(QuestionId::new(2), AnswerId::new(21))
        .await
        .unwrap();
    session.request_submit().await.unwrap();
    let outcome = session.confirm_submit().await.unwrap();

    let history = service.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(Some(history[0].id), outcome.result_id);
    assert_eq!(history[0].result, outcome.result);
    assert_eq!(history[0].completed_at, fixed_clock().now());
}
