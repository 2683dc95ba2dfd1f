//! Serialized exam session.
//!
//! Every user command and clock notification is delivered to one actor task
//! that owns the `ExamMachine`. Clock events are polled first, so when the
//! deadline and a manual submit are ready together the deadline wins and the
//! manual request is dropped.

use std::sync::Arc;
use std::time::Duration;

use exam_core::Clock;
use exam_core::model::{AnswerId, AnswerMap, ExamConfig, ExamResult, Question, QuestionId};
use storage::{LoadError, QuestionSetLoader, ResultsStore, StorageError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::ExamError;
use crate::exam_clock::{ClockEvent, ExamClock};
use crate::exams::machine::{ExamMachine, ExamStatus, SubmitRequest};

const COMMAND_QUEUE: usize = 32;
const EVENT_BUFFER: usize = 64;

/// Scored attempt plus the outcome of handing it to the results store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub result: ExamResult,
    /// Row id assigned by the store, if saving succeeded.
    pub result_id: Option<i64>,
    /// Non-fatal store failure. The result is valid either way.
    pub store_error: Option<StorageError>,
}

/// Read-only snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSessionState {
    pub questions: Arc<[Question]>,
    pub current_index: usize,
    pub answers: AnswerMap,
    pub remaining_secs: u64,
    pub duration_secs: u64,
    pub passing_threshold: u32,
    pub status: ExamStatus,
    /// Set together with `ExamStatus::Submitted`.
    pub outcome: Option<SubmitOutcome>,
}

impl ExamSessionState {
    fn snapshot(machine: &ExamMachine, outcome: Option<&SubmitOutcome>) -> Self {
        Self {
            questions: Arc::clone(machine.questions()),
            current_index: machine.current_index(),
            answers: machine.answers().clone(),
            remaining_secs: machine.remaining_secs(),
            duration_secs: machine.duration_secs(),
            passing_threshold: machine.passing_threshold(),
            status: machine.status().clone(),
            outcome: outcome.cloned(),
        }
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn selected_for_current(&self) -> Option<AnswerId> {
        self.current_question()
            .and_then(|q| self.answers.get(q.id()))
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        !self.questions.is_empty() && self.current_index + 1 == self.questions.len()
    }
}

/// Notifications published as the session changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamEvent {
    Loaded { questions: usize },
    LoadFailed(LoadError),
    AnswerSelected { question: QuestionId, answer: AnswerId },
    Navigated { index: usize },
    Tick { remaining_secs: u64 },
    ConfirmRequested { auto_triggered: bool },
    ConfirmCancelled,
    Submitted(SubmitOutcome),
}

type Reply<T> = oneshot::Sender<Result<T, ExamError>>;

enum Command {
    Select {
        question: Option<QuestionId>,
        answer: AnswerId,
        reply: Reply<Option<AnswerId>>,
    },
    Navigate {
        delta: isize,
        reply: Reply<usize>,
    },
    RequestSubmit {
        reply: Reply<SubmitRequest>,
    },
    CancelSubmit {
        reply: Reply<()>,
    },
    ConfirmSubmit {
        reply: Reply<SubmitOutcome>,
    },
}

/// Handle to a running exam session. Cheap to clone.
///
/// The session task stops once every handle has been dropped.
#[derive(Clone)]
pub struct ExamSession {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ExamSessionState>,
    events: broadcast::Sender<ExamEvent>,
}

impl ExamSession {
    /// Start a session over an already loaded question set.
    ///
    /// An empty set puts the session straight into `LoadError`.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Config` when `duration_secs` is zero or longer than
    /// [`ExamConfig::MAX_DURATION_SECS`].
    pub fn create(
        questions: Vec<Question>,
        duration_secs: u64,
        passing_threshold: u32,
        store: Arc<dyn ResultsStore>,
        wall_clock: Clock,
    ) -> Result<Self, ExamError> {
        ExamConfig::check_duration(duration_secs)?;
        let machine = ExamMachine::new(duration_secs, passing_threshold);
        let (handle, mut actor) = Self::wire(machine, store, wall_clock);
        actor.finish_loading(Ok(questions));
        tokio::spawn(actor.run());
        Ok(handle)
    }

    /// Start a session that first pulls `question_count` questions from `loader`.
    ///
    /// Commands issued before loading completes are rejected.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Same duration checks as [`ExamSession::create`].
    pub fn load(
        loader: Arc<dyn QuestionSetLoader>,
        question_count: u32,
        duration_secs: u64,
        passing_threshold: u32,
        store: Arc<dyn ResultsStore>,
        wall_clock: Clock,
    ) -> Result<Self, ExamError> {
        ExamConfig::check_duration(duration_secs)?;
        let machine = ExamMachine::new(duration_secs, passing_threshold);
        let (handle, mut actor) = Self::wire(machine, store, wall_clock);
        tokio::spawn(async move {
            if actor.load_from(loader.as_ref(), question_count).await {
                actor.run().await;
            }
        });
        Ok(handle)
    }

    fn wire(
        machine: ExamMachine,
        store: Arc<dyn ResultsStore>,
        wall_clock: Clock,
    ) -> (Self, SessionActor) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state_rx) = watch::channel(ExamSessionState::snapshot(&machine, None));
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (clock_tx, clock_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            machine,
            outcome: None,
            commands: command_rx,
            clock: None,
            clock_tx: Some(clock_tx),
            clock_rx,
            state: state_tx,
            events: events_tx.clone(),
            store,
            wall_clock,
        };
        let handle = Self {
            commands: command_tx,
            state: state_rx,
            events: events_tx,
        };
        (handle, actor)
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ExamError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ExamError::SessionClosed)?;
        rx.await.map_err(|_| ExamError::SessionClosed)?
    }

    /// Select `answer` for `question`, returning the previous selection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` outside `InProgress`, or
    /// `UnknownQuestion`/`UnknownAnswer` for ids outside the loaded set.
    pub async fn select_answer(
        &self,
        question: QuestionId,
        answer: AnswerId,
    ) -> Result<Option<AnswerId>, ExamError> {
        self.call(|reply| Command::Select {
            question: Some(question),
            answer,
            reply,
        })
        .await
    }

    /// Select `answer` for the question under the cursor.
    ///
    /// # Errors
    ///
    /// Same as [`ExamSession::select_answer`].
    pub async fn select_current(&self, answer: AnswerId) -> Result<Option<AnswerId>, ExamError> {
        self.call(|reply| Command::Select {
            question: None,
            answer,
            reply,
        })
        .await
    }

    /// Move the cursor by `delta`, clamped to the question range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` outside `InProgress`.
    pub async fn navigate(&self, delta: isize) -> Result<usize, ExamError> {
        self.call(|reply| Command::Navigate { delta, reply }).await
    }

    /// Ask for confirmation before submitting.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the exam is in progress.
    pub async fn request_submit(&self) -> Result<SubmitRequest, ExamError> {
        self.call(|reply| Command::RequestSubmit { reply }).await
    }

    /// Return to the exam from a manual confirmation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless a manual confirmation is pending.
    pub async fn cancel_submit(&self) -> Result<(), ExamError> {
        self.call(|reply| Command::CancelSubmit { reply }).await
    }

    /// Score, store and close the session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless a confirmation is pending.
    /// Store failures are reported inside the returned outcome instead.
    pub async fn confirm_submit(&self) -> Result<SubmitOutcome, ExamError> {
        self.call(|reply| Command::ConfirmSubmit { reply }).await
    }

    #[must_use]
    pub fn current_state(&self) -> ExamSessionState {
        self.state.borrow().clone()
    }

    /// Watch every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ExamSessionState> {
        self.state.clone()
    }

    /// Stream of individual session events from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ExamEvent> {
        self.events.subscribe()
    }

    /// Wait until the session reaches `Submitted` or `LoadError`.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::SessionClosed` if the session task ended first.
    pub async fn finished(&self) -> Result<ExamSessionState, ExamError> {
        let mut state = self.state.clone();
        let done = state
            .wait_for(|s| s.status.is_terminal())
            .await
            .map_err(|_| ExamError::SessionClosed)?
            .clone();
        Ok(done)
    }
}

struct SessionActor {
    machine: ExamMachine,
    outcome: Option<SubmitOutcome>,
    commands: mpsc::Receiver<Command>,
    clock: Option<ExamClock>,
    clock_tx: Option<mpsc::UnboundedSender<ClockEvent>>,
    clock_rx: mpsc::UnboundedReceiver<ClockEvent>,
    state: watch::Sender<ExamSessionState>,
    events: broadcast::Sender<ExamEvent>,
    store: Arc<dyn ResultsStore>,
    wall_clock: Clock,
}

impl SessionActor {
    fn publish(&self) {
        self.state
            .send_replace(ExamSessionState::snapshot(&self.machine, self.outcome.as_ref()));
    }

    fn emit(&self, event: ExamEvent) {
        let _ = self.events.send(event);
    }

    /// Apply the load result and start the countdown if the exam began.
    fn finish_loading(&mut self, loaded: Result<Vec<Question>, LoadError>) {
        if self.machine.finish_loading(loaded).is_err() {
            return;
        }
        match self.machine.status().clone() {
            ExamStatus::InProgress => {
                if let Some(tx) = self.clock_tx.take() {
                    let duration = Duration::from_secs(self.machine.duration_secs());
                    self.clock = Some(ExamClock::start(duration, tx));
                }
                self.emit(ExamEvent::Loaded {
                    questions: self.machine.questions().len(),
                });
            }
            ExamStatus::LoadError(err) => self.emit(ExamEvent::LoadFailed(err)),
            _ => {}
        }
        self.publish();
    }

    /// Await the loader while rejecting interleaved commands.
    ///
    /// Returns `false` if every handle was dropped before loading finished.
    async fn load_from(&mut self, loader: &dyn QuestionSetLoader, desired_count: u32) -> bool {
        let load = loader.load(desired_count);
        tokio::pin!(load);
        let loaded = loop {
            tokio::select! {
                res = &mut load => break res,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => return false,
                },
            }
        };
        self.finish_loading(loaded);
        true
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(event) = self.clock_rx.recv() => self.on_clock(event).await,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
            }
        }
        debug!("exam session closed");
    }

    async fn on_clock(&mut self, event: ClockEvent) {
        match event {
            ClockEvent::Tick { remaining_secs } => {
                if self.machine.tick(remaining_secs) {
                    self.publish();
                    self.emit(ExamEvent::Tick { remaining_secs });
                }
            }
            ClockEvent::Expired => {
                if !self.machine.expire() {
                    return;
                }
                self.publish();
                self.emit(ExamEvent::ConfirmRequested {
                    auto_triggered: true,
                });

                // Commands already queued belong to the same step as the expiry.
                while let Ok(cmd) = self.commands.try_recv() {
                    self.handle(cmd).await;
                }
                if matches!(self.machine.status(), ExamStatus::ConfirmingSubmit { .. }) {
                    let _ = self.submit().await;
                }
            }
        }
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Select {
                question,
                answer,
                reply,
            } => {
                let res = match question {
                    Some(q) => self.machine.select_answer(q, answer),
                    None => self.machine.select_current(answer),
                };
                if res.is_ok() {
                    let question =
                        question.or_else(|| self.machine.current_question().map(Question::id));
                    self.publish();
                    if let Some(question) = question {
                        self.emit(ExamEvent::AnswerSelected { question, answer });
                    }
                }
                let _ = reply.send(res);
            }
            Command::Navigate { delta, reply } => {
                let before = self.machine.current_index();
                let res = self.machine.navigate(delta);
                if let Ok(index) = res {
                    if index != before {
                        self.publish();
                        self.emit(ExamEvent::Navigated { index });
                    }
                }
                let _ = reply.send(res);
            }
            Command::RequestSubmit { reply } => {
                if let Some(clock) = &self.clock {
                    self.machine.tick(clock.remaining_secs());
                }
                let res = self.machine.request_submit();
                if res == Ok(SubmitRequest::Pending) {
                    self.publish();
                    self.emit(ExamEvent::ConfirmRequested {
                        auto_triggered: false,
                    });
                }
                let _ = reply.send(res);
            }
            Command::CancelSubmit { reply } => {
                let res = self.machine.cancel_submit();
                if res.is_ok() {
                    self.publish();
                    self.emit(ExamEvent::ConfirmCancelled);
                }
                let _ = reply.send(res);
            }
            Command::ConfirmSubmit { reply } => {
                let res = self.submit().await;
                let _ = reply.send(res);
            }
        }
    }

    /// Score, stop the clock and hand the result to the store exactly once.
    async fn submit(&mut self) -> Result<SubmitOutcome, ExamError> {
        let result = self.machine.confirm_submit()?;
        if let Some(mut clock) = self.clock.take() {
            clock.stop();
        }

        let outcome = match self.store.save(&result, self.wall_clock.now()).await {
            Ok(id) => {
                info!(result_id = id, "exam result stored");
                SubmitOutcome {
                    result,
                    result_id: Some(id),
                    store_error: None,
                }
            }
            Err(err) => {
                warn!(%err, "failed to store exam result");
                SubmitOutcome {
                    result,
                    result_id: None,
                    store_error: Some(err),
                }
            }
        };

        self.outcome = Some(outcome.clone());
        self.publish();
        self.emit(ExamEvent::Submitted(outcome.clone()));
        Ok(outcome)
    }
}
