use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::db::types::SessionStatus;
use crate::schemas::exam::{ExamPayload, QuestionPayload};
use crate::services::scoring::{self, ExamStats};

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum SessionError {
    #[error("Exam session has not been started")]
    NotStarted,
    #[error("Exam session has already been submitted")]
    AlreadySubmitted,
    #[error("Exam has no questions")]
    EmptyExam,
    #[error("Question index {index} is out of range (exam has {total} questions)")]
    InvalidQuestion { index: usize, total: usize },
    #[error("Option index {option} is out of range for question {question}")]
    InvalidOption { question: usize, option: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub(crate) enum SelectOutcome {
    Recorded { selected_option: usize },
    /// The question was answered earlier; the earlier choice stands.
    Locked { selected_option: usize },
}

impl SelectOutcome {
    pub(crate) fn selected_option(self) -> usize {
        match self {
            Self::Recorded { selected_option } | Self::Locked { selected_option } => {
                selected_option
            }
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Recorded { .. } => "recorded",
            Self::Locked { .. } => "locked",
        }
    }
}

/// Persistable state of a session, independent of the exam content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionSnapshot {
    pub(crate) status: SessionStatus,
    pub(crate) current_index: usize,
    pub(crate) selections: BTreeMap<usize, usize>,
    pub(crate) locked: BTreeSet<usize>,
}

/// Single-question-at-a-time exam taking with lock-on-select.
///
/// Once a question has a recorded answer it stays locked until the session
/// ends; later selections for it are reported as [`SelectOutcome::Locked`]
/// and change nothing.
#[derive(Debug, Clone)]
pub(crate) struct ExamSessionController {
    exam: ExamPayload,
    status: SessionStatus,
    current_index: usize,
    selections: BTreeMap<usize, usize>,
    locked: BTreeSet<usize>,
}

impl ExamSessionController {
    pub(crate) fn new(exam: ExamPayload) -> Self {
        Self {
            exam,
            status: SessionStatus::Idle,
            current_index: 0,
            selections: BTreeMap::new(),
            locked: BTreeSet::new(),
        }
    }

    /// Rebuilds a controller from a stored snapshot. Stale indices that no
    /// longer fit the exam are dropped.
    pub(crate) fn restore(exam: ExamPayload, snapshot: SessionSnapshot) -> Self {
        let total = exam.questions.len();
        let selections: BTreeMap<usize, usize> = snapshot
            .selections
            .into_iter()
            .filter(|(question, option)| {
                exam.questions.get(*question).is_some_and(|q| *option < q.options.len())
            })
            .collect();
        let mut locked: BTreeSet<usize> =
            snapshot.locked.into_iter().filter(|index| *index < total).collect();
        // Every recorded answer is locked, even if the stored set lost it.
        locked.extend(selections.keys().copied());

        Self {
            current_index: snapshot.current_index.min(total.saturating_sub(1)),
            exam,
            status: snapshot.status,
            selections,
            locked,
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            current_index: self.current_index,
            selections: self.selections.clone(),
            locked: self.locked.clone(),
        }
    }

    pub(crate) fn exam(&self) -> &ExamPayload {
        &self.exam
    }

    pub(crate) fn status(&self) -> SessionStatus {
        self.status
    }

    pub(crate) fn current_index(&self) -> usize {
        self.current_index
    }

    pub(crate) fn current_question(&self) -> Option<&QuestionPayload> {
        self.exam.questions.get(self.current_index)
    }

    pub(crate) fn total(&self) -> usize {
        self.exam.questions.len()
    }

    pub(crate) fn selections(&self) -> &BTreeMap<usize, usize> {
        &self.selections
    }

    pub(crate) fn is_locked(&self, question_index: usize) -> bool {
        self.locked.contains(&question_index)
    }

    pub(crate) fn start(&mut self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Idle => {}
            SessionStatus::InProgress => return Ok(()),
            SessionStatus::Submitted => return Err(SessionError::AlreadySubmitted),
        }
        if self.exam.questions.is_empty() {
            return Err(SessionError::EmptyExam);
        }
        self.status = SessionStatus::InProgress;
        self.current_index = 0;
        Ok(())
    }

    pub(crate) fn select_answer(
        &mut self,
        question_index: usize,
        option_index: usize,
    ) -> Result<SelectOutcome, SessionError> {
        self.ensure_in_progress()?;

        let question = self.exam.questions.get(question_index).ok_or(
            SessionError::InvalidQuestion { index: question_index, total: self.total() },
        )?;

        if self.locked.contains(&question_index) {
            if let Some(previous) = self.selections.get(&question_index) {
                return Ok(SelectOutcome::Locked { selected_option: *previous });
            }
        }

        if option_index >= question.options.len() {
            return Err(SessionError::InvalidOption {
                question: question_index,
                option: option_index,
            });
        }

        self.selections.insert(question_index, option_index);
        self.locked.insert(question_index);
        Ok(SelectOutcome::Recorded { selected_option: option_index })
    }

    pub(crate) fn next(&mut self) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;
        self.current_index = (self.current_index + 1).min(self.last_index());
        Ok(self.current_index)
    }

    pub(crate) fn previous(&mut self) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;
        self.current_index = self.current_index.saturating_sub(1);
        Ok(self.current_index)
    }

    pub(crate) fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.ensure_in_progress()?;
        self.current_index = index.min(self.last_index());
        Ok(self.current_index)
    }

    pub(crate) fn submit(&mut self) -> Result<ExamStats, SessionError> {
        self.ensure_in_progress()?;
        self.status = SessionStatus::Submitted;
        Ok(self.compute_stats())
    }

    pub(crate) fn compute_stats(&self) -> ExamStats {
        scoring::compute_stats(&self.exam, &self.selections)
    }

    pub(crate) fn marks_obtained(&self) -> f64 {
        scoring::marks_obtained(&self.exam, &self.selections)
    }

    fn last_index(&self) -> usize {
        self.total().saturating_sub(1)
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Idle => Err(SessionError::NotStarted),
            SessionStatus::InProgress => Ok(()),
            SessionStatus::Submitted => Err(SessionError::AlreadySubmitted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scoring::fixtures::sample_exam;

    fn started(count: usize) -> ExamSessionController {
        let mut controller = ExamSessionController::new(sample_exam(count));
        controller.start().unwrap();
        controller
    }

    #[test]
    fn first_selection_locks_the_question() {
        let mut controller = started(3);

        assert_eq!(
            controller.select_answer(1, 2).unwrap(),
            SelectOutcome::Recorded { selected_option: 2 }
        );
        for option in 0..3 {
            assert_eq!(
                controller.select_answer(1, option).unwrap(),
                SelectOutcome::Locked { selected_option: 2 }
            );
        }
        assert_eq!(controller.selections().get(&1), Some(&2));
        assert!(controller.is_locked(1));
    }

    #[test]
    fn locked_question_ignores_even_invalid_options() {
        let mut controller = started(2);
        controller.select_answer(0, 1).unwrap();
        assert_eq!(
            controller.select_answer(0, 42).unwrap(),
            SelectOutcome::Locked { selected_option: 1 }
        );
    }

    #[test]
    fn attempted_counts_distinct_questions() {
        let mut controller = started(5);
        for (question, option) in [(0, 1), (0, 0), (3, 0), (3, 2), (4, 0), (0, 2)] {
            controller.select_answer(question, option).unwrap();
        }
        assert_eq!(controller.compute_stats().attempted, 3);
        assert_eq!(controller.compute_stats().correct, 2);
    }

    #[test]
    fn three_question_example() {
        let mut controller = started(3);
        controller.select_answer(0, 0).unwrap();
        controller.select_answer(1, 1).unwrap();

        let stats = controller.submit().unwrap();
        assert_eq!(stats, ExamStats { attempted: 2, correct: 1, total: 3 });
        assert_eq!(stats.score_display(), "33.3%");
    }

    #[test]
    fn navigation_clamps_without_wraparound() {
        let mut controller = started(3);
        assert_eq!(controller.previous().unwrap(), 0);
        assert_eq!(controller.next().unwrap(), 1);
        assert_eq!(controller.next().unwrap(), 2);
        assert_eq!(controller.next().unwrap(), 2);
        assert_eq!(controller.go_to(99).unwrap(), 2);
        assert_eq!(controller.go_to(0).unwrap(), 0);
        assert_eq!(controller.previous().unwrap(), 0);
    }

    #[test]
    fn idle_and_submitted_sessions_refuse_mutation() {
        let mut controller = ExamSessionController::new(sample_exam(2));
        assert_eq!(controller.select_answer(0, 0), Err(SessionError::NotStarted));
        assert_eq!(controller.next(), Err(SessionError::NotStarted));
        assert_eq!(controller.submit(), Err(SessionError::NotStarted));

        controller.start().unwrap();
        controller.submit().unwrap();
        assert_eq!(controller.status(), SessionStatus::Submitted);
        assert_eq!(controller.select_answer(1, 0), Err(SessionError::AlreadySubmitted));
        assert_eq!(controller.submit(), Err(SessionError::AlreadySubmitted));
        assert_eq!(controller.start(), Err(SessionError::AlreadySubmitted));
    }

    #[test]
    fn empty_exam_cannot_start() {
        let mut controller = ExamSessionController::new(sample_exam(0));
        assert_eq!(controller.start(), Err(SessionError::EmptyExam));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut controller = started(2);
        assert_eq!(
            controller.select_answer(2, 0),
            Err(SessionError::InvalidQuestion { index: 2, total: 2 })
        );
        assert_eq!(
            controller.select_answer(0, 3),
            Err(SessionError::InvalidOption { question: 0, option: 3 })
        );
        assert!(!controller.is_locked(0));
    }

    #[test]
    fn restore_keeps_locks_and_drops_stale_entries() {
        let snapshot = SessionSnapshot {
            status: SessionStatus::InProgress,
            current_index: 10,
            selections: BTreeMap::from([(0, 1), (7, 0)]),
            locked: BTreeSet::from([5]),
        };
        let mut controller = ExamSessionController::restore(sample_exam(3), snapshot);

        assert_eq!(controller.current_index(), 2);
        assert_eq!(controller.selections().len(), 1);
        assert_eq!(
            controller.select_answer(0, 0).unwrap(),
            SelectOutcome::Locked { selected_option: 1 }
        );
        assert_eq!(controller.snapshot().locked, BTreeSet::from([0]));
    }
}
