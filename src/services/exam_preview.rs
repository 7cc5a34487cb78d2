use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::schemas::exam::{ExamPayload, QuestionPayload};
use crate::services::scoring::{self, ExamStats};

#[derive(Debug, Error, PartialEq)]
pub(crate) enum PreviewError {
    #[error("Page {page} is out of range (1..={total})")]
    PageOutOfRange { page: usize, total: usize },
    #[error("Question index {index} is out of range (exam has {total} questions)")]
    InvalidQuestion { index: usize, total: usize },
    #[error("Option index {option} is out of range for question {question}")]
    InvalidOption { question: usize, option: usize },
    #[error("Failed to save exam: {0}")]
    SaveFailed(String),
}

/// Destination for [`ExamPreview::save`].
#[async_trait]
pub(crate) trait ExamSaver: Send + Sync {
    /// Persists the exam and returns its id.
    async fn save_exam(&self, exam: &ExamPayload) -> anyhow::Result<String>;
}

/// 1-based page shown to users for a 0-based question index.
pub(crate) fn page_for_index(index: usize) -> usize {
    index + 1
}

pub(crate) fn index_for_page(page: usize, total: usize) -> Result<usize, PreviewError> {
    if page == 0 || page > total {
        return Err(PreviewError::PageOutOfRange { page, total });
    }
    Ok(page - 1)
}

/// Author-side review of a generated exam. Answers can be changed or cleared
/// at will, unlike a student session.
#[derive(Debug, Clone)]
pub(crate) struct ExamPreview {
    exam: ExamPayload,
    current_index: usize,
    selections: BTreeMap<usize, usize>,
}

impl ExamPreview {
    pub(crate) fn new(exam: ExamPayload) -> Self {
        Self { exam, current_index: 0, selections: BTreeMap::new() }
    }

    pub(crate) fn exam(&self) -> &ExamPayload {
        &self.exam
    }

    pub(crate) fn total(&self) -> usize {
        self.exam.questions.len()
    }

    pub(crate) fn current_index(&self) -> usize {
        self.current_index
    }

    pub(crate) fn current_page(&self) -> usize {
        page_for_index(self.current_index)
    }

    pub(crate) fn current_question(&self) -> Option<&QuestionPayload> {
        self.exam.questions.get(self.current_index)
    }

    pub(crate) fn selections(&self) -> &BTreeMap<usize, usize> {
        &self.selections
    }

    pub(crate) fn select_answer(
        &mut self,
        question_index: usize,
        option_index: usize,
    ) -> Result<(), PreviewError> {
        let question = self.exam.questions.get(question_index).ok_or(
            PreviewError::InvalidQuestion { index: question_index, total: self.total() },
        )?;
        if option_index >= question.options.len() {
            return Err(PreviewError::InvalidOption {
                question: question_index,
                option: option_index,
            });
        }
        self.selections.insert(question_index, option_index);
        Ok(())
    }

    pub(crate) fn clear_answer(&mut self, question_index: usize) -> Option<usize> {
        self.selections.remove(&question_index)
    }

    pub(crate) fn next(&mut self) -> usize {
        self.current_index = (self.current_index + 1).min(self.total().saturating_sub(1));
        self.current_index
    }

    pub(crate) fn previous(&mut self) -> usize {
        self.current_index = self.current_index.saturating_sub(1);
        self.current_index
    }

    pub(crate) fn go_to_page(&mut self, page: usize) -> Result<usize, PreviewError> {
        self.current_index = index_for_page(page, self.total())?;
        Ok(self.current_index)
    }

    pub(crate) fn compute_stats(&self) -> ExamStats {
        scoring::compute_stats(&self.exam, &self.selections)
    }

    pub(crate) fn marks_obtained(&self) -> f64 {
        scoring::marks_obtained(&self.exam, &self.selections)
    }

    /// Hands the exam to `saver`. A failed save leaves the preview intact.
    pub(crate) async fn save(&self, saver: &dyn ExamSaver) -> Result<String, PreviewError> {
        saver.save_exam(&self.exam).await.map_err(|err| {
            tracing::warn!(
                exam_name = %self.exam.exam_name,
                error = %err,
                "Exam save failed"
            );
            PreviewError::SaveFailed(err.to_string())
        })
    }
}
