use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::time::{format_date, format_primitive, parse_date};
use crate::db::models::Exam;
use crate::services::scoring::ExamStats;

/// One answer choice. Both `is_correct` and `correct` are accepted on input;
/// output always uses `is_correct`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub(crate) struct OptionPayload {
    #[serde(default)]
    pub(crate) option: String,
    #[validate(length(min = 1, message = "option text must not be empty"))]
    pub(crate) text: String,
    #[serde(default, alias = "correct", alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub(crate) struct QuestionPayload {
    #[serde(alias = "questionText", alias = "question")]
    #[validate(length(min = 1, message = "question_text must not be empty"))]
    pub(crate) question_text: String,
    #[serde(default, alias = "marksPerQuestion", skip_serializing_if = "Option::is_none")]
    #[validate(range(exclusive_min = 0.0, message = "marks_per_question must be positive"))]
    pub(crate) marks_per_question: Option<f64>,
    #[validate(length(min = 2, message = "a question needs at least two options"), nested)]
    pub(crate) options: Vec<OptionPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) explanation: Option<String>,
}

impl QuestionPayload {
    pub(crate) fn correct_option_index(&self) -> Option<usize> {
        self.options.iter().position(|option| option.is_correct)
    }

    pub(crate) fn correct_option_count(&self) -> usize {
        self.options.iter().filter(|option| option.is_correct).count()
    }

    pub(crate) fn marks(&self, default_marks: f64) -> f64 {
        self.marks_per_question.unwrap_or(default_marks)
    }
}

/// A generated or authored exam as it travels between generator, preview,
/// storage and session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub(crate) struct ExamPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(alias = "examName")]
    #[validate(length(min = 1, max = 255, message = "exam_name must not be empty"))]
    pub(crate) exam_name: String,
    #[serde(alias = "bookName")]
    #[validate(length(min = 1, max = 255, message = "book_name must not be empty"))]
    pub(crate) book_name: String,
    #[validate(custom(function = "validate_exam_date"))]
    pub(crate) date: String,
    #[validate(range(min = 1, message = "duration must be positive"))]
    pub(crate) duration: i32,
    #[serde(default, alias = "totalQuestions")]
    pub(crate) total_questions: usize,
    #[serde(alias = "marksPerQuestion")]
    #[validate(range(exclusive_min = 0.0, message = "marks_per_question must be positive"))]
    pub(crate) marks_per_question: f64,
    #[serde(default, alias = "totalMarks")]
    pub(crate) total_marks: f64,
    #[validate(length(min = 1, message = "an exam needs at least one question"), nested)]
    pub(crate) questions: Vec<QuestionPayload>,
}

impl ExamPayload {
    /// Recomputes the derived header fields from the question list.
    pub(crate) fn normalized(mut self) -> Self {
        self.total_questions = self.questions.len();
        self.total_marks = self
            .questions
            .iter()
            .map(|question| question.marks(self.marks_per_question))
            .sum();
        for question in &mut self.questions {
            relabel_options(question);
        }
        self
    }

    pub(crate) fn from_db(exam: Exam) -> Self {
        Self {
            id: Some(exam.id),
            exam_name: exam.exam_name,
            book_name: exam.book_name,
            date: format_date(exam.exam_date),
            duration: exam.duration_minutes,
            total_questions: exam.total_questions.max(0) as usize,
            marks_per_question: exam.marks_per_question,
            total_marks: exam.total_marks,
            questions: exam.questions.0,
        }
    }

    /// Question numbers (1-based) whose options do not mark exactly one answer.
    pub(crate) fn ambiguous_questions(&self) -> Vec<usize> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(_, question)| question.correct_option_count() != 1)
            .map(|(index, _)| index + 1)
            .collect()
    }
}

/// Fills missing option labels with `A`, `B`, ... in display order.
pub(crate) fn relabel_options(question: &mut QuestionPayload) {
    for (index, option) in question.options.iter_mut().enumerate() {
        if option.option.trim().is_empty() {
            option.option = option_label(index);
        } else {
            option.option = option.option.trim().to_string();
        }
    }
}

pub(crate) fn option_label(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    if index < 26 {
        letter.to_string()
    } else {
        format!("{letter}{}", index / 26)
    }
}

fn validate_exam_date(value: &str) -> Result<(), ValidationError> {
    if parse_date(value).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("date").with_message("date must be YYYY-MM-DD".into()))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamGenerateRequest {
    #[serde(alias = "examName")]
    #[validate(length(min = 1, max = 255, message = "exam_name must not be empty"))]
    pub(crate) exam_name: String,
    #[serde(alias = "bookName")]
    #[validate(length(min = 1, max = 255, message = "book_name must not be empty"))]
    pub(crate) book_name: String,
    #[validate(custom(function = "validate_exam_date"))]
    pub(crate) date: String,
    #[validate(range(min = 1, message = "duration must be positive"))]
    pub(crate) duration: i32,
    #[serde(alias = "totalQuestions")]
    #[validate(range(min = 1, message = "total_questions must be positive"))]
    pub(crate) total_questions: usize,
    #[serde(alias = "marksPerQuestion")]
    #[validate(range(exclusive_min = 0.0, message = "marks_per_question must be positive"))]
    pub(crate) marks_per_question: f64,
    #[serde(default)]
    pub(crate) difficulty: Option<String>,
    #[serde(default)]
    pub(crate) topics: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamGenerateResponse {
    pub(crate) exam: ExamPayload,
    pub(crate) warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreviewScoreRequest {
    pub(crate) exam: ExamPayload,
    #[serde(default)]
    pub(crate) answers: BTreeMap<usize, usize>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PreviewStep {
    Next,
    Previous,
}

/// One page of an unsaved exam. `step` is applied after jumping to `page`;
/// `clear` drops a local answer before the page is rendered.
#[derive(Debug, Deserialize)]
pub(crate) struct PreviewPageRequest {
    pub(crate) exam: ExamPayload,
    pub(crate) page: usize,
    #[serde(default)]
    pub(crate) answers: BTreeMap<usize, usize>,
    #[serde(default)]
    pub(crate) step: Option<PreviewStep>,
    #[serde(default)]
    pub(crate) clear: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PreviewPageResponse {
    pub(crate) page: usize,
    pub(crate) total: usize,
    pub(crate) has_previous: bool,
    pub(crate) has_next: bool,
    pub(crate) question: QuestionPayload,
    pub(crate) selected_option: Option<usize>,
    pub(crate) answers: BTreeMap<usize, usize>,
    pub(crate) score: ScoreResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreResponse {
    pub(crate) attempted: usize,
    pub(crate) correct: usize,
    pub(crate) total: usize,
    pub(crate) score_percent: f64,
    pub(crate) score_display: String,
    pub(crate) marks_obtained: f64,
    pub(crate) total_marks: f64,
}

impl ScoreResponse {
    pub(crate) fn new(stats: ExamStats, marks_obtained: f64, total_marks: f64) -> Self {
        Self {
            attempted: stats.attempted,
            correct: stats.correct,
            total: stats.total,
            score_percent: stats.score_percent(),
            score_display: stats.score_display(),
            marks_obtained,
            total_marks,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamSummaryResponse {
    pub(crate) id: String,
    pub(crate) exam_name: String,
    pub(crate) book_name: String,
    pub(crate) date: String,
    pub(crate) duration: i32,
    pub(crate) total_questions: i32,
    pub(crate) marks_per_question: f64,
    pub(crate) total_marks: f64,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
}

impl ExamSummaryResponse {
    pub(crate) fn from_db(exam: &Exam) -> Self {
        Self {
            id: exam.id.clone(),
            exam_name: exam.exam_name.clone(),
            book_name: exam.book_name.clone(),
            date: format_date(exam.exam_date),
            duration: exam.duration_minutes,
            total_questions: exam.total_questions,
            marks_per_question: exam.marks_per_question,
            total_marks: exam.total_marks,
            created_by: exam.created_by.clone(),
            created_at: format_primitive(exam.created_at),
        }
    }
}

/// Question as shown to a student during a session: no answer key.
#[derive(Debug, Serialize)]
pub(crate) struct StudentQuestionView {
    pub(crate) index: usize,
    pub(crate) question_text: String,
    pub(crate) marks: f64,
    pub(crate) options: Vec<StudentOptionView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentOptionView {
    pub(crate) option: String,
    pub(crate) text: String,
}

impl StudentQuestionView {
    pub(crate) fn new(index: usize, question: &QuestionPayload, default_marks: f64) -> Self {
        Self {
            index,
            question_text: question.question_text.clone(),
            marks: question.marks(default_marks),
            options: question
                .options
                .iter()
                .map(|option| StudentOptionView {
                    option: option.option.clone(),
                    text: option.text.clone(),
                })
                .collect(),
        }
    }
}

/// Saved exam as non-authors see it.
#[derive(Debug, Serialize)]
pub(crate) struct StudentExamResponse {
    #[serde(flatten)]
    pub(crate) summary: ExamSummaryResponse,
    pub(crate) questions: Vec<StudentQuestionView>,
}

impl StudentExamResponse {
    pub(crate) fn from_db(exam: &Exam) -> Self {
        Self {
            summary: ExamSummaryResponse::from_db(exam),
            questions: exam
                .questions
                .0
                .iter()
                .enumerate()
                .map(|(index, question)| {
                    StudentQuestionView::new(index, question, exam.marks_per_question)
                })
                .collect(),
        }
    }
}
