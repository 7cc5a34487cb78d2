use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::ExamSession;
use crate::db::types::SessionStatus;
use crate::schemas::exam::{QuestionPayload, ScoreResponse, StudentQuestionView};
use crate::services::exam_session::{ExamSessionController, SelectOutcome};

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerRequest {
    #[serde(alias = "questionIndex")]
    pub(crate) question_index: usize,
    #[serde(alias = "optionIndex")]
    pub(crate) option_index: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    #[serde(flatten)]
    pub(crate) outcome: SelectOutcome,
    pub(crate) question_index: usize,
    pub(crate) attempted: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum NavigateAction {
    Next,
    Previous,
    #[serde(alias = "go_to")]
    Goto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavigateRequest {
    pub(crate) action: NavigateAction,
    #[serde(default)]
    pub(crate) index: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_name: String,
    pub(crate) status: SessionStatus,
    pub(crate) current_index: usize,
    pub(crate) total_questions: usize,
    pub(crate) duration: i32,
    pub(crate) selections: BTreeMap<usize, usize>,
    pub(crate) locked: Vec<usize>,
    pub(crate) current_question: Option<StudentQuestionView>,
    pub(crate) started_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
}

impl SessionResponse {
    pub(crate) fn new(session: &ExamSession, controller: &ExamSessionController) -> Self {
        let exam = controller.exam();
        let snapshot = controller.snapshot();
        Self {
            id: session.id.clone(),
            exam_id: session.exam_id.clone(),
            exam_name: exam.exam_name.clone(),
            status: controller.status(),
            current_index: controller.current_index(),
            total_questions: controller.total(),
            duration: exam.duration,
            selections: snapshot.selections,
            locked: snapshot.locked.into_iter().collect(),
            current_question: controller.current_question().map(|question| {
                StudentQuestionView::new(
                    controller.current_index(),
                    question,
                    exam.marks_per_question,
                )
            }),
            started_at: session.started_at.map(format_primitive),
            submitted_at: session.submitted_at.map(format_primitive),
        }
    }
}

/// Per-question outcome revealed after submission.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionReview {
    pub(crate) index: usize,
    pub(crate) question_text: String,
    pub(crate) selected_option: Option<usize>,
    pub(crate) correct_option: Option<usize>,
    pub(crate) is_correct: bool,
    pub(crate) options: Vec<crate::schemas::exam::OptionPayload>,
    pub(crate) explanation: Option<String>,
}

impl QuestionReview {
    fn new(index: usize, question: &QuestionPayload, selected: Option<usize>) -> Self {
        let correct_option = question.correct_option_index();
        let is_correct = selected
            .and_then(|option| question.options.get(option))
            .is_some_and(|option| option.is_correct);
        Self {
            index,
            question_text: question.question_text.clone(),
            selected_option: selected,
            correct_option,
            is_correct,
            options: question.options.clone(),
            explanation: question.explanation.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResultResponse {
    pub(crate) session_id: String,
    #[serde(flatten)]
    pub(crate) score: ScoreResponse,
    pub(crate) review: Vec<QuestionReview>,
}

impl SessionResultResponse {
    pub(crate) fn new(session_id: &str, controller: &ExamSessionController) -> Self {
        let exam = controller.exam();
        let review = exam
            .questions
            .iter()
            .enumerate()
            .map(|(index, question)| {
                QuestionReview::new(index, question, controller.selections().get(&index).copied())
            })
            .collect();

        Self {
            session_id: session_id.to_string(),
            score: ScoreResponse::new(
                controller.compute_stats(),
                controller.marks_obtained(),
                crate::services::scoring::total_marks(exam),
            ),
            review,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scoring::fixtures::sample_exam;
    use serde_json::json;

    #[test]
    fn answer_response_flattens_outcome() {
        let response = AnswerResponse {
            outcome: SelectOutcome::Locked { selected_option: 2 },
            question_index: 1,
            attempted: 3,
        };
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(
            value,
            json!({"outcome": "locked", "selected_option": 2, "question_index": 1, "attempted": 3})
        );
    }

    #[test]
    fn navigate_request_accepts_goto_spellings() {
        let request: NavigateRequest =
            serde_json::from_value(json!({"action": "go_to", "index": 3})).unwrap();
        assert!(matches!(request.action, NavigateAction::Goto));
        assert_eq!(request.index, Some(3));
    }

    #[test]
    fn results_reveal_answers_per_question() {
        let mut controller = ExamSessionController::new(sample_exam(3));
        controller.start().unwrap();
        controller.select_answer(0, 0).unwrap();
        controller.select_answer(1, 1).unwrap();
        controller.submit().unwrap();

        let value = serde_json::to_value(SessionResultResponse::new("s-1", &controller)).unwrap();
        assert_eq!(value["attempted"], 2);
        assert_eq!(value["correct"], 1);
        assert_eq!(value["total"], 3);
        assert_eq!(value["score_display"], "33.3%");
        assert_eq!(value["review"][0]["is_correct"], true);
        assert_eq!(value["review"][1]["correct_option"], 0);
        assert_eq!(value["review"][2]["selected_option"], serde_json::Value::Null);
    }
}
