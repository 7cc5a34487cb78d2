use std::collections::BTreeMap;

use serde::Serialize;

use crate::schemas::exam::ExamPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub(crate) struct ExamStats {
    pub(crate) attempted: usize,
    pub(crate) correct: usize,
    pub(crate) total: usize,
}

impl ExamStats {
    pub(crate) fn score_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 * 100.0 / self.total as f64
    }

    pub(crate) fn score_display(&self) -> String {
        format!("{:.1}%", self.score_percent())
    }
}

/// Full recompute over the selection map. Selections pointing outside the
/// exam are counted as attempted but never as correct.
pub(crate) fn compute_stats(exam: &ExamPayload, selections: &BTreeMap<usize, usize>) -> ExamStats {
    let correct = selections
        .iter()
        .filter(|(question_index, option_index)| {
            is_correct_selection(exam, **question_index, **option_index)
        })
        .count();

    ExamStats { attempted: selections.len(), correct, total: exam.questions.len() }
}

pub(crate) fn marks_obtained(exam: &ExamPayload, selections: &BTreeMap<usize, usize>) -> f64 {
    selections
        .iter()
        .filter(|(question_index, option_index)| {
            is_correct_selection(exam, **question_index, **option_index)
        })
        .filter_map(|(question_index, _)| exam.questions.get(*question_index))
        .map(|question| question.marks(exam.marks_per_question))
        .sum()
}

pub(crate) fn total_marks(exam: &ExamPayload) -> f64 {
    exam.questions.iter().map(|question| question.marks(exam.marks_per_question)).sum()
}

fn is_correct_selection(exam: &ExamPayload, question_index: usize, option_index: usize) -> bool {
    exam.questions
        .get(question_index)
        .and_then(|question| question.options.get(option_index))
        .is_some_and(|option| option.is_correct)
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_exam;
    use super::*;

    #[test]
    fn three_question_example_scores_one_third() {
        let exam = sample_exam(3);
        let selections = BTreeMap::from([(0, 0), (1, 2)]);

        let stats = compute_stats(&exam, &selections);
        assert_eq!(stats, ExamStats { attempted: 2, correct: 1, total: 3 });
        assert_eq!(stats.score_display(), "33.3%");
        assert_eq!(marks_obtained(&exam, &selections), 1.0);
    }

    #[test]
    fn per_question_marks_override_exam_default() {
        let mut exam = sample_exam(2);
        exam.marks_per_question = 2.0;
        exam.questions[1].marks_per_question = Some(5.0);
        let selections = BTreeMap::from([(0, 0), (1, 0)]);

        assert_eq!(marks_obtained(&exam, &selections), 7.0);
        assert_eq!(total_marks(&exam), 7.0);
    }

    #[test]
    fn empty_exam_scores_zero_without_dividing_by_zero() {
        let exam = sample_exam(0);
        let stats = compute_stats(&exam, &BTreeMap::new());
        assert_eq!(stats.score_display(), "0.0%");
    }

    #[test]
    fn out_of_range_selection_is_attempted_but_not_correct() {
        let exam = sample_exam(1);
        let selections = BTreeMap::from([(0, 9)]);
        let stats = compute_stats(&exam, &selections);
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.correct, 0);
    }
}
