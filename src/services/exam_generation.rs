use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::core::config::Settings;
use crate::schemas::exam::{
    relabel_options, ExamGenerateRequest, ExamPayload, OptionPayload, QuestionPayload,
};

const MAX_RETRIES: u32 = 3;

const GENERATION_SYSTEM_PROMPT: &str = r#"You are an experienced medical educator writing multiple-choice exams for medical students.
Write clinically accurate questions grounded in the named textbook. Each question has four options and exactly one correct option.

Respond with strict JSON only:
{
  "questions": [
    {
      "question_text": "question stem",
      "options": [
        {"option": "A", "text": "option text", "is_correct": false},
        {"option": "B", "text": "option text", "is_correct": true}
      ],
      "explanation": "why the correct option is correct"
    }
  ]
}
"#;

#[derive(Debug, Clone)]
pub(crate) struct GeneratedExam {
    pub(crate) exam: ExamPayload,
    pub(crate) warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedEnvelope {
    #[serde(default)]
    questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    #[serde(alias = "question", alias = "questionText", default)]
    question_text: String,
    #[serde(default)]
    options: Vec<OptionPayload>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ExamGenerationService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl ExamGenerationService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
        })
    }

    pub(crate) async fn generate(&self, request: &ExamGenerateRequest) -> Result<GeneratedExam> {
        let timer = Instant::now();

        let mut user_prompt = format!(
            "Textbook: {}\nExam: {}\nNumber of questions: {}\n",
            request.book_name, request.exam_name, request.total_questions
        );
        if let Some(difficulty) = request.difficulty.as_deref().filter(|d| !d.trim().is_empty()) {
            user_prompt.push_str(&format!("Difficulty: {difficulty}\n"));
        }
        if !request.topics.is_empty() {
            user_prompt.push_str(&format!("Focus topics: {}\n", request.topics.join(", ")));
        }
        user_prompt.push_str("Return exactly that many questions in the JSON format described.");

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": GENERATION_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_completion_tokens": self.max_tokens,
            "response_format": {"type": "json_object"}
        });

        tracing::info!(
            book_name = %request.book_name,
            total_questions = request.total_questions,
            "Sending exam generation request"
        );

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..=MAX_RETRIES {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    last_error = Some(anyhow::anyhow!("AI API error ({status}): {body}"));
                    if !is_retryable(status) {
                        break;
                    }
                }
                Err(err) => {
                    last_error = Some(anyhow::anyhow!(err).context("Failed to call AI API"));
                }
            }

            if attempt < MAX_RETRIES {
                tracing::warn!(attempt = attempt + 1, "Exam generation request failed; retrying");
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|value| value.as_str())
            .context("Missing AI response content")?;

        let (questions, warnings) = parse_generated_questions(content)?;

        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(|value| value.as_u64());
        tracing::info!(
            book_name = %request.book_name,
            questions = questions.len(),
            warnings = warnings.len(),
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = tokens_used,
            "Exam generation completed"
        );

        let exam = ExamPayload {
            id: None,
            exam_name: request.exam_name.trim().to_string(),
            book_name: request.book_name.trim().to_string(),
            date: request.date.trim().to_string(),
            duration: request.duration,
            total_questions: questions.len(),
            marks_per_question: request.marks_per_question,
            total_marks: 0.0,
            questions,
        }
        .normalized();

        let mut warnings = warnings;
        if exam.questions.len() != request.total_questions {
            warnings.push(format!(
                "Requested {} questions, received {}",
                request.total_questions,
                exam.questions.len()
            ));
        }

        Ok(GeneratedExam { exam, warnings })
    }
}

/// Parses the model output into questions plus human-readable warnings.
///
/// Accepts a `{"questions": [...]}` object or a bare array, optionally wrapped
/// in a Markdown code fence. Questions with an empty stem or fewer than two
/// options are dropped.
/// Rate limits and server faults are worth another attempt; other client
/// errors such as a bad key or malformed request are not.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn parse_generated_questions(raw: &str) -> Result<(Vec<QuestionPayload>, Vec<String>)> {
    let cleaned = strip_code_fence(raw);
    let value: Value = serde_json::from_str(cleaned).context("Failed to parse AI JSON")?;

    let envelope: GeneratedEnvelope = if value.is_array() {
        GeneratedEnvelope {
            questions: serde_json::from_value(value).context("Unexpected AI question list")?,
        }
    } else {
        serde_json::from_value(value).context("Unexpected AI response shape")?
    };

    let mut questions = Vec::with_capacity(envelope.questions.len());
    let mut warnings = Vec::new();

    for (position, generated) in envelope.questions.into_iter().enumerate() {
        let number = position + 1;
        let question_text = generated.question_text.trim().to_string();
        let options: Vec<OptionPayload> = generated
            .options
            .into_iter()
            .filter(|option| !option.text.trim().is_empty())
            .collect();

        if question_text.is_empty() || options.len() < 2 {
            warnings.push(format!("Generated question {number} was incomplete and was skipped"));
            continue;
        }

        let mut question = QuestionPayload {
            question_text,
            marks_per_question: None,
            options,
            explanation: generated.explanation.filter(|text| !text.trim().is_empty()),
        };
        relabel_options(&mut question);

        match question.correct_option_count() {
            1 => {}
            0 => warnings.push(format!("Question {} has no correct option", questions.len() + 1)),
            _ => warnings.push(format!(
                "Question {} has more than one correct option",
                questions.len() + 1
            )),
        }
        questions.push(question);
    }

    Ok((questions, warnings))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_and_server_faults_are_retried() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn parses_fenced_output_with_mixed_flag_names() {
        let raw = r#"```json
{"questions": [
  {"question_text": "Drug of choice for anaphylaxis?",
   "options": [{"text": "Epinephrine", "correct": true}, {"text": "Atropine", "correct": false}],
   "explanation": "First-line"},
  {"question": "Antidote for heparin?",
   "options": [{"option": "A", "text": "Protamine", "is_correct": true}, {"option": "B", "text": "Vitamin K"}]}
]}
```"#;

        let (questions, warnings) = parse_generated_questions(raw).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].options[0].option, "A");
        assert!(questions[0].options[0].is_correct);
        assert_eq!(questions[1].question_text, "Antidote for heparin?");
        assert_eq!(questions[1].explanation, None);
    }

    #[test]
    fn reports_missing_or_multiple_correct_options() {
        let raw = r#"[
  {"question_text": "Q1", "options": [{"text": "a"}, {"text": "b"}]},
  {"question_text": "Q2", "options": [{"text": "a", "is_correct": true}, {"text": "b", "is_correct": true}]}
]"#;

        let (questions, warnings) = parse_generated_questions(raw).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(
            warnings,
            vec![
                "Question 1 has no correct option".to_string(),
                "Question 2 has more than one correct option".to_string(),
            ]
        );
    }

    #[test]
    fn skips_incomplete_questions() {
        let raw = r#"{"questions": [
  {"question_text": "", "options": [{"text": "a"}, {"text": "b"}]},
  {"question_text": "Only one option", "options": [{"text": "a", "is_correct": true}]},
  {"question_text": "Fine", "options": [{"text": "a", "is_correct": true}, {"text": " "}, {"text": "c"}]}
]}"#;

        let (questions, warnings) = parse_generated_questions(raw).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].options.len(), 2);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_generated_questions("Sorry, I cannot help").is_err());
    }
}
