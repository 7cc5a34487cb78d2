use axum::body::to_bytes;
use axum::http::{header, Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::db::types::UserRole;
use crate::test_support;

fn exam_payload() -> serde_json::Value {
    json!({
        "examName": "Cardiology basics",
        "bookName": "Harrison's Principles",
        "date": "2026-03-01",
        "duration": 30,
        "marksPerQuestion": 2.0,
        "questions": [
            {
                "question": "Normal resting heart rate in adults?",
                "options": [
                    {"option": "A", "text": "60-100 bpm", "correct": true},
                    {"option": "B", "text": "100-140 bpm", "correct": false}
                ],
                "explanation": "Below 60 is bradycardia."
            },
            {
                "questionText": "Which valve separates left atrium and ventricle?",
                "options": [
                    {"option": "A", "text": "Tricuspid", "is_correct": false},
                    {"option": "B", "text": "Mitral", "is_correct": true}
                ]
            },
            {
                "question_text": "First-line drug for stable angina symptom relief?",
                "options": [
                    {"option": "A", "text": "Nitroglycerin", "isCorrect": true},
                    {"option": "B", "text": "Warfarin"}
                ]
            }
        ]
    })
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn professor_saves_and_student_views_exam_without_answers() {
    let ctx = test_support::setup_test_context().await;

    let professor = test_support::insert_user(
        ctx.state.db(),
        "prof.adams",
        "Prof Adams",
        "professor-pass",
        UserRole::Professor,
    )
    .await;
    let student = test_support::insert_user(
        ctx.state.db(),
        "student.lee",
        "Student Lee",
        "student-pass",
        UserRole::Student,
    )
    .await;
    let professor_token = test_support::bearer_token(&professor, ctx.state.settings());
    let student_token = test_support::bearer_token(&student, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&professor_token),
            Some(exam_payload()),
        ))
        .await
        .expect("create exam");
    let status = response.status();
    let created = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["total_questions"], 3);
    assert_eq!(created["total_marks"], 6.0);
    assert_eq!(created["questions"][0]["options"][0]["is_correct"], true);
    let exam_id = created["id"].as_str().expect("exam id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/exams/{exam_id}"),
            Some(&student_token),
            None,
        ))
        .await
        .expect("get exam");
    assert_eq!(response.status(), StatusCode::OK);
    let view = test_support::read_json(response).await;
    assert_eq!(view["exam_name"], "Cardiology basics");
    assert!(view["questions"][0]["options"][0].get("is_correct").is_none());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&student_token),
            Some(exam_payload()),
        ))
        .await
        .expect("student create");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/exams?book_name=harrison",
            Some(&student_token),
            None,
        ))
        .await
        .expect("list exams");
    assert_eq!(response.status(), StatusCode::OK);
    let list = test_support::read_json(response).await;
    assert_eq!(list["total_count"], 1);
    assert_eq!(list["items"][0]["id"], exam_id);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn session_locks_answers_and_scores_on_submit() {
    let ctx = test_support::setup_test_context().await;

    let professor = test_support::insert_user(
        ctx.state.db(),
        "prof.baker",
        "Prof Baker",
        "professor-pass",
        UserRole::Professor,
    )
    .await;
    let student = test_support::insert_user(
        ctx.state.db(),
        "student.kim",
        "Student Kim",
        "student-pass",
        UserRole::Student,
    )
    .await;
    let other = test_support::insert_user(
        ctx.state.db(),
        "student.ng",
        "Student Ng",
        "student-pass",
        UserRole::Student,
    )
    .await;
    let professor_token = test_support::bearer_token(&professor, ctx.state.settings());
    let student_token = test_support::bearer_token(&student, ctx.state.settings());
    let other_token = test_support::bearer_token(&other, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&professor_token),
            Some(exam_payload()),
        ))
        .await
        .expect("create exam");
    let created = test_support::read_json(response).await;
    let exam_id = created["id"].as_str().expect("exam id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{exam_id}/sessions"),
            Some(&student_token),
            None,
        ))
        .await
        .expect("start session");
    let status = response.status();
    let session = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {session}");
    assert_eq!(session["status"], "in_progress");
    assert_eq!(session["current_index"], 0);
    assert_eq!(session["total_questions"], 3);
    let session_id = session["id"].as_str().expect("session id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{exam_id}/sessions"),
            Some(&student_token),
            None,
        ))
        .await
        .expect("resume session");
    assert_eq!(response.status(), StatusCode::OK);
    let resumed = test_support::read_json(response).await;
    assert_eq!(resumed["id"], session_id);

    let answer = |question_index: usize, option_index: usize, token: &str| {
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/answers"),
            Some(token),
            Some(json!({"questionIndex": question_index, "optionIndex": option_index})),
        )
    };

    let response = ctx.app.clone().oneshot(answer(0, 0, &student_token)).await.expect("answer");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert_eq!(body["outcome"], "recorded");
    assert_eq!(body["selected_option"], 0);

    let response = ctx.app.clone().oneshot(answer(0, 1, &student_token)).await.expect("re-answer");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert_eq!(body["outcome"], "locked");
    assert_eq!(body["selected_option"], 0);

    let response =
        ctx.app.clone().oneshot(answer(1, 0, &other_token)).await.expect("foreign answer");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx.app.clone().oneshot(answer(1, 0, &student_token)).await.expect("answer");
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/navigate"),
            Some(&student_token),
            Some(json!({"action": "goto", "index": 2})),
        ))
        .await
        .expect("navigate");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert_eq!(body["current_index"], 2);
    assert_eq!(body["locked"], json!([0, 1]));

    let submit = || {
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/sessions/{session_id}/submit"),
            Some(&student_token),
            None,
        )
    };

    let response = ctx.app.clone().oneshot(submit()).await.expect("submit");
    assert_eq!(response.status(), StatusCode::OK);
    let result = test_support::read_json(response).await;
    assert_eq!(result["attempted"], 2);
    assert_eq!(result["correct"], 1);
    assert_eq!(result["total"], 3);
    assert_eq!(result["score_display"], "33.3%");
    assert_eq!(result["review"][1]["is_correct"], false);

    let response = ctx.app.clone().oneshot(submit()).await.expect("second submit");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = ctx.app.clone().oneshot(answer(2, 0, &student_token)).await.expect("late");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/sessions/{session_id}/results"),
            Some(&professor_token),
            None,
        ))
        .await
        .expect("results");
    assert_eq!(response.status(), StatusCode::OK);
    let results = test_support::read_json(response).await;
    assert_eq!(results["session_id"], session_id);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn delete_with_sessions_requires_force() {
    let ctx = test_support::setup_test_context().await;

    let professor = test_support::insert_user(
        ctx.state.db(),
        "prof.cole",
        "Prof Cole",
        "professor-pass",
        UserRole::Professor,
    )
    .await;
    let student = test_support::insert_user(
        ctx.state.db(),
        "student.ortiz",
        "Student Ortiz",
        "student-pass",
        UserRole::Student,
    )
    .await;
    let professor_token = test_support::bearer_token(&professor, ctx.state.settings());
    let student_token = test_support::bearer_token(&student, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&professor_token),
            Some(exam_payload()),
        ))
        .await
        .expect("create exam");
    let created = test_support::read_json(response).await;
    let exam_id = created["id"].as_str().expect("exam id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/exams/{exam_id}/sessions"),
            Some(&student_token),
            None,
        ))
        .await
        .expect("start session");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/exams/{exam_id}"),
            Some(&professor_token),
            None,
        ))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/exams/{exam_id}?force_delete=true"),
            Some(&professor_token),
            None,
        ))
        .await
        .expect("force delete");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/exams/{exam_id}"),
            Some(&professor_token),
            None,
        ))
        .await
        .expect("get deleted");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn score_preview_counts_only_attempted_answers() {
    let ctx = test_support::setup_test_context().await;

    let professor = test_support::insert_user(
        ctx.state.db(),
        "prof.diaz",
        "Prof Diaz",
        "professor-pass",
        UserRole::Professor,
    )
    .await;
    let token = test_support::bearer_token(&professor, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/preview/score",
            Some(&token),
            Some(json!({"exam": exam_payload(), "answers": {"0": 0, "2": 1}})),
        ))
        .await
        .expect("score preview");
    assert_eq!(response.status(), StatusCode::OK);
    let score = test_support::read_json(response).await;
    assert_eq!(score["attempted"], 2);
    assert_eq!(score["correct"], 1);
    assert_eq!(score["marks_obtained"], 2.0);
}

async fn call(
    app: &axum::Router,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(test_support::json_request(method, uri, Some(token), body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn preview_page_walks_unsaved_exam() {
    let ctx = test_support::setup_test_context().await;
    let (_, token) = test_support::user_with_token(&ctx, "prof.evans", UserRole::Professor).await;
    let page = |page: usize, extra: serde_json::Value| {
        let mut body = json!({"exam": exam_payload(), "page": page});
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        body
    };

    for out_of_range in [0, 4] {
        let (status, body) = call(
            &ctx.app,
            Method::POST,
            "/api/v1/exams/preview/page",
            &token,
            Some(page(out_of_range, json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "page {out_of_range}: {body}");
    }

    let (status, first) = call(
        &ctx.app,
        Method::POST,
        "/api/v1/exams/preview/page",
        &token,
        Some(page(1, json!({"answers": {"0": 0}}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {first}");
    assert_eq!(first["page"], 1);
    assert_eq!(first["total"], 3);
    assert_eq!(first["has_previous"], false);
    assert_eq!(first["question"]["question_text"], "Normal resting heart rate in adults?");
    assert_eq!(first["question"]["options"][0]["is_correct"], true);
    assert_eq!(first["selected_option"], 0);
    assert_eq!(first["score"]["correct"], 1);

    let (status, last) = call(
        &ctx.app,
        Method::POST,
        "/api/v1/exams/preview/page",
        &token,
        Some(page(3, json!({"step": "next"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last["page"], 3);
    assert_eq!(last["has_next"], false);
    assert_eq!(last["selected_option"], serde_json::Value::Null);

    let (status, back) = call(
        &ctx.app,
        Method::POST,
        "/api/v1/exams/preview/page",
        &token,
        Some(page(2, json!({"step": "previous", "answers": {"0": 0, "1": 1}, "clear": 0}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(back["page"], 1);
    assert_eq!(back["selected_option"], serde_json::Value::Null);
    assert_eq!(back["answers"], json!({"1": 1}));
    assert_eq!(back["score"]["attempted"], 1);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn exports_saved_and_unsaved_exams_as_pdf() {
    let ctx = test_support::setup_test_context().await;
    let (_, token) = test_support::user_with_token(&ctx, "prof.fox", UserRole::Professor).await;
    let (_, student_token) =
        test_support::user_with_token(&ctx, "student.gray", UserRole::Student).await;

    let (status, created) =
        call(&ctx.app, Method::POST, "/api/v1/exams", &token, Some(exam_payload())).await;
    assert_eq!(status, StatusCode::CREATED);
    let exam_id = created["id"].as_str().expect("exam id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/exams/{exam_id}/export"),
            Some(&token),
            None,
        ))
        .await
        .expect("export saved");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Cardiology_basics.pdf\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("pdf body");
    assert!(bytes.starts_with(b"%PDF"));

    let mut unsaved = exam_payload();
    unsaved["examName"] = json!("Renal \"physiology\" / quiz");
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/export",
            Some(&token),
            Some(unsaved.clone()),
        ))
        .await
        .expect("export payload");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Renal_physiology_quiz.pdf\""
    );

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/export",
            Some(&student_token),
            Some(unsaved),
        ))
        .await
        .expect("student export");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn get_session_is_hidden_from_other_students() {
    let ctx = test_support::setup_test_context().await;
    let (_, professor_token) =
        test_support::user_with_token(&ctx, "prof.hale", UserRole::Professor).await;
    let (_, student_token) =
        test_support::user_with_token(&ctx, "student.ito", UserRole::Student).await;
    let (_, other_token) =
        test_support::user_with_token(&ctx, "student.jones", UserRole::Student).await;

    let (_, created) =
        call(&ctx.app, Method::POST, "/api/v1/exams", &professor_token, Some(exam_payload()))
            .await;
    let exam_id = created["id"].as_str().expect("exam id").to_string();
    let (_, session) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/exams/{exam_id}/sessions"),
        &student_token,
        None,
    )
    .await;
    let session_uri = format!("/api/v1/sessions/{}", session["id"].as_str().expect("id"));

    let (status, view) = call(&ctx.app, Method::GET, &session_uri, &student_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "in_progress");
    assert_eq!(view["current_question"]["index"], 0);
    assert!(view["current_question"]["options"][0].get("is_correct").is_none());

    let (status, _) = call(&ctx.app, Method::GET, &session_uri, &other_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        call(&ctx.app, Method::GET, &format!("{session_uri}/results"), &student_token, None)
            .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn concurrent_starts_share_one_open_session() {
    let ctx = test_support::setup_test_context().await;
    let (_, professor_token) =
        test_support::user_with_token(&ctx, "prof.kent", UserRole::Professor).await;
    let (student, student_token) =
        test_support::user_with_token(&ctx, "student.lim", UserRole::Student).await;

    let (_, created) =
        call(&ctx.app, Method::POST, "/api/v1/exams", &professor_token, Some(exam_payload()))
            .await;
    let exam_id = created["id"].as_str().expect("exam id").to_string();
    let uri = format!("/api/v1/exams/{exam_id}/sessions");

    let (first, second) = tokio::join!(
        call(&ctx.app, Method::POST, &uri, &student_token, None),
        call(&ctx.app, Method::POST, &uri, &student_token, None),
    );
    let mut statuses = [first.0.as_u16(), second.0.as_u16()];
    statuses.sort_unstable();
    assert_eq!(statuses, [200, 201]);
    assert_eq!(first.1["id"], second.1["id"]);

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM exam_sessions WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(&exam_id)
    .bind(&student.id)
    .fetch_one(ctx.state.db())
    .await
    .expect("count sessions");
    assert_eq!(open, 1);
}
