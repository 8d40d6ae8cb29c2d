use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use study_assistant::api::{cors_layer, create_router, AppState};
use study_assistant::config::{GenerationConfig, StorageConfig};
use study_assistant::{LLMError, LLMService, TextGenerator};
use tempfile::TempDir;

/// Plays back queued replies in order and records every prompt it receives
#[derive(Default)]
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, LLMError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn reply(self: &Arc<Self>, text: &str) -> Arc<Self> {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self.clone()
    }

    fn fail(self: &Arc<Self>, error: LLMError) -> Arc<Self> {
        self.replies.lock().unwrap().push_back(Err(error));
        self.clone()
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _system_message: Option<&str>, prompt: &str) -> Result<String, LLMError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LLMError::EmptyResponse { provider: "Scripted" }))
    }

    fn provider_name(&self) -> &'static str {
        "Scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct TestApp {
    server: TestServer,
    generator: Arc<ScriptedGenerator>,
    _uploads: TempDir,
}

fn create_test_app_with_limit(max_upload_bytes: usize) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::default());
    let storage = StorageConfig {
        upload_dir: uploads.path().join("uploads"),
        max_upload_bytes,
    };

    let state = AppState::new(
        LLMService::with_generator(generator.clone()),
        &storage,
        GenerationConfig::default(),
    );

    TestApp {
        server: TestServer::new(create_router(state)).unwrap(),
        generator,
        _uploads: uploads,
    }
}

fn create_test_app() -> TestApp {
    create_test_app_with_limit(10 * 1024 * 1024)
}

fn quiz_reply(count: usize) -> String {
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "question": format!("What is {} + {}?", i, i),
                "options": [format!("{}", i * 2), "7", "11", "13"],
                "correct": 0,
                "explanation": format!("{} doubled is {}.", i, i * 2)
            })
        })
        .collect();
    serde_json::to_string(&items).unwrap()
}

fn flashcard_reply(count: usize) -> String {
    let items: Vec<Value> = (0..count)
        .map(|i| json!({"front": format!("Term {}", i), "back": format!("Definition {}", i)}))
        .collect();
    format!("```json\n{}\n```", serde_json::to_string(&items).unwrap())
}

async fn upload(app: &TestApp, file_name: &str, bytes: &[u8]) -> Value {
    let form = MultipartForm::new().add_part("file", Part::bytes(bytes.to_vec()).file_name(file_name));
    let response = app.server.post("/api/upload").multipart(form).await;
    response.assert_status_ok();
    response.json()
}

async fn stats(app: &TestApp) -> Value {
    let response = app.server.get("/api/stats").await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app();
    let response = app.server.get("/api/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_upload_list_and_delete_document() {
    let app = create_test_app();

    let body = upload(&app, "Cell Biology.PDF", b"mitochondria and ribosomes").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "Cell Biology.PDF");
    assert_eq!(body["doc"]["size"], 26);
    assert_eq!(body["doc"]["type"], ".pdf");
    let id = body["doc"]["id"].as_str().unwrap().to_string();
    let stored_path = body["doc"]["path"].as_str().unwrap().to_string();
    assert_eq!(std::fs::read(&stored_path).unwrap(), b"mitochondria and ribosomes");

    let documents: Value = app.server.get("/api/documents").await.json();
    let documents = documents.as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["name"], "Cell Biology.PDF");
    assert_eq!(documents[0]["size"], 26);
    assert_eq!(documents[0]["type"], ".pdf");
    assert_eq!(stats(&app).await["documentsUploaded"], 1);

    let response = app.server.delete(&format!("/api/documents/{}", id)).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["success"], true);

    let documents: Value = app.server.get("/api/documents").await.json();
    assert!(documents.as_array().unwrap().is_empty());
    assert_eq!(stats(&app).await["documentsUploaded"], 0);
    assert!(!std::path::Path::new(&stored_path).exists());
}

#[tokio::test]
async fn test_delete_unknown_document_is_noop() {
    let app = create_test_app();
    upload(&app, "notes.txt", b"osmosis").await;
    let before = stats(&app).await;

    let response = app.server.delete("/api/documents/does-not-exist").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["success"], true);

    let documents: Value = app.server.get("/api/documents").await.json();
    assert_eq!(documents.as_array().unwrap().len(), 1);
    assert_eq!(stats(&app).await, before);
}

#[tokio::test]
async fn test_upload_without_file_part_is_rejected() {
    let app = create_test_app();
    let form = MultipartForm::new().add_text("comment", "no file here");

    let response = app.server.post("/api/upload").multipart(form).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No file received");

    assert_eq!(stats(&app).await["documentsUploaded"], 0);
}

#[tokio::test]
async fn test_text_part_named_file_is_not_a_document() {
    let app = create_test_app();
    let form = MultipartForm::new().add_text("file", "just some text, not a file");

    let response = app.server.post("/api/upload").multipart(form).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "No file received");

    let documents: Value = app.server.get("/api/documents").await.json();
    assert!(documents.as_array().unwrap().is_empty());
    assert_eq!(stats(&app).await["documentsUploaded"], 0);
}

#[tokio::test]
async fn test_upload_limit_applies_to_file_bytes() {
    let app = create_test_app_with_limit(1024);

    let body = upload(&app, "exact.bin", &[b'x'; 1024]).await;
    assert_eq!(body["doc"]["size"], 1024);

    let form = MultipartForm::new().add_part("file", Part::bytes(vec![b'x'; 1025]).file_name("over.bin"));
    let response = app.server.post("/api/upload").multipart(form).await;
    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json::<Value>()["success"], false);

    let documents: Value = app.server.get("/api/documents").await.json();
    let documents = documents.as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["name"], "exact.bin");
    assert_eq!(stats(&app).await["documentsUploaded"], 1);
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let app = create_test_app_with_limit(1024);
    let form = MultipartForm::new().add_part("file", Part::bytes(vec![b'x'; 64 * 1024]).file_name("huge.bin"));

    let response = app.server.post("/api/upload").multipart(form).await;
    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    let documents: Value = app.server.get("/api/documents").await.json();
    assert!(documents.as_array().unwrap().is_empty());
    assert_eq!(stats(&app).await["documentsUploaded"], 0);
}

#[tokio::test]
async fn test_chat_records_topics_transcript_and_stats() {
    let app = create_test_app();
    upload(&app, "biology.pdf", b"cells").await;
    app.generator.reply("Mitochondria produce ATP for the cell.");

    let response = app
        .server
        .post("/api/chat")
        .json(&json!({"message": "How do mitochondria power the cell?"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["reply"], "Mitochondria produce ATP for the cell.");
    assert_eq!(body["sources"], json!(["biology.pdf"]));

    let topics: Value = app.server.get("/api/topics").await.json();
    let topics = topics["topics"].as_array().unwrap();
    assert!(topics.contains(&json!("mitochondria")));
    assert!(topics.contains(&json!("cell")));

    let stats = stats(&app).await;
    assert_eq!(stats["questionsAsked"], 1);
    assert_eq!(stats["voiceQueries"], 0);
    assert_eq!(stats["topicsExplored"], 3);

    let history: Value = app.server.get("/api/chat/history").await.json();
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["sources"], json!(["biology.pdf"]));

    let prompts = app.generator.prompts();
    assert!(prompts[0].contains("biology.pdf"));
    assert!(prompts[0].ends_with("Student question: How do mitochondria power the cell?"));
}

#[tokio::test]
async fn test_chat_forwards_message_untrimmed() {
    let app = create_test_app();
    app.generator.reply("Osmosis moves water.");

    app.server
        .post("/api/chat")
        .json(&json!({"message": "  what is osmosis?\n"}))
        .await
        .assert_status_ok();

    assert!(app.generator.prompts()[0].ends_with("Student question:   what is osmosis?\n"));
    let history: Value = app.server.get("/api/chat/history").await.json();
    assert_eq!(history["messages"][0]["content"], "  what is osmosis?\n");
}

#[tokio::test]
async fn test_voice_chat_counts_voice_query() {
    let app = create_test_app();
    app.generator.reply("Sure.");

    app.server
        .post("/api/chat")
        .json(&json!({"message": "explain photosynthesis", "voice": true}))
        .await
        .assert_status_ok();

    let stats = stats(&app).await;
    assert_eq!(stats["questionsAsked"], 1);
    assert_eq!(stats["voiceQueries"], 1);
}

#[tokio::test]
async fn test_chat_requires_message() {
    let app = create_test_app();

    let response = app.server.post("/api/chat").json(&json!({})).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "No message provided");

    let response = app.server.post("/api/chat").json(&json!({"message": "   "})).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app.server.post("/api/chat").text("not json").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["success"], false);

    assert!(app.generator.prompts().is_empty());
    assert_eq!(stats(&app).await["questionsAsked"], 0);
}

#[tokio::test]
async fn test_chat_upstream_failure_surfaces_bad_gateway() {
    let app = create_test_app();
    app.generator.fail(LLMError::Status {
        provider: "Scripted",
        status: 429,
        body: "quota exceeded".to_string(),
    });

    let response = app
        .server
        .post("/api/chat")
        .json(&json!({"message": "what is entropy"}))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("quota exceeded"));

    assert_eq!(stats(&app).await["questionsAsked"], 0);
    let history: Value = app.server.get("/api/chat/history").await.json();
    assert!(history["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_timeout_surfaces_gateway_timeout() {
    let app = create_test_app();
    app.generator.fail(LLMError::Timeout {
        provider: "Scripted",
        timeout_secs: 30,
    });

    let response = app
        .server
        .post("/api/chat")
        .json(&json!({"message": "what is entropy"}))
        .await;

    response.assert_status(StatusCode::GATEWAY_TIMEOUT);
    assert!(response.json::<Value>()["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_clear_chat_keeps_stats_and_topics() {
    let app = create_test_app();
    app.generator.reply("Answer.");
    app.server
        .post("/api/chat")
        .json(&json!({"message": "define velocity"}))
        .await
        .assert_status_ok();

    let stats_before = stats(&app).await;
    let topics_before: Value = app.server.get("/api/topics").await.json();

    let response = app.server.post("/api/chat/clear").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["success"], true);

    let history: Value = app.server.get("/api/chat/history").await.json();
    assert!(history["messages"].as_array().unwrap().is_empty());
    assert_eq!(stats(&app).await, stats_before);
    assert_eq!(app.server.get("/api/topics").await.json::<Value>(), topics_before);
}

#[tokio::test]
async fn test_topics_listing_is_capped() {
    let app = create_test_app();
    app.generator.reply("Answer.");
    app.server
        .post("/api/chat")
        .json(&json!({"message": "alpha bravo charlie delta echo foxtrot golf hotel india juliet"}))
        .await
        .assert_status_ok();

    let topics: Value = app.server.get("/api/topics").await.json();
    let topics = topics["topics"].as_array().unwrap();
    assert_eq!(topics.len(), 8);
    assert_eq!(topics[0], "juliet");
    assert_eq!(stats(&app).await["topicsExplored"], 10);
}

#[tokio::test]
async fn test_quiz_generation_returns_model_items_unmodified() {
    let app = create_test_app();
    let reply = quiz_reply(5);
    app.generator.reply(&reply);

    let response = app
        .server
        .post("/api/quiz/generate")
        .json(&json!({"topic": "algebra", "numQuestions": 5}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["questions"], serde_json::from_str::<Value>(&reply).unwrap());
    assert_eq!(stats(&app).await["quizzesTaken"], 1);

    let prompts = app.generator.prompts();
    assert!(prompts[0].contains("Generate exactly 5 multiple-choice questions about \"algebra\""));
    assert!(prompts[0].contains("No documents uploaded yet."));
}

#[tokio::test]
async fn test_quiz_malformed_reply_falls_back_to_empty_list() {
    let app = create_test_app();
    app.generator.reply("Sorry, I can't produce a quiz right now.");

    let response = app
        .server
        .post("/api/quiz/generate")
        .json(&json!({"topic": "algebra", "numQuestions": 5}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["questions"], json!([]));
    assert_eq!(body["error"], "Failed to generate quiz");
    assert_eq!(stats(&app).await["quizzesTaken"], 0);
}

#[tokio::test]
async fn test_quiz_upstream_failure_falls_back_to_empty_list() {
    let app = create_test_app();
    app.generator.fail(LLMError::Timeout {
        provider: "Scripted",
        timeout_secs: 30,
    });

    let response = app.server.post("/api/quiz/generate").json(&json!({"topic": "algebra"})).await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["questions"], json!([]));
    assert_eq!(stats(&app).await["quizzesTaken"], 0);
}

#[tokio::test]
async fn test_quiz_defaults_and_clamps_question_count() {
    let app = create_test_app();
    app.generator.reply(&quiz_reply(5)).reply(&quiz_reply(20));

    app.server
        .post("/api/quiz/generate")
        .json(&json!({"topic": "geometry"}))
        .await
        .assert_status_ok();
    app.server
        .post("/api/quiz/generate")
        .json(&json!({"topic": "geometry", "numQuestions": 500}))
        .await
        .assert_status_ok();

    let prompts = app.generator.prompts();
    assert!(prompts[0].contains("Generate exactly 5 multiple-choice"));
    assert!(prompts[1].contains("Generate exactly 20 multiple-choice"));
    assert_eq!(stats(&app).await["quizzesTaken"], 2);
}

#[tokio::test]
async fn test_quiz_requires_topic() {
    let app = create_test_app();

    let response = app.server.post("/api/quiz/generate").json(&json!({"numQuestions": 5})).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "No topic provided");
    assert!(app.generator.prompts().is_empty());
}

#[tokio::test]
async fn test_quiz_prompt_lists_uploaded_documents() {
    let app = create_test_app();
    upload(&app, "algebra-notes.md", &[b'a'; 20_000]).await;
    app.generator.reply(&quiz_reply(3));

    app.server
        .post("/api/quiz/generate")
        .json(&json!({"topic": "linear equations", "numQuestions": 3}))
        .await
        .assert_status_ok();

    let prompts = app.generator.prompts();
    assert!(prompts[0].contains("- algebra-notes.md (3 chunks)"));
    assert!(prompts[0].contains("Generate content specifically about: \"linear equations\""));
}

#[tokio::test]
async fn test_flashcards_count_every_returned_card() {
    let app = create_test_app();
    app.generator.reply(&flashcard_reply(8)).reply(&flashcard_reply(3));

    let response = app
        .server
        .post("/api/flashcards/generate")
        .json(&json!({"topic": "photosynthesis"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["flashcards"].as_array().unwrap().len(), 8);
    assert_eq!(body["flashcards"][0], json!({"front": "Term 0", "back": "Definition 0"}));
    assert_eq!(stats(&app).await["flashcardsStudied"], 8);

    app.server
        .post("/api/flashcards/generate")
        .json(&json!({"topic": "photosynthesis"}))
        .await
        .assert_status_ok();
    assert_eq!(stats(&app).await["flashcardsStudied"], 11);

    assert!(app.generator.prompts()[0].contains("Create 8 flashcards about \"photosynthesis\""));
}

#[tokio::test]
async fn test_flashcards_failure_returns_empty_deck() {
    let app = create_test_app();
    app.generator.reply(r#"[{"front": "", "back": "missing front"}]"#);

    let response = app
        .server
        .post("/api/flashcards/generate")
        .json(&json!({"topic": "photosynthesis"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["flashcards"], json!([]));
    assert_eq!(stats(&app).await["flashcardsStudied"], 0);
}

#[tokio::test]
async fn test_highlight_ask_does_not_touch_transcript() {
    let app = create_test_app();
    upload(&app, "physics.pdf", b"forces").await;
    app.generator.reply("It means the net force is zero.");

    let response = app
        .server
        .post("/api/chat/highlight")
        .json(&json!({
            "selectedText": "An object in equilibrium experiences balanced forces.",
            "question": "What does balanced mean here?"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["reply"], "It means the net force is zero.");
    assert_eq!(body["sources"], json!(["physics.pdf"]));

    assert_eq!(stats(&app).await["questionsAsked"], 1);
    let history: Value = app.server.get("/api/chat/history").await.json();
    assert!(history["messages"].as_array().unwrap().is_empty());

    let prompt = &app.generator.prompts()[0];
    assert!(prompt.contains("\"An object in equilibrium experiences balanced forces.\""));
    assert!(prompt.contains("physics.pdf"));
}

#[tokio::test]
async fn test_highlight_ask_requires_both_fields() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/chat/highlight")
        .json(&json!({"selectedText": "Newton's third law"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "Missing selectedText or question");
    assert_eq!(stats(&app).await["questionsAsked"], 0);
}

#[tokio::test]
async fn test_highlight_upstream_failure_surfaces_bad_gateway() {
    let app = create_test_app();
    app.generator.fail(LLMError::EmptyResponse { provider: "Scripted" });

    let response = app
        .server
        .post("/api/chat/highlight")
        .json(&json!({"selectedText": "entropy", "question": "why?"}))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(stats(&app).await["questionsAsked"], 0);
}

#[tokio::test]
async fn test_stats_reads_are_idempotent() {
    let app = create_test_app();
    upload(&app, "a.txt", b"a").await;

    let first = stats(&app).await;
    let second = stats(&app).await;
    assert_eq!(first, second);
    assert_eq!(
        first,
        json!({
            "questionsAsked": 0,
            "documentsUploaded": 1,
            "topicsExplored": 0,
            "quizzesTaken": 0,
            "flashcardsStudied": 0,
            "voiceQueries": 0
        })
    );
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let uploads = tempfile::tempdir().unwrap();
    let storage = StorageConfig {
        upload_dir: uploads.path().to_path_buf(),
        max_upload_bytes: 1024,
    };
    let state = AppState::new(
        LLMService::with_generator(Arc::new(ScriptedGenerator::default())),
        &storage,
        GenerationConfig::default(),
    );
    let origins = vec!["http://localhost:3000".to_string()];
    let router = create_router(state).layer(cors_layer(Some(&origins)));
    let server = TestServer::new(router).unwrap();

    let response = server
        .get("/api/health")
        .add_header(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("http://localhost:3000"),
        )
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header("access-control-allow-origin"),
        HeaderValue::from_static("http://localhost:3000")
    );
}
