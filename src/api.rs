use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::{HeaderValue, Method},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::{
    config::{GenerationConfig, StorageConfig},
    documents::DocumentStore,
    errors::{ApiError, ApiErrorResponse, ErrorContext},
    llm_service::LLMService,
    models::*,
    stats::UsageStats,
    topics::{RECENT_TOPIC_LIMIT, TopicTracker},
    transcript::ChatTranscript,
    upload::write_stream,
};

// Import logging macros
use crate::{api_error, log_api_error, log_api_start, log_api_success, log_api_warn};

/// Name of the multipart part carrying the uploaded file
pub const UPLOAD_FIELD: &str = "file";

/// Room for boundaries and part headers on top of the per-file limit
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub llm_service: LLMService,
    pub documents: Arc<DocumentStore>,
    pub transcript: Arc<ChatTranscript>,
    pub topics: Arc<TopicTracker>,
    pub stats: Arc<UsageStats>,
    pub generation: GenerationConfig,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(llm_service: LLMService, storage: &StorageConfig, generation: GenerationConfig) -> Self {
        Self {
            llm_service,
            documents: Arc::new(DocumentStore::new(storage.upload_dir.clone())),
            transcript: Arc::new(ChatTranscript::new()),
            topics: Arc::new(TopicTracker::new()),
            stats: Arc::new(UsageStats::new()),
            generation,
            max_upload_bytes: storage.max_upload_bytes,
        }
    }
}

/// Value of a required text field, or a validation error when it is missing or blank
fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError(message.to_string()))
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut preview: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        preview.push_str("...");
    }
    preview
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "InnovGenius server is running!",
    })
}

// Document endpoints
pub async fn upload_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiErrorResponse> {
    log_api_start!("upload");
    let mut multipart = multipart.map_err(|e| api_error!(e, "upload", "document"))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error!(e, "upload", "document"))?
    {
        // Text parts carry no filename, even when named like the file part
        let Some(file_name) = field.file_name().filter(|_| field.name() == Some(UPLOAD_FIELD)) else {
            debug!(field = ?field.name(), "Skipping non-file multipart field");
            continue;
        };

        let original_name = if file_name.trim().is_empty() {
            "upload".to_string()
        } else {
            file_name.to_string()
        };

        state
            .documents
            .ensure_upload_dir()
            .await
            .map_err(|e| api_error!(e, "upload", "document"))?;

        let id = state.documents.next_id();
        let path = state.documents.storage_path(&id, &original_name);
        let size = write_stream(&path, field, state.max_upload_bytes)
            .await
            .map_err(|e| e.to_response_with_context(ErrorContext::new("upload", "document").with_id(&id)))?;

        let doc = state.documents.register(id, &original_name, size, path);
        state.stats.record_upload();

        log_api_success!("upload", doc_id = doc.id, format!("stored {} ({} bytes)", doc.name, doc.size));
        return Ok(Json(UploadResponse {
            success: true,
            filename: original_name,
            doc,
        }));
    }

    Err(api_error!(validation, "upload", "document", "No file received"))
}

pub async fn list_documents(State(state): State<AppState>) -> Json<Vec<Document>> {
    let documents = state.documents.list();
    debug!(document_count = documents.len(), "Listing documents");
    Json(documents)
}

/// Idempotent: unknown ids succeed without side effects
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<SuccessResponse> {
    log_api_start!("delete_document", doc_id = id);

    match state.documents.remove(&id).await {
        Some(doc) => {
            state.stats.record_removal();
            log_api_success!("delete_document", doc_id = id, format!("removed {}", doc.name));
        }
        None => {
            log_api_warn!("delete_document", doc_id = id, "unknown document, nothing to delete");
        }
    }

    Json(SuccessResponse { success: true })
}

// Chat endpoints
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiErrorResponse> {
    let Json(request) = payload.map_err(|e| api_error!(e, "chat", "message"))?;
    let message = required(&request.message, "No message provided")
        .map_err(|e| e.to_response_with_context(ErrorContext::new("chat", "message")))?;

    log_api_start!("chat");
    info!(voice = request.voice, message = %preview(message, 80), "Student asked a question");

    state.topics.record_message(message);
    let sources = state.documents.names();

    let reply = state
        .llm_service
        .answer_question(&sources, message)
        .await
        .map_err(|e| api_error!(upstream, "chat", "message", e))?;

    state.stats.record_question(request.voice);
    state.transcript.record_exchange(
        ChatMessage::user(message),
        ChatMessage::assistant(reply.clone(), sources.clone()),
    );

    log_api_success!("chat", count = sources.len(), "reply generated");
    Ok(Json(ChatResponse {
        success: true,
        reply,
        sources,
    }))
}

pub async fn clear_chat(State(state): State<AppState>) -> Json<SuccessResponse> {
    state.transcript.clear();
    log_api_success!("clear_chat", "transcript cleared");
    Json(SuccessResponse { success: true })
}

pub async fn chat_history(State(state): State<AppState>) -> Json<ChatHistoryResponse> {
    Json(ChatHistoryResponse {
        messages: state.transcript.messages(),
    })
}

/// Answers about a highlighted passage are not added to the transcript
pub async fn highlight_ask(
    State(state): State<AppState>,
    payload: Result<Json<HighlightRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiErrorResponse> {
    let Json(request) = payload.map_err(|e| api_error!(e, "highlight", "highlight"))?;
    let selected_text = required(&request.selected_text, "Missing selectedText or question")
        .map_err(|e| e.to_response_with_context(ErrorContext::new("highlight", "highlight")))?;
    let question = required(&request.question, "Missing selectedText or question")
        .map_err(|e| e.to_response_with_context(ErrorContext::new("highlight", "highlight")))?;

    log_api_start!("highlight");
    info!(
        question = %question,
        selection = %preview(selected_text, 60),
        "Highlight and ask"
    );

    let sources = state.documents.names();
    let reply = state
        .llm_service
        .answer_highlight(&sources, selected_text, question)
        .await
        .map_err(|e| api_error!(upstream, "highlight", "highlight", e))?;

    state.stats.record_question(false);

    log_api_success!("highlight", "reply generated");
    Ok(Json(ChatResponse {
        success: true,
        reply,
        sources,
    }))
}

pub async fn recent_topics(State(state): State<AppState>) -> Json<TopicsResponse> {
    Json(TopicsResponse {
        topics: state.topics.recent(RECENT_TOPIC_LIMIT),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot(state.topics.len()))
}

// Generation endpoints. Failures degrade to an empty list so the client can
// substitute its local fallback deck.
pub async fn generate_quiz(
    State(state): State<AppState>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<Json<QuizResponse>, ApiErrorResponse> {
    let Json(request) = payload.map_err(|e| api_error!(e, "generate_quiz", "quiz"))?;
    let topic = required(&request.topic, "No topic provided")
        .map_err(|e| e.to_response_with_context(ErrorContext::new("generate_quiz", "quiz")))?;

    let num_questions = state.generation.quiz_question_count(request.num_questions);
    if request.num_questions.is_some_and(|n| n != num_questions) {
        log_api_warn!(
            "generate_quiz",
            format!("numQuestions {:?} clamped to {}", request.num_questions, num_questions)
        );
    }

    log_api_start!("generate_quiz", topic = topic);
    let documents = state.documents.list();

    match state.llm_service.generate_quiz(&documents, topic, num_questions).await {
        Ok(questions) => {
            state.stats.record_quiz();
            log_api_success!("generate_quiz", count = questions.len(), "quiz generated");
            Ok(Json(QuizResponse {
                success: true,
                questions,
                error: None,
            }))
        }
        Err(e) => {
            log_api_error!("generate_quiz", topic = topic, error = e, "returning empty quiz");
            Ok(Json(QuizResponse {
                success: false,
                questions: Vec::new(),
                error: Some("Failed to generate quiz".to_string()),
            }))
        }
    }
}

pub async fn generate_flashcards(
    State(state): State<AppState>,
    payload: Result<Json<FlashcardRequest>, JsonRejection>,
) -> Result<Json<FlashcardResponse>, ApiErrorResponse> {
    let Json(request) = payload.map_err(|e| api_error!(e, "generate_flashcards", "flashcards"))?;
    let topic = required(&request.topic, "No topic provided")
        .map_err(|e| e.to_response_with_context(ErrorContext::new("generate_flashcards", "flashcards")))?;

    log_api_start!("generate_flashcards", topic = topic);
    let documents = state.documents.list();

    match state
        .llm_service
        .generate_flashcards(&documents, topic, state.generation.flashcard_count)
        .await
    {
        Ok(flashcards) => {
            state.stats.record_flashcards(flashcards.len());
            log_api_success!("generate_flashcards", count = flashcards.len(), "flashcards generated");
            Ok(Json(FlashcardResponse {
                success: true,
                flashcards,
                error: None,
            }))
        }
        Err(e) => {
            log_api_error!("generate_flashcards", topic = topic, error = e, "returning empty deck");
            Ok(Json(FlashcardResponse {
                success: false,
                flashcards: Vec::new(),
                error: Some("Failed to generate flashcards".to_string()),
            }))
        }
    }
}

/// CORS policy: any origin when `allowed_origins` is `None`, otherwise the listed ones
pub fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = allowed_origins else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

pub fn create_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES));

    Router::new()
        .route("/api/health", get(health))
        // Document routes
        .route("/api/upload", post(upload_document).layer(upload_limit))
        .route("/api/documents", get(list_documents))
        .route("/api/documents/:id", delete(delete_document))
        // Chat routes
        .route("/api/chat", post(chat))
        .route("/api/chat/clear", post(clear_chat))
        .route("/api/chat/history", get(chat_history))
        .route("/api/chat/highlight", post(highlight_ask))
        .route("/api/topics", get(recent_topics))
        .route("/api/stats", get(stats))
        // Generation routes
        .route("/api/quiz/generate", post(generate_quiz))
        .route("/api/flashcards/generate", post(generate_flashcards))
        .with_state(state)
}
