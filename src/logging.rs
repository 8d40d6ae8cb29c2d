// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros for consistent field names and message patterns across the application
///
/// These macros ensure:
/// - Consistent field naming conventions
/// - Appropriate logging levels for different scenarios
/// - Structured logging with context

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, doc_id = $doc_id:expr) => {
        tracing::debug!(
            operation = $operation,
            doc_id = %$doc_id,
            "API operation started"
        );
    };
    ($operation:expr, topic = $topic:expr) => {
        tracing::debug!(
            operation = $operation,
            topic = %$topic,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, doc_id = $doc_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            doc_id = %$doc_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API operation errors with consistent structure
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, topic = $topic:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            topic = %$topic,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, doc_id = $doc_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            doc_id = %$doc_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Store Logging Macros
// ============================================================================

/// Log in-memory store mutations
#[macro_export]
macro_rules! log_store_operation {
    (debug, $store:expr, $operation:expr, doc_id = $doc_id:expr) => {
        tracing::debug!(
            component = $store,
            operation = $operation,
            doc_id = %$doc_id,
            "Store operation completed"
        );
    };
    (debug, $store:expr, $operation:expr, count = $count:expr) => {
        tracing::debug!(
            component = $store,
            operation = $operation,
            result_count = $count,
            "Store operation completed"
        );
    };
    (warn, $store:expr, $operation:expr, error = $error:expr) => {
        tracing::warn!(
            component = $store,
            operation = $operation,
            error = %$error,
            "Store operation degraded"
        );
    };
}

// ============================================================================
// LLM Service Logging Macros
// ============================================================================

/// Log LLM service operations with provider context
#[macro_export]
macro_rules! log_llm_operation {
    (start, $operation:expr, provider = $provider:expr, prompt_length = $len:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            prompt_length = $len,
            "LLM operation started"
        );
    };
    (success, $operation:expr, provider = $provider:expr, duration_ms = $duration:expr, items = $items:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            duration_ms = $duration,
            item_count = $items,
            "LLM operation completed successfully"
        );
    };
    (error, $operation:expr, provider = $provider:expr, error = $error:expr) => {
        tracing::error!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            error = %$error,
            "LLM operation failed"
        );
    };
    (warn, $operation:expr, $msg:expr) => {
        tracing::warn!(
            component = "llm_service",
            operation = $operation,
            "LLM operation warning: {}", $msg
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
}
