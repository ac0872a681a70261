//! Structured logging macros shared by the study core.
//!
//! Each macro fixes the field names for one kind of event (service calls,
//! storage, generation, quiz transitions, system events, validation) so
//! log queries can rely on them. The macros expand to `tracing` calls.

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

/// Log service operation start with context
#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, item_id = $item_id:expr) => {
        tracing::debug!(
            service = $service,
            operation = $operation,
            item_id = %$item_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr, segment_count = $count:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            segment_count = $count,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr) => {
        tracing::debug!(
            service = $service,
            operation = $operation,
            "Service operation started"
        );
    };
}

/// Log service operation success
#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, item_id = $item_id:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            item_id = %$item_id,
            "Service operation completed: {}", $msg
        );
    };
    ($service:expr, $operation:expr, duration_ms = $duration:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            duration_ms = $duration,
            "Service operation completed: {}", $msg
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation completed: {}", $msg
        );
    };
}

/// Log service operation errors
#[macro_export]
macro_rules! log_service_error {
    ($service:expr, $operation:expr, item_id = $item_id:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            item_id = %$item_id,
            error = %$error,
            "Service operation failed"
        );
    };
    ($service:expr, $operation:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            error = %$error,
            "Service operation failed"
        );
    };
}

/// Log service warnings
#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(
            service = $service,
            operation = $operation,
            "Service warning: {}",
            $msg
        );
    };
}

// ============================================================================
// Storage Operation Logging Macros
// ============================================================================

/// Log key-value store reads and writes
#[macro_export]
macro_rules! log_store_operation {
    (debug, $operation:expr, key = $key:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "storage",
            operation = $operation,
            key = %$key,
            duration_ms = $duration,
            "Storage operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "storage",
            operation = $operation,
            "Storage operation: {}", $msg
        );
    };
    (error, $operation:expr, key = $key:expr, error = $error:expr) => {
        tracing::error!(
            component = "storage",
            operation = $operation,
            key = %$key,
            error = %$error,
            "Storage operation failed"
        );
    };
}

// ============================================================================
// LLM Service Logging Macros
// ============================================================================

/// Log generation service calls with provider context
#[macro_export]
macro_rules! log_llm_operation {
    (start, $operation:expr, provider = $provider:expr, prompt_length = $length:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            prompt_length = $length,
            "LLM operation started"
        );
    };
    (success, $operation:expr, provider = $provider:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            duration_ms = $duration,
            "LLM operation completed successfully"
        );
    };
    (fallback, $operation:expr, provider = $provider:expr, error = $error:expr) => {
        tracing::warn!(
            component = "llm_service",
            operation = $operation,
            provider = %$provider,
            error = %$error,
            "LLM operation failed, using local fallback"
        );
    };
}

// ============================================================================
// Quiz Session Logging Macros
// ============================================================================

/// Log quiz state machine transitions
#[macro_export]
macro_rules! log_quiz_transition {
    ($operation:expr, from = $from:expr, to = $to:expr) => {
        tracing::debug!(
            component = "quiz_session",
            operation = $operation,
            from = %$from,
            to = %$to,
            "Quiz transition"
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
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
