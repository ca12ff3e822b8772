use uuid::Uuid;

/// Generate a trace ID (32 hex characters).
pub fn generate_trace_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Generate a span ID (16 hex characters).
pub fn generate_span_id() -> String {
    Uuid::new_v4().as_simple().to_string()[..16].to_string()
}

/// Create a named span for a batch operation, returning the span and its
/// trace ID so per-unit spans can join the same trace.
pub fn create_operation_span(operation: &str) -> (tracing::Span, String) {
    let trace_id = generate_trace_id();
    let span_id = generate_span_id();
    let span = tracing::info_span!(
        "operation",
        trace_id = %trace_id,
        span_id = %span_id,
        operation = %operation,
    );
    (span, trace_id)
}

/// Create a child span under an existing trace ID, tagged with the unit it
/// covers (a URL, a file path).
pub fn create_child_span(trace_id: &str, operation: &str, unit: &str) -> tracing::Span {
    let span_id = generate_span_id();
    tracing::info_span!(
        "unit",
        trace_id = %trace_id,
        span_id = %span_id,
        operation = %operation,
        unit = %unit,
    )
}
