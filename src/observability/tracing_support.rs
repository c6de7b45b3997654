//! Tracing spans for pipelines and elements.

use tracing::{Level, Span, span};

/// Create a span covering the lifetime of a pipeline run.
///
/// ```rust
/// use padflow::observability::span_pipeline;
///
/// let span = span_pipeline("player");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_pipeline(name: &str) -> Span {
    span!(Level::INFO, "pipeline", name = %name)
}

/// Create a span for work done on behalf of one element.
#[inline]
pub fn span_element(element: &str, factory: &str) -> Span {
    span!(
        Level::DEBUG,
        "element",
        element = %element,
        factory = %factory
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_can_be_entered_without_subscriber() {
        let pipeline = span_pipeline("p");
        let _p = pipeline.enter();
        let element = span_element("queue0", "queue");
        let _e = element.enter();
    }
}
