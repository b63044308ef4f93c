//! Compile errors and the diagnostics channel.

use annotate_snippets::{AnnotationKind, Level, Renderer, Snippet};
use serde::Serialize;
use thiserror::Error;

use crate::tree::Span;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const E_PARSE: &str = "E-PARSE";
pub const E_UNSUPPORTED_SHAPE: &str = "E-UNSUPPORTED-SHAPE";
pub const E_UNTERMINATED_PLACEHOLDER: &str = "E-MSG-UNTERMINATED-PLACEHOLDER";
pub const E_EMPTY_PLACEHOLDER: &str = "E-MSG-EMPTY-PLACEHOLDER";
pub const E_INVALID_PLACEHOLDER: &str = "E-MSG-INVALID-PLACEHOLDER";
pub const E_UNTERMINATED_LITERAL: &str = "E-MSG-UNTERMINATED-LITERAL";
pub const E_EMPTY_LINKED_KEY: &str = "E-MSG-EMPTY-LINKED-KEY";
pub const E_HTML_IN_MESSAGE: &str = "E-MSG-HTML";

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{filename}:{}: {message}", location(.span))]
    Parse {
        filename: String,
        message: String,
        span: Option<Span>,
    },

    #[error("{filename}:{}: {message}", message_location(.context))]
    Message {
        filename: String,
        message: String,
        context: ErrorContext,
    },

    #[error("{filename}:{}: {message}", location(.span))]
    UnsupportedShape {
        filename: String,
        message: String,
        span: Option<Span>,
    },

    #[error("{filename}: failed to read `{path}`: {source}")]
    Io {
        filename: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{filename}: failed to re-serialize filtered resource: {message}")]
    Serialize { filename: String, message: String },

    #[error("{filename}: invalid source map: {message}")]
    SourceMap { filename: String, message: String },
}

fn message_location(context: &ErrorContext) -> String {
    format!("{} (at `{}`)", location(&context.span), context.path)
}

fn location(span: &Option<Span>) -> String {
    match span {
        Some(span) => format!("{}:{}", span.start.line, span.start.column + 1),
        None => "0:0".to_string(),
    }
}

/// Everything the error callback learns about a rejected message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// The offending literal, exactly as handed to the message compiler.
    pub literal: String,
    pub path: String,
    pub code: &'static str,
    pub span: Option<Span>,
}

impl CompileError {
    pub fn parse(filename: &str, message: impl Into<String>, span: Option<Span>) -> Self {
        CompileError::Parse {
            filename: filename.to_string(),
            message: message.into(),
            span,
        }
    }

    pub fn unsupported_shape(filename: &str, message: impl Into<String>, span: Option<Span>) -> Self {
        CompileError::UnsupportedShape {
            filename: filename.to_string(),
            message: message.into(),
            span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Parse { .. } => E_PARSE,
            CompileError::Message { context, .. } => context.code,
            CompileError::UnsupportedShape { .. } => E_UNSUPPORTED_SHAPE,
            CompileError::Io { .. } => "E-IO",
            CompileError::Serialize { .. } => "E-SERIALIZE",
            CompileError::SourceMap { .. } => "E-SOURCE-MAP",
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            CompileError::Parse { filename, .. }
            | CompileError::Message { filename, .. }
            | CompileError::UnsupportedShape { filename, .. }
            | CompileError::Io { filename, .. }
            | CompileError::Serialize { filename, .. }
            | CompileError::SourceMap { filename, .. } => filename,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Parse { span, .. } | CompileError::UnsupportedShape { span, .. } => *span,
            CompileError::Message { context, .. } => context.span,
            _ => None,
        }
    }

    /// Renders the error with a caret excerpt of `source` when a span is known.
    pub fn render(&self, source: &str) -> String {
        let title = self.to_string();
        let Some(span) = self.span() else {
            return title;
        };
        let start = span.start.offset.min(source.len());
        let end = span.end.offset.min(source.len()).max(start);
        let label = match self {
            CompileError::Message { message, .. }
            | CompileError::Parse { message, .. }
            | CompileError::UnsupportedShape { message, .. } => message.as_str(),
            _ => "",
        };
        let snippet = Snippet::source(source)
            .line_start(1)
            .path(self.filename())
            .annotation(AnnotationKind::Primary.span(start..end).label(label));
        let groups = vec![Level::ERROR.primary_title(title.as_str()).element(snippet)];
        Renderer::plain().render(&groups).to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS CHANNEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Receives non-fatal notices and decides the error a fatal one raises.
pub trait Diagnostics: Sync {
    fn warn(&self, message: &str);

    /// Called once per rejected message. The returned error aborts the compile.
    fn error(&self, filename: &str, message: &str, context: ErrorContext) -> CompileError {
        CompileError::Message {
            filename: filename.to_string(),
            message: message.to_string(),
            context,
        }
    }
}

/// Default channel: warnings go to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, filename: &str, message: &str, context: ErrorContext) -> CompileError {
        tracing::debug!(filename, code = context.code, path = %context.path, "message rejected");
        CompileError::Message {
            filename: filename.to_string(),
            message: message.to_string(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::LineIndex;

    #[test]
    fn test_display_carries_filename_and_position() {
        let source = "{\n  \"a\": 1,,\n}";
        let index = LineIndex::new(source);
        let err = CompileError::parse("en.json", "unexpected `,`", Some(index.span(11, 12)));
        assert_eq!(err.to_string(), "en.json:2:10: unexpected `,`");
        assert_eq!(err.code(), E_PARSE);
    }

    #[test]
    fn test_render_points_at_span() {
        let source = "{\n  \"a\": 1,,\n}";
        let index = LineIndex::new(source);
        let err = CompileError::parse("en.json", "unexpected `,`", Some(index.span(11, 12)));
        let rendered = err.render(source);
        assert!(rendered.contains("en.json"));
        assert!(rendered.contains("\"a\": 1,,"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn test_render_without_span_is_title() {
        let err = CompileError::unsupported_shape("m.js", "no default export", None);
        assert_eq!(err.render("const a = 1"), err.to_string());
    }
}
