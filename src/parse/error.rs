use std::fmt;

/// Errors produced when parsing expression or rule source text.
///
/// Carries the failure message and the character offset where parsing
/// stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
    offset: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Character offset into the parsed text.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Render `input` with `[message]` spliced in at the failure offset.
    ///
    /// `input` must be the text the offset refers to; for expressions that is
    /// the input with line breaks removed, see
    /// [`ExpressionParser::format_error`](super::ExpressionParser::format_error).
    #[must_use]
    pub fn format_in(&self, input: &str) -> String {
        let split = input
            .char_indices()
            .nth(self.offset)
            .map_or(input.len(), |(byte, _)| byte);
        let mut out = String::with_capacity(input.len() + self.message.len() + 2);
        out.push_str(&input[..split]);
        out.push('[');
        out.push_str(&self.message);
        out.push(']');
        out.push_str(&input[split..]);
        out
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at offset {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ParseError {}
