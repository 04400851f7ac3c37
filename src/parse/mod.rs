mod error;
mod expression;
mod grammar;
mod parser;

pub use error::ParseError;
pub use expression::{ExpressionParser, OperatorFactory};
pub use parser::{ParsedConfig, ParsedForEach, ParsedRule, ParsedText};

use crate::Expr;

/// Parse a single expression with the shared default parser.
///
/// # Errors
///
/// Returns [`ParseError`] if the text is not a valid expression.
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    ExpressionParser::shared().parse(input)
}

/// Parse rule source text into a [`ParsedConfig`].
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not valid rule source. The offset
/// counts characters from the start of `input`.
pub fn parse_rules(input: &str) -> Result<ParsedConfig, ParseError> {
    use winnow::Parser;
    grammar::parse_config.parse(input).map_err(|e| {
        let offset = input
            .get(..e.offset())
            .map_or(e.offset(), |consumed| consumed.chars().count());
        let message = e.inner().to_string();
        let message = if message.is_empty() {
            "invalid rule source".to_owned()
        } else {
            message.replace('\n', "; ")
        };
        ParseError::new(message, offset)
    })
}
