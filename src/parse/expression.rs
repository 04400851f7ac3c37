use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;
use winnow::combinator::{alt, not, opt, peek, repeat, terminated};
use winnow::error::{ErrMode, ModalResult, ParserError};
use winnow::prelude::*;
use winnow::stream::Offset;
use winnow::token::{any, take_while};

use crate::{CompareOp, Expr};

use super::error::ParseError;

/// Builds a leaf expression from the trimmed left- and right-hand side text.
pub type OperatorFactory = Arc<dyn Fn(String, String) -> Expr + Send + Sync>;

const AND_KEYWORD: &str = " and ";
const OR_KEYWORD: &str = " or ";

/// Parser for one-line expressions such as `cs=~AUA.* and (rwy==16 or rwy==34)`.
///
/// Grammar:
///
/// ```text
/// expr       := primary ((" and " | " or ") expr)?
/// primary    := "(" expr ")" | comparison
/// comparison := text operator text
/// ```
///
/// `and` and `or` cannot be mixed at one level without parentheses. The
/// connective keywords need exactly one space on each side. Operators are
/// matched against a table ordered by length (longest first) and then
/// lexically, so `==` wins over `=` and `<=` over `<`.
///
/// An operand ends at the first `)`, so operand text cannot contain one.
/// Anything left after a complete expression, an unmatched `)` included, is
/// an `incomplete parse`.
#[derive(Clone)]
pub struct ExpressionParser {
    operators: Vec<(String, OperatorFactory)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    Any,
    And,
    Or,
}

impl Default for ExpressionParser {
    fn default() -> Self {
        let mut parser = Self {
            operators: Vec::new(),
        };
        for op in CompareOp::ALL {
            parser.register_operator(op.symbol(), move |lhs, rhs| Expr::compare(op, lhs, rhs));
        }
        parser
    }
}

impl fmt::Debug for ExpressionParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionParser")
            .field("operators", &self.operators().collect::<Vec<_>>())
            .finish()
    }
}

impl ExpressionParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide parser with the default operator table.
    #[must_use]
    pub fn shared() -> Arc<ExpressionParser> {
        static SHARED: OnceLock<Arc<ExpressionParser>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(ExpressionParser::default())))
    }

    /// Register (or replace) an operator. The table stays ordered by length,
    /// longest first, then lexically.
    pub fn register_operator(
        &mut self,
        symbol: &str,
        factory: impl Fn(String, String) -> Expr + Send + Sync + 'static,
    ) {
        let factory: OperatorFactory = Arc::new(factory);
        match self.operators.iter_mut().find(|(s, _)| s == symbol) {
            Some(entry) => entry.1 = factory,
            None => self.operators.push((symbol.to_owned(), factory)),
        }
        self.operators
            .sort_by(|(a, _), (b, _)| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
    }

    /// Registered operator symbols in match priority order.
    pub fn operators(&self) -> impl Iterator<Item = &str> {
        self.operators.iter().map(|(s, _)| s.as_str())
    }

    /// Remove line breaks. Error offsets refer to the preprocessed text.
    #[must_use]
    pub fn preprocess(input: &str) -> String {
        input.chars().filter(|c| *c != '\n' && *c != '\r').collect()
    }

    /// Render the preprocessed input with the error message spliced in.
    #[must_use]
    pub fn format_error(input: &str, error: &ParseError) -> String {
        error.format_in(&Self::preprocess(input))
    }

    /// Parse an expression.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] with the failure message and character offset.
    pub fn parse(&self, input: &str) -> Result<Expr, ParseError> {
        self.parse_with_space(input, None)
    }

    /// Parse an expression, turning every occurrence of `space` in an operand
    /// back into a literal space.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] with the failure message and character offset.
    pub fn parse_with_space(&self, input: &str, space: Option<&str>) -> Result<Expr, ParseError> {
        let source = Self::preprocess(input);
        let grammar = Grammar {
            parser: self,
            source: &source,
            space: space.filter(|s| !s.is_empty()),
        };
        let mut rest = source.as_str();
        let result = grammar
            .expr(&mut rest, Connective::Any)
            .and_then(|expr| {
                if rest.is_empty() {
                    Ok(expr)
                } else {
                    Err(grammar.error("incomplete parse", rest))
                }
            })
            .map_err(|e| grammar.parse_error(e));
        if let Err(e) = &result {
            debug!(input, error = %e, "expression parse failed");
        }
        result
    }

    fn expected_message(&self) -> String {
        let mut message = String::from("expected");
        for symbol in self.operators() {
            message.push(' ');
            message.push_str(symbol);
        }
        message
    }
}

// -- Grammar ------------------------------------------------------------------

/// Failure message and the number of input bytes left where it happened.
#[derive(Debug)]
struct Failure {
    message: String,
    remaining: usize,
}

impl<'s> ParserError<&'s str> for Failure {
    type Inner = Self;

    fn from_input(input: &&'s str) -> Self {
        Failure {
            message: String::from("unexpected input"),
            remaining: input.len(),
        }
    }

    fn into_inner(self) -> Result<Self::Inner, Self> {
        Ok(self)
    }
}

type PResult<O> = ModalResult<O, Failure>;

fn spaces<'s>(input: &mut &'s str) -> PResult<&'s str> {
    take_while(0.., ' ').parse_next(input)
}

/// Spaces beyond the one that starts a following keyword.
fn extra_spaces(input: &mut &str) -> PResult<()> {
    repeat(0.., terminated(' ', peek(' '))).parse_next(input)
}

fn open(input: &mut &str) -> PResult<Option<char>> {
    opt('(').parse_next(input)
}

fn close(input: &mut &str) -> PResult<Option<char>> {
    opt(')').parse_next(input)
}

fn keyword(input: &mut &str) -> PResult<Connective> {
    alt((
        AND_KEYWORD.value(Connective::And),
        OR_KEYWORD.value(Connective::Or),
    ))
    .parse_next(input)
}

fn boundary<'s>(input: &mut &'s str) -> PResult<&'s str> {
    alt((")", AND_KEYWORD, OR_KEYWORD)).parse_next(input)
}

/// Operand text up to the next `)`, connective keyword or the end of input.
fn operand<'s>(input: &mut &'s str) -> PResult<&'s str> {
    repeat(0.., (not(boundary), any))
        .map(|()| ())
        .take()
        .parse_next(input)
}

fn symbol<'s>(text: &str, input: &mut &'s str) -> PResult<Option<&'s str>> {
    opt(text).parse_next(input)
}

struct Grammar<'a, 's> {
    parser: &'a ExpressionParser,
    source: &'s str,
    space: Option<&'a str>,
}

impl<'a, 's> Grammar<'a, 's> {
    /// A failure at `at`, which must be a slice of the source.
    fn error(&self, message: impl Into<String>, at: &'s str) -> ErrMode<Failure> {
        let offset = at.offset_from(&self.source);
        ErrMode::Cut(Failure {
            message: message.into(),
            remaining: self.source.len() - offset,
        })
    }

    fn parse_error(&self, error: ErrMode<Failure>) -> ParseError {
        let failure = match error {
            ErrMode::Backtrack(f) | ErrMode::Cut(f) => f,
            ErrMode::Incomplete(_) => Failure {
                message: String::from("incomplete parse"),
                remaining: 0,
            },
        };
        let consumed = self.source.len().saturating_sub(failure.remaining);
        let offset = self
            .source
            .get(..consumed)
            .map_or(consumed, |text| text.chars().count());
        ParseError::new(failure.message, offset)
    }

    /// `expr := primary (keyword expr)?` where a chain keeps its first keyword.
    fn expr(&self, input: &mut &'s str, kind: Connective) -> PResult<Expr> {
        spaces.parse_next(input)?;
        if open.parse_next(input)?.is_some() {
            let inner = self.expr(input, Connective::Any)?;
            if close.parse_next(input)?.is_none() {
                return Err(self.missing_close(*input));
            }
            if !input.is_empty() && !input.starts_with(')') {
                extra_spaces.parse_next(input)?;
            }
            let next = self.connective(input, kind)?;
            return self.chain(input, inner, next);
        }
        let text = operand.parse_next(input)?;
        let next = self.connective(input, kind)?;
        let lhs = self.comparison(text)?;
        self.chain(input, lhs, next)
    }

    /// At the end of input the failure points at the last character.
    fn missing_close(&self, input: &'s str) -> ErrMode<Failure> {
        let at = match self.source.char_indices().next_back() {
            Some((last, _)) if input.is_empty() => &self.source[last..],
            _ => input,
        };
        self.error("expected )", at)
    }

    /// The keyword after a primary, or `None` before `)` and at the end.
    fn connective(&self, input: &mut &'s str, kind: Connective) -> PResult<Option<Connective>> {
        let at = *input;
        if at.is_empty() || at.starts_with(')') {
            return Ok(None);
        }
        match opt(keyword).parse_next(input)? {
            Some(Connective::And) if kind == Connective::Or => Err(self.error("expected or", at)),
            Some(Connective::Or) if kind == Connective::And => Err(self.error("expected and", at)),
            Some(next) => Ok(Some(next)),
            None => Err(self.error("expected and or or", at)),
        }
    }

    fn chain(&self, input: &mut &'s str, lhs: Expr, next: Option<Connective>) -> PResult<Expr> {
        match next {
            None => Ok(lhs),
            Some(Connective::Or) => Ok(lhs.or(self.expr(input, Connective::Or)?)),
            Some(_) => Ok(lhs.and(self.expr(input, Connective::And)?)),
        }
    }

    /// `comparison := text operator text`, split at the leftmost operator.
    fn comparison(&self, text: &'s str) -> PResult<Expr> {
        let mut rest = text;
        let lhs = repeat(0.., (not(|i: &mut &'s str| self.operator(i)), any))
            .map(|()| ())
            .take()
            .parse_next(&mut rest)?;
        let at = rest;
        let Some(factory) = opt(|i: &mut &'s str| self.operator(i)).parse_next(&mut rest)? else {
            return Err(self.error(self.parser.expected_message(), text));
        };
        let lhs = simplify(lhs);
        if lhs.is_empty() {
            return Err(self.error("expected lhs", at));
        }
        let rhs = rest.trim();
        let (lhs, rhs) = match self.space {
            Some(space) => (lhs.replace(space, " "), rhs.replace(space, " ")),
            None => (lhs, rhs.to_owned()),
        };
        Ok(factory(lhs, rhs))
    }

    /// The first operator in table order that starts the input.
    fn operator(&self, input: &mut &'s str) -> PResult<&'a OperatorFactory> {
        for (text, factory) in &self.parser.operators {
            if symbol(text, input)?.is_some() {
                return Ok(factory);
            }
        }
        Err(ErrMode::Backtrack(<Failure as ParserError<&'s str>>::from_input(input)))
    }
}

/// Trim and collapse internal whitespace runs to one space.
fn simplify(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
