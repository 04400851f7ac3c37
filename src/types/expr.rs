use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use super::hash_string::HashString;

/// Active for-each placeholders, name to current value. Iterated in key order
/// when substituting.
pub type ForEachMap = BTreeMap<String, String>;

/// Leaf operators of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Matches,
    NotMatches,
    Assign,
    Append,
}

impl CompareOp {
    pub const ALL: [CompareOp; 10] = [
        CompareOp::Eq,
        CompareOp::Neq,
        CompareOp::Lt,
        CompareOp::Lte,
        CompareOp::Gt,
        CompareOp::Gte,
        CompareOp::Matches,
        CompareOp::NotMatches,
        CompareOp::Assign,
        CompareOp::Append,
    ];

    /// The surface syntax of the operator.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Matches => "=~",
            CompareOp::NotMatches => "!~",
            CompareOp::Assign => "=",
            CompareOp::Append => "+=",
        }
    }

    /// The node name used by [`Expr::debug_string`].
    #[must_use]
    pub fn kind_name(self) -> &'static str {
        match self {
            CompareOp::Eq => "Equals",
            CompareOp::Neq => "NotEquals",
            CompareOp::Lt => "LessThan",
            CompareOp::Lte => "LessThanOrEqual",
            CompareOp::Gt => "GreaterThan",
            CompareOp::Gte => "GreaterThanOrEqual",
            CompareOp::Matches => "Matches",
            CompareOp::NotMatches => "NotMatches",
            CompareOp::Assign => "Assign",
            CompareOp::Append => "Append",
        }
    }

    #[must_use]
    pub fn is_assignment(self) -> bool {
        matches!(self, CompareOp::Assign | CompareOp::Append)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte
        )
    }

    #[must_use]
    pub fn is_pattern(self) -> bool {
        matches!(self, CompareOp::Matches | CompareOp::NotMatches)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A leaf node: `lhs op rhs`.
///
/// Pattern operators with a literal right-hand side compile their regex once
/// at construction.
#[derive(Clone)]
pub struct Comparison {
    pub(crate) op: CompareOp,
    pub(crate) lhs: HashString,
    pub(crate) rhs: HashString,
    pub(crate) pattern: Option<Regex>,
}

impl Comparison {
    #[must_use]
    pub fn new(op: CompareOp, lhs: impl Into<HashString>, rhs: impl Into<HashString>) -> Self {
        let rhs = rhs.into();
        let pattern = if op.is_pattern() && !rhs.starts_with("@") {
            crate::evaluate::anchored_regex(rhs.as_str())
        } else {
            None
        };
        Self {
            op,
            lhs: lhs.into(),
            rhs,
            pattern,
        }
    }

    #[must_use]
    pub fn op(&self) -> CompareOp {
        self.op
    }

    #[must_use]
    pub fn lhs(&self) -> &HashString {
        &self.lhs
    }

    #[must_use]
    pub fn rhs(&self) -> &HashString {
        &self.rhs
    }
}

impl PartialEq for Comparison {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.lhs == other.lhs && self.rhs == other.rhs
    }
}

impl fmt::Debug for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparison")
            .field("op", &self.op)
            .field("lhs", &self.lhs)
            .field("rhs", &self.rhs)
            .finish()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.lhs, self.op, self.rhs)
    }
}

/// A parsed expression tree.
///
/// `And`/`Or` own exactly two children. Trees are built by the parser or by
/// the [`field()`] helpers and are never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Comparison),
}

impl Expr {
    #[must_use]
    pub fn compare(op: CompareOp, lhs: impl Into<HashString>, rhs: impl Into<HashString>) -> Expr {
        Expr::Compare(Comparison::new(op, lhs, rhs))
    }

    #[must_use]
    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    /// Whether the tree can be evaluated as a condition: no assignment leaves.
    #[must_use]
    pub fn is_evaluable(&self) -> bool {
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => a.is_evaluable() && b.is_evaluable(),
            Expr::Compare(c) => !c.op.is_assignment(),
        }
    }

    /// Whether the tree can perform assignments: only assignment leaves joined
    /// by `And`.
    #[must_use]
    pub fn is_assignment(&self) -> bool {
        match self {
            Expr::And(a, b) => a.is_assignment() && b.is_assignment(),
            Expr::Or(_, _) => false,
            Expr::Compare(c) => c.op.is_assignment(),
        }
    }

    /// Multi-line structural dump, one node per line, children indented by one
    /// space. Empty operands print as `empty`.
    #[must_use]
    pub fn debug_string(&self) -> String {
        let mut out = String::new();
        self.write_debug(0, &mut out);
        out
    }

    fn write_debug(&self, indent: usize, out: &mut String) {
        out.extend(std::iter::repeat(' ').take(indent));
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => {
                out.push_str(if matches!(self, Expr::And(..)) { "And\n" } else { "Or\n" });
                a.write_debug(indent + 1, out);
                b.write_debug(indent + 1, out);
            }
            Expr::Compare(c) => {
                out.push_str(debug_argument(&c.lhs));
                out.push(' ');
                out.push_str(c.op.kind_name());
                out.push(' ');
                out.push_str(debug_argument(&c.rhs));
                out.push('\n');
            }
        }
    }

    /// Visit every leaf, left to right.
    pub fn for_each_leaf<'a>(&'a self, f: &mut impl FnMut(&'a Comparison)) {
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.for_each_leaf(f);
                b.for_each_leaf(f);
            }
            Expr::Compare(c) => f(c),
        }
    }
}

fn debug_argument(arg: &HashString) -> &str {
    if arg.is_empty() {
        "empty"
    } else {
        arg.as_str()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::And(a, b) => {
                write_child(f, a, |e| matches!(e, Expr::Or(..)))?;
                f.write_str(" and ")?;
                write_child(f, b, |e| matches!(e, Expr::Or(..)))
            }
            Expr::Or(a, b) => {
                write_child(f, a, |e| matches!(e, Expr::And(..)))?;
                f.write_str(" or ")?;
                write_child(f, b, |e| matches!(e, Expr::And(..)))
            }
            Expr::Compare(c) => write!(f, "{c}"),
        }
    }
}

fn write_child(f: &mut fmt::Formatter<'_>, child: &Expr, parens: impl Fn(&Expr) -> bool) -> fmt::Result {
    if parens(child) {
        write!(f, "({child})")
    } else {
        write!(f, "{child}")
    }
}

/// Intermediate builder for leaf expressions. Created by [`field()`].
#[derive(Debug, Clone)]
pub struct FieldExpr {
    name: String,
}

impl FieldExpr {
    fn build(self, op: CompareOp, rhs: &str) -> Expr {
        Expr::compare(op, self.name, rhs)
    }

    #[must_use]
    pub fn eq(self, rhs: &str) -> Expr {
        self.build(CompareOp::Eq, rhs)
    }

    #[must_use]
    pub fn neq(self, rhs: &str) -> Expr {
        self.build(CompareOp::Neq, rhs)
    }

    #[must_use]
    pub fn lt(self, rhs: &str) -> Expr {
        self.build(CompareOp::Lt, rhs)
    }

    #[must_use]
    pub fn lte(self, rhs: &str) -> Expr {
        self.build(CompareOp::Lte, rhs)
    }

    #[must_use]
    pub fn gt(self, rhs: &str) -> Expr {
        self.build(CompareOp::Gt, rhs)
    }

    #[must_use]
    pub fn gte(self, rhs: &str) -> Expr {
        self.build(CompareOp::Gte, rhs)
    }

    #[must_use]
    pub fn matches(self, pattern: &str) -> Expr {
        self.build(CompareOp::Matches, pattern)
    }

    #[must_use]
    pub fn not_matches(self, pattern: &str) -> Expr {
        self.build(CompareOp::NotMatches, pattern)
    }

    #[must_use]
    pub fn assign(self, rhs: &str) -> Expr {
        self.build(CompareOp::Assign, rhs)
    }

    #[must_use]
    pub fn append(self, rhs: &str) -> Expr {
        self.build(CompareOp::Append, rhs)
    }
}

#[must_use]
pub fn field(name: &str) -> FieldExpr {
    FieldExpr {
        name: name.to_owned(),
    }
}
