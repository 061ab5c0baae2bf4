use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A scalar literal in a query expression.
///
/// Literals serialize as their bare JSON value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    /// The absent value.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    ///
    /// Metric and tag identifiers are signed, since the dry-run sentinel is
    /// negative.
    Int(i64),
    /// A floating point value.
    Float(f64),
    /// A string value.
    String(String),
    /// A point in time, rendered in the storage dialect's datetime syntax.
    DateTime(DateTime<Utc>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("NULL"),
            Literal::Bool(true) => f.write_str("true"),
            Literal::Bool(false) => f.write_str("false"),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Float(value) => write!(f, "{value}"),
            Literal::String(value) => {
                write!(f, "'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            Literal::DateTime(value) => {
                write!(f, "toDateTime('{}')", value.format("%Y-%m-%dT%H:%M:%S"))
            }
        }
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Literal {
    fn from(value: u64) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

/// A reference to a storage column by name.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Column {
    /// The name of the column, including subscripts such as `tags[123]`.
    pub column: String,
}

/// A function call over a list of argument expressions.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionCall {
    /// The name of the function in the storage dialect.
    pub function: String,
    /// The arguments to the function.
    pub arguments: Vec<Expr>,
    /// The alias under which the result is returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// An expression returned under an explicit alias.
///
/// Function calls carry their alias inline; all other expressions are wrapped
/// in this type when aliased.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AliasedExpression {
    /// The inner expression.
    pub expr: Box<Expr>,
    /// The alias under which the result is returned.
    pub alias: String,
}

/// A fixed-arity composite of expressions.
///
/// Tuples key composite lookups, such as the per-transaction threshold
/// overrides keyed by project and transaction name.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tuple {
    /// The elements of the tuple.
    pub tuple: Vec<Expr>,
}

/// An expression in a compiled storage query.
///
/// Expressions appear in the select and groupby clauses as well as on either
/// side of [`Condition`](crate::Condition)s. They serialize as
/// self-describing JSON and render as storage dialect text through
/// [`Display`](fmt::Display).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Expr {
    /// Reference to a storage column.
    Column(Column),
    /// A literal scalar value.
    Literal(Literal),
    /// A fixed-arity composite key.
    Tuple(Tuple),
    /// A variable-length array, used for `IN` lists and lookup tables.
    Array(Vec<Expr>),
    /// A function applied to a list of arguments.
    Function(FunctionCall),
    /// An aliased non-function expression.
    Aliased(AliasedExpression),
}

impl Expr {
    /// Creates a reference to a storage column.
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(Column {
            column: name.into(),
        })
    }

    /// Creates a function call without an alias.
    pub fn function(name: impl Into<String>, arguments: impl IntoIterator<Item = Expr>) -> Self {
        Self::Function(FunctionCall {
            function: name.into(),
            arguments: arguments.into_iter().collect(),
            alias: None,
        })
    }

    /// Creates a tuple of expressions.
    pub fn tuple(values: impl IntoIterator<Item = Expr>) -> Self {
        Self::Tuple(Tuple {
            tuple: values.into_iter().collect(),
        })
    }

    /// Creates an array of expressions.
    pub fn array(values: impl IntoIterator<Item = Expr>) -> Self {
        Self::Array(values.into_iter().collect())
    }

    /// Returns this expression with the given result alias.
    pub fn aliased(self, alias: impl Into<String>) -> Self {
        match self {
            Expr::Function(mut call) => {
                call.alias = Some(alias.into());
                Expr::Function(call)
            }
            Expr::Aliased(aliased) => Expr::Aliased(AliasedExpression {
                expr: aliased.expr,
                alias: alias.into(),
            }),
            expr => Expr::Aliased(AliasedExpression {
                expr: Box::new(expr),
                alias: alias.into(),
            }),
        }
    }

    /// Returns the alias under which this expression is returned, if any.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Expr::Function(call) => call.alias.as_deref(),
            Expr::Aliased(aliased) => Some(&aliased.alias),
            _ => None,
        }
    }
}

impl From<Literal> for Expr {
    fn from(value: Literal) -> Self {
        Self::Literal(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Self::Literal(value.into())
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Self::Literal(value.into())
    }
}

impl From<u64> for Expr {
    fn from(value: u64) -> Self {
        Self::Literal(value.into())
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Literal(value.into())
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::Literal(value.into())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::Literal(value.into())
    }
}

impl From<DateTime<Utc>> for Expr {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Literal(value.into())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(column) => f.write_str(&column.column),
            Expr::Literal(literal) => literal.fmt(f),
            Expr::Tuple(tuple) => {
                f.write_str("(")?;
                for (index, value) in tuple.tuple.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    value.fmt(f)?;
                }
                f.write_str(")")
            }
            Expr::Array(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    value.fmt(f)?;
                }
                f.write_str("]")
            }
            Expr::Function(call) => {
                write!(f, "{}(", call.function)?;
                for (index, argument) in call.arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    argument.fmt(f)?;
                }
                f.write_str(")")?;
                if let Some(alias) = &call.alias {
                    write!(f, " AS {alias}")?;
                }
                Ok(())
            }
            Expr::Aliased(aliased) => write!(f, "{} AS {}", aliased.expr, aliased.alias),
        }
    }
}
