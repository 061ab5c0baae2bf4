use std::fmt;

use crate::Expr;

/// A comparison operator in a query condition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Op {
    /// Equality (`=`).
    Eq,
    /// Inequality (`!=`).
    NotEq,
    /// Less than (`<`).
    Lt,
    /// Less than or equal (`<=`).
    Lte,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal (`>=`).
    Gte,
    /// Membership in a list (`IN`).
    In,
    /// Non-membership in a list (`NOT IN`).
    NotIn,
}

impl Op {
    /// Returns the operator symbol in the storage dialect.
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "!=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::In => "IN",
            Op::NotIn => "NOT IN",
        }
    }

    /// Returns the storage function equivalent to this comparison.
    ///
    /// List operators have no function form and return `None`.
    pub fn function_name(self) -> Option<&'static str> {
        Some(match self {
            Op::Eq => "equals",
            Op::NotEq => "notEquals",
            Op::Lt => "less",
            Op::Lte => "lessOrEquals",
            Op::Gt => "greater",
            Op::Gte => "greaterOrEquals",
            Op::In | Op::NotIn => return None,
        })
    }

    /// Returns the operator matching the opposite set of rows.
    pub fn negate(self) -> Self {
        match self {
            Op::Eq => Op::NotEq,
            Op::NotEq => Op::Eq,
            Op::Lt => Op::Gte,
            Op::Lte => Op::Gt,
            Op::Gt => Op::Lte,
            Op::Gte => Op::Lt,
            Op::In => Op::NotIn,
            Op::NotIn => Op::In,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

quarry_base_schema::impl_str_ser!(Op);

/// A single predicate in the where clause of a compiled query.
///
/// All conditions of a query combine with logical AND. Disjunctions are
/// expressed through boolean function expressions on the left-hand side, see
/// [`Condition::boolean`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Condition {
    /// The left-hand side expression.
    pub lhs: Expr,
    /// The comparison operator.
    pub op: Op,
    /// The right-hand side expression, usually a literal or array.
    pub rhs: Expr,
}

impl Condition {
    /// Creates a condition comparing an expression against a value.
    pub fn new(lhs: Expr, op: Op, rhs: impl Into<Expr>) -> Self {
        Self {
            lhs,
            op,
            rhs: rhs.into(),
        }
    }

    /// Wraps a boolean function expression into a condition.
    ///
    /// The storage dialect requires standalone boolean expressions in the
    /// where clause to compare against `1`.
    pub fn boolean(expr: Expr) -> Self {
        Self::new(expr, Op::Eq, 1i64)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}
