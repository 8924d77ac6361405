//! Typed predicate expressions over a domain type.
//!
//! ```ignore
//! let filter = Expr::member("gender")
//!     .eq("male")
//!     .and(Expr::member("birthDate").ge(date!(1980 - 01 - 01)))
//!     .and(Expr::member("given").to_lower().starts_with("jo"));
//! ```

use std::ops::Not;

use medql_core::SqlValue;

/// Comparison and logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// A boolean- or value-typed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Member of the queried type, by serialization or property name
    Member(String),
    Constant(SqlValue),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Helper function call; the first argument is the receiver
    Call { function: String, args: Vec<Expr> },
}

impl Expr {
    pub fn member(name: impl Into<String>) -> Self {
        Self::Member(name.into())
    }

    pub fn constant(value: impl Into<SqlValue>) -> Self {
        Self::Constant(value.into())
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            function: function.into(),
            args,
        }
    }

    /// Current timestamp.
    pub fn now() -> Self {
        Self::call("now", Vec::new())
    }

    #[must_use]
    pub fn binary(self, op: BinaryOp, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    #[must_use]
    pub fn eq(self, value: impl Into<SqlValue>) -> Self {
        self.binary(BinaryOp::Eq, Self::constant(value))
    }

    #[must_use]
    pub fn ne(self, value: impl Into<SqlValue>) -> Self {
        self.binary(BinaryOp::Ne, Self::constant(value))
    }

    #[must_use]
    pub fn lt(self, value: impl Into<SqlValue>) -> Self {
        self.binary(BinaryOp::Lt, Self::constant(value))
    }

    #[must_use]
    pub fn le(self, value: impl Into<SqlValue>) -> Self {
        self.binary(BinaryOp::Le, Self::constant(value))
    }

    #[must_use]
    pub fn gt(self, value: impl Into<SqlValue>) -> Self {
        self.binary(BinaryOp::Gt, Self::constant(value))
    }

    #[must_use]
    pub fn ge(self, value: impl Into<SqlValue>) -> Self {
        self.binary(BinaryOp::Ge, Self::constant(value))
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        self.binary(BinaryOp::Eq, Self::Constant(SqlValue::Null))
    }

    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.binary(BinaryOp::Ne, Self::Constant(SqlValue::Null))
    }

    #[must_use]
    pub fn and(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    #[must_use]
    pub fn or(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    #[must_use]
    pub fn contains(self, value: impl Into<SqlValue>) -> Self {
        Self::call("contains", vec![self, Self::constant(value)])
    }

    #[must_use]
    pub fn starts_with(self, value: impl Into<SqlValue>) -> Self {
        Self::call("starts_with", vec![self, Self::constant(value)])
    }

    #[must_use]
    pub fn ends_with(self, value: impl Into<SqlValue>) -> Self {
        Self::call("ends_with", vec![self, Self::constant(value)])
    }

    #[must_use]
    pub fn to_lower(self) -> Self {
        Self::call("to_lower", vec![self])
    }

    #[must_use]
    pub fn to_upper(self) -> Self {
        Self::call("to_upper", vec![self])
    }

    #[must_use]
    pub fn trim(self) -> Self {
        Self::call("trim", vec![self])
    }

    #[must_use]
    pub fn length(self) -> Self {
        Self::call("length", vec![self])
    }

    /// Year component of a date or timestamp.
    #[must_use]
    pub fn year(self) -> Self {
        Self::call("year", vec![self])
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_shapes() {
        let expr = Expr::member("gender").eq("male");
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Eq,
                lhs: Box::new(Expr::Member("gender".into())),
                rhs: Box::new(Expr::Constant(SqlValue::Text("male".into()))),
            }
        );

        let expr = Expr::member("given").to_lower().starts_with("jo");
        let Expr::Call { function, args } = expr else {
            panic!("expected a call");
        };
        assert_eq!(function, "starts_with");
        assert!(matches!(&args[0], Expr::Call { function, .. } if function == "to_lower"));
    }

    #[test]
    fn test_negation() {
        let expr = !Expr::member("deceased").eq(true);
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn test_operator_sql() {
        assert_eq!(BinaryOp::Ne.as_sql(), "<>");
        assert!(BinaryOp::Or.is_logical());
        assert!(!BinaryOp::Ge.is_logical());
    }
}
