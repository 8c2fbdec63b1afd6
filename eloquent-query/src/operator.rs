//! Comparison operators and their operands.

use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, QueryResult};
use crate::sql::SqlBuilder;
use crate::value::Value;

/// A comparison operator from the supported vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<=>` (null-safe equality)
    NullSafeEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `IS`
    Is,
    /// `IS NOT`
    IsNot,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// `BETWEEN`
    Between,
    /// `NOT BETWEEN`
    NotBetween,
    /// `!=`
    Ne,
    /// `<>`
    NeAlt,
}

impl Operator {
    /// Number of operands the operator takes.
    pub fn operand_count(&self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull => 0,
            Self::Between | Self::NotBetween => 2,
            _ => 1,
        }
    }

    /// Canonical SQL text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NullSafeEq => "<=>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT BETWEEN",
            Self::Ne => "!=",
            Self::NeAlt => "<>",
        }
    }

    /// Pair this operator with operands, checking the count.
    pub fn with_operands(self, operands: impl IntoOperands) -> QueryResult<Comparison> {
        let operands = operands.into_operands();
        if operands.len() != self.operand_count() {
            return Err(QueryError::operand_count(
                self.as_str(),
                self.operand_count(),
                operands.len(),
            ));
        }
        Ok(Comparison { op: self, operands })
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let normalized = token.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let op = match normalized.as_str() {
            "=" => Self::Eq,
            "<=>" => Self::NullSafeEq,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            "LIKE" => Self::Like,
            "NOT LIKE" => Self::NotLike,
            "IN" => Self::In,
            "NOT IN" => Self::NotIn,
            "IS" => Self::Is,
            "IS NOT" => Self::IsNot,
            "IS NULL" => Self::IsNull,
            "IS NOT NULL" => Self::IsNotNull,
            "BETWEEN" => Self::Between,
            "NOT BETWEEN" => Self::NotBetween,
            "!=" => Self::Ne,
            "<>" => Self::NeAlt,
            _ => return Err(QueryError::unknown_operator(token)),
        };
        Ok(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single bound value.
    Value(Value),
    /// A parenthesized list of bound values (for `IN`).
    List(Vec<Value>),
}

impl Operand {
    fn write_sql(&self, builder: &mut SqlBuilder) {
        match self {
            Self::Value(value) => {
                builder.push_param(value.clone());
            }
            Self::List(values) => {
                builder.push("(");
                builder.push_params(values);
                builder.push(")");
            }
        }
    }
}

/// Conversion into an operand list.
pub trait IntoOperands {
    /// Produce the operands.
    fn into_operands(self) -> Vec<Operand>;
}

impl IntoOperands for () {
    fn into_operands(self) -> Vec<Operand> {
        Vec::new()
    }
}

impl IntoOperands for Vec<Operand> {
    fn into_operands(self) -> Vec<Operand> {
        self
    }
}

impl<T: Into<Value>> IntoOperands for Vec<T> {
    fn into_operands(self) -> Vec<Operand> {
        vec![Operand::List(self.into_iter().map(Into::into).collect())]
    }
}

impl<A: Into<Value>, B: Into<Value>> IntoOperands for (A, B) {
    fn into_operands(self) -> Vec<Operand> {
        vec![Operand::Value(self.0.into()), Operand::Value(self.1.into())]
    }
}

macro_rules! single_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOperands for $ty {
                fn into_operands(self) -> Vec<Operand> {
                    vec![Operand::Value(self.into())]
                }
            }
        )*
    };
}

single_operand!(
    Value,
    bool,
    i32,
    i64,
    u32,
    f64,
    String,
    &str,
    chrono::NaiveDateTime,
);

/// An operator with a validated operand list.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    op: Operator,
    operands: Vec<Operand>,
}

impl Comparison {
    /// Parse an operator token and attach operands.
    pub fn parse(op: &str, operands: impl IntoOperands) -> QueryResult<Self> {
        op.parse::<Operator>()?.with_operands(operands)
    }

    pub(crate) fn from_parts(op: Operator, operands: Vec<Operand>) -> Self {
        Self { op, operands }
    }

    /// Constant truth value of `IN` / `NOT IN` over an empty list.
    pub(crate) fn empty_list_truth(&self) -> Option<bool> {
        match (self.op, self.operands.first()) {
            (Operator::In, Some(Operand::List(values))) if values.is_empty() => Some(false),
            (Operator::NotIn, Some(Operand::List(values))) if values.is_empty() => Some(true),
            _ => None,
        }
    }

    /// The operator.
    pub fn operator(&self) -> Operator {
        self.op
    }

    /// The operands.
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Render `<op> <operands>` after an already-written left-hand side.
    pub fn write_sql(&self, builder: &mut SqlBuilder) {
        let op_text = match self.op {
            Operator::NullSafeEq => builder.dialect().null_safe_eq(),
            op => op.as_str(),
        };
        builder.push(" ").push(op_text);
        match self.op {
            Operator::Between | Operator::NotBetween => {
                builder.push(" ");
                self.operands[0].write_sql(builder);
                builder.push(" AND ");
                self.operands[1].write_sql(builder);
            }
            Operator::In | Operator::NotIn => {
                builder.push(" ");
                match &self.operands[0] {
                    Operand::List(_) => self.operands[0].write_sql(builder),
                    single => {
                        builder.push("(");
                        single.write_sql(builder);
                        builder.push(")");
                    }
                }
            }
            _ => {
                for operand in &self.operands {
                    builder.push(" ");
                    operand.write_sql(builder);
                }
            }
        }
    }
}
