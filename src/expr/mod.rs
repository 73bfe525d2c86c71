//! Expression tree.
//!
//! `Expression` is a closed set of node kinds. Structural queries are built on the one
//! traversal primitive, [`Expression::walk`]; evaluation lives in `eval`.

mod builtins;
mod eval;
mod helpers;

pub use builtins::{is_aggregate, BuiltinFunctions};
pub use helpers::{like_matches, like_to_regex};

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

pub(crate) fn lowercase<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| s.to_lowercase())
}

/// Arithmetic operators of `Expression::Binary`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
    #[serde(rename = "%")]
    Modulo,
}

impl ArithmeticOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Modulo => "%",
        }
    }
}

/// Comparison operators of `Expression::Comparison`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "notLike")]
    NotLike,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Gt => ">",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::GtEq => ">=",
            ComparisonOp::Like => "like",
            ComparisonOp::NotLike => "notLike",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
}

/// One node of an expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    Literal {
        value: Json,
    },
    /// `source.column`; `column` may be `*` for the whole flattened row.
    SourceColumn {
        #[serde(deserialize_with = "lowercase")]
        source: String,
        #[serde(deserialize_with = "lowercase")]
        column: String,
    },
    Binary {
        op: ArithmeticOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Comparison {
        cmp: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not {
        operand: Box<Expression>,
    },
    Negate {
        operand: Box<Expression>,
    },
    IsNull {
        operand: Box<Expression>,
        #[serde(default)]
        negated: bool,
    },
    InList {
        operand: Box<Expression>,
        list: Vec<Expression>,
        #[serde(default)]
        negated: bool,
    },
    FunctionCall {
        #[serde(deserialize_with = "lowercase")]
        func: String,
        #[serde(default)]
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn literal(value: Json) -> Self {
        Expression::Literal { value }
    }

    pub fn null() -> Self {
        Expression::literal(Json::Null)
    }

    pub fn column(source: &str, column: &str) -> Self {
        Expression::SourceColumn {
            source: source.to_lowercase(),
            column: column.to_lowercase(),
        }
    }

    pub fn binary(op: ArithmeticOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(cmp: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            cmp,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Expression::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Not {
            operand: Box::new(operand),
        }
    }

    pub fn negate(operand: Expression) -> Self {
        Expression::Negate {
            operand: Box::new(operand),
        }
    }

    pub fn is_null(operand: Expression, negated: bool) -> Self {
        Expression::IsNull {
            operand: Box::new(operand),
            negated,
        }
    }

    pub fn in_list(operand: Expression, list: Vec<Expression>, negated: bool) -> Self {
        Expression::InList {
            operand: Box::new(operand),
            list,
            negated,
        }
    }

    pub fn call(func: &str, args: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            func: func.to_lowercase(),
            args,
        }
    }

    /// Visit this node, then its children unless the visitor returns `false`.
    ///
    /// Pre-order, left to right; every node of an acyclic tree is visited once.
    pub fn walk<F>(&self, visitor: &mut F)
    where
        F: FnMut(&Expression) -> bool,
    {
        if visitor(self) {
            self.walk_children(visitor);
        }
    }

    /// Walk the direct children of this node.
    pub fn walk_children<F>(&self, visitor: &mut F)
    where
        F: FnMut(&Expression) -> bool,
    {
        match self {
            Expression::Literal { .. } | Expression::SourceColumn { .. } => {}
            Expression::Binary { left, right, .. }
            | Expression::Comparison { left, right, .. }
            | Expression::Logical { left, right, .. } => {
                left.walk(visitor);
                right.walk(visitor);
            }
            Expression::Not { operand }
            | Expression::Negate { operand }
            | Expression::IsNull { operand, .. } => operand.walk(visitor),
            Expression::InList { operand, list, .. } => {
                operand.walk(visitor);
                for item in list {
                    item.walk(visitor);
                }
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.walk(visitor);
                }
            }
        }
    }

    /// Every distinct source referenced by a column in this subtree.
    pub fn referenced_tables(&self) -> BTreeSet<String> {
        let mut target = BTreeSet::new();
        self.collect_referenced_tables(&mut target);
        target
    }

    pub fn collect_referenced_tables(&self, target: &mut BTreeSet<String>) {
        self.walk(&mut |node: &Expression| {
            if let Expression::SourceColumn { source, .. } = node {
                target.insert(source.clone());
            }
            true
        });
    }

    /// Whether the subtree calls an aggregate function.
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node: &Expression| {
            if let Expression::FunctionCall { func, args } = node {
                if is_aggregate(func, args.len()) {
                    found = true;
                    return false;
                }
            }
            !found
        });
        found
    }

    /// Short label used in error paths and default projection names.
    pub fn label(&self) -> String {
        match self {
            Expression::Literal { value } => value.to_string(),
            Expression::SourceColumn { source, column } => format!("{}.{}", source, column),
            Expression::Binary { op, .. } => format!("({})", op.as_str()),
            Expression::Comparison { cmp, .. } => format!("({})", cmp.as_str()),
            Expression::Logical { op, .. } => match op {
                LogicalOp::And => "(and)".to_string(),
                LogicalOp::Or => "(or)".to_string(),
            },
            Expression::Not { .. } => "(not)".to_string(),
            Expression::Negate { .. } => "(neg)".to_string(),
            Expression::IsNull { .. } => "(is null)".to_string(),
            Expression::InList { .. } => "(in)".to_string(),
            Expression::FunctionCall { func, .. } => format!("{}()", func),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value } => write!(f, "{}", value),
            Expression::SourceColumn { source, column } => write!(f, "{}.{}", source, column),
            Expression::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            Expression::Comparison { cmp, left, right } => {
                write!(f, "({} {} {})", left, cmp.as_str(), right)
            }
            Expression::Logical { op, left, right } => {
                let op = match op {
                    LogicalOp::And => "AND",
                    LogicalOp::Or => "OR",
                };
                write!(f, "({} {} {})", left, op, right)
            }
            Expression::Not { operand } => write!(f, "NOT {}", operand),
            Expression::Negate { operand } => write!(f, "-{}", operand),
            Expression::IsNull { operand, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", operand)
                } else {
                    write!(f, "{} IS NULL", operand)
                }
            }
            Expression::InList {
                operand,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                let keyword = if *negated { "NOT IN" } else { "IN" };
                write!(f, "{} {} ({})", operand, keyword, items.join(", "))
            }
            Expression::FunctionCall { func, args } => {
                let args: Vec<String> = args.iter().map(|e| e.to_string()).collect();
                write!(f, "{}({})", func, args.join(", "))
            }
        }
    }
}
