//! Conversion from scenario definitions to scatter plans and required properties.
mod physical;
pub use physical::*;
mod properties;
pub use properties::*;

use datafusion_common::Column;
use datafusion_expr::{binary_expr, col, lit, random, Expr, Operator};

use crate::scenario::{BinaryOpDef, ExprDef, OrderingDef};
use scatter::properties::{OrderSpec, Ordering};

pub fn to_expr(def: &ExprDef) -> Expr {
    match def {
        ExprDef::Column(name) => col(name.as_str()),
        ExprDef::Outer { name, data_type } => {
            Expr::OuterReferenceColumn(data_type.clone(), Column::from_qualified_name(name))
        }
        ExprDef::Literal(value) => lit(*value),
        ExprDef::Random => random(),
        ExprDef::Binary { left, op, right } => {
            binary_expr(to_expr(left), to_operator(*op), to_expr(right))
        }
        ExprDef::Alias { expr, name } => to_expr(expr).alias(name),
    }
}

fn to_operator(op: BinaryOpDef) -> Operator {
    match op {
        BinaryOpDef::Eq => Operator::Eq,
        BinaryOpDef::NotEq => Operator::NotEq,
        BinaryOpDef::Lt => Operator::Lt,
        BinaryOpDef::LtEq => Operator::LtEq,
        BinaryOpDef::Gt => Operator::Gt,
        BinaryOpDef::GtEq => Operator::GtEq,
        BinaryOpDef::And => Operator::And,
        BinaryOpDef::Or => Operator::Or,
    }
}

pub(in crate::conversion) fn to_columns(names: &[String]) -> Vec<Column> {
    names.iter().map(Column::from_qualified_name).collect()
}

pub(in crate::conversion) fn to_column_exprs(names: &[String]) -> Vec<Expr> {
    names.iter().map(|n| col(n.as_str())).collect()
}

pub(in crate::conversion) fn to_order_spec(defs: &[OrderingDef]) -> OrderSpec {
    OrderSpec::new(defs.iter().map(|o| {
        Ordering::new(Column::from_qualified_name(&o.column), o.asc, o.nulls_first)
    }))
}
