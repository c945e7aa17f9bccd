//! Helpers over DataFusion scalar expressions.

use std::collections::HashSet;

use datafusion_common::tree_node::{TreeNode, VisitRecursion};
use datafusion_common::Column;
use datafusion_expr::expr::{BinaryExpr, ScalarFunction};
use datafusion_expr::{Expr, Operator, Volatility};

/// Calls `f` for every column reference in `expr`. The flag tells whether the reference points
/// to an outer query block.
fn visit_columns<F: FnMut(&Column, bool)>(expr: &Expr, f: &mut F) {
    // The visitor never fails.
    let _ = expr.apply(&mut |e| {
        match e {
            Expr::Column(c) => f(c, false),
            Expr::OuterReferenceColumn(_, c) => f(c, true),
            _ => {}
        }
        Ok(VisitRecursion::Continue)
    });
}

/// Local columns used by `expr`.
pub fn local_columns(expr: &Expr) -> HashSet<Column> {
    let mut columns = HashSet::new();
    visit_columns(expr, &mut |c, outer| {
        if !outer {
            columns.insert(c.clone());
        }
    });
    columns
}

/// Columns of outer query blocks used by `expr`.
pub fn outer_reference_columns(expr: &Expr) -> HashSet<Column> {
    let mut columns = HashSet::new();
    visit_columns(expr, &mut |c, outer| {
        if outer {
            columns.insert(c.clone());
        }
    });
    columns
}

/// Every column used by `expr`, local or outer.
pub fn referenced_columns(expr: &Expr) -> HashSet<Column> {
    let mut columns = HashSet::new();
    visit_columns(expr, &mut |c, _| {
        columns.insert(c.clone());
    });
    columns
}

/// Splits `a AND b AND c` into its conjuncts.
pub fn split_conjunction(expr: &Expr) -> Vec<&Expr> {
    let mut conjuncts = vec![];
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        match e {
            Expr::BinaryExpr(BinaryExpr {
                left,
                op: Operator::And,
                right,
            }) => {
                stack.push(right);
                stack.push(left);
            }
            other => conjuncts.push(other),
        }
    }
    conjuncts
}

/// Returns both sides of an equality predicate.
pub fn as_equality(expr: &Expr) -> Option<(&Expr, &Expr)> {
    match expr {
        Expr::BinaryExpr(BinaryExpr {
            left,
            op: Operator::Eq,
            right,
        }) => Some((left.as_ref(), right.as_ref())),
        _ => None,
    }
}

/// Whether evaluating `expr` twice may give different results, e.g. `random()`.
pub fn has_volatile_function(expr: &Expr) -> bool {
    let mut volatile = false;
    let _ = expr.apply(&mut |e| {
        if let Expr::ScalarFunction(ScalarFunction { fun, .. }) = e {
            if fun.volatility() == Volatility::Volatile {
                volatile = true;
                return Ok(VisitRecursion::Stop);
            }
        }
        Ok(VisitRecursion::Continue)
    });
    volatile
}

pub fn column_exprs<'a, I: IntoIterator<Item = &'a Column>>(columns: I) -> Vec<Expr> {
    columns.into_iter().cloned().map(Expr::Column).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;
    use datafusion_expr::{col, lit, random, when};

    fn outer(name: &str) -> Expr {
        Expr::OuterReferenceColumn(DataType::Int32, Column::from_qualified_name(name))
    }

    #[test]
    fn test_split_conjunction_keeps_order() {
        let predicate = col("t1.a")
            .eq(outer("o.x"))
            .and(col("t1.b").eq(lit(1)))
            .and(col("t1.c").gt(lit(2)));

        let conjuncts = split_conjunction(&predicate);
        assert_eq!(3, conjuncts.len());
        assert_eq!(&col("t1.a").eq(outer("o.x")), conjuncts[0]);
        assert_eq!(&col("t1.c").gt(lit(2)), conjuncts[2]);
    }

    #[test]
    fn test_columns_by_scope() {
        let predicate = col("t1.a").eq(outer("o.x")).and(col("t1.b").is_null());

        let local = local_columns(&predicate);
        assert!(local.contains(&Column::from_qualified_name("t1.a")));
        assert!(local.contains(&Column::from_qualified_name("t1.b")));
        assert_eq!(2, local.len());

        let outer_refs = outer_reference_columns(&predicate);
        assert_eq!(1, outer_refs.len());
        assert!(outer_refs.contains(&Column::from_qualified_name("o.x")));

        assert_eq!(3, referenced_columns(&predicate).len());
    }

    #[test]
    fn test_as_equality() {
        let eq = col("t1.a").eq(col("t2.b"));
        let (l, r) = as_equality(&eq).unwrap();
        assert_eq!(&col("t1.a"), l);
        assert_eq!(&col("t2.b"), r);
        assert!(as_equality(&col("t1.a").gt(col("t2.b"))).is_none());
    }

    #[test]
    fn test_volatile_function() {
        assert!(has_volatile_function(
            &col("t1.a").gt(random()).alias("r")
        ));
        assert!(!has_volatile_function(&col("t1.a").gt(lit(1))));
    }

    #[test]
    fn test_outer_references_in_nested_exprs() {
        let between = col("t1.b").between(outer("o.lo"), outer("o.hi"));
        let outer_refs = outer_reference_columns(&between);
        assert_eq!(2, outer_refs.len());
        assert!(outer_refs.contains(&Column::from_qualified_name("o.lo")));
        assert_eq!(1, local_columns(&between).len());

        let in_list = col("t1.a").in_list(vec![outer("o.x"), lit(1)], false);
        assert_eq!(
            HashSet::from([Column::from_qualified_name("o.x")]),
            outer_reference_columns(&in_list)
        );

        let case = when(col("t1.a").eq(outer("o.y")), col("t1.b"))
            .otherwise(col("t1.c"))
            .unwrap();
        assert!(outer_reference_columns(&case).contains(&Column::from_qualified_name("o.y")));
        assert_eq!(3, local_columns(&case).len());
    }

    #[test]
    fn test_volatile_function_in_nested_exprs() {
        let case = when(random().gt(lit(0.5)), col("t1.a"))
            .otherwise(col("t1.b"))
            .unwrap();
        assert!(has_volatile_function(&case));

        let in_list = col("t1.a").in_list(vec![random(), lit(1.0)], false);
        assert!(has_volatile_function(&in_list));

        let not_volatile = col("t1.a").between(lit(1), lit(2));
        assert!(!has_volatile_function(&not_volatile));
    }
}
