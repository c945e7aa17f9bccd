use std::fmt::{Display, Formatter};

use datafusion_common::Column;
use itertools::Itertools;

use crate::properties::PhysicalProp;

/// Ordering of one column.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct Ordering {
    column: Column,
    /// Ascending or descending.
    asc: bool,
    /// Should null be treated first.
    nulls_first: bool,
}

impl Ordering {
    pub fn new(column: Column, asc: bool, nulls_first: bool) -> Self {
        Self {
            column,
            asc,
            nulls_first,
        }
    }

    pub fn asc(column: Column) -> Self {
        Self::new(column, true, false)
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn is_asc(&self) -> bool {
        self.asc
    }

    pub fn is_nulls_first(&self) -> bool {
        self.nulls_first
    }
}

impl Display for Ordering {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.column, if self.asc { "ASC" } else { "DESC" })?;
        if self.nulls_first {
            write!(f, " NULLS FIRST")?;
        }
        Ok(())
    }
}

/// Ordering property specification.
#[derive(Hash, Debug, Clone, Eq, PartialEq, Default)]
pub struct OrderSpec {
    orders: Vec<Ordering>,
}

impl OrderSpec {
    pub fn new<I: IntoIterator<Item = Ordering>>(orders: I) -> Self {
        Self {
            orders: orders.into_iter().collect(),
        }
    }

    pub fn orders(&self) -> &[Ordering] {
        &self.orders
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl PhysicalProp for OrderSpec {
    /// Required orderings must be a prefix of ours.
    fn satisfies(&self, other: &Self) -> bool {
        other.orders.len() <= self.orders.len()
            && self.orders.iter().zip(&other.orders).all(|(a, b)| a == b)
    }
}

impl Display for OrderSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.orders.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(columns: &[&str]) -> OrderSpec {
        OrderSpec::new(
            columns
                .iter()
                .map(|c| Ordering::asc(Column::from_qualified_name(*c))),
        )
    }

    #[test]
    fn test_prefix_satisfies() {
        let sorted = order(&["t1.a", "t1.b"]);
        assert!(sorted.satisfies(&order(&["t1.a"])));
        assert!(sorted.satisfies(&OrderSpec::default()));
        assert!(!sorted.satisfies(&order(&["t1.b"])));
        assert!(!order(&["t1.a"]).satisfies(&sorted));
    }

    #[test]
    fn test_direction_matters() {
        let desc = OrderSpec::new(vec![Ordering::new(
            Column::from_qualified_name("t1.a"),
            false,
            true,
        )]);
        assert!(!desc.satisfies(&order(&["t1.a"])));
        assert_eq!("[t1.a DESC NULLS FIRST]", desc.to_string());
    }
}
