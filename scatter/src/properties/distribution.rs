use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use datafusion_common::Column;
use datafusion_expr::Expr;
use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use serde::Deserialize;
use strum_macros::{AsRefStr, EnumIter};

use crate::error::{InvariantViolation, ScatterResult};
use crate::properties::PhysicalProp;
use crate::utils::referenced_columns;

pub type DistributionSpecRef = Arc<DistributionSpec>;

lazy_static! {
    static ref ANY: DistributionSpecRef = Arc::new(DistributionSpec::Any);
    static ref SINGLETON_MASTER: DistributionSpecRef =
        Arc::new(DistributionSpec::Singleton(SingletonLocation::Master));
    static ref SINGLETON_SEGMENT: DistributionSpecRef =
        Arc::new(DistributionSpec::Singleton(SingletonLocation::Segment));
    static ref UNIVERSAL: DistributionSpecRef = Arc::new(DistributionSpec::Universal);
    static ref RANDOM: DistributionSpecRef = Arc::new(DistributionSpec::Random {
        duplicate_sensitive: false
    });
    static ref REPLICATED: DistributionSpecRef = Arc::new(DistributionSpec::Replicated);
    static ref NON_SINGLETON: DistributionSpecRef = Arc::new(DistributionSpec::NonSingleton);
}

/// Where a singleton distribution lives.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, AsRefStr, EnumIter, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonLocation {
    Master,
    Segment,
}

/// Tag of a [`DistributionSpec`], without payload.
#[derive(
    Clone, Copy, Debug, Hash, Eq, PartialEq, AsRefStr, EnumIter, strum_macros::Display,
)]
pub enum DistributionType {
    Any,
    Singleton,
    Universal,
    Random,
    Replicated,
    NonSingleton,
    Hashed,
}

/// Rows are partitioned by hash value of key expressions.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct HashedSpec {
    exprs: Vec<Expr>,
    nulls_colocated: bool,
    duplicate_sensitive: bool,
    satisfied_by_singleton: bool,
    /// Same partitioning expressed on other, provably equal, expressions.
    equivalent: Option<Arc<HashedSpec>>,
}

impl HashedSpec {
    pub fn try_new(exprs: Vec<Expr>, nulls_colocated: bool) -> ScatterResult<Self> {
        if exprs.is_empty() {
            return Err(InvariantViolation::EmptyHashedKeys.into());
        }

        Ok(Self {
            exprs,
            nulls_colocated,
            duplicate_sensitive: false,
            satisfied_by_singleton: true,
            equivalent: None,
        })
    }

    /// Same flags on other key expressions, without equivalent spec.
    pub fn with_exprs(&self, exprs: Vec<Expr>) -> ScatterResult<Self> {
        if exprs.is_empty() {
            return Err(InvariantViolation::EmptyHashedKeys.into());
        }

        Ok(Self {
            exprs,
            nulls_colocated: self.nulls_colocated,
            duplicate_sensitive: self.duplicate_sensitive,
            satisfied_by_singleton: self.satisfied_by_singleton,
            equivalent: None,
        })
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    pub fn nulls_colocated(&self) -> bool {
        self.nulls_colocated
    }

    pub fn is_duplicate_sensitive(&self) -> bool {
        self.duplicate_sensitive
    }

    pub fn equivalent(&self) -> Option<&HashedSpec> {
        self.equivalent.as_deref()
    }

    /// Whether a single node holding all rows trivially colocates them.
    pub fn is_satisfied_by_singleton(&self) -> bool {
        self.satisfied_by_singleton && !self.duplicate_sensitive
    }

    /// Attaches an equivalent spec. Its duplicate sensitivity follows this spec.
    pub fn with_equivalent(mut self, mut equivalent: HashedSpec) -> Self {
        equivalent.set_duplicate_sensitive(self.duplicate_sensitive);
        self.equivalent = Some(Arc::new(equivalent));
        self
    }

    pub fn without_equivalent(mut self) -> Self {
        self.equivalent = None;
        self
    }

    pub fn with_duplicate_sensitive(mut self) -> Self {
        self.set_duplicate_sensitive(true);
        self
    }

    /// Used when the other side of a join is replicated: a singleton would break colocation with
    /// the replicated copy on every segment.
    pub fn mark_unsatisfiable_by_singleton(mut self) -> Self {
        self.satisfied_by_singleton = false;
        self
    }

    fn set_duplicate_sensitive(&mut self, duplicate_sensitive: bool) {
        self.duplicate_sensitive = duplicate_sensitive;
        if let Some(equivalent) = self.equivalent.take() {
            let mut equivalent = (*equivalent).clone();
            equivalent.set_duplicate_sensitive(duplicate_sensitive);
            self.equivalent = Some(Arc::new(equivalent));
        }
    }

    /// Columns referenced by key expressions, outer references included.
    pub fn columns(&self) -> HashSet<Column> {
        self.exprs.iter().flat_map(referenced_columns).collect()
    }

    fn flags_compatible(&self, required: &HashedSpec) -> bool {
        (self.nulls_colocated || !required.nulls_colocated)
            && (self.duplicate_sensitive || !required.duplicate_sensitive)
    }

    /// Own keys are a superset of required keys.
    fn covers(&self, required: &HashedSpec) -> bool {
        required.exprs.iter().all(|e| self.exprs.contains(e)) && self.flags_compatible(required)
    }

    /// Own keys are a subset of required keys, so rows equal on required keys are colocated.
    fn is_subset_of(&self, required: &HashedSpec) -> bool {
        self.exprs.iter().all(|e| required.exprs.contains(e)) && self.flags_compatible(required)
    }

    fn exactly_matches(&self, other: &HashedSpec) -> bool {
        self.exprs == other.exprs
            && self.nulls_colocated == other.nulls_colocated
            && self.duplicate_sensitive == other.duplicate_sensitive
    }

    /// Tries the check on this spec, then on its equivalent specs.
    fn check_with_equivalent<F: Fn(&HashedSpec) -> bool>(&self, check: F) -> bool {
        let mut current = Some(self);
        while let Some(spec) = current {
            if check(spec) {
                return true;
            }
            current = spec.equivalent();
        }
        false
    }
}

impl PhysicalProp for HashedSpec {
    fn satisfies(&self, required: &Self) -> bool {
        self.check_with_equivalent(|spec| spec.covers(required))
    }
}

impl Display for HashedSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.exprs.iter().join(", "))?;
        if !self.nulls_colocated {
            write!(f, " nulls scattered")?;
        }
        if self.duplicate_sensitive {
            write!(f, " duplicate sensitive")?;
        }
        if let Some(equivalent) = &self.equivalent {
            write!(f, " ~ [{}]", equivalent.exprs.iter().join(", "))?;
        }
        Ok(())
    }
}

/// How rows of a relation are spread across segments.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum DistributionSpec {
    /// No requirement.
    Any,
    /// All rows live on one node.
    Singleton(SingletonLocation),
    /// Every node can produce all rows, e.g. a constant table function.
    Universal,
    /// Partitioned without a rule.
    Random { duplicate_sensitive: bool },
    /// Every segment holds a full copy.
    Replicated,
    /// Partitioned in any way across more than one segment.
    NonSingleton,
    Hashed(HashedSpec),
}

impl DistributionSpec {
    pub fn any() -> DistributionSpecRef {
        ANY.clone()
    }

    pub fn singleton(location: SingletonLocation) -> DistributionSpecRef {
        match location {
            SingletonLocation::Master => SINGLETON_MASTER.clone(),
            SingletonLocation::Segment => SINGLETON_SEGMENT.clone(),
        }
    }

    pub fn universal() -> DistributionSpecRef {
        UNIVERSAL.clone()
    }

    pub fn random() -> DistributionSpecRef {
        RANDOM.clone()
    }

    pub fn replicated() -> DistributionSpecRef {
        REPLICATED.clone()
    }

    pub fn non_singleton() -> DistributionSpecRef {
        NON_SINGLETON.clone()
    }

    pub fn hashed(spec: HashedSpec) -> DistributionSpecRef {
        Arc::new(DistributionSpec::Hashed(spec))
    }

    pub fn distribution_type(&self) -> DistributionType {
        match self {
            DistributionSpec::Any => DistributionType::Any,
            DistributionSpec::Singleton(_) => DistributionType::Singleton,
            DistributionSpec::Universal => DistributionType::Universal,
            DistributionSpec::Random { .. } => DistributionType::Random,
            DistributionSpec::Replicated => DistributionType::Replicated,
            DistributionSpec::NonSingleton => DistributionType::NonSingleton,
            DistributionSpec::Hashed(_) => DistributionType::Hashed,
        }
    }

    /// Only these can be produced by a motion.
    pub fn is_requirable(&self) -> bool {
        matches!(
            self,
            DistributionSpec::Singleton(_)
                | DistributionSpec::Hashed(_)
                | DistributionSpec::Replicated
        )
    }

    /// Stricter than [`PhysicalProp::satisfies`]: tags and payloads must be the same. Equivalent
    /// specs and the singleton gate are ignored.
    pub fn matches(&self, other: &DistributionSpec) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }

        match (self, other) {
            (DistributionSpec::Hashed(h1), DistributionSpec::Hashed(h2)) => h1.exactly_matches(h2),
            (DistributionSpec::Singleton(l1), DistributionSpec::Singleton(l2)) => l1 == l2,
            (
                DistributionSpec::Random {
                    duplicate_sensitive: d1,
                },
                DistributionSpec::Random {
                    duplicate_sensitive: d2,
                },
            ) => d1 == d2,
            (s1, s2) => s1.distribution_type() == s2.distribution_type(),
        }
    }

    /// Whether this derived spec fulfils `required` under the given matching mode.
    pub fn fulfils(&self, required: &DistributionSpec, matching: DistributionMatching) -> bool {
        match matching {
            DistributionMatching::Satisfy => self.satisfies(required),
            DistributionMatching::Exact => {
                required.is_any()
                    || self.matches(required)
                    || self.as_hashed().map_or(false, |h| {
                        h.equivalent().map_or(false, |e| {
                            DistributionSpec::Hashed(e.clone()).matches(required)
                        })
                    })
            }
            DistributionMatching::Subset => match (self, required) {
                (DistributionSpec::Hashed(have), DistributionSpec::Hashed(want)) => {
                    have.check_with_equivalent(|spec| spec.is_subset_of(want))
                }
                _ => self.satisfies(required),
            },
        }
    }
}

impl PhysicalProp for DistributionSpec {
    fn satisfies(&self, required: &Self) -> bool {
        use DistributionSpec::*;

        if self == required {
            return true;
        }

        match (self, required) {
            (_, Any) => true,
            (Singleton(l1), Singleton(l2)) => l1 == l2,
            (Singleton(_), Hashed(h)) => h.is_satisfied_by_singleton(),
            (Universal, Hashed(h)) => !h.is_duplicate_sensitive(),
            (
                Universal,
                Random {
                    duplicate_sensitive,
                },
            ) => !duplicate_sensitive,
            (Hashed(h1), Hashed(h2)) => h1.satisfies(h2),
            (Hashed(_), NonSingleton) | (Random { .. }, NonSingleton) => true,
            (
                Random {
                    duplicate_sensitive: d1,
                },
                Random {
                    duplicate_sensitive: d2,
                },
            ) => *d1 || !*d2,
            _ => false,
        }
    }
}

impl Display for DistributionSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributionSpec::Singleton(location) => write!(f, "Singleton({})", location.as_ref()),
            DistributionSpec::Random {
                duplicate_sensitive: true,
            } => write!(f, "Random(duplicate sensitive)"),
            DistributionSpec::Hashed(h) => write!(f, "Hashed{h}"),
            other => write!(f, "{}", other.distribution_type()),
        }
    }
}

/// How a derived distribution is compared with a required one.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Default, AsRefStr)]
pub enum DistributionMatching {
    /// Derived satisfies required.
    #[default]
    Satisfy,
    /// Derived, or its equivalent spec, matches required.
    Exact,
    /// Derived hashed keys are a subset of required keys.
    Subset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion_expr::col;
    use strum::IntoEnumIterator;

    fn hashed(cols: &[&str]) -> HashedSpec {
        HashedSpec::try_new(cols.iter().map(|c| col(*c)).collect(), true).unwrap()
    }

    fn sample(t: DistributionType) -> DistributionSpec {
        match t {
            DistributionType::Any => DistributionSpec::Any,
            DistributionType::Singleton => DistributionSpec::Singleton(SingletonLocation::Master),
            DistributionType::Universal => DistributionSpec::Universal,
            DistributionType::Random => DistributionSpec::Random {
                duplicate_sensitive: false,
            },
            DistributionType::Replicated => DistributionSpec::Replicated,
            DistributionType::NonSingleton => DistributionSpec::NonSingleton,
            DistributionType::Hashed => DistributionSpec::Hashed(hashed(&["t1.a"])),
        }
    }

    fn more_samples() -> Vec<DistributionSpec> {
        let mut specs: Vec<DistributionSpec> = DistributionType::iter().map(sample).collect();
        specs.extend(vec![
            DistributionSpec::Singleton(SingletonLocation::Segment),
            DistributionSpec::Random {
                duplicate_sensitive: true,
            },
            DistributionSpec::Hashed(hashed(&["t1.a", "t1.b"])),
            DistributionSpec::Hashed(hashed(&["t1.b", "t1.a"]).with_duplicate_sensitive()),
            DistributionSpec::Hashed(
                HashedSpec::try_new(vec![col("t1.a")], false).unwrap(),
            ),
            DistributionSpec::Hashed(hashed(&["t1.a"]).mark_unsatisfiable_by_singleton()),
            DistributionSpec::Hashed(hashed(&["t1.a"]).with_equivalent(hashed(&["t2.x"]))),
        ]);
        specs
    }

    #[test]
    fn test_satisfies_truth_table() {
        // Rows are derived, columns are required, both in `DistributionType` order:
        // Any, Singleton, Universal, Random, Replicated, NonSingleton, Hashed.
        let expected = [
            [true, false, false, false, false, false, false],
            [true, true, false, false, false, false, true],
            [true, false, true, true, false, false, true],
            [true, false, false, true, false, true, false],
            [true, false, false, false, true, false, false],
            [true, false, false, false, false, true, false],
            [true, false, false, false, false, true, true],
        ];

        for (i, have) in DistributionType::iter().enumerate() {
            for (j, want) in DistributionType::iter().enumerate() {
                assert_eq!(
                    expected[i][j],
                    sample(have).satisfies(&sample(want)),
                    "{} satisfies {}",
                    have,
                    want
                );
            }
        }
    }

    #[test]
    fn test_matches_only_same_tag() {
        for have in DistributionType::iter() {
            for want in DistributionType::iter() {
                assert_eq!(have == want, sample(have).matches(&sample(want)));
            }
        }
    }

    #[test]
    fn test_reflexive_and_match_implies_satisfies() {
        let specs = more_samples();
        for a in &specs {
            assert!(a.satisfies(a), "{a} doesn't satisfy itself");
            for b in &specs {
                if a.matches(b) {
                    assert!(a.satisfies(b), "{a} matches but doesn't satisfy {b}");
                }
            }
        }
    }

    #[test]
    fn test_singleton_satisfies_hashed() {
        let singleton = DistributionSpec::Singleton(SingletonLocation::Segment);
        assert!(singleton.satisfies(&DistributionSpec::Hashed(hashed(&["t1.a"]))));
        assert!(!singleton.satisfies(&DistributionSpec::Hashed(
            hashed(&["t1.a"]).with_duplicate_sensitive()
        )));
        assert!(!singleton.satisfies(&DistributionSpec::Hashed(
            hashed(&["t1.a"]).mark_unsatisfiable_by_singleton()
        )));
        assert!(!singleton.satisfies(&DistributionSpec::Singleton(SingletonLocation::Master)));
        assert!(!singleton.satisfies(&DistributionSpec::NonSingleton));
    }

    #[test]
    fn test_universal_and_duplicates() {
        let universal = DistributionSpec::Universal;
        assert!(!universal.satisfies(&DistributionSpec::Random {
            duplicate_sensitive: true
        }));
        assert!(!universal.satisfies(&DistributionSpec::Hashed(
            hashed(&["t1.a"]).with_duplicate_sensitive()
        )));
        assert!(!universal.satisfies(&DistributionSpec::NonSingleton));
    }

    #[test]
    fn test_hashed_monotonicity() {
        let wide = DistributionSpec::Hashed(hashed(&["t1.a", "t1.b"]).with_duplicate_sensitive());
        let narrow =
            DistributionSpec::Hashed(HashedSpec::try_new(vec![col("t1.b")], false).unwrap());

        assert!(wide.satisfies(&narrow));
        assert!(!narrow.satisfies(&wide));

        let nulls_scattered =
            DistributionSpec::Hashed(HashedSpec::try_new(vec![col("t1.a")], false).unwrap());
        assert!(!nulls_scattered.satisfies(&DistributionSpec::Hashed(hashed(&["t1.a"]))));
    }

    #[test]
    fn test_hashed_satisfies_through_equivalent() {
        let with_equivalent =
            DistributionSpec::Hashed(hashed(&["t1.a"]).with_equivalent(hashed(&["o.x"])));
        let required = DistributionSpec::Hashed(hashed(&["o.x"]));

        assert!(with_equivalent.satisfies(&required));
        assert!(!with_equivalent.matches(&required));
        assert!(with_equivalent.fulfils(&required, DistributionMatching::Exact));
    }

    #[test]
    fn test_equivalent_follows_duplicate_sensitivity() {
        let spec = hashed(&["t1.a"])
            .with_equivalent(hashed(&["o.x"]))
            .with_duplicate_sensitive();
        assert!(spec.equivalent().unwrap().is_duplicate_sensitive());
    }

    #[test]
    fn test_fulfils_subset() {
        let narrow = DistributionSpec::Hashed(hashed(&["t1.a"]));
        let wide = DistributionSpec::Hashed(hashed(&["t1.a", "t1.b"]));

        assert!(narrow.fulfils(&wide, DistributionMatching::Subset));
        assert!(!wide.fulfils(&narrow, DistributionMatching::Subset));
        assert!(wide.fulfils(&narrow, DistributionMatching::Satisfy));
        assert!(DistributionSpec::Singleton(SingletonLocation::Master)
            .fulfils(&wide, DistributionMatching::Subset));
        assert!(!DistributionSpec::Replicated.fulfils(&wide, DistributionMatching::Subset));
    }

    #[test]
    fn test_fulfils_exact() {
        let required = DistributionSpec::Hashed(hashed(&["t1.a"]));
        let wide = DistributionSpec::Hashed(hashed(&["t1.a", "t1.b"]));
        assert!(!wide.fulfils(&required, DistributionMatching::Exact));
        assert!(required.fulfils(&required, DistributionMatching::Exact));
        assert!(wide.fulfils(&DistributionSpec::Any, DistributionMatching::Exact));
    }

    #[test]
    fn test_requirable() {
        let requirable: Vec<DistributionType> = DistributionType::iter()
            .filter(|t| sample(*t).is_requirable())
            .collect();
        assert_eq!(
            vec![
                DistributionType::Singleton,
                DistributionType::Replicated,
                DistributionType::Hashed
            ],
            requirable
        );
    }

    #[test]
    fn test_empty_hashed_keys() {
        let err = HashedSpec::try_new(vec![], true).unwrap_err();
        assert_eq!(
            Some(&InvariantViolation::EmptyHashedKeys),
            err.downcast_ref::<InvariantViolation>()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!("Singleton(Master)", DistributionSpec::singleton(SingletonLocation::Master).to_string());
        assert_eq!("NonSingleton", DistributionSpec::non_singleton().to_string());
        assert_eq!(
            "Hashed[t1.a, t1.b]",
            DistributionSpec::Hashed(hashed(&["t1.a", "t1.b"])).to_string()
        );
    }
}
