use std::fmt::Formatter;

use anyhow::bail;
use datafusion_expr::Expr;
use itertools::Itertools;
use log::debug;

use crate::error::{InvariantViolation, ScatterResult};
use crate::operator::join::{
    derive_join_distribution, derive_join_logical_prop, derive_join_rewindability, satisfy_after,
};
use crate::operator::{
    ChildExecOrder, DerivePropContext, DisplayFields, Displayed, JoinType, OperatorTrait,
    PhysicalOperatorTrait, PlanContext, RequiredPropContext,
};
use crate::optimizer::OptimizerConfig;
use crate::plan::PlanNodeRef;
use crate::properties::{
    DistributionMatching, DistributionRequirement, DistributionSpec, DistributionSpecRef,
    HashedSpec, LogicalProperty, Rewindability, SingletonLocation,
};

const OUTER: usize = 0;
const INNER: usize = 1;

/// Requests after the redistribute ones: (hashed or non-singleton, broadcast), (non-singleton,
/// broadcast), (singleton, singleton).
const NON_HASH_REQUESTS: usize = 3;

/// Hash join on equi-join keys. The inner child builds the hash table and is optimized first.
///
/// Optimization requests, with `N` redistribute requests:
///
/// * `0..N`: inner hashed on each single key (when there is more than one key), then on all keys;
/// outer matching what inner delivered.
/// * `N`: inner replicated; outer hashed (an incoming hashed requirement passed through) or
/// non-singleton.
/// * `N + 1`: inner replicated, outer non-singleton.
/// * `N + 2`: both on the same singleton.
#[derive(Clone, Debug, PartialEq)]
pub struct HashJoin {
    join_type: JoinType,
    outer_keys: Vec<Expr>,
    inner_keys: Vec<Expr>,
}

impl HashJoin {
    pub fn try_new(
        join_type: JoinType,
        outer_keys: Vec<Expr>,
        inner_keys: Vec<Expr>,
    ) -> ScatterResult<Self> {
        if outer_keys.is_empty() || outer_keys.len() != inner_keys.len() {
            bail!(
                "Hash join needs pairs of keys, got {} outer and {} inner keys",
                outer_keys.len(),
                inner_keys.len()
            );
        }

        Ok(Self {
            join_type,
            outer_keys,
            inner_keys,
        })
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn outer_keys(&self) -> &[Expr] {
        &self.outer_keys
    }

    pub fn inner_keys(&self) -> &[Expr] {
        &self.inner_keys
    }

    /// Hashed requests sent to the inner child.
    fn redistribute_requests(&self, config: &OptimizerConfig) -> ScatterResult<Vec<HashedSpec>> {
        let single_key_requests = config.max_hash_join_key_requests.min(self.inner_keys.len());
        let mut requests = Vec::with_capacity(single_key_requests + 1);
        if single_key_requests > 1 {
            for key in self.inner_keys.iter().take(single_key_requests) {
                requests.push(HashedSpec::try_new(vec![key.clone()], true)?);
            }
        }
        requests.push(HashedSpec::try_new(self.inner_keys.clone(), true)?);
        Ok(requests)
    }

    /// Requirement on the outer child matching what the inner child delivered.
    fn match_inner_distribution(&self, inner: &DistributionSpecRef) -> ScatterResult<DistributionSpecRef> {
        match inner.as_ref() {
            DistributionSpec::Universal => Ok(DistributionSpec::singleton(SingletonLocation::Master)),
            DistributionSpec::Singleton(location) => Ok(DistributionSpec::singleton(*location)),
            DistributionSpec::Hashed(hashed) => Ok(DistributionSpec::hashed(
                self.hashed_matching(hashed)?,
            )),
            DistributionSpec::Replicated => Ok(DistributionSpec::non_singleton()),
            other => Err(InvariantViolation::UnexpectedChildDistribution {
                operator: "PhysicalHashJoin".to_string(),
                child_index: INNER,
                found: other.distribution_type(),
            }
            .into()),
        }
    }

    /// Maps every key delivered by the inner child to its outer join key, retrying with the
    /// equivalent spec when a key is not an inner join key.
    fn hashed_matching(&self, delivered: &HashedSpec) -> ScatterResult<HashedSpec> {
        let mapped: Option<Vec<Expr>> = delivered
            .exprs()
            .iter()
            .map(|e| {
                self.inner_keys
                    .iter()
                    .position(|k| k == e)
                    .map(|idx| self.outer_keys[idx].clone())
            })
            .collect();

        match (mapped, delivered.equivalent()) {
            (Some(exprs), _) => HashedSpec::try_new(exprs, true),
            (None, Some(equivalent)) => self.hashed_matching(equivalent),
            (None, None) => {
                Err(InvariantViolation::HashedMatchingFailed(delivered.to_string()).into())
            }
        }
    }

    /// Passes an incoming hashed requirement to the outer child, restricted to outer columns.
    fn hashed_pass_through(
        &self,
        context: &RequiredPropContext,
        required: &HashedSpec,
    ) -> ScatterResult<Option<HashedSpec>> {
        if !context.plan.config.enable_redistribute_broadcast_hash_join {
            return Ok(None);
        }

        let outer_columns = context.plan.input_logical_prop(OUTER)?.output_columns();
        let used = required.columns();
        if used.is_subset(&outer_columns) {
            return Ok(Some(required.clone()));
        }
        if used.is_disjoint(&outer_columns) {
            return Ok(None);
        }

        let exprs = required
            .exprs()
            .iter()
            .filter(|e| crate::utils::referenced_columns(e).is_subset(&outer_columns))
            .cloned()
            .collect();
        // The inner side is replicated, so a singleton outer would not colocate rows.
        Ok(Some(required.with_exprs(exprs)?.mark_unsatisfiable_by_singleton()))
    }

    fn required_replicate(
        &self,
        context: &RequiredPropContext,
        redistribute_requests: usize,
    ) -> ScatterResult<DistributionRequirement> {
        if context.child_index == INNER {
            return Ok(DistributionRequirement::new(DistributionSpec::replicated()));
        }

        let inner = context.sibling(INNER)?.distribution();
        if inner.is_universal() {
            return Ok(DistributionRequirement::new(DistributionSpec::singleton(
                SingletonLocation::Master,
            )));
        }

        if context.request_index == redistribute_requests {
            if let DistributionSpec::Hashed(required) = context.required_distribution().as_ref() {
                if let Some(hashed) = self.hashed_pass_through(context, required)? {
                    return Ok(DistributionRequirement::new(DistributionSpec::hashed(hashed)));
                }
            }
        }

        Ok(DistributionRequirement::new(DistributionSpec::non_singleton()))
    }

    fn required_singleton(&self, context: &RequiredPropContext) -> ScatterResult<DistributionRequirement> {
        if context.child_index == INNER {
            return Ok(DistributionRequirement::new(DistributionSpec::singleton(
                SingletonLocation::Master,
            )));
        }

        let inner = context.sibling(INNER)?.distribution();
        let spec = match inner.as_ref() {
            DistributionSpec::Universal => DistributionSpec::singleton(SingletonLocation::Master),
            DistributionSpec::Singleton(location) => DistributionSpec::singleton(*location),
            other => {
                return Err(InvariantViolation::UnexpectedChildDistribution {
                    operator: "PhysicalHashJoin".to_string(),
                    child_index: INNER,
                    found: other.distribution_type(),
                }
                .into())
            }
        };
        Ok(DistributionRequirement::with_matching(spec, DistributionMatching::Exact))
    }

    fn outer_matching(&self, context: &RequiredPropContext) -> ScatterResult<DistributionMatching> {
        Ok(if satisfy_after(context.sibling(INNER)?.distribution()) {
            DistributionMatching::Satisfy
        } else {
            DistributionMatching::Exact
        })
    }
}

impl PhysicalOperatorTrait for HashJoin {
    fn distribution_request_count(&self, context: &PlanContext) -> ScatterResult<usize> {
        Ok(self.redistribute_requests(context.config)?.len() + NON_HASH_REQUESTS)
    }

    fn child_exec_order(&self) -> ChildExecOrder {
        ChildExecOrder::RightToLeft
    }

    fn required_distribution(
        &self,
        context: &RequiredPropContext,
    ) -> ScatterResult<DistributionRequirement> {
        let redistribute_requests = self.redistribute_requests(context.plan.config)?;
        let n = redistribute_requests.len();
        if context.request_index >= n + NON_HASH_REQUESTS {
            return Err(context.request_out_of_range(n + NON_HASH_REQUESTS));
        }

        if context.plan.logical_prop()?.has_outer_references() {
            let required = context.required_distribution();
            let spec = match required.as_ref() {
                DistributionSpec::Singleton(_) | DistributionSpec::Replicated => required.clone(),
                _ => DistributionSpec::replicated(),
            };
            let matching = if context.child_index == OUTER {
                self.outer_matching(context)?
            } else {
                DistributionMatching::Satisfy
            };
            return Ok(DistributionRequirement::with_matching(spec, matching));
        }

        let requirement = if context.request_index < n {
            if context.child_index == INNER {
                DistributionRequirement::with_matching(
                    DistributionSpec::hashed(redistribute_requests[context.request_index].clone()),
                    DistributionMatching::Subset,
                )
            } else {
                let inner = context.sibling(INNER)?.distribution();
                DistributionRequirement::with_matching(
                    self.match_inner_distribution(inner)?,
                    self.outer_matching(context)?,
                )
            }
        } else if context.request_index < n + 2 {
            self.required_replicate(context, n)?
        } else {
            self.required_singleton(context)?
        };

        debug!(
            "Hash join request {} requires {} from child {}",
            context.request_index, requirement, context.child_index
        );
        Ok(requirement)
    }

    fn derive_distribution(&self, context: &DerivePropContext) -> ScatterResult<DistributionSpecRef> {
        let outer = context.child(OUTER)?;
        let inner = context.child(INNER)?;

        if self.join_type == JoinType::Inner {
            if let (DistributionSpec::Hashed(outer_hashed), DistributionSpec::Hashed(inner_hashed)) =
                (outer.distribution().as_ref(), inner.distribution().as_ref())
            {
                return Ok(DistributionSpec::hashed(
                    outer_hashed.clone().with_equivalent(inner_hashed.clone()),
                ));
            }
        }

        Ok(derive_join_distribution(self.join_type, outer, inner))
    }

    fn derive_rewindability(&self, context: &DerivePropContext) -> ScatterResult<Rewindability> {
        Ok(derive_join_rewindability(context.child(OUTER)?, context.child(INNER)?))
    }
}

impl OperatorTrait for HashJoin {
    fn derive_logical_prop(&self, inputs: &[PlanNodeRef]) -> ScatterResult<LogicalProperty> {
        derive_join_logical_prop(
            "PhysicalHashJoin",
            self.join_type,
            inputs,
            self.outer_keys.iter().chain(&self.inner_keys),
        )
    }
}

impl DisplayFields for HashJoin {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let condition = self
            .outer_keys
            .iter()
            .zip(&self.inner_keys)
            .map(|(o, i)| format!("{o} = {i}"))
            .join(" AND ");
        f.debug_struct("")
            .field("join_type", &self.join_type)
            .field("condition", &Displayed(condition))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{required_child_properties, PhysicalOperator};
    use crate::plan::{PhysicalPlanBuilder, Plan};
    use crate::properties::{PhysicalPropertySet, RequiredPropertySet};
    use crate::test_utils::{hash_on, hashed, outer_ref, test_table};
    use datafusion_expr::col;

    fn join_plan(keys: &[(&str, &str)]) -> Plan {
        let join = HashJoin::try_new(
            JoinType::Inner,
            keys.iter().map(|(o, _)| col(*o)).collect(),
            keys.iter().map(|(_, i)| col(*i)).collect(),
        )
        .unwrap();
        PhysicalPlanBuilder::scan(test_table("t1", hash_on(&["t1.a"])))
            .hash_join(join, PhysicalPlanBuilder::scan(test_table("t2", hash_on(&["t2.b"]))))
            .build()
            .unwrap()
    }

    fn required(
        plan: &Plan,
        config: &OptimizerConfig,
        request_index: usize,
        child_index: usize,
        siblings: &[Option<PhysicalPropertySet>],
    ) -> ScatterResult<RequiredPropertySet> {
        let root = plan.root();
        required_child_properties(
            root.operator(),
            &RequiredPropContext {
                plan: PlanContext {
                    node: &root,
                    config,
                },
                required: &RequiredPropertySet::default(),
                child_index,
                request_index,
                siblings,
            },
        )
    }

    fn delivered(spec: DistributionSpecRef) -> Option<PhysicalPropertySet> {
        Some(PhysicalPropertySet::new(spec))
    }

    #[test]
    fn test_request_count() {
        let config = OptimizerConfig::default();
        let single = join_plan(&[("t1.a", "t2.b")]);
        let multi = join_plan(&[("t1.a", "t2.b"), ("t1.b", "t2.a")]);

        let count = |plan: &Plan| {
            let root = plan.root();
            root.operator()
                .distribution_request_count(&PlanContext {
                    node: &root,
                    config: &config,
                })
                .unwrap()
        };
        assert_eq!(1 + 3, count(&single));
        assert_eq!(3 + 3, count(&multi));
        assert_eq!(ChildExecOrder::RightToLeft, single.root().operator().child_exec_order());
    }

    #[test]
    fn test_redistribute_requests() {
        let config = OptimizerConfig::default();
        let plan = join_plan(&[("t1.a", "t2.b"), ("t1.b", "t2.a")]);

        let first = required(&plan, &config, 0, INNER, &[None, None]).unwrap();
        assert_eq!(&hashed(&["t2.b"]), first.distribution().spec());
        assert_eq!(DistributionMatching::Subset, first.distribution().matching());

        let all = required(&plan, &config, 2, INNER, &[None, None]).unwrap();
        assert_eq!(&hashed(&["t2.b", "t2.a"]), all.distribution().spec());

        // Inner delivered hashed on its second key: outer must match on the paired key.
        let outer = required(&plan, &config, 2, OUTER, &[None, delivered(hashed(&["t2.a"]))])
            .unwrap();
        assert_eq!(&hashed(&["t1.b"]), outer.distribution().spec());
        assert_eq!(DistributionMatching::Exact, outer.distribution().matching());
    }

    #[test]
    fn test_matching_uses_equivalent_spec() {
        let config = OptimizerConfig::default();
        let plan = join_plan(&[("t1.a", "t2.b")]);

        let inner = DistributionSpec::hashed(
            HashedSpec::try_new(vec![col("t2.z")], true)
                .unwrap()
                .with_equivalent(HashedSpec::try_new(vec![col("t2.b")], true).unwrap()),
        );
        let outer = required(&plan, &config, 0, OUTER, &[None, delivered(inner)]).unwrap();
        assert_eq!(&hashed(&["t1.a"]), outer.distribution().spec());

        let unmatched = required(&plan, &config, 0, OUTER, &[None, delivered(hashed(&["t2.z"]))]);
        assert!(unmatched.is_err());
    }

    #[test]
    fn test_broadcast_and_singleton_requests() {
        let config = OptimizerConfig::default();
        let plan = join_plan(&[("t1.a", "t2.b")]);

        let inner = required(&plan, &config, 1, INNER, &[None, None]).unwrap();
        assert_eq!(&DistributionSpec::replicated(), inner.distribution().spec());
        let outer = required(
            &plan,
            &config,
            2,
            OUTER,
            &[None, delivered(DistributionSpec::replicated())],
        )
        .unwrap();
        assert_eq!(&DistributionSpec::non_singleton(), outer.distribution().spec());
        assert_eq!(DistributionMatching::Satisfy, outer.distribution().matching());

        let outer = required(
            &plan,
            &config,
            3,
            OUTER,
            &[None, delivered(DistributionSpec::singleton(SingletonLocation::Segment))],
        )
        .unwrap();
        assert_eq!(
            &DistributionSpec::singleton(SingletonLocation::Segment),
            outer.distribution().spec()
        );
        assert_eq!(DistributionMatching::Exact, outer.distribution().matching());
    }

    #[test]
    fn test_request_index_out_of_range() {
        let config = OptimizerConfig::default();
        let plan = join_plan(&[("t1.a", "t2.b")]);
        let err = required(&plan, &config, 4, INNER, &[None, None]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InvariantViolation>(),
            Some(InvariantViolation::RequestIndexOutOfRange {
                request_index: 4,
                request_count: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_sibling() {
        let config = OptimizerConfig::default();
        let plan = join_plan(&[("t1.a", "t2.b")]);
        let err = required(&plan, &config, 0, OUTER, &[None, None]).unwrap_err();
        assert_eq!(
            Some(&InvariantViolation::MissingSiblingDistribution(INNER)),
            err.downcast_ref::<InvariantViolation>()
        );
    }

    #[test]
    fn test_derive_inner_join_equivalent() {
        let plan = join_plan(&[("t1.a", "t2.b")]);
        let root = plan.root();
        let config = OptimizerConfig::default();
        let children = vec![
            PhysicalPropertySet::new(hashed(&["t1.a"])),
            PhysicalPropertySet::new(hashed(&["t2.b"])),
        ];
        let spec = root
            .operator()
            .derive_distribution(&DerivePropContext {
                plan: PlanContext {
                    node: &root,
                    config: &config,
                },
                children: &children,
            })
            .unwrap();

        let hashed_spec = spec.as_hashed().unwrap();
        assert_eq!(&[col("t1.a")], hashed_spec.exprs());
        assert_eq!(&[col("t2.b")], hashed_spec.equivalent().unwrap().exprs());
    }

    #[test]
    fn test_semi_join_hides_inner_distribution() {
        let join = HashJoin::try_new(JoinType::LeftSemi, vec![col("t1.a")], vec![col("t2.b")])
            .unwrap();
        let outer = PhysicalPropertySet::new(DistributionSpec::replicated());
        let inner = PhysicalPropertySet::new(hashed(&["t2.b"]));

        assert_eq!(
            DistributionSpec::random(),
            derive_join_distribution(join.join_type(), &outer, &inner)
        );
        assert_eq!(
            hashed(&["t2.b"]),
            derive_join_distribution(JoinType::LeftOuter, &outer, &inner)
        );
    }

    #[test]
    fn test_hashed_pass_through_on_broadcast_request() {
        let config = OptimizerConfig {
            enable_redistribute_broadcast_hash_join: true,
            ..Default::default()
        };
        let plan = join_plan(&[("t1.a", "t2.b")]);
        let root = plan.root();
        let siblings = [None, delivered(DistributionSpec::replicated())];

        let pass = |incoming: DistributionSpecRef| {
            let incoming = RequiredPropertySet::new(DistributionRequirement::new(incoming));
            required_child_properties(
                root.operator(),
                &RequiredPropContext {
                    plan: PlanContext {
                        node: &root,
                        config: &config,
                    },
                    required: &incoming,
                    child_index: OUTER,
                    request_index: 1,
                    siblings: &siblings,
                },
            )
            .unwrap()
        };

        assert_eq!(&hashed(&["t1.b"]), pass(hashed(&["t1.b"])).distribution().spec());

        let restricted = pass(hashed(&["t1.c", "t2.a"]));
        let restricted = restricted.distribution().spec().as_hashed().unwrap();
        assert_eq!(&[col("t1.c")], restricted.exprs());
        assert!(!restricted.is_satisfied_by_singleton());

        assert_eq!(
            &DistributionSpec::non_singleton(),
            pass(hashed(&["t2.a"])).distribution().spec()
        );
    }

    #[test]
    fn test_correlated_join_requests() {
        let config = OptimizerConfig::default();
        let join = HashJoin::try_new(JoinType::Inner, vec![col("t1.a")], vec![col("t2.a")])
            .unwrap();
        let inner = PhysicalPlanBuilder::index_scan(
            test_table("t2", hash_on(&["t2.b"])),
            "t2_b",
            col("t2.b").eq(outer_ref("o.x")),
        );
        let plan = PhysicalPlanBuilder::scan(test_table("t1", hash_on(&["t1.a"])))
            .hash_join(join, inner)
            .build()
            .unwrap();
        let root = plan.root();
        assert!(root.logical_prop().unwrap().has_outer_references());

        let request = |incoming: DistributionSpecRef,
                       request_index: usize,
                       child_index: usize,
                       siblings: &[Option<PhysicalPropertySet>]| {
            let incoming = RequiredPropertySet::new(DistributionRequirement::new(incoming));
            required_child_properties(
                root.operator(),
                &RequiredPropContext {
                    plan: PlanContext {
                        node: &root,
                        config: &config,
                    },
                    required: &incoming,
                    child_index,
                    request_index,
                    siblings,
                },
            )
            .unwrap()
            .distribution()
            .clone()
        };

        // A singleton requirement is passed to both children.
        let segment = DistributionSpec::singleton(SingletonLocation::Segment);
        let inner = request(segment.clone(), 0, INNER, &[None, None]);
        assert_eq!(&segment, inner.spec());
        assert_eq!(DistributionMatching::Satisfy, inner.matching());
        let outer = request(segment.clone(), 0, OUTER, &[None, delivered(segment.clone())]);
        assert_eq!(&segment, outer.spec());
        assert_eq!(DistributionMatching::Exact, outer.matching());

        // So is a replicated one.
        let replicated = DistributionSpec::replicated();
        let outer = request(
            replicated.clone(),
            3,
            OUTER,
            &[None, delivered(replicated.clone())],
        );
        assert_eq!(&replicated, outer.spec());
        assert_eq!(DistributionMatching::Satisfy, outer.matching());

        // Anything else falls back to replicated children, whatever the request index.
        for incoming in [DistributionSpec::any(), hashed(&["t1.a"])] {
            for request_index in 0..4 {
                let inner = request(incoming.clone(), request_index, INNER, &[None, None]);
                assert_eq!(&replicated, inner.spec());
                let outer = request(
                    incoming.clone(),
                    request_index,
                    OUTER,
                    &[None, delivered(replicated.clone())],
                );
                assert_eq!(&replicated, outer.spec());
                assert_eq!(DistributionMatching::Satisfy, outer.matching());
            }
        }
    }

    #[test]
    fn test_missing_join_input() {
        let join = HashJoin::try_new(JoinType::Inner, vec![col("t1.a")], vec![col("t2.a")])
            .unwrap();
        let scan = PhysicalPlanBuilder::scan(test_table("t1", hash_on(&["t1.a"])))
            .build()
            .unwrap();

        let err = join.derive_logical_prop(&[scan.root()]).unwrap_err();
        assert_eq!(
            Some(&InvariantViolation::ChildIndexOutOfRange {
                operator: "PhysicalHashJoin".to_string(),
                child_index: 1,
                arity: 1,
            }),
            err.downcast_ref::<InvariantViolation>()
        );
    }

    #[test]
    fn test_operator_display() {
        let join = HashJoin::try_new(
            JoinType::Inner,
            vec![col("t1.a"), col("t1.b")],
            vec![col("t2.b"), col("t2.a")],
        )
        .unwrap();
        assert_eq!(
            "PhysicalHashJoin { join_type: Inner, condition: t1.a = t2.b AND t1.b = t2.a }",
            PhysicalOperator::from(join).to_string()
        );
    }
}
