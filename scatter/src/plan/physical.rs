use std::sync::Arc;

use datafusion_expr::Expr;

use crate::error::ScatterResult;
use crate::operator::{
    Aggregate, Broadcast, Gather, GatherMerge, HashJoin, IndexScan, NestedLoopJoin,
    PhysicalOperator, Projection, Redistribute, Sort, Split, Spool, TableDescriptor, TableScan,
};
use crate::plan::{Plan, PlanNode, PlanNodeIdGen, PlanNodeRef};
use crate::properties::{HashedSpec, OrderSpec, SingletonLocation};

/// Builds physical plans bottom up. Node ids are assigned in post order and logical properties
/// are derived when calling [`PhysicalPlanBuilder::build`].
#[derive(Clone, Debug)]
pub struct PhysicalPlanBuilder {
    operator: PhysicalOperator,
    inputs: Vec<PhysicalPlanBuilder>,
}

impl PhysicalPlanBuilder {
    pub fn new<O: Into<PhysicalOperator>>(leaf: O) -> Self {
        Self {
            operator: leaf.into(),
            inputs: vec![],
        }
    }

    pub fn scan(table: Arc<TableDescriptor>) -> Self {
        Self::new(TableScan::new(table))
    }

    pub fn dynamic_scan(table: Arc<TableDescriptor>) -> Self {
        Self::new(TableScan::dynamic(table))
    }

    pub fn index_scan<S: Into<String>>(
        table: Arc<TableDescriptor>,
        index_name: S,
        predicate: Expr,
    ) -> Self {
        Self::new(IndexScan::new(table, index_name, predicate))
    }

    /// Puts `operator` on top of the current plan, with the current plan as first input.
    pub fn unary<O: Into<PhysicalOperator>>(self, operator: O) -> Self {
        Self {
            operator: operator.into(),
            inputs: vec![self],
        }
    }

    /// Puts `operator` on top of the current plan and `inner`.
    pub fn binary<O: Into<PhysicalOperator>>(self, operator: O, inner: PhysicalPlanBuilder) -> Self {
        Self {
            operator: operator.into(),
            inputs: vec![self, inner],
        }
    }

    pub fn hash_join(self, join: HashJoin, inner: PhysicalPlanBuilder) -> Self {
        self.binary(join, inner)
    }

    pub fn nested_loop_join(self, join: NestedLoopJoin, inner: PhysicalPlanBuilder) -> Self {
        self.binary(join, inner)
    }

    pub fn aggregate(self, aggregate: Aggregate) -> Self {
        self.unary(aggregate)
    }

    pub fn projection(self, exprs: Vec<Expr>) -> Self {
        self.unary(Projection::new(exprs))
    }

    pub fn split(self, split: Split) -> Self {
        self.unary(split)
    }

    pub fn sort(self, order: OrderSpec) -> Self {
        self.unary(Sort::new(order))
    }

    pub fn spool(self) -> Self {
        self.unary(Spool)
    }

    pub fn gather(self, location: SingletonLocation) -> Self {
        self.unary(Gather::new(location))
    }

    pub fn gather_merge(self, order: OrderSpec) -> Self {
        self.unary(GatherMerge::new(order))
    }

    pub fn broadcast(self) -> Self {
        self.unary(Broadcast)
    }

    pub fn redistribute(self, spec: HashedSpec) -> Self {
        self.unary(Redistribute::new(spec))
    }

    pub fn build(self) -> ScatterResult<Plan> {
        let mut id_gen = PlanNodeIdGen::new();
        Ok(Plan::new(self.build_node(&mut id_gen)?))
    }

    fn build_node(self, id_gen: &mut PlanNodeIdGen) -> ScatterResult<PlanNodeRef> {
        let inputs = self
            .inputs
            .into_iter()
            .map(|input| input.build_node(id_gen))
            .collect::<ScatterResult<Vec<PlanNodeRef>>>()?;

        Ok(Arc::new(PlanNode::try_new_with_logical_prop(
            id_gen.gen_next(),
            self.operator,
            inputs,
        )?))
    }
}
