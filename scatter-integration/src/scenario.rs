//! Serde model of scenario files.
//!
//! A scenario file declares a catalog of distributed tables shared by its cases. Every case is a
//! physical plan without motions, the properties required at its root, optimizer switches and
//! the expected outcome.
use std::io::Read;

use arrow_schema::DataType;
use scatter::optimizer::OptimizerConfig;
use scatter::properties::SingletonLocation;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::with::singleton_map_recursive;

/// Parses a scenario document. Enum variants with data are written as single entry maps, e.g.
/// `distribution: {hash: [a]}`.
pub fn from_yaml_str<T: DeserializeOwned>(yaml: &str) -> serde_yaml::Result<T> {
    singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(yaml))
}

pub fn from_yaml_reader<R: Read, T: DeserializeOwned>(reader: R) -> serde_yaml::Result<T> {
    singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_reader(reader))
}

#[derive(Debug, Deserialize)]
pub struct ScenarioSuite {
    pub tables: Vec<TableDef>,
    pub cases: Vec<Scenario>,
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub config: OptimizerConfig,
    pub plan: PlanDef,
    #[serde(default)]
    pub required: RequiredDef,
    #[serde(default)]
    pub expected_optimized_plan: Option<String>,
    /// Substring of the expected error message.
    #[serde(default)]
    pub expected_error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub distribution: DistributionDef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

/// Storage policy of a table. Hash keys are unqualified column names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionDef {
    MasterOnly,
    #[default]
    Random,
    Hash(Vec<String>),
    Replicated,
}

/// A plan node: the operator fields and the tag `op` sit next to `inputs`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanDef {
    #[serde(flatten)]
    pub operator: OperatorDef,
    #[serde(default)]
    pub inputs: Vec<PlanDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperatorDef {
    Scan {
        table: String,
        #[serde(default)]
        dynamic: bool,
    },
    IndexScan {
        table: String,
        index: String,
        predicate: ExprDef,
    },
    HashJoin {
        join_type: String,
        outer_keys: Vec<String>,
        inner_keys: Vec<String>,
    },
    NestedLoopJoin {
        join_type: String,
        condition: ExprDef,
    },
    Aggregate {
        stage: String,
        group_by: Vec<String>,
        #[serde(default)]
        minimal_group_by: Vec<String>,
        #[serde(default)]
        distinct: Vec<String>,
        aggr: Vec<ColumnDef>,
    },
    Projection {
        exprs: Vec<ExprDef>,
    },
    Split {
        delete: Vec<String>,
        insert: Vec<String>,
        action: String,
    },
    Sort {
        order: Vec<OrderingDef>,
    },
    Spool,
    Gather {
        location: SingletonLocation,
    },
    GatherMerge {
        order: Vec<OrderingDef>,
    },
    Broadcast,
    Redistribute {
        keys: Vec<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprDef {
    Column(String),
    Outer { name: String, data_type: DataType },
    Literal(i64),
    Random,
    Binary {
        left: Box<ExprDef>,
        op: BinaryOpDef,
        right: Box<ExprDef>,
    },
    Alias { expr: Box<ExprDef>, name: String },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOpDef {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderingDef {
    pub column: String,
    #[serde(default = "default_true")]
    pub asc: bool,
    #[serde(default)]
    pub nulls_first: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequiredDef {
    #[serde(default)]
    pub distribution: RequiredDistributionDef,
    #[serde(default)]
    pub order: Vec<OrderingDef>,
    #[serde(default)]
    pub rewindable: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredDistributionDef {
    #[default]
    Any,
    Singleton(SingletonLocation),
    Replicated,
    Hashed {
        keys: Vec<String>,
        #[serde(default = "default_true")]
        nulls_colocated: bool,
        #[serde(default)]
        duplicate_sensitive: bool,
    },
}

fn default_true() -> bool {
    true
}
