//! Syntax→Logical transformation: resolves a [`MetricExpr`]/[`BoolExpr`]
//! syntax tree against a [`SemanticModel`] into a typed [`LogicalExpr`].

use crate::dsl::ast::{ArithOp, BoolExpr, CmpOp, LiteralValue, MetricExpr};
use crate::logical::expr::{
    AggregateOp, ComparisonOp, LogicalExpr, LogicalOpKind, ScalarOpKind, SourceKind,
};
use crate::model::SemanticModel;
use crate::value::{DataType, Value};

/// The wildcard attribute name recognized as the sole argument to
/// `count(*)`.
pub const WILDCARD: &str = "*";

/// Options governing transformation of syntax nodes with no runtime
/// semantics yet. There is currently no syntax production that emits a
/// `Window`/`Transform` logical node (those are reachable only through
/// the programmatic IR-builder API), so `strict_mode` has no observable
/// effect today; it is threaded through so a future syntax extension can
/// honor it without changing the transform's signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformOptions {
    pub strict_mode: bool,
}

/// An error raised while resolving syntax against a semantic model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformationError {
    #[error("unknown attribute: {0:?}")]
    UnknownAttribute(String),

    #[error("unknown metric: {0:?}")]
    UnknownMetric(String),

    #[error("unknown function: {0:?}")]
    UnknownFunction(String),

    #[error("the wildcard attribute `*` is only permitted as the sole argument to `count`")]
    InvalidWildcardUsage,

    #[error("aggregate function {0:?} requires exactly one argument")]
    InvalidAggregateArity(String),

    #[error("`last_year` requires a metric reference as its first argument")]
    InvalidLastYearArgs,

    #[error("unsupported syntax construct rejected under strict mode")]
    UnsupportedSyntax,

    #[error("`having` comparisons must compare against a numeric literal")]
    NonNumericHavingLiteral,
}

fn aggregate_op(name: &str) -> Option<AggregateOp> {
    match name {
        "sum" => Some(AggregateOp::Sum),
        "avg" => Some(AggregateOp::Avg),
        "min" => Some(AggregateOp::Min),
        "max" => Some(AggregateOp::Max),
        "count" => Some(AggregateOp::Count),
        "count_distinct" => Some(AggregateOp::CountDistinct),
        _ => None,
    }
}

/// Resolve a `MetricExpr` in the context of a semantic model and an
/// optional base fact (the anchor table for bare attribute references)
/// into a `LogicalExpr`.
pub fn syntax_to_logical(
    expr: &MetricExpr,
    model: &SemanticModel,
    base_fact: Option<&str>,
    options: TransformOptions,
) -> Result<LogicalExpr, TransformationError> {
    let _ = options.strict_mode; // see TransformOptions doc comment
    match expr {
        MetricExpr::Literal(n) => Ok(LogicalExpr::constant_typed(
            Value::Number(*n),
            DataType::Number,
        )),

        MetricExpr::AttrRef(name) if name == WILDCARD => Err(TransformationError::InvalidWildcardUsage),

        MetricExpr::AttrRef(name) => {
            let attr = model
                .attribute(name)
                .ok_or_else(|| TransformationError::UnknownAttribute(name.clone()))?;
            let source_kind = if model.is_fact_table(&attr.table) {
                SourceKind::Fact
            } else {
                SourceKind::Dimension
            };
            Ok(LogicalExpr::AttributeRef {
                attribute_id: attr.name.clone(),
                physical_table: attr.table.clone(),
                physical_column: attr.column.clone(),
                source_kind,
                data_type: DataType::Unknown,
            })
        }

        MetricExpr::MetricRef(name) => {
            let metric = model
                .metric(name)
                .ok_or_else(|| TransformationError::UnknownMetric(name.clone()))?;
            Ok(LogicalExpr::MetricRef {
                metric_name: metric.name.clone(),
                base_fact: metric.base_fact.clone(),
                result_type: DataType::Number,
            })
        }

        MetricExpr::BinaryOp(op, l, r) => {
            let left = syntax_to_logical(&l.value, model, base_fact, options)?;
            let right = syntax_to_logical(&r.value, model, base_fact, options)?;
            let (scalar_op, result_type) = match op {
                ArithOp::Add => (ScalarOpKind::Add, DataType::Number),
                ArithOp::Sub => (ScalarOpKind::Sub, DataType::Number),
                ArithOp::Mul => (ScalarOpKind::Mul, DataType::Number),
                ArithOp::Div => (ScalarOpKind::Div, DataType::Decimal),
            };
            Ok(LogicalExpr::ScalarOp {
                op: scalar_op,
                left: Box::new(left),
                right: Box::new(right),
                result_type,
            })
        }

        MetricExpr::Call(name, args) => {
            if let Some(op) = aggregate_op(&name.value) {
                if args.is_empty() {
                    return Err(TransformationError::InvalidAggregateArity(name.value.clone()));
                }
                if args.len() > 1 {
                    return Err(TransformationError::InvalidAggregateArity(name.value.clone()));
                }
                let arg0 = &args[0].value;
                let input = if op == AggregateOp::Count && matches!(arg0, MetricExpr::AttrRef(n) if n == WILDCARD)
                {
                    LogicalExpr::AttributeRef {
                        attribute_id: WILDCARD.to_string(),
                        physical_table: WILDCARD.to_string(),
                        physical_column: WILDCARD.to_string(),
                        source_kind: SourceKind::Fact,
                        data_type: DataType::Unknown,
                    }
                } else {
                    syntax_to_logical(arg0, model, base_fact, options)?
                };
                LogicalExpr::aggregate(op, input, false, DataType::Number)
                    .map_err(|_| TransformationError::InvalidAggregateArity(name.value.clone()))
            } else if name.value == "last_year" {
                let arg0 = args
                    .first()
                    .map(|a| &a.value)
                    .ok_or(TransformationError::InvalidLastYearArgs)?;
                if !matches!(arg0, MetricExpr::MetricRef(_)) {
                    return Err(TransformationError::InvalidLastYearArgs);
                }
                let mut logical_args = Vec::new();
                for a in args {
                    logical_args.push(syntax_to_logical(&a.value, model, base_fact, options)?);
                }
                Ok(LogicalExpr::ScalarFunction {
                    func: "last_year".to_string(),
                    args: logical_args,
                    result_type: DataType::Number,
                })
            } else {
                Err(TransformationError::UnknownFunction(name.value.clone()))
            }
        }
    }
}

fn cmp_op(op: CmpOp) -> ComparisonOp {
    match op {
        CmpOp::Ge => ComparisonOp::Ge,
        CmpOp::Le => ComparisonOp::Le,
        CmpOp::Gt => ComparisonOp::Gt,
        CmpOp::Lt => ComparisonOp::Lt,
        CmpOp::Eq => ComparisonOp::Eq,
        CmpOp::Ne => ComparisonOp::Ne,
    }
}

fn literal_value(lit: &LiteralValue) -> Value {
    match lit {
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::Str(s.clone()),
        LiteralValue::Bool(b) => Value::Bool(*b),
    }
}

/// Resolve a `BoolExpr` (shared by `where:`/`having:`) into a predicate
/// `LogicalExpr`. Each leaf's identifier is first looked up as a metric,
/// falling back to an attribute, since `having:` leaves name metrics
/// while `where:` leaves name attributes and both share this grammar.
///
/// When `having_only` is set, every leaf's literal must be `Number`,
/// matching the having-expression restriction that `bool_expr` shares
/// structurally with `having_expr` but does not itself enforce.
pub fn transform_predicate(
    expr: &BoolExpr,
    model: &SemanticModel,
    base_fact: Option<&str>,
    having_only: bool,
) -> Result<LogicalExpr, TransformationError> {
    match expr {
        BoolExpr::Or(l, r) => {
            let left = transform_predicate(&l.value, model, base_fact, having_only)?;
            let right = transform_predicate(&r.value, model, base_fact, having_only)?;
            LogicalExpr::logical_op(LogicalOpKind::Or, vec![left, right])
                .map_err(|_| TransformationError::UnsupportedSyntax)
        }
        BoolExpr::And(l, r) => {
            let left = transform_predicate(&l.value, model, base_fact, having_only)?;
            let right = transform_predicate(&r.value, model, base_fact, having_only)?;
            LogicalExpr::logical_op(LogicalOpKind::And, vec![left, right])
                .map_err(|_| TransformationError::UnsupportedSyntax)
        }
        BoolExpr::Not(inner) => {
            let inner = transform_predicate(&inner.value, model, base_fact, having_only)?;
            LogicalExpr::logical_op(LogicalOpKind::Not, vec![inner])
                .map_err(|_| TransformationError::UnsupportedSyntax)
        }
        BoolExpr::Compare { ident, op, literal } => {
            if having_only && !matches!(literal.value, LiteralValue::Number(_)) {
                return Err(TransformationError::NonNumericHavingLiteral);
            }
            let left = if let Some(metric) = model.metric(&ident.value) {
                LogicalExpr::MetricRef {
                    metric_name: metric.name.clone(),
                    base_fact: metric.base_fact.clone(),
                    result_type: DataType::Number,
                }
            } else {
                syntax_to_logical(
                    &MetricExpr::AttrRef(ident.value.clone()),
                    model,
                    base_fact,
                    TransformOptions::default(),
                )?
            };
            let right = LogicalExpr::constant(literal_value(&literal.value));
            Ok(LogicalExpr::Comparison {
                op: cmp_op(*op),
                left: Box::new(left),
                right: Box::new(right),
            })
        }
    }
}
