//! Query specification model.
//!
//! A [`QuerySpec`] accumulates clauses between executions. Compiling it
//! for a [`CompileMode`] yields a [`CompiledQuery`]: a flat list of
//! [`QueryStep`]s in a fixed order (eager-load, AND, OR, IN, ORDER BY,
//! scopes, limit) that storage backends apply.

pub mod clause;
pub mod compiled;
pub mod conditions;
pub mod spec;

pub use clause::{
    Direction, FilterClause, InClause, Operator, OrderSpec, RowLimit, ScopeInvocation,
};
pub use compiled::{CompileMode, CompiledQuery, QueryStep, StepKind};
pub use conditions::{ConditionTuple, Conditions, ORDER_BY_PARAM, RequestParams};
pub use spec::{QuerySpec, ResetPolicy, ScopeSet};
