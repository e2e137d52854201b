//! Grouped aggregation.
//!
//! Computes one aggregate over a single column, optionally grouped by another
//! column. Int columns support every function; string columns only `COUNT`.
//! The whole child is consumed when the operator is opened.

use crate::access::{DataType, TdItem, Tuple, TupleDesc, Value};
use crate::error::{DbError, Result};
use crate::executor::{OpIterator, OpState};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Count => "COUNT",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
        }
    }

    fn supports(&self, data_type: DataType) -> bool {
        data_type == DataType::Int32 || *self == AggregateOp::Count
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running state of one group.
#[derive(Debug, Clone, Default)]
struct GroupState {
    count: i32,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl GroupState {
    fn update(&mut self, value: &Value) {
        self.count += 1;
        if let Value::Int32(n) = *value {
            self.sum += i64::from(n);
            self.min = Some(self.min.map_or(n, |m| m.min(n)));
            self.max = Some(self.max.map_or(n, |m| m.max(n)));
        }
    }

    fn finish(&self, op: AggregateOp) -> i32 {
        match op {
            AggregateOp::Count => self.count,
            // wraps like 32-bit arithmetic
            AggregateOp::Sum => self.sum as i32,
            AggregateOp::Avg => (self.sum / i64::from(self.count.max(1))) as i32,
            AggregateOp::Min => self.min.unwrap_or_default(),
            AggregateOp::Max => self.max.unwrap_or_default(),
        }
    }
}

/// Folds tuples into per-group states, keeping groups in first-seen order.
#[derive(Debug)]
pub struct Aggregator {
    group_field: Option<usize>,
    agg_field: usize,
    op: AggregateOp,
    index: HashMap<Option<Value>, usize>,
    groups: Vec<(Option<Value>, GroupState)>,
}

impl Aggregator {
    pub fn new(group_field: Option<usize>, agg_field: usize, op: AggregateOp) -> Self {
        Self {
            group_field,
            agg_field,
            op,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    pub fn merge(&mut self, tuple: &Tuple) -> Result<()> {
        let key = match self.group_field {
            Some(field) => Some(tuple.value(field)?.clone()),
            None => None,
        };
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push((key.clone(), GroupState::default()));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].1.update(tuple.value(self.agg_field)?);
        Ok(())
    }

    /// One tuple per group: `(group, aggregate)`, or `(aggregate)` without
    /// grouping.
    pub fn results(&self, desc: &Arc<TupleDesc>) -> Result<Vec<Tuple>> {
        self.groups
            .iter()
            .map(|(key, state)| {
                let mut values: Vec<Value> = key.iter().cloned().collect();
                values.push(Value::Int32(state.finish(self.op)));
                Tuple::new(Arc::clone(desc), values)
            })
            .collect()
    }
}

pub struct Aggregate {
    child: Box<dyn OpIterator>,
    group_field: Option<usize>,
    agg_field: usize,
    op: AggregateOp,
    desc: Arc<TupleDesc>,
    results: Vec<Tuple>,
    pos: usize,
    state: OpState,
}

impl Aggregate {
    /// Aggregates `agg_field` of the child's tuples with `op`, grouped by
    /// `group_field` when given.
    ///
    /// Fails with `Unsupported` for anything but `COUNT` over a string column.
    pub fn new(
        child: Box<dyn OpIterator>,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self> {
        let child_desc = child.tuple_desc();
        let agg_type = child_desc.field_type(agg_field)?;
        if !op.supports(agg_type) {
            return Err(DbError::Unsupported(format!(
                "{} over a {} column",
                op, agg_type
            )));
        }

        let agg_name = format!(
            "{}({})",
            op.name(),
            child_desc.field_name(agg_field)?.unwrap_or("null")
        );
        let mut items = Vec::with_capacity(2);
        if let Some(field) = group_field {
            items.push(TdItem::new(
                child_desc.field_type(field)?,
                child_desc.field_name(field)?.map(str::to_string),
            ));
        }
        items.push(TdItem::new(DataType::Int32, Some(agg_name)));

        Ok(Self {
            child,
            group_field,
            agg_field,
            op,
            desc: Arc::new(TupleDesc::new(items)),
            results: Vec::new(),
            pos: 0,
            state: OpState::Closed,
        })
    }

    pub fn group_field(&self) -> Option<usize> {
        self.group_field
    }

    pub fn aggregate_field(&self) -> usize {
        self.agg_field
    }

    pub fn aggregate_op(&self) -> AggregateOp {
        self.op
    }

    /// Name of the grouping column in the output.
    pub fn group_field_name(&self) -> Option<&str> {
        self.group_field
            .and_then(|_| self.desc.field_name(0).ok().flatten())
    }

    /// Name of the aggregate column in the output.
    pub fn aggregate_field_name(&self) -> Option<&str> {
        let index = self.desc.num_fields() - 1;
        self.desc.field_name(index).ok().flatten()
    }
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> Result<()> {
        let mut aggregator = Aggregator::new(self.group_field, self.agg_field, self.op);
        self.child.open()?;
        while self.child.has_next()? {
            aggregator.merge(&self.child.next()?)?;
        }
        self.child.close();

        self.results = aggregator.results(&self.desc)?;
        self.pos = 0;
        self.state = OpState::Open;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.ensure_open()?;
        Ok(self.pos < self.results.len())
    }

    fn next(&mut self) -> Result<Tuple> {
        self.state.ensure_open()?;
        let tuple = self
            .results
            .get(self.pos)
            .cloned()
            .ok_or(DbError::NoSuchElement)?;
        self.pos += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.results.clear();
        self.pos = 0;
        self.state = OpState::Closed;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
