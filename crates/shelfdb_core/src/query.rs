//! Query engine.
//!
//! Queries stream a collection in primary key order, keep the records that
//! pass `equals` and `filter`, then order and paginate them:
//!
//! - Without `sort` or `order_by`, `offset` and `limit` apply while
//!   scanning and the scan stops once `limit` records are collected.
//! - With either, the whole matching set is collected, stably sorted, and
//!   then sliced to `[offset, offset + limit)`.
//!
//! An explicit `sort` comparator takes precedence over `order_by`.

use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::schema::CollectionSchema;
use shelfdb_codec::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// A record predicate.
pub type Filter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// A record comparator.
pub type Comparator = Arc<dyn Fn(&Record, &Record) -> Ordering + Send + Sync>;

/// Sort direction for [`OrderBy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "asc"),
            Direction::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Asc),
            "desc" | "descending" => Ok(Direction::Desc),
            other => Err(CoreError::query(format!("unknown sort direction '{other}'"))),
        }
    }
}

/// Declarative ordering on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Field to order by.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Compares two records on the field. Missing fields count as null.
    #[must_use]
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let left = a.get(&self.field).unwrap_or(&NULL);
        let right = b.get(&self.field).unwrap_or(&NULL);
        match self.direction {
            Direction::Asc => left.cmp(right),
            Direction::Desc => left.cmp(right).reverse(),
        }
    }
}

/// Query options.
///
/// ```rust
/// use shelfdb_core::{Direction, Query};
///
/// let adults = Query::new()
///     .filter(|user| user.get_i64("age").is_some_and(|age| age >= 18))
///     .order_by("age", Direction::Desc)
///     .limit(10);
/// ```
#[derive(Clone, Default)]
pub struct Query {
    equals: BTreeMap<String, Value>,
    filter: Option<Filter>,
    sort: Option<Comparator>,
    order_by: Option<OrderBy>,
    offset: usize,
    limit: Option<usize>,
}

impl Query {
    /// Creates a query that returns every record in key order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps records whose `field` equals `value`. Repeated calls AND
    /// together; a missing field equals null.
    #[must_use]
    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Keeps records for which `predicate` returns true.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }

    /// Orders results with a comparator. Wins over [`order_by`](Self::order_by).
    #[must_use]
    pub fn sort<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&Record, &Record) -> Ordering + Send + Sync + 'static,
    {
        self.sort = Some(Arc::new(comparator));
        self
    }

    /// Orders results by one declared field. Ties keep key order.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns at most `limit` results. Must be positive.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The equality constraints.
    #[must_use]
    pub fn equality(&self) -> &BTreeMap<String, Value> {
        &self.equals
    }

    /// The declarative ordering, if any.
    #[must_use]
    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    fn is_ordered(&self) -> bool {
        self.sort.is_some() || self.order_by.is_some()
    }

    fn matches(&self, record: &Record) -> bool {
        self.equals
            .iter()
            .all(|(field, value)| record.get(field).unwrap_or(&NULL) == value)
            && self.filter.as_ref().map_or(true, |keep| keep(record))
    }

    fn validate(&self, schema: &CollectionSchema) -> CoreResult<()> {
        if self.limit == Some(0) {
            return Err(CoreError::query("limit must be positive"));
        }
        if let Some(order) = &self.order_by {
            if schema.field(&order.field).is_none() {
                return Err(CoreError::query(format!(
                    "cannot order by '{}': not a field of collection '{}'",
                    order.field,
                    schema.name()
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("equals", &self.equals)
            .field("filter", &self.filter.is_some())
            .field("sort", &self.sort.is_some())
            .field("order_by", &self.order_by)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

/// Accumulates matches, paginating on the fly when no order is requested.
struct Collector {
    paginate: bool,
    offset: usize,
    limit: usize,
    skipped: usize,
    records: Vec<Record>,
}

impl Collector {
    /// Takes one match. Returns false once no more are wanted.
    fn offer(&mut self, record: Record) -> bool {
        if self.paginate && self.skipped < self.offset {
            self.skipped += 1;
            return true;
        }
        self.records.push(record);
        !(self.paginate && self.records.len() >= self.limit)
    }

    fn finish(self, query: &Query) -> Vec<Record> {
        if self.paginate {
            return self.records;
        }
        let mut records = self.records;
        if let Some(sort) = &query.sort {
            records.sort_by(|a, b| sort(a, b));
        } else if let Some(order) = &query.order_by {
            records.sort_by(|a, b| order.compare(a, b));
        }
        records
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

/// Runs `query` over `collection` inside `ctx`.
///
/// # Errors
///
/// Fails with `Query` if the collection is not in the context or the
/// options are malformed.
pub fn scan(ctx: &mut Context<'_>, collection: &str, query: &Query) -> CoreResult<Vec<Record>> {
    let schema = ctx.schema_of(collection)?;
    if let Err(err) = query.validate(schema) {
        ctx.fail(&err);
        return Err(err);
    }

    let mut collector = Collector {
        paginate: !query.is_ordered(),
        offset: query.offset,
        limit: query.limit.unwrap_or(usize::MAX),
        skipped: 0,
        records: Vec::new(),
    };

    // Null and missing values are never indexed, so only a non-null
    // equality can be answered from an index.
    let indexed_equality = if ctx.engine().config().use_indexes {
        query
            .equals
            .iter()
            .find(|(field, value)| !value.is_null() && schema.is_indexed(field))
    } else {
        None
    };
    let candidates = match indexed_equality {
        Some((field, value)) => ctx.index_lookup(collection, field, value)?,
        None => None,
    };

    let mut visited = 0usize;
    let used_index = candidates.is_some();
    match candidates {
        Some(keys) => {
            for key in keys {
                let Some(record) = ctx.get(collection, &key)? else {
                    continue;
                };
                visited += 1;
                if query.matches(&record) && !collector.offer(record) {
                    break;
                }
            }
        }
        None => {
            for record in ctx.open_scan(collection)? {
                let record = record?;
                visited += 1;
                if query.matches(&record) && !collector.offer(record) {
                    break;
                }
            }
        }
    }

    let matched = collector.records.len();
    let records = collector.finish(query);
    tracing::trace!(
        collection,
        visited,
        matched,
        returned = records.len(),
        used_index,
        "query finished"
    );
    Ok(records)
}
