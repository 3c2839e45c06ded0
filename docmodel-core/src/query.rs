//! Query construction for persistence reads.
//!
//! Filters are a small expression tree ([`Expr`]) built with the [`Filter`] helpers and
//! translated by each backend through a [`QueryVisitor`]. Field names in filters,
//! projections and sorts are *external* (database) names; they pass through to the store
//! untouched.
//!
//! ```ignore
//! use docmodel::query::{Filter, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("ln", "Lovelace").and(Filter::gte("age", 18)))
//!     .sort("fn", SortDirection::Asc)
//!     .skip(20)
//!     .limit(10)
//!     .build();
//! ```

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{error::OdmError, identifier::{Identifier, NATIVE_ID_FIELD}};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// The `1` / `-1` form stores use in sort documents.
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// String or array contains value.
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    /// Field equals any of the values of an array.
    AnyOf,
    /// Field equals none of the values of an array.
    NoneOf,
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// All must match.
    And(Vec<Expr>),
    /// Any must match.
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// The field exists (`true`) or is missing (`false`).
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines with `other` using AND, flattening into an existing AND.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines with `other` using OR, flattening into an existing OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Constructors for filter expressions.
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    /// Matches the document carrying `id` under the native identifier key.
    pub fn id(id: &Identifier) -> Expr {
        Expr::field(NATIVE_ID_FIELD.to_string(), FieldOp::Eq, id.to_bson())
    }
}

/// Which fields a read returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only these fields, plus the identifier.
    Include(Vec<String>),
    /// Every field but these.
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include(fields.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Projection::Include(fields) | Projection::Exclude(fields) => fields,
        }
    }

    /// The `{ field: 1 }` / `{ field: 0 }` document form.
    pub fn to_document(&self) -> Document {
        let flag = match self {
            Projection::Include(_) => 1,
            Projection::Exclude(_) => 0,
        };

        self.fields()
            .iter()
            .map(|field| (field.clone(), Bson::Int32(flag)))
            .collect()
    }
}

/// String comparison rules for filters and sorts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collation {
    pub locale: String,
    /// Comparison level: 1 and 2 ignore case, 3 and above compare case.
    #[serde(default)]
    pub strength: Option<u32>,
    #[serde(default)]
    pub case_level: Option<bool>,
}

impl Collation {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            strength: None,
            case_level: None,
        }
    }

    pub fn strength(mut self, strength: u32) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn case_level(mut self, case_level: bool) -> Self {
        self.case_level = Some(case_level);
        self
    }

    /// Whether strings compare without regard to case.
    pub fn is_case_insensitive(&self) -> bool {
        self.strength.is_some_and(|strength| strength <= 2)
    }
}

/// A read against one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Expr>,
    pub projection: Option<Projection>,
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub collation: Option<Collation>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// A query with only a filter.
    pub fn filtered(filter: Expr) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn collation(mut self, collation: Collation) -> Self {
        self.query.collation = Some(collation);
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Translates an [`Expr`] tree into a backend's native form.
pub trait QueryVisitor {
    type Output;
    type Error: Into<OdmError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
