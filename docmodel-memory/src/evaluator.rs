//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for query expressions, enabling filtering,
//! sorting and projection of BSON documents without a database. Field names may be dotted
//! paths into embedded documents and arrays.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docmodel_core::{
    error::{OdmError, OdmResult},
    query::{Expr, FieldOp, Projection, QueryVisitor, Sort, SortDirection},
};


/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `Int32(1)` and `Double(1.0)` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    /// All integers and floats normalized to f64
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> Comparable<'a> {
    /// Cross-type ordering position, following the order document stores sort mixed
    /// types in.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}


/// Resolves a dotted path against a document. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Sets `value` at a dotted path, creating embedded documents along the way.
///
/// Returns an error when the path crosses a value that is neither a document nor an array.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> OdmResult<()> {
    let Some((head, rest)) = path.split_once('.') else {
        document.insert(path, value);
        return Ok(());
    };

    if !document.contains_key(head) {
        document.insert(head, Document::new());
    }

    match document.get_mut(head) {
        Some(Bson::Document(child)) => set_path(child, rest, value),
        Some(Bson::Array(items)) => set_in_array(items, rest, value, path),
        _ => Err(OdmError::InvalidDocument(format!(
            "cannot set {path}: {head} is not an embedded document"
        ))),
    }
}

fn set_in_array(items: &mut [Bson], path: &str, value: Bson, full: &str) -> OdmResult<()> {
    let (index, rest) = match path.split_once('.') {
        Some((index, rest)) => (index, Some(rest)),
        None => (path, None),
    };

    let slot = index
        .parse::<usize>()
        .ok()
        .and_then(|index| items.get_mut(index))
        .ok_or_else(|| OdmError::InvalidDocument(format!("cannot set {full}: no array element {index}")))?;

    match (rest, slot) {
        (None, slot) => {
            *slot = value;
            Ok(())
        },
        (Some(rest), Bson::Document(child)) => set_path(child, rest, value),
        (Some(_), _) => Err(OdmError::InvalidDocument(format!(
            "cannot set {full}: array element {index} is not an embedded document"
        ))),
    }
}

/// Removes the value at a dotted path, if present.
pub(crate) fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        },
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        },
    }
}

/// Applies a projection. Inclusions always keep `_id`.
pub(crate) fn project(document: Document, projection: &Projection) -> Document {
    match projection {
        Projection::Include(fields) => {
            let mut projected = Document::new();

            if let Some(id) = document.get("_id") {
                projected.insert("_id", id.clone());
            }

            for field in fields {
                if let Some(value) = lookup(&document, field) {
                    // Only reachable through documents, so the path is always settable
                    let _ = set_path(&mut projected, field, value.clone());
                }
            }

            projected
        },
        Projection::Exclude(fields) => {
            let mut projected = document;

            for field in fields {
                remove_path(&mut projected, field);
            }

            projected
        },
    }
}


/// Evaluates filter expressions and sort keys against documents.
///
/// With `fold_case` set, string equality and ordering ignore case.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
    fold_case: bool,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document, fold_case: bool) -> Self {
        Self { document, fold_case }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> OdmResult<bool> {
        self.visit_expr(expr)
    }

    pub fn matches(document: &Document, filter: Option<&Expr>, fold_case: bool) -> bool {
        match filter {
            Some(expr) => DocumentEvaluator::new(document, fold_case)
                .evaluate(expr)
                .unwrap_or(false),
            None => true,
        }
    }

    /// Orders two documents by the given sort keys, most significant first.
    pub fn compare(left: &Document, right: &Document, sort: &[Sort], fold_case: bool) -> Ordering {
        for key in sort {
            let a = lookup(left, &key.field)
                .map(Comparable::from)
                .unwrap_or(Comparable::Null);
            let b = lookup(right, &key.field)
                .map(Comparable::from)
                .unwrap_or(Comparable::Null);

            let ordering = order(&a, &b, fold_case)
                .unwrap_or_else(|| a.rank().cmp(&b.rank()));

            let ordering = match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }

    fn equals(&self, left: &Comparable, right: &Comparable) -> bool {
        match (left, right) {
            (Comparable::String(a), Comparable::String(b)) if self.fold_case => {
                a.to_lowercase() == b.to_lowercase()
            },
            _ => left == right,
        }
    }

    /// Equality where an array field matches when any of its elements does.
    fn matches_value(&self, field: &Comparable, value: &Comparable) -> bool {
        if self.equals(field, value) {
            return true;
        }

        match (field, value) {
            (Comparable::Array(items), value) if !matches!(value, Comparable::Array(_)) => {
                items.iter().any(|item| self.equals(item, value))
            },
            _ => false,
        }
    }

    fn any_of(&self, field: &Comparable, values: &Comparable) -> bool {
        match values {
            Comparable::Array(values) => values
                .iter()
                .any(|value| self.matches_value(field, value)),
            single_value => self.matches_value(field, single_value),
        }
    }

    fn strings(&self, field: &Comparable, value: &Comparable) -> Option<(String, String)> {
        match (field, value) {
            (Comparable::String(left), Comparable::String(right)) if self.fold_case => {
                Some((left.to_lowercase(), right.to_lowercase()))
            },
            (Comparable::String(left), Comparable::String(right)) => {
                Some((left.to_string(), right.to_string()))
            },
            _ => None,
        }
    }

    fn contains(&self, field: &Comparable, value: &Comparable) -> bool {
        match field {
            Comparable::Array(items) => items
                .iter()
                .any(|item| self.equals(item, value)),
            _ => self
                .strings(field, value)
                .is_some_and(|(left, right)| left.contains(&right)),
        }
    }
}

fn order(left: &Comparable, right: &Comparable, fold_case: bool) -> Option<Ordering> {
    match (left, right) {
        (Comparable::String(a), Comparable::String(b)) if fold_case => {
            Some(a.to_lowercase().cmp(&b.to_lowercase()))
        },
        _ => left.partial_cmp(right),
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = OdmError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let expected = Comparable::from(value);

        let Some(field_value) = lookup(self.document, field) else {
            // A missing field behaves like null for equality and never matches a comparison
            return Ok(match op {
                FieldOp::Eq => expected == Comparable::Null,
                FieldOp::Ne => expected != Comparable::Null,
                FieldOp::NotContains | FieldOp::NoneOf => true,
                _ => false,
            });
        };
        let actual = Comparable::from(field_value);

        Ok(match op {
            FieldOp::Eq => self.matches_value(&actual, &expected),
            FieldOp::Ne => !self.matches_value(&actual, &expected),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match order(&actual, &expected, self.fold_case) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            },
            FieldOp::Contains => self.contains(&actual, &expected),
            FieldOp::NotContains => !self.contains(&actual, &expected),
            FieldOp::StartsWith => self
                .strings(&actual, &expected)
                .is_some_and(|(left, right)| left.starts_with(&right)),
            FieldOp::EndsWith => self
                .strings(&actual, &expected)
                .is_some_and(|(left, right)| left.ends_with(&right)),
            FieldOp::AnyOf => self.any_of(&actual, &expected),
            FieldOp::NoneOf => !self.any_of(&actual, &expected),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::Filter;

    fn user() -> Document {
        doc! {
            "_id": ObjectId::new(),
            "fn": "Ada",
            "age": 36,
            "tags": ["math", "poetry"],
            "address": { "city": "London", "zip": "W1" },
        }
    }

    fn eval(document: &Document, expr: Expr) -> bool {
        DocumentEvaluator::new(document, false).evaluate(&expr).unwrap()
    }

    #[test]
    fn test_dotted_paths() {
        let document = user();

        assert!(eval(&document, Filter::eq("address.city", "London")));
        assert!(eval(&document, Filter::eq("tags.1", "poetry")));
        assert!(eval(&document, Filter::exists("address.zip")));
        assert!(!eval(&document, Filter::exists("address.street")));
    }

    #[test]
    fn test_numbers_compare_across_types() {
        let document = user();

        assert!(eval(&document, Filter::eq("age", 36.0)));
        assert!(eval(&document, Filter::gte("age", 36_i64)));
        assert!(!eval(&document, Filter::lt("age", 30)));
    }

    #[test]
    fn test_object_id_equality() {
        let document = user();
        let id = document.get_object_id("_id").unwrap();

        assert!(eval(&document, Filter::eq("_id", id)));
        assert!(!eval(&document, Filter::eq("_id", ObjectId::new())));
    }

    #[test]
    fn test_array_membership() {
        let document = user();

        assert!(eval(&document, Filter::eq("tags", "math")));
        assert!(eval(&document, Filter::any_of("fn", vec!["Ada", "Grace"])));
        assert!(eval(&document, Filter::none_of("tags", vec!["chess"])));
        assert!(eval(&document, Filter::contains("tags", "poetry")));
    }

    #[test]
    fn test_missing_field() {
        let document = user();

        assert!(eval(&document, Filter::ne("nickname", "Countess")));
        assert!(!eval(&document, Filter::eq("nickname", "Countess")));
        assert!(!eval(&document, Filter::gt("nickname", 1)));
    }

    #[test]
    fn test_fold_case() {
        let document = user();
        let expr = Filter::eq("fn", "ADA");

        assert!(!DocumentEvaluator::new(&document, false).evaluate(&expr).unwrap());
        assert!(DocumentEvaluator::new(&document, true).evaluate(&expr).unwrap());
        assert!(DocumentEvaluator::new(&document, true)
            .evaluate(&Filter::starts_with("fn", "a"))
            .unwrap());
    }

    #[test]
    fn test_sort_multiple_keys() {
        let sort = vec![
            Sort { field: "ln".into(), direction: SortDirection::Asc },
            Sort { field: "fn".into(), direction: SortDirection::Desc },
        ];
        let a = doc! { "ln": "Hopper", "fn": "Grace" };
        let b = doc! { "ln": "Hopper", "fn": "Alan" };
        let c = doc! { "ln": "Byron", "fn": "Ada" };

        assert_eq!(DocumentEvaluator::compare(&a, &b, &sort, false), Ordering::Less);
        assert_eq!(DocumentEvaluator::compare(&c, &a, &sort, false), Ordering::Less);
    }

    #[test]
    fn test_sort_places_missing_first() {
        let sort = vec![Sort { field: "age".into(), direction: SortDirection::Asc }];

        assert_eq!(
            DocumentEvaluator::compare(&doc! {}, &doc! { "age": 1 }, &sort, false),
            Ordering::Less
        );
    }

    #[test]
    fn test_set_and_remove_path() {
        let mut document = user();

        set_path(&mut document, "address.city", Bson::from("Paris")).unwrap();
        set_path(&mut document, "meta.visits", Bson::from(3)).unwrap();
        set_path(&mut document, "tags.0", Bson::from("logic")).unwrap();
        remove_path(&mut document, "address.zip");

        assert_eq!(lookup(&document, "address.city"), Some(&Bson::from("Paris")));
        assert_eq!(lookup(&document, "meta.visits"), Some(&Bson::from(3)));
        assert_eq!(lookup(&document, "tags.0"), Some(&Bson::from("logic")));
        assert_eq!(lookup(&document, "address.zip"), None);
        assert!(set_path(&mut document, "fn.first", Bson::from("x")).is_err());
    }

    #[test]
    fn test_projection() {
        let document = user();

        let included = project(document.clone(), &Projection::include(["fn", "address.city"]));
        assert_eq!(included.keys().collect::<Vec<_>>(), vec!["_id", "fn", "address"]);
        assert_eq!(lookup(&included, "address.zip"), None);

        let excluded = project(document, &Projection::exclude(["tags"]));
        assert!(!excluded.contains_key("tags"));
        assert!(excluded.contains_key("fn"));
    }
}
