//! Query translation from docmodel's AST to MongoDB query syntax.
//!
//! This module translates abstract query expressions, sorts and collations into the
//! BSON documents and driver options the MongoDB query engine executes.

use bson::{Bson, Document, doc};
use mongodb::options::{Collation as MongoCollation, CollationStrength, FindOptions};

use docmodel_core::{
    error::{OdmError, OdmResult},
    query::{Collation, Expr, FieldOp, Query, QueryVisitor},
};


/// Translates query expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// The filter document for an optional expression; matches everything when absent.
    pub fn filter(expr: Option<&Expr>) -> OdmResult<Document> {
        match expr {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }

    /// Driver options carrying the projection, sort keys, paging and collation of `query`.
    pub fn find_options(query: &Query) -> FindOptions {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        options.skip = query.skip;
        if !query.sort.is_empty() {
            options.sort = Some(
                query
                    .sort
                    .iter()
                    .map(|sort| (sort.field.clone(), Bson::Int32(sort.direction.as_i32())))
                    .collect()
            );
        }
        options.projection = query
            .projection
            .as_ref()
            .map(|projection| projection.to_document());
        options.collation = query.collation.as_ref().map(collation);

        options
    }
}

/// Converts a collation into the driver's form.
pub(crate) fn collation(collation: &Collation) -> MongoCollation {
    let strength = collation.strength.map(|strength| match strength {
        0 | 1 => CollationStrength::Primary,
        2 => CollationStrength::Secondary,
        3 => CollationStrength::Tertiary,
        4 => CollationStrength::Quaternary,
        _ => CollationStrength::Identical,
    });

    MongoCollation::builder()
        .locale(collation.locale.clone())
        .strength(strength)
        .case_level(collation.case_level)
        .build()
}

/// Escapes regular expression metacharacters so user strings match literally.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for ch in value.chars() {
        if "\\^$.|?*+()[]{}".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

fn as_list(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        other => Bson::Array(vec![other.clone()]),
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = OdmError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // $not only applies to operator expressions, $nor negates whole filters
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": escape(s) },
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$elemMatch": { "$eq": other } },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": escape(s) } },
                    other => doc! { "$nin": as_list(other) },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", escape(s)) },
                    _ => return Err(OdmError::Backend("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", escape(s)) },
                    _ => return Err(OdmError::Backend("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => doc! { "$in": as_list(value) },
                FieldOp::NoneOf => doc! { "$nin": as_list(value) },
            }
        })
    }
}
