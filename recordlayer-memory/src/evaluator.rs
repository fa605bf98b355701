//! Filter evaluation for in-memory document matching.
//!
//! This module evaluates operator-syntax filter documents (`$and`, `$or`,
//! `$eq`, `$gt`, `$in`, `$regex`, ...) against BSON documents, and provides
//! the field comparator used for sorting.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::Regex;

use recordlayer_core::error::{RecordStoreError, RecordStoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Normalizes all numeric types to f64 so mixed-width comparisons behave
/// the way the wire protocol does.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
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
                    .map(|(k, v)| {
                        let k: &str = k.as_ref();
                        (k, Comparable::from(v))
                    })
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
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted field path against nested sub-documents.
pub(crate) fn resolve_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => match document.get(head) {
            Some(Bson::Document(inner)) => resolve_path(inner, rest),
            _ => None,
        },
    }
}

/// Writes `value` at a dotted field path, creating intermediate
/// sub-documents as needed.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head.to_string(), Document::new());
            }
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Removes the value at a dotted field path, if present.
pub(crate) fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

/// Evaluates an operator-syntax filter against one document.
///
/// Top-level entries conjoin: every key must hold. `$and`/`$or` take arrays
/// of sub-filters; any other key names a field, holding either an operator
/// document or a literal for implicit equality.
pub(crate) fn matches(document: &Document, filter: &Document) -> RecordStoreResult<bool> {
    for (key, value) in filter {
        let key: &str = key.as_ref();
        let holds = match key {
            "$and" => {
                let mut all = true;
                for branch in branches(key, value)? {
                    if !matches(document, branch)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for branch in branches(key, value)? {
                    if matches(document, branch)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            field => field_matches(document, field, value)?,
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compares two documents under a multi-field sort specification.
///
/// Fields are consulted in the specification's insertion order; a negative
/// direction reverses that field. Incomparable values rank equal.
pub(crate) fn compare_documents(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let field: &str = field.as_ref();
        let lhs = resolve_path(left, field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let rhs = resolve_path(right, field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);

        let mut ordering = lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal);
        if direction_of(direction) < 0 {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn direction_of(direction: &Bson) -> i64 {
    match direction {
        Bson::Int32(value) => *value as i64,
        Bson::Int64(value) => *value,
        Bson::Double(value) => *value as i64,
        _ => 1,
    }
}

fn branches<'a>(operator: &str, value: &'a Bson) -> RecordStoreResult<Vec<&'a Document>> {
    let array = value.as_array().ok_or_else(|| {
        RecordStoreError::InvalidArgument(format!("'{operator}' expects an array of filters"))
    })?;
    array
        .iter()
        .map(|branch| {
            branch.as_document().ok_or_else(|| {
                RecordStoreError::InvalidArgument(format!(
                    "'{operator}' branches must be documents"
                ))
            })
        })
        .collect()
}

fn field_matches(document: &Document, field: &str, spec: &Bson) -> RecordStoreResult<bool> {
    if let Bson::Document(operators) = spec {
        let has_operators = operators.iter().any(|(key, _)| {
            let key: &str = key.as_ref();
            key.starts_with('$')
        });
        if has_operators {
            for (operator, operand) in operators {
                let operator: &str = operator.as_ref();
                if operator == "$options" {
                    continue; // consumed alongside $regex
                }
                if !operator_matches(document, field, operator, operand, operators)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    Ok(equals(resolve_path(document, field), spec))
}

fn equals(actual: Option<&Bson>, expected: &Bson) -> bool {
    let actual = actual.map(Comparable::from).unwrap_or(Comparable::Null);
    actual == Comparable::from(expected)
}

fn operator_matches(
    document: &Document,
    field: &str,
    operator: &str,
    operand: &Bson,
    spec: &Document,
) -> RecordStoreResult<bool> {
    let actual = resolve_path(document, field);
    match operator {
        "$eq" => Ok(equals(actual, operand)),
        "$ne" => Ok(!equals(actual, operand)),
        "$gt" | "$gte" | "$lt" | "$lte" => {
            let Some(actual) = actual else {
                return Ok(false);
            };
            match Comparable::from(actual).partial_cmp(&Comparable::from(operand)) {
                Some(ordering) => Ok(match operator {
                    "$gt" => ordering == Ordering::Greater,
                    "$gte" => ordering != Ordering::Less,
                    "$lt" => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }),
                None => Ok(false),
            }
        }
        "$in" => Ok(contained_in(actual, operator, operand)?),
        "$nin" => Ok(!contained_in(actual, operator, operand)?),
        "$exists" => {
            let should_exist = operand.as_bool().unwrap_or(true);
            Ok(actual.is_some() == should_exist)
        }
        "$regex" => regex_matches(actual, operand, spec),
        "$near" => Err(RecordStoreError::Backend(
            "geospatial operators are not supported by the in-memory driver".to_string(),
        )),
        other => Err(RecordStoreError::Backend(format!(
            "unsupported filter operator '{other}'"
        ))),
    }
}

/// `$in` membership. An array field matches when any of its elements is
/// listed; a missing field matches only a listed null.
fn contained_in(
    actual: Option<&Bson>,
    operator: &str,
    operand: &Bson,
) -> RecordStoreResult<bool> {
    let candidates = operand.as_array().ok_or_else(|| {
        RecordStoreError::InvalidArgument(format!("'{operator}' expects an array of values"))
    })?;
    match actual {
        Some(Bson::Array(elements)) => Ok(elements.iter().any(|element| {
            candidates
                .iter()
                .any(|candidate| Comparable::from(element) == Comparable::from(candidate))
        })),
        other => {
            let actual = other.map(Comparable::from).unwrap_or(Comparable::Null);
            Ok(candidates
                .iter()
                .any(|candidate| actual == Comparable::from(candidate)))
        }
    }
}

fn regex_matches(
    actual: Option<&Bson>,
    operand: &Bson,
    spec: &Document,
) -> RecordStoreResult<bool> {
    let raw = operand.as_str().ok_or_else(|| {
        RecordStoreError::InvalidArgument("'$regex' expects a string pattern".to_string())
    })?;
    let options = match spec.get("$options") {
        Some(Bson::String(options)) => options.as_str(),
        _ => "",
    };
    let pattern = if options.contains('i') {
        format!("(?i){raw}")
    } else {
        raw.to_string()
    };
    let regex = Regex::new(&pattern).map_err(|err| {
        RecordStoreError::InvalidArgument(format!("invalid regex pattern '{raw}': {err}"))
    })?;
    match actual {
        Some(Bson::String(value)) => Ok(regex.is_match(value)),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn implicit_equality_and_operator_documents_agree() {
        let document = doc! { "status": "active", "duration": 120 };
        assert!(matches(&document, &doc! { "status": "active" }).unwrap());
        assert!(matches(&document, &doc! { "status": { "$eq": "active" } }).unwrap());
        assert!(!matches(&document, &doc! { "status": "closed" }).unwrap());
    }

    #[test]
    fn mixed_width_numbers_compare_by_value() {
        let document = doc! { "duration": 120_i64 };
        assert!(matches(&document, &doc! { "duration": { "$eq": 120 } }).unwrap());
        assert!(matches(&document, &doc! { "duration": { "$gt": 119.5 } }).unwrap());
        assert!(matches(&document, &doc! { "duration": { "$lte": 120 } }).unwrap());
        assert!(!matches(&document, &doc! { "duration": { "$lt": 120 } }).unwrap());
    }

    #[test]
    fn missing_fields_fail_ordering_but_satisfy_ne() {
        let document = doc! { "status": "active" };
        assert!(!matches(&document, &doc! { "duration": { "$gt": 0 } }).unwrap());
        assert!(matches(&document, &doc! { "duration": { "$ne": 5 } }).unwrap());
        assert!(matches(&document, &doc! { "duration": { "$eq": Bson::Null } }).unwrap());
    }

    #[test]
    fn membership_consults_array_elements() {
        let document = doc! { "tags": ["voip", "sip"], "status": "active" };
        assert!(matches(&document, &doc! { "tags": { "$in": ["sip"] } }).unwrap());
        assert!(!matches(&document, &doc! { "tags": { "$in": ["rtp"] } }).unwrap());
        assert!(matches(&document, &doc! { "status": { "$in": ["active", "held"] } }).unwrap());
        assert!(matches(&document, &doc! { "status": { "$nin": ["closed"] } }).unwrap());
    }

    #[test]
    fn existence_checks_both_polarities() {
        let document = doc! { "status": "active" };
        assert!(matches(&document, &doc! { "status": { "$exists": true } }).unwrap());
        assert!(matches(&document, &doc! { "duration": { "$exists": false } }).unwrap());
        assert!(!matches(&document, &doc! { "duration": { "$exists": true } }).unwrap());
    }

    #[test]
    fn regex_honors_case_insensitive_option() {
        let document = doc! { "caller": "Alice Jones" };
        let filter = doc! { "caller": { "$regex": ".*alice.*", "$options": "i" } };
        assert!(matches(&document, &filter).unwrap());
        let sensitive = doc! { "caller": { "$regex": ".*alice.*" } };
        assert!(!matches(&document, &sensitive).unwrap());
    }

    #[test]
    fn connectives_nest() {
        let document = doc! { "status": "active", "duration": 120 };
        let filter = doc! {
            "$or": [
                { "status": { "$eq": "closed" } },
                { "$and": [
                    { "status": { "$eq": "active" } },
                    { "duration": { "$gte": 100 } },
                ] },
            ]
        };
        assert!(matches(&document, &filter).unwrap());
    }

    #[test]
    fn dotted_paths_reach_sub_documents() {
        let document = doc! { "meta": { "codec": "opus", "rate": 48000 } };
        assert!(matches(&document, &doc! { "meta.codec": { "$eq": "opus" } }).unwrap());
        assert!(matches(&document, &doc! { "meta.rate": { "$gt": 44100 } }).unwrap());
        assert!(!matches(&document, &doc! { "meta.codec": { "$eq": "g711" } }).unwrap());
    }

    #[test]
    fn geospatial_operators_are_rejected() {
        let document = doc! { "position": { "type": "Point" } };
        let filter = doc! { "position": { "$near": { "$geometry": {} } } };
        assert!(matches!(
            matches(&document, &filter),
            Err(RecordStoreError::Backend(_))
        ));
    }

    #[test]
    fn sort_comparator_walks_fields_in_order() {
        let first = doc! { "status": "active", "duration": 50 };
        let second = doc! { "status": "active", "duration": 90 };
        let sort = doc! { "status": 1, "duration": -1 };
        assert_eq!(compare_documents(&first, &second, &sort), Ordering::Greater);
        assert_eq!(compare_documents(&second, &first, &sort), Ordering::Less);
        assert_eq!(compare_documents(&first, &first, &sort), Ordering::Equal);
    }

    #[test]
    fn path_mutation_helpers_round_trip() {
        let mut document = doc! { "status": "active" };
        set_path(&mut document, "meta.codec", Bson::String("opus".to_string()));
        assert_eq!(
            resolve_path(&document, "meta.codec"),
            Some(&Bson::String("opus".to_string()))
        );
        unset_path(&mut document, "meta.codec");
        assert_eq!(resolve_path(&document, "meta.codec"), None);
    }
}
