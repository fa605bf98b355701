//! Aggregation pipeline execution over in-memory rows.
//!
//! Supports the staged subset the pipeline builder emits: `$match`,
//! `$group`, `$project`, `$unwind`, `$sort`, `$skip` and `$limit`. Stages
//! are applied in order over materialized rows.

use std::cmp::Ordering;

use bson::{Bson, Document};

use recordlayer_core::error::{RecordStoreError, RecordStoreResult};

use crate::evaluator::{self, Comparable};

/// Runs `pipeline` over `rows` and returns the surviving rows.
pub(crate) fn execute(
    mut rows: Vec<Document>,
    pipeline: Vec<Document>,
) -> RecordStoreResult<Vec<Document>> {
    for stage in pipeline {
        let (name, params) = single_entry(&stage)?;
        rows = match name {
            "$match" => match_stage(rows, params)?,
            "$group" => group_stage(rows, params)?,
            "$project" => project_stage(rows, params)?,
            "$unwind" => unwind_stage(rows, params)?,
            "$sort" => sort_stage(rows, params)?,
            "$skip" => rows.into_iter().skip(integer(name, params)? as usize).collect(),
            "$limit" => {
                rows.truncate(integer(name, params)? as usize);
                rows
            }
            other => {
                return Err(RecordStoreError::Backend(format!(
                    "unsupported aggregation stage '{other}'"
                )));
            }
        };
    }
    Ok(rows)
}

fn single_entry(stage: &Document) -> RecordStoreResult<(&str, &Bson)> {
    if stage.len() != 1 {
        return Err(RecordStoreError::InvalidArgument(
            "an aggregation stage must hold exactly one operator".to_string(),
        ));
    }
    let (name, params) = stage
        .iter()
        .next()
        .ok_or_else(|| {
            RecordStoreError::InvalidArgument("empty aggregation stage".to_string())
        })?;
    Ok((name.as_ref(), params))
}

fn expect_document<'a>(name: &str, params: &'a Bson) -> RecordStoreResult<&'a Document> {
    params.as_document().ok_or_else(|| {
        RecordStoreError::InvalidArgument(format!("'{name}' expects a document"))
    })
}

fn integer(name: &str, params: &Bson) -> RecordStoreResult<i64> {
    let value = match params {
        Bson::Int32(value) => *value as i64,
        Bson::Int64(value) => *value,
        _ => {
            return Err(RecordStoreError::InvalidArgument(format!(
                "'{name}' expects an integer"
            )));
        }
    };
    if value < 0 {
        return Err(RecordStoreError::InvalidArgument(format!(
            "'{name}' expects a non-negative integer"
        )));
    }
    Ok(value)
}

fn match_stage(rows: Vec<Document>, params: &Bson) -> RecordStoreResult<Vec<Document>> {
    let filter = expect_document("$match", params)?;
    let mut kept = Vec::new();
    for row in rows {
        if evaluator::matches(&row, filter)? {
            kept.push(row);
        }
    }
    Ok(kept)
}

/// Evaluates a stage expression against one row. A string beginning with
/// `$` dereferences a field path; anything else is a literal.
fn expression(row: &Document, expr: &Bson) -> Bson {
    match expr {
        Bson::String(path) if path.starts_with('$') => evaluator::resolve_path(row, &path[1..])
            .cloned()
            .unwrap_or(Bson::Null),
        other => other.clone(),
    }
}

fn group_stage(rows: Vec<Document>, params: &Bson) -> RecordStoreResult<Vec<Document>> {
    let spec = expect_document("$group", params)?;
    let key_expr = spec.get("_id").cloned().unwrap_or(Bson::Null);

    // Group membership scans linearly; BSON keys have no hash.
    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();
    for row in rows {
        let key = expression(&row, &key_expr);
        match groups.iter_mut().find(|(existing, _)| {
            Comparable::from(existing) == Comparable::from(&key)
        }) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    let mut out = Vec::new();
    for (key, members) in groups {
        let mut result = Document::new();
        result.insert("_id", key);
        for (field, accumulator) in spec {
            let field: &str = field.as_ref();
            if field == "_id" {
                continue;
            }
            let accumulator = accumulator.as_document().ok_or_else(|| {
                RecordStoreError::InvalidArgument(format!(
                    "accumulator for '{field}' must be a document"
                ))
            })?;
            let (operator, operand) = single_entry(accumulator)?;
            let values = members
                .iter()
                .map(|member| expression(member, operand))
                .collect::<Vec<_>>();
            let value = match operator {
                "$sum" => sum(&values),
                "$avg" => average(&values),
                "$max" => extreme(values, Ordering::Greater),
                "$min" => extreme(values, Ordering::Less),
                "$first" => values.into_iter().next().unwrap_or(Bson::Null),
                "$push" => Bson::Array(values),
                other => {
                    return Err(RecordStoreError::Backend(format!(
                        "unsupported accumulator '{other}'"
                    )));
                }
            };
            result.insert(field.to_string(), value);
        }
        out.push(result);
    }
    Ok(out)
}

/// Sums numeric values, staying integral until a double appears.
/// Non-numeric values are skipped, matching server behavior.
fn sum(values: &[Bson]) -> Bson {
    let mut integral: i64 = 0;
    let mut fractional: f64 = 0.0;
    let mut saw_double = false;
    for value in values {
        match value {
            Bson::Int32(v) => integral += *v as i64,
            Bson::Int64(v) => integral += *v,
            Bson::Double(v) => {
                saw_double = true;
                fractional += *v;
            }
            _ => {}
        }
    }
    if saw_double {
        Bson::Double(fractional + integral as f64)
    } else {
        Bson::Int64(integral)
    }
}

fn average(values: &[Bson]) -> Bson {
    let mut total = 0.0;
    let mut count = 0u64;
    for value in values {
        match value {
            Bson::Int32(v) => {
                total += *v as f64;
                count += 1;
            }
            Bson::Int64(v) => {
                total += *v as f64;
                count += 1;
            }
            Bson::Double(v) => {
                total += *v;
                count += 1;
            }
            _ => {}
        }
    }
    if count == 0 {
        Bson::Null
    } else {
        Bson::Double(total / count as f64)
    }
}

fn extreme(values: Vec<Bson>, keep: Ordering) -> Bson {
    let mut best: Option<Bson> = None;
    for value in values {
        if matches!(value, Bson::Null) {
            continue;
        }
        best = match best {
            None => Some(value),
            Some(current) => {
                if Comparable::from(&value).partial_cmp(&Comparable::from(&current)) == Some(keep)
                {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.unwrap_or(Bson::Null)
}

fn project_stage(rows: Vec<Document>, params: &Bson) -> RecordStoreResult<Vec<Document>> {
    let spec = expect_document("$project", params)?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut shaped = Document::new();
        let id_suppressed = matches!(
            spec.get("_id"),
            Some(Bson::Int32(0)) | Some(Bson::Int64(0)) | Some(Bson::Boolean(false))
        );
        if !id_suppressed && let Some(id) = row.get("_id") {
            shaped.insert("_id", id.clone());
        }
        for (field, directive) in spec {
            let field: &str = field.as_ref();
            if field == "_id" {
                continue;
            }
            match directive {
                Bson::Int32(1) | Bson::Int64(1) | Bson::Boolean(true) => {
                    if let Some(value) = evaluator::resolve_path(&row, field) {
                        shaped.insert(field.to_string(), value.clone());
                    }
                }
                Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false) => {}
                computed => {
                    shaped.insert(field.to_string(), expression(&row, computed));
                }
            }
        }
        out.push(shaped);
    }
    Ok(out)
}

/// Duplicates each row per element of the named array field. Rows missing
/// the field are dropped; a non-array value passes through as a singleton.
fn unwind_stage(rows: Vec<Document>, params: &Bson) -> RecordStoreResult<Vec<Document>> {
    let path = match params {
        Bson::String(path) if path.starts_with('$') => &path[1..],
        _ => {
            return Err(RecordStoreError::InvalidArgument(
                "'$unwind' expects a '$'-prefixed field path".to_string(),
            ));
        }
    };
    let mut out = Vec::new();
    for row in rows {
        match evaluator::resolve_path(&row, path).cloned() {
            Some(Bson::Array(elements)) => {
                for element in elements {
                    let mut clone = row.clone();
                    evaluator::set_path(&mut clone, path, element);
                    out.push(clone);
                }
            }
            Some(_) => out.push(row),
            None => {}
        }
    }
    Ok(out)
}

fn sort_stage(mut rows: Vec<Document>, params: &Bson) -> RecordStoreResult<Vec<Document>> {
    let sort = expect_document("$sort", params)?.clone();
    rows.sort_by(|a, b| evaluator::compare_documents(a, b, &sort));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn calls() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "status": "active", "duration": 30, "tags": ["voip", "sip"] },
            doc! { "_id": 2, "status": "active", "duration": 90, "tags": ["sip"] },
            doc! { "_id": 3, "status": "closed", "duration": 60, "tags": [] },
        ]
    }

    #[test]
    fn match_then_group_reduces() {
        let pipeline = vec![
            doc! { "$match": { "status": { "$eq": "active" } } },
            doc! { "$group": { "_id": Bson::Null, "value": { "$max": "$duration" } } },
        ];
        let rows = execute(calls(), pipeline).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("value"), Some(&Bson::Int32(90)));
    }

    #[test]
    fn grouping_by_field_buckets_rows() {
        let pipeline = vec![doc! { "$group": {
            "_id": "$status",
            "total": { "$sum": "$duration" },
            "longest": { "$max": "$duration" },
        } }];
        let mut rows = execute(calls(), pipeline).unwrap();
        rows.sort_by(|a, b| evaluator::compare_documents(a, b, &doc! { "_id": 1 }));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("_id"), Some(&Bson::String("active".to_string())));
        assert_eq!(rows[0].get("total"), Some(&Bson::Int64(120)));
        assert_eq!(rows[0].get("longest"), Some(&Bson::Int32(90)));
        assert_eq!(rows[1].get("_id"), Some(&Bson::String("closed".to_string())));
        assert_eq!(rows[1].get("total"), Some(&Bson::Int64(60)));
    }

    #[test]
    fn sum_widens_to_double_when_needed() {
        assert_eq!(
            sum(&[Bson::Int32(1), Bson::Int64(2)]),
            Bson::Int64(3)
        );
        assert_eq!(
            sum(&[Bson::Int32(1), Bson::Double(0.5)]),
            Bson::Double(1.5)
        );
        assert_eq!(sum(&[]), Bson::Int64(0));
    }

    #[test]
    fn average_ignores_non_numeric_values() {
        assert_eq!(
            average(&[Bson::Int32(30), Bson::Int32(90), Bson::Null]),
            Bson::Double(60.0)
        );
        assert_eq!(average(&[Bson::Null]), Bson::Null);
    }

    #[test]
    fn unwind_duplicates_per_element_and_drops_missing() {
        let pipeline = vec![doc! { "$unwind": "$tags" }];
        let rows = execute(calls(), pipeline).unwrap();
        // Three elements across the first two rows; the empty array and no
        // third-row elements survive.
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| matches!(row.get("tags"), Some(Bson::String(_)))));
    }

    #[test]
    fn project_shapes_rows_and_keeps_identity_by_default() {
        let pipeline = vec![doc! { "$project": { "duration": 1, "state": "$status" } }];
        let rows = execute(calls(), pipeline).unwrap();
        assert_eq!(rows[0].len(), 3);
        assert!(rows[0].contains_key("_id"));
        assert!(rows[0].contains_key("duration"));
        assert_eq!(rows[0].get("state"), Some(&Bson::String("active".to_string())));
        assert!(!rows[0].contains_key("status"));
    }

    #[test]
    fn sort_skip_limit_page_through_rows() {
        let pipeline = vec![
            doc! { "$sort": { "duration": -1 } },
            doc! { "$skip": 1 },
            doc! { "$limit": 1 },
        ];
        let rows = execute(calls(), pipeline).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("duration"), Some(&Bson::Int32(60)));
    }

    #[test]
    fn unknown_stages_are_rejected() {
        let pipeline = vec![doc! { "$lookup": { "from": "places" } }];
        assert!(matches!(
            execute(calls(), pipeline),
            Err(RecordStoreError::Backend(_))
        ));
    }
}
