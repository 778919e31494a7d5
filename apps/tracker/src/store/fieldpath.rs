//! Dot-separated field paths over JSON documents (`snapshotLinks.<id>.snapshotId`).
//!
//! Shared by both backends so that field updates, filters and merges behave
//! identically regardless of where documents live.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::{FieldOp, FieldUpdate, Filter, FilterOp, StoreError};

pub fn split(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Returns true when `key` can be used as a single path segment.
pub fn is_valid_segment(key: &str) -> bool {
    !key.is_empty() && !key.contains('.')
}

pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Walks to the parent object of the last segment, creating intermediate
/// objects as needed.
fn parent_mut<'a>(
    value: &'a mut Value,
    path: &str,
) -> Result<(&'a mut Map<String, Value>, String), StoreError> {
    let segments = split(path)?;
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

    let mut current = value;
    for segment in parents {
        let object = current
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
    }
    let object = current
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
    Ok((object, last.to_string()))
}

pub fn apply(document: &mut Value, update: &FieldUpdate) -> Result<(), StoreError> {
    let (parent, key) = parent_mut(document, &update.path)?;
    match &update.op {
        FieldOp::Set(value) => {
            parent.insert(key, value.clone());
        }
        FieldOp::ArrayUnion(values) => {
            let slot = parent.entry(key).or_insert_with(|| Value::Array(Vec::new()));
            if slot.is_null() {
                *slot = Value::Array(Vec::new());
            }
            let array = slot
                .as_array_mut()
                .ok_or_else(|| StoreError::InvalidPath(update.path.clone()))?;
            for value in values {
                if !array.contains(value) {
                    array.push(value.clone());
                }
            }
        }
    }
    Ok(())
}

pub fn apply_all(document: &mut Value, updates: &[FieldUpdate]) -> Result<(), StoreError> {
    for update in updates {
        apply(document, update)?;
    }
    Ok(())
}

/// Deep merge: objects merge key by key, everything else replaces.
pub fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Field updates that turn `before` into `after`, descending into nested
/// objects up to `depth` levels. Keys absent from `after` are left alone.
pub fn diff(before: &Value, after: &Value, depth: usize) -> Vec<FieldUpdate> {
    let mut updates = Vec::new();
    diff_into(before, after, depth, "", &mut updates);
    updates
}

fn diff_into(
    before: &Value,
    after: &Value,
    depth: usize,
    prefix: &str,
    out: &mut Vec<FieldUpdate>,
) {
    let Some(after_map) = after.as_object() else {
        if before != after && !prefix.is_empty() {
            out.push(FieldUpdate::set(prefix, after.clone()));
        }
        return;
    };
    for (key, after_value) in after_map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match before.get(key) {
            Some(before_value) if before_value == after_value => {}
            Some(before_value)
                if depth > 1
                    && before_value.is_object()
                    && after_value.is_object()
                    && is_valid_segment(key) =>
            {
                diff_into(before_value, after_value, depth - 1, &path, out);
            }
            _ => out.push(FieldUpdate::set(path, after_value.clone())),
        }
    }
}

/// Ordering for range filters and `order_by`: numbers numerically, strings
/// lexically, booleans false < true. Mixed types do not compare.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

pub fn matches(document: &Value, filter: &Filter) -> bool {
    let Some(field) = get(document, &filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => field == &filter.value,
        FilterOp::In => filter
            .value
            .as_array()
            .map(|candidates| candidates.contains(field))
            .unwrap_or(false),
        FilterOp::ArrayContains => field
            .as_array()
            .map(|items| items.contains(&filter.value))
            .unwrap_or(false),
        FilterOp::Gte => matches!(
            compare(field, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lte => matches!(
            compare(field, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}
