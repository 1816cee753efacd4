//! Plan computation for resources.
//!
//! Planning works on top-level attributes and blocks: nested blocks are
//! compared as whole values. Computed attributes the configuration leaves
//! unset are carried over from the prior state unless the resource is
//! being replaced.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::schema::Schema;
use crate::types::{AttributeChange, PlanResult};

static NULL: Value = Value::Null;

/// Compute the plan for moving a resource from `prior` to `proposed`.
///
/// A `null` proposed state plans a destroy.
pub fn plan_resource(schema: &Schema, prior: Option<&Value>, proposed: Value) -> PlanResult {
    let prior_map = prior.and_then(Value::as_object).filter(|m| !m.is_empty());

    let Value::Object(mut planned) = proposed else {
        return plan_destroy(prior_map);
    };

    let computed = schema.computed_paths();
    let requires_replace = prior_map.is_some_and(|prior| {
        schema
            .force_new_paths()
            .iter()
            .any(|path| value_at(prior, path) != value_at(&planned, path))
    });

    if let Some(prior) = prior_map {
        if !requires_replace {
            for path in &computed {
                if value_at(&planned, path).is_null() {
                    if let Some(value) = prior.get(*path).filter(|v| !v.is_null()) {
                        planned.insert(path.to_string(), value.clone());
                    }
                }
            }
        }
    }

    let changes = diff(prior_map, &planned, &computed);
    let planned = Value::Object(planned);

    if changes.is_empty() && !requires_replace {
        PlanResult::no_change(planned)
    } else {
        PlanResult::with_changes(planned, changes, requires_replace)
    }
}

fn plan_destroy(prior: Option<&Map<String, Value>>) -> PlanResult {
    let changes: Vec<AttributeChange> = prior
        .into_iter()
        .flat_map(|map| map.iter())
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| AttributeChange::removed(key.clone(), value.clone()))
        .collect();

    if changes.is_empty() {
        PlanResult::no_change(Value::Null)
    } else {
        PlanResult::with_changes(Value::Null, changes, false)
    }
}

fn diff(
    prior: Option<&Map<String, Value>>,
    planned: &Map<String, Value>,
    computed: &[&str],
) -> Vec<AttributeChange> {
    let keys: BTreeSet<&String> = prior
        .into_iter()
        .flat_map(|map| map.keys())
        .chain(planned.keys())
        .filter(|key| !computed.contains(&key.as_str()))
        .collect();

    keys.into_iter()
        .filter_map(|key| {
            let before = prior.map(|p| value_at(p, key)).unwrap_or(&NULL);
            let after = value_at(planned, key);
            match (before.is_null(), after.is_null()) {
                (true, true) => None,
                (true, false) => Some(AttributeChange::added(key.clone(), after.clone())),
                (false, true) => Some(AttributeChange::removed(key.clone(), before.clone())),
                (false, false) if before != after => Some(AttributeChange::modified(
                    key.clone(),
                    before.clone(),
                    after.clone(),
                )),
                _ => None,
            }
        })
        .collect()
}

fn value_at<'a>(map: &'a Map<String, Value>, key: &str) -> &'a Value {
    map.get(key).unwrap_or(&NULL)
}
