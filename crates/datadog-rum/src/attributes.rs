// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Attribute maps and the merge rule shared by every scope.
//!
//! Attributes flow down the scope tree: the attributes of an emitted record are
//! `ancestors ⊕ scope ⊕ event`, where a later layer overrides identical keys of
//! an earlier one.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

/// Ordered attribute map.
pub type Attributes = BTreeMap<String, Value>;

/// Trace id attached to a resource by the network instrumentation.
pub const TRACE_ID: &str = "_dd.trace_id";
/// Span id attached to a resource by the network instrumentation.
pub const SPAN_ID: &str = "_dd.span_id";
/// Sampling rate of the trace attached to a resource.
pub const RULE_PSR: &str = "_dd.rule_psr";
/// Custom fingerprint for error grouping.
pub const ERROR_FINGERPRINT: &str = "_dd.error.fingerprint";
/// Marks an error reported by a cross-platform layer as a crash.
pub const INTERNAL_ERROR_IS_CRASH: &str = "_dd.error.is_crash";

/// Merges attribute layers from the lowest to the highest precedence.
#[must_use]
pub fn merge<'a, I>(layers: I) -> Attributes
where
    I: IntoIterator<Item = &'a Attributes>,
{
    let mut merged = Attributes::new();
    for layer in layers {
        merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Removes `key` and returns its value as a string, if it is set and not null.
pub fn take_string(attributes: &mut Attributes, key: &str) -> Option<String> {
    match attributes.remove(key)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Source of attributes queried at emission time and merged at the root of the chain.
pub trait AttributesProvider: Send + Sync {
    fn attributes(&self) -> Attributes;
}

/// Global attributes set by the host application.
#[derive(Debug, Default)]
pub struct GlobalAttributes {
    inner: RwLock<Attributes>,
}

impl GlobalAttributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl AttributesProvider for GlobalAttributes {
    fn attributes(&self) -> Attributes {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Provider that never contributes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAttributesProvider;

impl AttributesProvider for NoOpAttributesProvider {
    fn attributes(&self) -> Attributes {
        Attributes::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_merge_later_layer_wins() {
        let ancestors = attrs(&[("shared", json!("ancestor")), ("a", json!(1))]);
        let scope = attrs(&[("shared", json!("scope")), ("b", json!(2))]);
        let event = attrs(&[("shared", json!("event")), ("c", json!(3))]);

        let merged = merge([&ancestors, &scope, &event]);

        assert_eq!(merged.get("shared"), Some(&json!("event")));
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(2)));
        assert_eq!(merged.get("c"), Some(&json!(3)));
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_merge_empty_layers() {
        let empty = Attributes::new();
        assert!(merge([&empty, &empty]).is_empty());
    }

    #[test]
    fn test_take_string() {
        let mut attributes = attrs(&[("s", json!("x")), ("n", json!(12)), ("null", Value::Null)]);
        assert_eq!(take_string(&mut attributes, "s").as_deref(), Some("x"));
        assert_eq!(take_string(&mut attributes, "n").as_deref(), Some("12"));
        assert_eq!(take_string(&mut attributes, "null"), None);
        assert_eq!(take_string(&mut attributes, "missing"), None);
        assert!(attributes.is_empty());
    }

    #[test]
    fn test_global_attributes_insert_and_remove() {
        let global = GlobalAttributes::new();
        global.insert("user.plan", "premium");
        global.insert("count", 3);
        global.remove("count");

        let snapshot = global.attributes();
        assert_eq!(snapshot.get("user.plan"), Some(&json!("premium")));
        assert!(!snapshot.contains_key("count"));
    }

    proptest! {
        #[test]
        fn test_merge_precedence_holds_for_any_values(
            ancestor in any::<i64>(),
            scope in any::<i64>(),
            event in any::<i64>(),
        ) {
            let merged = merge([
                &attrs(&[("k", json!(ancestor))]),
                &attrs(&[("k", json!(scope))]),
                &attrs(&[("k", json!(event))]),
            ]);
            prop_assert_eq!(merged.get("k"), Some(&json!(event)));
        }
    }
}
