//! Schema migration for persisted project documents.
//!
//! Runs on the raw JSON value before validation and typed decode. Every step
//! is additive and guarded, so migrating an already-migrated document changes
//! nothing.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};
use trellis_core::{epoch_millis_now, Timestamp, SCHEMA_VERSION};

/// Bring a raw document up to the current schema.
///
/// Ensures `meta.schema_version`, `meta.last_modified`, and `chat_history`
/// exist, and normalizes legacy string timestamps in the chat history to
/// epoch milliseconds. Structural damage is left alone for validation to
/// report.
pub fn migrate(mut document: Value) -> Value {
    let Some(root) = document.as_object_mut() else {
        return document;
    };

    if let Some(meta) = root.get_mut("meta").and_then(Value::as_object_mut) {
        if !meta.contains_key("schema_version") {
            debug!(version = SCHEMA_VERSION, "stamping missing schema_version");
            meta.insert("schema_version".to_string(), json!(SCHEMA_VERSION));
        }
        if !meta.contains_key("last_modified") {
            debug!("stamping missing last_modified");
            meta.insert(
                "last_modified".to_string(),
                json!(Utc::now().to_rfc3339()),
            );
        }
    }

    match root.get_mut("chat_history") {
        None => {
            debug!("adding empty chat_history");
            root.insert("chat_history".to_string(), json!([]));
        }
        Some(Value::Array(entries)) => {
            for entry in entries {
                normalize_timestamp(entry);
            }
        }
        Some(other) => {
            warn!("chat_history is not an array, resetting it");
            *other = json!([]);
        }
    }

    document
}

/// Rewrite a chat entry's timestamp to epoch milliseconds.
///
/// Legacy documents stored RFC3339 strings here; unparseable or missing
/// stamps become "now" so the entry stays loadable.
fn normalize_timestamp(entry: &mut Value) {
    let Some(entry) = entry.as_object_mut() else {
        return;
    };

    match entry.get("timestamp") {
        Some(Value::String(raw)) => {
            let millis = match raw.parse::<Timestamp>() {
                Ok(parsed) => parsed.timestamp_millis(),
                Err(_) => {
                    warn!(timestamp = %raw, "unparseable chat timestamp, using now");
                    epoch_millis_now()
                }
            };
            entry.insert("timestamp".to_string(), json!(millis));
        }
        Some(Value::Number(_)) => {}
        _ => {
            entry.insert("timestamp".to_string(), json!(epoch_millis_now()));
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn arb_doc() -> impl Strategy<Value = Value> {
        (
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            prop::collection::vec(
                prop_oneof![
                    // Legacy string timestamp
                    Just(json!({"role": "user", "content": "q", "timestamp": "2024-03-01T10:00:00Z"})),
                    // Already-numeric timestamp
                    Just(json!({"role": "assistant", "content": "a", "timestamp": 1709287500000i64})),
                    // Missing timestamp
                    Just(json!({"role": "user", "content": "q"})),
                ],
                0..4,
            ),
        )
            .prop_map(|(schema_version, last_modified, with_history, history)| {
                let mut meta = json!({
                    "name": "Prop Project",
                    "create_time": "2024-03-01T09:00:00Z",
                    "version": "1.0.0"
                });
                if schema_version {
                    meta["schema_version"] = json!("1.0.0");
                }
                if last_modified {
                    meta["last_modified"] = json!("2024-06-01T00:00:00Z");
                }
                let mut doc = json!({
                    "meta": meta,
                    "context": "",
                    "structure_tree": []
                });
                if with_history {
                    doc["chat_history"] = json!(history);
                }
                doc
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Migrating an already-migrated document is a no-op.
        #[test]
        fn prop_migration_idempotent(doc in arb_doc()) {
            let once = migrate(doc);
            let twice = migrate(once.clone());
            prop_assert_eq!(twice, once);
        }

        /// Migration always yields a numeric timestamp on every chat entry.
        #[test]
        fn prop_migrated_timestamps_numeric(doc in arb_doc()) {
            let migrated = migrate(doc);
            for entry in migrated["chat_history"].as_array().unwrap() {
                prop_assert!(entry["timestamp"].is_number());
            }
        }
    }
}
