// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use serde_json::Value;

/// Legacy flat keys that moved under the `model` section.
const LEGACY_MODEL_KEYS: &[(&str, &str)] = &[
    ("model_file_name", "file_name"),
    ("model_min_size_bytes", "min_size_bytes"),
    ("model_max_size_bytes", "max_size_bytes"),
];

/// Rewrite older layouts into the current shape before deserializing.
pub(super) fn migrate_on_load(value: Value) -> Value {
    let mut map = match value {
        Value::Object(map) => map,
        other => return other,
    };

    for (legacy, current) in LEGACY_MODEL_KEYS {
        if let Some(v) = map.remove(*legacy) {
            let model = map
                .entry("model")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Value::Object(model_map) = model {
                model_map.entry(*current).or_insert(v);
            }
        }
    }

    Value::Object(map)
}

/// Deep-merge two JSON values.
/// `base` is existing file content, `overlay` is serialized current struct.
/// Overlay values take priority.
pub(super) fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = if let Some(base_val) = base_map.remove(&key) {
                    deep_merge(base_val, overlay_val)
                } else {
                    overlay_val
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_base, overlay) => overlay,
    }
}
