//! Data-driven validation of LLM output.
//!
//! Schemas are static values; the validator walks the parsed JSON once.
//! Extra fields are ignored, missing required fields, wrong types, and
//! out-of-range enums reject the document. Call sites never encode a
//! schema inline.

use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schema model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub enum FieldKind {
    Str { non_empty: bool },
    Bool,
    F64 { min: f64, max: f64 },
    Enum(&'static [&'static str]),
    StrArray,
    Object(&'static [Field]),
    ObjectArray(&'static [Field]),
}

pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl Schema {
    /// Validate `value` against this schema. Returns a human-readable
    /// reason on the first violation.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("{}: expected a JSON object", self.name))?;
        validate_fields(self.name, self.fields, obj)
    }
}

fn validate_fields(
    scope: &str,
    fields: &[Field],
    obj: &serde_json::Map<String, Value>,
) -> Result<(), String> {
    for field in fields {
        let path = format!("{scope}.{}", field.name);
        match obj.get(field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    return Err(format!("{path}: missing required field"));
                }
            }
            Some(v) => validate_kind(&path, &field.kind, v)?,
        }
    }
    Ok(())
}

fn validate_kind(path: &str, kind: &FieldKind, v: &Value) -> Result<(), String> {
    match kind {
        FieldKind::Str { non_empty } => {
            let s = v.as_str().ok_or_else(|| format!("{path}: expected string"))?;
            if *non_empty && s.trim().is_empty() {
                return Err(format!("{path}: must not be empty"));
            }
        }
        FieldKind::Bool => {
            if !v.is_boolean() {
                return Err(format!("{path}: expected bool"));
            }
        }
        FieldKind::F64 { min, max } => {
            let n = v.as_f64().ok_or_else(|| format!("{path}: expected number"))?;
            if n < *min || n > *max {
                return Err(format!("{path}: {n} outside [{min}, {max}]"));
            }
        }
        FieldKind::Enum(allowed) => {
            let s = v.as_str().ok_or_else(|| format!("{path}: expected string"))?;
            if !allowed.contains(&s) {
                return Err(format!("{path}: {s:?} not in enum"));
            }
        }
        FieldKind::StrArray => {
            let arr = v.as_array().ok_or_else(|| format!("{path}: expected array"))?;
            if arr.iter().any(|e| !e.is_string()) {
                return Err(format!("{path}: expected array of strings"));
            }
        }
        FieldKind::Object(fields) => {
            let obj = v.as_object().ok_or_else(|| format!("{path}: expected object"))?;
            validate_fields(path, fields, obj)?;
        }
        FieldKind::ObjectArray(fields) => {
            let arr = v.as_array().ok_or_else(|| format!("{path}: expected array"))?;
            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                let obj = item
                    .as_object()
                    .ok_or_else(|| format!("{item_path}: expected object"))?;
                validate_fields(&item_path, fields, obj)?;
            }
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The two pipeline schemas
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const INTENTS: &[&str] = &[
    "network",
    "install_os",
    "install_app",
    "hardware",
    "software",
    "peripheral",
    "account",
    "billing",
    "other",
    "unknown",
];

const RISK_LEVELS: &[&str] = &["low", "medium", "high"];

const EMOTIONS: &[&str] = &[
    "neutral",
    "frustrated",
    "anxious",
    "confused",
    "focused",
    "satisfied",
];

const SUGGEST_MODES_FIELDS: &[Field] = &[
    Field {
        name: "ask_interaction_mode",
        kind: FieldKind::Bool,
        required: false,
    },
    Field {
        name: "ask_learning_depth",
        kind: FieldKind::Bool,
        required: false,
    },
    Field {
        name: "ask_executor_role",
        kind: FieldKind::Bool,
        required: false,
    },
    Field {
        name: "activate_advisory_mode",
        kind: FieldKind::Bool,
        required: false,
    },
];

pub static CLASSIFIER_SCHEMA: Schema = Schema {
    name: "classifier",
    fields: &[
        Field {
            name: "intent",
            kind: FieldKind::Enum(INTENTS),
            required: true,
        },
        Field {
            name: "needs_clarification",
            kind: FieldKind::Bool,
            required: true,
        },
        Field {
            name: "missing",
            kind: FieldKind::StrArray,
            required: false,
        },
        Field {
            name: "suggested_next_ask",
            kind: FieldKind::Str { non_empty: false },
            required: false,
        },
        Field {
            name: "risk_level",
            kind: FieldKind::Enum(RISK_LEVELS),
            required: true,
        },
        Field {
            name: "suggest_modes",
            kind: FieldKind::Object(SUGGEST_MODES_FIELDS),
            required: false,
        },
        Field {
            name: "confidence",
            kind: FieldKind::F64 { min: 0.0, max: 1.0 },
            required: true,
        },
    ],
};

const BUTTON_FIELDS: &[Field] = &[
    Field {
        name: "token",
        kind: FieldKind::Str { non_empty: true },
        required: true,
    },
    Field {
        name: "label",
        kind: FieldKind::Str { non_empty: true },
        required: true,
    },
    Field {
        name: "order",
        kind: FieldKind::F64 { min: 0.0, max: 16.0 },
        required: false,
    },
];

pub static STEP_SCHEMA: Schema = Schema {
    name: "step",
    fields: &[
        Field {
            name: "reply",
            kind: FieldKind::Str { non_empty: true },
            required: true,
        },
        Field {
            name: "buttons",
            kind: FieldKind::ObjectArray(BUTTON_FIELDS),
            required: false,
        },
        Field {
            name: "emotion",
            kind: FieldKind::Enum(EMOTIONS),
            required: false,
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier_doc() -> Value {
        serde_json::json!({
            "intent": "network",
            "needs_clarification": false,
            "missing": [],
            "suggested_next_ask": "CONNECTIVITY_FLOW",
            "risk_level": "low",
            "suggest_modes": { "ask_interaction_mode": true },
            "confidence": 0.85
        })
    }

    #[test]
    fn valid_classifier_passes() {
        assert!(CLASSIFIER_SCHEMA.validate(&classifier_doc()).is_ok());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let mut doc = classifier_doc();
        doc["totally_new_field"] = serde_json::json!({"a": 1});
        assert!(CLASSIFIER_SCHEMA.validate(&doc).is_ok());
    }

    #[test]
    fn missing_required_field_rejects() {
        let mut doc = classifier_doc();
        doc.as_object_mut().unwrap().remove("intent");
        let err = CLASSIFIER_SCHEMA.validate(&doc).unwrap_err();
        assert!(err.contains("intent"));
    }

    #[test]
    fn out_of_enum_rejects() {
        let mut doc = classifier_doc();
        doc["risk_level"] = serde_json::json!("catastrophic");
        assert!(CLASSIFIER_SCHEMA.validate(&doc).is_err());
    }

    #[test]
    fn out_of_range_confidence_rejects() {
        let mut doc = classifier_doc();
        doc["confidence"] = serde_json::json!(1.5);
        assert!(CLASSIFIER_SCHEMA.validate(&doc).is_err());
    }

    #[test]
    fn wrong_type_rejects() {
        let mut doc = classifier_doc();
        doc["needs_clarification"] = serde_json::json!("yes");
        assert!(CLASSIFIER_SCHEMA.validate(&doc).is_err());
    }

    #[test]
    fn step_requires_non_empty_reply() {
        let doc = serde_json::json!({ "reply": "  ", "buttons": [] });
        assert!(STEP_SCHEMA.validate(&doc).is_err());

        let doc = serde_json::json!({
            "reply": "Probá reiniciar el router.",
            "buttons": [{ "token": "BTN_SOLVED", "label": "Funcionó" }],
            "emotion": "neutral"
        });
        assert!(STEP_SCHEMA.validate(&doc).is_ok());
    }

    #[test]
    fn step_button_without_label_rejects() {
        let doc = serde_json::json!({
            "reply": "ok",
            "buttons": [{ "token": "BTN_SOLVED" }]
        });
        let err = STEP_SCHEMA.validate(&doc).unwrap_err();
        assert!(err.contains("label"));
    }
}
