//! Typed view of ontology action responses.
//!
//! An `apply` call answers with one of three shapes: the edits it made
//! (`{"edits": {"edits": [...]}}`), a bare validation report
//! (`{"validation": {"result": "VALID"}}`), or a Foundry error
//! (`{"errorCode": ..., "errorName": ...}`).

use serde::Deserialize;
use serde_json::Value;

/// One object edit reported by an action.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Edit {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub object_type: Option<String>,
    pub primary_key: Option<Value>,
    pub object_rid: Option<String>,
}

impl Edit {
    pub fn primary_key(&self) -> Option<String> {
        self.primary_key.as_ref().and_then(value_to_key)
    }

    /// The primary key, else the object RID.
    pub fn key_or_rid(&self) -> Option<String> {
        self.primary_key().or_else(|| self.object_rid.clone())
    }
}

fn value_to_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionResponse {
    Edits {
        edits: Vec<Edit>,
        validation: Option<String>,
    },
    Validation {
        result: String,
    },
    Error {
        error_code: String,
        error_name: String,
        message: Option<String>,
    },
    Unrecognized,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    edits: Option<RawEdits>,
    validation: Option<RawValidation>,
    error_code: Option<String>,
    error_name: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawEdits {
    #[serde(default)]
    edits: Option<Vec<Edit>>,
}

#[derive(Deserialize)]
struct RawValidation {
    result: Option<String>,
}

impl ActionResponse {
    /// Classify a response body. Bodies that are not JSON objects are
    /// [`ActionResponse::Unrecognized`].
    pub fn parse(body: &str) -> Self {
        let Ok(raw) = serde_json::from_str::<RawResponse>(body) else {
            return ActionResponse::Unrecognized;
        };

        let validation = raw.validation.and_then(|v| v.result);

        if let Some(edits) = raw.edits.and_then(|e| e.edits) {
            return ActionResponse::Edits { edits, validation };
        }
        if let Some(result) = validation {
            return ActionResponse::Validation { result };
        }
        if raw.error_code.is_some() || raw.error_name.is_some() {
            return ActionResponse::Error {
                error_code: raw.error_code.unwrap_or_default(),
                error_name: raw.error_name.unwrap_or_default(),
                message: raw.message,
            };
        }
        ActionResponse::Unrecognized
    }

    /// `edits[0].primaryKey`.
    pub fn first_primary_key(&self) -> Option<String> {
        match self {
            ActionResponse::Edits { edits, .. } => edits.first().and_then(Edit::primary_key),
            _ => None,
        }
    }

    /// `edits[0].primaryKey`, else `edits[0].objectRid`.
    pub fn first_key_or_rid(&self) -> Option<String> {
        match self {
            ActionResponse::Edits { edits, .. } => edits.first().and_then(Edit::key_or_rid),
            _ => None,
        }
    }

    pub fn validation_result(&self) -> Option<&str> {
        match self {
            ActionResponse::Edits { validation, .. } => validation.as_deref(),
            ActionResponse::Validation { result } => Some(result),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validation_result() == Some("VALID")
    }
}
