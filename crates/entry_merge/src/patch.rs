//! JSON patch operations (RFC 6902) over `serde_json::Value`.
//!
//! Application is all-or-nothing: the input document is never modified and a
//! failing operation discards the work of the operations before it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One structural edit addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Remove {
        path: String,
    },
    Replace {
        path: String,
        #[serde(default)]
        value: Value,
    },
    Move {
        from: String,
        path: String,
    },
    Copy {
        from: String,
        path: String,
    },
    Test {
        path: String,
        #[serde(default)]
        value: Value,
    },
}

impl PatchOperation {
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("malformed diff block: {0}")]
    MalformedDiff(String),

    #[error("malformed patch operation at index {index}: {message}")]
    MalformedOperation { index: usize, message: String },

    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),

    #[error("path '{0}' does not exist")]
    MissingPath(String),

    #[error("cannot address '{path}' inside a {found} value")]
    TypeMismatch { path: String, found: &'static str },

    #[error("array index '{index}' is out of bounds at '{path}'")]
    IndexOutOfBounds { path: String, index: String },

    #[error("test operation failed at '{0}'")]
    TestFailed(String),

    #[error("cannot move '{from}' into its own child '{path}'")]
    MoveIntoChild { from: String, path: String },

    #[error("patched '{field}' no longer matches its payload shape: {message}")]
    PayloadShape { field: String, message: String },
}

impl PatchError {
    #[must_use]
    pub fn payload_shape(field: &str, source: serde_json::Error) -> Self {
        Self::PayloadShape {
            field: field.to_owned(),
            message: source.to_string(),
        }
    }
}

/// Apply `operations` in order to a copy of `document`.
pub fn apply_patch(document: &Value, operations: &[PatchOperation]) -> Result<Value, PatchError> {
    let mut patched = document.clone();
    for operation in operations {
        apply_operation(&mut patched, operation)?;
    }
    Ok(patched)
}

fn apply_operation(document: &mut Value, operation: &PatchOperation) -> Result<(), PatchError> {
    match operation {
        PatchOperation::Add { path, value } => add(document, path, value.clone()),
        PatchOperation::Remove { path } => remove(document, path).map(|_| ()),
        PatchOperation::Replace { path, value } => {
            let target = lookup_mut(document, path)?;
            *target = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            if from == path {
                return lookup(document, from).map(|_| ());
            }
            if path.starts_with(&format!("{from}/")) {
                return Err(PatchError::MoveIntoChild {
                    from: from.clone(),
                    path: path.clone(),
                });
            }
            let value = remove(document, from)?;
            add(document, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = lookup(document, from)?.clone();
            add(document, path, value)
        }
        PatchOperation::Test { path, value } => {
            if lookup(document, path)? == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed(path.clone()))
            }
        }
    }
}

fn add(document: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    let Some((parent_path, token)) = split_parent(path)? else {
        *document = value;
        return Ok(());
    };
    match lookup_mut(document, parent_path)? {
        Value::Object(map) => {
            map.insert(token, value);
            Ok(())
        }
        Value::Array(items) => {
            let index = if token == "-" {
                items.len()
            } else {
                parse_index(path, &token)?
            };
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_owned(),
                    index: token,
                });
            }
            items.insert(index, value);
            Ok(())
        }
        other => Err(PatchError::TypeMismatch {
            path: path.to_owned(),
            found: type_name(other),
        }),
    }
}

fn remove(document: &mut Value, path: &str) -> Result<Value, PatchError> {
    let Some((parent_path, token)) = split_parent(path)? else {
        return Ok(std::mem::take(document));
    };
    match lookup_mut(document, parent_path)? {
        Value::Object(map) => map
            .remove(&token)
            .ok_or_else(|| PatchError::MissingPath(path.to_owned())),
        Value::Array(items) => {
            let index = parse_index(path, &token)?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_owned(),
                    index: token,
                });
            }
            Ok(items.remove(index))
        }
        other => Err(PatchError::TypeMismatch {
            path: path.to_owned(),
            found: type_name(other),
        }),
    }
}

fn lookup<'a>(document: &'a Value, path: &str) -> Result<&'a Value, PatchError> {
    validate_pointer(path)?;
    document
        .pointer(path)
        .ok_or_else(|| PatchError::MissingPath(path.to_owned()))
}

fn lookup_mut<'a>(document: &'a mut Value, path: &str) -> Result<&'a mut Value, PatchError> {
    validate_pointer(path)?;
    document
        .pointer_mut(path)
        .ok_or_else(|| PatchError::MissingPath(path.to_owned()))
}

/// Split a pointer into its (still escaped) parent pointer and unescaped last token.
fn split_parent(path: &str) -> Result<Option<(&str, String)>, PatchError> {
    validate_pointer(path)?;
    Ok(path
        .rfind('/')
        .map(|split| (&path[..split], unescape_token(&path[split + 1..]))))
}

fn validate_pointer(path: &str) -> Result<(), PatchError> {
    if path.is_empty() || path.starts_with('/') {
        Ok(())
    } else {
        Err(PatchError::InvalidPointer(path.to_owned()))
    }
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn parse_index(path: &str, token: &str) -> Result<usize, PatchError> {
    let well_formed = !token.is_empty()
        && token.bytes().all(|byte| byte.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !well_formed {
        return Err(PatchError::InvalidPointer(path.to_owned()));
    }
    token
        .parse()
        .map_err(|_| PatchError::InvalidPointer(path.to_owned()))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
