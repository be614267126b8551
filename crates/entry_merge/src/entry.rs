use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::patch::{type_name, PatchError, PatchOperation};

/// Canonical text-answer block key.
pub const ASK_TEXT_USAGE: &str = "ask_text";
/// Block key used by the server for search results.
pub const WEB_RESULTS_USAGE: &str = "web_results";

/// Block field carrying a markdown payload.
pub const MARKDOWN_FIELD: &str = "markdown_block";
/// Block field carrying a structural-patch instruction.
pub const DIFF_FIELD: &str = "diff_block";
/// Block field carrying web results.
pub const WEB_RESULTS_FIELD: &str = "web_result_block";

/// Lifecycle status reported by the server for an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Resuming,
    Completed,
    Failed,
    Blocked,
    /// Status not known to this client, kept verbatim.
    Other(String),
}

impl EntryStatus {
    /// Parse a status string. Matching ignores ASCII case.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "resuming" => Self::Resuming,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "blocked" => Self::Blocked,
            _ => Self::Other(value.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Resuming => "RESUMING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
            Self::Other(value) => value,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Statuses the server uses to abort a stream.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Blocked)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EntryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// One question/answer exchange as streamed by the server.
///
/// Every field is optional because the same type describes both the running
/// document and the partial updates merged into it. Keys this client does not
/// model are kept in `extra` so they survive a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntryStatus>,
    #[serde(
        rename = "final",
        default,
        deserialize_with = "deserialize_truthy",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_final: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a block by its `intended_usage` key.
    pub fn block(&self, intended_usage: &str) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|block| block.intended_usage == intended_usage)
    }

    /// True when this payload tells the client no further updates follow.
    pub fn signals_final(&self) -> bool {
        self.is_final == Some(true) || self.status.as_ref().is_some_and(EntryStatus::is_completed)
    }
}

/// Keyed content unit inside an [`Entry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBlock", into = "RawBlock")]
pub struct Block {
    pub intended_usage: String,
    pub payload: BlockPayload,
    /// Block fields other than the key and the payload.
    pub extra: Map<String, Value>,
}

/// The payload carried by a [`Block`], selected by which payload field is present.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockPayload {
    Markdown(MarkdownBlock),
    Patch(PatchBlock),
    WebResults(WebResultsBlock),
    Other,
}

impl BlockPayload {
    /// Wire field name of this payload, `None` for [`BlockPayload::Other`].
    pub fn field_name(&self) -> Option<&'static str> {
        match self {
            Self::Markdown(_) => Some(MARKDOWN_FIELD),
            Self::Patch(_) => Some(DIFF_FIELD),
            Self::WebResults(_) => Some(WEB_RESULTS_FIELD),
            Self::Other => None,
        }
    }

    fn to_value(&self) -> Option<Value> {
        match self {
            Self::Markdown(markdown) => serde_json::to_value(markdown).ok(),
            Self::Patch(patch) => serde_json::to_value(patch).ok(),
            Self::WebResults(results) => serde_json::to_value(results).ok(),
            Self::Other => None,
        }
    }
}

impl Block {
    pub fn new(intended_usage: impl Into<String>, payload: BlockPayload) -> Self {
        Self {
            intended_usage: intended_usage.into(),
            payload,
            extra: Map::new(),
        }
    }

    pub fn markdown(&self) -> Option<&MarkdownBlock> {
        match &self.payload {
            BlockPayload::Markdown(markdown) => Some(markdown),
            _ => None,
        }
    }

    pub fn web_results(&self) -> Option<&WebResultsBlock> {
        match &self.payload {
            BlockPayload::WebResults(results) => Some(results),
            _ => None,
        }
    }

    /// Current JSON value of a named block field, payload fields included.
    pub fn field_value(&self, field: &str) -> Option<Value> {
        if self.payload.field_name() == Some(field) {
            return self.payload.to_value();
        }
        self.extra.get(field).cloned()
    }

    /// Store a JSON value under a named block field.
    ///
    /// Payload fields are read back into their typed shape; a value that does
    /// not fit that shape is rejected and the block is left untouched.
    pub fn set_field(&mut self, field: &str, value: Value) -> Result<(), PatchError> {
        let payload = match field {
            MARKDOWN_FIELD => serde_json::from_value(value)
                .map(BlockPayload::Markdown)
                .map_err(|error| PatchError::payload_shape(field, error))?,
            WEB_RESULTS_FIELD => serde_json::from_value(value)
                .map(BlockPayload::WebResults)
                .map_err(|error| PatchError::payload_shape(field, error))?,
            _ => {
                self.extra.insert(field.to_owned(), value);
                return Ok(());
            }
        };
        self.replace_payload(payload);
        Ok(())
    }

    /// Swap in a new payload. A previous payload of a different kind is kept
    /// under its wire field in `extra`.
    pub fn replace_payload(&mut self, payload: BlockPayload) {
        let previous = std::mem::replace(&mut self.payload, payload);
        if let Some(field) = previous.field_name() {
            if self.payload.field_name() != Some(field) {
                if let Some(value) = previous.to_value() {
                    self.extra.insert(field.to_owned(), value);
                }
            }
        }
        if let Some(field) = self.payload.field_name() {
            self.extra.remove(field);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawBlock {
    #[serde(default)]
    intended_usage: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl From<RawBlock> for Block {
    fn from(raw: RawBlock) -> Self {
        let RawBlock {
            intended_usage,
            mut fields,
        } = raw;

        let payload = if let Some(value) = take_present(&mut fields, MARKDOWN_FIELD) {
            typed_payload(&mut fields, MARKDOWN_FIELD, value, BlockPayload::Markdown)
        } else if let Some(value) = take_present(&mut fields, DIFF_FIELD) {
            typed_payload(&mut fields, DIFF_FIELD, value, BlockPayload::Patch)
        } else if let Some(value) = take_present(&mut fields, WEB_RESULTS_FIELD) {
            typed_payload(&mut fields, WEB_RESULTS_FIELD, value, BlockPayload::WebResults)
        } else {
            BlockPayload::Other
        };

        Self {
            intended_usage,
            payload,
            extra: fields,
        }
    }
}

/// Read a payload field into its typed shape. A value that does not fit is
/// kept verbatim in the block's fields so one bad block never fails the entry.
fn typed_payload<T, F>(
    fields: &mut Map<String, Value>,
    field: &str,
    value: Value,
    wrap: F,
) -> BlockPayload
where
    T: de::DeserializeOwned,
    F: FnOnce(T) -> BlockPayload,
{
    match serde_json::from_value::<T>(value.clone()) {
        Ok(payload) => wrap(payload),
        Err(error) => {
            tracing::debug!(field, %error, "keeping unreadable block payload as raw");
            fields.insert(field.to_owned(), value);
            BlockPayload::Other
        }
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        let mut fields = block.extra;
        if let (Some(field), Some(value)) = (block.payload.field_name(), block.payload.to_value()) {
            fields.insert(field.to_owned(), value);
        }
        Self {
            intended_usage: block.intended_usage,
            fields,
        }
    }
}

fn take_present(fields: &mut Map<String, Value>, key: &str) -> Option<Value> {
    match fields.remove(key) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

/// Progress marker of a markdown payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkdownProgress {
    InProgress,
    Done,
    Other(String),
}

impl MarkdownProgress {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_progress" => Self::InProgress,
            "done" => Self::Done,
            _ => Self::Other(value.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
            Self::Other(value) => value,
        }
    }
}

impl Serialize for MarkdownProgress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MarkdownProgress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// Streamed markdown answer text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkdownBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<MarkdownProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<String>>,
    /// Index in the accumulated chunk list where `chunks` splice in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_starting_offset: Option<usize>,
    /// Complete answer text; takes precedence over `chunks` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MarkdownBlock {
    /// Answer text held by this block, if any.
    pub fn text(&self) -> Option<String> {
        if let Some(answer) = self.answer.as_deref().filter(|answer| !answer.is_empty()) {
            return Some(answer.to_owned());
        }
        self.chunks
            .as_ref()
            .filter(|chunks| !chunks.is_empty())
            .map(|chunks| chunks.concat())
    }
}

/// Instruction to rewrite one block field with a list of JSON patch operations.
///
/// Both the target field and the operations are kept raw and only validated
/// when applied, so a malformed diff degrades its own block instead of the
/// whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub patches: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PatchBlock {
    /// Name of the block field this diff rewrites.
    pub fn target_field(&self) -> Result<&str, PatchError> {
        self.field
            .as_deref()
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .ok_or_else(|| PatchError::MalformedDiff("missing target field".to_owned()))
    }

    pub fn operations(&self) -> Result<Vec<PatchOperation>, PatchError> {
        let raw = match &self.patches {
            Value::Null => return Ok(Vec::new()),
            Value::Array(raw) => raw,
            other => {
                return Err(PatchError::MalformedDiff(format!(
                    "patches must be an array, found {}",
                    type_name(other)
                )))
            }
        };
        raw.iter()
            .enumerate()
            .map(|(index, raw)| {
                serde_json::from_value(raw.clone()).map_err(|error| {
                    PatchError::MalformedOperation {
                        index,
                        message: error.to_string(),
                    }
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebResultsBlock {
    #[serde(default)]
    pub web_results: Vec<WebResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WebResult {
    /// Display link for this result when both a name and a URL are present.
    pub fn source_link(&self) -> Option<SourceLink> {
        let title = self.name.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
        let url = self.url.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
        Some(SourceLink {
            title: title.to_owned(),
            url: url.to_owned(),
        })
    }
}

/// Display-ready citation derived from a web result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub title: String,
    pub url: String,
}

fn deserialize_truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::Number(number)) => Some(number.as_f64().is_some_and(|n| n != 0.0)),
        Some(Value::String(text)) => Some(!text.is_empty()),
        Some(Value::Array(_)) | Some(Value::Object(_)) => Some(true),
    })
}

fn deserialize_lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}
