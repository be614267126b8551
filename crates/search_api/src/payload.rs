use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MODE: &str = "concise";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_SOURCE: &str = "web";
const API_VERSION: &str = "2.18";

/// Request body for the streaming ask endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub query_str: String,
    pub params: AskParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskParams {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preference: Option<String>,
    pub sources: Vec<String>,
    pub language: String,
    /// Client-generated id for this ask; fresh per request.
    pub frontend_uuid: String,
    /// Backend id of the previous answer when asking a follow-up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backend_uuid: Option<String>,
    #[serde(default)]
    pub is_incognito: bool,
    pub query_source: String,
    /// Default: true. Asks the server for the block-based entry format.
    #[serde(default = "default_true")]
    pub use_schematized_api: bool,
    /// Default: false. Answer text arrives only inside blocks.
    #[serde(default)]
    pub send_back_text_in_streaming_api: bool,
    pub version: String,
}

fn default_true() -> bool {
    true
}

impl Default for AskParams {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE.to_owned(),
            model_preference: None,
            sources: vec![DEFAULT_SOURCE.to_owned()],
            language: DEFAULT_LANGUAGE.to_owned(),
            frontend_uuid: Uuid::new_v4().to_string(),
            last_backend_uuid: None,
            is_incognito: false,
            query_source: "home".to_owned(),
            use_schematized_api: true,
            send_back_text_in_streaming_api: false,
            version: API_VERSION.to_owned(),
        }
    }
}

impl AskRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query_str: query.into(),
            params: AskParams::default(),
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.params.mode = mode.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.params.model_preference = Some(model.into());
        self
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.params.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.params.language = language.into();
        self
    }

    /// Ask as a follow-up to a previous answer.
    pub fn follow_up(mut self, last_backend_uuid: impl Into<String>) -> Self {
        self.params.last_backend_uuid = Some(last_backend_uuid.into());
        self.params.query_source = "followup".to_owned();
        self
    }

    pub fn incognito(mut self, incognito: bool) -> Self {
        self.params.is_incognito = incognito;
        self
    }
}
