//! Environment configuration.

use std::env;

use search_api::{AskRequest, SearchApiConfig};

pub const BASE_URL_ENV_VAR: &str = "SEARCHTERM_BASE_URL";
pub const COOKIES_ENV_VAR: &str = "SEARCHTERM_COOKIES";
pub const MODE_ENV_VAR: &str = "SEARCHTERM_MODE";
pub const MODEL_ENV_VAR: &str = "SEARCHTERM_MODEL";
pub const LOG_ENV_VAR: &str = "SEARCHTERM_LOG";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub base_url: Option<String>,
    /// `name=value; name=value`
    pub cookies: Option<String>,
    pub mode: Option<String>,
    pub model: Option<String>,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_string_opt(BASE_URL_ENV_VAR),
            cookies: env_string_opt(COOKIES_ENV_VAR),
            mode: env_string_opt(MODE_ENV_VAR),
            model: env_string_opt(MODEL_ENV_VAR),
            log_filter: env_string_opt(LOG_ENV_VAR),
        }
    }

    pub fn search_config(&self) -> SearchApiConfig {
        let mut config = SearchApiConfig::new();
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        if let Some(cookies) = &self.cookies {
            config = config.with_cookie_header(cookies);
        }
        config
    }

    pub fn ask_request(&self, query: &str) -> AskRequest {
        let mut request = AskRequest::new(query);
        if let Some(mode) = &self.mode {
            request = request.with_mode(mode.clone());
        }
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        request
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_owned())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn env_defaults_are_unset() {
        let _lock = env_lock();
        let _g1 = set_env_guard(BASE_URL_ENV_VAR, None);
        let _g2 = set_env_guard(COOKIES_ENV_VAR, None);
        let _g3 = set_env_guard(MODE_ENV_VAR, None);
        let _g4 = set_env_guard(MODEL_ENV_VAR, None);
        let _g5 = set_env_guard(LOG_ENV_VAR, None);

        let config = EnvConfig::from_env();
        assert_eq!(config, EnvConfig::default());
        assert_eq!(config.search_config().base_url, "https://www.perplexity.ai");
        assert_eq!(config.ask_request("q").params.mode, "concise");
    }

    #[test]
    fn env_values_flow_into_request_config() {
        let _lock = env_lock();
        let _g1 = set_env_guard(BASE_URL_ENV_VAR, Some("http://127.0.0.1:8080"));
        let _g2 = set_env_guard(COOKIES_ENV_VAR, Some("session=abc; csrf=xyz"));
        let _g3 = set_env_guard(MODE_ENV_VAR, Some("copilot"));
        let _g4 = set_env_guard(MODEL_ENV_VAR, Some("pplx_pro"));
        let _g5 = set_env_guard(LOG_ENV_VAR, Some("debug"));

        let config = EnvConfig::from_env();
        assert_eq!(config.log_filter.as_deref(), Some("debug"));

        let search = config.search_config();
        assert_eq!(search.base_url, "http://127.0.0.1:8080");
        assert_eq!(search.cookies.get("session"), Some(&"abc".to_owned()));
        assert_eq!(search.cookies.get("csrf"), Some(&"xyz".to_owned()));

        let request = config.ask_request("q");
        assert_eq!(request.params.mode, "copilot");
        assert_eq!(request.params.model_preference.as_deref(), Some("pplx_pro"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let _lock = env_lock();
        let _g1 = set_env_guard(BASE_URL_ENV_VAR, Some("  "));
        let _g2 = set_env_guard(COOKIES_ENV_VAR, Some(""));
        let config = EnvConfig::from_env();
        assert!(config.base_url.is_none());
        assert!(config.cookies.is_none());
    }
}
