//! The `llm` side of the AI collaborator: which providers exist, and one
//! system + user exchange against the configured one.

use std::fmt;
use std::time::Instant;

use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use tracing::debug;

use archforge_core::AiSettings;

use crate::AiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
    Groq,
    Mistral,
    DeepSeek,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Google,
        Provider::Ollama,
        Provider::Groq,
        Provider::Mistral,
        Provider::DeepSeek,
    ];

    /// Settings name, case-insensitive.
    pub fn parse(name: &str) -> Result<Self, AiError> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| AiError::UnknownProvider(name.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Ollama => "ollama",
            Provider::Groq => "groq",
            Provider::Mistral => "mistral",
            Provider::DeepSeek => "deepseek",
        }
    }

    /// Local Ollama runs without a key.
    pub fn needs_api_key(self) -> bool {
        self != Provider::Ollama
    }

    fn backend(self) -> LLMBackend {
        match self {
            Provider::OpenAi => LLMBackend::OpenAI,
            Provider::Anthropic => LLMBackend::Anthropic,
            Provider::Google => LLMBackend::Google,
            Provider::Ollama => LLMBackend::Ollama,
            Provider::Groq => LLMBackend::Groq,
            Provider::Mistral => LLMBackend::Mistral,
            Provider::DeepSeek => LLMBackend::DeepSeek,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated provider/model/key triple. The key never shows up in `Debug`.
#[derive(Clone)]
pub struct Engine {
    provider: Provider,
    model: String,
    api_key: Option<String>,
}

impl Engine {
    pub fn from_settings(settings: &AiSettings) -> Result<Self, AiError> {
        if settings.provider.trim().is_empty() {
            return Err(AiError::NotConfigured);
        }
        let provider = Provider::parse(&settings.provider)?;
        let model = settings.model.trim();
        let api_key = Some(settings.api_key.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        if model.is_empty() || (provider.needs_api_key() && api_key.is_none()) {
            return Err(AiError::NotConfigured);
        }
        Ok(Self {
            provider,
            model: model.to_string(),
            api_key,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn builder(&self, system: &str) -> LLMBuilder {
        let builder = LLMBuilder::new()
            .backend(self.provider.backend())
            .model(&self.model)
            .system(system);
        match &self.api_key {
            Some(key) => builder.api_key(key),
            None => builder,
        }
    }

    /// Send `user` under `system` and return the reply text.
    pub async fn exchange(&self, system: &str, user: &str) -> Result<String, AiError> {
        let llm = self
            .builder(system)
            .build()
            .map_err(|e| AiError::from_message(format!("{} client: {e}", self.provider)))?;

        let started = Instant::now();
        let messages = vec![ChatMessage::user().content(user).build()];
        let response = llm
            .chat(&messages)
            .await
            .map_err(|e| AiError::from_message(format!("{} chat: {e}", self.provider)))?;
        debug!(
            provider = %self.provider,
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "provider answered"
        );
        reply_text(response.text())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn reply_text(text: Option<String>) -> Result<String, AiError> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(AiError::EmptyResponse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str, model: &str, key: &str) -> AiSettings {
        AiSettings {
            provider: provider.into(),
            model: model.into(),
            api_key: key.into(),
        }
    }

    #[test]
    fn provider_names_round_trip() {
        for p in Provider::ALL {
            assert_eq!(Provider::parse(p.as_str()).unwrap(), p);
        }
        assert_eq!(Provider::parse(" OpenAI ").unwrap(), Provider::OpenAi);
    }

    #[test]
    fn unknown_provider_is_typed() {
        match Provider::parse("gemini-web") {
            Err(AiError::UnknownProvider(p)) => assert_eq!(p, "gemini-web"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn engine_needs_model_and_key_except_for_ollama() {
        assert!(matches!(
            Engine::from_settings(&AiSettings::default()),
            Err(AiError::NotConfigured)
        ));
        assert!(matches!(
            Engine::from_settings(&settings("anthropic", "claude", "")),
            Err(AiError::NotConfigured)
        ));
        assert!(matches!(
            Engine::from_settings(&settings("openai", "  ", "sk")),
            Err(AiError::NotConfigured)
        ));
        let local = Engine::from_settings(&settings("ollama", "llama3", "")).unwrap();
        assert_eq!(local.provider(), Provider::Ollama);
        assert_eq!(local.model(), "llama3");
    }

    #[test]
    fn debug_output_hides_the_key() {
        let engine = Engine::from_settings(&settings("groq", "mixtral", "sk-secret")).unwrap();
        let shown = format!("{engine:?}");
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn blank_reply_is_empty_response() {
        assert!(matches!(reply_text(None), Err(AiError::EmptyResponse)));
        assert!(matches!(reply_text(Some(" \n".into())), Err(AiError::EmptyResponse)));
        assert_eq!(reply_text(Some("{}".into())).unwrap(), "{}");
    }
}
