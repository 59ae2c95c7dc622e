//! Provider registry: static specs for the supported LLM backends.
//!
//! Each `ProviderSpec` describes how to reach one OpenAI-compatible endpoint:
//! keywords for model matching, env var names, API bases and prefix quirks.

use std::collections::HashMap;

/// Static specification describing one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Internal name (e.g. `"openrouter"`), also the config key.
    pub name: &'static str,
    /// Keywords to match in model names (lowercase).
    pub keywords: &'static [&'static str],
    /// Environment variable for the API key. E.g. `"OPENAI_API_KEY"`.
    pub env_key: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Vendor prefix for bare model names (gateways route `vendor/model`).
    pub prefix: Option<&'static str>,
    /// Gateways accept any model and are used as fallback.
    pub is_gateway: bool,
    /// Self-hosted endpoint; never matched by keyword alone.
    pub is_local: bool,
    pub default_api_base: Option<&'static str>,
}

/// Supported provider specifications, in matching priority order.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openrouter",
        keywords: &["openrouter"],
        env_key: "OPENROUTER_API_KEY",
        display_name: "OpenRouter",
        prefix: Some("openai"),
        is_gateway: true,
        is_local: false,
        default_api_base: Some("https://openrouter.ai/api/v1"),
    },
    ProviderSpec {
        name: "openai",
        keywords: &["openai", "gpt"],
        env_key: "OPENAI_API_KEY",
        display_name: "OpenAI",
        prefix: None,
        is_gateway: false,
        is_local: false,
        default_api_base: None,
    },
    ProviderSpec {
        name: "deepseek",
        keywords: &["deepseek"],
        env_key: "DEEPSEEK_API_KEY",
        display_name: "DeepSeek",
        prefix: None,
        is_gateway: false,
        is_local: false,
        default_api_base: Some("https://api.deepseek.com/v1"),
    },
    ProviderSpec {
        name: "groq",
        keywords: &["groq", "llama", "mixtral"],
        env_key: "GROQ_API_KEY",
        display_name: "Groq",
        prefix: None,
        is_gateway: false,
        is_local: false,
        default_api_base: Some("https://api.groq.com/openai/v1"),
    },
    ProviderSpec {
        name: "vllm",
        keywords: &["vllm"],
        env_key: "HOSTED_VLLM_API_KEY",
        display_name: "vLLM",
        prefix: None,
        is_gateway: false,
        is_local: true,
        default_api_base: None,
    },
];

/// Find a provider spec by matching keywords against a model name.
///
/// Skips gateways and local providers: those are fallback only.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let model_lower = model.to_lowercase();
    PROVIDERS.iter().find(|spec| {
        !spec.is_gateway
            && !spec.is_local
            && spec.keywords.iter().any(|kw| model_lower.contains(kw))
    })
}

/// Find a provider spec by exact name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Resolve the model name for API calls.
///
/// Prepends the spec prefix unless the model is already vendor-qualified
/// (`vendor/model`).
pub fn resolve_model_name(model: &str, spec: &ProviderSpec) -> String {
    match spec.prefix {
        Some(prefix) if !model.contains('/') => {
            format!("{prefix}/{model}")
        }
        _ => model.to_string(),
    }
}

/// Re-export the provider config from core: single source of truth.
pub use switchboard_core::config::schema::ProviderConfig;

/// Match a model name to a configured provider.
///
/// 1. Keyword match, only if that provider has an API key.
/// 2. A configured local endpoint (it serves whatever model it was started with).
/// 3. The first configured gateway.
pub fn match_provider<'a>(
    model: &str,
    providers: &'a HashMap<String, ProviderConfig>,
) -> Option<(&'a ProviderConfig, &'static ProviderSpec)> {
    if let Some(spec) = find_by_model(model) {
        if let Some(config) = providers.get(spec.name).filter(|c| c.is_configured()) {
            return Some((config, spec));
        }
    }

    PROVIDERS
        .iter()
        .filter(|s| s.is_local || s.is_gateway)
        .find_map(|spec| {
            providers
                .get(spec.name)
                .filter(|c| c.is_configured())
                .map(|c| (c, spec))
        })
}
