//! Chat-completions URL building.

use switchboard_types::llm::ProviderKind;

const CHAT_PATH: &str = "/chat/completions";

/// Endpoints to try for a chat-completions call, in order.
///
/// The second entry, when present, is only used if the first answers 404.
pub fn chat_endpoints(kind: &ProviderKind, base_url: &str) -> Vec<String> {
    let base = base_url.trim().trim_end_matches('/');

    if base.ends_with(CHAT_PATH) {
        return vec![base.to_string()];
    }

    // ZhipuAI versions its path as /v4 and never takes a /v1 prefix.
    if matches!(kind, ProviderKind::ZhipuAi) || base.contains("/v1") {
        return vec![format!("{base}{CHAT_PATH}")];
    }

    let primary = format!("{base}/v1{CHAT_PATH}");
    match kind {
        ProviderKind::Compatible(_) => vec![primary, format!("{base}{CHAT_PATH}")],
        _ => vec![primary],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic() -> ProviderKind {
        ProviderKind::Compatible("moonshot".to_string())
    }

    #[test]
    fn test_full_endpoint_used_as_is() {
        assert_eq!(
            chat_endpoints(&generic(), "https://gw.example.com/api/chat/completions/"),
            vec!["https://gw.example.com/api/chat/completions"]
        );
    }

    #[test]
    fn test_versioned_base_gets_chat_path() {
        assert_eq!(
            chat_endpoints(&ProviderKind::OpenAi, "https://api.openai.com/v1"),
            vec!["https://api.openai.com/v1/chat/completions"]
        );
        assert_eq!(
            chat_endpoints(
                &ProviderKind::Gemini,
                "https://generativelanguage.googleapis.com/v1beta/openai"
            ),
            vec!["https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"]
        );
    }

    #[test]
    fn test_zhipu_never_prefixed() {
        assert_eq!(
            chat_endpoints(&ProviderKind::ZhipuAi, "https://open.bigmodel.cn/api/paas/v4"),
            vec!["https://open.bigmodel.cn/api/paas/v4/chat/completions"]
        );
    }

    #[test]
    fn test_bare_base_gets_v1_prefix() {
        assert_eq!(
            chat_endpoints(&ProviderKind::DeepSeek, "https://api.deepseek.com"),
            vec!["https://api.deepseek.com/v1/chat/completions"]
        );
    }

    #[test]
    fn test_generic_backend_has_unversioned_fallback() {
        assert_eq!(
            chat_endpoints(&generic(), "http://localhost:8080/"),
            vec![
                "http://localhost:8080/v1/chat/completions",
                "http://localhost:8080/chat/completions",
            ]
        );
    }
}
