//! OpenAI adapter (comment generation).
//!
//! Uses the `chat/completions` endpoint with a prompt template read from disk
//! on every call, so operators can edit it while the bot runs.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use mlk_core::{
    errors::Error,
    ports::{fallback_comment, ContentGenerator},
    Result,
};
use tracing::{debug, warn};

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const POST_TEXT_LIMIT: usize = 1000;
const COMMENT_LIMIT: usize = 200;

pub const DEFAULT_PROMPT: &str = "Write a short, natural comment on this post.\n\n\
Post text: {text_of_the_post}\n\n\
Channel topics: {topics}\n\n\
Requirements:\n\
- At most 2-3 sentences\n\
- Conversational tone\n\
- Positive or neutral\n\
- No spam, no self-promotion\n\
- On topic for the post\n\
- Reads like a real reader's reply\n\n\
Comment:";

#[derive(Clone, Debug)]
pub struct OpenAiCommenter {
    api_key: Option<String>,
    model: String,
    prompt_file: PathBuf,
    http: reqwest::Client,
}

impl OpenAiCommenter {
    /// Without an API key every call returns a fallback comment.
    pub fn new(api_key: Option<String>, model: impl Into<String>, prompt_file: PathBuf) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            model: model.into(),
            prompt_file,
            http,
        }
    }

    async fn complete(&self, api_key: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .http
            .post(ENDPOINT)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "openai completion failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;

        let text = v
            .pointer("/choices/0/message/content")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        Ok(text)
    }
}

#[async_trait]
impl ContentGenerator for OpenAiCommenter {
    async fn generate(&self, post_text: &str, topics: &[String]) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return fallback_comment();
        };

        let template = load_template(&self.prompt_file).await;
        let prompt = render_prompt(&template, post_text, topics);

        match self.complete(api_key, &prompt).await {
            Ok(raw) => match clean_comment(&raw) {
                Some(comment) => {
                    debug!(comment = %comment.chars().take(50).collect::<String>(), "comment generated");
                    comment
                }
                None => {
                    warn!("model returned an empty comment, using fallback");
                    fallback_comment()
                }
            },
            Err(e) => {
                warn!(error = %e, "comment generation failed, using fallback");
                fallback_comment()
            }
        }
    }
}

async fn load_template(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(t) if !t.trim().is_empty() => t.trim().to_string(),
        Ok(_) => DEFAULT_PROMPT.to_string(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "prompt file unavailable, using built-in prompt");
            DEFAULT_PROMPT.to_string()
        }
    }
}

/// Fill `{text_of_the_post}` and `{topics}`; a template without the post
/// placeholder gets the text appended.
pub fn render_prompt(template: &str, post_text: &str, topics: &[String]) -> String {
    let text: String = post_text.chars().take(POST_TEXT_LIMIT).collect();
    let topics_text = if topics.is_empty() {
        "general interest".to_string()
    } else {
        topics.join(", ")
    };

    let prompt = if template.contains("{text_of_the_post}") {
        template.replace("{text_of_the_post}", &text)
    } else {
        format!("{template}\n\nPost text: {text}")
    };
    prompt.replace("{topics}", &topics_text)
}

/// Trim, cap the length and strip one pair of surrounding quotes.
pub fn clean_comment(raw: &str) -> Option<String> {
    let mut comment = raw.trim().to_string();
    if comment.chars().count() > COMMENT_LIMIT {
        comment = comment.chars().take(COMMENT_LIMIT).collect::<String>() + "...";
    }
    for q in ['"', '\''] {
        if comment.len() >= 2 && comment.starts_with(q) && comment.ends_with(q) {
            comment = comment[1..comment.len() - 1].to_string();
        }
    }
    let comment = comment.trim().to_string();
    if comment.is_empty() {
        None
    } else {
        Some(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlk_core::ports::FALLBACK_COMMENTS;

    #[test]
    fn renders_placeholders() {
        let p = render_prompt(
            "Post: {text_of_the_post}\nTopics: {topics}",
            "hello",
            &["tech".to_string(), "ai".to_string()],
        );
        assert_eq!(p, "Post: hello\nTopics: tech, ai");

        let p = render_prompt("Topics: {topics}", "hello", &[]);
        assert_eq!(p, "Topics: general interest\n\nPost text: hello");
    }

    #[test]
    fn long_post_text_is_capped() {
        let long = "x".repeat(5000);
        let p = render_prompt("{text_of_the_post}", &long, &[]);
        assert_eq!(p.chars().count(), POST_TEXT_LIMIT);
    }

    #[test]
    fn cleans_model_output() {
        assert_eq!(clean_comment("  \"Nice one!\" ").as_deref(), Some("Nice one!"));
        assert_eq!(clean_comment("'ok then'").as_deref(), Some("ok then"));
        assert_eq!(clean_comment("   "), None);

        let long = "y".repeat(300);
        let c = clean_comment(&long).unwrap();
        assert_eq!(c.chars().count(), COMMENT_LIMIT + 3);
        assert!(c.ends_with("..."));
    }

    #[tokio::test]
    async fn without_key_returns_fallback() {
        let g = OpenAiCommenter::new(None, "gpt-4o-mini", PathBuf::from("missing.txt"));
        let c = g.generate("some post text", &[]).await;
        assert!(FALLBACK_COMMENTS.contains(&c.as_str()));
    }

    #[tokio::test]
    async fn missing_template_falls_back_to_builtin() {
        let t = load_template(Path::new("/nonexistent/prompt.txt")).await;
        assert_eq!(t, DEFAULT_PROMPT);
    }
}
