// src/services/moderation.rs
use crate::errors::PipelineError;
use crate::models::{ComplianceVerdict, ContentKind};
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Evaluates campaign text against a content policy.
#[async_trait]
pub trait ContentModerator: Send + Sync {
    async fn evaluate(
        &self,
        text: &str,
        kind: ContentKind,
    ) -> Result<ComplianceVerdict, PipelineError>;

    fn name(&self) -> &str;
}

const DISCRIMINATORY_TERMS: &[&str] = &[
    // age
    "too old",
    "too young",
    "elderly",
    "seniors only",
    "young people only",
    // gender
    "men only",
    "women only",
    "boys only",
    "girls only",
    "male only",
    "female only",
    // race / ethnicity
    "whites only",
    "blacks only",
    "asians only",
    "latinos only",
    "hispanics only",
    // religion
    "christians only",
    "muslims only",
    "jews only",
    "religious only",
    // orientation
    "straight only",
    "gay only",
    "heterosexual only",
    // disability
    "healthy only",
    "disabled only",
    "handicapped only",
    "discrimination",
    "segregation",
    "exclude",
    "ban",
    "prohibit based on",
];

const ILLEGAL_TERMS: &[&str] = &[
    // violence
    "violence",
    "harm",
    "hurt",
    "kill",
    "attack",
    "weapon",
    "gun",
    "knife",
    // substances
    "drugs",
    "cocaine",
    "heroin",
    "marijuana",
    "cannabis",
    "illegal substances",
    // hate speech
    "hate",
    "racist",
    "sexist",
    "homophobic",
    "transphobic",
    "nazi",
    "supremacy",
    // adult
    "pornography",
    "explicit",
    "adult content",
    "sexual content",
    // fraud
    "get rich quick",
    "guaranteed money",
    "free money",
    "pyramid scheme",
    "scam",
    // medical claims
    "cure cancer",
    "miracle cure",
    "guaranteed results",
    "medical breakthrough",
    // false claims
    "guaranteed",
    "instant results",
    "100% effective",
    "miracle",
    "magic",
];

const PROMOTIONAL_TERMS: &[&str] = &["guaranteed", "instant", "miracle", "magic", "100%", "free money"];

/// More promotional terms than this fails the message.
const PROMOTIONAL_LIMIT: usize = 2;

const DISCRIMINATORY_TARGETING: &[&str] = &[
    "exclude",
    "only",
    "ban",
    "prohibit",
    "not allowed",
    "forbidden",
    "whites only",
    "blacks only",
    "men only",
    "women only",
    "straight only",
];

/// Case-insensitive substring scan against curated term lists.
pub struct KeywordModerator;

impl KeywordModerator {
    fn check_message(&self, message: &str) -> ComplianceVerdict {
        let lower = message.to_lowercase();

        let flagged = matches(&lower, DISCRIMINATORY_TERMS);
        if !flagged.is_empty() {
            return ComplianceVerdict::violation(
                format!(
                    "Uncompliant message due to discriminatory content: {}",
                    flagged.join(", ")
                ),
                flagged,
            );
        }

        let flagged = matches(&lower, ILLEGAL_TERMS);
        if !flagged.is_empty() {
            return ComplianceVerdict::violation(
                format!(
                    "Uncompliant message due to inappropriate content: {}",
                    flagged.join(", ")
                ),
                flagged,
            );
        }

        let flagged = matches(&lower, PROMOTIONAL_TERMS);
        if flagged.len() > PROMOTIONAL_LIMIT {
            return ComplianceVerdict::violation(
                format!(
                    "Uncompliant message due to excessive promotional claims: {}",
                    flagged.join(", ")
                ),
                flagged,
            );
        }

        ComplianceVerdict::compliant("Campaign message passed content moderation checks")
    }

    fn check_audience(&self, audience: &str) -> ComplianceVerdict {
        let lower = audience.to_lowercase();

        // Age targeting is allowed: any mention of "age" lifts the whole check.
        if lower.contains("age") {
            return ComplianceVerdict::compliant("Target audience passed content moderation checks");
        }

        let flagged = matches(&lower, DISCRIMINATORY_TARGETING);
        if !flagged.is_empty() {
            return ComplianceVerdict::violation(
                format!(
                    "Uncompliant targeting due to discriminatory audience selection: {}",
                    flagged.join(", ")
                ),
                flagged,
            );
        }

        ComplianceVerdict::compliant("Target audience passed content moderation checks")
    }
}

fn matches(haystack: &str, terms: &[&str]) -> Vec<String> {
    terms
        .iter()
        .filter(|term| haystack.contains(**term))
        .map(|term| term.to_string())
        .collect()
}

#[async_trait]
impl ContentModerator for KeywordModerator {
    async fn evaluate(
        &self,
        text: &str,
        kind: ContentKind,
    ) -> Result<ComplianceVerdict, PipelineError> {
        let verdict = match kind {
            ContentKind::Message => self.check_message(text),
            ContentKind::Audience => self.check_audience(text),
        };

        if verdict.is_compliant {
            info!("{:?} passed keyword moderation", kind);
        } else {
            warn!("{:?} failed keyword moderation: {}", kind, verdict.reason);
        }
        Ok(verdict)
    }

    fn name(&self) -> &str {
        "keywords"
    }
}

const CLASSIFIER_PROMPT: &str = r#"
You are a compliance reviewer for advertising campaigns. Review the text below
and decide whether it can be published.

Reject text that:
- discriminates on age, gender, race, ethnicity, religion, sexual orientation or disability
- promotes violence, weapons, drugs, hate speech or adult content
- makes fraudulent, medical or unrealistic guaranteed claims
- uses excessive promotional superlatives

Return only JSON matching this structure:
{
    "is_compliant": true,
    "violations": ["..."],
    "reason": "..."
}
"#;

#[derive(Debug, Deserialize)]
struct ClassifierVerdict {
    is_compliant: bool,
    #[serde(default)]
    violations: Vec<String>,
    reason: String,
}

/// Remote classifier through the OpenAI chat completions API.
pub struct OpenAIModerator {
    api_key: String,
    model: String,
    client: Client,
    timeout: Duration,
}

impl OpenAIModerator {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            api_key,
            model,
            client: Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl ContentModerator for OpenAIModerator {
    async fn evaluate(
        &self,
        text: &str,
        kind: ContentKind,
    ) -> Result<ComplianceVerdict, PipelineError> {
        let subject = match kind {
            ContentKind::Message => "Campaign message",
            ContentKind::Audience => "Target audience",
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": CLASSIFIER_PROMPT },
                    { "role": "user", "content": format!("{}: {}", subject, text) }
                ],
                "response_format": { "type": "json_object" }
            }))
            .send()
            .await
            .map_err(|e| PipelineError::Moderation(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Moderation(format!("OpenAI error: {}", error_text)));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Moderation(format!("Failed to parse OpenAI response: {}", e)))?;

        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| PipelineError::Moderation("No content in OpenAI response".to_string()))?;

        parse_classifier_verdict(content)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Anything that is not the expected JSON object is an error, never a pass.
fn parse_classifier_verdict(content: &str) -> Result<ComplianceVerdict, PipelineError> {
    let parsed: ClassifierVerdict = serde_json::from_str(content.trim()).map_err(|e| {
        PipelineError::Moderation(format!("Malformed compliance verdict: {}", e))
    })?;

    Ok(ComplianceVerdict {
        is_compliant: parsed.is_compliant,
        reason: parsed.reason,
        flagged: parsed.violations,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Simulates a classifier that answers with garbage.
    pub struct BrokenModerator;

    #[async_trait]
    impl ContentModerator for BrokenModerator {
        async fn evaluate(&self, _: &str, _: ContentKind) -> Result<ComplianceVerdict, PipelineError> {
            parse_classifier_verdict("Sure! The text looks fine to me.")
        }

        fn name(&self) -> &str {
            "broken"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn message(text: &str) -> ComplianceVerdict {
        KeywordModerator.evaluate(text, ContentKind::Message).await.unwrap()
    }

    async fn audience(text: &str) -> ComplianceVerdict {
        KeywordModerator.evaluate(text, ContentKind::Audience).await.unwrap()
    }

    #[tokio::test]
    async fn test_clean_message_passes() {
        let verdict = message("Stay fresh this summer with our new drinks").await;
        assert!(verdict.is_compliant);
        assert!(verdict.flagged.is_empty());
    }

    #[tokio::test]
    async fn test_discrimination_wins_over_illegal() {
        let verdict = message("Men only, no violence").await;
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.flagged, vec!["men only"]);
        assert!(verdict.reason.contains("discriminatory content"));
    }

    #[tokio::test]
    async fn test_illegal_terms_are_flagged() {
        let verdict = message("A MIRACLE CURE for everyone").await;
        assert!(!verdict.is_compliant);
        assert!(verdict.reason.starts_with("Uncompliant message due to inappropriate content"));
        assert!(verdict.flagged.contains(&"miracle cure".to_string()));
        assert!(verdict.flagged.contains(&"miracle".to_string()));
    }

    #[tokio::test]
    async fn test_two_promotional_terms_are_tolerated() {
        let verdict = message("Instant refreshment, 100% natural").await;
        assert!(verdict.is_compliant);
    }

    #[tokio::test]
    async fn test_discriminatory_audience() {
        let verdict = audience("Men only").await;
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.flagged, vec!["only", "men only"]);
    }

    #[tokio::test]
    async fn test_audience_mentioning_age_is_exempt() {
        assert!(audience("Adults aged 25-40").await.is_compliant);
        // The exemption applies to the whole text
        assert!(audience("Men only, any age").await.is_compliant);
    }

    #[test]
    fn test_classifier_verdict_parsing() {
        let verdict = parse_classifier_verdict(
            r#"{"is_compliant": false, "violations": ["weapon"], "reason": "Mentions weapons"}"#,
        )
        .unwrap();
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.flagged, vec!["weapon"]);

        let verdict = parse_classifier_verdict(r#"{"is_compliant": true, "reason": "ok"}"#).unwrap();
        assert!(verdict.is_compliant);
    }

    #[test]
    fn test_malformed_classifier_verdict_is_an_error() {
        assert!(matches!(
            parse_classifier_verdict("looks fine"),
            Err(PipelineError::Moderation(_))
        ));
        assert!(parse_classifier_verdict(r#"{"reason": "missing flag"}"#).is_err());
    }
}
