use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use tera::{Context as TeraContext, Tera};

use super::retry::send_with_retry;
use super::{ProviderFuture, TranslationProvider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompts/system_prompt.tera");

const LANGUAGES: &[&str] = &[
    "Albanian",
    "Arabic",
    "Armenian",
    "Awadhi",
    "Azerbaijani",
    "Bashkir",
    "Basque",
    "Belarusian",
    "Bengali",
    "Bhojpuri",
    "Bosnian",
    "Brazilian Portuguese",
    "Bulgarian",
    "Cantonese (Yue)",
    "Catalan",
    "Chhattisgarhi",
    "Chinese",
    "Croatian",
    "Czech",
    "Danish",
    "Dogri",
    "Dutch",
    "English",
    "Estonian",
    "Faroese",
    "Finnish",
    "French",
    "Galician",
    "Georgian",
    "German",
    "Greek",
    "Gujarati",
    "Haryanvi",
    "Hindi",
    "Hungarian",
    "Indonesian",
    "Irish",
    "Italian",
    "Japanese",
    "Javanese",
    "Kannada",
    "Kashmiri",
    "Kazakh",
    "Konkani",
    "Korean",
    "Kyrgyz",
    "Latvian",
    "Lithuanian",
    "Macedonian",
    "Maithili",
    "Malay",
    "Maltese",
    "Mandarin",
    "Mandarin Chinese",
    "Marathi",
    "Marwari",
    "Min Nan",
    "Moldovan",
    "Mongolian",
    "Montenegrin",
    "Nepali",
    "Norwegian",
    "Oriya",
    "Pashto",
    "Persian (Farsi)",
    "Polish",
    "Portuguese",
    "Punjabi",
    "Rajasthani",
    "Romanian",
    "Russian",
    "Sanskrit",
    "Santali",
    "Serbian",
    "Sindhi",
    "Sinhala",
    "Slovak",
    "Slovene",
    "Slovenian",
    "Ukrainian",
    "Urdu",
    "Uzbek",
    "Vietnamese",
    "Welsh",
    "Wu",
];

#[derive(Debug, Clone)]
pub struct OpenAI {
    client: reqwest::Client,
    key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OpenAI {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.trim().is_empty() {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn chat(&self, text: &str, from_lang: &str, to_lang: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system_prompt(from_lang, to_lang)?},
                {"role": "user", "content": text},
            ]
        });

        let response = send_with_retry("OpenAI", || {
            self.client
                .post(&url)
                .bearer_auth(&self.key)
                .json(&body)
        })
        .await?;
        if !response.status.is_success() {
            return Err(anyhow!(
                "OpenAI API error ({}): {}",
                response.status,
                extract_openai_error(&response.body).unwrap_or(response.body)
            ));
        }
        extract_completion(&response.body)
    }
}

impl TranslationProvider for OpenAI {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        from_lang: &'a str,
        to_lang: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(self.chat(text, from_lang, to_lang))
    }

    fn languages(&self) -> Vec<String> {
        LANGUAGES.iter().map(|lang| lang.to_string()).collect()
    }
}

pub fn system_prompt(from_lang: &str, to_lang: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("from_lang", from_lang.trim());
    context.insert("to_lang", to_lang.trim());
    Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render system prompt")
}

fn extract_completion(body: &str) -> Result<String> {
    let payload: ChatResponse =
        serde_json::from_str(body).with_context(|| "failed to parse OpenAI response JSON")?;
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| anyhow!("no translation returned from OpenAI"))
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts: Vec<String> = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect();
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
