use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::retry::send_with_retry;
use super::{ProviderFuture, TranslationProvider};

const DEFAULT_BASE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

const LANGUAGES: &[&str] = &[
    "ar", "bg", "bn", "bs", "ca", "cs", "da", "de", "el", "en", "es", "et", "fa", "fi", "fr",
    "ga", "gu", "he", "hi", "hr", "hu", "id", "it", "ja", "ka", "kk", "ko", "lt", "lv", "mk",
    "mn", "ms", "mt", "nl", "no", "pl", "pt", "ro", "ru", "sk", "sl", "sq", "sr", "sv", "th",
    "tr", "uk", "ur", "uz", "vi", "zh-CN", "zh-TW",
];

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("arabic", "ar"),
    ("bulgarian", "bg"),
    ("bengali", "bn"),
    ("bosnian", "bs"),
    ("catalan", "ca"),
    ("czech", "cs"),
    ("danish", "da"),
    ("german", "de"),
    ("greek", "el"),
    ("english", "en"),
    ("spanish", "es"),
    ("estonian", "et"),
    ("persian", "fa"),
    ("finnish", "fi"),
    ("french", "fr"),
    ("irish", "ga"),
    ("gujarati", "gu"),
    ("hebrew", "he"),
    ("hindi", "hi"),
    ("croatian", "hr"),
    ("hungarian", "hu"),
    ("indonesian", "id"),
    ("italian", "it"),
    ("japanese", "ja"),
    ("georgian", "ka"),
    ("kazakh", "kk"),
    ("korean", "ko"),
    ("lithuanian", "lt"),
    ("latvian", "lv"),
    ("macedonian", "mk"),
    ("mongolian", "mn"),
    ("malay", "ms"),
    ("maltese", "mt"),
    ("dutch", "nl"),
    ("norwegian", "no"),
    ("polish", "pl"),
    ("portuguese", "pt"),
    ("romanian", "ro"),
    ("russian", "ru"),
    ("slovak", "sk"),
    ("slovenian", "sl"),
    ("albanian", "sq"),
    ("serbian", "sr"),
    ("swedish", "sv"),
    ("thai", "th"),
    ("turkish", "tr"),
    ("ukrainian", "uk"),
    ("urdu", "ur"),
    ("uzbek", "uz"),
    ("vietnamese", "vi"),
    ("chinese", "zh-CN"),
    ("simplified chinese", "zh-CN"),
    ("traditional chinese", "zh-TW"),
];

/// Resolves a supported code or an English language name to the code the
/// API expects.
pub fn language_code(lang: &str) -> Result<&'static str> {
    let lang = lang.trim();
    if let Some(code) = LANGUAGES.iter().find(|code| code.eq_ignore_ascii_case(lang)) {
        return Ok(*code);
    }
    let name = lang.to_lowercase();
    LANGUAGE_NAMES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, code)| *code)
        .ok_or_else(|| anyhow!("unsupported language for Google Translate: {}", lang))
}

/// Cloud Translation (v2). Accepts ISO 639-1 codes or English language
/// names, which are mapped to codes before the request is built.
#[derive(Debug, Clone)]
pub struct Google {
    client: reqwest::Client,
    key: String,
    base_url: String,
}

impl Google {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.trim().is_empty() {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    async fn request(&self, text: &str, from_lang: &str, to_lang: &str) -> Result<String> {
        let body = request_body(text, from_lang, to_lang)?;

        let response = send_with_retry("Google", || {
            self.client
                .post(&self.base_url)
                .header("x-goog-api-key", self.key.as_str())
                .json(&body)
        })
        .await?;
        if !response.status.is_success() {
            return Err(anyhow!(
                "Google Translate API error ({}): {}",
                response.status,
                response.body.trim()
            ));
        }
        extract_translation(&response.body)
    }
}

impl TranslationProvider for Google {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        from_lang: &'a str,
        to_lang: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(self.request(text, from_lang, to_lang))
    }

    fn languages(&self) -> Vec<String> {
        LANGUAGES.iter().map(|lang| lang.to_string()).collect()
    }
}

fn request_body(text: &str, from_lang: &str, to_lang: &str) -> Result<serde_json::Value> {
    let mut body = json!({
        "q": text,
        "target": language_code(to_lang)?,
        "format": "text",
    });
    let source = from_lang.trim();
    if !source.is_empty() && !source.eq_ignore_ascii_case("auto") {
        body["source"] = json!(language_code(source)?);
    }
    Ok(body)
}

fn extract_translation(body: &str) -> Result<String> {
    let payload: GoogleResponse = serde_json::from_str(body)
        .with_context(|| "failed to parse Google Translate response JSON")?;
    payload
        .data
        .translations
        .into_iter()
        .next()
        .map(|item| item.translated_text)
        .ok_or_else(|| anyhow!("no translation returned from Google Translate"))
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    data: GoogleData,
}

#[derive(Debug, Deserialize)]
struct GoogleData {
    #[serde(default)]
    translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
struct GoogleTranslation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_translated_text() {
        let body = r#"{"data":{"translations":[{"translatedText":"Zdravo svet","detectedSourceLanguage":"en"}]}}"#;
        assert_eq!(extract_translation(body).unwrap(), "Zdravo svet");
    }

    #[test]
    fn language_names_map_to_codes() {
        assert_eq!(language_code("Slovenian").unwrap(), "sl");
        assert_eq!(language_code(" english ").unwrap(), "en");
        assert_eq!(language_code("sl").unwrap(), "sl");
        assert_eq!(language_code("zh-cn").unwrap(), "zh-CN");
        assert!(language_code("Klingon").is_err());
    }

    #[test]
    fn request_body_uses_codes() {
        let body = request_body("Hello", "English", "Slovenian").unwrap();
        assert_eq!(body["target"], "sl");
        assert_eq!(body["source"], "en");

        let auto = request_body("Hello", "auto", "de").unwrap();
        assert_eq!(auto["target"], "de");
        assert!(auto.get("source").is_none());
    }

    #[tokio::test]
    async fn unknown_target_fails_before_any_request() {
        let google = Google::new("key").with_base_url("http://127.0.0.1:9");
        let err = google
            .translate("Hello", "English", "Klingon")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Klingon"));
    }

    #[test]
    fn missing_translations_is_an_error() {
        assert!(extract_translation(r#"{"data":{}}"#).is_err());
        assert!(extract_translation("<html>").is_err());
    }
}
