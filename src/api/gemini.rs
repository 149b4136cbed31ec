use async_trait::async_trait;
use base64::prelude::*;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{strip_emoji, AiGateway, AnswerEvaluation, GatewayError, LessonPrompt, VoiceAnswer};
use crate::audio::{pcm_mime_type, Utterance};
use crate::config::Config;
use crate::curriculum::Language;

/// Gemini `generateContent` over REST. One model each for text, images
/// and speech.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
    speech_model: String,
    voice_name: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.gemini_api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            speech_model: config.speech_model.clone(),
            voice_name: config.voice_name.clone(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Value, GatewayError> {
        if !self.has_api_key() {
            return Err(GatewayError::MissingApiKey);
        }

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(provider_error(status, &response_text));
        }

        serde_json::from_str(&response_text)
            .map_err(|e| GatewayError::Malformed(format!("invalid JSON: {}", e)))
    }

    async fn generate_text(&self, parts: Vec<Value>) -> Result<String, GatewayError> {
        let body = json!({ "contents": [{ "parts": parts }] });
        let response = self.generate(&self.text_model, body).await?;
        response_text(&response)
            .ok_or_else(|| GatewayError::Malformed("no text in response".to_string()))
    }

    async fn generate_json<T: DeserializeOwned>(
        &self,
        parts: Vec<Value>,
        schema: Value,
    ) -> Result<T, GatewayError> {
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        });
        let response = self.generate(&self.text_model, body).await?;
        let text = response_text(&response)
            .ok_or_else(|| GatewayError::Malformed("no JSON in response".to_string()))?;
        serde_json::from_str(&text)
            .map_err(|e| GatewayError::Malformed(format!("unexpected JSON shape: {}", e)))
    }
}

#[async_trait]
impl AiGateway for GeminiClient {
    async fn explain(&self, lesson: &LessonPrompt) -> Result<String, GatewayError> {
        let prompt = format!(
            "You are a loving, patient kindergarten teacher for the Discover curriculum in Egypt. \
             Explain the activity \"{}\" to a {}-year-old child {}. \
             Use very short, colourful sentences. Put a matching emoji after every physical \
             object you mention. Make it feel like an interactive story.",
            lesson.title,
            lesson.age,
            language_style(lesson.language)
        );
        self.generate_text(vec![json!({ "text": prompt })]).await
    }

    async fn story(&self, lesson: &LessonPrompt) -> Result<String, GatewayError> {
        let prompt = format!(
            "You are a creative storyteller. Write a very short, exciting story about \"{}\" \
             for a {}-year-old child {}. Use plenty of emoji.",
            lesson.title,
            lesson.age,
            language_style(lesson.language)
        );
        self.generate_text(vec![json!({ "text": prompt })]).await
    }

    async fn song(&self, lesson: &LessonPrompt) -> Result<String, GatewayError> {
        let prompt = format!(
            "You are a music teacher. Write a rhyming four-line song about \"{}\" \
             for a {}-year-old child {}.",
            lesson.title,
            lesson.age,
            language_style(lesson.language)
        );
        self.generate_text(vec![json!({ "text": prompt })]).await
    }

    async fn quiz_question(&self, lesson: &LessonPrompt) -> Result<String, GatewayError> {
        let opener = match lesson.language {
            Language::Ar => "\"يا بطل..\" or \"يا ذكي..\"",
            Language::En => "\"Hey champ..\" or \"Hey smarty..\"",
        };
        let prompt = format!(
            "You are a kindergarten teacher. Today's lesson is \"{}\". Ask the child \
             (age {}) ONE simple, playful question about the lesson content to check \
             understanding, {}. Start the question with {}. Use lots of emoji.",
            lesson.title,
            lesson.age,
            language_style(lesson.language),
            opener
        );
        self.generate_text(vec![json!({ "text": prompt })]).await
    }

    async fn evaluate_answer(
        &self,
        audio: &Utterance,
        question: &str,
        lesson: &LessonPrompt,
    ) -> Result<AnswerEvaluation, GatewayError> {
        let prompt = format!(
            "You are a kindergarten teacher. You asked the child (age {}) \"{}\" about the \
             lesson \"{}\". Listen to the attached spoken answer. Transcribe what the child \
             said, then write your reply: if the answer is right, praise with great \
             enthusiasm; if it is incomplete or wrong, gently give the correct idea without \
             making the child feel wrong. Reply {}.",
            lesson.age,
            question,
            lesson.title,
            language_style(lesson.language)
        );
        let schema = object_schema(&["childTranscript", "teacherFeedback"]);
        self.generate_json(vec![audio_part(audio), json!({ "text": prompt })], schema)
            .await
    }

    async fn voice_question(
        &self,
        audio: &Utterance,
        language: Language,
        age: u8,
    ) -> Result<VoiceAnswer, GatewayError> {
        let prompt = format!(
            "You are a kindergarten teacher. Listen to the question of this {}-year-old \
             child, transcribe it, and answer kindly and encouragingly {}.",
            age,
            language_style(language)
        );
        let schema = object_schema(&["childQuestion", "teacherAnswer"]);
        self.generate_json(vec![audio_part(audio), json!({ "text": prompt })], schema)
            .await
    }

    async fn evaluate_coloring(
        &self,
        png: &[u8],
        title: &str,
        language: Language,
    ) -> Result<String, GatewayError> {
        let prompt = format!(
            "You are an expert, loving kindergarten teacher. Look at the coloring page a \
             child made for the lesson \"{}\". Give short, realistic and encouraging \
             feedback for a 4-5 year old: mention the colours used, praise staying inside \
             the lines or gently encourage it next time, and celebrate the effort. \
             Reply {} with plenty of fitting emoji.",
            title,
            language_style(language)
        );
        let parts = vec![
            json!({ "text": prompt }),
            json!({
                "inlineData": {
                    "mimeType": "image/png",
                    "data": BASE64_STANDARD.encode(png)
                }
            }),
        ];
        self.generate_text(parts).await
    }

    async fn coloring_page(&self, concept: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let prompt = format!(
            "Simple black and white outline coloring page for a 4 year old child. \
             Subject: {}. Only English for any labels or text in the image, never Arabic \
             characters. Thick black outlines, high contrast, no shading, large areas that \
             are easy to color.",
            concept
        );
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let response = self.generate(&self.image_model, body).await?;

        match first_inline_data(&response) {
            Some(data) => BASE64_STANDARD
                .decode(data)
                .map(Some)
                .map_err(|e| GatewayError::Malformed(format!("image is not base64: {}", e))),
            None => Ok(None),
        }
    }

    async fn speech(&self, text: &str) -> Result<Option<String>, GatewayError> {
        let clean = strip_emoji(text);
        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("Say warmly and clearly for a child: {}", clean) }]
            }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice_name }
                    }
                }
            }
        });
        let response = self.generate(&self.speech_model, body).await?;
        let audio = first_inline_data(&response).map(str::to_string);
        if let Some(ref a) = audio {
            log::info!("[Gemini] Speech: {} base64 chars", a.len());
        }
        Ok(audio)
    }
}

fn language_style(language: Language) -> &'static str {
    match language {
        Language::Ar => "in very simple, warm and friendly Arabic",
        Language::En => "in very simple, warm and friendly English",
    }
}

fn audio_part(audio: &Utterance) -> Value {
    json!({
        "inlineData": {
            "mimeType": pcm_mime_type(),
            "data": audio.to_base64()
        }
    })
}

/// Schema for an object of required string fields.
fn object_schema(fields: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| (f.to_string(), json!({ "type": "STRING" })))
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": fields
    })
}

fn candidate_parts(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .into_iter()
        .flatten()
}

/// Concatenated text parts of the first candidate.
fn response_text(response: &Value) -> Option<String> {
    let texts: Vec<&str> = candidate_parts(response)
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

fn first_inline_data(response: &Value) -> Option<&str> {
    candidate_parts(response).find_map(|part| {
        part.get("inlineData")
            .and_then(|d| d.get("data"))
            .and_then(|d| d.as_str())
    })
}

fn provider_error(status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });
    match message {
        Some(m) => GatewayError::Provider(m),
        None => GatewayError::Provider(format!("HTTP {}: {}", status, body)),
    }
}
