// src/extract.rs

use crate::config::VisionConfig;
use crate::receipt::{ReceiptDraft, normalize};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use urlencoding::encode;

/// The prompt that instructs the model to read a shopping receipt photo and
/// answer with structured data. Field names are the Indonesian ones the rest
/// of the system uses.
const EXTRACTION_PROMPT: &str = r#"Ekstrak informasi dari gambar struk belanja berikut secara akurat dan terstruktur.
Ambil data berikut:
- Tanggal transaksi
- Nama toko
- Total belanja
- Daftar item dan harga (jika tersedia)

Format hasil dalam JSON seperti ini:
{
  "tanggal": "2025-10-21",
  "toko": "Indomaret Cibodas",
  "total": "125000",
  "items": [
    { "nama": "Mie Goreng", "harga": "3000" },
    { "nama": "Air Mineral", "harga": "5000" }
  ]
}

Ketentuan:
- Jika informasi tidak tersedia, isi dengan string kosong ("")
- Jangan gunakan null, undefined, atau komentar tambahan
- Pastikan format JSON valid dan bisa langsung diparsing
- Gunakan bahasa Indonesia untuk nama toko dan item
- Jangan tambahkan penjelasan di luar JSON"#;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("vision service unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("vision service returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("no usable JSON in model reply: {0}")]
    MalformedReply(String),
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

/// Client for the vision model's `generateContent` endpoint.
///
/// Stateless between calls and safe to share across handlers. No timeout is
/// configured; a hung upstream call hangs the one user action that made it.
pub struct ReceiptExtractor {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ReceiptExtractor {
    pub fn new(config: VisionConfig) -> Self {
        info!(model = %config.model, "Vision extraction configured");
        ReceiptExtractor {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            api_key: config.api_key,
        }
    }

    /// Send one receipt photo to the model and turn its reply into a draft.
    pub async fn extract(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ReceiptDraft, ExtractError> {
        info!(bytes = image.len(), mime = %mime_type, "Sending receipt image for extraction");

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(EXTRACTION_PROMPT.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: STANDARD.encode(image),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                top_k: 32,
                top_p: 1,
                max_output_tokens: 4096,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            encode(&self.api_key)
        );

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Upstream { status, body });
        }

        let raw = response.text().await?;
        let reply: GenerateContentResponse = serde_json::from_str(&raw)
            .map_err(|e| ExtractError::MalformedReply(format!("undecodable reply envelope: {e}")))?;

        let text = reply
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
            .ok_or_else(|| ExtractError::MalformedReply("reply carried no text part".to_string()))?;

        let span = find_json_object(text)
            .ok_or_else(|| ExtractError::MalformedReply("no JSON object in reply text".to_string()))?;

        let parsed: serde_json::Value = serde_json::from_str(span)
            .map_err(|e| ExtractError::MalformedReply(format!("unparsable JSON span: {e}")))?;

        let draft = normalize(&parsed);
        let (filled, total) = draft.filled_fields();
        info!(filled, total, items = draft.items.len(), "Receipt fields extracted");

        Ok(draft)
    }
}

/// Locate the first balanced `{...}` span in `text`.
///
/// The model is told to answer with bare JSON but in practice wraps it in
/// prose or markdown fences, so scan instead of trusting the contract.
/// String and escape state is tracked so braces inside JSON strings do not
/// count toward the balance.
fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_span_in_prose() {
        let reply = "Here is the receipt data you asked for:\n{\"toko\": \"Indomaret\"}\nLet me know if you need anything else.";
        assert_eq!(find_json_object(reply), Some("{\"toko\": \"Indomaret\"}"));
    }

    #[test]
    fn test_json_span_in_markdown_fences() {
        let reply = "```json\n{\"total\": \"125000\", \"items\": []}\n```";
        assert_eq!(
            find_json_object(reply),
            Some("{\"total\": \"125000\", \"items\": []}")
        );
    }

    #[test]
    fn test_braces_inside_strings_do_not_close_the_span() {
        let reply = r#"{"toko": "Toko {Murah}", "total": "5000"}"#;
        assert_eq!(find_json_object(reply), Some(reply));
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let reply = r#"{"toko": "Toko \"}\" Jaya"}"#;
        assert_eq!(find_json_object(reply), Some(reply));
    }

    #[test]
    fn test_nested_objects_balance() {
        let reply = r#"noise {"a": {"b": {"c": 1}}} trailing {"d": 2}"#;
        assert_eq!(find_json_object(reply), Some(r#"{"a": {"b": {"c": 1}}}"#));
    }

    #[test]
    fn test_no_object_present() {
        assert_eq!(find_json_object("Maaf, gambar tidak terbaca."), None);
        assert_eq!(find_json_object(""), None);
    }

    #[test]
    fn test_unclosed_object() {
        assert_eq!(find_json_object("{\"toko\": \"Indomaret\""), None);
    }
}
