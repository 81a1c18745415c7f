use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Text(String),
    Array(Vec<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    Float,
    Base64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<EncodingFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An embedding vector as returned by the upstream: a float array, or a
/// base64 string of packed little-endian f32 when the request asked for
/// `encoding_format: "base64"`. Both representations parse; `to_floats`
/// decodes on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingVector {
    Floats(Vec<f32>),
    Base64(String),
}

impl EmbeddingVector {
    pub fn to_floats(&self) -> Result<Vec<f32>, EmbeddingDecodeError> {
        match self {
            EmbeddingVector::Floats(values) => Ok(values.clone()),
            EmbeddingVector::Base64(encoded) => {
                use base64::Engine as _;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|_| EmbeddingDecodeError::Base64)?;
                if bytes.len() % 4 != 0 {
                    return Err(EmbeddingDecodeError::Length(bytes.len()));
                }
                Ok(bytes
                    .chunks_exact(4)
                    .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingDecodeError {
    Base64,
    Length(usize),
}

impl std::fmt::Display for EmbeddingDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingDecodeError::Base64 => write!(f, "invalid base64 embedding payload"),
            EmbeddingDecodeError::Length(len) => {
                write!(f, "embedding payload length {len} is not a multiple of 4")
            }
        }
    }
}

impl std::error::Error for EmbeddingDecodeError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub object: String,
    pub index: u32,
    pub embedding: EmbeddingVector,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    pub object: String,
    pub data: Vec<Embedding>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<EmbeddingUsage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn vector_parses_both_representations() {
        let floats: EmbeddingVector = serde_json::from_str("[0.5, -1.0]").unwrap();
        assert_eq!(floats.to_floats().unwrap(), vec![0.5, -1.0]);

        let mut packed = Vec::new();
        packed.extend_from_slice(&0.5f32.to_le_bytes());
        packed.extend_from_slice(&(-1.0f32).to_le_bytes());
        let encoded = base64::engine::general_purpose::STANDARD.encode(&packed);
        let parsed: EmbeddingVector =
            serde_json::from_value(serde_json::Value::String(encoded)).unwrap();
        assert!(matches!(parsed, EmbeddingVector::Base64(_)));
        assert_eq!(parsed.to_floats().unwrap(), vec![0.5, -1.0]);
    }

    #[test]
    fn truncated_base64_payload_is_rejected() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let vector = EmbeddingVector::Base64(encoded);
        assert_eq!(vector.to_floats(), Err(EmbeddingDecodeError::Length(3)));
    }
}
