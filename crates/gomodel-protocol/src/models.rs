use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Chat,
    Completion,
    Embedding,
    Image,
    Audio,
    All,
}

impl ModelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCategory::Chat => "chat",
            ModelCategory::Completion => "completion",
            ModelCategory::Embedding => "embedding",
            ModelCategory::Image => "image",
            ModelCategory::Audio => "audio",
            ModelCategory::All => "all",
        }
    }
}

impl std::str::FromStr for ModelCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "chat" => Ok(ModelCategory::Chat),
            "completion" => Ok(ModelCategory::Completion),
            "embedding" => Ok(ModelCategory::Embedding),
            "image" => Ok(ModelCategory::Image),
            "audio" => Ok(ModelCategory::Audio),
            "all" => Ok(ModelCategory::All),
            other => Err(format!("unknown model category: {other}")),
        }
    }
}

/// One catalog entry as served by `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, owned_by: impl Into<String>, created: i64) -> Self {
        Self {
            id: id.into(),
            object: "model".to_string(),
            created,
            owned_by: owned_by.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelList {
    pub fn new(data: Vec<ModelInfo>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }
}
