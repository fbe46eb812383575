use serde::Serialize;

/// One unit of message content, following the OpenAI multimodal wire schema.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Clone, Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(data_uri: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: data_uri.into(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

/// A fully assembled request: the ordered messages plus the sampling
/// parameter resolved from the template. Built fresh per request and
/// discarded after sending.
#[derive(Clone, Debug)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    pub top_p: f32,
}
