//! Prompt assembly.
//!
//! A prompt is an ordered list of [`PromptMessage`]s: the system instruction first, then the
//! user's text, then a reference to the user's image. [`build_prompt`] is a pure function of its
//! inputs; all I/O (staging, upload, the completion call) happens around it.

use serde::{Serialize, Serializer};

/// A URL the model can fetch an image from: a `data:` URI or a public blob URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One entry of the prompt sent to the completion API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptMessage {
    SystemText(String),
    UserText(String),
    UserImageRef(ImageRef),
}

impl PromptMessage {
    pub fn role(&self) -> Role {
        match self {
            PromptMessage::SystemText(_) => Role::System,
            PromptMessage::UserText(_) | PromptMessage::UserImageRef(_) => Role::User,
        }
    }
}

/// Build the prompt for one chat turn.
///
/// `text` is expected to be trimmed and non-empty already; blank text is skipped regardless.
pub fn build_prompt(system_prompt: &str, text: Option<&str>, image: Option<&ImageRef>) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(3);
    messages.push(PromptMessage::SystemText(system_prompt.to_string()));

    if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
        messages.push(PromptMessage::UserText(text.to_string()));
    }

    if let Some(image) = image {
        messages.push(PromptMessage::UserImageRef(image.clone()));
    }

    messages
}

// Wire format of the OpenAI chat completions API

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: WireContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

impl Serialize for PromptMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let content = match self {
            PromptMessage::SystemText(text) | PromptMessage::UserText(text) => WireContent::Text(text),
            PromptMessage::UserImageRef(image) => WireContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl { url: image.as_str() },
            }]),
        };

        WireMessage {
            role: self.role(),
            content,
        }
        .serialize(serializer)
    }
}
