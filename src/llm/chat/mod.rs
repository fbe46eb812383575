pub mod openai;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::warn;
use std::error::Error as StdError;
use std::io::{self, Write};
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;

use crate::config::prompt::PromptTurn;
use crate::media::{self, MediaError};
use crate::models::chat::{ChatMessage, ContentPart, Conversation};

pub type TokenStream =
    Pin<Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>>;

/// Errors that abort a single send before any request is issued. The batch
/// moves on to the next pair; nothing is written for this one.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("turn {0} has no text, request not sent")]
    MissingText(usize),
    #[error("template contains no turns, request not sent")]
    EmptyTemplate,
    #[error(transparent)]
    Media(#[from] MediaError),
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Issue a streaming chat completion request for the conversation and
    /// return the stream of answer fragments.
    async fn send(
        &self,
        conversation: &Conversation,
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>>;

    fn model(&self) -> String;
}

/// Assemble the outgoing message list from the template turns, then append
/// the request image to the final message.
///
/// The request image rides on the final message only when that message is a
/// user turn; with any other closing role it is dropped, with a warning.
pub fn build_conversation(
    turns: &[PromptTurn],
    request_image: &Path,
    default_top_p: f32,
) -> Result<Conversation, SendError> {
    if turns.is_empty() {
        return Err(SendError::EmptyTemplate);
    }

    let mut messages = Vec::with_capacity(turns.len());
    let mut top_p = default_top_p;

    for (index, turn) in turns.iter().enumerate() {
        let role = match &turn.role {
            Some(role) => role.clone(),
            None => {
                warn!(
                    "turn {}: no role found in the prompt template, using 'user'",
                    index
                );
                "user".to_string()
            }
        };

        let text = turn.text.clone().ok_or(SendError::MissingText(index))?;

        let mut content = vec![ContentPart::text(text)];
        if role == "user" {
            if let Some(image_path) = &turn.image_path {
                content.push(ContentPart::image(media::prepare_image(image_path)?));
            }
        }

        if let Some(value) = turn.top_p {
            top_p = value;
        }

        messages.push(ChatMessage { role, content });
    }

    match messages.last_mut() {
        Some(last) if last.role == "user" => {
            last.content
                .push(ContentPart::image(media::prepare_image(request_image)?));
        }
        _ => {
            warn!(
                "last template turn is not a user turn, request image '{}' not attached",
                request_image.display()
            );
        }
    }

    Ok(Conversation { messages, top_p })
}

/// Drain the stream, echoing each fragment to stdout as it arrives, and
/// return the full concatenated answer once the stream is exhausted.
pub async fn consume_stream(
    mut stream: TokenStream,
) -> Result<String, Box<dyn StdError + Send + Sync>> {
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        print!("{}", fragment);
        let _ = io::stdout().flush();
        answer.push_str(&fragment);
    }
    println!();
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn turn(role: Option<&str>, text: Option<&str>) -> PromptTurn {
        PromptTurn {
            role: role.map(str::to_string),
            text: text.map(str::to_string),
            ..Default::default()
        }
    }

    fn fake_image(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"not really a jpeg").unwrap();
        path
    }

    #[test]
    fn missing_text_aborts_the_send() {
        let dir = tempfile::tempdir().unwrap();
        let image = fake_image(&dir, "a.jpg");
        let turns = vec![turn(Some("user"), None)];

        let result = build_conversation(&turns, &image, 0.8);
        assert!(matches!(result, Err(SendError::MissingText(0))));
    }

    #[test]
    fn empty_template_aborts_the_send() {
        let dir = tempfile::tempdir().unwrap();
        let image = fake_image(&dir, "a.jpg");

        let result = build_conversation(&[], &image, 0.8);
        assert!(matches!(result, Err(SendError::EmptyTemplate)));
    }

    #[test]
    fn missing_role_defaults_to_user() {
        let dir = tempfile::tempdir().unwrap();
        let image = fake_image(&dir, "a.jpg");
        let turns = vec![turn(None, Some("Describe the drawing."))];

        let conversation = build_conversation(&turns, &image, 0.8).unwrap();
        assert_eq!(conversation.messages[0].role, "user");
    }

    #[test]
    fn request_image_is_final_content_part_of_user_last_turn() {
        let dir = tempfile::tempdir().unwrap();
        let image = fake_image(&dir, "a.jpg");
        let turns = vec![turn(Some("user"), Some("Describe the drawing."))];

        let conversation = build_conversation(&turns, &image, 0.8).unwrap();
        assert_eq!(conversation.messages.len(), 1);

        let content = &conversation.messages[0].content;
        assert_eq!(content.len(), 2);
        assert!(matches!(content[0], ContentPart::Text { .. }));
        match &content[1] {
            ContentPart::ImageUrl { image_url } => {
                assert!(image_url.url.starts_with("data:image/jpeg;base64,"));
            }
            other => panic!("expected an image part, got {:?}", other),
        }
    }

    #[test]
    fn request_image_is_dropped_when_last_turn_is_not_user() {
        let dir = tempfile::tempdir().unwrap();
        let image = fake_image(&dir, "a.jpg");
        let turns = vec![
            turn(Some("user"), Some("Here is the context.")),
            turn(Some("assistant"), Some("Understood.")),
        ];

        let conversation = build_conversation(&turns, &image, 0.8).unwrap();
        let has_image = conversation
            .messages
            .iter()
            .flat_map(|m| m.content.iter())
            .any(|part| matches!(part, ContentPart::ImageUrl { .. }));
        assert!(!has_image);
    }

    #[test]
    fn per_turn_images_attach_only_to_user_turns() {
        let dir = tempfile::tempdir().unwrap();
        let request_image = fake_image(&dir, "request.jpg");
        let reference = fake_image(&dir, "reference.jpg");

        let mut system = turn(Some("system"), Some("You compare drawings."));
        system.image_path = Some(reference.clone());
        let mut user = turn(Some("user"), Some("Compare with the reference."));
        user.image_path = Some(reference);

        let conversation = build_conversation(&[system, user], &request_image, 0.8).unwrap();

        // System turn keeps only its text; the user turn carries its own
        // image plus the request image.
        assert_eq!(conversation.messages[0].content.len(), 1);
        assert_eq!(conversation.messages[1].content.len(), 3);
        assert!(matches!(
            conversation.messages[1].content[2],
            ContentPart::ImageUrl { .. }
        ));
    }

    #[test]
    fn last_top_p_in_template_wins() {
        let dir = tempfile::tempdir().unwrap();
        let image = fake_image(&dir, "a.jpg");

        let mut first = turn(Some("system"), Some("a"));
        first.top_p = Some(0.5);
        let mut second = turn(Some("user"), Some("b"));
        second.top_p = Some(0.25);

        let conversation = build_conversation(&[first, second], &image, 0.8).unwrap();
        assert_eq!(conversation.top_p, 0.25);
    }

    #[test]
    fn default_top_p_applies_when_template_sets_none() {
        let dir = tempfile::tempdir().unwrap();
        let image = fake_image(&dir, "a.jpg");
        let turns = vec![turn(Some("user"), Some("a"))];

        let conversation = build_conversation(&turns, &image, 0.8).unwrap();
        assert_eq!(conversation.top_p, 0.8);
    }

    #[tokio::test]
    async fn consume_stream_concatenates_fragments_in_order() {
        let fragments: Vec<Result<String, Box<dyn StdError + Send + Sync>>> = vec![
            Ok("The ".to_string()),
            Ok("drawing ".to_string()),
            Ok("shows a gear.".to_string()),
        ];
        let stream: TokenStream = Box::pin(futures::stream::iter(fragments));

        let answer = consume_stream(stream).await.unwrap();
        assert_eq!(answer, "The drawing shows a gear.");
    }

    #[tokio::test]
    async fn consume_stream_propagates_mid_stream_errors() {
        let fragments: Vec<Result<String, Box<dyn StdError + Send + Sync>>> = vec![
            Ok("partial".to_string()),
            Err("connection reset".into()),
        ];
        let stream: TokenStream = Box::pin(futures::stream::iter(fragments));

        assert!(consume_stream(stream).await.is_err());
    }
}
