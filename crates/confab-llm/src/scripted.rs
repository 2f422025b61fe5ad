//! Scripted generation engine for tests and engine-less runs.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{ChatTurn, GenerationError, GenerationStream, LanguageModel};

/// Replays scripted replies, one reply (a list of deltas) per
/// `open_stream` call. When the script runs out it echoes the last
/// user turn, which keeps manual runs usable without an engine.
pub struct ScriptedModel {
    replies: Arc<Mutex<Vec<Vec<Result<String, GenerationError>>>>>,
    delta_delay: Duration,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Vec<Result<String, GenerationError>>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            delta_delay: Duration::ZERO,
        }
    }

    pub fn reply(deltas: &[&str]) -> Vec<Result<String, GenerationError>> {
        deltas.iter().map(|d| Ok((*d).to_string())).collect()
    }

    /// Paces delta delivery to simulate inference latency.
    pub fn with_delta_delay(mut self, delay: Duration) -> Self {
        self.delta_delay = delay;
        self
    }
}

impl LanguageModel for ScriptedModel {
    fn open_stream(&self, transcript: &[ChatTurn]) -> Result<GenerationStream, GenerationError> {
        let deltas = {
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                let echo = transcript
                    .last()
                    .map(|t| format!("You said: {}.", t.text))
                    .unwrap_or_else(|| "I heard nothing.".to_string());
                vec![Ok(echo)]
            } else {
                replies.remove(0)
            }
        };

        let (writer, stream) = GenerationStream::channel(16);
        let delay = self.delta_delay;
        tokio::spawn(async move {
            for delta in deltas {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if !writer.send(delta).await {
                    tracing::debug!("scripted generation cancelled");
                    return;
                }
            }
        });
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatRole;

    fn transcript() -> Vec<ChatTurn> {
        vec![ChatTurn {
            role: ChatRole::User,
            text: "hi".into(),
        }]
    }

    #[tokio::test]
    async fn replays_deltas_then_ends() {
        let model = ScriptedModel::new(vec![ScriptedModel::reply(&["Hello", " there", "."])]);
        let mut stream = model.open_stream(&transcript()).unwrap();

        let mut text = String::new();
        while let Some(delta) = stream.next_delta().await {
            text.push_str(&delta.unwrap());
        }
        assert_eq!(text, "Hello there.");
    }

    #[tokio::test]
    async fn exhausted_script_echoes_last_turn() {
        let model = ScriptedModel::new(vec![]);
        let mut stream = model.open_stream(&transcript()).unwrap();
        assert_eq!(
            stream.next_delta().await.unwrap().unwrap(),
            "You said: hi."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_paced_delivery() {
        let model = ScriptedModel::new(vec![ScriptedModel::reply(&["a", "b", "c"])])
            .with_delta_delay(Duration::from_millis(100));
        let mut stream = model.open_stream(&transcript()).unwrap();

        assert_eq!(stream.next_delta().await.unwrap().unwrap(), "a");
        stream.cancel();
        // The writer observes the flag before sending the next delta.
        assert!(stream.next_delta().await.is_none());
    }
}
