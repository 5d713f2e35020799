//! In-process fallback responder.
//!
//! The catalog's embedded entry guarantees that offline mode and
//! privileged matters always have somewhere to go, even on a machine with
//! no self-hosted runner. It performs no I/O and produces a short
//! extractive acknowledgement of the latest user message rather than a
//! generated answer.

use futures::stream;

use crate::model_registry::ProviderId;

use super::AdapterEvent;
use super::AdapterResult;
use super::AdapterStream;
use super::ChatAdapter;
use super::ChatMessage;
use super::DispatchConfig;
use super::MessageRole;

/// Longest prefix of the user message echoed back into the reply.
const EXCERPT_MAX: usize = 240;

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedAdapter;

impl EmbeddedAdapter {
    pub fn new() -> Self {
        Self
    }

    fn compose_reply(messages: &[ChatMessage]) -> String {
        let latest_user = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if latest_user.is_empty() {
            return "No request content was provided. External AI models are \
                    not reachable right now; please retry once connectivity \
                    or provider credentials are restored."
                .to_string();
        }

        let mut excerpt = latest_user.trim().to_string();
        if excerpt.len() > EXCERPT_MAX {
            let mut end = EXCERPT_MAX;
            while !excerpt.is_char_boundary(end) {
                end -= 1;
            }
            excerpt.truncate(end);
            excerpt.push('…');
        }

        format!(
            "Your request has been noted while external AI models are \
             unavailable: \"{excerpt}\". Full analysis requires an external \
             or self-hosted model; this response was produced locally and no \
             case data left the machine."
        )
    }
}

#[async_trait::async_trait]
impl ChatAdapter for EmbeddedAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Embedded
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        _config: &DispatchConfig,
    ) -> AdapterResult<AdapterStream> {
        let reply = Self::compose_reply(messages);
        // Stream in two pieces so callers exercise the same incremental
        // path they would with a real provider.
        let split = reply.len() / 2;
        let mut cut = split;
        while !reply.is_char_boundary(cut) {
            cut += 1;
        }
        let head = reply[..cut].to_string();
        let tail = reply[cut..].to_string();

        let events = vec![
            Ok(AdapterEvent::Delta(head)),
            Ok(AdapterEvent::Delta(tail)),
            Ok(AdapterEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}
