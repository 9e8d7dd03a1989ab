//! Incremental decoder for OpenAI-style chat completion streams.
//!
//! Only `data: ` lines carry payload. Everything else (comments, `event:`
//! lines, blank separators, keep-alive pings) is a heartbeat and ignored.
//! Each data line holds one whole JSON chunk.

use serde::Deserialize;
use tooldesk_application::{ChatEvent, GatewayError};
use tooldesk_domain::{ToolCallDelta, UsageCounters};

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `data: [DONE]` was seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw body bytes and return the events completed by them.
    ///
    /// Bytes are buffered until a newline so multi-byte characters split
    /// across network reads decode correctly.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ChatEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line, &mut events);
        }
        events
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<ChatEvent> {
        let line = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        self.decode_line(&line, &mut events);
        events
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<ChatEvent>) {
        if self.done {
            return;
        }
        let line = String::from_utf8_lossy(raw);
        let Some(data) = line.trim_end_matches(['\r', '\n']).strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.done = true;
            events.push(ChatEvent::Done);
            return;
        }
        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk.into_events(events),
            Err(e) => events.push(ChatEvent::Error(GatewayError::Parse(format!(
                "{}: {}",
                e,
                truncate(data, 200)
            )))),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

impl StreamChunk {
    fn into_events(self, events: &mut Vec<ChatEvent>) {
        if let Some(error) = self.error {
            events.push(ChatEvent::Error(GatewayError::RequestFailed(error.message)));
            return;
        }
        for delta in self.choices.into_iter().filter_map(|c| c.delta) {
            if let Some(text) = delta.reasoning_content.filter(|t| !t.is_empty()) {
                events.push(ChatEvent::Reasoning(text));
            }
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                events.push(ChatEvent::Content(text));
            }
            if let Some(calls) = delta.tool_calls.filter(|c| !c.is_empty()) {
                events.push(ChatEvent::ToolCalls(calls));
            }
        }
        if let Some(usage) = self.usage {
            events.push(ChatEvent::Usage(UsageCounters {
                model: self.model.unwrap_or_default(),
                prompt_tokens: usage.prompt_tokens,
                cached_tokens: usage.prompt_tokens_details.map_or(0, |d| d.cached_tokens),
                completion_tokens: usage.completion_tokens,
                reasoning_tokens: usage
                    .completion_tokens_details
                    .map_or(0, |d| d.reasoning_tokens),
                ..UsageCounters::default()
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_split_across_reads() {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(events.is_empty());
        events.extend(decoder.push(b"lo\"}}]}\n\n"));
        assert_eq!(events, vec![ChatEvent::Content("Hello".to_string())]);
    }

    #[test]
    fn heartbeats_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: ping\n\nretry: 100\n");
        assert!(events.is_empty());
    }

    #[test]
    fn multibyte_char_split_between_chunks() {
        let mut decoder = SseDecoder::new();
        let text = "data: {\"choices\":[{\"delta\":{\"content\":\"\u{00e9}\"}}]}\n";
        let bytes = text.as_bytes();
        let split = text.find('\u{00e9}').unwrap() + 1;
        let mut events = decoder.push(&bytes[..split]);
        events.extend(decoder.push(&bytes[split..]));
        assert_eq!(events, vec![ChatEvent::Content("\u{00e9}".to_string())]);
    }

    #[test]
    fn tool_call_fragments_and_usage() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            br#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"ShowActivityStatistic","arguments":"{\"Activ"}}]}}]}
data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ityID\":\"42\"}"}}]}}]}
data: {"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":12,"completion_tokens":5,"prompt_tokens_details":{"cached_tokens":2}}}
data: [DONE]
"#,
        );
        assert_eq!(events.len(), 4);
        match &events[0] {
            ChatEvent::ToolCalls(deltas) => {
                assert_eq!(deltas[0].id.as_deref(), Some("call_1"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[2] {
            ChatEvent::Usage(usage) => {
                assert_eq!(usage.model, "gpt-4o");
                assert_eq!(usage.prompt_tokens, 12);
                assert_eq!(usage.cached_tokens, 2);
                assert_eq!(usage.completion_tokens, 5);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[3], ChatEvent::Done);
        assert!(decoder.is_done());
        assert!(decoder.push(b"data: {\"choices\":[]}\n").is_empty());
    }

    #[test]
    fn reasoning_alias_is_accepted() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"choices\":[{\"delta\":{\"reasoning\":\"hmm\"}}]}\n");
        assert_eq!(events, vec![ChatEvent::Reasoning("hmm".to_string())]);
    }

    #[test]
    fn malformed_chunk_and_inline_error() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {not json}\ndata: {\"error\":{\"message\":\"overloaded\"}}\n");
        assert!(matches!(events[0], ChatEvent::Error(GatewayError::Parse(_))));
        assert_eq!(
            events[1],
            ChatEvent::Error(GatewayError::RequestFailed("overloaded".to_string()))
        );
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![ChatEvent::Done]);
    }
}
