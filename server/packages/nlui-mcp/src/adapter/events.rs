use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedEvents {
    Events {
        events: Vec<NormalizedEvent>,
    },
    Failure {
        error: String,
        #[serde(rename = "rawResponse")]
        raw_response: String,
    },
}

impl DecodedEvents {
    pub fn events(&self) -> Option<&[NormalizedEvent]> {
        match self {
            Self::Events { events } => Some(events),
            Self::Failure { .. } => None,
        }
    }
}

/// Flattens a finished response body into `{event, data}` records.
///
/// A body that parses as a single JSON document becomes one `message`
/// event. Anything else is read as SSE framing. Bodies that are not UTF-8
/// come back as a failure record carrying the lossy text.
pub fn decode(body: &[u8]) -> DecodedEvents {
    match std::str::from_utf8(body) {
        Ok(text) => DecodedEvents::Events {
            events: decode_str(text),
        },
        Err(err) => {
            tracing::warn!(error = %err, bytes = body.len(), "failed to extract event data");
            DecodedEvents::Failure {
                error: "Failed to extract event data".to_string(),
                raw_response: String::from_utf8_lossy(body).into_owned(),
            }
        }
    }
}

pub fn decode_str(text: &str) -> Vec<NormalizedEvent> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return vec![NormalizedEvent {
            event: DEFAULT_EVENT.to_string(),
            data: value,
        }];
    }

    let mut events = Vec::new();
    let mut current_event = DEFAULT_EVENT.to_string();
    let mut current_data = String::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            if !current_data.is_empty() {
                events.push(frame(&current_event, std::mem::take(&mut current_data)));
                current_event = DEFAULT_EVENT.to_string();
            }
            continue;
        }
        if let Some(name) = line.strip_prefix("event:") {
            current_event = name.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            current_data.push_str(data.trim());
        }
    }

    if !current_data.is_empty() {
        events.push(frame(&current_event, current_data));
    }
    events
}

fn frame(event: &str, data: String) -> NormalizedEvent {
    let data = serde_json::from_str::<Value>(&data).unwrap_or(Value::String(data));
    NormalizedEvent {
        event: event.to_string(),
        data,
    }
}
