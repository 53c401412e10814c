//! Minimal Server-Sent-Events framing for the streaming chat endpoint.
//!
//! Events are separated by a blank line. Within an event, `data:` lines carry
//! the payload; the prefix and one optional space are stripped. Lines without
//! a field name that follow a `data:` line are kept verbatim, because the chat
//! server writes multi-line chunks as a single `data: ` line with raw
//! newlines inside it.

const IGNORED_FIELDS: [&str; 3] = ["event", "id", "retry"];

/// Incremental decoder that tolerates events split across network reads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw body bytes, returning the data of every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some((event_end, next_start)) = find_event_boundary(&self.buffer) {
            // Slicing on a blank line never cuts a UTF-8 sequence in half.
            let block = String::from_utf8_lossy(&self.buffer[..event_end]).into_owned();
            self.buffer.drain(..next_start);

            if let Some(data) = parse_event(&block) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }

        let block = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        parse_event(&block)
    }
}

/// Returns `(end of event, start of the next one)` for the first blank line.
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;

    for (index, byte) in buffer.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }

        let line = &buffer[line_start..index];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Some((line_start, index + 1));
        }
        line_start = index + 1;
    }

    None
}

fn parse_event(block: &str) -> Option<String> {
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }

        if line == "data" {
            data.push("");
            continue;
        }

        if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
            continue;
        }

        if is_ignored_field(line) {
            continue;
        }

        if !data.is_empty() {
            data.push(line);
        }
    }

    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

fn is_ignored_field(line: &str) -> bool {
    IGNORED_FIELDS.iter().any(|field| {
        line == *field
            || line
                .strip_prefix(field)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}
