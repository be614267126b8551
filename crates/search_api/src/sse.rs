/// Payload that marks the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental SSE framer.
///
/// Bytes may arrive split anywhere, including inside a multi-byte character.
/// Each complete event yields the concatenated `data:` payload; empty payloads
/// are dropped and `[DONE]` ends the stream without yielding anything.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    buffer: String,
    done: bool,
}

impl SseFrameDecoder {
    /// Feed arbitrary bytes and drain complete event payloads.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.decode_utf8(bytes);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut payloads = Vec::new();
        while let Some(split) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..split + 2).collect();
            if self.push_frame(&frame, &mut payloads) {
                break;
            }
        }
        payloads
    }

    /// Flush an event left unterminated when the body ended.
    pub fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if self.done {
            return payloads;
        }
        if !self.pending.is_empty() {
            self.buffer.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
        let frame = std::mem::take(&mut self.buffer);
        self.push_frame(&frame, &mut payloads);
        payloads
    }

    /// Parse a complete SSE body in one shot.
    pub fn parse_frames(input: &str) -> Vec<String> {
        let mut decoder = Self::default();
        let mut payloads = decoder.feed(input.as_bytes());
        payloads.extend(decoder.finish());
        payloads
    }

    /// True once `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.pending.is_empty() && self.buffer.trim().is_empty()
    }

    /// Returns true when the frame was the done sentinel.
    fn push_frame(&mut self, frame: &str, payloads: &mut Vec<String>) -> bool {
        let Some(payload) = extract_data_payload(frame) else {
            return false;
        };
        let payload = payload.trim();
        if payload == DONE_SENTINEL {
            self.done = true;
            self.buffer.clear();
            self.pending.clear();
            return true;
        }
        if !payload.is_empty() {
            payloads.push(payload.to_owned());
        }
        false
    }

    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(error) => {
                    let valid = consumed + error.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[consumed..valid]));
                    match error.error_len() {
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            consumed = valid;
                            break;
                        }
                        Some(invalid) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid + invalid;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
