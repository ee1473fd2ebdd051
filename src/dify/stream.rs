use super::RelayError;
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct StreamFrame {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

/// Folds a Dify server-sent-event body into one answer string.
///
/// Bytes are buffered until a full line is available, so frames and UTF-8
/// sequences split across network chunks are reassembled before parsing.
/// Lines that are not `data:` frames, or whose JSON does not parse, are
/// skipped.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    pending: Vec<u8>,
    answer: String,
    frames: usize,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), RelayError> {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&line)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<String, RelayError> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.consume_line(&rest)?;
        }
        debug!("Assembled answer from {} stream frames", self.frames);
        Ok(self.answer)
    }

    fn consume_line(&mut self, raw: &[u8]) -> Result<(), RelayError> {
        let Ok(line) = std::str::from_utf8(raw) else {
            return Ok(());
        };
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };

        let frame: StreamFrame = match serde_json::from_str(data.trim_start()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Skipping malformed stream line: {}", e);
                return Ok(());
            }
        };
        self.frames += 1;

        match frame.event.as_deref() {
            Some("error") => Err(RelayError::Upstream {
                status: frame.status.unwrap_or(500),
                body: frame.message.unwrap_or_default(),
            }),
            // Moderation rewrites replace everything sent so far.
            Some("message_replace") => {
                self.answer = frame.answer.unwrap_or_default();
                Ok(())
            }
            _ => {
                if let Some(fragment) = frame.answer {
                    self.answer.push_str(&fragment);
                }
                Ok(())
            }
        }
    }
}
