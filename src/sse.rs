//! Server-Sent Events frame reassembly.
//!
//! The streaming endpoint writes frames separated by a blank line:
//! ```text
//! : heartbeat
//!
//! data: Hello
//!
//! data: [DONE]
//! ```
//!
//! Transport chunks can split anywhere, including inside a multi-byte
//! character or between the two newlines of a delimiter. [`FrameDecoder`]
//! hides that: it decodes text incrementally and only yields a frame once its
//! terminating delimiter has been seen.

use std::mem;

/// Blank-line frame separator.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Stateful byte-to-frame reassembler for one stream.
///
/// # Example
/// ```
/// use agent_stream::sse::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// assert_eq!(decoder.feed(b"data: he").count(), 0);
///
/// let frames: Vec<String> = decoder.feed(b"llo\n\ndata: [DO").collect();
/// assert_eq!(frames, vec!["data: hello".to_string()]);
/// assert_eq!(decoder.buffered(), "data: [DO");
/// ```
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Decoded text not yet resolved into a complete frame.
    buffer: String,
    /// Leading bytes of a UTF-8 sequence cut off by a chunk boundary.
    partial: Vec<u8>,
    /// Buffer offset below which no delimiter can start.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the frames it completed, in order.
    ///
    /// The returned iterator is lazy. Frames it did not get to yield stay
    /// buffered and come out of the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.decode(chunk);
        Frames {
            buffer: &mut self.buffer,
            scanned: &mut self.scanned,
            consumed: 0,
        }
    }

    /// Signal end of stream and take whatever undelimited text is left.
    ///
    /// The tail is not a complete frame. It is returned (trimmed, if
    /// non-empty) so callers can report it; the decoder is empty afterwards.
    pub fn finish(&mut self) -> Option<String> {
        if !self.partial.is_empty() {
            self.partial.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        self.scanned = 0;
        let tail = mem::take(&mut self.buffer);
        let tail = tail.trim();
        (!tail.is_empty()).then(|| tail.to_string())
    }

    /// Text held back waiting for a delimiter.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Decode `chunk` onto the buffer, carrying an incomplete trailing
    /// sequence over to the next call. Invalid sequences become U+FFFD.
    fn decode(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        let joined;
        let mut rest: &[u8] = if self.partial.is_empty() {
            chunk
        } else {
            let mut bytes = mem::take(&mut self.partial);
            bytes.extend_from_slice(chunk);
            joined = bytes;
            &joined
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.partial = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Complete frames split off a [`FrameDecoder`] buffer by one `feed`.
#[derive(Debug)]
pub struct Frames<'a> {
    buffer: &'a mut String,
    scanned: &'a mut usize,
    consumed: usize,
}

impl Iterator for Frames<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let delimiter = FRAME_DELIMITER.as_bytes();
        let from = self.consumed.max(*self.scanned);
        let haystack = &self.buffer.as_bytes()[from..];

        let Some(pos) = haystack
            .windows(delimiter.len())
            .position(|window| window == delimiter)
        else {
            // the last byte may still pair with the next chunk
            let len = self.buffer.len();
            *self.scanned = from.max(len.saturating_sub(delimiter.len() - 1));
            return None;
        };

        let end = from + pos;
        let frame = self.buffer[self.consumed..end].to_string();
        self.consumed = end + delimiter.len();
        Some(frame)
    }
}

impl Drop for Frames<'_> {
    fn drop(&mut self) {
        self.buffer.drain(..self.consumed);
        *self.scanned = self.scanned.saturating_sub(self.consumed);
    }
}
