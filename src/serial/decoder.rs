/// Splits the inbound byte stream into `\n`-terminated lines.
///
/// The delimiter is not part of the emitted line, and a `\r` immediately
/// before it is dropped as well. A partial line that grows past
/// `max_line_len` is thrown away together with everything up to the next
/// delimiter.
#[derive(Debug)]
pub struct LineDecoder {
    partial: Vec<u8>,
    max_line_len: usize,
    discarding: bool,
}

/// Output of one [`LineDecoder::feed`] call
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    pub lines: Vec<Vec<u8>>,
    /// Number of oversized lines dropped during this call
    pub overflowed: u64,
}

impl LineDecoder {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line_len: max_line_len.max(1),
            discarding: false,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Decoded {
        let mut out = Decoded::default();

        for chunk in bytes.split_inclusive(|&b| b == b'\n') {
            let (body, terminated) = match chunk.split_last() {
                Some((&b'\n', body)) => (body, true),
                _ => (chunk, false),
            };

            if !self.discarding {
                self.partial.extend_from_slice(body);
                // A trailing `\r` may still be stripped by the delimiter
                let allowance = usize::from(self.partial.last() == Some(&b'\r'));
                if self.partial.len() > self.max_line_len + allowance {
                    log::debug!("Dropping oversized line ({} bytes buffered)", self.partial.len());
                    self.partial.clear();
                    self.discarding = true;
                    out.overflowed += 1;
                }
            }

            if terminated {
                if self.discarding {
                    self.discarding = false;
                } else {
                    let mut line = std::mem::take(&mut self.partial);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    out.lines.push(line);
                }
            }
        }

        out
    }

    /// Bytes of the current unterminated line
    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}
