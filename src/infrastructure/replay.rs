//! Frame replay over stdio
//!
//! Lets the host run without radio hardware: outbound frames are printed as
//! `O <hex>` lines, inbound frames are read back from trace dumps (the `I`
//! blocks written by [`h4_dump`]) or from plain hex lines.
//!
//! [`h4_dump`]: crate::infrastructure::bluetooth::transport::h4_dump

use crate::infrastructure::bluetooth::error::HostError;
use crate::infrastructure::bluetooth::transport::{Direction, Radio, ReadyFlag};
use std::io::Write;
use tracing::debug;

/// Radio that writes frames to stdout and is always ready for the next one
pub struct StdioRadio {
    ready: ReadyFlag,
}

impl StdioRadio {
    pub fn new(ready: ReadyFlag) -> Self {
        Self { ready }
    }
}

impl Radio for StdioRadio {
    fn send_packet(&mut self, frame: &[u8]) -> Result<(), HostError> {
        let mut line = String::with_capacity(2 + frame.len() * 3);
        line.push('O');
        for byte in frame {
            line.push_str(&format!(" {:02X}", byte));
        }

        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)
            .and_then(|_| stdout.flush())
            .map_err(|e| HostError::Radio(e.to_string()))?;
        self.ready.set();
        Ok(())
    }
}

/// Reassembles inbound frames from replay input, one line at a time.
///
/// Accepted rows:
///
/// ```text
/// I                          direction marker on its own
/// I 000000 04 0E 04 ...      marker, offset column, data
/// 000010 00 00 ...           continuation of the frame in progress
/// I 04 0E 04 01 03 0C 00     whole frame, no offset
/// 04 0E 04 01 03 0C 00       bare hex, always inbound
/// ```
///
/// A frame written with an offset column stays open until the next marker,
/// the next `000000` row, a blank line or [`TraceReader::finish`]. Frames
/// under an `O` marker are skipped, as are `#` comments.
#[derive(Debug)]
pub struct TraceReader {
    direction: Direction,
    pending: Option<Vec<u8>>,
}

impl Default for TraceReader {
    fn default() -> Self {
        Self {
            direction: Direction::Inbound,
            pending: None,
        }
    }
}

impl TraceReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns the inbound frames it completed
    pub fn feed(&mut self, line: &str) -> Vec<Vec<u8>> {
        let mut done = Vec::new();
        let line = line.trim();
        if line.starts_with('#') {
            return done;
        }
        if line.is_empty() {
            done.extend(self.flush());
            return done;
        }

        let mut tokens = line.split_whitespace().peekable();
        let marker = match tokens.peek() {
            Some(&"I") => Some(Direction::Inbound),
            Some(&"O") => Some(Direction::Outbound),
            _ => None,
        };
        if let Some(direction) = marker {
            tokens.next();
            done.extend(self.flush());
            self.direction = direction;
        }

        let offset = tokens
            .peek()
            .filter(|token| is_offset(token))
            .and_then(|token| usize::from_str_radix(token, 16).ok());
        if offset.is_some() {
            tokens.next();
        }

        let Some(bytes) = tokens
            .map(|token| u8::from_str_radix(token, 16).ok())
            .collect::<Option<Vec<u8>>>()
        else {
            debug!("Skipping malformed replay line: {}", line);
            return done;
        };

        match offset {
            None => {
                done.extend(self.flush());
                let inbound = marker.unwrap_or(Direction::Inbound) == Direction::Inbound;
                if inbound && !bytes.is_empty() {
                    done.push(bytes);
                }
            }
            Some(0) => {
                done.extend(self.flush());
                self.pending = Some(bytes);
            }
            Some(offset) => match &mut self.pending {
                Some(frame) if frame.len() == offset => frame.extend_from_slice(&bytes),
                _ => {
                    debug!("Dropping frame with a gap at offset {:06X}", offset);
                    self.pending = None;
                }
            },
        }
        done
    }

    /// End of input: hand over the frame still being collected
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.flush()
    }

    fn flush(&mut self) -> Option<Vec<u8>> {
        let frame = self.pending.take()?;
        (self.direction == Direction::Inbound && !frame.is_empty()).then_some(frame)
    }
}

fn is_offset(token: &str) -> bool {
    token.len() == 6 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::transport::h4_dump;

    fn read_all(input: &str) -> Vec<Vec<u8>> {
        let mut reader = TraceReader::new();
        let mut frames: Vec<Vec<u8>> = input.lines().flat_map(|l| reader.feed(l)).collect();
        frames.extend(reader.finish());
        frames
    }

    #[test]
    fn test_inbound_line() {
        assert_eq!(
            read_all("I 04 0E 04 01 03 0C 00"),
            vec![vec![0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]]
        );
    }

    #[test]
    fn test_marker_and_offset_on_one_line() {
        let mut reader = TraceReader::new();
        assert!(reader.feed("I 000000 04 0E 04 01 03 0C 00").is_empty());
        assert_eq!(
            reader.finish(),
            Some(vec![0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00])
        );
    }

    #[test]
    fn test_offset_row_closed_by_blank_line() {
        let mut reader = TraceReader::new();
        assert!(reader.feed("000000 04 0F 04 00 01 01 04").is_empty());
        assert_eq!(
            reader.feed(""),
            vec![vec![0x04, 0x0F, 0x04, 0x00, 0x01, 0x01, 0x04]]
        );
        assert_eq!(reader.finish(), None);
    }

    #[test]
    fn test_bare_hex() {
        assert_eq!(
            read_all("  04 01 01 00 "),
            vec![vec![0x04, 0x01, 0x01, 0x00]]
        );
    }

    #[test]
    fn test_long_frame_from_dump() {
        let frame: Vec<u8> = (0..20).map(|n| n as u8 + 0x40).collect();
        let dump = h4_dump(&frame, Direction::Inbound);
        assert_eq!(dump.lines().count(), 3);
        assert_eq!(read_all(&dump), vec![frame]);
    }

    #[test]
    fn test_dump_sequence_keeps_inbound_only() {
        let first: Vec<u8> = (0..18).collect();
        let sent: Vec<u8> = vec![0x01, 0x03, 0x0C, 0x00];
        let second: Vec<u8> = (0..40).rev().collect();
        let input = [
            h4_dump(&first, Direction::Inbound),
            h4_dump(&sent, Direction::Outbound),
            h4_dump(&second, Direction::Inbound),
        ]
        .concat();
        assert_eq!(read_all(&input), vec![first, second]);
    }

    #[test]
    fn test_outbound_line_closes_pending_frame() {
        let mut reader = TraceReader::new();
        reader.feed("I");
        reader.feed("000000 04 13 05 01 0B 00 01 00");
        assert_eq!(
            reader.feed("O 01 03 0C 00"),
            vec![vec![0x04, 0x13, 0x05, 0x01, 0x0B, 0x00, 0x01, 0x00]]
        );
        assert_eq!(reader.finish(), None);
    }

    #[test]
    fn test_gap_in_offsets_drops_frame() {
        let input = "I\n000000 00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F\n000020 10 11\n";
        assert!(read_all(input).is_empty());
    }

    #[test]
    fn test_skipped_lines() {
        assert!(read_all("").is_empty());
        assert!(read_all("# controller reset").is_empty());
        assert!(read_all("O 01 03 0C 00").is_empty());
        assert!(read_all("O\n000000 01 03 0C 00").is_empty());
        assert!(read_all("I").is_empty());
        assert!(read_all("I 04 zz").is_empty());
    }

    #[test]
    fn test_stdio_radio_returns_credit() {
        let ready = ReadyFlag::new();
        let mut radio = StdioRadio::new(ready.clone());
        assert!(!ready.is_set());
        radio.send_packet(&[0x01, 0x03, 0x0C, 0x00]).unwrap();
        assert!(ready.is_set());
    }
}
