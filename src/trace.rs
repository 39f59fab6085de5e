//! Request trace parsing.
//!
//! One request per line, whitespace separated: either `id size` or
//! `timestamp id size`. Blank lines and `#` comments are ignored. Lines that
//! do not parse are skipped with a warning and counted, so a damaged trace
//! still replays.
//!
//! ```
//! use flashbox::trace::TraceReader;
//!
//! let input = "0 a 100\n1 b 2x\nc 7\n";
//! let mut reader = TraceReader::new(input.as_bytes());
//! let ids: Vec<String> = reader.by_ref().map(|r| r.unwrap().id).collect();
//! assert_eq!(ids, ["a", "c"]);
//! assert_eq!(reader.skipped(), 1);
//! ```

use std::io::{self, BufRead};

use tracing::warn;

/// One parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRequest {
    pub id: String,
    pub size: u64,
}

/// Iterator over the requests of a trace.
///
/// Yields `Err` only for I/O failures; malformed lines never end iteration.
#[derive(Debug)]
pub struct TraceReader<R> {
    input: R,
    line: String,
    line_number: u64,
    skipped: u64,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: String::new(),
            line_number: 0,
            skipped: 0,
        }
    }

    /// Malformed lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Lines read so far, including blank and skipped ones.
    pub fn lines_read(&self) -> u64 {
        self.line_number
    }
}

fn parse_line(line: &str) -> Option<TraceRequest> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (id, size) = match tokens.as_slice() {
        [id, size] => (id, size),
        [_, id, size] => (id, size),
        _ => return None,
    };
    let size = size.parse().ok()?;
    Some(TraceRequest {
        id: (*id).to_owned(),
        size,
    })
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = io::Result<TraceRequest>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.input.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {},
                Err(err) => return Some(Err(err)),
            }
            self.line_number += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_line(trimmed) {
                Some(request) => return Some(Ok(request)),
                None => {
                    self.skipped += 1;
                    warn!(line = self.line_number, content = trimmed, "skipping malformed trace line");
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str) -> (Vec<TraceRequest>, u64) {
        let mut reader = TraceReader::new(input.as_bytes());
        let requests = reader.by_ref().collect::<io::Result<Vec<_>>>().unwrap();
        (requests, reader.skipped())
    }

    #[test]
    fn accepts_both_layouts() {
        let (requests, skipped) = read_all("1650000000 obj1 4096\nobj2\t512\n");
        assert_eq!(skipped, 0);
        assert_eq!(
            requests,
            vec![
                TraceRequest { id: "obj1".into(), size: 4096 },
                TraceRequest { id: "obj2".into(), size: 512 },
            ]
        );
    }

    #[test]
    fn skips_malformed_and_counts_them() {
        let (requests, skipped) = read_all("a -5\nonly\nb 10\nx y z w\nc 1e3\n");
        assert_eq!(requests, vec![TraceRequest { id: "b".into(), size: 10 }]);
        assert_eq!(skipped, 4);
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        let mut reader = TraceReader::new("# header\n\n  \nz 3\n".as_bytes());
        assert_eq!(reader.next().unwrap().unwrap().id, "z");
        assert!(reader.next().is_none());
        assert_eq!(reader.skipped(), 0);
        assert_eq!(reader.lines_read(), 4);
    }
}
