/// Default record separator: the private-use code point U+F1337.
pub const DEFAULT_BOUNDARY: &str = "\u{F1337}";

/// Reassembles boundary-delimited records from an unbounded text stream.
///
/// Text after the last boundary stays buffered until the next boundary
/// arrives. Records are handed out trimmed, so whitespace around a boundary
/// never reaches the decoder.
#[derive(Debug)]
pub struct BoundaryParser {
    boundary: String,
    buffer: String,
}

impl Default for BoundaryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryParser {
    pub fn new() -> Self {
        Self::with_boundary(DEFAULT_BOUNDARY)
    }

    /// An empty boundary would match everywhere, so it falls back to the default.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        let mut boundary = boundary.into();
        if boundary.is_empty() {
            tracing::warn!("empty boundary configured, using the default");
            boundary = DEFAULT_BOUNDARY.to_string();
        }
        Self {
            boundary,
            buffer: String::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Text received but not yet terminated by a boundary.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Append `chunk` and pass every complete record to `on_record`, in stream order.
    /// Returns whether at least one record was extracted.
    pub fn feed(&mut self, chunk: &str, mut on_record: impl FnMut(&str)) -> bool {
        self.buffer.push_str(chunk);

        let mut extracted = false;
        while let Some(idx) = self.buffer.find(&self.boundary) {
            on_record(self.buffer[..idx].trim());
            extracted = true;

            let rest = &self.buffer[idx + self.boundary.len()..];
            let skip = rest.len() - rest.trim_start().len();
            self.buffer.drain(..idx + self.boundary.len() + skip);
        }

        if !extracted && !chunk.is_empty() {
            tracing::trace!(
                received = chunk.len(),
                buffered = self.buffer.len(),
                "no boundary yet"
            );
        }
        extracted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut BoundaryParser, chunk: &str) -> (bool, Vec<String>) {
        let mut records = Vec::new();
        let found = parser.feed(chunk, |r| records.push(r.to_string()));
        (found, records)
    }

    #[test]
    fn empty_feed_on_empty_buffer() {
        let mut parser = BoundaryParser::new();
        let (found, records) = collect(&mut parser, "");
        assert!(!found);
        assert!(records.is_empty());
        assert_eq!(parser.buffer(), "");
    }

    #[test]
    fn single_record() {
        let mut parser = BoundaryParser::new();
        let input = format!(r#"{{"name":"foo"}}{DEFAULT_BOUNDARY}"#);
        let (found, records) = collect(&mut parser, &input);
        assert!(found);
        assert_eq!(records, vec![r#"{"name":"foo"}"#]);
        assert_eq!(parser.buffer(), "");
    }

    #[test]
    fn partial_record_stays_buffered() {
        let mut parser = BoundaryParser::new();
        let (found, _) = collect(&mut parser, r#"{"name":"#);
        assert!(!found);
        assert_eq!(parser.buffer(), r#"{"name":"#);

        let (found, records) = collect(&mut parser, &format!(r#""foo"}}{DEFAULT_BOUNDARY}{{"na"#));
        assert!(found);
        assert_eq!(records, vec![r#"{"name":"foo"}"#]);
        assert_eq!(parser.buffer(), r#"{"na"#);
    }

    #[test]
    fn multiple_records_in_one_chunk() {
        let mut parser = BoundaryParser::new();
        let b = DEFAULT_BOUNDARY;
        let (found, records) = collect(&mut parser, &format!("a{b}\n\n  b{b}c{b}"));
        assert!(found);
        assert_eq!(records, vec!["a", "b", "c"]);
        assert_eq!(parser.buffer(), "");
    }

    #[test]
    fn whitespace_after_boundary_is_trimmed() {
        let mut parser = BoundaryParser::new();
        let b = DEFAULT_BOUNDARY;
        collect(&mut parser, &format!("a{b}\r\n\t  "));
        assert_eq!(parser.buffer(), "");
        let (_, records) = collect(&mut parser, &format!("  b  {b}"));
        assert_eq!(records, vec!["b"]);
    }

    #[test]
    fn boundary_split_across_feeds() {
        let mut parser = BoundaryParser::with_boundary("@@END@@");
        assert!(!parser.feed("record@@E", |_| panic!("no record yet")));
        let (found, records) = collect(&mut parser, "ND@@");
        assert!(found);
        assert_eq!(records, vec!["record"]);
    }

    #[test]
    fn split_code_point_boundary() {
        // U+F1337 is four UTF-8 bytes; splitting happens at char level upstream,
        // so a chunk can only end right before or after it.
        let mut parser = BoundaryParser::new();
        assert!(!parser.feed("x", |_| {}));
        let (found, records) = collect(&mut parser, DEFAULT_BOUNDARY);
        assert!(found);
        assert_eq!(records, vec!["x"]);
    }

    #[test]
    fn empty_boundary_falls_back_to_default() {
        let parser = BoundaryParser::with_boundary("");
        assert_eq!(parser.boundary(), DEFAULT_BOUNDARY);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn records_of(chunks: &[String]) -> Vec<String> {
            let mut parser = BoundaryParser::new();
            let mut out = Vec::new();
            for chunk in chunks {
                parser.feed(chunk, |r| out.push(r.to_string()));
            }
            out
        }

        fn split_at_chars(input: &str, cuts: &[usize]) -> Vec<String> {
            let chars: Vec<char> = input.chars().collect();
            let mut points: Vec<usize> = cuts.iter().map(|c| c % (chars.len() + 1)).collect();
            points.push(0);
            points.push(chars.len());
            points.sort_unstable();
            points
                .windows(2)
                .map(|w| chars[w[0]..w[1]].iter().collect())
                .collect()
        }

        proptest! {
            #[test]
            fn split_invariance(
                bodies in proptest::collection::vec("[a-z {}:\",\\n]{0,24}", 0..8),
                cuts in proptest::collection::vec(any::<usize>(), 0..16),
            ) {
                let stream: String = bodies
                    .iter()
                    .map(|b| format!("{b}{DEFAULT_BOUNDARY}\n"))
                    .collect();

                let whole = records_of(&[stream.clone()]);
                let pieces = records_of(&split_at_chars(&stream, &cuts));
                prop_assert_eq!(&whole, &pieces);
                prop_assert_eq!(whole.len(), bodies.len());
            }
        }
    }
}
