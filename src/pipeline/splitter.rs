//! Sentence splitter: turns the LLM's token stream into utterable segments.
//!
//! Fragments are filtered as they arrive (markdown emphasis and fenced
//! code blocks never reach the buffer), then the buffer is scanned left
//! to right for segment boundaries. Scanning is a single-pass state
//! machine, so feeding one character at a time produces exactly the same
//! boundaries as one-shot ingestion.
//!
//! Per-segment cleaning happens at emission: control sentinels are
//! stripped (raising the `should_end` flag), inline links keep their
//! visible text, sentences containing URLs are dropped entirely, and the
//! pronunciation table expands acronyms on word boundaries.

use tracing::debug;

use super::messages::TextSegment;

/// Soft threshold: commas become boundaries once this many characters
/// have accumulated.
const COMMA_THRESHOLD: usize = 40;

/// Splitter tuning knobs.
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Minimum emitted segment length in characters (except at turn end).
    pub min_chunk: usize,
    /// Maximum segment length before a forced split.
    pub max_chunk: usize,
    /// Acronym pronunciation table, applied on word boundaries.
    pub pronunciations: Vec<(String, String)>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            min_chunk: 3,
            max_chunk: 150,
            pronunciations: vec![
                ("AI".into(), "artificial intelligence".into()),
                ("LLM".into(), "large language model".into()),
                ("TTS".into(), "text to speech".into()),
                ("ASR".into(), "speech recognition".into()),
            ],
        }
    }
}

impl SplitterConfig {
    /// Derive from the pipeline configuration, keeping the default table.
    pub fn from_pipeline(config: &crate::config::PipelineConfig) -> Self {
        Self {
            min_chunk: config.min_chunk,
            max_chunk: config.max_chunk,
            ..Self::default()
        }
    }
}

/// Streaming sentence splitter. Owned by the reasoning loop's task.
#[derive(Debug)]
pub struct SentenceSplitter {
    config: SplitterConfig,
    /// Filtered text awaiting a boundary.
    buffer: String,
    /// Raw pieces too short to emit, merged into the next segment.
    pending_short: String,
    next_sequence: u64,
    should_end: bool,
    /// Fence filter state: inside a ``` block.
    in_fence: bool,
    /// Consecutive backticks seen so far.
    tick_run: usize,
}

impl SentenceSplitter {
    /// Create a splitter with the given configuration.
    pub fn new(config: SplitterConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
            pending_short: String::new(),
            next_sequence: 0,
            should_end: false,
            in_fence: false,
            tick_run: 0,
        }
    }

    /// Feed one fragment of model output.
    ///
    /// Returns zero or more complete segments. With `is_final_of_turn`
    /// the remainder is flushed and the last returned segment carries
    /// `is_final` (an empty marker segment when nothing remains), after
    /// which sequences restart at 0.
    pub fn ingest(&mut self, fragment: &str, is_final_of_turn: bool) -> Vec<TextSegment> {
        self.filter_into_buffer(fragment);

        let mut segments = Vec::new();
        self.scan(&mut segments);

        if is_final_of_turn {
            let mut remainder = std::mem::take(&mut self.pending_short);
            remainder.push_str(&self.buffer);
            self.buffer.clear();
            if let Some(text) = self.clean_segment(&remainder) {
                segments.push(self.next_segment(text, true));
            } else {
                segments.push(self.next_segment(String::new(), true));
            }
            self.reset_turn_state();
        }

        segments
    }

    /// Flush the remainder of the turn. Equivalent to `ingest("", true)`.
    pub fn flush(&mut self) -> Vec<TextSegment> {
        self.ingest("", true)
    }

    /// Drop all buffered text and restart sequences (barge-in path).
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending_short.clear();
        self.reset_turn_state();
        self.should_end = false;
    }

    /// Whether the model asked to end the conversation this turn.
    pub fn should_end(&self) -> bool {
        self.should_end
    }

    /// Read and reset the end-of-conversation flag.
    pub fn take_should_end(&mut self) -> bool {
        std::mem::take(&mut self.should_end)
    }

    /// Whether no text is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.pending_short.is_empty()
    }

    fn reset_turn_state(&mut self) {
        self.next_sequence = 0;
        self.in_fence = false;
        self.tick_run = 0;
    }

    fn next_segment(&mut self, text: String, is_final: bool) -> TextSegment {
        let segment = TextSegment {
            sequence: self.next_sequence,
            text,
            is_final,
        };
        self.next_sequence += 1;
        segment
    }

    /// Append a fragment to the buffer through the streaming filters:
    /// fenced code blocks are elided, emphasis characters dropped, and
    /// newlines normalized to spaces.
    fn filter_into_buffer(&mut self, fragment: &str) {
        for c in fragment.chars() {
            if c == '`' {
                self.tick_run += 1;
                if self.tick_run == 3 {
                    self.in_fence = !self.in_fence;
                    self.tick_run = 0;
                }
                continue;
            }
            self.tick_run = 0;
            if self.in_fence {
                continue;
            }
            match c {
                '*' | '_' | '#' => {}
                '\n' | '\r' | '\t' => self.buffer.push(' '),
                _ => self.buffer.push(c),
            }
        }
    }

    /// Emit every complete segment currently in the buffer.
    fn scan(&mut self, out: &mut Vec<TextSegment>) {
        loop {
            if let Some(end) = find_boundary(&self.buffer) {
                let piece: String = self.buffer.drain(..end).collect();
                self.emit_piece(&piece, out);
                continue;
            }
            // Hard cap: force a split at the last word boundary once the
            // buffer has grown past max_chunk without any boundary.
            if self.buffer.chars().count() > self.config.max_chunk {
                let end = force_split_point(&self.buffer, self.config.max_chunk);
                let piece: String = self.buffer.drain(..end).collect();
                self.emit_piece(&piece, out);
                continue;
            }
            break;
        }
    }

    fn emit_piece(&mut self, piece: &str, out: &mut Vec<TextSegment>) {
        let mut raw = std::mem::take(&mut self.pending_short);
        raw.push_str(piece);
        let Some(text) = self.clean_segment(&raw) else {
            return;
        };
        if text.chars().count() < self.config.min_chunk {
            // Too short to speak alone; merge into the following segment.
            self.pending_short = raw;
            return;
        }
        out.push(self.next_segment(text, false));
    }

    /// Per-segment cleaning. Returns `None` when the segment should not
    /// be spoken at all.
    fn clean_segment(&mut self, raw: &str) -> Option<String> {
        let (mut text, sentinel_found) = strip_sentinels(raw);
        if sentinel_found {
            self.should_end = true;
            debug!("end-of-conversation sentinel stripped");
        }
        text = rewrite_links(&text);
        if contains_url(&text) {
            debug!("dropping unspeakable sentence: {text:?}");
            return None;
        }
        text = expand_acronyms(&text, &self.config.pronunciations);
        let text = collapse_whitespace(&text);
        if !text.chars().any(char::is_alphanumeric) {
            return None;
        }
        Some(text)
    }
}

// ── Boundary scanning ─────────────────────────────────────────

/// Sentence-ending punctuation that needs trailing whitespace to count
/// (protects decimals, version numbers, and URLs mid-sentence).
fn is_ascii_sentence_punct(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';')
}

/// Full-width sentence punctuation; a boundary on its own.
fn is_cjk_sentence_punct(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '；')
}

fn is_cjk_pause_punct(c: char) -> bool {
    matches!(c, '，' | '、')
}

/// Find the earliest boundary in `text`, returning the byte index one
/// past the boundary punctuation run.
///
/// Scanning is strictly left to right with no lookbehind, so boundaries
/// fire at the same positions whether text arrives in one burst or one
/// character at a time. ASCII punctuation is confirmed only by a
/// following whitespace character; end-of-buffer leaves it pending until
/// the next fragment (or the end-of-turn flush) decides.
fn find_boundary(text: &str) -> Option<usize> {
    let mut chars_seen = 0usize;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        chars_seen += 1;
        if is_cjk_sentence_punct(c) {
            return Some(end_of_punct_run(text, i + c.len_utf8()));
        }
        if is_ascii_sentence_punct(c) {
            let run_end = end_of_punct_run(text, i + c.len_utf8());
            let rest = &text[run_end..];
            if rest.starts_with(' ') {
                return Some(run_end);
            }
            // Unconfirmed (mid-number or awaiting the next fragment):
            // keep scanning past the run.
            while let Some(&(j, _)) = iter.peek() {
                if j < run_end {
                    iter.next();
                    chars_seen += 1;
                } else {
                    break;
                }
            }
            continue;
        }
        if chars_seen > COMMA_THRESHOLD {
            if is_cjk_pause_punct(c) {
                return Some(i + c.len_utf8());
            }
            if c == ',' && text[i + 1..].starts_with(' ') {
                return Some(i + 1);
            }
        }
    }
    None
}

/// Absorb any further sentence punctuation directly after a boundary
/// (so "?!" or "。。" splits once, after the run).
fn end_of_punct_run(text: &str, mut from: usize) -> usize {
    for (i, c) in text[from..].char_indices() {
        if is_ascii_sentence_punct(c) || is_cjk_sentence_punct(c) {
            from = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    from
}

/// Byte index to force-split at: the last whitespace within the first
/// `max_chars` characters, or a straight cut at `max_chars` when the
/// text has no word boundaries (CJK).
fn force_split_point(text: &str, max_chars: usize) -> usize {
    let mut cut = text.len();
    let mut last_space = None;
    for (count, (i, c)) in text.char_indices().enumerate() {
        if count == max_chars {
            cut = i;
            break;
        }
        if c == ' ' {
            last_space = Some(i);
        }
    }
    match last_space {
        // Split after the space so the remainder starts clean.
        Some(i) => i + 1,
        None => cut,
    }
}

// ── Segment cleaning helpers ──────────────────────────────────

/// Sentinel spellings after the emphasis filter has removed underscores.
const SENTINELS: &[&str] = &[
    "(ENDCONVERSATION)",
    "(END CONVERSATION)",
    "ENDCONVERSATION",
    "END CONVERSATION",
];

/// Remove every end-of-conversation sentinel. Returns the cleaned text
/// and whether any sentinel was present.
fn strip_sentinels(text: &str) -> (String, bool) {
    let mut out = text.to_owned();
    let mut found = false;
    for pattern in SENTINELS {
        while let Some(pos) = find_ascii_ci(&out, pattern) {
            out.replace_range(pos..pos + pattern.len(), "");
            found = true;
        }
    }
    (out, found)
}

/// Byte-wise ASCII case-insensitive substring search. Multi-byte UTF-8
/// never matches ASCII needle bytes, so returned positions sit on char
/// boundaries.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&start| {
        h[start..start + n.len()]
            .iter()
            .zip(n)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

/// Rewrite inline links `[label](target)` to their visible label.
fn rewrite_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let Some(close_rel) = rest[open..].find(']') else {
            break;
        };
        let close = open + close_rel;
        if !rest[close + 1..].starts_with('(') {
            out.push_str(&rest[..close + 1]);
            rest = &rest[close + 1..];
            continue;
        }
        let Some(paren_rel) = rest[close + 1..].find(')') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&rest[open + 1..close]);
        rest = &rest[close + 1 + paren_rel + 1..];
    }
    out.push_str(rest);
    out
}

/// Host suffixes treated as unspeakable even without a scheme.
const URL_SUFFIXES: &[&str] = &[".com", ".org", ".net", ".io", ".gov", ".edu"];

/// Whether the sentence contains a URL or bare hostname.
fn contains_url(text: &str) -> bool {
    for token in text.split_whitespace() {
        let lower = token.to_lowercase();
        if lower.contains("http://") || lower.contains("https://") {
            return true;
        }
        for suffix in URL_SUFFIXES {
            if let Some(pos) = lower.find(suffix) {
                if pos == 0 {
                    continue;
                }
                let after = &lower[pos + suffix.len()..];
                let host_like = after.is_empty()
                    || after.starts_with('/')
                    || after.chars().next().is_some_and(|c| c.is_ascii_punctuation());
                if host_like {
                    return true;
                }
            }
        }
    }
    false
}

/// Expand acronyms from the pronunciation table on word boundaries.
fn expand_acronyms(text: &str, table: &[(String, String)]) -> String {
    let mut out = text.to_owned();
    for (key, expansion) in table {
        if key.is_empty() {
            continue;
        }
        let mut search_from = 0;
        while let Some(rel) = out[search_from..].find(key.as_str()) {
            let start = search_from + rel;
            let end = start + key.len();
            let before_ok = out[..start]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric());
            let after_ok = out[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
            if before_ok && after_ok {
                out.replace_range(start..end, expansion);
                search_from = start + expansion.len();
            } else {
                search_from = end;
            }
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
