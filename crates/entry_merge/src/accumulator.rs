use crate::entry::{Block, Entry, SourceLink, ASK_TEXT_USAGE};
use crate::merge::{merge_with_diagnostics, PatchFailure};

/// Snapshot emitted after each merged payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    pub entry: Entry,
    /// Full answer text so far.
    pub answer: String,
    /// Text to append since the previous update, or the whole answer when
    /// `replaced` is set.
    pub delta: String,
    /// The answer is not an extension of the previous one; render it from scratch.
    pub replaced: bool,
    pub sources: Vec<SourceLink>,
    pub is_final: bool,
    pub patch_failures: Vec<PatchFailure>,
}

/// Running state for one request. Create a fresh accumulator per stream.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    entry: Entry,
    answer: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn sources(&self) -> Vec<SourceLink> {
        extract_sources(&self.entry.blocks)
    }

    pub fn into_parts(self) -> (Entry, String) {
        (self.entry, self.answer)
    }

    pub fn update(&mut self, incoming: Entry) -> StreamUpdate {
        let is_final = incoming.signals_final();
        let outcome = merge_with_diagnostics(&self.entry, &incoming);
        for failure in &outcome.patch_failures {
            tracing::warn!(
                intended_usage = %failure.intended_usage,
                field = %failure.field,
                error = %failure.error,
                "ignoring diff block that could not be applied"
            );
        }
        self.entry = outcome.entry;

        let answer = extract_answer(&self.entry.blocks);
        let (delta, replaced) = compute_delta(&self.answer, &answer);
        if replaced {
            tracing::debug!(
                previous_len = self.answer.len(),
                next_len = answer.len(),
                "answer rewritten by server"
            );
        }
        self.answer.clone_from(&answer);

        StreamUpdate {
            entry: self.entry.clone(),
            answer,
            delta,
            replaced,
            sources: extract_sources(&self.entry.blocks),
            is_final,
            patch_failures: outcome.patch_failures,
        }
    }
}

/// Answer text of a merged block list.
///
/// The first markdown-keyed block with a markdown payload wins; the
/// `ask_text` block is the fallback.
pub fn extract_answer(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter(|block| block.intended_usage.contains("markdown"))
        .find_map(Block::markdown)
        .and_then(|markdown| markdown.text())
        .or_else(|| {
            blocks
                .iter()
                .find(|block| block.intended_usage == ASK_TEXT_USAGE)
                .and_then(Block::markdown)
                .and_then(|markdown| markdown.text())
        })
        .unwrap_or_default()
}

/// Suffix appended since `previous`, or all of `next` when it does not start
/// with `previous`. The flag reports the second case.
pub fn compute_delta(previous: &str, next: &str) -> (String, bool) {
    match next.strip_prefix(previous) {
        Some(suffix) => (suffix.to_owned(), false),
        None => (next.to_owned(), true),
    }
}

pub fn extract_sources(blocks: &[Block]) -> Vec<SourceLink> {
    blocks
        .iter()
        .filter_map(Block::web_results)
        .flat_map(|results| results.web_results.iter())
        .filter_map(|result| result.source_link())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::compute_delta;

    #[test]
    fn delta_is_suffix_for_monotonic_growth() {
        assert_eq!(
            compute_delta("Hello", "Hello world"),
            (" world".to_owned(), false)
        );
    }

    #[test]
    fn delta_is_full_answer_when_not_a_prefix() {
        assert_eq!(compute_delta("Hello", "Goodbye"), ("Goodbye".to_owned(), true));
        assert_eq!(compute_delta("Hello", "Hell"), ("Hell".to_owned(), true));
    }

    #[test]
    fn delta_from_empty_is_whole_answer() {
        assert_eq!(compute_delta("", "abc"), ("abc".to_owned(), false));
        assert_eq!(compute_delta("abc", "abc"), (String::new(), false));
    }
}
