use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::subtitle::Cue;

/// A sentence-level block built from one or more consecutive cues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedBlock {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

static SPEAKER_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\[SPEAKER_\d+\]:)\s*").unwrap());
static SPEAKER_TAG_ANYWHERE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[SPEAKER_\d+\]:\s*").unwrap());
static TERMINATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,。，?!…]+$").unwrap());
static TERMINATOR_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,。，?!…]{2,}").unwrap());

/// Coalesce fragment-level cues into sentence-level blocks.
///
/// A single left-to-right scan: the open accumulator is closed when the last
/// fragment ends with a sentence terminator, or when the silence before the
/// next cue exceeds `gap_threshold_ms`. Either condition alone forces the
/// break. Output indices are renumbered 1..N.
pub fn merge(cues: &[Cue], gap_threshold_ms: u64) -> Vec<MergedBlock> {
    let mut blocks: Vec<MergedBlock> = Vec::new();
    let mut fragments: Vec<&Cue> = Vec::new();

    for cue in cues {
        if let Some(last) = fragments.last() {
            // Overlapping cues produce a zero gap, which never splits
            let gap = cue.start_ms.saturating_sub(last.end_ms);
            if ends_with_terminator(&last.text) || gap > gap_threshold_ms {
                let block = finalize(&fragments, blocks.len() + 1);
                blocks.push(block);
                fragments.clear();
            }
        }
        fragments.push(cue);
    }

    if !fragments.is_empty() {
        let block = finalize(&fragments, blocks.len() + 1);
        blocks.push(block);
    }

    debug!("Merged {} cues into {} blocks", cues.len(), blocks.len());
    blocks
}

/// Terminator test on the trimmed tail, with any leading speaker tag removed.
fn ends_with_terminator(text: &str) -> bool {
    let stripped = SPEAKER_TAG_RE.replace(text, "");
    TERMINATOR_RE.is_match(stripped.trim())
}

/// Close an accumulator into a block: strip speaker tags from every
/// fragment, concatenate in order, collapse terminator runs to a single
/// period, and re-prefix the first fragment's speaker tag if it had one.
fn finalize(fragments: &[&Cue], index: usize) -> MergedBlock {
    let first = fragments[0];
    let last = fragments[fragments.len() - 1];

    let speaker_tag = SPEAKER_TAG_RE
        .captures(&first.text)
        .map(|caps| caps[1].to_string());

    let mut text: String = fragments
        .iter()
        .map(|f| SPEAKER_TAG_ANYWHERE_RE.replace_all(&f.text, "").into_owned())
        .collect();
    text = TERMINATOR_RUN_RE.replace_all(&text, ".").into_owned();

    let text = match speaker_tag {
        Some(tag) => format!("{} {}", tag, text).trim().to_string(),
        None => text.trim().to_string(),
    };

    MergedBlock {
        index,
        start_ms: first.start_ms,
        end_ms: last.end_ms,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start_ms: u64, end_ms: u64, text: &str) -> Cue {
        Cue {
            index: 0,
            start_ms,
            end_ms,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_terminator_splits_regardless_of_gap() {
        let cues = vec![cue(0, 1_000, "Hello."), cue(1_001, 2_000, "World")];
        let blocks = merge(&cues, 700);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "Hello.");
        assert_eq!(blocks[1].text, "World");
    }

    #[test]
    fn test_small_gap_without_terminator_merges() {
        let cues = vec![cue(0, 1_000, "I think"), cue(1_200, 2_000, "therefore I am")];
        let blocks = merge(&cues, 700);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "I thinktherefore I am");
        assert_eq!(blocks[0].start_ms, 0);
        assert_eq!(blocks[0].end_ms, 2_000);
    }

    #[test]
    fn test_large_gap_splits() {
        let cues = vec![cue(0, 1_000, "I think"), cue(2_000, 3_000, "therefore I am")];
        let blocks = merge(&cues, 700);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_no_cue_text_is_dropped() {
        let cues = vec![
            cue(0, 500, "one "),
            cue(600, 1_100, "two. "),
            cue(3_000, 3_500, "three "),
            cue(3_600, 4_100, "four"),
        ];
        let blocks = merge(&cues, 700);
        let merged: String = blocks.iter().map(|b| b.text.as_str()).collect();
        let original: String = cues.iter().map(|c| c.text.as_str()).collect();
        // Preservation modulo trimming at block edges
        let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(squash(&merged), squash(&original));
    }

    #[test]
    fn test_terminator_runs_collapse_to_period() {
        let cues = vec![cue(0, 1_000, "Wait..."), cue(1_100, 2_000, "what?!")];
        let blocks = merge(&cues, 700);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "Wait.");
        assert_eq!(blocks[1].text, "what.");
    }

    #[test]
    fn test_speaker_tag_stripped_and_reprefixed() {
        let cues = vec![
            cue(0, 1_000, "[SPEAKER_1]: we should"),
            cue(1_100, 2_000, "[SPEAKER_1]: go now."),
        ];
        let blocks = merge(&cues, 700);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "[SPEAKER_1]: we shouldgo now.");
    }

    #[test]
    fn test_speaker_tag_participates_in_terminator_test() {
        // A terminator behind a speaker tag must still force the split
        let cues = vec![
            cue(0, 1_000, "[SPEAKER_2]: first."),
            cue(1_100, 2_000, "second"),
        ];
        let blocks = merge(&cues, 700);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "[SPEAKER_2]: first.");
    }

    #[test]
    fn test_single_unterminated_fragment_becomes_own_block() {
        let cues = vec![cue(0, 1_000, "trailing fragment")];
        let blocks = merge(&cues, 700);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "trailing fragment");
    }

    #[test]
    fn test_indices_are_contiguous() {
        let cues = vec![
            cue(0, 500, "a."),
            cue(600, 1_100, "b."),
            cue(1_200, 1_700, "c."),
        ];
        let blocks = merge(&cues, 700);
        let indices: Vec<usize> = blocks.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_input_yields_no_blocks() {
        assert!(merge(&[], 700).is_empty());
    }

    #[test]
    fn test_overlapping_cues_merge() {
        let cues = vec![cue(0, 1_500, "over"), cue(1_000, 2_000, "lap")];
        let blocks = merge(&cues, 700);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "overlap");
    }
}
