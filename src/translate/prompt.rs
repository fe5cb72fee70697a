use once_cell::sync::Lazy;
use regex::Regex;

use crate::merge::MergedBlock;
use crate::subtitle::TranslationMap;

static RESPONSE_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(\d+)\]\s*(.*)$").unwrap());

/// Serialize blocks into the line-tagged prompt: an instruction naming the
/// target language, then one `[index] text` line per block with internal
/// newlines flattened to a single space.
pub fn build_prompt(blocks: &[MergedBlock], target_language: &str) -> String {
    let mut prompt = format!(
        "Translate the following subtitle lines into '{}'. \
         Reply with one line per input line, keeping the leading [index] tag unchanged.\n",
        target_language
    );

    for block in blocks {
        let flat = block.text.replace('\n', " ");
        prompt.push_str(&format!("[{}] {}\n", block.index, flat));
    }

    prompt
}

/// Parse the engine's output into a translation map. Lines not shaped like
/// `[digits] text` are ignored, so garbage or an empty response yields an
/// empty map rather than an error.
pub fn parse_response(raw: &str) -> TranslationMap {
    let mut translations = TranslationMap::new();

    for line in raw.lines() {
        if let Some(caps) = RESPONSE_LINE_RE.captures(line.trim()) {
            if let Ok(index) = caps[1].parse::<usize>() {
                translations.insert(index, caps[2].trim().to_string());
            }
        }
    }

    translations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: usize, text: &str) -> MergedBlock {
        MergedBlock {
            index,
            start_ms: 0,
            end_ms: 1_000,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_build_prompt_shape() {
        let blocks = vec![block(1, "Hello there"), block(2, "Line one\nline two")];
        let prompt = build_prompt(&blocks, "vi");
        assert!(prompt.starts_with("Translate the following subtitle lines into 'vi'."));
        assert!(prompt.contains("\n[1] Hello there\n"));
        // Internal newlines become a single space
        assert!(prompt.contains("\n[2] Line one line two\n"));
    }

    #[test]
    fn test_parse_response_basic() {
        let map = parse_response("[1] Xin chào\n[2] Thế giới");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&1).unwrap(), "Xin chào");
    }

    #[test]
    fn test_parse_response_ignores_unmatched_lines() {
        let raw = "Sure, here are the translations:\n[3] third line\n---\n[not-a-number] nope\n";
        let map = parse_response(raw);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&3).unwrap(), "third line");
    }

    #[test]
    fn test_parse_response_empty_and_garbage() {
        assert!(parse_response("").is_empty());
        assert!(parse_response("complete [nonsense] without\n\nany tagged lines").is_empty());
    }

    #[test]
    fn test_parse_response_empty_translation_text() {
        let map = parse_response("[4]");
        assert_eq!(map.get(&4).unwrap(), "");
    }
}
