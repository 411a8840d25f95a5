use crate::font::is_wide_char;

/// Average glyph width is approximated as `point_size / GLYPH_WIDTH_RATIO`.
pub const GLYPH_WIDTH_RATIO: f32 = 2.4;

/// Columns available in `width_px` for a font of `point_size`.
pub fn wrap_columns(width_px: u32, point_size: f32) -> usize {
    let glyph = (point_size / GLYPH_WIDTH_RATIO).max(f32::EPSILON);
    let columns = (width_px as f32 / glyph) as i64 - 1;
    columns.max(1) as usize
}

pub(crate) fn display_columns(word: &str) -> usize {
    word.chars()
        .map(|ch| if is_wide_char(ch) { 2 } else { 1 })
        .sum()
}

/// Greedy fill. Explicit newlines force a break, words are never split and
/// a word wider than the limit gets a line of its own.
pub fn wrap_words(text: &str, max_columns: usize) -> Vec<Vec<String>> {
    let max_columns = max_columns.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current: Vec<String> = Vec::new();
        let mut used = 0usize;
        for word in paragraph.split_whitespace() {
            let cols = display_columns(word);
            if !current.is_empty() && used + 1 + cols > max_columns {
                lines.push(std::mem::take(&mut current));
                used = 0;
            }
            if current.is_empty() {
                used = cols;
            } else {
                used += 1 + cols;
            }
            current.push(word.to_string());
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(lines: &[Vec<String>]) -> Vec<String> {
        lines.iter().flatten().cloned().collect()
    }

    #[test]
    fn columns_follow_glyph_ratio() {
        assert_eq!(wrap_columns(400, 35.0), 26);
        assert_eq!(wrap_columns(400, 23.0), 40);
        assert_eq!(wrap_columns(5, 35.0), 1);
    }

    #[test]
    fn never_exceeds_limit_for_ordinary_words() {
        let text = "Lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod";
        for limit in [12, 16, 26, 80] {
            for line in wrap_words(text, limit) {
                let width: usize =
                    line.iter().map(|w| display_columns(w)).sum::<usize>() + line.len() - 1;
                assert!(width <= limit, "{:?} wider than {}", line, limit);
            }
        }
    }

    #[test]
    fn preserves_word_sequence() {
        let texts = [
            "Hello world foo bar",
            "  leading and   irregular\tspacing  ",
            "first paragraph\nsecond paragraph with more words\n\nthird",
            "supercalifragilisticexpialidocious tiny words here",
            "混合 text 日本語の文章 mixed",
        ];
        for text in texts {
            for limit in [1, 5, 12, 40] {
                let expected: Vec<String> =
                    text.split_whitespace().map(|w| w.to_string()).collect();
                assert_eq!(flatten(&wrap_words(text, limit)), expected);
            }
        }
    }

    #[test]
    fn oversized_word_gets_its_own_line() {
        let lines = wrap_words("a incomprehensibilities b", 6);
        assert_eq!(
            lines,
            vec![
                vec!["a".to_string()],
                vec!["incomprehensibilities".to_string()],
                vec!["b".to_string()],
            ]
        );
    }

    #[test]
    fn explicit_newlines_break_lines() {
        let lines = wrap_words("one two\nthree", 80);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], vec!["three".to_string()]);
    }

    #[test]
    fn wide_characters_count_double() {
        assert_eq!(display_columns("日本"), 4);
        let lines = wrap_words("日本 日本", 9);
        assert_eq!(lines.len(), 1);
        let lines = wrap_words("日本 日本", 8);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn empty_text_has_no_lines() {
        assert!(wrap_words("   \n  ", 10).is_empty());
    }
}
