//! C4: tokenizer helpers — the comma splitter, the bracket-pair finder, the
//! quote-aware symbol search, and repeat-suffix extraction.

/// Splits `line` on top-level commas.
///
/// Quote/paren tracking here is a *single-level toggle*, not a nest counter:
/// entering `"`, `'`, or `(` remembers the matching closer and only that exact
/// character clears the span. A second `(` seen while already inside a paren
/// span is an ordinary character — parens do not nest in the comma splitter
/// (unlike [`find_bracket_pair`], which does proper nest-counting). A
/// backslash escapes the following character, suppressing its special
/// meaning; a trailing lone backslash at end of input is dropped rather than
/// escaping anything synthetic.
pub fn split_commands(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut end_quote = '\0';
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            if i + 1 < chars.len() {
                current.push(chars[i + 1]);
                i += 2;
                continue;
            } else {
                // Trailing lone backslash: dropped, escapes nothing.
                break;
            }
        }
        if in_quote {
            current.push(c);
            if c == end_quote {
                in_quote = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '\'' => {
                in_quote = true;
                end_quote = c;
                current.push(c);
            }
            '(' => {
                in_quote = true;
                end_quote = ')';
                current.push(c);
            }
            ',' => {
                pieces.push(current.trim_end().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
        i += 1;
    }
    pieces.push(current.trim_end().to_string());
    pieces
}

/// Finds the first balanced `open`/`close` pair starting at `offset`, honoring
/// backslash escapes and proper nest-counting. Returns `(begin, end)` byte
/// (char) indices of the opening and closing characters, or `None` if no
/// balanced pair exists.
pub fn find_bracket_pair(line: &str, open: char, close: char, offset: usize) -> Option<(usize, usize)> {
    let chars: Vec<char> = line.chars().collect();
    let mut begin = None;
    let mut nest = 0i32;
    let mut i = offset;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            i += 2;
            continue;
        } else if c == open {
            if begin.is_none() {
                begin = Some(i);
            }
            nest += 1;
        } else if c == close {
            nest -= 1;
            if nest == 0 {
                return begin.map(|b| (b, i));
            }
        }
        i += 1;
    }
    None
}

/// Finds the first occurrence of `needle` in `haystack` that is outside any
/// `"…"` span and not immediately preceded by a backslash. A candidate
/// position is "inside quotes" iff the count of unescaped `"` to its left and
/// to its right are both odd.
pub fn find_symbol(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let chars: Vec<char> = haystack.chars().collect();
    let needle_chars: Vec<char> = needle.chars().collect();
    let n = needle_chars.len();
    'outer: for i in 0..=chars.len().saturating_sub(n) {
        if chars[i..i + n] != needle_chars[..] {
            continue;
        }
        if i > 0 && chars[i - 1] == '\\' {
            continue 'outer;
        }
        let quotes_left = chars[..i].iter().filter(|&&c| c == '"').count();
        let quotes_right = chars[i + n..].iter().filter(|&&c| c == '"').count();
        if quotes_left % 2 == 1 && quotes_right % 2 == 1 {
            continue;
        }
        return Some(i);
    }
    None
}

/// A chat line's trailing ` xN` repeat suffix, if any. A line containing `#`
/// anywhere is never repeat-extracted (only plain chat lines carry a repeat
/// count).
pub fn extract_repeat_suffix(line: &str) -> (String, Option<u32>) {
    if line.contains('#') {
        return (line.to_string(), None);
    }
    if let Some(space_idx) = line.rfind(' ') {
        let tail = &line[space_idx + 1..];
        if let Some(digits) = tail.strip_prefix('x') {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(n) = digits.parse::<u32>() {
                    return (line[..space_idx].to_string(), Some(n));
                }
            }
        }
    }
    (line.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_commas() {
        assert_eq!(split_commands("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn does_not_split_inside_quotes() {
        assert_eq!(split_commands("\"a,b\",c"), vec!["\"a,b\"", "c"]);
    }

    #[test]
    fn backslash_escapes_next_character() {
        assert_eq!(split_commands("a\\,b,c"), vec!["a,b", "c"]);
    }

    #[test]
    fn trailing_lone_backslash_is_dropped() {
        assert_eq!(split_commands("a,b\\"), vec!["a", "b"]);
    }

    #[test]
    fn parens_do_not_nest_in_comma_splitter() {
        // A second '(' inside an already-open paren span is an ordinary
        // character; the span only ends at the first ')'.
        assert_eq!(split_commands("(a(b),c"), vec!["(a(b)", "c"]);
    }

    #[test]
    fn bracket_pair_nests_properly() {
        assert_eq!(find_bracket_pair("f(g(x),y)", '(', ')', 0), Some((1, 8)));
    }

    #[test]
    fn bracket_pair_honors_escapes() {
        assert_eq!(find_bracket_pair("f(\\)x)", '(', ')', 0), Some((1, 5)));
    }

    #[test]
    fn bracket_pair_unbalanced_is_none() {
        assert_eq!(find_bracket_pair("f(x", '(', ')', 0), None);
    }

    #[test]
    fn symbol_search_skips_quoted_occurrences() {
        assert_eq!(find_symbol("\"a==b\" == c", "=="), Some(7));
    }

    #[test]
    fn repeat_suffix_is_extracted_from_chat_lines() {
        assert_eq!(
            extract_repeat_suffix("/ping x3"),
            ("/ping".to_string(), Some(3))
        );
    }

    #[test]
    fn repeat_suffix_ignored_on_command_lines() {
        assert_eq!(
            extract_repeat_suffix("#repeat 3"),
            ("#repeat 3".to_string(), None)
        );
    }
}
