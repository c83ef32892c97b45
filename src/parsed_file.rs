//! C2: the parsed-file model — an immutable per-file line table built once
//! and shared (by reference) across every script instance running it.

use std::collections::HashSet;

use crate::error::ParseError;
use crate::tokenize::extract_repeat_suffix;

/// The enumerated `#`-commands, plus `Chat` for a non-`#` line and `Other` for
/// an unrecognized `#`-word (forward-compatibility: dispatched as a no-op).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandTag {
    Chat,
    If,
    Elif,
    Else,
    End,
    Repeat,
    EndRepeat,
    Call,
    Try,
    Catch,
    Throw,
    Return,
    Restart,
    Stop,
    Set,
    SetLocal,
    SetGlobal,
    Rem,
    Clr,
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Clamp,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Break,
    Other(String),
}

impl CommandTag {
    /// True for the four block-opening commands that push an expected
    /// closing tag onto a frame's nesting stack.
    pub fn is_push(&self) -> bool {
        matches!(self, CommandTag::If | CommandTag::Repeat | CommandTag::Call | CommandTag::Try)
    }

    /// True for the tags that close a pushed block.
    pub fn is_pop(&self) -> bool {
        matches!(self, CommandTag::End | CommandTag::EndRepeat)
    }

    /// The expected closer a push command installs on the nesting stack.
    /// `#try` is closed by `#end`, same as `#if`/`#call`; `#catch` is a
    /// neutral marker inside the block, not a closer.
    pub fn expected_closer(&self) -> Option<CommandTag> {
        match self {
            CommandTag::If => Some(CommandTag::End),
            CommandTag::Repeat => Some(CommandTag::EndRepeat),
            CommandTag::Call => Some(CommandTag::End),
            CommandTag::Try => Some(CommandTag::End),
            _ => None,
        }
    }

    fn from_word(word: &str, warn_alias: &mut impl FnMut(&str, &str)) -> CommandTag {
        let canonical = match word {
            "elseif" => {
                warn_alias("elseif", "elif");
                "elif"
            }
            "endif" => {
                warn_alias("endif", "end");
                "end"
            }
            "endforeach" => {
                warn_alias("endforeach", "end");
                "end"
            }
            "endcall" => {
                warn_alias("endcall", "end");
                "end"
            }
            other => other,
        };
        match canonical {
            "if" => CommandTag::If,
            "elif" => CommandTag::Elif,
            "else" => CommandTag::Else,
            "end" => CommandTag::End,
            "repeat" => CommandTag::Repeat,
            "endrepeat" => CommandTag::EndRepeat,
            "call" => CommandTag::Call,
            "try" => CommandTag::Try,
            "catch" => CommandTag::Catch,
            "throw" => CommandTag::Throw,
            "return" => CommandTag::Return,
            "restart" => CommandTag::Restart,
            "stop" => CommandTag::Stop,
            "set" => CommandTag::Set,
            "setl" => CommandTag::SetLocal,
            "setg" => CommandTag::SetGlobal,
            "rem" => CommandTag::Rem,
            "clr" => CommandTag::Clr,
            "add" => CommandTag::Add,
            "sub" => CommandTag::Sub,
            "mul" => CommandTag::Mul,
            "div" => CommandTag::Div,
            "min" => CommandTag::Min,
            "max" => CommandTag::Max,
            "clamp" => CommandTag::Clamp,
            "sqrt" => CommandTag::Sqrt,
            "abs" => CommandTag::Abs,
            "floor" => CommandTag::Floor,
            "ceil" => CommandTag::Ceil,
            "round" => CommandTag::Round,
            "break" => CommandTag::Break,
            other => CommandTag::Other(other.to_string()),
        }
    }
}

/// One line of a parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Stripped text: leading whitespace trimmed, trailing `//` comment
    /// removed (outside `#call` blocks, which are dedented instead — see
    /// [`ParsedFile::from_source`]).
    pub text: String,
    pub tag: CommandTag,
    /// Compile-time repeat count parsed from a trailing ` xN` (chat lines
    /// only).
    pub repeat_count: u32,
}

/// An immutable ordered sequence of lines, shared (by reference) between every
/// concurrent script instance running this file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub name: String,
    pub lines: Vec<ParsedLine>,
}

fn strip_comment(line: &str) -> &str {
    // A `//` inside a quoted span does not start a comment.
    let chars: Vec<char> = line.chars().collect();
    let mut in_quote: Option<char> = None;
    let mut i = 0;
    while i + 1 < chars.len() {
        let c = chars[i];
        if c == '\\' {
            i += 2;
            continue;
        }
        match in_quote {
            Some(q) if c == q => in_quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => in_quote = Some(c),
            None if c == '/' && chars[i + 1] == '/' => {
                let byte_idx: usize = chars[..i].iter().collect::<String>().len();
                return &line[..byte_idx];
            }
            None => {}
        }
        i += 1;
    }
    line
}

fn leading_whitespace_count(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn first_word(trimmed: &str) -> Option<&str> {
    if !trimmed.starts_with('#') {
        return None;
    }
    let rest = &trimmed[1..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(&rest[..end])
}

impl ParsedFile {
    /// Parses `source` into an immutable line table, validating block
    /// nesting. On any structural violation the whole file is rejected.
    pub fn from_source(name: &str, source: &str) -> Result<ParsedFile, ParseError> {
        let mut raw_lines: Vec<&str> = source.lines().collect();
        if raw_lines.last().map(|l| l.is_empty()).unwrap_or(false) {
            raw_lines.pop();
        }

        let mut warned_aliases: HashSet<&'static str> = HashSet::new();
        let mut lines = Vec::with_capacity(raw_lines.len());
        let mut call_depth_ranges: Vec<(usize, usize)> = Vec::new();
        let mut call_start: Option<usize> = None;

        for (idx, raw) in raw_lines.iter().enumerate() {
            let trimmed_end = raw.trim_end();
            let trimmed = trimmed_end.trim_start();
            let tag = match first_word(trimmed) {
                Some(word) => {
                    CommandTag::from_word(word, &mut |from, to| {
                        if warned_aliases.insert(leak_alias(from)) {
                            tracing::warn!(from, to, "deprecated command alias used");
                        }
                    })
                }
                None => CommandTag::Chat,
            };

            if tag == CommandTag::Call && call_start.is_none() {
                call_start = Some(idx);
            }
            if tag == CommandTag::End {
                if let Some(start) = call_start.take() {
                    call_depth_ranges.push((start, idx));
                }
            }

            let commentless = strip_comment(trimmed).to_string();
            let (body, repeat_count) = if tag == CommandTag::Chat {
                extract_repeat_suffix(&commentless)
            } else {
                (commentless, None)
            };

            lines.push(ParsedLine {
                text: body.trim_end().to_string(),
                tag,
                repeat_count: repeat_count.unwrap_or(0),
            });
        }

        validate_nesting(name, &lines)?;
        normalize_call_blocks(&mut lines, &raw_lines, &call_depth_ranges);

        Ok(ParsedFile {
            name: name.to_string(),
            lines,
        })
    }
}

fn leak_alias(s: &str) -> &'static str {
    // Small, bounded set of literal alias names; leaking is acceptable and
    // keeps the one-shot-warning set simple (no lifetime threading needed).
    match s {
        "elseif" => "elseif",
        "endif" => "endif",
        "endforeach" => "endforeach",
        "endcall" => "endcall",
        "endrepeat" => "endrepeat",
        _ => "other",
    }
}

fn validate_nesting(name: &str, lines: &[ParsedLine]) -> Result<(), ParseError> {
    let mut stack: Vec<CommandTag> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        match &line.tag {
            t if t.is_push() => {
                stack.push(t.expected_closer().unwrap());
            }
            CommandTag::EndRepeat => {
                if stack.pop().as_ref() != Some(&CommandTag::EndRepeat) {
                    return Err(ParseError::new(name, i + 1, "unbalanced #endrepeat"));
                }
            }
            CommandTag::End => {
                if stack.pop().as_ref() != Some(&CommandTag::End) {
                    return Err(ParseError::new(name, i + 1, "unbalanced #end"));
                }
            }
            // #catch is a marker inside a #try block, not a pop; #try/#end
            // balance the block on their own.
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(ParseError::new(name, lines.len(), "unclosed block at end of file"));
    }
    Ok(())
}

/// For each `#call … #end` region, strip the minimum common leading
/// whitespace across interior lines (the header/closer lines are left
/// untouched; this only re-indents the body).
fn normalize_call_blocks(lines: &mut [ParsedLine], raw_lines: &[&str], ranges: &[(usize, usize)]) {
    for &(start, end) in ranges {
        if end <= start + 1 {
            continue;
        }
        let interior = &raw_lines[start + 1..end];
        let min_indent = interior
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| leading_whitespace_count(l))
            .min()
            .unwrap_or(0);
        for (offset, raw) in interior.iter().enumerate() {
            let line_idx = start + 1 + offset;
            if raw.trim().is_empty() {
                lines[line_idx].text = String::new();
            } else {
                let stripped: String = raw.chars().skip(min_indent).collect();
                lines[line_idx].text = stripped.trim_end().to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unbalanced_if() {
        let src = "#if 1 > 0\n/say hi\n";
        assert!(ParsedFile::from_source("f.cheat", src).is_err());
    }

    #[test]
    fn accepts_balanced_if_else() {
        let src = "#if 1 > 0\n/say hi\n#else\n/say lo\n#end\n";
        let f = ParsedFile::from_source("f.cheat", src).unwrap();
        assert_eq!(f.lines[0].tag, CommandTag::If);
        assert_eq!(f.lines[4].tag, CommandTag::End);
    }

    #[test]
    fn rejects_dangling_catch() {
        let src = "#catch e\n/say no\n#end\n";
        assert!(ParsedFile::from_source("f.cheat", src).is_err());
    }

    #[test]
    fn try_without_catch_closed_by_end() {
        let src = "#try\n/say x\n#end\n";
        assert!(ParsedFile::from_source("f.cheat", src).is_ok());
    }

    #[test]
    fn strips_trailing_comment_outside_quotes() {
        let src = "/say hi // a comment\n";
        let f = ParsedFile::from_source("f.cheat", src).unwrap();
        assert_eq!(f.lines[0].text, "/say hi");
    }

    #[test]
    fn preserves_slashes_inside_quotes() {
        let src = "/say \"http://example.com\"\n";
        let f = ParsedFile::from_source("f.cheat", src).unwrap();
        assert_eq!(f.lines[0].text, "/say \"http://example.com\"");
    }

    #[test]
    fn call_block_dedented_to_minimum_common_indent() {
        let src = "#call foo\n    /a\n      /b\n#end\n";
        let f = ParsedFile::from_source("f.cheat", src).unwrap();
        assert_eq!(f.lines[1].text, "/a");
        assert_eq!(f.lines[2].text, "  /b");
    }

    #[test]
    fn deprecated_alias_maps_to_canonical_tag() {
        let src = "#if 1\n/x\n#endif\n";
        let f = ParsedFile::from_source("f.cheat", src).unwrap();
        assert_eq!(f.lines[2].tag, CommandTag::End);
    }

    #[test]
    fn repeat_suffix_extracted_on_chat_lines() {
        let src = "/ping x3\n";
        let f = ParsedFile::from_source("f.cheat", src).unwrap();
        assert_eq!(f.lines[0].text, "/ping");
        assert_eq!(f.lines[0].repeat_count, 3);
    }
}
