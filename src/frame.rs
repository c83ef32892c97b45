//! C7: the script instance — per-invocation cursor, nesting stack, pause
//! state, and parameter vector of one running script frame.

use std::sync::Arc;

use crate::parsed_file::{CommandTag, ParsedFile};
use crate::scope::VariableScope;

/// Why a frame is currently suspended.
#[derive(Debug, Clone, PartialEq)]
pub enum PauseReason {
    /// A host-specified number of milliseconds remain.
    Duration(u64),
    /// Resume on the very next tick.
    SingleFrame,
    /// A host-defined gameplay event must clear this (e.g. "Teleport").
    Event(String),
}

#[derive(Debug, Clone, Default)]
pub struct Pause {
    pub reason: Option<PauseReason>,
}

impl Pause {
    pub fn is_paused(&self) -> bool {
        self.reason.is_some()
    }

    pub fn clear(&mut self) {
        self.reason = None;
    }

    /// Ticks a duration pause down by `elapsed_ms`, clearing it once spent.
    /// No-op for non-duration pauses.
    pub fn tick(&mut self, elapsed_ms: u64) {
        if let Some(PauseReason::Duration(remaining)) = &mut self.reason {
            if *remaining <= elapsed_ms {
                self.reason = None;
            } else {
                *remaining -= elapsed_ms;
            }
        }
    }
}

/// Per-line mutable state: the current repeat iteration and, for a `#repeat`
/// header, the line index of the matching `#endrepeat` (and vice versa, the
/// origin line for the `#endrepeat` to jump back to).
#[derive(Debug, Clone, Default)]
pub struct LineData {
    pub repeats_done: u32,
    pub repeat_max: u32,
    /// For `#repeat`: unused. For `#endrepeat`: the line index of the
    /// corresponding `#repeat` header to jump back to.
    pub origin_line: Option<usize>,
}

/// One running script frame: owns a shared, immutable parsed file, its own
/// cursors, local scope, nesting stack, and pause/try state.
#[derive(Debug, Clone)]
pub struct Frame {
    pub file: Arc<ParsedFile>,
    /// Index into `file.lines`.
    pub line: usize,
    /// Index into the comma-split sub-commands of the current line.
    pub column: usize,
    /// Parallel vector, sized identically to `file.lines`, holding per-line
    /// repeat/jump state.
    pub line_data: Vec<LineData>,
    pub parameters: Vec<String>,
    pub locals: VariableScope,
    /// Expected closing tag codes, one per currently-open block.
    pub nesting: Vec<CommandTag>,
    pub pause: Pause,
    pub in_try: bool,
    /// Reentrancy guard: held while an outer invocation (e.g. a `#call`
    /// bridging back into the interpreter) is in flight.
    pub locked: bool,
}

impl Frame {
    pub fn new(file: Arc<ParsedFile>, parameters: Vec<String>) -> Self {
        let len = file.lines.len();
        Self {
            file,
            line: 0,
            column: 0,
            line_data: vec![LineData::default(); len],
            parameters,
            locals: VariableScope::new(),
            nesting: Vec::new(),
            pause: Pause::default(),
            in_try: false,
            locked: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.line >= self.file.lines.len()
    }

    pub fn current_tag(&self) -> Option<&CommandTag> {
        self.file.lines.get(self.line).map(|l| &l.tag)
    }

    /// Advances to the next line, resetting the column cursor.
    pub fn advance_line(&mut self) {
        self.line += 1;
        self.column = 0;
    }

    /// Invariant: the nesting stack's depth equals (push-commands executed) −
    /// (pop-commands executed) at the current line; when a frame terminates
    /// normally its nesting stack is empty.
    pub fn nesting_is_balanced(&self) -> bool {
        self.nesting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsed_file::ParsedFile;

    fn demo_frame(src: &str) -> Frame {
        let file = Arc::new(ParsedFile::from_source("demo.cheat", src).unwrap());
        Frame::new(file, vec!["a".into(), "b".into()])
    }

    #[test]
    fn new_frame_starts_at_line_zero_with_empty_nesting() {
        let f = demo_frame("/say hi\n");
        assert_eq!(f.line, 0);
        assert!(f.nesting_is_balanced());
    }

    #[test]
    fn pause_duration_ticks_down_and_clears() {
        let mut p = Pause {
            reason: Some(PauseReason::Duration(100)),
        };
        p.tick(40);
        assert!(p.is_paused());
        p.tick(100);
        assert!(!p.is_paused());
    }

    #[test]
    fn advance_line_resets_column() {
        let mut f = demo_frame("/a\n/b\n");
        f.column = 3;
        f.advance_line();
        assert_eq!(f.line, 1);
        assert_eq!(f.column, 0);
    }
}
