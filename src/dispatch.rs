//! C9: the command dispatcher. Rather than mirroring a large switch, each
//! `#`-command is a variant of [`ControlFlow`] produced by one handler
//! function closing over the current frame and scope chain, per the scheduler
//! design notes.

use crate::error::{RuntimeError, ScriptError};
use crate::expr::evaluate;
use crate::frame::Frame;
use crate::parsed_file::CommandTag;
use crate::scope::{ScopeChain, ScopeTarget};
use crate::tokenize::{find_bracket_pair, split_commands};

/// Return codes driving the scheduler, exactly the five named in the spec.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    /// Same line, advance the column cursor to the next sub-command.
    Continue,
    /// Advance to the next line, reset the column cursor.
    NextLine,
    /// Restart the scheduler's line-drain loop (`#restart`, or after a
    /// `#call` inserts the callee's frame).
    ReEnterLoop,
    /// Pop this frame (`#return`).
    TerminateScript,
    /// Pop the entire stack (`#stop`).
    TerminateAllScripts,
}

/// A `#call`'s resolved target and captured body, handed back to the
/// scheduler to route to the external executor (keeps this module free of a
/// dependency on [`crate::host`]).
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub target: String,
    /// The call's own argument list, e.g. `#call foo(a, b)` — substituted
    /// already by the time dispatch runs (the whole line passed through C6
    /// first). Empty when the target carries no parenthesized arg list.
    pub args: Vec<String>,
    pub body_lines: Vec<String>,
}

/// The outcome of dispatching one sub-command.
pub enum DispatchOutcome {
    Flow(ControlFlow),
    Call(CallRequest),
}

fn split_first_word(args: &str) -> (&str, &str) {
    let trimmed = args.trim_start();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => (&trimmed[..idx], trimmed[idx..].trim_start()),
        None => (trimmed, ""),
    }
}

/// Moves the cursor forward past any enclosed push/pop pairs until a
/// top-level occurrence of `target` (or of `#end`, if different) is found.
/// Used to skip a failed `#if` branch, to reach a `#catch`, or to step from
/// `#elif`/`#else` to the closer.
pub fn move_to_next_tag(frame: &Frame, from_line: usize, target: &CommandTag) -> usize {
    move_to_next_tag_any(frame, from_line, std::slice::from_ref(target))
}

/// As [`move_to_next_tag`], but stops at the first top-level occurrence of
/// any tag in `targets` (or of `#end`, always implicitly included).
pub fn move_to_next_tag_any(frame: &Frame, from_line: usize, targets: &[CommandTag]) -> usize {
    let mut depth = 0i32;
    let mut i = from_line + 1;
    while i < frame.file.lines.len() {
        let tag = &frame.file.lines[i].tag;
        if depth == 0 && (targets.contains(tag) || *tag == CommandTag::End) {
            return i;
        }
        if tag.is_push() {
            depth += 1;
        } else if tag.is_pop() && depth > 0 {
            depth -= 1;
        }
        i += 1;
    }
    frame.file.lines.len()
}

/// Forward scan from a `#repeat` header counting push/pop commands until the
/// matching `#end`(`#endrepeat`) is reached.
pub fn find_end(frame: &Frame, from_line: usize) -> usize {
    move_to_next_tag(frame, from_line, &CommandTag::EndRepeat)
}

fn arg_after(args: &str) -> String {
    args.trim().to_string()
}

/// Scans forward from a falsified `#if` through any `#elif`/`#else` chain,
/// evaluating each `#elif` condition in turn, and returns the line to resume
/// at: the first taken branch's body, or the line after `#end` if none is
/// taken (with the frame's nesting entry popped in that case).
///
/// Note: `#elif` condition text here is evaluated as written in the parsed
/// file, without a fresh variable-substitution pass — the scheduler only
/// substitutes the line it is actively dispatching. `#elif` conditions built
/// from live `$`-substitutions are resolved the same way an `#if` is, the
/// first time the scheduler actually dispatches that line; this lookahead
/// only needs the condition's truth value to pick a branch, and re-evaluates
/// the chosen line normally once the cursor lands on it.
fn walk_elif_chain(frame: &mut Frame, start_line: usize) -> Result<usize, ScriptError> {
    let mut scan_from = start_line;
    loop {
        let next = move_to_next_tag_any(frame, scan_from, &[CommandTag::Elif, CommandTag::Else]);
        match frame.file.lines.get(next).map(|l| l.tag.clone()) {
            Some(CommandTag::Elif) => {
                let text = frame.file.lines[next].text.clone();
                let without_hash = text.trim_start().strip_prefix('#').unwrap_or(&text);
                let (_, cond) = split_first_word(without_hash);
                if evaluate(cond).map_err(ScriptError::from)? {
                    // Enter the taken branch's body directly; the `#elif`
                    // line itself is never (re-)dispatched on this path.
                    return Ok(next + 1);
                }
                scan_from = next;
            }
            Some(CommandTag::Else) => return Ok(next + 1),
            _ => {
                // Landed on #end: no branch taken, resume after it.
                frame.nesting.pop();
                return Ok(next + 1);
            }
        }
    }
}

/// Dispatches one sub-command (already variable-substituted) against `frame`
/// and `scope`. `line` is the full text of the current source line (needed by
/// `#if`/`#repeat` to locate their bodies via line index, not sub-command
/// text).
pub fn dispatch(
    command_text: &str,
    frame: &mut Frame,
    scope: &mut ScopeChain,
) -> Result<DispatchOutcome, ScriptError> {
    let trimmed = command_text.trim();
    let without_hash = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let (word, rest) = split_first_word(without_hash);
    let tag = frame
        .current_tag()
        .cloned()
        .unwrap_or(CommandTag::Other(word.to_string()));

    use ControlFlow::*;

    let outcome = match &tag {
        CommandTag::Chat => unreachable!("dispatch only called for '#'-prefixed sub-commands"),
        CommandTag::If => {
            let taken = evaluate(rest).map_err(ScriptError::from)?;
            frame.nesting.push(CommandTag::End);
            if taken {
                Continue
            } else {
                frame.line = walk_elif_chain(frame, frame.line)?;
                ReEnterLoop
            }
        }
        CommandTag::Elif | CommandTag::Else => {
            // Reached only by falling through a previously-taken branch. The
            // pop below balances the single `End` the `#if` pushed, so land
            // on the line and advance past it rather than re-dispatching
            // `#end` (which would pop a second time).
            let end_line = move_to_next_tag(frame, frame.line, &CommandTag::End);
            frame.nesting.pop();
            frame.line = end_line;
            NextLine
        }
        CommandTag::End => {
            frame.nesting.pop();
            NextLine
        }
        CommandTag::Repeat => {
            let n: u32 = arg_after(rest).parse().unwrap_or(0);
            frame.nesting.push(CommandTag::EndRepeat);
            if n == 0 {
                let end_line = find_end(frame, frame.line);
                frame.nesting.pop();
                frame.line = end_line + 1;
                ReEnterLoop
            } else {
                let end_line = find_end(frame, frame.line);
                if end_line < frame.line_data.len() {
                    frame.line_data[end_line].origin_line = Some(frame.line);
                    frame.line_data[end_line].repeat_max = n;
                    frame.line_data[end_line].repeats_done = 0;
                }
                NextLine
            }
        }
        CommandTag::EndRepeat => {
            let data = frame.line_data[frame.line].clone();
            if let Some(origin) = data.origin_line {
                if data.repeats_done + 1 < data.repeat_max {
                    frame.line_data[frame.line].repeats_done += 1;
                    frame.line = origin + 1;
                    ReEnterLoop
                } else {
                    frame.nesting.pop();
                    NextLine
                }
            } else {
                frame.nesting.pop();
                NextLine
            }
        }
        CommandTag::Restart => {
            frame.nesting.clear();
            frame.line = 0;
            frame.column = 0;
            for ld in &mut frame.line_data {
                *ld = Default::default();
            }
            frame.in_try = false;
            ReEnterLoop
        }
        CommandTag::Stop => TerminateAllScripts,
        CommandTag::Return => {
            let expanded = arg_after(rest);
            scope.set(ScopeTarget::RootScript, "result", &expanded);
            frame.nesting.clear();
            TerminateScript
        }
        CommandTag::Try => {
            if frame.in_try {
                return Err(RuntimeError::new("nested #try is not supported").into());
            }
            frame.nesting.push(CommandTag::Catch);
            frame.in_try = true;
            NextLine
        }
        CommandTag::Throw => {
            return Err(RuntimeError::user_throw(arg_after(rest)).into());
        }
        CommandTag::Catch => {
            // Reached only when the guarded block ran cleanly. The pop below
            // balances the single closer the `#try` pushed, so land on
            // `#end` and advance past it instead of re-dispatching it.
            let end_line = move_to_next_tag(frame, frame.line, &CommandTag::End);
            frame.nesting.pop();
            frame.in_try = false;
            frame.line = end_line;
            NextLine
        }
        CommandTag::Call => {
            let (target, args_str) = call_target_args(&arg_after(rest));
            let args = match args_str {
                Some(s) => split_commands(&s),
                None => Vec::new(),
            };
            let call_end = find_call_end(frame, frame.line);
            let body_lines: Vec<String> = frame.file.lines[frame.line + 1..call_end]
                .iter()
                .map(|l| l.text.clone())
                .collect();
            frame.nesting.push(CommandTag::End);
            frame.line = call_end + 1;
            return Ok(DispatchOutcome::Call(CallRequest { target, args, body_lines }));
        }
        CommandTag::Set => set_command(rest, ScopeTarget::RootScript, scope),
        CommandTag::SetLocal => set_command(rest, ScopeTarget::Local, scope),
        CommandTag::SetGlobal => set_command(rest, ScopeTarget::Global, scope),
        CommandTag::Rem => {
            scope.remove_everywhere(arg_after(rest).as_str());
            NextLine
        }
        CommandTag::Clr => {
            scope.clear_all();
            NextLine
        }
        CommandTag::Add | CommandTag::Sub | CommandTag::Mul | CommandTag::Div | CommandTag::Min
        | CommandTag::Max => {
            arith_command(&tag, rest, scope)?;
            NextLine
        }
        CommandTag::Clamp => {
            let mut parts = rest.split_whitespace();
            let name = parts.next().unwrap_or("").to_string();
            let lo = parts.next().unwrap_or("0").to_string();
            let hi = parts.next().unwrap_or("0").to_string();
            if let Some(cell) = scope.resolve_owning_mut(&name) {
                cell.clamp(&lo, &hi).map_err(ScriptError::from)?;
            }
            NextLine
        }
        CommandTag::Sqrt | CommandTag::Abs | CommandTag::Floor | CommandTag::Ceil | CommandTag::Round => {
            let name = arg_after(rest);
            if let Some(cell) = scope.resolve_owning_mut(&name) {
                let res = match tag {
                    CommandTag::Sqrt => cell.sqrt(),
                    CommandTag::Abs => cell.abs(),
                    CommandTag::Floor => cell.floor(),
                    CommandTag::Ceil => cell.ceil(),
                    CommandTag::Round => cell.round(),
                    _ => unreachable!(),
                };
                res.map_err(ScriptError::from)?;
            }
            NextLine
        }
        CommandTag::Break => NextLine, // no debugger attached: no-op
        CommandTag::Other(_) => NextLine, // forward-compatibility: silently ignored
    };

    Ok(DispatchOutcome::Flow(outcome))
}

fn find_call_end(frame: &Frame, from_line: usize) -> usize {
    move_to_next_tag(frame, from_line, &CommandTag::End)
}

fn set_command(rest: &str, target: ScopeTarget, scope: &mut ScopeChain) -> ControlFlow {
    let (name, value) = split_first_word(rest);
    scope.set(target, name, value);
    ControlFlow::NextLine
}

fn arith_command(tag: &CommandTag, rest: &str, scope: &mut ScopeChain) -> Result<(), ScriptError> {
    let (name, value_str) = split_first_word(rest);
    let Some(cell) = scope.resolve_owning_mut(name) else {
        // Silently no-op if the target variable is missing.
        return Ok(());
    };
    let value = value_str.trim();
    let result = match tag {
        CommandTag::Add => cell.add(value),
        CommandTag::Sub => cell.subtract(value),
        CommandTag::Mul => cell.multiply(value),
        CommandTag::Div => cell.divide(value),
        CommandTag::Min => cell.min(value),
        CommandTag::Max => cell.max(value),
        _ => unreachable!(),
    };
    result.map_err(ScriptError::from)
}

/// A balanced-bracket helper reused by `#call` body extraction when targets
/// are written with an explicit arg list, e.g. `#call foo(a, b)`.
pub fn call_target_args(target: &str) -> (String, Option<String>) {
    if let Some((open, close)) = find_bracket_pair(target, '(', ')', 0) {
        (target[..open].trim().to_string(), Some(target[open + 1..close].to_string()))
    } else {
        (target.trim().to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsed_file::ParsedFile;
    use crate::scope::VariableScope;
    use std::sync::Arc;

    fn make_frame(src: &str) -> Frame {
        let file = Arc::new(ParsedFile::from_source("t.cheat", src).unwrap());
        Frame::new(file, vec![])
    }

    fn with_scope<F: FnOnce(&mut Frame, &mut ScopeChain) -> R, R>(frame: &mut Frame, f: F) -> R {
        let mut root = VariableScope::new();
        let mut global = VariableScope::new();
        let mut locals = std::mem::take(&mut frame.locals);
        let result = {
            let mut chain = ScopeChain {
                local: &mut locals,
                root_script: &mut root,
                global: &mut global,
            };
            f(frame, &mut chain)
        };
        frame.locals = locals;
        result
    }

    #[test]
    fn if_false_skips_to_else() {
        let src = "#if 1 == 2\n/a\n#else\n/b\n#end\n";
        let mut frame = make_frame(src);
        let outcome = with_scope(&mut frame, |f, s| dispatch("#if 1 == 2", f, s).unwrap());
        assert!(matches!(outcome, DispatchOutcome::Flow(ControlFlow::ReEnterLoop)));
        assert_eq!(frame.line, 3); // landed directly on the else body's first line
    }

    #[test]
    fn return_stores_result_and_terminates() {
        let src = "#return 5\n";
        let mut frame = make_frame(src);
        let mut root = VariableScope::new();
        let mut global = VariableScope::new();
        let mut locals = VariableScope::new();
        let mut chain = ScopeChain {
            local: &mut locals,
            root_script: &mut root,
            global: &mut global,
        };
        let outcome = dispatch("#return 5", &mut frame, &mut chain).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Flow(ControlFlow::TerminateScript)));
        assert_eq!(root.get_string("result"), "5");
    }

    #[test]
    fn throw_raises_runtime_error_with_message() {
        let src = "#throw boom\n";
        let mut frame = make_frame(src);
        let err = with_scope(&mut frame, |f, s| dispatch("#throw boom", f, s).unwrap_err());
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn repeat_zero_skips_body() {
        let src = "#repeat 0\n/a\n#end\n";
        let mut frame = make_frame(src);
        let outcome = with_scope(&mut frame, |f, s| dispatch("#repeat 0", f, s).unwrap());
        assert!(matches!(outcome, DispatchOutcome::Flow(ControlFlow::ReEnterLoop)));
        assert_eq!(frame.line, 3);
    }

    #[test]
    fn arithmetic_command_noop_on_missing_variable() {
        let src = "#add missing 1\n";
        let mut frame = make_frame(src);
        let outcome = with_scope(&mut frame, |f, s| dispatch("#add missing 1", f, s).unwrap());
        assert!(matches!(outcome, DispatchOutcome::Flow(ControlFlow::NextLine)));
    }

    #[test]
    fn call_captures_body_and_returns_call_request() {
        let src = "#call foo\n/a\n/b\n#end\n";
        let mut frame = make_frame(src);
        let outcome = with_scope(&mut frame, |f, s| dispatch("#call foo", f, s).unwrap());
        match outcome {
            DispatchOutcome::Call(req) => {
                assert_eq!(req.target, "foo");
                assert_eq!(req.body_lines, vec!["/a".to_string(), "/b".to_string()]);
            }
            _ => panic!("expected a call request"),
        }
    }
}
