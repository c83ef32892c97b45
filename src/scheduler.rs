//! C8: the script-stack scheduler — drains the active stack's top frame
//! line-by-line each tick, honoring yield points, repeat/nesting control
//! flow, and exception unwinding via the abort path.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::dispatch::{dispatch, DispatchOutcome};
use crate::error::ScriptError;
use crate::frame::{Frame, PauseReason};
use crate::host::{CallEnvelope, ChatSink, ExternalScriptExecutor, FilePicker};
use crate::parsed_file::{CommandTag, ParsedFile};
use crate::scope::{ScopeChain, VariableScope};
use crate::substitution::{self, Prefix, SubstitutionHost};
use crate::tokenize::split_commands;

/// A LIFO of nested frames produced by `#call`/file invocations.
pub struct Stack {
    pub frames: Vec<Frame>,
    pub root_scope: VariableScope,
}

impl Stack {
    pub fn new(root: Frame) -> Self {
        Self {
            frames: vec![root],
            root_scope: VariableScope::new(),
        }
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Owns every stack the scheduler knows about; exactly one may be "active"
/// during a tick's inner drain loop. An empty stack is pruned at tick end.
#[derive(Default)]
pub struct StackSet {
    pub stacks: Vec<Stack>,
}

impl StackSet {
    pub fn push_new(&mut self, root: Frame) -> usize {
        self.stacks.push(Stack::new(root));
        self.stacks.len() - 1
    }

    pub fn prune_empty(&mut self) {
        self.stacks.retain(|s| !s.is_empty());
    }

    /// `/ss` / `/stopscripts` — drop all frames immediately.
    pub fn stop_all(&mut self) {
        self.stacks.clear();
    }
}

/// Collaborator that knows how to run a `$result[BLOCK]` sub-script sharing
/// the current stack's root scope. Implemented by [`crate::interpreter::Interpreter`]
/// (C11), which owns both the scheduler and the parse cache a full
/// implementation needs; kept out of this module so the scheduler stays free
/// of a dependency on the cache/interpreter layer.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs `block` (already variable-substituted) as a one-off script
    /// sharing `root_scope`/`global`, returning whatever `result` holds in
    /// `root_scope` afterward. Implementations must clear `result` before
    /// running, per the spec: a sub-script that never calls `#return`
    /// substitutes empty.
    async fn run_result_block(
        &self,
        block: &str,
        root_scope: &mut VariableScope,
        global: &mut VariableScope,
    ) -> String;
}

struct FrameSubstitutionHost<'a> {
    parameters: &'a [String],
    root_scope: &'a mut VariableScope,
    global: &'a mut VariableScope,
    file_picker: &'a dyn FilePicker,
    runner: Option<&'a dyn ScriptRunner>,
}

#[async_trait]
impl<'a> SubstitutionHost for FrameSubstitutionHost<'a> {
    fn parameters(&self) -> &[String] {
        self.parameters
    }

    fn mem_lookup(&self, name: &str) -> String {
        if self.root_scope.exists(name) {
            self.root_scope.get_string(name)
        } else {
            self.global.get_string(name)
        }
    }

    async fn run_result_block(&mut self, block: &str) -> String {
        match self.runner {
            Some(runner) => runner.run_result_block(block, self.root_scope, self.global).await,
            None => {
                warn!(block, "no result-block executor wired up; substituting empty");
                String::new()
            }
        }
    }

    async fn browse(&self, options: &[String]) -> Option<String> {
        self.file_picker.browse_files(options).await
    }
}

/// What happened while draining one stack this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The stack yielded control back to the scheduler (a `#call`, a
    /// teleport pause, an explicit pause, or reentrancy lock).
    Yielded,
    /// The stack ran off the end of its bottom frame / was emptied.
    Finished,
}

/// Families of chat verbs that set a host-defined "Teleport" pause after the
/// line runs (e.g. `/warp`, `/newarea`); host-supplied rather than
/// hard-coded, since which verbs trigger a loading pause is game-specific.
pub struct TeleportVerbs(pub Vec<String>);

impl TeleportVerbs {
    pub fn matches(&self, line: &str) -> bool {
        self.0.iter().any(|verb| line.starts_with(verb.as_str()))
    }
}

/// Drains the top frame of `stack` until a yield point, an exception, or the
/// stack runs dry. `global` is the interpreter-lifetime variable scope.
pub async fn drain_stack(
    stack: &mut Stack,
    global: &mut VariableScope,
    chat: &dyn ChatSink,
    file_picker: &dyn FilePicker,
    call_executor: Option<&dyn ExternalScriptExecutor>,
    teleport_verbs: &TeleportVerbs,
    script_runner: Option<&dyn ScriptRunner>,
) -> DrainOutcome {
    'reenter: loop {
        if stack.is_empty() {
            return DrainOutcome::Finished;
        }
        let frame_locked_or_paused = {
            let top = stack.top().unwrap();
            top.locked || top.pause.is_paused()
        };
        if frame_locked_or_paused {
            return DrainOutcome::Yielded;
        }

        if stack.top().unwrap().is_done() {
            let done = stack.frames.pop().unwrap();
            debug_assert!(
                done.nesting_is_balanced(),
                "frame for {} terminated with unbalanced nesting",
                done.file.name
            );
            if stack.is_empty() {
                return DrainOutcome::Finished;
            }
            continue 'reenter;
        }

        let line_text = {
            let top = stack.top().unwrap();
            top.file.lines[top.line].text.clone()
        };
        let sub_commands = split_commands(&line_text);

        loop {
            let top = stack.top().unwrap();
            if top.column >= sub_commands.len() {
                break;
            }
            let sub = sub_commands[top.column].clone();
            if sub.is_empty() {
                stack.top_mut().unwrap().column += 1;
                continue;
            }

            let params = stack.top().unwrap().parameters.clone();
            let expanded = {
                let mut host = FrameSubstitutionHost {
                    parameters: &params,
                    root_scope: &mut stack.root_scope,
                    global,
                    file_picker,
                    runner: script_runner,
                };
                let disabled: &[Prefix] = &[];
                substitution::substitute(&sub, &mut host, disabled).await
            };

            if expanded.starts_with('#') {
                let frame = stack.top_mut().unwrap();
                let mut locals = std::mem::take(&mut frame.locals);
                let outcome = {
                    let mut scope = ScopeChain {
                        local: &mut locals,
                        root_script: &mut stack.root_scope,
                        global,
                    };
                    dispatch(&expanded, stack.top_mut().unwrap(), &mut scope)
                };
                stack.top_mut().unwrap().locals = locals;

                match outcome {
                    Ok(DispatchOutcome::Flow(flow)) => match flow {
                        crate::dispatch::ControlFlow::Continue => {
                            stack.top_mut().unwrap().column += 1;
                        }
                        crate::dispatch::ControlFlow::NextLine => {
                            stack.top_mut().unwrap().advance_line();
                        }
                        crate::dispatch::ControlFlow::ReEnterLoop => continue 'reenter,
                        crate::dispatch::ControlFlow::TerminateScript => {
                            stack.frames.pop();
                            continue 'reenter;
                        }
                        crate::dispatch::ControlFlow::TerminateAllScripts => {
                            stack.frames.clear();
                            return DrainOutcome::Finished;
                        }
                    },
                    Ok(DispatchOutcome::Call(req)) => {
                        if let Some(executor) = call_executor {
                            let header = format!(
                                "[{}]",
                                req.args
                                    .iter()
                                    .map(|a| if a.trim().is_empty() {
                                        "null".to_string()
                                    } else {
                                        a.trim().to_string()
                                    })
                                    .collect::<Vec<_>>()
                                    .join(",")
                            );
                            let envelope = CallEnvelope {
                                header,
                                body: req.body_lines,
                            };
                            if let Err(err) = executor.call(&req.target, envelope).await {
                                warn!(target = %req.target, error = %err, "external #call executor failed");
                            }
                        } else {
                            warn!(target = %req.target, "#call with no external executor configured");
                        }
                        continue 'reenter;
                    }
                    Err(err) => {
                        abort_stack(stack, &err);
                        if stack.is_empty() {
                            chat.print_msg(&format!("Unhandled exception: {}", err.message())).await;
                            return DrainOutcome::Finished;
                        }
                        continue 'reenter;
                    }
                }
            } else {
                chat.send_msg(&expanded).await;
                if teleport_verbs.matches(&expanded) {
                    stack.top_mut().unwrap().pause.reason = Some(PauseReason::Event("Teleport".to_string()));
                }
                stack.top_mut().unwrap().column += 1;
            }

            // A `#call` inserted a new frame: yield.
            if stack.top().map(|f| f.pause.is_paused()).unwrap_or(false) {
                return DrainOutcome::Yielded;
            }
        }

        if stack.top().map(|f| f.column >= split_commands(&line_text).len()).unwrap_or(false) {
            if let Some(top) = stack.top_mut() {
                if top.line < top.file.lines.len() {
                    top.advance_line();
                }
            }
        }
    }
}

/// Walks the frame's nesting stack up on an exception: if the frame was
/// inside `#try`, rewind the cursor to the enclosing `#try`, advance to the
/// matching `#catch` (or `#end`), bind the catch variable in root scope to
/// the message, and resume; otherwise pop the frame and repeat.
fn abort_stack(stack: &mut Stack, err: &ScriptError) {
    loop {
        let Some(frame) = stack.frames.last_mut() else {
            return;
        };
        if frame.in_try {
            if let Some(try_line) = find_enclosing_try(frame) {
                frame.nesting.truncate(frame.nesting.iter().position(|t| *t == CommandTag::Catch).unwrap_or(0));
                let catch_line = crate::dispatch::move_to_next_tag(frame, try_line, &CommandTag::Catch);
                frame.in_try = false;
                // Landed on `#catch`: bind its variable here and resume on
                // the line after it, so the handler body runs directly
                // instead of re-dispatching `#catch` itself (whose dispatch
                // arm only fires on a clean fall-through and skips to
                // `#end`). Landed on `#end` (no `#catch` present): resume
                // there and let the ordinary `#end` handling close the block.
                let mut resume_line = catch_line;
                if let Some(catch_tag_line) = frame.file.lines.get(catch_line) {
                    if catch_tag_line.tag == CommandTag::Catch {
                        let var_name = catch_tag_line.text
                            .trim_start_matches('#')
                            .trim_start()
                            .strip_prefix("catch")
                            .unwrap_or("")
                            .trim()
                            .to_string();
                        if !var_name.is_empty() {
                            stack.root_scope.set(&var_name, &err.message());
                        }
                        resume_line = catch_line + 1;
                    }
                }
                let frame = stack.frames.last_mut().unwrap();
                frame.line = resume_line;
                debug!("exception routed to #catch");
                return;
            }
        }
        let popped = stack.frames.pop();
        warn!(message = %err.message(), file = popped.map(|f| f.file.name.clone()).unwrap_or_default(), "frame popped by unhandled exception");
    }
}

/// Walks backward from the frame's current line, popping mismatched push
/// frames from the nesting stack, to find the line index of the enclosing
/// `#try`.
fn find_enclosing_try(frame: &Frame) -> Option<usize> {
    let mut i = frame.line;
    loop {
        if frame.file.lines[i].tag == CommandTag::Try {
            return Some(i);
        }
        if i == 0 {
            return None;
        }
        i -= 1;
    }
}

/// Shared, reference-counted view of a parsed file handed to a new frame.
pub fn new_root_frame(file: Arc<ParsedFile>, parameters: Vec<String>) -> Frame {
    Frame::new(file, parameters)
}
