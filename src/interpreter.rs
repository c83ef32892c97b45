//! C11: the integration surface — `HandleMessage`, `Update`, `Paste`,
//! `SaveLast`, `ProcessHotkey` — plus the last-command memo and the per-tick
//! `first_launch`/`launch`/`loop` lifecycle hooks. This is the single public
//! entry point bridging host chat/input/tick events to the rest of the
//! engine, the way the host crate's `Bash::exec` bridges a line of shell text
//! to its own parser/interpreter.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::binding::{BindingTable, EventKind, HotkeyOutcome, ModifierFlags};
use crate::cache::ParseCache;
use crate::config::Config;
use crate::host::{ChatSink, ExternalScriptExecutor, FileProbe, FilePicker};
use crate::scheduler::{drain_stack, new_root_frame, DrainOutcome, ScriptRunner, Stack, StackSet, TeleportVerbs};
use crate::scope::VariableScope;

/// Classification of a raw chat line, mirroring `IsScript`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// Run through `ProcessScript` as a verbatim one-off body.
    Script,
    /// Forward unchanged to the host's chat sink.
    Chat,
}

/// `cheats_enabled` gate plus `/.NAME`-prefixed passthrough are evaluated
/// ahead of `IsScript`; this struct is purely a classification helper with no
/// interpreter state, kept free-standing so it is unit-testable without a
/// whole `Interpreter`.
struct ScriptClassifier {
    warp_verbs: Vec<String>,
}

impl ScriptClassifier {
    /// `IsScript(line)`: the line contains a `$`-variable prefix, has a repeat
    /// suffix greater than 1, contains multiple comma-separated pieces with at
    /// least one `/`-prefixed piece, or begins with a recognized "warp" verb.
    fn is_script(&self, line: &str) -> bool {
        if line.contains('$') {
            return true;
        }
        if let Some(idx) = line.rfind(" x") {
            if let Ok(n) = line[idx + 2..].trim().parse::<u32>() {
                if n > 1 {
                    return true;
                }
            }
        }
        let pieces = crate::tokenize::split_commands(line);
        if pieces.len() > 1 && pieces.iter().any(|p| p.trim_start().starts_with('/')) {
            return true;
        }
        self.warp_verbs.iter().any(|verb| line.starts_with(verb.as_str()))
    }

    fn classify(&self, line: &str) -> LineKind {
        if self.is_script(line) {
            LineKind::Script
        } else {
            LineKind::Chat
        }
    }
}

/// Which lifecycle scripts have already fired for this interpreter instance.
#[derive(Debug, Default)]
struct LifecycleState {
    first_launch_done: bool,
    launch_done: bool,
    last_loop_tick_ms: u64,
}

/// The facade an embedding host talks to: owns the parse cache, the
/// script-stack set, the global variable scope, the binding table, and
/// lifecycle/last-command memo state.
pub struct Interpreter {
    config: Config,
    probe: Arc<dyn FileProbe>,
    cache: Arc<ParseCache>,
    stacks: StackSet,
    global: VariableScope,
    bindings: BindingTable,
    classifier: ScriptClassifier,
    lifecycle: LifecycleState,
    last_command: Option<String>,
    teleport_verbs: TeleportVerbs,
}

/// Default host-tick rate for the `loop` script, per §4.10.
pub const DEFAULT_LOOP_HZ: u32 = 60;

impl Interpreter {
    pub fn new(config: Config, probe: Arc<dyn FileProbe>, warp_verbs: Vec<String>, teleport_verbs: Vec<String>) -> Self {
        Self {
            config,
            cache: Arc::new(ParseCache::new(probe.clone())),
            probe,
            stacks: StackSet::default(),
            global: VariableScope::new(),
            bindings: BindingTable::new(),
            classifier: ScriptClassifier { warp_verbs },
            lifecycle: LifecycleState::default(),
            last_command: None,
            teleport_verbs: TeleportVerbs(teleport_verbs),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn global_scope(&self) -> &VariableScope {
        &self.global
    }

    pub fn bindings_mut(&mut self) -> &mut BindingTable {
        &mut self.bindings
    }

    /// Populates the parse cache from the configured search paths. Callers
    /// that want a bounded startup wait should use
    /// [`ParseCache::wait_for_cache_loaded`] directly via [`Self::cache`].
    pub async fn reload_cache(&self) {
        self.cache.reload_cache(&self.config.additional_search_paths).await;
    }

    pub fn cache(&self) -> &Arc<ParseCache> {
        &self.cache
    }

    /// `HandleMessage(line)`: classifies and routes a raw chat/command line.
    /// Returns `None` if the interpreter fully handled the line, or
    /// `Some(line)` if it should be forwarded to the host's own chat
    /// subsystem unchanged (e.g. on to the game server).
    pub async fn handle_message(
        &mut self,
        line: &str,
        chat: &dyn ChatSink,
        file_picker: &dyn FilePicker,
        call_executor: Option<&dyn ExternalScriptExecutor>,
    ) -> Option<String> {
        if !self.config.cheats_enabled {
            if line.trim() == "/enablecheats" {
                self.config.cheats_enabled = true;
                chat.print_msg("Cheats enabled.").await;
                return None;
            }
            return Some(line.to_string());
        }

        if line == "/ss" || line == "/stopscripts" {
            self.stacks.stop_all();
            return None;
        }

        if let Some(body) = line.strip_prefix("/paste ") {
            self.paste(body, chat, file_picker, call_executor).await;
            return None;
        }

        if let Some(name) = line.strip_prefix("/savelast ") {
            if let Err(err) = self.save_last(name.trim()).await {
                warn!(name = name.trim(), error = %err, "savelast failed");
            }
            return None;
        }

        if let Some(rest) = line.strip_prefix("/.") {
            self.last_command = Some(format!("/.{rest}"));
            return Some(line.to_string());
        }

        if let Some(rest) = line.strip_prefix('/') {
            if let Some(stripped) = rest.trim_end().strip_suffix('?') {
                let name = stripped.split_whitespace().next().unwrap_or(stripped);
                let script_name = format!("{name}.cheat");
                if self.cache.contains(&script_name).await {
                    chat.print_msg(&format!("Opening {script_name} for edit.")).await;
                    return None;
                }
            }
        }

        match self.classifier.classify(line) {
            LineKind::Script => {
                self.last_command = Some(line.to_string());
                let (name, args) = split_invocation(line);
                if self.cache.contains(&format!("{name}.cheat")).await {
                    self.process_file(&format!("{name}.cheat"), args, chat, file_picker, call_executor)
                        .await;
                } else {
                    self.process_script(line, vec![], chat, file_picker, call_executor).await;
                }
                None
            }
            LineKind::Chat => Some(line.to_string()),
        }
    }

    /// `/paste <body>` — treats `body` as a verbatim script, pushed as a new
    /// root-script stack.
    pub async fn paste(
        &mut self,
        body: &str,
        chat: &dyn ChatSink,
        file_picker: &dyn FilePicker,
        call_executor: Option<&dyn ExternalScriptExecutor>,
    ) {
        self.process_script(body, vec![], chat, file_picker, call_executor).await;
    }

    /// Runs `source` as a one-off script: parses it (rejecting on structural
    /// error, matching the parse-cache's own validation), pushes a new root
    /// frame, and drains its stack to completion (or until the next tick
    /// picks up a remaining pause/yield — callers invoking this outside of
    /// `update` run it to completion immediately).
    async fn process_script(
        &mut self,
        source: &str,
        parameters: Vec<String>,
        chat: &dyn ChatSink,
        file_picker: &dyn FilePicker,
        call_executor: Option<&dyn ExternalScriptExecutor>,
    ) {
        let file = match crate::parsed_file::ParsedFile::from_source("<script>", source) {
            Ok(f) => Arc::new(f),
            Err(err) => {
                chat.print_msg(&format!("Script parse error: {err}")).await;
                return;
            }
        };
        let idx = self.stacks.push_new(new_root_frame(file, parameters));
        self.drain_one_stack(idx, chat, file_picker, call_executor).await;
        self.stacks.prune_empty();
    }

    /// `ProcessFile(name, args)` — looks the cached script up by name and
    /// invokes it, passing `args` as its parameter vector.
    pub async fn process_file(
        &mut self,
        name: &str,
        args: Vec<String>,
        chat: &dyn ChatSink,
        file_picker: &dyn FilePicker,
        call_executor: Option<&dyn ExternalScriptExecutor>,
    ) {
        match self.cache.get(name).await {
            Some(file) => {
                let idx = self.stacks.push_new(new_root_frame(file, args));
                self.drain_one_stack(idx, chat, file_picker, call_executor).await;
                self.stacks.prune_empty();
            }
            None => {
                chat.print_msg(&format!("No such script: {name}")).await;
            }
        }
    }

    /// Drains `stacks[idx]` once. A one-off invocation (outside `update`) has
    /// no future tick driving it further, so a `Yielded` outcome (a duration
    /// pause, a teleport event pause, or a reentrancy lock) simply leaves the
    /// stack in place for the next `update` call to resume.
    async fn drain_one_stack(
        &mut self,
        idx: usize,
        chat: &dyn ChatSink,
        file_picker: &dyn FilePicker,
        call_executor: Option<&dyn ExternalScriptExecutor>,
    ) {
        let stack = &mut self.stacks.stacks[idx];
        let runner = InterpreterScriptRunner {
            chat,
            file_picker,
            call_executor,
            teleport_verbs: &self.teleport_verbs,
        };
        drain_stack(
            stack,
            &mut self.global,
            chat,
            file_picker,
            call_executor,
            &self.teleport_verbs,
            Some(&runner),
        )
        .await;
    }

    /// `Update(frame_duration_ms)` — the host's cooperative per-frame tick.
    /// On the very first call, runs `first_launch` then `launch` if they
    /// exist; thereafter, invokes `loop` at the configured rate if it exists.
    /// Drains every live stack once.
    pub async fn update(
        &mut self,
        frame_duration_ms: u64,
        chat: &dyn ChatSink,
        file_picker: &dyn FilePicker,
        call_executor: Option<&dyn ExternalScriptExecutor>,
    ) {
        if !self.lifecycle.first_launch_done {
            self.lifecycle.first_launch_done = true;
            self.invoke_lifecycle_script("first_launch.cheat", chat, file_picker, call_executor).await;
        }
        if !self.lifecycle.launch_done {
            self.lifecycle.launch_done = true;
            self.invoke_lifecycle_script("launch.cheat", chat, file_picker, call_executor).await;
        }

        let loop_period_ms = 1000 / DEFAULT_LOOP_HZ as u64;
        self.lifecycle.last_loop_tick_ms += frame_duration_ms;
        if self.lifecycle.last_loop_tick_ms >= loop_period_ms {
            self.lifecycle.last_loop_tick_ms = 0;
            self.invoke_lifecycle_script("loop.cheat", chat, file_picker, call_executor).await;
        }

        for stack in &mut self.stacks.stacks {
            if let Some(top) = stack.top_mut() {
                top.pause.tick(frame_duration_ms);
            }
        }

        let n = self.stacks.stacks.len();
        for idx in 0..n {
            if idx >= self.stacks.stacks.len() {
                break;
            }
            loop {
                let stack = &mut self.stacks.stacks[idx];
                if stack.is_empty() {
                    break;
                }
                let runner = InterpreterScriptRunner {
                    chat,
                    file_picker,
                    call_executor,
                    teleport_verbs: &self.teleport_verbs,
                };
                let outcome = drain_stack(
                    stack,
                    &mut self.global,
                    chat,
                    file_picker,
                    call_executor,
                    &self.teleport_verbs,
                    Some(&runner),
                )
                .await;
                if outcome == DrainOutcome::Finished || outcome == DrainOutcome::Yielded {
                    break;
                }
            }
        }
        self.stacks.prune_empty();
    }

    async fn invoke_lifecycle_script(
        &mut self,
        name: &str,
        chat: &dyn ChatSink,
        file_picker: &dyn FilePicker,
        call_executor: Option<&dyn ExternalScriptExecutor>,
    ) {
        if self.cache.contains(name).await {
            info!(name, "invoking lifecycle script");
            self.process_file(name, vec![], chat, file_picker, call_executor).await;
        }
    }

    /// `SaveLast(name)` — writes the last-executed line verbatim to
    /// `<save-last-dir>/<name>.cheat`.
    pub async fn save_last(&self, name: &str) -> anyhow::Result<()> {
        let Some(last) = &self.last_command else {
            return Err(anyhow::anyhow!("no last command to save"));
        };
        let path = format!("{}{}.cheat", self.config.save_last_directory, name);
        self.probe.write_to_string(&path, last).await
    }

    /// `ProcessHotkey(msg, wParam, lParam)`. The host is responsible for
    /// decoding the raw platform message into `(event, modifiers)`; this
    /// crate owns only the binding-table state machine and script dispatch
    /// that follows.
    pub async fn process_hotkey(
        &mut self,
        event: &EventKind,
        modifiers: ModifierFlags,
        chat: &dyn ChatSink,
        file_picker: &dyn FilePicker,
        call_executor: Option<&dyn ExternalScriptExecutor>,
    ) {
        match self.bindings.process_hotkey(event, modifiers) {
            HotkeyOutcome::Run(execution_string) => {
                self.process_script(&execution_string, vec![], chat, file_picker, call_executor).await;
            }
            HotkeyOutcome::Fallback { kind, value } => {
                if self.cache.contains("hotkey.cheat").await {
                    let line = format!("/hotkey {kind} {value}");
                    self.process_script(&line, vec![], chat, file_picker, call_executor).await;
                }
            }
            HotkeyOutcome::BindRegistered | HotkeyOutcome::BindCancelled | HotkeyOutcome::Ignored => {}
        }
    }
}

/// Wires `$result[BLOCK]` sub-script execution back through the interpreter's
/// parse cache and host collaborators, satisfying [`ScriptRunner`] without
/// giving the scheduler module a dependency on this one.
struct InterpreterScriptRunner<'a> {
    chat: &'a dyn ChatSink,
    file_picker: &'a dyn FilePicker,
    call_executor: Option<&'a dyn ExternalScriptExecutor>,
    teleport_verbs: &'a TeleportVerbs,
}

#[async_trait]
impl<'a> ScriptRunner for InterpreterScriptRunner<'a> {
    async fn run_result_block(
        &self,
        block: &str,
        root_scope: &mut VariableScope,
        global: &mut VariableScope,
    ) -> String {
        root_scope.set("result", "null");
        let file = match crate::parsed_file::ParsedFile::from_source("<result>", block) {
            Ok(f) => Arc::new(f),
            Err(_) => return String::new(),
        };
        let mut stack = Stack {
            frames: vec![new_root_frame(file, vec![])],
            root_scope: std::mem::take(root_scope),
        };
        loop {
            let outcome = drain_stack(
                &mut stack,
                global,
                self.chat,
                self.file_picker,
                self.call_executor,
                self.teleport_verbs,
                Some(self),
            )
            .await;
            if outcome == DrainOutcome::Finished {
                break;
            }
        }
        let value = stack.root_scope.get_string("result");
        *root_scope = stack.root_scope;
        value
    }
}

/// Splits `/name arg1 arg2` into `(name, [arg1, arg2])`; a bare `/name` yields
/// no arguments.
fn split_invocation(line: &str) -> (String, Vec<String>) {
    let rest = line.strip_prefix('/').unwrap_or(line);
    match rest.split_once(' ') {
        Some((name, args)) => (name.to_string(), crate::tokenize::split_commands(args.trim())),
        None => (rest.to_string(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{InMemoryFileProbe, RecordingChatSink};

    struct NoPicker;
    #[async_trait]
    impl FilePicker for NoPicker {}

    fn make_interpreter(probe: Arc<InMemoryFileProbe>) -> Interpreter {
        Interpreter::new(Config::default(), probe, vec!["/warp".to_string()], vec!["/warp".to_string()])
    }

    #[tokio::test]
    async fn chat_line_passes_through_unhandled() {
        let probe = Arc::new(InMemoryFileProbe::new());
        let mut interp = make_interpreter(probe);
        let chat = RecordingChatSink::new();
        let picker = NoPicker;
        let result = interp.handle_message("hello world", &chat, &picker, None).await;
        assert_eq!(result, Some("hello world".to_string()));
    }

    #[tokio::test]
    async fn dotted_prefix_line_is_chat_not_script() {
        let probe = Arc::new(InMemoryFileProbe::new());
        let mut interp = make_interpreter(probe);
        let chat = RecordingChatSink::new();
        let picker = NoPicker;
        let result = interp.handle_message("/.ping", &chat, &picker, None).await;
        assert_eq!(result, Some("/.ping".to_string()));
        assert_eq!(interp.last_command.as_deref(), Some("/.ping"));
    }

    #[tokio::test]
    async fn stopscripts_clears_all_stacks() {
        let probe = Arc::new(InMemoryFileProbe::new());
        probe.insert("demo.cheat", "#repeat 1000000\n/ping\n#end\n", 1);
        let mut interp = make_interpreter(probe);
        let chat = RecordingChatSink::new();
        let picker = NoPicker;
        interp.stacks.push_new(new_root_frame(
            Arc::new(crate::parsed_file::ParsedFile::from_source("x", "/a\n").unwrap()),
            vec![],
        ));
        assert_eq!(interp.stacks.stacks.len(), 1);
        let result = interp.handle_message("/ss", &chat, &picker, None).await;
        assert_eq!(result, None);
        assert!(interp.stacks.stacks.is_empty());
    }

    #[tokio::test]
    async fn disabled_cheats_only_honor_enablecheats() {
        let probe = Arc::new(InMemoryFileProbe::new());
        let mut interp = make_interpreter(probe);
        interp.config.cheats_enabled = false;
        let chat = RecordingChatSink::new();
        let picker = NoPicker;
        let result = interp.handle_message("/ss", &chat, &picker, None).await;
        assert_eq!(result, Some("/ss".to_string()));
        let result = interp.handle_message("/enablecheats", &chat, &picker, None).await;
        assert_eq!(result, None);
        assert!(interp.config.cheats_enabled);
    }

    #[tokio::test]
    async fn paste_runs_verbatim_script() {
        let probe = Arc::new(InMemoryFileProbe::new());
        let mut interp = make_interpreter(probe);
        let chat = RecordingChatSink::new();
        let picker = NoPicker;
        interp.paste("/say pasted", &chat, &picker, None).await;
        assert_eq!(chat.sent_lines(), vec!["/say pasted".to_string()]);
    }

    #[tokio::test]
    async fn cached_script_invoked_by_name_with_args() {
        let probe = Arc::new(InMemoryFileProbe::new());
        probe.insert("demo.cheat", "/first $args[0]\n", 1);
        let mut interp = make_interpreter(probe);
        interp.reload_cache().await;
        let chat = RecordingChatSink::new();
        let picker = NoPicker;
        let result = interp.handle_message("/demo a b c", &chat, &picker, None).await;
        assert_eq!(result, None);
        assert_eq!(chat.sent_lines(), vec!["/first a".to_string()]);
    }

    #[tokio::test]
    async fn save_last_then_replay_scenario_from_spec() {
        let probe = Arc::new(InMemoryFileProbe::new());
        let mut interp = make_interpreter(probe.clone());
        let chat = RecordingChatSink::new();
        let picker = NoPicker;

        interp.handle_message("/.ping", &chat, &picker, None).await;
        interp.save_last("mytest").await.unwrap();
        let saved = probe.read_to_string("cheats/saved/mytest.cheat").await.unwrap();
        assert_eq!(saved, "/.ping");

        probe.insert("mytest.cheat", "/.ping", 1);
        interp.reload_cache().await;
        let result = interp.handle_message("/mytest", &chat, &picker, None).await;
        assert_eq!(result, None);
        assert_eq!(chat.sent_lines(), vec!["/.ping".to_string()]);
    }

    #[tokio::test]
    async fn hotkey_bind_then_fire_runs_script() {
        let probe = Arc::new(InMemoryFileProbe::new());
        let mut interp = make_interpreter(probe);
        let chat = RecordingChatSink::new();
        let picker = NoPicker;

        interp.bindings_mut().wait_for_new_binding("/say hi");
        interp
            .process_hotkey(&EventKind::Down("F2".to_string()), ModifierFlags::empty(), &chat, &picker, None)
            .await;
        interp
            .process_hotkey(&EventKind::Down("F2".to_string()), ModifierFlags::empty(), &chat, &picker, None)
            .await;
        assert_eq!(chat.sent_lines(), vec!["/say hi".to_string()]);
    }

    #[test]
    fn is_script_classifies_per_spec_rules() {
        let classifier = ScriptClassifier {
            warp_verbs: vec!["/warp".to_string()],
        };
        assert!(classifier.is_script("/say $mem[x]"));
        assert!(classifier.is_script("/ping x3"));
        assert!(!classifier.is_script("/ping x1"));
        assert!(classifier.is_script("/a, /b"));
        assert!(!classifier.is_script("/a, no slash here"));
        assert!(classifier.is_script("/warp town"));
        assert!(!classifier.is_script("plain chat line"));
    }
}
