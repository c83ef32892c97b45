//! C10: input binding — key/modifier → command string, with "waiting for
//! bind" and "waiting for rebind" modes, and a default app-keyed binding set.

use bitflags::bitflags;

bitflags! {
    /// Mirrors the source's `std::bitset<MaxBindFlags>`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierFlags: u8 {
        const CTRL = 0b001;
        const SHIFT = 0b010;
        const ALT = 0b100;
    }
}

/// The kind of input event a host message decodes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Down(String),
    Up(String),
    Scroll,
    HScroll,
    GainedFocus,
    LostFocus,
    Resized,
}

/// One registered hotkey: key/value/modifiers identify it; equality is over
/// exactly those three fields (the execution string is not part of identity,
/// so rebinding in place updates it without duplicating the entry).
#[derive(Debug, Clone)]
pub struct Binding {
    pub key_name: String,
    pub value_name: String,
    pub modifiers: ModifierFlags,
    pub execution_string: String,
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.key_name == other.key_name
            && self.value_name == other.value_name
            && self.modifiers == other.modifiers
    }
}

/// What the binding table is currently waiting for, if anything.
#[derive(Debug, Clone, PartialEq)]
enum WaitState {
    None,
    NewBinding { pending_execution: String },
    Rebind { index: usize, pending_execution: String },
}

/// The table of registered hotkeys plus its bind/rebind wait-state machine.
pub struct BindingTable {
    bindings: Vec<Binding>,
    wait: WaitState,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            wait: WaitState::None,
        }
    }
}

/// A value is a "non-modifier" key eligible to be bound, i.e. not itself one
/// of the modifier keys (Ctrl/Shift/Alt) and not Escape (which cancels a
/// pending bind instead).
fn is_bindable_value(value: &str) -> bool {
    !matches!(value, "Ctrl" | "Shift" | "Alt" | "Escape")
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shipped default binding set, keyed by host application name (only
    /// `path_of_exile` ships defaults; unrecognized apps start with none).
    pub fn with_defaults_for(app: &str) -> Self {
        let mut table = Self::new();
        for (key, modifiers, exec) in default_bindings(app) {
            table.bindings.push(Binding {
                key_name: key.to_string(),
                value_name: key.to_string(),
                modifiers,
                execution_string: exec.to_string(),
            });
        }
        table
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Enters "waiting for new binding" mode; the next valid key-down
    /// registers a fresh binding to `execution_string`.
    pub fn wait_for_new_binding(&mut self, execution_string: impl Into<String>) {
        self.wait = WaitState::NewBinding {
            pending_execution: execution_string.into(),
        };
    }

    /// Enters "waiting for rebind" mode for the binding at `index`; the next
    /// valid key-down replaces its key/value/modifiers (and execution string,
    /// if the caller wants to change it too).
    pub fn wait_for_rebind(&mut self, index: usize, execution_string: impl Into<String>) {
        self.wait = WaitState::Rebind {
            index,
            pending_execution: execution_string.into(),
        };
    }

    pub fn is_waiting(&self) -> bool {
        self.wait != WaitState::None
    }

    /// `RestoreMissingBindings`: re-adds any default entry not already
    /// present (matched by key/value/modifiers), without overwriting a
    /// user-changed execution string on an existing entry.
    pub fn restore_missing_bindings(&mut self, app: &str) {
        for (key, modifiers, exec) in default_bindings(app) {
            let candidate = Binding {
                key_name: key.to_string(),
                value_name: key.to_string(),
                modifiers,
                execution_string: exec.to_string(),
            };
            if !self.bindings.iter().any(|b| *b == candidate) {
                self.bindings.push(candidate);
            }
        }
    }

    /// Decodes a host key/mouse message into `(kind, modifiers)`. Modifier-key
    /// transitions and the Alt-key idiosyncrasy (some OSes fire a synthetic
    /// `SYSKEYDOWN`/`SYSKEYUP` for Alt combinations) are the host's concern to
    /// normalize before calling in; this accepts the already-normalized
    /// `(EventKind, ModifierFlags)` pair directly rather than raw
    /// `wParam`/`lParam`, leaving OS key-code translation entirely to the
    /// host.
    pub fn process_hotkey(
        &mut self,
        event: &EventKind,
        modifiers: ModifierFlags,
    ) -> HotkeyOutcome {
        match &self.wait {
            WaitState::NewBinding { pending_execution } => {
                let pending_execution = pending_execution.clone();
                match event {
                    EventKind::Down(value) if value == "Escape" => {
                        self.wait = WaitState::None;
                        HotkeyOutcome::BindCancelled
                    }
                    EventKind::Down(value) if is_bindable_value(value) => {
                        self.wait = WaitState::None;
                        self.bindings.push(Binding {
                            key_name: value.clone(),
                            value_name: value.clone(),
                            modifiers,
                            execution_string: pending_execution,
                        });
                        HotkeyOutcome::BindRegistered
                    }
                    _ => HotkeyOutcome::Ignored,
                }
            }
            WaitState::Rebind { index, pending_execution } => {
                let (index, pending_execution) = (*index, pending_execution.clone());
                match event {
                    EventKind::Down(value) if value == "Escape" => {
                        self.wait = WaitState::None;
                        HotkeyOutcome::BindCancelled
                    }
                    EventKind::Down(value) if is_bindable_value(value) => {
                        self.wait = WaitState::None;
                        if let Some(b) = self.bindings.get_mut(index) {
                            b.key_name = value.clone();
                            b.value_name = value.clone();
                            b.modifiers = modifiers;
                            b.execution_string = pending_execution;
                        }
                        HotkeyOutcome::BindRegistered
                    }
                    _ => HotkeyOutcome::Ignored,
                }
            }
            WaitState::None => match event {
                EventKind::Down(value) => {
                    match self
                        .bindings
                        .iter()
                        .find(|b| b.value_name == *value && b.modifiers == modifiers)
                    {
                        Some(b) => HotkeyOutcome::Run(b.execution_string.clone()),
                        None => HotkeyOutcome::Fallback {
                            kind: "Down".to_string(),
                            value: value.clone(),
                        },
                    }
                }
                EventKind::Up(value) => HotkeyOutcome::Fallback {
                    kind: "Up".to_string(),
                    value: value.clone(),
                },
                EventKind::Scroll => HotkeyOutcome::Fallback {
                    kind: "Scroll".to_string(),
                    value: String::new(),
                },
                EventKind::HScroll => HotkeyOutcome::Fallback {
                    kind: "HScroll".to_string(),
                    value: String::new(),
                },
                EventKind::GainedFocus | EventKind::LostFocus | EventKind::Resized => {
                    HotkeyOutcome::Ignored
                }
            },
        }
    }
}

/// What [`BindingTable::process_hotkey`] decided should happen next; the
/// caller (C11) is responsible for actually invoking `ProcessScript` on a
/// `Run`/`Fallback` execution string.
#[derive(Debug, Clone, PartialEq)]
pub enum HotkeyOutcome {
    /// A matching binding fired; run this execution string.
    Run(String),
    /// No binding matched; if a `hotkey` script exists in the cache, invoke
    /// `/hotkey <kind> <value>`.
    Fallback { kind: String, value: String },
    /// A pending bind/rebind was registered.
    BindRegistered,
    /// A pending bind/rebind was cancelled via Escape.
    BindCancelled,
    /// The event requires no action (focus/resize, or an unbindable key seen
    /// while not waiting).
    Ignored,
}

fn default_bindings(app: &str) -> Vec<(&'static str, ModifierFlags, &'static str)> {
    match app {
        "path_of_exile" => vec![
            ("F5", ModifierFlags::empty(), "/reloadui"),
            ("F9", ModifierFlags::empty(), "/hideout"),
            ("F10", ModifierFlags::CTRL, "/ss"),
        ],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_fire_scenario_from_spec() {
        let mut table = BindingTable::new();
        table.wait_for_new_binding("/say hi");
        let outcome = table.process_hotkey(&EventKind::Down("F2".to_string()), ModifierFlags::empty());
        assert_eq!(outcome, HotkeyOutcome::BindRegistered);
        assert!(!table.is_waiting());

        let outcome = table.process_hotkey(&EventKind::Down("F2".to_string()), ModifierFlags::empty());
        assert_eq!(outcome, HotkeyOutcome::Run("/say hi".to_string()));
    }

    #[test]
    fn escape_cancels_pending_bind() {
        let mut table = BindingTable::new();
        table.wait_for_new_binding("/say hi");
        let outcome = table.process_hotkey(&EventKind::Down("Escape".to_string()), ModifierFlags::empty());
        assert_eq!(outcome, HotkeyOutcome::BindCancelled);
        assert!(!table.is_waiting());
        assert!(table.bindings().is_empty());
    }

    #[test]
    fn unmatched_key_falls_back_with_kind_and_value() {
        let mut table = BindingTable::new();
        let outcome = table.process_hotkey(&EventKind::Down("F7".to_string()), ModifierFlags::empty());
        assert_eq!(
            outcome,
            HotkeyOutcome::Fallback {
                kind: "Down".to_string(),
                value: "F7".to_string()
            }
        );
    }

    #[test]
    fn rebind_replaces_existing_entry_in_place() {
        let mut table = BindingTable::new();
        table.wait_for_new_binding("/say hi");
        table.process_hotkey(&EventKind::Down("F2".to_string()), ModifierFlags::empty());
        table.wait_for_rebind(0, "/say bye");
        table.process_hotkey(&EventKind::Down("F3".to_string()), ModifierFlags::empty());
        assert_eq!(table.bindings().len(), 1);
        assert_eq!(table.bindings()[0].value_name, "F3");
        assert_eq!(table.bindings()[0].execution_string, "/say bye");
    }

    #[test]
    fn restore_missing_bindings_does_not_overwrite_user_changes() {
        let mut table = BindingTable::with_defaults_for("path_of_exile");
        table.bindings.iter_mut().find(|b| b.value_name == "F5").unwrap().execution_string =
            "/customreload".to_string();
        table.bindings.retain(|b| b.value_name != "F9");
        table.restore_missing_bindings("path_of_exile");
        let f5 = table.bindings().iter().find(|b| b.value_name == "F5").unwrap();
        assert_eq!(f5.execution_string, "/customreload");
        assert!(table.bindings().iter().any(|b| b.value_name == "F9"));
    }

    #[test]
    fn modifier_flags_distinguish_bindings_on_same_key() {
        let mut table = BindingTable::new();
        table.wait_for_new_binding("/plain");
        table.process_hotkey(&EventKind::Down("A".to_string()), ModifierFlags::empty());
        table.wait_for_new_binding("/withctrl");
        table.process_hotkey(&EventKind::Down("A".to_string()), ModifierFlags::CTRL);

        assert_eq!(
            table.process_hotkey(&EventKind::Down("A".to_string()), ModifierFlags::empty()),
            HotkeyOutcome::Run("/plain".to_string())
        );
        assert_eq!(
            table.process_hotkey(&EventKind::Down("A".to_string()), ModifierFlags::CTRL),
            HotkeyOutcome::Run("/withctrl".to_string())
        );
    }
}
