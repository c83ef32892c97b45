//! C1: variable scope containers and the local → root-script → global lookup
//! chain.

use indexmap::IndexMap;

use crate::value::Value;

/// One mapping from name to cell. Used for each of the global, root-script,
/// and local tiers.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    vars: IndexMap<String, Value>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.vars.get_mut(name)
    }

    /// Setting a name to the literal value `null` or an empty string removes
    /// it rather than storing it.
    pub fn set(&mut self, name: &str, raw: &str) {
        if raw.is_empty() || raw == "null" {
            self.vars.shift_remove(name);
        } else {
            self.vars.insert(name.to_string(), Value::set(raw));
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.vars.shift_remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Reading a missing name yields the literal `null`.
    pub fn get_string(&self, name: &str) -> String {
        self.vars
            .get(name)
            .map(Value::to_display_string)
            .unwrap_or_else(|| "null".to_string())
    }
}

/// Which tier a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTarget {
    Local,
    RootScript,
    Global,
}

/// The three-tier lookup chain shared by a frame: its own local scope, the
/// root-script scope it belongs to, and the interpreter-lifetime global scope.
/// Lookup order for reads is local → root-script → global.
pub struct ScopeChain<'a> {
    pub local: &'a mut VariableScope,
    pub root_script: &'a mut VariableScope,
    pub global: &'a mut VariableScope,
}

impl<'a> ScopeChain<'a> {
    pub fn get_string(&self, name: &str) -> String {
        if self.local.exists(name) {
            self.local.get_string(name)
        } else if self.root_script.exists(name) {
            self.root_script.get_string(name)
        } else if self.global.exists(name) {
            self.global.get_string(name)
        } else {
            "null".to_string()
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.local.exists(name) || self.root_script.exists(name) || self.global.exists(name)
    }

    pub fn set(&mut self, target: ScopeTarget, name: &str, raw: &str) {
        match target {
            ScopeTarget::Local => self.local.set(name, raw),
            ScopeTarget::RootScript => self.root_script.set(name, raw),
            ScopeTarget::Global => self.global.set(name, raw),
        }
    }

    /// `#rem` — remove a name from all three scopes.
    pub fn remove_everywhere(&mut self, name: &str) {
        self.local.remove(name);
        self.root_script.remove(name);
        self.global.remove(name);
    }

    /// `#clr` — clear all three scopes.
    pub fn clear_all(&mut self) {
        self.local.clear();
        self.root_script.clear();
        self.global.clear();
    }

    /// Looks up the scope in which `name` already lives (for in-place
    /// arithmetic ops that must mutate the cell where it was found), falling
    /// back to `None` when absent from all three tiers.
    pub fn resolve_owning_mut(&mut self, name: &str) -> Option<&mut Value> {
        if self.local.exists(name) {
            self.local.get_mut(name)
        } else if self.root_script.exists(name) {
            self.root_script.get_mut(name)
        } else if self.global.exists(name) {
            self.global.get_mut(name)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_null_or_empty_removes() {
        let mut s = VariableScope::new();
        s.set("x", "1");
        assert!(s.exists("x"));
        s.set("x", "null");
        assert!(!s.exists("x"));
        s.set("y", "1");
        s.set("y", "");
        assert!(!s.exists("y"));
    }

    #[test]
    fn missing_read_yields_null() {
        let s = VariableScope::new();
        assert_eq!(s.get_string("missing"), "null");
    }

    #[test]
    fn scope_chain_shadows_local_over_global() {
        let mut local = VariableScope::new();
        let mut root = VariableScope::new();
        let mut global = VariableScope::new();
        global.set("k", "b");
        local.set("k", "a");
        let chain = ScopeChain {
            local: &mut local,
            root_script: &mut root,
            global: &mut global,
        };
        assert_eq!(chain.get_string("k"), "a");
    }

    #[test]
    fn scope_shadowing_scenario_from_spec() {
        let mut local = VariableScope::new();
        let mut root = VariableScope::new();
        let mut global = VariableScope::new();
        {
            let mut chain = ScopeChain {
                local: &mut local,
                root_script: &mut root,
                global: &mut global,
            };
            chain.set(ScopeTarget::Local, "k", "a");
            chain.set(ScopeTarget::Global, "k", "b");
            assert_eq!(chain.get_string("k"), "a");
            chain.local.remove("k");
            assert_eq!(chain.get_string("k"), "b");
        }
    }
}
