//! C6: the variable-substitution engine — a registry of `$`-prefixed
//! recognized forms, each resolved by a pluggable callback, rewritten
//! in place until no recognized prefix remains.

use async_trait::async_trait;

use crate::tokenize::find_bracket_pair;

/// The fixed set of recognized substitution prefixes. Disabling `Args` and
/// `ArgsCount` defers `$args`/`$args.count` to the callee's frame while a
/// `#call` body is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    ArgsCount,
    ArgsIndex,
    Args,
    Mem,
    Result,
    Browse,
    None,
}

impl Prefix {
    fn literal(self) -> &'static str {
        match self {
            Prefix::ArgsCount => "$args.count",
            Prefix::ArgsIndex => "$args[",
            Prefix::Args => "$args",
            Prefix::Mem => "$mem[",
            Prefix::Result => "$result[",
            Prefix::Browse => "$browse[",
            Prefix::None => "$none",
        }
    }

    /// Order matters: `$args.count` / `$args[` must be checked before the
    /// bare `$args` literal so the longer form wins at the same position.
    fn all() -> &'static [Prefix] {
        &[
            Prefix::ArgsCount,
            Prefix::ArgsIndex,
            Prefix::Args,
            Prefix::Mem,
            Prefix::Result,
            Prefix::Browse,
            Prefix::None,
        ]
    }
}

/// Collaborator the substitution engine calls back into for frame/scope
/// state and host-owned effects ($browse, $result's sub-script execution).
/// Implemented by the scheduler so this module stays free of a dependency on
/// [`crate::scheduler`].
#[async_trait]
pub trait SubstitutionHost {
    fn parameters(&self) -> &[String];

    /// `$mem[NAME]`: root-script scope first, then global; `null` if absent
    /// from both.
    fn mem_lookup(&self, name: &str) -> String;

    /// Runs `block` (after its own nested substitution) as a sub-script
    /// sharing the current stack's root scope, returning whatever `result`
    /// holds in that scope afterward (cleared before running).
    async fn run_result_block(&mut self, block: &str) -> String;

    async fn browse(&self, options: &[String]) -> Option<String>;
}

/// A no-op host for contexts with no parameters/scope wired up (unit tests,
/// or substitution of lines that are known not to need it).
pub struct NullHost;

#[async_trait]
impl SubstitutionHost for NullHost {
    fn parameters(&self) -> &[String] {
        &[]
    }

    fn mem_lookup(&self, _name: &str) -> String {
        "null".to_string()
    }

    async fn run_result_block(&mut self, _block: &str) -> String {
        String::new()
    }

    async fn browse(&self, _options: &[String]) -> Option<String> {
        None
    }
}

fn args_slice(args: &[String], spec: &str) -> String {
    if spec.is_empty() {
        return args.join(" ");
    }
    if let Some((start, end)) = spec.split_once(':') {
        // Inclusive end index, per `$args[1:3]` meaning indices 1..=3.
        let start: usize = start.trim().parse().unwrap_or(0);
        let end: usize = end.trim().parse().unwrap_or_else(|_| args.len().saturating_sub(1));
        let end_exclusive = (end + 1).min(args.len());
        if start >= end_exclusive {
            return String::new();
        }
        return args[start..end_exclusive].join(" ");
    }
    spec.trim()
        .parse::<usize>()
        .ok()
        .and_then(|i| args.get(i))
        .cloned()
        .unwrap_or_default()
}

/// Finds the earliest position of any enabled, recognized prefix at or after
/// `start`. Returns `(position, prefix, bracket_end)` where `bracket_end` is
/// `None` for the bracket-less forms (`$args`, `$args.count`, `$none`).
fn find_next_prefix(line: &str, start: usize, disabled: &[Prefix]) -> Option<(usize, Prefix, Option<usize>)> {
    let mut best: Option<(usize, Prefix, Option<usize>)> = None;
    for &prefix in Prefix::all() {
        if disabled.contains(&prefix) {
            continue;
        }
        let lit = prefix.literal();
        let Some(rel) = line[start..].find(lit) else {
            continue;
        };
        let pos = start + rel;
        let bracket_end = if lit.ends_with('[') {
            match find_bracket_pair(line, '[', ']', pos) {
                Some((_, end)) => Some(end),
                None => continue, // malformed bracket: callback would fail, try next prefix
            }
        } else {
            None
        };
        if best.map(|(b, ..)| pos < b).unwrap_or(true) {
            best = Some((pos, prefix, bracket_end));
        }
    }
    best
}

/// Rewrites `line` until no recognized, enabled prefix remains. After a
/// successful rewrite at index `i`, rescanning resumes at the *same* index
/// `i` (the replacement text may itself begin with a new recognized prefix)
/// rather than restarting the whole-line scan; only a callback miss advances
/// past the occurrence.
pub async fn substitute(line: &str, host: &mut dyn SubstitutionHost, disabled: &[Prefix]) -> String {
    let mut current = line.to_string();
    let mut cursor = 0usize;
    loop {
        let Some((pos, prefix, bracket_end)) = find_next_prefix(&current, cursor, disabled) else {
            break;
        };
        match apply(&current, pos, prefix, bracket_end, host).await {
            Some((replacement, consumed_end)) => {
                current = format!("{}{}{}", &current[..pos], replacement, &current[consumed_end..]);
                cursor = pos;
            }
            None => {
                cursor = pos + prefix.literal().len();
            }
        }
    }
    current
}

async fn apply(
    line: &str,
    pos: usize,
    prefix: Prefix,
    bracket_end: Option<usize>,
    host: &mut dyn SubstitutionHost,
) -> Option<(String, usize)> {
    match prefix {
        Prefix::ArgsCount => Some((host.parameters().len().to_string(), pos + "$args.count".len())),
        Prefix::ArgsIndex => {
            let end = bracket_end?;
            let spec = &line[pos + "$args[".len()..end];
            Some((args_slice(host.parameters(), spec), end + 1))
        }
        Prefix::Args => {
            // Guard against also matching the longer `$args[`/`$args.count`
            // forms here; those are handled by their own prefixes first.
            Some((host.parameters().join(" "), pos + "$args".len()))
        }
        Prefix::Mem => {
            let end = bracket_end?;
            let name = &line[pos + "$mem[".len()..end];
            Some((host.mem_lookup(name), end + 1))
        }
        Prefix::Result => {
            let end = bracket_end?;
            let block = &line[pos + "$result[".len()..end];
            let value = host.run_result_block(block).await;
            Some((value, end + 1))
        }
        Prefix::Browse => {
            let end = bracket_end?;
            let opts: Vec<String> = line[pos + "$browse[".len()..end]
                .split('|')
                .map(|s| s.to_string())
                .collect();
            let chosen = host.browse(&opts).await.unwrap_or_default();
            Some((chosen, end + 1))
        }
        Prefix::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestHost {
        params: Vec<String>,
    }

    #[async_trait]
    impl SubstitutionHost for TestHost {
        fn parameters(&self) -> &[String] {
            &self.params
        }

        fn mem_lookup(&self, name: &str) -> String {
            if name == "x" {
                "42".to_string()
            } else {
                "null".to_string()
            }
        }

        async fn run_result_block(&mut self, _block: &str) -> String {
            "ran".to_string()
        }

        async fn browse(&self, _options: &[String]) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn args_join_with_spaces() {
        let mut host = TestHost {
            params: vec!["a".into(), "b".into(), "c".into()],
        };
        let out = substitute("/all $args", &mut host, &[]).await;
        assert_eq!(out, "/all a b c");
    }

    #[tokio::test]
    async fn args_count() {
        let mut host = TestHost {
            params: vec!["a".into(), "b".into()],
        };
        let out = substitute("/n $args.count", &mut host, &[]).await;
        assert_eq!(out, "/n 2");
    }

    #[tokio::test]
    async fn mem_lookup_resolves_or_null() {
        let mut host = TestHost { params: vec![] };
        assert_eq!(substitute("$mem[x]", &mut host, &[]).await, "42");
        assert_eq!(substitute("$mem[y]", &mut host, &[]).await, "null");
    }

    #[tokio::test]
    async fn disable_list_skips_args_forms() {
        let mut host = TestHost {
            params: vec!["a".into()],
        };
        let out = substitute("$args", &mut host, &[Prefix::Args, Prefix::ArgsCount]).await;
        assert_eq!(out, "$args");
    }

    #[tokio::test]
    async fn args_index_and_slice_match_spec_scenario() {
        let mut host = TestHost {
            params: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        };
        assert_eq!(substitute("$args[0]", &mut host, &[]).await, "a");
        assert_eq!(substitute("$args[1:3]", &mut host, &[]).await, "b c d");
        assert_eq!(substitute("$args", &mut host, &[]).await, "a b c d");
        assert_eq!(substitute("$args.count", &mut host, &[]).await, "4");
    }

    #[tokio::test]
    async fn result_block_substitutes_in_place() {
        let mut host = TestHost { params: vec![] };
        let out = substitute("v=$result[/foo]", &mut host, &[]).await;
        assert_eq!(out, "v=ran");
    }

    #[tokio::test]
    async fn rescans_same_index_after_rewrite() {
        // mem[x] -> "42", which contains no further prefix, so this mainly
        // exercises that the loop terminates and doesn't re-match consumed
        // text.
        let mut host = TestHost { params: vec![] };
        let out = substitute("$mem[x]$mem[x]", &mut host, &[]).await;
        assert_eq!(out, "4242");
    }
}
