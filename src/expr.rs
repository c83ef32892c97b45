//! C5: the condition/expression evaluator.
//!
//! The original evaluates conditions by repeatedly rewriting the string (find
//! a balanced paren pair, recursively evaluate its interior, splice the
//! truthiness result back in as a scalar, then re-split by `||`/`&&`). That
//! shape is quadratic on pathological input; per the design notes this port
//! preserves every semantic rule but builds a small recursive-descent parser
//! producing an explicit AST instead.

use crate::error::ExpressionError;
use crate::tokenize::find_bracket_pair;

const OPERATORS: &[&str] = &["!=", "==", ">=", "<=", ">", "<", "startswith", "endswith", "in"];

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare { left: String, op: String, right: String },
    /// An atom with no recognized operator: true iff non-empty and not one
    /// of the falsy literals.
    Truthy(String),
}

/// Evaluates a resolved condition string (all `$`-substitutions already
/// applied) to a boolean.
pub fn evaluate(condition: &str) -> Result<bool, ExpressionError> {
    Ok(eval_ast(&parse(condition)?))
}

fn eval_ast(expr: &Expr) -> bool {
    match expr {
        Expr::Not(inner) => !eval_ast(inner),
        Expr::And(a, b) => eval_ast(a) && eval_ast(b),
        Expr::Or(a, b) => eval_ast(a) || eval_ast(b),
        Expr::Compare { left, op, right } => compare(left, op, right),
        Expr::Truthy(s) => is_truthy(s),
    }
}

fn is_truthy(s: &str) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty() && trimmed != "null" && trimmed != "0" && trimmed != "false"
}

fn unwrap_quotes(s: &str) -> String {
    let mut cur = s.trim().to_string();
    loop {
        let bytes = cur.as_bytes();
        if bytes.len() >= 2
            && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
                || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
        {
            cur = cur[1..cur.len() - 1].to_string();
        } else {
            break;
        }
    }
    cur
}

fn is_number(s: &str) -> bool {
    s.parse::<f64>().is_ok()
}

fn compare(left: &str, op: &str, right: &str) -> bool {
    let (l, r) = (unwrap_quotes(left), unwrap_quotes(right));
    if is_number(&l) && is_number(&r) {
        let (lf, rf) = (l.parse::<f64>().unwrap(), r.parse::<f64>().unwrap());
        return match op {
            "==" => lf == rf,
            "!=" => lf != rf,
            ">" => lf > rf,
            "<" => lf < rf,
            ">=" => lf >= rf,
            "<=" => lf <= rf,
            "in" => r.contains(&l),
            "startswith" => l.starts_with(&r),
            "endswith" => l.ends_with(&r),
            _ => false,
        };
    }
    match op {
        "==" => l == r,
        "!=" => l != r,
        ">" => l > r,
        "<" => l < r,
        ">=" => l >= r,
        "<=" => l <= r,
        "in" => l.contains(&r),
        "startswith" => l.starts_with(&r),
        "endswith" => l.ends_with(&r),
        _ => false,
    }
}

/// Top-level parse entry point: finds the first balanced paren pair (if any),
/// recursively evaluates its interior, substitutes the truthiness result
/// (`1` or `null`) back in honoring a leading `!`, and re-evaluates the
/// resulting scalar form. Otherwise splits directly by `||`/`&&`.
fn parse(condition: &str) -> Result<Expr, ExpressionError> {
    if let Some((open, close)) = find_paren(condition)? {
        let prefix_trimmed = condition[..open].trim_end();
        let negated = prefix_trimmed.ends_with('!');
        let inner = &condition[open + 1..close];
        let inner_result = evaluate(inner)?;
        let truth = if inner_result { "1" } else { "null" };

        let prefix = if negated {
            &prefix_trimmed[..prefix_trimmed.len() - 1]
        } else {
            &condition[..open]
        };
        let rewritten = format!("{}{}{}", prefix, truth, &condition[close + 1..]);
        return parse(&rewritten);
    }
    parse_or(condition)
}

fn find_paren(condition: &str) -> Result<Option<(usize, usize)>, ExpressionError> {
    if let Some(idx) = condition.find('(') {
        match find_bracket_pair(condition, '(', ')', idx) {
            Some(pair) => Ok(Some(pair)),
            None => Err(ExpressionError::new(condition, "unbalanced parentheses")),
        }
    } else {
        Ok(None)
    }
}

fn parse_or(condition: &str) -> Result<Expr, ExpressionError> {
    let parts = split_top_level(condition, " || ");
    let mut iter = parts.into_iter();
    let first = iter.next().unwrap_or_default();
    let mut expr = parse_and(&first)?;
    for part in iter {
        expr = Expr::Or(Box::new(expr), Box::new(parse_and(&part)?));
    }
    Ok(expr)
}

fn parse_and(condition: &str) -> Result<Expr, ExpressionError> {
    let parts = split_top_level(condition, " && ");
    let mut iter = parts.into_iter();
    let first = iter.next().unwrap_or_default();
    let mut expr = parse_atom(&first)?;
    for part in iter {
        expr = Expr::And(Box::new(expr), Box::new(parse_atom(&part)?));
    }
    Ok(expr)
}

/// Splits on a literal separator, but never inside a quoted span.
fn split_top_level(s: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = s;
    loop {
        match find_unquoted(rest, sep) {
            Some(idx) => {
                pieces.push(rest[..idx].to_string());
                rest = &rest[idx + sep.len()..];
            }
            None => {
                pieces.push(rest.to_string());
                break;
            }
        }
    }
    pieces
}

fn find_unquoted(s: &str, sep: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    let sep_chars: Vec<char> = sep.chars().collect();
    let mut in_quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match in_quote {
            Some(q) if c == q => in_quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => in_quote = Some(c),
            None => {}
        }
        if in_quote.is_none() && i + sep_chars.len() <= chars.len() && chars[i..i + sep_chars.len()] == sep_chars[..] {
            let byte_idx = chars[..i].iter().collect::<String>().len();
            return Some(byte_idx);
        }
        i += 1;
    }
    None
}

fn parse_atom(raw: &str) -> Result<Expr, ExpressionError> {
    let trimmed = raw.trim();
    let (negated, body) = if let Some(stripped) = trimmed.strip_prefix('!') {
        (true, stripped.trim())
    } else {
        (false, trimmed)
    };

    let mut best: Option<(usize, &str)> = None;
    for op in OPERATORS {
        if let Some(idx) = find_op(body, op) {
            if best.map(|(b, _)| idx < b).unwrap_or(true) {
                best = Some((idx, op));
            }
        }
    }

    let atom = match best {
        Some((idx, op)) => {
            let left = body[..idx].trim().to_string();
            let right = body[idx + op.len()..].trim().to_string();
            Expr::Compare {
                left,
                op: op.to_string(),
                right,
            }
        }
        None => Expr::Truthy(body.to_string()),
    };

    Ok(if negated { Expr::Not(Box::new(atom)) } else { atom })
}

/// Finds `op` outside any quoted span, preferring word-boundary matches for
/// alphabetic operators (`in`, `startswith`, `endswith`).
fn find_op(body: &str, op: &str) -> Option<usize> {
    let is_word_op = op.chars().next().map(|c| c.is_alphabetic()).unwrap_or(false);
    let chars: Vec<char> = body.chars().collect();
    let op_chars: Vec<char> = op.chars().collect();
    let mut in_quote: Option<char> = None;
    let mut i = 0;
    while i + op_chars.len() <= chars.len() {
        let c = chars[i];
        match in_quote {
            Some(q) if c == q => in_quote = None,
            Some(_) => {
                i += 1;
                continue;
            }
            None if c == '"' || c == '\'' => {
                in_quote = Some(c);
                i += 1;
                continue;
            }
            None => {}
        }
        if chars[i..i + op_chars.len()] == op_chars[..] {
            let left_ok = !is_word_op || i == 0 || chars[i - 1].is_whitespace();
            let right_idx = i + op_chars.len();
            let right_ok = !is_word_op || right_idx == chars.len() || chars[right_idx].is_whitespace();
            if left_ok && right_ok {
                let byte_idx = chars[..i].iter().collect::<String>().len();
                return Some(byte_idx);
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_excludes_falsy_literals() {
        assert!(!is_truthy("null"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
        assert!(is_truthy("1"));
        assert!(is_truthy("hello"));
    }

    #[test]
    fn numeric_comparison() {
        assert!(evaluate("3 > 2").unwrap());
        assert!(!evaluate("3 < 2").unwrap());
        assert!(evaluate("3.5 >= 3.5").unwrap());
    }

    #[test]
    fn string_comparison_when_not_numeric() {
        assert!(evaluate("abc == abc").unwrap());
        assert!(evaluate("'a,b' == 'a,b'").unwrap());
    }

    #[test]
    fn string_operators() {
        assert!(evaluate("hello in hello_world").unwrap());
        assert!(evaluate("hello startswith hel").unwrap());
        assert!(evaluate("hello endswith llo").unwrap());
    }

    #[test]
    fn negation() {
        assert!(evaluate("!(1 == 2)").unwrap());
        assert!(!evaluate("!(1 == 1)").unwrap());
    }

    #[test]
    fn and_or_precedence_and_commutativity() {
        assert_eq!(evaluate("1 && 0 || 1").unwrap(), evaluate("1 || 1 && 0").unwrap());
        assert!(evaluate("(1 == 1) && (2 == 2)").unwrap());
        assert_eq!(
            evaluate("(1 == 1) || (2 == 3)").unwrap(),
            evaluate("(2 == 3) || (1 == 1)").unwrap()
        );
    }

    #[test]
    fn parens_wrap_without_changing_truth_value() {
        assert_eq!(evaluate("1 == 1").unwrap(), evaluate("(1 == 1)").unwrap());
    }

    #[test]
    fn unbalanced_parens_is_expression_error() {
        assert!(evaluate("(1 == 1").is_err());
    }
}
