//! C1: the variable cell — a tagged union over string / integer / float with
//! typed arithmetic, matching the classification and promotion rules of the
//! original `ScriptVariable`.

use crate::error::RuntimeError;

/// A scalar cell. Strings only support concatenation via `add`; every other
/// arithmetic op on a string cell is a [`RuntimeError`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
}

/// Classification of a raw operand string, mirroring `IsInteger`/`IsNumber`:
/// a full-string float parse that succeeds and contains no `.` is an integer;
/// one that contains a `.` is a float; anything else is a plain string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Int,
    Float,
    String,
}

fn classify(raw: &str) -> Class {
    if raw.parse::<f64>().is_ok() {
        if raw.contains('.') {
            Class::Float
        } else {
            Class::Int
        }
    } else {
        Class::String
    }
}

impl Value {
    /// Re-classifies `raw` from scratch, always overwriting the cell's type.
    pub fn set(raw: &str) -> Self {
        match classify(raw) {
            Class::Int => Value::Int(raw.parse().expect("classify guarantees int parse")),
            Class::Float => Value::Float(raw.parse().expect("classify guarantees float parse")),
            Class::String => Value::String(raw.to_string()),
        }
    }

    /// Canonical, locale-independent rendering.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
        }
    }

    fn upgrade_to_float(&mut self) {
        if let Value::Int(i) = *self {
            *self = Value::Float(i as f64);
        }
    }

    pub fn add(&mut self, raw: &str) -> Result<(), RuntimeError> {
        match self {
            Value::String(s) => {
                s.push_str(raw);
                Ok(())
            }
            _ => match classify(raw) {
                Class::Int => {
                    let n: i64 = raw.parse().expect("classify guarantees int parse");
                    match self {
                        Value::Int(i) => *i += n,
                        Value::Float(f) => *f += n as f64,
                        Value::String(_) => unreachable!(),
                    }
                    Ok(())
                }
                Class::Float => {
                    self.upgrade_to_float();
                    let n: f64 = raw.parse().expect("classify guarantees float parse");
                    if let Value::Float(f) = self {
                        *f += n;
                    }
                    Ok(())
                }
                Class::String => {
                    // Non-numeric operand against a non-string cell: the cell
                    // becomes a string (matches the original's fallback).
                    let joined = format!("{}{}", self.to_display_string(), raw);
                    *self = Value::set(&joined);
                    Ok(())
                }
            },
        }
    }

    fn numeric_op(
        &mut self,
        raw: &str,
        op_name: &str,
        int_op: impl Fn(i64, i64) -> i64,
        float_op: impl Fn(f64, f64) -> f64,
    ) -> Result<(), RuntimeError> {
        if matches!(self, Value::String(_)) {
            return Err(RuntimeError::new(format!(
                "strings cannot be {op_name}"
            )));
        }
        match classify(raw) {
            Class::Int => {
                let n: i64 = raw.parse().expect("classify guarantees int parse");
                match self {
                    Value::Int(i) => *i = int_op(*i, n),
                    Value::Float(f) => *f = float_op(*f, n as f64),
                    Value::String(_) => unreachable!(),
                }
                Ok(())
            }
            Class::Float => {
                self.upgrade_to_float();
                let n: f64 = raw.parse().expect("classify guarantees float parse");
                if let Value::Float(f) = self {
                    *f = float_op(*f, n);
                }
                Ok(())
            }
            Class::String => Ok(()),
        }
    }

    pub fn subtract(&mut self, raw: &str) -> Result<(), RuntimeError> {
        self.numeric_op(raw, "subtracted", |a, b| a - b, |a, b| a - b)
    }

    pub fn multiply(&mut self, raw: &str) -> Result<(), RuntimeError> {
        self.numeric_op(raw, "multiplied", |a, b| a * b, |a, b| a * b)
    }

    pub fn divide(&mut self, raw: &str) -> Result<(), RuntimeError> {
        if matches!(self, Value::String(_)) {
            return Err(RuntimeError::new("strings cannot be divided"));
        }
        match classify(raw) {
            Class::Int => {
                let divisor: i64 = raw.parse().expect("classify guarantees int parse");
                if divisor == 0 {
                    return Err(RuntimeError::new("can't divide by zero"));
                }
                match self {
                    Value::Int(i) => *i /= divisor,
                    Value::Float(f) => *f /= divisor as f64,
                    Value::String(_) => unreachable!(),
                }
                Ok(())
            }
            Class::Float => {
                let divisor: f64 = raw.parse().expect("classify guarantees float parse");
                if divisor == 0.0 {
                    return Err(RuntimeError::new("can't divide by zero"));
                }
                self.upgrade_to_float();
                if let Value::Float(f) = self {
                    *f /= divisor;
                }
                Ok(())
            }
            Class::String => Ok(()),
        }
    }

    pub fn sqrt(&mut self) -> Result<(), RuntimeError> {
        match self {
            Value::String(_) => Err(RuntimeError::new("strings cannot be square-rooted")),
            Value::Int(i) => {
                *i = (*i as f64).sqrt() as i64;
                Ok(())
            }
            Value::Float(f) => {
                *f = f.sqrt();
                Ok(())
            }
        }
    }

    pub fn abs(&mut self) -> Result<(), RuntimeError> {
        match self {
            Value::String(_) => Err(RuntimeError::new("strings cannot be numerically manipulated")),
            Value::Int(i) => {
                *i = i.abs();
                Ok(())
            }
            Value::Float(f) => {
                *f = f.abs();
                Ok(())
            }
        }
    }

    /// Truncation toward zero, not mathematical floor — matches the
    /// original's `(int)f` cast exactly, including for negative floats.
    pub fn floor(&mut self) -> Result<(), RuntimeError> {
        match self {
            Value::String(_) => Err(RuntimeError::new("strings cannot be rounded")),
            Value::Int(_) => Ok(()),
            Value::Float(f) => {
                *self = Value::Int(*f as i64);
                Ok(())
            }
        }
    }

    /// `trunc(f) + 1`, not true ceiling — preserved quirk from the original.
    pub fn ceil(&mut self) -> Result<(), RuntimeError> {
        match self {
            Value::String(_) => Err(RuntimeError::new("strings cannot be rounded")),
            Value::Int(_) => Ok(()),
            Value::Float(f) => {
                *self = Value::Int(*f as i64 + 1);
                Ok(())
            }
        }
    }

    pub fn round(&mut self) -> Result<(), RuntimeError> {
        match self {
            Value::String(_) => Err(RuntimeError::new("strings cannot be rounded")),
            Value::Int(_) => Ok(()),
            Value::Float(f) => {
                let frac = *f - (*f as i64) as f64;
                if frac >= 0.5 {
                    self.ceil()
                } else {
                    self.floor()
                }
            }
        }
    }

    pub fn min(&mut self, raw: &str) -> Result<(), RuntimeError> {
        self.numeric_op(raw, "min'd", |a, b| a.min(b), |a, b| a.min(b))
    }

    pub fn max(&mut self, raw: &str) -> Result<(), RuntimeError> {
        self.numeric_op(raw, "max'd", |a, b| a.max(b), |a, b| a.max(b))
    }

    /// `min(lo)` then `max(hi)`, applied in that order — matches the
    /// original exactly, rather than symmetrizing the bounds.
    pub fn clamp(&mut self, lo: &str, hi: &str) -> Result<(), RuntimeError> {
        self.min(lo)?;
        self.max(hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_into_int_float_string() {
        assert_eq!(Value::set("42"), Value::Int(42));
        assert_eq!(Value::set("3.5"), Value::Float(3.5));
        assert_eq!(Value::set("hello"), Value::String("hello".into()));
    }

    #[test]
    fn add_concatenates_strings() {
        let mut v = Value::String("foo".into());
        v.add("bar").unwrap();
        assert_eq!(v, Value::String("foobar".into()));
    }

    #[test]
    fn add_promotes_int_to_float() {
        let mut v = Value::Int(1);
        v.add("0.5").unwrap();
        assert_eq!(v, Value::Float(1.5));
    }

    #[test]
    fn add_non_numeric_against_int_becomes_string() {
        let mut v = Value::Int(5);
        v.add("x").unwrap();
        assert_eq!(v, Value::String("5x".into()));
    }

    #[test]
    fn subtract_string_errors() {
        let mut v = Value::String("a".into());
        assert!(v.subtract("1").is_err());
    }

    #[test]
    fn divide_by_zero_is_recoverable_and_leaves_cell_untouched() {
        let mut v = Value::Int(10);
        let err = v.divide("0").unwrap_err();
        assert_eq!(err.message, "can't divide by zero");
        assert_eq!(v, Value::Int(10));
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        let mut v = Value::Int(-7);
        v.divide("2").unwrap();
        assert_eq!(v, Value::Int(-3));
    }

    #[test]
    fn floor_truncates_not_mathematical_floor() {
        let mut v = Value::Float(-1.5);
        v.floor().unwrap();
        assert_eq!(v, Value::Int(-1));
    }

    #[test]
    fn ceil_is_trunc_plus_one() {
        let mut v = Value::Float(2.0);
        v.ceil().unwrap();
        assert_eq!(v, Value::Int(3));
    }

    #[test]
    fn round_uses_quirky_ceil_floor() {
        let mut v = Value::Float(2.5);
        v.round().unwrap();
        assert_eq!(v, Value::Int(3));

        let mut v2 = Value::Float(2.4);
        v2.round().unwrap();
        assert_eq!(v2, Value::Int(2));
    }

    #[test]
    fn clamp_applies_min_then_max_in_order() {
        let mut v = Value::Int(100);
        v.clamp("0", "10").unwrap();
        assert_eq!(v, Value::Int(10));
    }

    #[test]
    fn sqrt_keeps_integer_type() {
        let mut v = Value::Int(9);
        v.sqrt().unwrap();
        assert_eq!(v, Value::Int(3));
    }

    #[test]
    fn display_string_roundtrips() {
        assert_eq!(Value::Int(7).to_display_string(), "7");
        assert_eq!(Value::String("hi".into()).to_display_string(), "hi");
    }
}
