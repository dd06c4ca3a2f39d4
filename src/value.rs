//! Tagged value representation and coercion

use std::rc::Rc;

use crate::bcode::CodeRef;
use crate::parse::{parse_float, parse_float_end, parse_int, parse_int_end};

/// A dynamically typed script value.
///
/// `Str` and `Code` own their payload through shared handles; moving a
/// value out with [`Value::take`] leaves `Null` behind. `Ident` is a
/// non-owning index into the identifier table.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Code(CodeRef),
    Ident(usize),
}

/// Render an integer the way the language prints it.
pub fn int_to_str(v: i64) -> String {
    v.to_string()
}

/// Render a float: one decimal place when integral, otherwise seven
/// significant digits.
pub fn float_to_str(v: f64) -> String {
    if v == v.trunc() && v.is_finite() && v.abs() < 1e16 {
        return format!("{v:.1}");
    }
    if !v.is_finite() {
        return format!("{v}");
    }
    // seven significant digits, fixed or scientific as magnitude asks
    let exp = v.abs().log10().floor() as i32;
    if (-5..7).contains(&exp) {
        let decimals = (6 - exp).max(0) as usize;
        let mut s = format!("{v:.decimals$}");
        while s.contains('.') && s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    } else {
        let mut s = format!("{v:.6e}");
        if let Some(epos) = s.find('e') {
            let (mant, exp) = s.split_at(epos);
            let mut mant = mant.to_owned();
            while mant.contains('.') && mant.ends_with('0') {
                mant.pop();
            }
            if mant.ends_with('.') {
                mant.pop();
            }
            s = format!("{mant}{exp}");
        }
        s
    }
}

fn str_to_bool(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let (iv, end) = parse_int_end(s);
    if end == s.len() {
        return iv != 0;
    }
    let (fv, end) = parse_float_end(s);
    if end == s.len() {
        return fv != 0.0;
    }
    true
}

impl Value {
    /// Non-destructive integer view.
    pub fn get_int(&self) -> i64 {
        match self {
            Value::Int(v) => *v,
            Value::Float(v) => *v as i64,
            Value::Str(s) => parse_int(s),
            _ => 0,
        }
    }

    /// Non-destructive float view.
    pub fn get_float(&self) -> f64 {
        match self {
            Value::Float(v) => *v,
            Value::Int(v) => *v as f64,
            Value::Str(s) => parse_float(s),
            _ => 0.0,
        }
    }

    /// Non-destructive string view; non-printable kinds render empty.
    pub fn get_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Int(v) => int_to_str(*v),
            Value::Float(v) => float_to_str(*v),
            _ => String::new(),
        }
    }

    /// Boolean interpretation: null is false, numbers compare against
    /// zero, strings parse as numbers when they fully lex as one and
    /// otherwise count nonempty as true.
    pub fn get_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => str_to_bool(s),
            _ => false,
        }
    }

    /// Code payload, if this value is code.
    pub fn get_code(&self) -> Option<&CodeRef> {
        match self {
            Value::Code(c) => Some(c),
            _ => None,
        }
    }

    /// Ident index, if this value is an ident reference.
    pub fn get_ident(&self) -> Option<usize> {
        match self {
            Value::Ident(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrowed string payload, if this value already is a string.
    pub fn str_ref(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Copy the plain-data view of this value: strings and numbers
    /// carry over, code and ident references collapse to null.
    pub fn get_val(&self) -> Value {
        match self {
            Value::Str(s) => Value::Str(s.clone()),
            Value::Int(v) => Value::Int(*v),
            Value::Float(v) => Value::Float(*v),
            _ => Value::Null,
        }
    }

    /// Destructive conversion to integer; afterwards the tag is `Int`.
    pub fn force_int(&mut self) -> i64 {
        let v = self.get_int();
        *self = Value::Int(v);
        v
    }

    /// Destructive conversion to float; afterwards the tag is `Float`.
    pub fn force_float(&mut self) -> f64 {
        let v = self.get_float();
        *self = Value::Float(v);
        v
    }

    /// Destructive conversion to string; afterwards the tag is `Str`.
    pub fn force_str(&mut self) -> &str {
        if !matches!(self, Value::Str(_)) {
            *self = Value::Str(Rc::from(self.get_str()));
        }
        match self {
            Value::Str(s) => s,
            _ => unreachable!(),
        }
    }

    /// Destructive conversion to null.
    pub fn force_null(&mut self) {
        *self = Value::Null;
    }

    /// Move the value out, leaving `Null`.
    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub const fn is_code(&self) -> bool {
        matches!(self, Value::Code(_))
    }

    pub const fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercions() {
        assert_eq!(Value::Str(Rc::from("12")).get_int(), 12);
        assert_eq!(Value::Int(3).get_float(), 3.0);
        assert_eq!(Value::Float(4.0).get_str(), "4.0");
        assert_eq!(Value::Float(1.5).get_str(), "1.5");
        assert_eq!(Value::Null.get_str(), "");
    }

    #[test]
    fn force_changes_tag() {
        let mut v = Value::Str(Rc::from("7"));
        assert_eq!(v.force_int(), 7);
        assert!(matches!(v, Value::Int(7)));

        let mut v = Value::Int(2);
        assert_eq!(v.force_str(), "2");
        assert!(v.is_str());
    }

    #[test]
    fn bools() {
        assert!(!Value::Null.get_bool());
        assert!(!Value::Str(Rc::from("0")).get_bool());
        assert!(!Value::Str(Rc::from("0.0")).get_bool());
        assert!(Value::Str(Rc::from("0.1")).get_bool());
        assert!(Value::Str(Rc::from("yes")).get_bool());
        assert!(!Value::Str(Rc::from("")).get_bool());
        assert!(Value::Int(-1).get_bool());
    }

    #[test]
    fn float_formatting() {
        assert_eq!(float_to_str(4.0), "4.0");
        assert_eq!(float_to_str(-0.0), "-0.0");
        assert_eq!(float_to_str(0.5), "0.5");
        assert_eq!(float_to_str(3.25), "3.25");
        assert_eq!(float_to_str(1234567.5), "1234568");
    }

    #[test]
    fn take_leaves_null() {
        let mut v = Value::Str(Rc::from("x"));
        let moved = v.take();
        assert!(moved.is_str());
        assert!(v.is_null());
    }
}
