use std::rc::Rc;

use quickcheck_macros::quickcheck;

use cubescript::prelude::*;
use cubescript::value::{float_to_str, int_to_str};

#[quickcheck]
fn int_string_round_trip(v: i64) -> bool {
    parse_int(&int_to_str(v)) == v
}

#[quickcheck]
fn float_string_round_trip(v: i32) -> bool {
    // integral floats render exactly and parse back exactly
    let f = f64::from(v);
    parse_float(&float_to_str(f)) == f
}

#[quickcheck]
fn intern_pointer_equality(a: String, b: String) -> bool {
    let mut pool = StringPool::new();
    let ha = pool.intern(&a);
    let hb = pool.intern(&b);
    Rc::ptr_eq(&ha, &hb) == (a == b)
}

#[quickcheck]
fn addition_matches_host(a: i32, b: i32) -> bool {
    let mut cs = CsState::new();
    cs.run(&format!("+ {a} {b}")).unwrap().get_int() == i64::from(a) + i64::from(b)
}

#[quickcheck]
fn compiled_and_source_agree(a: i16, b: i16) -> bool {
    let src = format!("* {a} {b}");
    let mut cs = CsState::new();
    let direct = cs.run(&src).unwrap().get_int();
    let code = cs.compile(&src).unwrap();
    let via_code = cs.run_code(&code).unwrap().get_int();
    direct == via_code && direct == i64::from(a) * i64::from(b)
}

#[quickcheck]
fn push_restores_previous_binding(v1: u32, v2: u32) -> bool {
    let mut cs = CsState::new();
    cs.run(&format!("alias a {v1}")).unwrap();
    let inner = cs.run(&format!("push a {v2} [result $a]")).unwrap();
    inner.get_int() == i64::from(v2)
        && cs.get_alias_val("a").as_deref() == Some(int_to_str(i64::from(v1)).as_str())
}

#[quickcheck]
fn bool_of_numeric_strings(v: i64) -> bool {
    let s = Value::Str(Rc::from(int_to_str(v)));
    s.get_bool() == (v != 0)
}

#[test]
fn code_ref_clone_is_transparent() {
    let mut cs = CsState::new();
    let code = cs.compile("+ 40 2").unwrap();
    let clone = code.clone();
    drop(clone);
    assert_eq!(cs.run_code(&code).unwrap().get_int(), 42);
    assert_eq!(cs.run_code(&code).unwrap().get_int(), 42);
}

#[test]
fn alias_value_survives_failed_call() {
    let mut cs = CsState::new();
    cs.run("alias keeper safe").unwrap();
    cs.run("alias bad [push keeper clobbered [error die]]").unwrap();
    assert!(cs.run("bad").is_err());
    assert_eq!(cs.get_alias_val("keeper").as_deref(), Some("safe"));
}
