use std::cell::Cell;
use std::rc::Rc;

use cubescript::prelude::*;

#[test]
fn ivar_read_write() {
    let mut cs = CsState::new();
    cs.new_ivar("vol", 0, 100, 50, IdentFlags::empty(), None).unwrap();

    assert_eq!(cs.get_var_int("vol"), Some(50));
    cs.run("vol 70").unwrap();
    assert_eq!(cs.get_var_int("vol"), Some(70));

    cs.run("vol = 30").unwrap();
    assert_eq!(cs.get_var_int("vol"), Some(30));

    assert_eq!(cs.run("+ $vol 5").unwrap().get_int(), 35);
}

#[test]
fn ivar_clamp_reports_and_sets() {
    let mut cs = CsState::new();
    cs.new_ivar("vol", 0, 100, 50, IdentFlags::empty(), None).unwrap();

    let err = cs.run("vol 200").unwrap_err();
    assert!(err.message().contains("valid range"));
    // the clamped value is still installed
    assert_eq!(cs.get_var_int("vol"), Some(100));
}

#[test]
fn read_only_rejects_writes() {
    let mut cs = CsState::new();
    cs.new_ivar("ro", 0, 10, 5, IdentFlags::READ_ONLY, None).unwrap();

    let err = cs.run("ro 7").unwrap_err();
    assert!(err.message().contains("read only"));
    assert_eq!(cs.get_var_int("ro"), Some(5));

    let err = cs.reset_value("ro").unwrap_err();
    assert!(err.message().contains("read only"));
}

#[test]
fn fvar_and_svar() {
    let mut cs = CsState::new();
    cs.new_fvar("scale", 0.0, 10.0, 1.0, IdentFlags::empty(), None).unwrap();
    cs.new_svar("title", "untitled", IdentFlags::empty(), None).unwrap();

    cs.run("scale 2.5").unwrap();
    assert_eq!(cs.get_var_float("scale"), Some(2.5));

    cs.run("title hello").unwrap();
    assert_eq!(cs.get_var_str("title").as_deref(), Some("hello"));
    assert_eq!(cs.run("result $title").unwrap().get_str(), "hello");
    assert_eq!(cs.run("+f $scale 0.5").unwrap().get_float(), 3.0);
}

#[test]
fn override_snapshot_and_restore() {
    let mut cs = CsState::new();
    let idx = cs
        .new_ivar("ov", 0, 100, 10, IdentFlags::empty(), None)
        .unwrap();

    cs.set_override_mode(true);
    cs.run("ov 20").unwrap();
    assert_eq!(cs.get_var_int("ov"), Some(20));

    cs.clear_override(idx);
    assert_eq!(cs.get_var_int("ov"), Some(10));
    cs.set_override_mode(false);
}

#[test]
fn overridable_flag_snapshots_without_mode() {
    let mut cs = CsState::new();
    cs.new_svar("theme", "light", IdentFlags::OVERRIDE, None).unwrap();

    cs.run("theme dark").unwrap();
    assert_eq!(cs.get_var_str("theme").as_deref(), Some("dark"));

    cs.reset_value("theme").unwrap();
    assert_eq!(cs.get_var_str("theme").as_deref(), Some("light"));
}

#[test]
fn persistent_refuses_override() {
    let mut cs = CsState::new();
    cs.new_ivar("keep", 0, 10, 1, IdentFlags::PERSIST, None).unwrap();

    cs.set_override_mode(true);
    let err = cs.run("keep 2").unwrap_err();
    assert!(err.message().contains("persistent"));
    cs.set_override_mode(false);
}

#[test]
fn change_callback_fires() {
    let mut cs = CsState::new();
    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();
    cs.new_ivar(
        "cbv",
        0,
        10,
        0,
        IdentFlags::empty(),
        Some(Rc::new(move |_, _| h.set(h.get() + 1))),
    )
    .unwrap();

    cs.run("cbv 3").unwrap();
    cs.run("cbv 4").unwrap();
    assert_eq!(hits.get(), 2);
}

#[test]
fn custom_commands() {
    let mut cs = CsState::new();
    cs.new_command("twice", "i", |_, args, res| {
        *res = Value::Int(args[0].get_int() * 2);
        Ok(())
    })
    .unwrap();

    assert_eq!(cs.run("twice 21").unwrap().get_int(), 42);

    let idx = cs.get_ident("twice").unwrap();
    assert_eq!(
        cs.run_ident(idx, vec![Value::Int(5)]).unwrap().get_int(),
        10
    );
}

#[test]
fn command_validation() {
    let mut cs = CsState::new();
    assert!(cs.new_command("bad", "ix", |_, _, _| Ok(())).is_err());
    assert!(cs.new_command("bad2", "1V", |_, _, _| Ok(())).is_err());
    assert!(cs.new_command("ok", "si1V", |_, _, _| Ok(())).is_ok());
    // duplicate names are rejected
    assert!(cs.new_command("ok", "s", |_, _, _| Ok(())).is_err());
}

#[test]
fn builtins_cannot_be_aliased() {
    let mut cs = CsState::new();
    let err = cs.run("alias if nope").unwrap_err();
    assert!(err.message().contains("cannot redefine builtin"));
}

#[test]
fn assign_value_dispatch() {
    let mut cs = CsState::new();
    cs.new_ivar("depth", 0, 100, 1, IdentFlags::empty(), None).unwrap();

    cs.assign_value("depth", Value::Int(9)).unwrap();
    assert_eq!(cs.get_var_int("depth"), Some(9));

    cs.assign_value("fresh", Value::Int(3)).unwrap();
    assert_eq!(cs.get_alias_val("fresh").as_deref(), Some("3"));

    assert!(cs.assign_value("123", Value::Int(1)).is_err());
}

#[test]
fn call_hook_runs_and_aborts() {
    let mut cs = CsState::new();
    let count = Rc::new(Cell::new(0usize));
    let c = count.clone();
    cs.set_call_hook(Some(Rc::new(move |_: &mut CsState| {
        c.set(c.get() + 1);
        Ok(())
    })));
    cs.run("+ 1 2").unwrap();
    assert!(count.get() > 0);

    cs.set_call_hook(Some(Rc::new(|_: &mut CsState| {
        Err(CsError::bare("hook abort"))
    })));
    let err = cs.run("+ 1 2").unwrap_err();
    assert_eq!(err.message(), "hook abort");
    cs.set_call_hook(None);
}
