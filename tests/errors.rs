use cubescript::prelude::*;

#[test]
fn unknown_command() {
    let mut cs = CsState::new();
    let err = cs.run("definitelynotacommand 1 2").unwrap_err();
    assert!(err.message().contains("unknown command"));
}

#[test]
fn unknown_lookup() {
    let mut cs = CsState::new();
    let err = cs.run("result $neverdefined").unwrap_err();
    assert!(err.message().contains("unknown alias lookup"));
}

#[test]
fn parse_errors_carry_location() {
    let mut cs = CsState::new();

    let err = cs.run("result \"abc").unwrap_err();
    assert!(err.message().contains("unfinished string"));
    assert!(err.message().starts_with("1:"));

    let err = cs.run("result (+ 1 2").unwrap_err();
    assert!(err.message().contains("missing \")\""));

    let err = cs.run("result [+ 1 2").unwrap_err();
    assert!(err.message().contains("missing \"]\""));

    let err = cs
        .run_named("+ 1\n+ 2\nresult \"oops", "boot.cfg")
        .unwrap_err();
    assert!(err.message().starts_with("boot.cfg:3:"), "{}", err.message());
}

#[test]
fn too_many_substitution_levels() {
    let mut cs = CsState::new();
    let err = cs.run("alias a [@@x]").unwrap_err();
    assert!(err.message().contains("too many @s"));
}

#[test]
fn invalid_line_break() {
    let mut cs = CsState::new();
    let err = cs.run("+ 1 \\x 2").unwrap_err();
    assert!(err.message().contains("invalid line break"));
}

#[test]
fn loop_control_outside_loop() {
    let mut cs = CsState::new();
    assert!(cs.run("break").unwrap_err().message().contains("no loop to break"));
    assert!(cs
        .run("continue")
        .unwrap_err()
        .message()
        .contains("no loop to continue"));
}

#[test]
fn recursion_limit() {
    let mut cs = CsState::new();
    cs.set_max_run_depth(100);
    cs.run("alias rec [rec]").unwrap();
    let err = cs.run("rec").unwrap_err();
    assert!(err.message().contains("exceeded recursion limit"));
    // bookkeeping fully unwound
    assert_eq!(cs.get_var_int("numargs"), Some(0));
}

#[test]
fn stack_snapshot_depths() {
    let mut cs = CsState::new();
    cs.run("alias inner [error boom]; alias outer [inner]").unwrap();

    let err = cs.run("outer").unwrap_err();
    assert_eq!(err.message(), "boom");
    assert_eq!(err.stack().len(), 2);
    // innermost frame first, logical depth counted from the root
    assert_eq!(err.stack()[0].depth, 2);
    assert_eq!(cs.ident(err.stack()[0].ident).name.as_ref(), "inner");
    assert_eq!(err.stack()[1].depth, 1);
    assert_eq!(cs.ident(err.stack()[1].ident).name.as_ref(), "outer");
    assert!(!err.gap());
}

#[test]
fn stack_snapshot_truncates_at_dbgalias() {
    let mut cs = CsState::new();
    cs.run("alias a1 [error deep]").unwrap();
    for i in 2..=6 {
        cs.run(&format!("alias a{i} [a{}]", i - 1)).unwrap();
    }
    let err = cs.run("a6").unwrap_err();
    // default dbgalias is 4: three innermost frames plus the root
    assert_eq!(err.stack().len(), 4);
    assert!(err.gap());
    assert_eq!(err.stack()[0].depth, 6);
    assert_eq!(err.stack()[3].depth, 1);
    assert_eq!(cs.ident(err.stack()[3].ident).name.as_ref(), "a6");
}

#[test]
fn error_unwinds_argument_frames() {
    let mut cs = CsState::new();
    cs.run("alias f [error nope]").unwrap();

    let err = cs.run("f 1 2 3").unwrap_err();
    assert_eq!(err.message(), "nope");
    assert_eq!(cs.get_var_int("numargs"), Some(0));
    // argument slots are unbound again
    assert_eq!(cs.get_alias_val("arg1").as_deref(), Some(""));
    assert_eq!(cs.run("+ 1 1").unwrap().get_int(), 2);
}

#[test]
fn pcall_reports_traceback() {
    let mut cs = CsState::new();
    cs.run("alias thrower [error oops]").unwrap();

    let v = cs.run("pcall [thrower] e t").unwrap();
    assert_eq!(v.get_int(), 0);
    assert_eq!(cs.get_alias_val("e").as_deref(), Some("oops"));
    let tb = cs.get_alias_val("t").unwrap();
    assert!(tb.contains("thrower"), "{tb}");
}

#[test]
fn errors_propagate_through_loops() {
    let mut cs = CsState::new();
    let err = cs.run("loop i 3 [error inloop]").unwrap_err();
    assert_eq!(err.message(), "inloop");
    // the loop ident was popped on unwind
    assert_eq!(cs.get_alias_val("i").as_deref(), Some(""));
}

#[test]
fn invalid_names() {
    let mut cs = CsState::new();
    assert!(cs.new_ivar("5bad", 0, 1, 0, IdentFlags::empty(), None).is_err());
    assert!(cs.new_ident("-12", IdentFlags::empty()).is_err());
    assert!(cs.new_ident("fine", IdentFlags::empty()).is_ok());
}
