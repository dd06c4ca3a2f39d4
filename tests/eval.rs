use cubescript::prelude::*;

fn state() -> CsState {
    CsState::new()
}

#[test]
fn arithmetic() {
    let mut cs = state();

    assert_eq!(cs.run("+ 1 2 3").unwrap().get_int(), 6);
    assert_eq!(cs.run("+f 1.5 2.5").unwrap().get_float(), 4.0);
    assert_eq!(cs.run("- 10 3 2").unwrap().get_int(), 5);
    assert_eq!(cs.run("- 5").unwrap().get_int(), -5);
    assert_eq!(cs.run("* 2 3 4").unwrap().get_int(), 24);
    assert_eq!(cs.run("div 7 2").unwrap().get_int(), 3);
    assert_eq!(cs.run("div 7 0").unwrap().get_int(), 0);
    assert_eq!(cs.run("mod 7 3").unwrap().get_int(), 1);
}

#[test]
fn float_result_formats() {
    let mut cs = state();

    let mut v = cs.run("+f 1.5 2.5").unwrap();
    assert_eq!(v.force_str(), "4.0");

    let mut v = cs.run("divf 1 2").unwrap();
    assert_eq!(v.force_str(), "0.5");
}

#[test]
fn comparisons() {
    let mut cs = state();

    assert_eq!(cs.run("= 2 2").unwrap().get_int(), 1);
    assert_eq!(cs.run("= 2 3").unwrap().get_int(), 0);
    assert_eq!(cs.run("< 1 2 3").unwrap().get_int(), 1);
    assert_eq!(cs.run("< 1 3 2").unwrap().get_int(), 0);
    assert_eq!(cs.run(">= 3 3 2").unwrap().get_int(), 1);
    assert_eq!(cs.run("=s abc abc").unwrap().get_int(), 1);
    assert_eq!(cs.run("=s abc abd").unwrap().get_int(), 0);
}

#[test]
fn if_branches() {
    let mut cs = state();

    assert_eq!(cs.run("if 1 [result yes] [result no]").unwrap().get_str(), "yes");
    assert_eq!(cs.run("if 0 [result yes] [result no]").unwrap().get_str(), "no");
    assert_eq!(cs.run("if (> 2 1) [result a] [result b]").unwrap().get_str(), "a");
    // missing else branch yields null
    assert!(cs.run("if 0 [result yes]").unwrap().is_null());
}

#[test]
fn logic_short_circuits() {
    let mut cs = state();

    assert_eq!(cs.run("&& 1 2").unwrap().get_int(), 2);
    assert_eq!(cs.run("&& 0 2").unwrap().get_int(), 0);
    assert_eq!(cs.run("|| 0 3").unwrap().get_int(), 3);
    assert_eq!(cs.run("|| 1 3").unwrap().get_int(), 1);
    assert_eq!(cs.run("! 1").unwrap().get_int(), 0);
    assert_eq!(cs.run("! 0").unwrap().get_int(), 1);
    assert_eq!(cs.run("&&").unwrap().get_int(), 1);
    assert_eq!(cs.run("||").unwrap().get_int(), 0);

    // the second block must not run once the first is false
    cs.run("alias hits 0").unwrap();
    cs.run("&& [result 0] [hits = 1]").unwrap();
    assert_eq!(cs.get_alias_val("hits").as_deref(), Some("0"));
}

#[test]
fn aliases() {
    let mut cs = state();

    assert_eq!(cs.run("alias x 10; x").unwrap().get_int(), 10);
    assert_eq!(cs.run("+ $x 5").unwrap().get_int(), 15);

    // assignment statement form
    assert_eq!(cs.run("y = 4; + $y 1").unwrap().get_int(), 5);

    // reassignment invalidates the old body
    cs.run("alias f [result one]").unwrap();
    assert_eq!(cs.run("f").unwrap().get_str(), "one");
    cs.run("alias f [result two]").unwrap();
    assert_eq!(cs.run("f").unwrap().get_str(), "two");
}

#[test]
fn alias_arguments() {
    let mut cs = state();

    cs.run("alias greet [result $arg1]").unwrap();
    assert_eq!(cs.run("greet hello").unwrap().get_str(), "hello");

    cs.run("alias nargs [result $numargs]").unwrap();
    assert_eq!(cs.run("nargs a b c").unwrap().get_int(), 3);
    assert_eq!(cs.run("nargs").unwrap().get_int(), 0);

    cs.run("alias sum2 [+ $arg1 $arg2]").unwrap();
    assert_eq!(cs.run("sum2 20 22").unwrap().get_int(), 42);
    assert_eq!(cs.get_var_int("numargs"), Some(0));
}

#[test]
fn doargs_sees_caller_frame() {
    let mut cs = state();

    cs.run("alias helper [doargs [result $arg1]]").unwrap();
    cs.run("alias outer [helper]").unwrap();
    assert_eq!(cs.run("outer hi").unwrap().get_str(), "hi");
}

#[test]
fn loops() {
    let mut cs = state();

    assert_eq!(cs.run("loopconcat i 3 [result $i]").unwrap().get_str(), "0 1 2");
    assert_eq!(cs.run("loopconcatword i 3 [result $i]").unwrap().get_str(), "012");
    assert_eq!(
        cs.run("loopconcat i 3 [+ $i 10]").unwrap().get_str(),
        "10 11 12"
    );
    // the loop variable is rebound per iteration and unbound after
    assert_eq!(cs.get_alias_val("i").as_deref(), Some(""));

    assert_eq!(
        cs.run("loop+ i 5 3 [result $i]; result done").unwrap().get_str(),
        "done"
    );
}

#[test]
fn loop_control() {
    let mut cs = state();

    assert_eq!(
        cs.run("loopconcat i 5 [if (= $i 3) [break]; result $i]")
            .unwrap()
            .get_str(),
        "0 1 2"
    );
    assert_eq!(
        cs.run("loopconcat i 4 [if (= $i 1) [continue]; result $i]")
            .unwrap()
            .get_str(),
        "0 2 3"
    );
}

#[test]
fn while_loop() {
    let mut cs = state();

    cs.run("alias n 0").unwrap();
    cs.run("while [< $n 3] [n = (+ $n 1)]").unwrap();
    assert_eq!(cs.get_alias_val("n").as_deref(), Some("3"));
}

#[test]
fn concatenation() {
    let mut cs = state();

    assert_eq!(cs.run("concat a b c").unwrap().get_str(), "a b c");
    assert_eq!(cs.run("concatword a b c").unwrap().get_str(), "abc");
    assert_eq!(cs.run("concat a (+ 1 2)").unwrap().get_str(), "a 3");
}

#[test]
fn push_restores_value() {
    let mut cs = state();

    cs.run("alias a outer").unwrap();
    assert_eq!(cs.run("push a inner [result $a]").unwrap().get_str(), "inner");
    assert_eq!(cs.get_alias_val("a").as_deref(), Some("outer"));
}

#[test]
fn local_scoping() {
    let mut cs = state();

    cs.run("alias z outer").unwrap();
    assert_eq!(cs.run("local z; z = inner; result $z").unwrap().get_str(), "inner");
    assert_eq!(cs.get_alias_val("z").as_deref(), Some("outer"));
}

#[test]
fn block_substitution() {
    let mut cs = state();

    cs.run("alias who world").unwrap();
    cs.run("alias msg [hello @who]").unwrap();
    assert_eq!(cs.get_alias_val("msg").as_deref(), Some("hello world"));

    // deeper @s substitute at the matching bracket level
    cs.run("alias outer [[@@who] x]").unwrap();
    assert_eq!(cs.get_alias_val("outer").as_deref(), Some("[world] x"));
}

#[test]
fn quoted_strings() {
    let mut cs = state();

    assert_eq!(cs.run("result \"a b c\"").unwrap().get_str(), "a b c");
    assert_eq!(cs.run("result \"tab^there\"").unwrap().get_str(), "tab\there");
    assert_eq!(cs.run("result \"nl^nhere\"").unwrap().get_str(), "nl\nhere");
    // a block keeps its raw text, quotes included
    assert_eq!(
        cs.run("result [a \"b c\" d]").unwrap().get_str(),
        "a \"b c\" d"
    );
}

#[test]
fn numeric_statement_heads() {
    let mut cs = state();

    assert_eq!(cs.run("42").unwrap().get_int(), 42);
    assert_eq!(cs.run("0x2A").unwrap().get_int(), 42);
    assert_eq!(cs.run("0b101").unwrap().get_int(), 5);
    assert_eq!(cs.run("-7").unwrap().get_int(), -7);
}

#[test]
fn pcall_catches_errors() {
    let mut cs = state();

    assert_eq!(cs.run("pcall [error \"boom\"] err tb").unwrap().get_int(), 0);
    assert_eq!(cs.get_alias_val("err").as_deref(), Some("boom"));

    assert_eq!(cs.run("pcall [result fine] err tb").unwrap().get_int(), 1);
    assert_eq!(cs.get_alias_val("err").as_deref(), Some("fine"));
}

#[test]
fn conditional_command() {
    let mut cs = state();

    assert_eq!(cs.run("? 1 yes no").unwrap().get_str(), "yes");
    assert_eq!(cs.run("? 0 yes no").unwrap().get_str(), "no");
    assert_eq!(
        cs.run("cond [= 1 2] [result a] [= 2 2] [result b] [result c]")
            .unwrap()
            .get_str(),
        "b"
    );
    assert_eq!(
        cs.run("cond [= 1 2] [result a] [result fallback]")
            .unwrap()
            .get_str(),
        "fallback"
    );
}

#[test]
fn comments_and_continuations() {
    let mut cs = state();

    assert_eq!(cs.run("+ 1 2 // trailing comment").unwrap().get_int(), 3);
    assert_eq!(cs.run("// full line\n+ 2 3").unwrap().get_int(), 5);
    assert_eq!(cs.run("+ 1 \\\n2").unwrap().get_int(), 3);
}

#[test]
fn strings_library() {
    let mut cs = state();

    assert_eq!(cs.run("strlen abcd").unwrap().get_int(), 4);
    assert_eq!(cs.run("strstr abcd cd").unwrap().get_int(), 2);
    assert_eq!(cs.run("strstr abcd zz").unwrap().get_int(), -1);
    assert_eq!(cs.run("strupper abc").unwrap().get_str(), "ABC");
    assert_eq!(cs.run("strlower ABC").unwrap().get_str(), "abc");
    assert_eq!(cs.run("format \"%1-%2\" a b").unwrap().get_str(), "a-b");
    assert_eq!(cs.run("format \"100%%\"").unwrap().get_str(), "100%");
    assert_eq!(cs.run("substr abcdef 2 3").unwrap().get_str(), "cde");
    assert_eq!(cs.run("substr abcdef 2").unwrap().get_str(), "cdef");
    assert_eq!(cs.run("substr abc 9").unwrap().get_str(), "");
    assert_eq!(cs.run("substr abc -2 99").unwrap().get_str(), "abc");
    assert_eq!(
        cs.run("strreplace a-b-c - +").unwrap().get_str(),
        "a+b+c"
    );
    assert_eq!(
        cs.run("strreplace \"a b c d\" \" \" \",\" \";\"").unwrap().get_str(),
        "a,b;c,d"
    );
    assert_eq!(cs.run("strreplace abc \"\" x").unwrap().get_str(), "abc");
}

#[test]
fn dynamic_dispatch() {
    let mut cs = state();

    // head computed at runtime through a lookup
    cs.run("alias op +").unwrap();
    assert_eq!(cs.run("$op 2 3").unwrap().get_int(), 5);

    // literal head value passes through
    assert_eq!(cs.run("alias lit 9; $lit").unwrap().get_int(), 9);
}

#[test]
fn nested_expressions() {
    let mut cs = state();

    assert_eq!(cs.run("+ (* 2 3) (- 10 4)").unwrap().get_int(), 12);
    assert_eq!(cs.run("result (concatword a b c)").unwrap().get_str(), "abc");
    assert_eq!(cs.run("+ (+ 1 (+ 2 3)) 4").unwrap().get_int(), 10);
}
