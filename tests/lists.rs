use cubescript::prelude::*;

#[test]
fn list_parser_items() {
    let mut p = ListParser::new("a \"b c\" [d e] (f g)");
    let mut raw = Vec::new();
    let mut quoted = Vec::new();
    while p.parse().unwrap() {
        raw.push(p.item());
        quoted.push(p.quoted_item().to_owned());
    }
    assert_eq!(raw, ["a", "b c", "d e", "f g"]);
    assert_eq!(quoted, ["a", "\"b c\"", "[d e]", "(f g)"]);
}

#[test]
fn list_parser_separators_and_comments() {
    let mut p = ListParser::new("a; b //skip me\n c");
    assert_eq!(p.count().unwrap(), 3);

    let mut p = ListParser::new("x ] y");
    assert!(p.parse().unwrap());
    assert!(!p.parse().unwrap());
}

#[test]
fn listlen() {
    let mut cs = CsState::new();
    assert_eq!(cs.run("listlen \"a b [c d] e\"").unwrap().get_int(), 4);
    assert_eq!(cs.run("listlen \"\"").unwrap().get_int(), 0);
    assert_eq!(cs.run("listlen \"one\"").unwrap().get_int(), 1);
}

#[test]
fn at_indexing() {
    let mut cs = CsState::new();
    assert_eq!(cs.run("at \"a b [c d] e\" 2").unwrap().get_str(), "c d");
    assert_eq!(cs.run("at \"a b c\" 0").unwrap().get_str(), "a");
    assert_eq!(cs.run("at \"a b c\" 9").unwrap().get_str(), "");
    // chained indices drill into nested lists
    assert_eq!(cs.run("at \"a [x y z] c\" 1 2").unwrap().get_str(), "z");
}

#[test]
fn sublist() {
    let mut cs = CsState::new();
    assert_eq!(cs.run("sublist \"a b c d\" 1 2").unwrap().get_str(), "b c");
    assert_eq!(cs.run("sublist \"a b c d\" 2").unwrap().get_str(), "c d");
    assert_eq!(cs.run("sublist \"a [b c] d\" 1 1").unwrap().get_str(), "[b c]");
    assert_eq!(cs.run("sublist \"a b\" 5 2").unwrap().get_str(), "");
}

#[test]
fn indexof() {
    let mut cs = CsState::new();
    assert_eq!(cs.run("indexof \"a b c\" b").unwrap().get_int(), 1);
    assert_eq!(cs.run("indexof \"a b c\" z").unwrap().get_int(), -1);
}

#[test]
fn looplist_binds_items() {
    let mut cs = CsState::new();
    assert_eq!(
        cs.run("looplistconcat x \"a b c\" [concatword < $x >]")
            .unwrap()
            .get_str(),
        "<a> <b> <c>"
    );
    assert_eq!(
        cs.run("looplistconcatword x \"1 2 3\" [+ $x 1]").unwrap().get_str(),
        "234"
    );
    // binding is gone after iteration
    assert_eq!(cs.get_alias_val("x").as_deref(), Some(""));
}

#[test]
fn listfind_and_listcount() {
    let mut cs = CsState::new();
    assert_eq!(
        cs.run("listfind x \"4 8 15 16\" [= $x 15]").unwrap().get_int(),
        2
    );
    assert_eq!(
        cs.run("listfind x \"4 8\" [= $x 99]").unwrap().get_int(),
        -1
    );
    assert_eq!(
        cs.run("listcount x \"1 5 2 7 3\" [> $x 2]").unwrap().get_int(),
        3
    );
}

#[test]
fn prettylist() {
    let mut cs = CsState::new();
    assert_eq!(
        cs.run("prettylist \"a b c\" and").unwrap().get_str(),
        "a, b and c"
    );
    assert_eq!(cs.run("prettylist \"a b\" or").unwrap().get_str(), "a or b");
    assert_eq!(cs.run("prettylist \"a b c\" \"\"").unwrap().get_str(), "a, b, c");
    assert_eq!(cs.run("prettylist solo and").unwrap().get_str(), "solo");
}

#[test]
fn quoted_items_unescape() {
    let mut cs = CsState::new();
    assert_eq!(
        cs.run("at \"alpha ^\"two words^\" omega\" 1").unwrap().get_str(),
        "two words"
    );

    let mut p = ListParser::new("\"tab^there\"");
    assert!(p.parse().unwrap());
    assert_eq!(p.item(), "tab\there");
}
