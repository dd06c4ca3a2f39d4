//! List commands
//!
//! Lists are plain strings driven through the shared list micro-parser;
//! iteration binds the loop ident the same way the numeric loop drivers
//! do.

use std::rc::Rc;

use crate::bcode::CodeRef;
use crate::error::{CsResult, ParseError, RunResult, Signal};
use crate::parse::ListParser;
use crate::state::{CsState, LoopState};
use crate::value::Value;

use super::base::{loop_set, loop_unset};

fn list_err(cs: &CsState, e: ParseError) -> Signal {
    Signal::Error(cs.error(e.to_string()))
}

/// Collect the elements of a list, escapes resolved.
fn list_items(cs: &CsState, list: &str) -> RunResult<Vec<String>> {
    let mut p = ListParser::new(list);
    let mut items = Vec::new();
    while p.parse().map_err(|e| list_err(cs, e))? {
        items.push(p.item());
    }
    Ok(items)
}

fn loop_list_conc(
    cs: &mut CsState,
    idx: usize,
    list: &str,
    body: &CodeRef,
    space: bool,
    res: &mut Value,
) -> RunResult<()> {
    if !cs.ident(idx).is_alias() {
        return Ok(());
    }
    let items = list_items(cs, list)?;
    let mut pushed = false;
    let mut out = String::new();
    let mut r = Ok(());
    for item in items {
        loop_set(cs, idx, Value::Str(Rc::from(item)), &mut pushed);
        let mut ret = Value::Null;
        match cs.run_loop(body, &mut ret) {
            Ok(LoopState::Break) => break,
            Ok(LoopState::Continue) => continue,
            Ok(LoopState::Normal) => {}
            Err(e) => {
                r = Err(Signal::Error(e));
                break;
            }
        }
        if space && !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&ret.get_str());
    }
    loop_unset(cs, idx, pushed);
    *res = Value::Str(Rc::from(out));
    r
}

pub(crate) fn init(cs: &mut CsState) -> CsResult<()> {
    cs.new_command("listlen", "s", |cs, args, res| {
        let s = args[0].get_str();
        let n = ListParser::new(&s).count().map_err(|e| list_err(cs, e))?;
        *res = Value::Int(n as i64);
        Ok(())
    })?;

    cs.new_command("at", "si1V", |cs, args, res| {
        if args.is_empty() {
            return Ok(());
        }
        if args.len() == 1 {
            *res = args[0].take();
            return Ok(());
        }
        let mut s = args[0].get_str();
        for spec in 1..args.len() {
            let mut pos = args[spec].get_int();
            let mut p = ListParser::new(&s);
            let mut found = None;
            loop {
                if !p.parse().map_err(|e| list_err(cs, e))? {
                    break;
                }
                if pos == 0 {
                    found = Some(p.item());
                    break;
                }
                pos -= 1;
            }
            s = found.unwrap_or_default();
        }
        *res = Value::Str(Rc::from(s));
        Ok(())
    })?;

    cs.new_command("sublist", "siiN", |cs, args, res| {
        let s = args[0].get_str();
        let skip = args[1].get_int();
        let count = args[2].get_int();
        let numargs = args[3].get_int();
        let offset = skip.max(0) as usize;
        let len = if numargs >= 3 { Some(count.max(0) as usize) } else { None };
        let mut p = ListParser::new(&s);
        let mut taken: Vec<String> = Vec::new();
        let mut i = 0usize;
        while p.parse().map_err(|e| list_err(cs, e))? {
            if i >= offset {
                if let Some(len) = len {
                    if taken.len() >= len {
                        break;
                    }
                }
                taken.push(p.quoted_item().to_owned());
            }
            i += 1;
        }
        *res = Value::Str(Rc::from(taken.join(" ")));
        Ok(())
    })?;

    cs.new_command("indexof", "ss", |cs, args, res| {
        let list = args[0].get_str();
        let needle = args[1].get_str();
        let mut p = ListParser::new(&list);
        let mut n = 0i64;
        let mut found = -1i64;
        while p.parse().map_err(|e| list_err(cs, e))? {
            if p.raw_item() == needle {
                found = n;
                break;
            }
            n += 1;
        }
        *res = Value::Int(found);
        Ok(())
    })?;

    cs.new_command("listfind", "rse", |cs, args, res| {
        let Some(idx) = args[0].get_ident() else {
            *res = Value::Int(-1);
            return Ok(());
        };
        let Some(body) = args[2].get_code().cloned() else {
            *res = Value::Int(-1);
            return Ok(());
        };
        if !cs.ident(idx).is_alias() {
            *res = Value::Int(-1);
            return Ok(());
        }
        let list = args[1].get_str();
        let items: Vec<String> = {
            let mut p = ListParser::new(&list);
            let mut v = Vec::new();
            while p.parse().map_err(|e| list_err(cs, e))? {
                v.push(p.raw_item().to_owned());
            }
            v
        };
        let mut pushed = false;
        let mut found = -1i64;
        let mut r = Ok(());
        for (n, item) in items.into_iter().enumerate() {
            loop_set(cs, idx, Value::Str(Rc::from(item)), &mut pushed);
            match cs.run_bool(&body) {
                Ok(true) => {
                    found = n as i64;
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    r = Err(e);
                    break;
                }
            }
        }
        loop_unset(cs, idx, pushed);
        *res = Value::Int(found);
        r
    })?;

    cs.new_command("listcount", "rse", |cs, args, res| {
        let Some(idx) = args[0].get_ident() else {
            *res = Value::Int(0);
            return Ok(());
        };
        let Some(body) = args[2].get_code().cloned() else {
            *res = Value::Int(0);
            return Ok(());
        };
        if !cs.ident(idx).is_alias() {
            *res = Value::Int(0);
            return Ok(());
        }
        let list = args[1].get_str();
        let items = list_items(cs, &list)?;
        let mut pushed = false;
        let mut count = 0i64;
        let mut r = Ok(());
        for item in items {
            loop_set(cs, idx, Value::Str(Rc::from(item)), &mut pushed);
            match cs.run_bool(&body) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => {
                    r = Err(e);
                    break;
                }
            }
        }
        loop_unset(cs, idx, pushed);
        *res = Value::Int(count);
        r
    })?;

    cs.new_command("looplist", "rse", |cs, args, _| {
        let Some(idx) = args[0].get_ident() else {
            return Ok(());
        };
        let Some(body) = args[2].get_code().cloned() else {
            return Ok(());
        };
        if !cs.ident(idx).is_alias() {
            return Ok(());
        }
        let list = args[1].get_str();
        let items = list_items(cs, &list)?;
        let mut pushed = false;
        let mut r = Ok(());
        for item in items {
            loop_set(cs, idx, Value::Str(Rc::from(item)), &mut pushed);
            let mut ret = Value::Null;
            match cs.run_loop(&body, &mut ret) {
                Ok(LoopState::Break) => break,
                Ok(_) => {}
                Err(e) => {
                    r = Err(Signal::Error(e));
                    break;
                }
            }
        }
        loop_unset(cs, idx, pushed);
        r
    })?;

    cs.new_command("looplistconcat", "rse", |cs, args, res| {
        let (Some(idx), Some(body)) = (args[0].get_ident(), args[2].get_code().cloned()) else {
            return Ok(());
        };
        let list = args[1].get_str();
        loop_list_conc(cs, idx, &list, &body, true, res)
    })?;

    cs.new_command("looplistconcatword", "rse", |cs, args, res| {
        let (Some(idx), Some(body)) = (args[0].get_ident(), args[2].get_code().cloned()) else {
            return Ok(());
        };
        let list = args[1].get_str();
        loop_list_conc(cs, idx, &list, &body, false, res)
    })?;

    cs.new_command("prettylist", "ss", |cs, args, res| {
        let list = args[0].get_str();
        let conj = args[1].get_str();
        let items = list_items(cs, &list)?;
        let mut out = String::new();
        let total = items.len();
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                if i + 1 == total && !conj.is_empty() {
                    if total > 2 {
                        out.push(',');
                    }
                    out.push(' ');
                    out.push_str(&conj);
                    out.push(' ');
                } else {
                    out.push_str(", ");
                }
            }
            out.push_str(item);
        }
        *res = Value::Str(Rc::from(out));
        Ok(())
    })?;

    Ok(())
}
