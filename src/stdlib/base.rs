//! Base control-flow and alias commands

use std::rc::Rc;

use crate::bcode::CodeRef;
use crate::consts::MAX_ARGUMENTS;
use crate::error::{CsResult, RunResult, Signal};
use crate::state::{CsState, LoopState};
use crate::value::Value;

/// Install the loop iteration value, pushing a shadow frame on the
/// first iteration and replacing in place afterwards.
pub(super) fn loop_set(cs: &mut CsState, idx: usize, v: Value, pushed: &mut bool) {
    if *pushed {
        cs.alias_replace(idx, v);
    } else {
        cs.alias_push(idx, v);
        *pushed = true;
    }
}

pub(super) fn loop_unset(cs: &mut CsState, idx: usize, pushed: bool) {
    if pushed {
        cs.alias_pop(idx);
    }
}

fn do_loop(
    cs: &mut CsState,
    idx: usize,
    offset: i64,
    n: i64,
    step: i64,
    body: &CodeRef,
) -> RunResult<()> {
    if n <= 0 || !cs.ident(idx).is_alias() {
        return Ok(());
    }
    let mut pushed = false;
    let mut r = Ok(());
    for i in 0..n {
        loop_set(cs, idx, Value::Int(offset + i * step), &mut pushed);
        let mut ret = Value::Null;
        match cs.run_loop(body, &mut ret) {
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
}

fn loop_conc(
    cs: &mut CsState,
    idx: usize,
    offset: i64,
    n: i64,
    step: i64,
    body: &CodeRef,
    space: bool,
    res: &mut Value,
) -> RunResult<()> {
    if n <= 0 || !cs.ident(idx).is_alias() {
        return Ok(());
    }
    let mut pushed = false;
    let mut out = String::new();
    let mut r = Ok(());
    for i in 0..n {
        loop_set(cs, idx, Value::Int(offset + i * step), &mut pushed);
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
    cs.new_command("error", "s", |cs, args, _| {
        Err(Signal::Error(cs.error(args[0].get_str())))
    })?;

    cs.new_command("pcall", "err", |cs, args, res| {
        let code = args[0].get_code().cloned();
        let (Some(ridx), Some(tidx)) = (args[1].get_ident(), args[2].get_ident()) else {
            *res = Value::Int(0);
            return Ok(());
        };
        if !cs.ident(ridx).is_alias() || !cs.ident(tidx).is_alias() {
            *res = Value::Int(0);
            return Ok(());
        }
        let mut result = Value::Null;
        let mut tback = Value::Null;
        let mut ok = true;
        if let Some(code) = code {
            match cs.run_code_into(&code, &mut result) {
                Ok(()) => {}
                Err(Signal::Error(e)) => {
                    result = Value::Str(Rc::from(e.message()));
                    if !e.stack().is_empty() {
                        tback = Value::Str(Rc::from(cs.format_stack(&e)));
                    }
                    ok = false;
                }
                // loop control and internal failures are not catchable
                Err(other) => return Err(other),
            }
        }
        *res = Value::Int(i64::from(ok));
        cs.set_alias(ridx, result);
        cs.set_alias(tidx, tback);
        Ok(())
    })?;

    cs.new_command("?", "tTT", |_, args, res| {
        let pick = if args[0].get_bool() { 1 } else { 2 };
        *res = args[pick].take();
        Ok(())
    })?;

    cs.new_command("cond", "ee2V", |cs, args, res| {
        let mut i = 0;
        while i < args.len() {
            if i + 1 < args.len() {
                if let Some(c) = args[i].get_code().cloned() {
                    if cs.run_bool(&c)? {
                        if let Some(b) = args[i + 1].get_code().cloned() {
                            cs.run_code_into(&b, res)?;
                        }
                        break;
                    }
                }
            } else {
                // trailing block with no condition is the default case
                if let Some(b) = args[i].get_code().cloned() {
                    cs.run_code_into(&b, res)?;
                }
                break;
            }
            i += 2;
        }
        Ok(())
    })?;

    cs.new_command("alias", "st", |cs, args, _| {
        let name = args[0].get_str();
        let v = args[1].take();
        cs.assign_value(&name, v).map_err(Signal::Error)
    })?;

    cs.new_command("push", "rTe", |cs, args, res| {
        let Some(idx) = args[0].get_ident() else {
            return Ok(());
        };
        if !cs.ident(idx).is_alias() || idx < MAX_ARGUMENTS {
            return Ok(());
        }
        let Some(body) = args[2].get_code().cloned() else {
            return Ok(());
        };
        let v = args[1].take();
        cs.alias_push(idx, v);
        let r = cs.run_code_into(&body, res);
        cs.alias_pop(idx);
        r
    })?;

    cs.new_command("echo", "C", |_, args, _| {
        println!("{}", args[0].get_str());
        Ok(())
    })?;

    cs.new_command("loop", "rie", |cs, args, _| {
        let Some(body) = args[2].get_code().cloned() else {
            return Ok(());
        };
        let Some(idx) = args[0].get_ident() else {
            return Ok(());
        };
        do_loop(cs, idx, 0, args[1].get_int(), 1, &body)
    })?;

    cs.new_command("loop+", "riie", |cs, args, _| {
        let Some(body) = args[3].get_code().cloned() else {
            return Ok(());
        };
        let Some(idx) = args[0].get_ident() else {
            return Ok(());
        };
        do_loop(cs, idx, args[1].get_int(), args[2].get_int(), 1, &body)
    })?;

    cs.new_command("loop*", "riie", |cs, args, _| {
        let Some(body) = args[3].get_code().cloned() else {
            return Ok(());
        };
        let Some(idx) = args[0].get_ident() else {
            return Ok(());
        };
        do_loop(cs, idx, 0, args[2].get_int(), args[1].get_int(), &body)
    })?;

    cs.new_command("loop+*", "riiie", |cs, args, _| {
        let Some(body) = args[4].get_code().cloned() else {
            return Ok(());
        };
        let Some(idx) = args[0].get_ident() else {
            return Ok(());
        };
        do_loop(
            cs,
            idx,
            args[1].get_int(),
            args[3].get_int(),
            args[2].get_int(),
            &body,
        )
    })?;

    cs.new_command("loopconcat", "rie", |cs, args, res| {
        let Some(body) = args[2].get_code().cloned() else {
            return Ok(());
        };
        let Some(idx) = args[0].get_ident() else {
            return Ok(());
        };
        loop_conc(cs, idx, 0, args[1].get_int(), 1, &body, true, res)
    })?;

    cs.new_command("loopconcatword", "rie", |cs, args, res| {
        let Some(body) = args[2].get_code().cloned() else {
            return Ok(());
        };
        let Some(idx) = args[0].get_ident() else {
            return Ok(());
        };
        loop_conc(cs, idx, 0, args[1].get_int(), 1, &body, false, res)
    })?;

    cs.new_command("while", "ee", |cs, args, _| {
        let (Some(cond), Some(body)) = (
            args[0].get_code().cloned(),
            args[1].get_code().cloned(),
        ) else {
            return Ok(());
        };
        loop {
            if !cs.run_bool(&cond)? {
                return Ok(());
            }
            let mut ret = Value::Null;
            match cs.run_loop(&body, &mut ret) {
                Ok(LoopState::Break) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(Signal::Error(e)),
            }
        }
    })?;

    Ok(())
}
