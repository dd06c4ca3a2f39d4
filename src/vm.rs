//! The virtual machine
//!
//! A single interpretive loop over decoded instruction words. Each
//! invocation owns its value stack; the thread state carries the call
//! stack, the argument-frame bookkeeping, and the depth counters. All
//! non-local transfers (errors, loop control) travel as [`Signal`]
//! results, and every exit path restores the alias frames, call frames
//! and `numargs` it touched.

use std::rc::Rc;

use itertools::Itertools;
use tracing::trace;

use crate::bcode::{read_float_payload, read_int_payload, read_str_payload, CodeBlock, CodeRef, Instr, Op, RetType};
use crate::consts::MAX_ARGUMENTS;
use crate::error::{InternalError, RunResult, Signal};
use crate::gen;
use crate::ident::{call_command, CommandKind, IdentFlags, IdentKind};
use crate::state::{CallFrame, CsState};
use crate::value::Value;

/// Execute a code reference, leaving its result in `result`.
pub(crate) fn exec(cs: &mut CsState, code: &CodeRef, result: &mut Value) -> RunResult<()> {
    let block = code.block().clone();
    exec_from(cs, &block, code.start(), result)?;
    Ok(())
}

/// One VM invocation starting at `pc`; returns the cursor one past the
/// `Exit` that ended it.
fn exec_from(
    cs: &mut CsState,
    block: &Rc<CodeBlock>,
    pc: usize,
    result: &mut Value,
) -> RunResult<usize> {
    result.force_null();
    if cs.tstate.run_depth >= cs.tstate.max_run_depth {
        return Err(Signal::Error(cs.error("exceeded recursion limit")));
    }
    cs.tstate.run_depth += 1;
    let r = exec_loop(cs, block, pc, result);
    cs.tstate.run_depth -= 1;
    r
}

fn force_value(v: &mut Value, ret: RetType) {
    match ret {
        RetType::Null => {}
        RetType::Int => {
            v.force_int();
        }
        RetType::Float => {
            v.force_float();
        }
        RetType::Str => {
            v.force_str();
        }
    }
}

fn pop(args: &mut Vec<Value>) -> RunResult<Value> {
    args.pop().ok_or_else(|| InternalError::StackUnderflow.into())
}

fn ident_index(cs: &CsState, data: u32) -> RunResult<usize> {
    let idx = data as usize;
    if idx >= cs.istate.identmap.len() {
        return Err(InternalError::IdentIndex(idx).into());
    }
    Ok(idx)
}

/// Join printable values with a separator; null, code and ident
/// references contribute nothing.
pub(crate) fn concat_values(vals: &[Value], sep: &str) -> String {
    vals.iter()
        .map(|v| match v {
            Value::Int(_) | Value::Float(_) | Value::Str(_) => v.get_str(),
            _ => String::new(),
        })
        .join(sep)
}

/// Push a shadow frame on a plain alias; argument slots and non-alias
/// idents are left alone.
fn push_alias_frame(cs: &mut CsState, index: usize) {
    if index >= MAX_ARGUMENTS {
        cs.alias_push(index, Value::Null);
    }
}

fn pop_alias_frame(cs: &mut CsState, index: usize) {
    if index >= MAX_ARGUMENTS {
        cs.alias_pop(index);
    }
}

/// Mark an argument slot used in the current frame, installing a null
/// shadow so the call cleanup can restore the caller's binding.
fn touch_arg(cs: &mut CsState, index: usize) {
    if index < MAX_ARGUMENTS && !cs.is_arg_used(index) {
        if let Some(a) = cs.istate.identmap[index].alias_mut() {
            a.push(Value::Null);
        }
        if let Some(frame) = cs.tstate.callstack.last_mut() {
            frame.usedargs |= 1 << index;
        }
    }
}

fn exec_loop(
    cs: &mut CsState,
    block: &Rc<CodeBlock>,
    mut pc: usize,
    result: &mut Value,
) -> RunResult<usize> {
    if let Some(hook) = cs.tstate.call_hook.clone() {
        hook(cs).map_err(Signal::Error)?;
    }
    let mut args: Vec<Value> = Vec::new();
    loop {
        let word = *block
            .words()
            .get(pc)
            .ok_or(InternalError::CodeOverrun)?;
        let instr = Instr::decode(word)?;
        pc += 1;
        match instr.op {
            Op::Start | Op::Offset => {}

            Op::Null => {
                *result = match instr.ret {
                    RetType::Null => Value::Null,
                    RetType::Str => Value::Str(Rc::from("")),
                    RetType::Int => Value::Int(0),
                    RetType::Float => Value::Float(0.0),
                };
            }
            Op::False => {
                *result = match instr.ret {
                    RetType::Str => Value::Str(Rc::from("0")),
                    RetType::Float => Value::Float(0.0),
                    _ => Value::Int(0),
                };
            }
            Op::True => {
                *result = match instr.ret {
                    RetType::Str => Value::Str(Rc::from("1")),
                    RetType::Float => Value::Float(1.0),
                    _ => Value::Int(1),
                };
            }
            Op::Not => {
                let v = pop(&mut args)?;
                let b = !v.get_bool();
                *result = match instr.ret {
                    RetType::Str => Value::Str(Rc::from(if b { "1" } else { "0" })),
                    RetType::Float => Value::Float(f64::from(b)),
                    _ => Value::Int(i64::from(b)),
                };
            }
            Op::Pop => {
                pop(&mut args)?;
            }
            Op::Enter => {
                let mut inner = Value::Null;
                pc = exec_from(cs, block, pc, &mut inner)?;
                args.push(inner);
            }
            Op::EnterResult => {
                pc = exec_from(cs, block, pc, result)?;
            }
            Op::Exit => {
                force_value(result, instr.ret);
                return Ok(pc);
            }
            Op::Result => {
                *result = pop(&mut args)?;
                force_value(result, instr.ret);
            }
            Op::ResultArg => {
                force_value(result, instr.ret);
                args.push(result.take());
            }
            Op::Force => {
                let top = args.last_mut().ok_or(InternalError::StackUnderflow)?;
                force_value(top, instr.ret);
            }
            Op::Dup => {
                let top = args.last().ok_or(InternalError::StackUnderflow)?;
                let dup = match instr.ret {
                    RetType::Null => top.get_val(),
                    RetType::Int => Value::Int(top.get_int()),
                    RetType::Float => Value::Float(top.get_float()),
                    RetType::Str => {
                        let mut v = top.clone();
                        v.force_str();
                        v
                    }
                };
                args.push(dup);
            }

            Op::Val => match instr.ret {
                RetType::Str => {
                    let len = instr.data as usize;
                    let s = read_str_payload(block.words(), pc, len);
                    pc += len / 4 + 1;
                    args.push(Value::Str(Rc::from(s)));
                }
                RetType::Int => {
                    args.push(Value::Int(read_int_payload(block.words(), pc)));
                    pc += 2;
                }
                RetType::Float => {
                    args.push(Value::Float(read_float_payload(block.words(), pc)));
                    pc += 2;
                }
                RetType::Null => args.push(Value::Null),
            },
            Op::ValInt => match instr.ret {
                RetType::Str => {
                    let bytes = [
                        (instr.data & 0xff) as u8,
                        ((instr.data >> 8) & 0xff) as u8,
                        ((instr.data >> 16) & 0xff) as u8,
                    ];
                    let end = bytes.iter().position(|&b| b == 0).unwrap_or(3);
                    let s = String::from_utf8_lossy(&bytes[..end]).into_owned();
                    args.push(Value::Str(Rc::from(s)));
                }
                RetType::Int => args.push(Value::Int(instr.data_signed())),
                RetType::Float => args.push(Value::Float(instr.data_signed() as f64)),
                RetType::Null => args.push(Value::Null),
            },

            Op::Block => {
                let len = instr.data as usize;
                args.push(Value::Code(CodeRef::new(block.clone(), pc + 1)));
                pc += len;
            }
            Op::Empty => {
                args.push(Value::Code(cs.istate.empties.get(instr.ret)));
            }
            Op::Compile => {
                let top = args.last_mut().ok_or(InternalError::StackUnderflow)?;
                let compiled = match top {
                    Value::Str(s) => {
                        let src = s.to_string();
                        gen::compile_main(cs, &src, "").map_err(Signal::Error)?
                    }
                    v @ (Value::Int(_) | Value::Float(_)) => {
                        let v = v.clone();
                        gen::compile_literal(cs, &v)
                    }
                    _ => gen::compile_literal(cs, &Value::Null),
                };
                *args.last_mut().ok_or(InternalError::StackUnderflow)? = Value::Code(compiled);
            }
            Op::Cond => {
                let top = args.last().ok_or(InternalError::StackUnderflow)?;
                if let Value::Str(s) = top {
                    if s.is_empty() {
                        *args.last_mut().ok_or(InternalError::StackUnderflow)? = Value::Null;
                    } else {
                        let src = s.to_string();
                        let code = gen::compile_main(cs, &src, "").map_err(Signal::Error)?;
                        *args.last_mut().ok_or(InternalError::StackUnderflow)? =
                            Value::Code(code);
                    }
                }
            }

            Op::Ident => {
                let idx = ident_index(cs, instr.data)?;
                args.push(Value::Ident(idx));
            }
            Op::IdentArg => {
                let idx = ident_index(cs, instr.data)?;
                touch_arg(cs, idx);
                args.push(Value::Ident(idx));
            }
            Op::IdentU => {
                let top = args.last_mut().ok_or(InternalError::StackUnderflow)?;
                let idx = match top {
                    Value::Str(s) => {
                        let name = s.to_string();
                        cs.new_ident(&name, IdentFlags::UNKNOWN)
                            .map_err(Signal::Error)?
                    }
                    _ => cs.istate.dummy_idx,
                };
                touch_arg(cs, idx);
                *args.last_mut().ok_or(InternalError::StackUnderflow)? = Value::Ident(idx);
            }

            Op::Lookup => {
                let idx = ident_index(cs, instr.data)?;
                if cs.istate.identmap[idx].flags.contains(IdentFlags::UNKNOWN) {
                    return Err(Signal::Error(cs.error(format!(
                        "unknown alias lookup: {}",
                        cs.istate.identmap[idx].name
                    ))));
                }
                let mut v = cs.istate.identmap[idx]
                    .alias()
                    .map(|a| a.value.get_val())
                    .unwrap_or(Value::Null);
                force_value(&mut v, instr.ret);
                args.push(v);
            }
            Op::LookupArg => {
                let idx = ident_index(cs, instr.data)?;
                if !cs.is_arg_used(idx) {
                    args.push(default_for(instr.ret));
                } else {
                    let mut v = cs.istate.identmap[idx]
                        .alias()
                        .map(|a| a.value.get_val())
                        .unwrap_or(Value::Null);
                    force_value(&mut v, instr.ret);
                    args.push(v);
                }
            }
            Op::LookupU => {
                lookup_unknown(cs, &mut args, instr.ret)?;
            }

            Op::Svar => {
                let idx = ident_index(cs, instr.data)?;
                if let IdentKind::Svar(sv) = &cs.istate.identmap[idx].kind {
                    let mut v = Value::Str(sv.value.clone());
                    force_value(&mut v, instr.ret);
                    args.push(v);
                } else {
                    return Err(InternalError::IdentKind(idx).into());
                }
            }
            Op::Svar1 => {
                let idx = ident_index(cs, instr.data)?;
                let v = pop(&mut args)?;
                cs.set_var_str_checked(idx, &v.get_str())
                    .map_err(Signal::Error)?;
            }
            Op::Ivar => {
                let idx = ident_index(cs, instr.data)?;
                if let IdentKind::Ivar(iv) = &cs.istate.identmap[idx].kind {
                    let mut v = Value::Int(iv.value);
                    force_value(&mut v, instr.ret);
                    args.push(v);
                } else {
                    return Err(InternalError::IdentKind(idx).into());
                }
            }
            Op::Ivar1 => {
                let idx = ident_index(cs, instr.data)?;
                let v = pop(&mut args)?;
                cs.set_var_int_checked(idx, v.get_int())
                    .map_err(Signal::Error)?;
            }
            Op::Ivar2 => {
                let idx = ident_index(cs, instr.data)?;
                let b = pop(&mut args)?;
                let a = pop(&mut args)?;
                cs.set_var_int_checked(idx, (a.get_int() << 16) | (b.get_int() << 8))
                    .map_err(Signal::Error)?;
            }
            Op::Ivar3 => {
                let idx = ident_index(cs, instr.data)?;
                let c = pop(&mut args)?;
                let b = pop(&mut args)?;
                let a = pop(&mut args)?;
                cs.set_var_int_checked(
                    idx,
                    (a.get_int() << 16) | (b.get_int() << 8) | c.get_int(),
                )
                .map_err(Signal::Error)?;
            }
            Op::Fvar => {
                let idx = ident_index(cs, instr.data)?;
                if let IdentKind::Fvar(fv) = &cs.istate.identmap[idx].kind {
                    let mut v = Value::Float(fv.value);
                    force_value(&mut v, instr.ret);
                    args.push(v);
                } else {
                    return Err(InternalError::IdentKind(idx).into());
                }
            }
            Op::Fvar1 => {
                let idx = ident_index(cs, instr.data)?;
                let v = pop(&mut args)?;
                cs.set_var_float_checked(idx, v.get_float())
                    .map_err(Signal::Error)?;
            }
            Op::Print => {
                let idx = ident_index(cs, instr.data)?;
                cs.print_var(idx);
            }

            Op::Alias => {
                let idx = ident_index(cs, instr.data)?;
                let v = pop(&mut args)?;
                cs.set_alias(idx, v);
            }
            Op::AliasArg => {
                let idx = ident_index(cs, instr.data)?;
                let v = pop(&mut args)?;
                cs.set_arg(idx, v);
            }
            Op::AliasU => {
                let v = pop(&mut args)?;
                let name = pop(&mut args)?;
                cs.assign_value(&name.get_str(), v).map_err(Signal::Error)?;
            }

            Op::Local => {
                let numlocals = instr.data as usize;
                let offset = args
                    .len()
                    .checked_sub(numlocals)
                    .ok_or(InternalError::StackUnderflow)?;
                let locals: Vec<usize> = args[offset..]
                    .iter()
                    .map(|v| v.get_ident().unwrap_or(cs.istate.dummy_idx))
                    .collect();
                for &idx in &locals {
                    push_alias_frame(cs, idx);
                }
                let r = exec_from(cs, block, pc, result);
                for &idx in &locals {
                    pop_alias_frame(cs, idx);
                }
                return r;
            }

            Op::Do => {
                let v = pop(&mut args)?;
                if let Value::Code(code) = v {
                    exec(cs, &code, result)?;
                }
                force_value(result, instr.ret);
            }
            Op::DoArgs => {
                let v = pop(&mut args)?;
                if let Value::Code(code) = v {
                    call_with_args(cs, |cs| exec(cs, &code, result))?;
                }
                force_value(result, instr.ret);
            }

            Op::Jump => {
                pc += instr.data as usize;
            }
            Op::JumpB => {
                let v = pop(&mut args)?;
                if v.get_bool() == instr.flag_true() {
                    pc += instr.data as usize;
                }
            }
            Op::JumpResult => {
                let v = pop(&mut args)?;
                match v {
                    Value::Code(code) => exec(cs, &code, result)?,
                    other => *result = other,
                }
                if result.get_bool() == instr.flag_true() {
                    pc += instr.data as usize;
                }
            }
            Op::Break => {
                if cs.tstate.loop_level == 0 {
                    let what = if instr.flag_true() { "continue" } else { "break" };
                    return Err(Signal::Error(cs.error(format!("no loop to {what}"))));
                }
                return Err(if instr.flag_true() {
                    Signal::Continue
                } else {
                    Signal::Break
                });
            }

            Op::Conc | Op::ConcW => {
                let n = instr.data as usize;
                let at = args
                    .len()
                    .checked_sub(n)
                    .ok_or(InternalError::StackUnderflow)?;
                let sep = if instr.op == Op::Conc { " " } else { "" };
                let s = concat_values(&args[at..], sep);
                args.truncate(at);
                let mut v = Value::Str(Rc::from(s));
                force_value(&mut v, instr.ret);
                args.push(v);
            }
            Op::ConcM => {
                let n = instr.data as usize;
                let at = args
                    .len()
                    .checked_sub(n)
                    .ok_or(InternalError::StackUnderflow)?;
                let s = concat_values(&args[at..], "");
                args.truncate(at);
                *result = Value::Str(Rc::from(s));
                force_value(result, instr.ret);
            }

            Op::Com => {
                let idx = ident_index(cs, instr.data)?;
                let na = match &cs.istate.identmap[idx].kind {
                    IdentKind::Command(c) => c.num_args,
                    _ => return Err(InternalError::IdentKind(idx).into()),
                };
                let offset = args
                    .len()
                    .checked_sub(na)
                    .ok_or(InternalError::StackUnderflow)?;
                result.force_null();
                call_command(cs, idx, &mut args[offset..], result)?;
                force_value(result, instr.ret);
                args.truncate(offset);
            }
            Op::ComV => {
                let idx = ident_index(cs, instr.data >> 5)?;
                let callargs = (instr.data & 0x1f) as usize;
                let offset = args
                    .len()
                    .checked_sub(callargs)
                    .ok_or(InternalError::StackUnderflow)?;
                result.force_null();
                call_command(cs, idx, &mut args[offset..], result)?;
                force_value(result, instr.ret);
                args.truncate(offset);
            }
            Op::ComC => {
                let idx = ident_index(cs, instr.data >> 5)?;
                let callargs = (instr.data & 0x1f) as usize;
                let offset = args
                    .len()
                    .checked_sub(callargs)
                    .ok_or(InternalError::StackUnderflow)?;
                result.force_null();
                let mut tv = [Value::Str(Rc::from(concat_values(&args[offset..], " ")))];
                call_command(cs, idx, &mut tv, result)?;
                force_value(result, instr.ret);
                args.truncate(offset);
            }

            Op::Call | Op::CallArg => {
                let idx = ident_index(cs, instr.data >> 5)?;
                let callargs = (instr.data & 0x1f) as usize;
                let offset = args
                    .len()
                    .checked_sub(callargs)
                    .ok_or(InternalError::StackUnderflow)?;
                result.force_null();
                if instr.op == Op::Call
                    && cs.istate.identmap[idx].flags.contains(IdentFlags::UNKNOWN)
                {
                    force_value(result, instr.ret);
                    return Err(Signal::Error(cs.error(format!(
                        "unknown command: {}",
                        cs.istate.identmap[idx].name
                    ))));
                }
                if instr.op == Op::CallArg && !cs.is_arg_used(idx) {
                    args.truncate(offset);
                    force_value(result, instr.ret);
                    continue;
                }
                exec_alias(cs, idx, &mut args, offset, callargs, result, instr.ret, 0)?;
            }

            Op::CallU => {
                let callargs = instr.data as usize;
                let offset = args
                    .len()
                    .checked_sub(callargs)
                    .ok_or(InternalError::StackUnderflow)?;
                let head = offset.checked_sub(1).ok_or(InternalError::StackUnderflow)?;
                if !args[head].is_str() {
                    *result = args[head].take();
                    force_value(result, instr.ret);
                    args.truncate(head);
                    continue;
                }
                let name = args[head].get_str();
                match cs.get_ident(&name) {
                    None => {
                        if crate::parse::check_num(&name) {
                            *result = args[head].take();
                            force_value(result, instr.ret);
                            args.truncate(head);
                            continue;
                        }
                        result.force_null();
                        force_value(result, instr.ret);
                        return Err(Signal::Error(
                            cs.error(format!("unknown command: {name}")),
                        ));
                    }
                    Some(idx) => {
                        result.force_null();
                        match &cs.istate.identmap[idx].kind {
                            IdentKind::Command(c) if c.kind == CommandKind::Local => {
                                let mut locals = Vec::with_capacity(callargs);
                                for v in args[offset..].iter_mut() {
                                    locals.push(
                                        cs.force_ident(v).map_err(Signal::Error)?,
                                    );
                                }
                                for &l in &locals {
                                    push_alias_frame(cs, l);
                                }
                                let r = exec_from(cs, block, pc, result);
                                for &l in &locals {
                                    pop_alias_frame(cs, l);
                                }
                                return r;
                            }
                            IdentKind::Command(c) => {
                                if c.cb.is_none() {
                                    args.truncate(head);
                                    force_value(result, instr.ret);
                                    continue;
                                }
                                let mut cargs: Vec<Value> = args.drain(offset..).collect();
                                exec_command(cs, idx, &mut cargs, result, false)?;
                                force_value(result, instr.ret);
                                args.truncate(head);
                            }
                            IdentKind::Ivar(_) => {
                                if callargs == 0 {
                                    cs.print_var(idx);
                                } else {
                                    cs.set_var_int_multi(idx, &mut args[offset..])
                                        .map_err(Signal::Error)?;
                                }
                                args.truncate(head);
                                force_value(result, instr.ret);
                            }
                            IdentKind::Fvar(_) => {
                                if callargs == 0 {
                                    cs.print_var(idx);
                                } else {
                                    let v = args[offset].force_float();
                                    cs.set_var_float_checked(idx, v).map_err(Signal::Error)?;
                                }
                                args.truncate(head);
                                force_value(result, instr.ret);
                            }
                            IdentKind::Svar(_) => {
                                if callargs == 0 {
                                    cs.print_var(idx);
                                } else {
                                    let v = args[offset].force_str().to_owned();
                                    cs.set_var_str_checked(idx, &v).map_err(Signal::Error)?;
                                }
                                args.truncate(head);
                                force_value(result, instr.ret);
                            }
                            IdentKind::Alias(a) => {
                                if idx < MAX_ARGUMENTS && !cs.is_arg_used(idx) {
                                    args.truncate(head);
                                    force_value(result, instr.ret);
                                    continue;
                                }
                                if a.value.is_null() {
                                    force_value(result, instr.ret);
                                    return Err(Signal::Error(
                                        cs.error(format!("unknown command: {name}")),
                                    ));
                                }
                                exec_alias(
                                    cs, idx, &mut args, offset, callargs, result, instr.ret,
                                    1,
                                )?;
                            }
                        }
                    }
                }
            }
        }
    }
}

fn default_for(ret: RetType) -> Value {
    match ret {
        RetType::Null => Value::Null,
        RetType::Int => Value::Int(0),
        RetType::Float => Value::Float(0.0),
        RetType::Str => Value::Str(Rc::from("")),
    }
}

/// `LookupU`: resolve the name on top of the stack with full ident
/// dispatch.
fn lookup_unknown(cs: &mut CsState, args: &mut Vec<Value>, ret: RetType) -> RunResult<()> {
    let top = args.last_mut().ok_or(InternalError::StackUnderflow)?;
    let name = match top {
        Value::Str(s) => s.to_string(),
        _ => return Ok(()),
    };
    let Some(idx) = cs.get_ident(&name) else {
        return Err(Signal::Error(
            cs.error(format!("unknown alias lookup: {name}")),
        ));
    };
    let replacement = match &cs.istate.identmap[idx].kind {
        IdentKind::Alias(a) => {
            if cs.istate.identmap[idx].flags.contains(IdentFlags::UNKNOWN) {
                return Err(Signal::Error(
                    cs.error(format!("unknown alias lookup: {name}")),
                ));
            }
            if idx < MAX_ARGUMENTS && !cs.is_arg_used(idx) {
                default_for(ret)
            } else {
                let mut v = a.value.get_val();
                force_value(&mut v, ret);
                v
            }
        }
        IdentKind::Svar(sv) => {
            let mut v = Value::Str(sv.value.clone());
            force_value(&mut v, ret);
            v
        }
        IdentKind::Ivar(iv) => {
            let mut v = Value::Int(iv.value);
            force_value(&mut v, ret);
            v
        }
        IdentKind::Fvar(fv) => {
            let mut v = Value::Float(fv.value);
            force_value(&mut v, ret);
            v
        }
        IdentKind::Command(c) if c.kind == CommandKind::Normal && c.cb.is_some() => {
            let mut res = Value::Null;
            let mut cargs: Vec<Value> = Vec::new();
            exec_command(cs, idx, &mut cargs, &mut res, true)?;
            force_value(&mut res, ret);
            res
        }
        IdentKind::Command(_) => default_for(ret),
    };
    *args.last_mut().ok_or(InternalError::StackUnderflow)? = replacement;
    Ok(())
}

/// Invoke a command, coercing the provided arguments against its
/// argument type string and materializing defaults for missing ones.
pub(crate) fn exec_command(
    cs: &mut CsState,
    idx: usize,
    args: &mut Vec<Value>,
    result: &mut Value,
    lookup: bool,
) -> RunResult<()> {
    let (fmt, self_idx) = match &cs.istate.identmap[idx].kind {
        IdentKind::Command(c) => (c.args.clone(), idx),
        _ => return Err(InternalError::IdentKind(idx).into()),
    };
    let numargs = args.len();
    let b = fmt.as_bytes();
    let mut i: isize = -1;
    let mut fakeargs = 0usize;
    let mut rep = false;
    let mut fi = 0usize;

    // make sure slot `i` exists before writing a default into it
    fn slot(args: &mut Vec<Value>, i: isize) -> &mut Value {
        let i = i as usize;
        while args.len() <= i {
            args.push(Value::Null);
        }
        &mut args[i]
    }

    while fi < b.len() {
        match b[fi] {
            b'i' => {
                i += 1;
                if i as usize >= numargs {
                    if !rep {
                        *slot(args, i) = Value::Int(0);
                        fakeargs += 1;
                    }
                } else {
                    args[i as usize].force_int();
                }
                fi += 1;
            }
            b'b' => {
                i += 1;
                if i as usize >= numargs {
                    if !rep {
                        *slot(args, i) = Value::Int(i64::MIN);
                        fakeargs += 1;
                    }
                } else {
                    args[i as usize].force_int();
                }
                fi += 1;
            }
            b'f' => {
                i += 1;
                if i as usize >= numargs {
                    if !rep {
                        *slot(args, i) = Value::Float(0.0);
                        fakeargs += 1;
                    }
                } else {
                    args[i as usize].force_float();
                }
                fi += 1;
            }
            b'F' => {
                i += 1;
                if i as usize >= numargs {
                    if !rep {
                        let prev = if i > 0 {
                            args[(i - 1) as usize].get_float()
                        } else {
                            0.0
                        };
                        *slot(args, i) = Value::Float(prev);
                        fakeargs += 1;
                    }
                } else {
                    args[i as usize].force_float();
                }
                fi += 1;
            }
            b's' => {
                i += 1;
                if i as usize >= numargs {
                    if !rep {
                        *slot(args, i) = Value::Str(Rc::from(""));
                        fakeargs += 1;
                    }
                } else {
                    args[i as usize].force_str();
                }
                fi += 1;
            }
            b't' | b'T' => {
                i += 1;
                if i as usize >= numargs && !rep {
                    *slot(args, i) = Value::Null;
                    fakeargs += 1;
                }
                fi += 1;
            }
            b'E' => {
                i += 1;
                if i as usize >= numargs {
                    if !rep {
                        *slot(args, i) = Value::Null;
                        fakeargs += 1;
                    }
                } else {
                    force_cond(cs, &mut args[i as usize])?;
                }
                fi += 1;
            }
            b'e' => {
                i += 1;
                if i as usize >= numargs {
                    if !rep {
                        *slot(args, i) =
                            Value::Code(cs.istate.empties.get(RetType::Null));
                        fakeargs += 1;
                    }
                } else {
                    force_code(cs, &mut args[i as usize])?;
                }
                fi += 1;
            }
            b'r' => {
                i += 1;
                if i as usize >= numargs {
                    if !rep {
                        *slot(args, i) = Value::Ident(cs.istate.dummy_idx);
                        fakeargs += 1;
                    }
                } else {
                    cs.force_ident(&mut args[i as usize]).map_err(Signal::Error)?;
                }
                fi += 1;
            }
            b'$' => {
                i += 1;
                *slot(args, i) = Value::Ident(self_idx);
                fi += 1;
            }
            b'N' => {
                i += 1;
                let n = if lookup { -1 } else { i - fakeargs as isize };
                *slot(args, i) = Value::Int(n as i64);
                fi += 1;
            }
            b'C' => {
                let n = ((i + 1).max(numargs as isize)) as usize;
                while args.len() < n {
                    args.push(Value::Null);
                }
                let mut tv = [Value::Str(Rc::from(concat_values(&args[..n], " ")))];
                return call_command(cs, idx, &mut tv, result);
            }
            b'V' => {
                let n = ((i + 1).max(numargs as isize)) as usize;
                while args.len() < n {
                    args.push(Value::Null);
                }
                return call_command(cs, idx, &mut args[..n], result);
            }
            d @ b'1'..=b'4' => {
                if (i + 1) < numargs as isize {
                    fi -= (d - b'0') as usize;
                    rep = true;
                } else {
                    fi += 1;
                }
            }
            _ => fi += 1,
        }
    }
    i += 1;
    let n = i as usize;
    while args.len() < n {
        args.push(Value::Null);
    }
    call_command(cs, idx, &mut args[..n], result)
}

/// `E`-spec coercion: nonempty strings compile to code, empty strings
/// become null.
fn force_cond(cs: &mut CsState, v: &mut Value) -> RunResult<()> {
    if let Value::Str(s) = v {
        if s.is_empty() {
            *v = Value::Null;
        } else {
            let src = s.to_string();
            let code = gen::compile_main(cs, &src, "").map_err(Signal::Error)?;
            *v = Value::Code(code);
        }
    }
    Ok(())
}

/// `e`-spec coercion: anything not already code compiles its string
/// form.
fn force_code(cs: &mut CsState, v: &mut Value) -> RunResult<()> {
    if !v.is_code() {
        let src = v.get_str();
        let code = gen::compile_main(cs, &src, "").map_err(Signal::Error)?;
        *v = Value::Code(code);
    }
    Ok(())
}

/// Invoke an alias body with `callargs` arguments taken from
/// `args[offset..]`.
///
/// The protocol of the call: bind the arguments into the `argN` alias
/// slots, save and set `numargs`, inherit the overridden flag, push a
/// call frame, compile the body on first use, and recurse. Cleanup runs
/// on every exit path: frames popped, `numargs` and flags restored,
/// argument slots unbound (including ones marked used during the
/// call), and the result coerced to the call's return tag.
#[allow(clippy::too_many_arguments)]
pub(crate) fn exec_alias(
    cs: &mut CsState,
    idx: usize,
    args: &mut Vec<Value>,
    offset: usize,
    callargs: usize,
    result: &mut Value,
    ret: RetType,
    skip: usize,
) -> RunResult<()> {
    trace!(alias = %cs.istate.identmap[idx].name, callargs, "calling alias");
    for i in 0..callargs {
        let v = args[offset + i].take();
        if let Some(a) = cs.istate.identmap[i].alias_mut() {
            a.push(v);
        }
    }
    let numargs_idx = cs.istate.numargs_idx;
    let old_numargs = cs.ivar_value(numargs_idx);
    cs.set_ivar_raw(numargs_idx, callargs as i64);
    let old_flags = cs.tstate.ident_flags;
    cs.tstate.ident_flags |=
        cs.istate.identmap[idx].flags & IdentFlags::OVERRIDDEN;
    cs.tstate.callstack.push(CallFrame {
        ident: idx,
        usedargs: (1u32 << callargs) - 1,
    });

    let code = match cs.istate.identmap[idx]
        .alias()
        .and_then(|a| a.cached_code().cloned())
    {
        Some(code) => Ok(code),
        None => {
            let src = cs.istate.identmap[idx]
                .alias()
                .map(|a| a.value.get_str())
                .unwrap_or_default();
            gen::compile_main(cs, &src, "").map(|code| {
                if let Some(a) = cs.istate.identmap[idx].alias_mut() {
                    a.cache_code(code.clone());
                }
                code
            })
        }
    };
    let r = match code {
        Ok(code) => exec(cs, &code, result),
        Err(e) => Err(Signal::Error(e)),
    };

    let frame = cs.tstate.callstack.pop();
    cs.tstate.ident_flags = old_flags;
    for i in 0..callargs {
        if let Some(a) = cs.istate.identmap[i].alias_mut() {
            a.pop();
        }
    }
    if let Some(frame) = frame {
        let mut mask = frame.usedargs & (!0u32).checked_shl(callargs as u32).unwrap_or(0);
        let mut i = callargs;
        while mask != 0 {
            if mask & (1 << i) != 0 {
                if let Some(a) = cs.istate.identmap[i].alias_mut() {
                    a.pop();
                }
                mask &= !(1 << i);
            }
            i += 1;
        }
    }
    force_value(result, ret);
    cs.set_ivar_raw(numargs_idx, old_numargs);
    args.truncate(offset - skip);
    r
}

/// Run a body with the caller's argument bindings restored, for
/// `doargs`: the current frame's argument values are undone for the
/// duration and redone afterwards, and argument usage recorded during
/// the body propagates to the parent frame.
pub(crate) fn call_with_args<F>(cs: &mut CsState, body: F) -> RunResult<()>
where
    F: FnOnce(&mut CsState) -> RunResult<()>,
{
    if cs.tstate.callstack.is_empty() {
        return body(cs);
    }
    let top = *cs.tstate.callstack.last().expect("checked nonempty");
    let mut saved: Vec<(usize, Value)> = Vec::new();
    // only the reserved argument slots carry undoable bindings
    let mut mask = top.usedargs & ((1u32 << MAX_ARGUMENTS) - 1);
    let mut i = 0usize;
    while mask != 0 {
        if mask & 1 != 0 {
            if let Some(a) = cs.istate.identmap[i].alias_mut() {
                if let Some(cur) = a.undo() {
                    saved.push((i, cur));
                }
            }
        }
        mask >>= 1;
        i += 1;
    }
    let depth = cs.tstate.callstack.len();
    let parent_used = if depth >= 2 {
        cs.tstate.callstack[depth - 2].usedargs
    } else {
        u32::MAX
    };
    cs.tstate.callstack.push(CallFrame {
        ident: top.ident,
        usedargs: parent_used,
    });

    let r = body(cs);

    let fin = cs
        .tstate
        .callstack
        .pop()
        .map(|f| f.usedargs)
        .unwrap_or(u32::MAX);
    if depth >= 2 {
        cs.tstate.callstack[depth - 2].usedargs = fin;
    }
    for (i, cur) in saved {
        if let Some(a) = cs.istate.identmap[i].alias_mut() {
            a.redo(cur);
        }
    }
    r
}

/// Invoke an identifier with positional arguments, dispatching on its
/// kind the way the runtime call instructions do.
pub(crate) fn run_ident(
    cs: &mut CsState,
    idx: usize,
    mut args: Vec<Value>,
    result: &mut Value,
) -> RunResult<()> {
    result.force_null();
    if cs.tstate.run_depth >= cs.tstate.max_run_depth {
        return Err(Signal::Error(cs.error("exceeded recursion limit")));
    }
    cs.tstate.run_depth += 1;
    let r = run_ident_inner(cs, idx, &mut args, result);
    cs.tstate.run_depth -= 1;
    r
}

fn run_ident_inner(
    cs: &mut CsState,
    idx: usize,
    args: &mut Vec<Value>,
    result: &mut Value,
) -> RunResult<()> {
    match &cs.istate.identmap[idx].kind {
        IdentKind::Command(c) => {
            if c.cb.is_none() {
                return Ok(());
            }
            exec_command(cs, idx, args, result, false)
        }
        IdentKind::Ivar(_) => {
            if args.is_empty() {
                cs.print_var(idx);
                Ok(())
            } else {
                cs.set_var_int_multi(idx, args).map_err(Signal::Error)
            }
        }
        IdentKind::Fvar(_) => {
            if args.is_empty() {
                cs.print_var(idx);
                Ok(())
            } else {
                let v = args[0].force_float();
                cs.set_var_float_checked(idx, v).map_err(Signal::Error)
            }
        }
        IdentKind::Svar(_) => {
            if args.is_empty() {
                cs.print_var(idx);
                Ok(())
            } else {
                let v = args[0].force_str().to_owned();
                cs.set_var_str_checked(idx, &v).map_err(Signal::Error)
            }
        }
        IdentKind::Alias(a) => {
            if idx < MAX_ARGUMENTS && !cs.is_arg_used(idx) {
                return Ok(());
            }
            if a.value.is_null() {
                return Ok(());
            }
            let callargs = args.len().min(MAX_ARGUMENTS);
            exec_alias(cs, idx, args, 0, callargs, result, RetType::Null, 0)
        }
    }
}
