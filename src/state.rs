//! Interpreter state
//!
//! [`CsState`] is the embedder-facing interpreter. Internally it
//! composes the shared [`InternalState`] (identifier table, string
//! pool, empty-block sentinels, well-known indices) with the
//! [`ThreadState`] bookkeeping the VM mutates while running (call
//! stack, flag mask, depth counters, hook). Only one thread of control
//! ever executes against a state; native commands re-enter through
//! `&mut CsState`.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::bcode::{CodeRef, EmptyBlocks};
use crate::consts::{
    DEFAULT_DBGALIAS, DEFAULT_MAX_RUN_DEPTH, DUMMY_NAME, MAX_ARGUMENTS, MAX_DBGALIAS,
};
use crate::error::{CsError, CsResult, RunResult, Signal, StackNode};
use crate::gen;
use crate::ident::{
    Alias, Command, CommandFn, CommandKind, FloatVar, HookFn, Ident, IdentFlags, IdentKind,
    IntVar, PrintFn, StrVar, VarFn,
};
use crate::parse::{check_num, is_valid_name};
use crate::strpool::StringPool;
use crate::value::{float_to_str, int_to_str, Value};
use crate::vm;

/// One alias call frame: the called ident plus the bitset of argument
/// slots observed during the call.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    pub ident: usize,
    pub usedargs: u32,
}

/// Outcome of driving a code block through [`CsState::run_loop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// The body ran to completion.
    Normal,
    /// The body executed `break`.
    Break,
    /// The body executed `continue`.
    Continue,
}

/// State shared by every thread context of one interpreter: the name
/// table, the string pool, and the shared empty blocks.
pub(crate) struct InternalState {
    pub idents: FxHashMap<Rc<str>, usize>,
    pub identmap: Vec<Ident>,
    pub strpool: StringPool,
    pub empties: EmptyBlocks,
    pub dummy_idx: usize,
    pub numargs_idx: usize,
    pub dbgalias_idx: usize,
    pub var_printer: PrintFn,
}

/// Per-thread execution bookkeeping.
pub(crate) struct ThreadState {
    pub callstack: Vec<CallFrame>,
    /// Flag mask ORed into aliases on assignment; the `OVERRIDDEN` bit
    /// doubles as override mode, `PERSIST` as persist mode.
    pub ident_flags: IdentFlags,
    pub max_run_depth: usize,
    pub run_depth: usize,
    pub loop_level: usize,
    pub call_hook: Option<HookFn>,
}

/// An embeddable script interpreter instance.
pub struct CsState {
    pub(crate) istate: InternalState,
    pub(crate) tstate: ThreadState,
}

impl Default for CsState {
    fn default() -> Self {
        Self::new()
    }
}

impl CsState {
    /// Create an interpreter with the reserved argument aliases, the
    /// builtin variables, the compiler keywords, and the standard
    /// library registered.
    pub fn new() -> Self {
        let mut cs = Self::new_bare();
        crate::stdlib::init(&mut cs).expect("builtin library registration is infallible");
        cs
    }

    /// Create an interpreter with only the core identifiers (argument
    /// aliases, `numargs`, `dbgalias`, the compiler keywords); no
    /// standard library.
    pub fn new_bare() -> Self {
        let mut cs = CsState {
            istate: InternalState {
                idents: FxHashMap::default(),
                identmap: Vec::new(),
                strpool: StringPool::new(),
                empties: EmptyBlocks::new(),
                dummy_idx: 0,
                numargs_idx: 0,
                dbgalias_idx: 0,
                var_printer: Rc::new(default_var_printer),
            },
            tstate: ThreadState {
                callstack: Vec::new(),
                ident_flags: IdentFlags::empty(),
                max_run_depth: DEFAULT_MAX_RUN_DEPTH,
                run_depth: 0,
                loop_level: 0,
                call_hook: None,
            },
        };
        cs.init_core();
        cs
    }

    fn init_core(&mut self) {
        for i in 0..MAX_ARGUMENTS {
            let name = format!("arg{}", i + 1);
            self.add_ident(
                &name,
                IdentFlags::ARG,
                IdentKind::Alias(Alias::default()),
            );
        }
        self.istate.dummy_idx = self.add_ident(
            DUMMY_NAME,
            IdentFlags::UNKNOWN,
            IdentKind::Alias(Alias::default()),
        );
        self.istate.numargs_idx = self.add_ident(
            "numargs",
            IdentFlags::READ_ONLY,
            IdentKind::Ivar(IntVar {
                value: 0,
                min: i64::MIN,
                max: i64::MAX,
                override_val: 0,
                cb: None,
            }),
        );
        self.istate.dbgalias_idx = self.add_ident(
            "dbgalias",
            IdentFlags::empty(),
            IdentKind::Ivar(IntVar {
                value: DEFAULT_DBGALIAS,
                min: 0,
                max: MAX_DBGALIAS,
                override_val: DEFAULT_DBGALIAS,
                cb: None,
            }),
        );
        self.keyword("do", "e", CommandKind::Do, |cs, args, res| {
            match args[0].get_code() {
                Some(code) => {
                    let code = code.clone();
                    cs.run_code_into(&code, res)
                }
                None => Ok(()),
            }
        });
        self.keyword("doargs", "e", CommandKind::DoArgs, |cs, args, res| {
            match args[0].get_code() {
                Some(code) => {
                    let code = code.clone();
                    vm::call_with_args(cs, |cs| cs.run_code_into(&code, res))
                }
                None => Ok(()),
            }
        });
        self.keyword("if", "tee", CommandKind::If, |cs, args, res| {
            let branch = if args[0].get_bool() { 1 } else { 2 };
            match args[branch].get_code() {
                Some(code) => {
                    let code = code.clone();
                    cs.run_code_into(&code, res)
                }
                None => Ok(()),
            }
        });
        self.keyword("result", "t", CommandKind::Result, |_, args, res| {
            *res = args[0].take();
            Ok(())
        });
        self.keyword("!", "t", CommandKind::Not, |_, args, res| {
            *res = Value::Int(i64::from(!args[0].get_bool()));
            Ok(())
        });
        self.keyword("&&", "E1V", CommandKind::And, |cs, args, res| {
            if args.is_empty() {
                *res = Value::Int(1);
                return Ok(());
            }
            for arg in args.iter_mut() {
                match arg.get_code() {
                    Some(code) => {
                        let code = code.clone();
                        cs.run_code_into(&code, res)?;
                    }
                    None => *res = arg.take(),
                }
                if !res.get_bool() {
                    break;
                }
            }
            Ok(())
        });
        self.keyword("||", "E1V", CommandKind::Or, |cs, args, res| {
            if args.is_empty() {
                *res = Value::Int(0);
                return Ok(());
            }
            for arg in args.iter_mut() {
                match arg.get_code() {
                    Some(code) => {
                        let code = code.clone();
                        cs.run_code_into(&code, res)?;
                    }
                    None => *res = arg.take(),
                }
                if res.get_bool() {
                    break;
                }
            }
            Ok(())
        });
        let local = Command {
            args: Rc::from(""),
            num_args: 0,
            kind: CommandKind::Local,
            cb: None,
        };
        self.add_ident("local", IdentFlags::empty(), IdentKind::Command(local));
        self.keyword("break", "", CommandKind::Break, |cs, _, _| {
            if cs.tstate.loop_level > 0 {
                Err(Signal::Break)
            } else {
                Err(Signal::Error(cs.error("no loop to break")))
            }
        });
        self.keyword("continue", "", CommandKind::Continue, |cs, _, _| {
            if cs.tstate.loop_level > 0 {
                Err(Signal::Continue)
            } else {
                Err(Signal::Error(cs.error("no loop to continue")))
            }
        });
    }

    fn keyword<F>(&mut self, name: &str, args: &str, kind: CommandKind, cb: F) -> usize
    where
        F: Fn(&mut CsState, &mut [Value], &mut Value) -> RunResult<()> + 'static,
    {
        let num_args = count_args(args).expect("keyword argument strings are well formed");
        let cb: CommandFn = Rc::new(cb);
        let cmd = Command {
            args: Rc::from(args),
            num_args,
            kind,
            cb: Some(cb),
        };
        self.add_ident(name, IdentFlags::empty(), IdentKind::Command(cmd))
    }

    fn add_ident(&mut self, name: &str, flags: IdentFlags, kind: IdentKind) -> usize {
        let name = self.istate.strpool.intern(name);
        let index = self.istate.identmap.len();
        self.istate
            .identmap
            .push(Ident::new(name.clone(), flags, index, kind));
        self.istate.idents.insert(name, index);
        index
    }

    /* ident table access */

    /// Look up an identifier index by name.
    pub fn get_ident(&self, name: &str) -> Option<usize> {
        self.istate.idents.get(name).copied()
    }

    /// Borrow an identifier table entry.
    pub fn ident(&self, index: usize) -> &Ident {
        &self.istate.identmap[index]
    }

    /// Whether a name is bound at all.
    pub fn have_ident(&self, name: &str) -> bool {
        self.istate.idents.contains_key(name)
    }

    /// Number of identifier table entries.
    pub fn ident_count(&self) -> usize {
        self.istate.identmap.len()
    }

    /// Resolve a name to an ident index, creating an unknown alias if
    /// the name is unbound. Fails on names that lex as numbers.
    pub fn new_ident(&mut self, name: &str, flags: IdentFlags) -> CsResult<usize> {
        if let Some(idx) = self.get_ident(name) {
            return Ok(idx);
        }
        if !is_valid_name(name) {
            return Err(self.error(format!("'{name}' is not a valid identifier name")));
        }
        Ok(self.add_ident(name, flags, IdentKind::Alias(Alias::default())))
    }

    /// Coerce a value into an ident reference in place, creating the
    /// ident for string values and falling back to the dummy ident.
    pub fn force_ident(&mut self, v: &mut Value) -> CsResult<usize> {
        match v {
            Value::Ident(i) => Ok(*i),
            Value::Str(s) => {
                let name = s.to_string();
                let idx = self.new_ident(&name, IdentFlags::UNKNOWN)?;
                *v = Value::Ident(idx);
                Ok(idx)
            }
            _ => {
                let idx = self.istate.dummy_idx;
                *v = Value::Ident(idx);
                Ok(idx)
            }
        }
    }

    /// Whether the given argument-slot ident was supplied or touched in
    /// the current call frame. Outside any call every slot counts as
    /// used.
    pub fn is_arg_used(&self, index: usize) -> bool {
        match self.tstate.callstack.last() {
            None => true,
            Some(frame) => frame.usedargs & (1 << index) != 0,
        }
    }

    /* registration API */

    /// Register an integer variable.
    pub fn new_ivar(
        &mut self,
        name: &str,
        min: i64,
        max: i64,
        value: i64,
        flags: IdentFlags,
        cb: Option<VarFn>,
    ) -> CsResult<usize> {
        self.check_new_var(name)?;
        Ok(self.add_ident(
            name,
            flags,
            IdentKind::Ivar(IntVar {
                value,
                min,
                max,
                override_val: value,
                cb,
            }),
        ))
    }

    /// Register a float variable.
    pub fn new_fvar(
        &mut self,
        name: &str,
        min: f64,
        max: f64,
        value: f64,
        flags: IdentFlags,
        cb: Option<VarFn>,
    ) -> CsResult<usize> {
        self.check_new_var(name)?;
        Ok(self.add_ident(
            name,
            flags,
            IdentKind::Fvar(FloatVar {
                value,
                min,
                max,
                override_val: value,
                cb,
            }),
        ))
    }

    /// Register a string variable.
    pub fn new_svar(
        &mut self,
        name: &str,
        value: &str,
        flags: IdentFlags,
        cb: Option<VarFn>,
    ) -> CsResult<usize> {
        self.check_new_var(name)?;
        let value = self.istate.strpool.intern(value);
        Ok(self.add_ident(
            name,
            flags,
            IdentKind::Svar(StrVar {
                override_val: value.clone(),
                value,
                cb,
            }),
        ))
    }

    fn check_new_var(&self, name: &str) -> CsResult<()> {
        if self.have_ident(name) {
            return Err(self.error(format!("redefinition of ident '{name}'")));
        }
        if !is_valid_name(name) {
            return Err(self.error(format!("'{name}' is not a valid variable name")));
        }
        Ok(())
    }

    /// Register a native command. The argument type string is validated
    /// against the formal grammar (`sibfFtTEeNr$CV` plus repeat
    /// digits).
    pub fn new_command<F>(&mut self, name: &str, args: &str, cb: F) -> CsResult<usize>
    where
        F: Fn(&mut CsState, &mut [Value], &mut Value) -> RunResult<()> + 'static,
    {
        if self.have_ident(name) {
            return Err(self.error(format!("redefinition of ident '{name}'")));
        }
        if !is_valid_name(name) {
            return Err(self.error(format!("'{name}' is not a valid command name")));
        }
        let num_args = count_args(args)
            .ok_or_else(|| self.error(format!("malformed argument string '{args}'")))?;
        let cb: CommandFn = Rc::new(cb);
        let cmd = Command {
            args: Rc::from(args),
            num_args,
            kind: CommandKind::Normal,
            cb: Some(cb),
        };
        Ok(self.add_ident(name, IdentFlags::empty(), IdentKind::Command(cmd)))
    }

    /// Create or replace an alias binding.
    pub fn new_alias(&mut self, name: &str, v: Value) -> CsResult<()> {
        self.assign_value(name, v)
    }

    /// Assign a value by name with full dispatch: aliases are set,
    /// variables go through the checked setters, builtins refuse.
    pub fn assign_value(&mut self, name: &str, v: Value) -> CsResult<()> {
        match self.get_ident(name) {
            Some(idx) => match &self.istate.identmap[idx].kind {
                IdentKind::Alias(_) => {
                    if idx < MAX_ARGUMENTS {
                        self.set_arg(idx, v);
                    } else {
                        self.set_alias(idx, v);
                    }
                    Ok(())
                }
                IdentKind::Ivar(_) => self.set_var_int_checked(idx, v.get_int()),
                IdentKind::Fvar(_) => self.set_var_float_checked(idx, v.get_float()),
                IdentKind::Svar(_) => {
                    let s = v.get_str();
                    self.set_var_str_checked(idx, &s)
                }
                IdentKind::Command(_) => {
                    Err(self.error(format!("cannot redefine builtin {name} with an alias")))
                }
            },
            None => {
                if check_num(name) {
                    return Err(self.error(format!("cannot alias number {name}")));
                }
                let flags = self.tstate.ident_flags;
                self.add_ident(name, flags, IdentKind::Alias(Alias::with_value(v)));
                Ok(())
            }
        }
    }

    /// Replace an alias value, invalidating its cached bytecode and
    /// restamping its flags from the thread mask.
    pub(crate) fn set_alias(&mut self, index: usize, v: Value) {
        let flags = self.tstate.ident_flags;
        let id = &mut self.istate.identmap[index];
        if let IdentKind::Alias(a) = &mut id.kind {
            a.set_value(v);
            id.flags = flags;
        }
    }

    /// Assign an argument-slot alias: rebinds in place when the slot is
    /// already used by the current frame, otherwise pushes a frame and
    /// marks the slot used.
    pub(crate) fn set_arg(&mut self, index: usize, v: Value) {
        let used = self.is_arg_used(index);
        if let IdentKind::Alias(a) = &mut self.istate.identmap[index].kind {
            if used {
                a.set_value(v);
            } else {
                a.push(v);
                if let Some(frame) = self.tstate.callstack.last_mut() {
                    frame.usedargs |= 1 << index;
                }
            }
        }
    }

    /// Push a shadowing value onto an alias, clearing the unknown flag
    /// the way assignment does. Used by the loop drivers, `push`, and
    /// `local`.
    pub(crate) fn alias_push(&mut self, index: usize, v: Value) {
        let id = &mut self.istate.identmap[index];
        id.flags.remove(IdentFlags::UNKNOWN);
        if let Some(a) = id.alias_mut() {
            a.push(v);
        }
    }

    /// Replace an alias value shadowed by [`CsState::alias_push`]
    /// without touching flags.
    pub(crate) fn alias_replace(&mut self, index: usize, v: Value) {
        if let Some(a) = self.istate.identmap[index].alias_mut() {
            a.set_value(v);
        }
    }

    /// Undo the most recent [`CsState::alias_push`].
    pub(crate) fn alias_pop(&mut self, index: usize) {
        if let Some(a) = self.istate.identmap[index].alias_mut() {
            a.pop();
        }
    }

    /* override handling */

    fn override_flags(&self, index: usize) -> CsResult<(bool, bool)> {
        let id = &self.istate.identmap[index];
        let wants = self.tstate.ident_flags.contains(IdentFlags::OVERRIDDEN)
            || id.flags.contains(IdentFlags::OVERRIDE);
        if wants && id.flags.contains(IdentFlags::PERSIST) {
            return Err(self.error(format!(
                "cannot override persistent variable '{}'",
                id.name
            )));
        }
        Ok((wants, id.flags.contains(IdentFlags::OVERRIDDEN)))
    }

    /// Restore the pre-override value of a variable, or reset an alias
    /// to the empty string. Idents without a held override are left
    /// alone.
    pub fn clear_override(&mut self, index: usize) {
        if !self.istate.identmap[index]
            .flags
            .contains(IdentFlags::OVERRIDDEN)
        {
            return;
        }
        let empty = self.istate.strpool.intern("");
        let id = &mut self.istate.identmap[index];
        id.flags.remove(IdentFlags::OVERRIDDEN);
        let notify = match &mut id.kind {
            IdentKind::Alias(a) => {
                a.set_value(Value::Str(empty));
                false
            }
            IdentKind::Ivar(v) => {
                v.value = v.override_val;
                true
            }
            IdentKind::Fvar(v) => {
                v.value = v.override_val;
                true
            }
            IdentKind::Svar(v) => {
                v.value = v.override_val.clone();
                true
            }
            IdentKind::Command(_) => false,
        };
        if notify {
            Ident::changed(self, index);
        }
    }

    /// Clear every held override.
    pub fn clear_overrides(&mut self) {
        for index in 0..self.istate.identmap.len() {
            self.clear_override(index);
        }
    }

    /// Clear the override of a named ident; errors when the name is
    /// unbound or read-only.
    pub fn reset_value(&mut self, name: &str) -> CsResult<()> {
        let idx = self
            .get_ident(name)
            .ok_or_else(|| self.error(format!("variable {name} does not exist")))?;
        if self.istate.identmap[idx].flags.contains(IdentFlags::READ_ONLY) {
            return Err(self.error(format!("variable {name} is read only")));
        }
        self.clear_override(idx);
        Ok(())
    }

    /* checked var setters */

    /// Set an integer variable through the checked path: read-only
    /// check, override snapshot, range clamp (clamping sets the value
    /// and still reports the range error), change callback.
    pub fn set_var_int_checked(&mut self, index: usize, v: i64) -> CsResult<()> {
        if self.istate.identmap[index]
            .flags
            .contains(IdentFlags::READ_ONLY)
        {
            let name = self.istate.identmap[index].name.clone();
            return Err(self.error(format!("variable '{name}' is read only")));
        }
        let (wants, held) = self.override_flags(index)?;
        let (min, max, hex, name) = match &self.istate.identmap[index].kind {
            IdentKind::Ivar(iv) => (
                iv.min,
                iv.max,
                self.istate.identmap[index].flags.contains(IdentFlags::HEX),
                self.istate.identmap[index].name.clone(),
            ),
            _ => return Ok(()),
        };
        let clamped = v.clamp(min, max);
        {
            let id = &mut self.istate.identmap[index];
            if let IdentKind::Ivar(iv) = &mut id.kind {
                if wants && !held {
                    iv.override_val = iv.value;
                    id.flags.insert(IdentFlags::OVERRIDDEN);
                } else if !wants {
                    id.flags.remove(IdentFlags::OVERRIDDEN);
                }
                iv.value = clamped;
            }
        }
        Ident::changed(self, index);
        if clamped != v {
            return Err(self.error(if hex {
                format!("valid range for '{name}' is {min}..{max:#X}")
            } else {
                format!("valid range for '{name}' is {min}..{max}")
            }));
        }
        Ok(())
    }

    /// As [`CsState::set_var_int_checked`] from a span of values; HEX
    /// variables pack up to three 8-bit colour fields.
    pub fn set_var_int_multi(&mut self, index: usize, args: &mut [Value]) -> CsResult<()> {
        let mut v = args[0].force_int();
        if self.istate.identmap[index].flags.contains(IdentFlags::HEX) && args.len() > 1 {
            v = (v << 16) | (args[1].force_int() << 8);
            if args.len() > 2 {
                v |= args[2].force_int();
            }
        }
        self.set_var_int_checked(index, v)
    }

    /// Set a float variable through the checked path.
    pub fn set_var_float_checked(&mut self, index: usize, v: f64) -> CsResult<()> {
        if self.istate.identmap[index]
            .flags
            .contains(IdentFlags::READ_ONLY)
        {
            let name = self.istate.identmap[index].name.clone();
            return Err(self.error(format!("variable '{name}' is read only")));
        }
        let (wants, held) = self.override_flags(index)?;
        let (min, max, name) = match &self.istate.identmap[index].kind {
            IdentKind::Fvar(fv) => (fv.min, fv.max, self.istate.identmap[index].name.clone()),
            _ => return Ok(()),
        };
        let clamped = v.clamp(min, max);
        {
            let id = &mut self.istate.identmap[index];
            if let IdentKind::Fvar(fv) = &mut id.kind {
                if wants && !held {
                    fv.override_val = fv.value;
                    id.flags.insert(IdentFlags::OVERRIDDEN);
                } else if !wants {
                    id.flags.remove(IdentFlags::OVERRIDDEN);
                }
                fv.value = clamped;
            }
        }
        Ident::changed(self, index);
        if clamped != v {
            return Err(self.error(format!(
                "valid range for '{name}' is {}..{}",
                float_to_str(min),
                float_to_str(max)
            )));
        }
        Ok(())
    }

    /// Set a string variable through the checked path.
    pub fn set_var_str_checked(&mut self, index: usize, v: &str) -> CsResult<()> {
        if self.istate.identmap[index]
            .flags
            .contains(IdentFlags::READ_ONLY)
        {
            let name = self.istate.identmap[index].name.clone();
            return Err(self.error(format!("variable '{name}' is read only")));
        }
        let (wants, held) = self.override_flags(index)?;
        let interned = self.istate.strpool.intern(v);
        {
            let id = &mut self.istate.identmap[index];
            if let IdentKind::Svar(sv) = &mut id.kind {
                if wants && !held {
                    sv.override_val = sv.value.clone();
                    id.flags.insert(IdentFlags::OVERRIDDEN);
                } else if !wants {
                    id.flags.remove(IdentFlags::OVERRIDDEN);
                }
                sv.value = interned;
            }
        }
        Ident::changed(self, index);
        Ok(())
    }

    /* var getters */

    /// Current value of a named integer variable.
    pub fn get_var_int(&self, name: &str) -> Option<i64> {
        match &self.istate.identmap[self.get_ident(name)?].kind {
            IdentKind::Ivar(v) => Some(v.value),
            _ => None,
        }
    }

    /// Current value of a named float variable.
    pub fn get_var_float(&self, name: &str) -> Option<f64> {
        match &self.istate.identmap[self.get_ident(name)?].kind {
            IdentKind::Fvar(v) => Some(v.value),
            _ => None,
        }
    }

    /// Current value of a named string variable.
    pub fn get_var_str(&self, name: &str) -> Option<Rc<str>> {
        match &self.istate.identmap[self.get_ident(name)?].kind {
            IdentKind::Svar(v) => Some(v.value.clone()),
            _ => None,
        }
    }

    /// Current value of a named alias rendered as a string; `None` when
    /// the alias is unbound or an unused argument slot.
    pub fn get_alias_val(&self, name: &str) -> Option<String> {
        let idx = self.get_ident(name)?;
        if idx < MAX_ARGUMENTS && !self.is_arg_used(idx) {
            return None;
        }
        let id = &self.istate.identmap[idx];
        if id.flags.contains(IdentFlags::UNKNOWN) {
            return None;
        }
        id.alias().map(|a| a.value.get_str())
    }

    /* modes and hooks */

    /// Enable or disable override mode: while on, every var write
    /// snapshots the pre-write value for [`CsState::clear_override`].
    pub fn set_override_mode(&mut self, on: bool) {
        self.tstate.ident_flags.set(IdentFlags::OVERRIDDEN, on);
    }

    /// Enable or disable persist mode for newly created aliases.
    pub fn set_persist_mode(&mut self, on: bool) {
        self.tstate.ident_flags.set(IdentFlags::PERSIST, on);
    }

    /// Install a hook invoked at every VM entry; returns the previous
    /// hook. The hook may raise to abort execution.
    pub fn set_call_hook(&mut self, hook: Option<HookFn>) -> Option<HookFn> {
        std::mem::replace(&mut self.tstate.call_hook, hook)
    }

    /// Adjust the nested-execution limit.
    pub fn set_max_run_depth(&mut self, depth: usize) {
        self.tstate.max_run_depth = depth.max(1);
    }

    /// Replace the var printer driven by the `Print` instruction;
    /// returns the previous printer.
    pub fn set_var_printer(&mut self, printer: PrintFn) -> PrintFn {
        std::mem::replace(&mut self.istate.var_printer, printer)
    }

    /// Print a variable through the configured printer.
    pub fn print_var(&self, index: usize) {
        let printer = self.istate.var_printer.clone();
        printer(self, index);
    }

    /* numargs plumbing */

    pub(crate) fn ivar_value(&self, index: usize) -> i64 {
        match &self.istate.identmap[index].kind {
            IdentKind::Ivar(v) => v.value,
            _ => 0,
        }
    }

    pub(crate) fn set_ivar_raw(&mut self, index: usize, v: i64) {
        if let IdentKind::Ivar(iv) = &mut self.istate.identmap[index].kind {
            iv.value = v;
        }
    }

    /* errors */

    /// Build an error carrying a snapshot of the current call stack.
    pub fn error(&self, message: impl Into<String>) -> CsError {
        let (stack, gap) = self.save_stack();
        let err = CsError::new(message.into(), stack, gap);
        debug!(message = err.message(), "script error raised");
        err
    }

    fn save_stack(&self) -> (Vec<StackNode>, bool) {
        let limit = self
            .ivar_value(self.istate.dbgalias_idx)
            .clamp(0, MAX_DBGALIAS) as usize;
        let total = self.tstate.callstack.len();
        if limit == 0 || total == 0 {
            return (Vec::new(), limit == 0 && total > 0);
        }
        let mut nodes = Vec::with_capacity(total.min(limit));
        for (i, frame) in self.tstate.callstack.iter().rev().enumerate() {
            let depth = i + 1;
            if depth < limit {
                nodes.push(StackNode {
                    ident: frame.ident,
                    depth: total - depth + 1,
                });
            } else if depth == total {
                nodes.push(StackNode {
                    ident: frame.ident,
                    depth: 1,
                });
            }
        }
        (nodes, total > limit)
    }

    /// Render an error's stack snapshot, one `  depth) name` line per
    /// captured frame, with `..` marking elided frames.
    pub fn format_stack(&self, err: &CsError) -> String {
        let mut out = String::new();
        for (i, node) in err.stack().iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            if err.gap() && i + 1 == err.stack().len() && node.depth == 1 {
                out.push_str("  ..\n");
            }
            out.push_str(&format!(
                "  {}) {}",
                node.depth,
                self.istate.identmap[node.ident].name
            ));
        }
        out
    }

    /* run entry points */

    /// Compile source text to a code block without running it.
    pub fn compile(&mut self, source: &str) -> CsResult<CodeRef> {
        gen::compile_main(self, source, "")
    }

    /// Compile source text, attributing errors to `src_name`.
    pub fn compile_named(&mut self, source: &str, src_name: &str) -> CsResult<CodeRef> {
        gen::compile_main(self, source, src_name)
    }

    /// Compile and run source text.
    pub fn run(&mut self, source: &str) -> CsResult<Value> {
        self.run_named(source, "")
    }

    /// Compile and run source text, attributing errors to `src_name`.
    pub fn run_named(&mut self, source: &str, src_name: &str) -> CsResult<Value> {
        trace!(len = source.len(), src_name, "running source");
        let code = gen::compile_main(self, source, src_name)?;
        self.run_code(&code)
    }

    /// Run a compiled code block.
    pub fn run_code(&mut self, code: &CodeRef) -> CsResult<Value> {
        let mut ret = Value::Null;
        vm::exec(self, code, &mut ret).map_err(Signal::into_error)?;
        Ok(ret)
    }

    /// Run a compiled code block from inside a native command,
    /// propagating loop control to the enclosing loop driver. The
    /// result lands in `ret`.
    pub fn run_code_into(&mut self, code: &CodeRef, ret: &mut Value) -> RunResult<()> {
        vm::exec(self, code, ret)
    }

    /// Run a code block and read the result as a boolean.
    pub fn run_bool(&mut self, code: &CodeRef) -> RunResult<bool> {
        let mut ret = Value::Null;
        vm::exec(self, code, &mut ret)?;
        Ok(ret.get_bool())
    }

    /// Invoke an identifier with positional arguments, dispatching on
    /// its kind the way a runtime call does.
    pub fn run_ident(&mut self, index: usize, args: Vec<Value>) -> CsResult<Value> {
        let mut ret = Value::Null;
        vm::run_ident(self, index, args, &mut ret).map_err(Signal::into_error)?;
        Ok(ret)
    }

    /// Drive a code block as a loop body, translating `break` and
    /// `continue` into a [`LoopState`].
    pub fn run_loop(&mut self, code: &CodeRef, ret: &mut Value) -> CsResult<LoopState> {
        self.tstate.loop_level += 1;
        let r = vm::exec(self, code, ret);
        self.tstate.loop_level -= 1;
        match r {
            Ok(()) => Ok(LoopState::Normal),
            Err(Signal::Break) => Ok(LoopState::Break),
            Err(Signal::Continue) => Ok(LoopState::Continue),
            Err(s) => Err(s.into_error()),
        }
    }
}

/// Compute the formal arity of a command argument type string, or
/// `None` when the string is malformed.
pub(crate) fn count_args(args: &str) -> Option<usize> {
    let b = args.as_bytes();
    let mut nargs = 0usize;
    let mut i = 0usize;
    while i < b.len() {
        match b[i] {
            b'i' | b'b' | b'f' | b'F' | b't' | b'T' | b'E' | b'N' | b's' | b'e' | b'r'
            | b'$' => {
                if nargs < MAX_ARGUMENTS {
                    nargs += 1;
                }
                i += 1;
            }
            d @ b'1'..=b'4' => {
                let rep = (d - b'0') as usize;
                if nargs < rep {
                    return None;
                }
                if i + 2 != b.len() || !matches!(b[i + 1], b'C' | b'V') {
                    return None;
                }
                if nargs < MAX_ARGUMENTS {
                    // repeat the trailing formals until the arity cap
                    i -= rep;
                } else {
                    i += 1;
                }
            }
            b'C' | b'V' => {
                if i + 1 != b.len() {
                    return None;
                }
                i += 1;
            }
            _ => return None,
        }
    }
    Some(nargs)
}

fn default_var_printer(cs: &CsState, index: usize) {
    let id = cs.ident(index);
    match &id.kind {
        IdentKind::Ivar(v) => {
            if id.flags.contains(IdentFlags::HEX) {
                println!("{} = {:#X}", id.name, v.value);
            } else {
                println!("{} = {}", id.name, int_to_str(v.value));
            }
        }
        IdentKind::Fvar(v) => println!("{} = {}", id.name, float_to_str(v.value)),
        IdentKind::Svar(v) => {
            if v.value.contains('"') {
                println!("{} = [{}]", id.name, v.value);
            } else {
                println!("{} = \"{}\"", id.name, v.value);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argspec_arity() {
        assert_eq!(count_args(""), Some(0));
        assert_eq!(count_args("tee"), Some(3));
        assert_eq!(count_args("V"), Some(0));
        assert_eq!(count_args("i1V"), Some(MAX_ARGUMENTS));
        assert_eq!(count_args("siiN"), Some(4));
        assert_eq!(count_args("x"), None);
        assert_eq!(count_args("1V"), None);
        assert_eq!(count_args("i1x"), None);
        assert_eq!(count_args("Cs"), None);
    }
}
