//! Identifier table entries
//!
//! Every named entity is an [`Ident`]: a common header (interned name,
//! flags, stable table index) plus a kind-specific payload. The first
//! `MAX_ARGUMENTS` table slots are reserved for the `arg1..argN`
//! aliases that carry call arguments.

use std::rc::Rc;

use bitflags::bitflags;

use crate::bcode::CodeRef;
use crate::error::{RunResult, Signal};
use crate::state::CsState;
use crate::value::Value;

bitflags! {
    /// Identifier behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IdentFlags: u32 {
        /// Persistent variable; refuses overrides.
        const PERSIST = 1 << 0;
        /// Variable snapshots its value on first write regardless of
        /// override mode.
        const OVERRIDE = 1 << 1;
        /// An override snapshot is currently held. On the thread flag
        /// mask this bit is the override mode itself.
        const OVERRIDDEN = 1 << 2;
        /// Writes are rejected.
        const READ_ONLY = 1 << 3;
        /// Alias created by lookup or assignment target resolution,
        /// with no value assigned yet.
        const UNKNOWN = 1 << 4;
        /// Reserved argument alias (`arg1..argN`).
        const ARG = 1 << 5;
        /// Integer variable renders and packs as a colour/hex triple.
        const HEX = 1 << 6;
    }
}

/// Native command callback. Receives the interpreter, the coerced
/// argument span, and the result slot.
pub type CommandFn = Rc<dyn Fn(&mut CsState, &mut [Value], &mut Value) -> RunResult<()>>;

/// Variable change callback; receives the interpreter and the table
/// index of the changed variable.
pub type VarFn = Rc<dyn Fn(&mut CsState, usize)>;

/// Hook invoked at every VM entry; may raise to abort execution.
pub type HookFn = Rc<dyn Fn(&mut CsState) -> Result<(), crate::error::CsError>>;

/// Var-printer callback driven by the `Print` instruction.
pub type PrintFn = Rc<dyn Fn(&CsState, usize)>;

/// Marks the commands the compiler recognizes by identity and lowers
/// to dedicated instructions instead of plain calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Normal,
    Local,
    Do,
    DoArgs,
    If,
    Break,
    Continue,
    Result,
    Not,
    And,
    Or,
}

/// A native command: formal argument type string, arity, callback.
#[derive(Clone)]
pub struct Command {
    pub args: Rc<str>,
    pub num_args: usize,
    pub kind: CommandKind,
    pub cb: Option<CommandFn>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("args", &self.args)
            .field("num_args", &self.num_args)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Integer variable payload.
#[derive(Clone)]
pub struct IntVar {
    pub value: i64,
    pub min: i64,
    pub max: i64,
    pub override_val: i64,
    pub cb: Option<VarFn>,
}

/// Float variable payload.
#[derive(Clone)]
pub struct FloatVar {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub override_val: f64,
    pub cb: Option<VarFn>,
}

/// String variable payload; both slots are interned.
#[derive(Clone)]
pub struct StrVar {
    pub value: Rc<str>,
    pub override_val: Rc<str>,
    pub cb: Option<VarFn>,
}

/// Alias payload: the current value, the stack of values shadowed by
/// `push`/`local`/argument binding, and the cached compiled body.
#[derive(Debug, Default)]
pub struct Alias {
    pub value: Value,
    stack: Vec<Value>,
    code: Option<CodeRef>,
}

impl Alias {
    pub fn with_value(value: Value) -> Self {
        Self {
            value,
            stack: Vec::new(),
            code: None,
        }
    }

    /// Replace the value, invalidating any cached bytecode.
    pub fn set_value(&mut self, v: Value) {
        self.value = v;
        self.code = None;
    }

    /// Shadow the current value with `v`; the old value is restored by
    /// [`Alias::pop`].
    pub fn push(&mut self, v: Value) {
        let old = std::mem::replace(&mut self.value, v);
        self.stack.push(old);
        self.code = None;
    }

    /// Undo the most recent [`Alias::push`]. A pop with nothing pushed
    /// is ignored.
    pub fn pop(&mut self) {
        if let Some(old) = self.stack.pop() {
            self.value = old;
            self.code = None;
        }
    }

    /// Temporarily restore the value shadowed by the top push,
    /// returning the in-flight value for [`Alias::redo`].
    pub fn undo(&mut self) -> Option<Value> {
        let prev = self.stack.pop()?;
        let cur = std::mem::replace(&mut self.value, prev);
        self.code = None;
        Some(cur)
    }

    /// Reverse [`Alias::undo`].
    pub fn redo(&mut self, saved: Value) {
        let prev = std::mem::replace(&mut self.value, saved);
        self.stack.push(prev);
        self.code = None;
    }

    /// Depth of the shadow stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn cached_code(&self) -> Option<&CodeRef> {
        self.code.as_ref()
    }

    pub fn cache_code(&mut self, code: CodeRef) {
        self.code = Some(code);
    }

    /// Drop the cached bytecode; the next call recompiles.
    pub fn clean_code(&mut self) {
        self.code = None;
    }
}

/// Kind-specific payload of an identifier.
#[derive(Debug)]
pub enum IdentKind {
    Ivar(IntVar),
    Fvar(FloatVar),
    Svar(StrVar),
    Alias(Alias),
    Command(Command),
}

impl std::fmt::Debug for IntVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntVar")
            .field("value", &self.value)
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for FloatVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloatVar")
            .field("value", &self.value)
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for StrVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrVar")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

/// One identifier table entry.
#[derive(Debug)]
pub struct Ident {
    pub name: Rc<str>,
    pub flags: IdentFlags,
    pub index: usize,
    pub kind: IdentKind,
}

impl Ident {
    pub fn new(name: Rc<str>, flags: IdentFlags, index: usize, kind: IdentKind) -> Self {
        Self {
            name,
            flags,
            index,
            kind,
        }
    }

    pub const fn is_alias(&self) -> bool {
        matches!(self.kind, IdentKind::Alias(_))
    }

    pub const fn is_command(&self) -> bool {
        matches!(self.kind, IdentKind::Command(_))
    }

    pub const fn is_var(&self) -> bool {
        matches!(
            self.kind,
            IdentKind::Ivar(_) | IdentKind::Fvar(_) | IdentKind::Svar(_)
        )
    }

    pub fn alias(&self) -> Option<&Alias> {
        match &self.kind {
            IdentKind::Alias(a) => Some(a),
            _ => None,
        }
    }

    pub fn alias_mut(&mut self) -> Option<&mut Alias> {
        match &mut self.kind {
            IdentKind::Alias(a) => Some(a),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<&Command> {
        match &self.kind {
            IdentKind::Command(c) => Some(c),
            _ => None,
        }
    }

    /// The command kind marker, `Normal` for anything not a command.
    pub fn command_kind(&self) -> CommandKind {
        self.command().map_or(CommandKind::Normal, |c| c.kind)
    }

    /// Invoke the variable change callback, if any.
    pub(crate) fn changed(cs: &mut CsState, index: usize) {
        let cb = match &cs.istate.identmap[index].kind {
            IdentKind::Ivar(v) => v.cb.clone(),
            IdentKind::Fvar(v) => v.cb.clone(),
            IdentKind::Svar(v) => v.cb.clone(),
            _ => None,
        };
        if let Some(cb) = cb {
            cb(cs, index);
        }
    }
}

/// Dispatch a command callback. The callback handle is cloned out of
/// the table first so it may freely re-enter the interpreter.
pub(crate) fn call_command(
    cs: &mut CsState,
    index: usize,
    args: &mut [Value],
    res: &mut Value,
) -> RunResult<()> {
    let cb = match &cs.istate.identmap[index].kind {
        IdentKind::Command(c) => c.cb.clone(),
        _ => None,
    };
    match cb {
        Some(cb) => cb(cs, args, res),
        None => Err(Signal::Error(
            cs.error(format!(
                "unknown command: {}",
                cs.istate.identmap[index].name
            )),
        )),
    }
}
