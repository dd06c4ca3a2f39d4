//! Bytecode compiler
//!
//! A recursive-descent emitter over the raw source bytes. Statements
//! compile head-first: known commands drive argument compilation from
//! their argument type string, aliases compile positional calls,
//! compiler keywords lower to dedicated instructions (`if`, `&&` and
//! `||` fuse single-block arguments into conditional jumps), and
//! unknown heads fall back to runtime dispatch. Every value-producing
//! instruction carries the return-type tag of the context it compiles
//! in.

use tracing::trace;

use crate::bcode::{
    enc, enc_data, push_float_payload, push_int_payload, push_str_payload, CodeRef, Op, RetType,
    DATA_SHIFT, FLAG_FALSE, FLAG_TRUE, RET_MASK,
};
use crate::consts::{INLINE_INT_MAX, INLINE_INT_MIN, MAX_ARGUMENTS, MAX_RESULTS};
use crate::error::{CsError, CsResult, ParseError};
use crate::ident::{CommandKind, IdentFlags, IdentKind};
use crate::parse::{
    check_num, parse_float, parse_int, parse_int_end, parse_string, parse_word, unescape_string,
};
use crate::state::CsState;
use crate::value::Value;

/// Compilation context of one argument position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordType {
    Null,
    Int,
    Float,
    Str,
    Any,
    Code,
    Ident,
    Word,
    Pop,
    Cond,
}

use WordType as WT;

/// Return-tag bits for a word type, `def` for the untyped contexts.
fn ret_code(wt: WordType, def: u32) -> u32 {
    match wt {
        WT::Null => RetType::Null.bits(),
        WT::Int => RetType::Int.bits(),
        WT::Float => RetType::Float.bits(),
        WT::Str => RetType::Str.bits(),
        _ => def,
    }
}

/// Byte cursor over one source buffer, tracking the current line.
struct Lexer<'s> {
    src: &'s [u8],
    pos: usize,
    line: usize,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s [u8], line: usize) -> Self {
        Self { src, pos: 0, line }
    }

    fn current(&self) -> u8 {
        self.peek(0)
    }

    fn peek(&self, n: usize) -> u8 {
        self.src.get(self.pos + n).copied().unwrap_or(0)
    }

    fn next_char(&mut self) {
        if self.current() == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
    }

    /// Consume a quoted string, returning its body without the quotes.
    fn get_str(&mut self) -> Result<&'s [u8], ParseError> {
        let (end, nl) = parse_string(&self.src[self.pos..])?;
        let body = &self.src[self.pos + 1..self.pos + end - 1];
        self.pos += end;
        self.line += nl - 1;
        Ok(body)
    }

    /// Consume a quoted string and resolve its escapes.
    fn get_str_dup(&mut self) -> Result<String, ParseError> {
        let body = self.get_str()?;
        let mut out = String::with_capacity(body.len());
        unescape_string(&mut out, &String::from_utf8_lossy(body));
        Ok(out)
    }

    /// Consume a bare word.
    fn get_word(&mut self) -> Result<&'s [u8], ParseError> {
        let end = parse_word(&self.src[self.pos..])?;
        let word = &self.src[self.pos..self.pos + end];
        self.pos += end;
        Ok(word)
    }

    /// Consume an alphanumeric/underscore run used as a substitution
    /// name; empty when the cursor is not at one.
    fn read_macro_name(&mut self) -> &'s [u8] {
        let beg = self.pos;
        let c = self.current();
        if !c.is_ascii_alphabetic() && c != b'_' {
            return &self.src[beg..beg];
        }
        while self.current().is_ascii_alphanumeric() || self.current() == b'_' {
            self.next_char();
        }
        &self.src[beg..self.pos]
    }

    /// Advance until one of `chars` (or end); returns the byte found,
    /// `0` at end of input.
    fn skip_until(&mut self, chars: &[u8]) -> u8 {
        loop {
            let c = self.current();
            if c == 0 || chars.contains(&c) {
                return c;
            }
            self.next_char();
        }
    }

    fn skip_until_char(&mut self, cf: u8) -> u8 {
        loop {
            let c = self.current();
            if c == 0 || c == cf {
                return c;
            }
            self.next_char();
        }
    }

    /// Skip horizontal whitespace, `\`-escaped line breaks, and `//`
    /// comments.
    fn skip_comments(&mut self) -> Result<(), ParseError> {
        loop {
            while matches!(self.current(), b' ' | b'\t' | b'\r') {
                self.next_char();
            }
            if self.current() == b'\\' {
                let c = self.peek(1);
                if c != b'\r' && c != b'\n' {
                    return Err(ParseError::InvalidLineBreak);
                }
                self.next_char();
                self.next_char();
                if c == b'\r' && self.current() == b'\n' {
                    self.next_char();
                }
                continue;
            }
            if self.current() != b'/' || self.peek(1) != b'/' {
                return Ok(());
            }
            while self.current() != b'\n' && self.current() != 0 {
                self.next_char();
            }
        }
    }
}

/// Emitter state shared across the recursion.
struct GenState<'cs> {
    cs: &'cs mut CsState,
    code: Vec<u32>,
    src_name: String,
}

impl GenState<'_> {
    fn err(&self, line: usize, msg: impl std::fmt::Display) -> CsError {
        if self.src_name.is_empty() {
            self.cs.error(format!("{line}: {msg}"))
        } else {
            self.cs.error(format!("{}:{line}: {msg}", self.src_name))
        }
    }

    fn gen_null(&mut self) {
        self.code.push(enc(Op::ValInt, RetType::Null));
    }

    fn gen_int(&mut self, v: i64) {
        if (INLINE_INT_MIN..=INLINE_INT_MAX).contains(&v) {
            self.code
                .push(enc_data(Op::ValInt, RetType::Int, (v as u32) & 0x00ff_ffff));
        } else {
            self.code.push(enc(Op::Val, RetType::Int));
            push_int_payload(&mut self.code, v);
        }
    }

    fn gen_float(&mut self, v: f64) {
        let iv = v as i64;
        if iv as f64 == v && (INLINE_INT_MIN..=INLINE_INT_MAX).contains(&iv) {
            self.code
                .push(enc_data(Op::ValInt, RetType::Float, (iv as u32) & 0x00ff_ffff));
        } else {
            self.code.push(enc(Op::Val, RetType::Float));
            push_float_payload(&mut self.code, v);
        }
    }

    fn gen_str(&mut self, s: &str) {
        let b = s.as_bytes();
        if b.len() <= 3 {
            let mut data = 0u32;
            for (i, &c) in b.iter().enumerate() {
                data |= u32::from(c) << (8 * i);
            }
            self.code.push(enc_data(Op::ValInt, RetType::Str, data));
        } else {
            self.code
                .push(enc_data(Op::Val, RetType::Str, b.len() as u32));
            push_str_payload(&mut self.code, b);
        }
    }

    /// Emit an ident reference; argument slots mark themselves used.
    fn gen_ident_idx(&mut self, index: usize) {
        let op = if index < MAX_ARGUMENTS {
            Op::IdentArg
        } else {
            Op::Ident
        };
        self.code.push(enc_data(op, RetType::Null, index as u32));
    }

    fn gen_ident_dummy(&mut self) {
        let dummy = self.cs.istate.dummy_idx;
        self.gen_ident_idx(dummy);
    }

    fn gen_ident_name(&mut self, name: &str, line: usize) -> CsResult<()> {
        if name.is_empty() {
            self.gen_ident_dummy();
            return Ok(());
        }
        let idx = self
            .cs
            .new_ident(name, IdentFlags::UNKNOWN)
            .map_err(|e| self.err(line, e.message()))?;
        self.gen_ident_idx(idx);
        Ok(())
    }

    /// Emit a literal in the given context.
    fn gen_value(&mut self, wt: WordType, word: &str, line: usize) -> CsResult<()> {
        match wt {
            WT::Any => {
                if word.is_empty() {
                    self.gen_null();
                } else {
                    self.gen_str(word);
                }
            }
            WT::Str | WT::Word => self.gen_str(word),
            WT::Float => self.gen_float(parse_float(word)),
            WT::Int => self.gen_int(parse_int(word)),
            WT::Cond => {
                if word.is_empty() {
                    self.gen_null();
                } else {
                    compile_block(self, word.as_bytes(), line, RetType::Null.bits(), 0)?;
                }
            }
            WT::Code => {
                compile_block(self, word.as_bytes(), line, RetType::Null.bits(), 0)?;
            }
            WT::Ident => self.gen_ident_name(word, line)?,
            _ => {}
        }
        Ok(())
    }
}

/// Compile `p` as a nested block in its own result context, emitting
/// `Block`/`Offset` headers and the closing `Exit`. Returns how much of
/// `p` was consumed and the line the scan ended on.
fn compile_block(
    gs: &mut GenState<'_>,
    p: &[u8],
    line: usize,
    rettype: u32,
    brak: u8,
) -> CsResult<(usize, usize)> {
    let start = gs.code.len();
    gs.code.push(enc(Op::Block, RetType::Null));
    gs.code
        .push(enc_data(Op::Offset, RetType::Null, (start as u32) + 2));
    let mut consumed = 0;
    let mut retline = line;
    if !p.is_empty() {
        let mut sub = Lexer::new(p, line);
        compile_statements(gs, &mut sub, WT::Any, brak, 0)?;
        consumed = sub.pos;
        retline = sub.line;
    }
    if gs.code.len() > start + 2 {
        gs.code.push(Op::Exit as u32 | rettype);
        let len = (gs.code.len() - (start + 1)) as u32;
        gs.code[start] |= len << DATA_SHIFT;
    } else {
        gs.code.truncate(start);
        gs.code.push(Op::Empty as u32 | rettype);
    }
    Ok((consumed, retline))
}

/// Emit the raw text of a block range as a string literal, dropping CR
/// bytes and `//` comments while keeping quoted strings verbatim.
fn compile_blockstr(gs: &mut GenState<'_>, src: &[u8], line: usize) -> CsResult<bool> {
    let startc = gs.code.len();
    gs.code.push(enc(Op::Val, RetType::Str));
    let mut buf: Vec<u8> = Vec::with_capacity(src.len());
    let mut pos = 0;
    while pos < src.len() {
        let off = src[pos..]
            .iter()
            .position(|c| matches!(c, b'\r' | b'/' | b'"' | b'@' | b']'))
            .unwrap_or(src.len() - pos);
        buf.extend_from_slice(&src[pos..pos + off]);
        pos += off;
        if pos == src.len() {
            break;
        }
        match src[pos] {
            b'\r' => pos += 1,
            b'"' => {
                let (end, _) = parse_string(&src[pos..]).map_err(|e| gs.err(line, e))?;
                buf.extend_from_slice(&src[pos..pos + end]);
                pos += end;
            }
            b'/' => {
                if src.get(pos + 1) == Some(&b'/') {
                    pos += src[pos..]
                        .iter()
                        .position(|&c| c == b'\n')
                        .unwrap_or(src.len() - pos);
                } else {
                    buf.push(b'/');
                    pos += 1;
                }
            }
            c => {
                buf.push(c);
                pos += 1;
            }
        }
    }
    gs.code[startc] |= (buf.len() as u32) << DATA_SHIFT;
    push_str_payload(&mut gs.code, &buf);
    Ok(true)
}

/// Compile the value of an `@` substitution inside a block.
fn compile_blocksub(gs: &mut GenState<'_>, lx: &mut Lexer<'_>, prevargs: usize) -> CsResult<bool> {
    let lookup: String;
    match lx.current() {
        b'(' => return compile_arg(gs, lx, WT::Any, prevargs, None),
        b'[' => {
            if !compile_arg(gs, lx, WT::Str, prevargs, None)? {
                return Ok(false);
            }
            gs.code.push(enc(Op::LookupU, RetType::Null));
            return Ok(true);
        }
        b'"' => {
            lookup = lx.get_str_dup().map_err(|e| gs.err(lx.line, e))?;
        }
        _ => {
            let name = lx.read_macro_name();
            if name.is_empty() {
                return Ok(false);
            }
            lookup = String::from_utf8_lossy(name).into_owned();
        }
    }
    let idx = gs
        .cs
        .new_ident(&lookup, IdentFlags::UNKNOWN)
        .map_err(|e| gs.err(lx.line, e.message()))?;
    match &gs.cs.istate.identmap[idx].kind {
        IdentKind::Ivar(_) => gs
            .code
            .push(enc_data(Op::Ivar, RetType::Null, idx as u32)),
        IdentKind::Fvar(_) => gs
            .code
            .push(enc_data(Op::Fvar, RetType::Null, idx as u32)),
        IdentKind::Svar(_) => gs
            .code
            .push(enc_data(Op::Svar, RetType::Null, idx as u32)),
        IdentKind::Alias(_) => {
            let op = if idx < MAX_ARGUMENTS {
                Op::LookupArg
            } else {
                Op::Lookup
            };
            gs.code.push(enc_data(op, RetType::Null, idx as u32));
        }
        IdentKind::Command(_) => {
            gs.gen_str(&lookup);
            gs.code.push(enc(Op::LookupU, RetType::Null));
        }
    }
    Ok(true)
}

/// Compile a `[...]` block argument, handling nesting and `@`
/// substitutions.
fn compile_blockmain(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    wt: WordType,
    prevargs: usize,
) -> CsResult<()> {
    let mut start = lx.pos;
    let mut curline = lx.line;
    let mut concs = 0usize;
    let mut brak = 1i32;
    while brak != 0 {
        match lx.skip_until(b"@\"/[]") {
            0 => return Err(gs.err(lx.line, "missing \"]\"")),
            b'"' => {
                lx.get_str().map_err(|e| gs.err(lx.line, e))?;
            }
            b'/' => {
                lx.next_char();
                if lx.current() == b'/' {
                    lx.skip_until_char(b'\n');
                }
            }
            b'[' => {
                lx.next_char();
                brak += 1;
            }
            b']' => {
                lx.next_char();
                brak -= 1;
            }
            b'@' => {
                let esc = lx.pos;
                let mut level = 0i32;
                while lx.current() == b'@' {
                    level += 1;
                    lx.next_char();
                }
                if brak > level {
                    continue;
                }
                if brak < level {
                    return Err(gs.err(lx.line, ParseError::TooManyAts));
                }
                if concs == 0 && prevargs >= MAX_RESULTS {
                    gs.code.push(enc(Op::Enter, RetType::Null));
                }
                if concs + 2 > MAX_ARGUMENTS {
                    gs.code
                        .push(enc_data(Op::ConcW, RetType::Str, concs as u32));
                    concs = 1;
                }
                if compile_blockstr(gs, &lx.src[start..esc], curline)? {
                    concs += 1;
                }
                if compile_blocksub(gs, lx, prevargs + concs)? {
                    concs += 1;
                }
                if concs > 0 {
                    start = lx.pos;
                    curline = lx.line;
                } else if prevargs >= MAX_RESULTS {
                    gs.code.pop();
                }
            }
            _ => lx.next_char(),
        }
    }
    let body_end = lx.pos - 1;
    if body_end > start {
        if concs == 0 {
            match wt {
                WT::Pop => return Ok(()),
                WT::Code | WT::Cond => {
                    let (consumed, line) = compile_block(
                        gs,
                        &lx.src[start..],
                        curline,
                        RetType::Null.bits(),
                        b']',
                    )?;
                    lx.pos = start + consumed;
                    lx.line = line;
                    return Ok(());
                }
                WT::Ident => {
                    let name = String::from_utf8_lossy(&lx.src[start..body_end]).into_owned();
                    return gs.gen_ident_name(&name, curline);
                }
                _ => {}
            }
        }
        compile_blockstr(gs, &lx.src[start..body_end], curline)?;
        if concs > 1 {
            concs += 1;
        }
    }
    if concs > 0 {
        if prevargs >= MAX_RESULTS {
            gs.code
                .push(enc_data(Op::ConcM, RetType::Null, concs as u32) | ret_code(wt, 0));
            gs.code.push(Op::Exit as u32 | ret_code(wt, 0));
        } else {
            gs.code
                .push(enc_data(Op::ConcW, RetType::Null, concs as u32) | ret_code(wt, 0));
        }
    }
    let had_text = concs > 0 || body_end > start;
    match wt {
        WT::Pop => {
            if had_text {
                gs.code.push(enc(Op::Pop, RetType::Null));
            }
        }
        WT::Cond => {
            if had_text {
                gs.code.push(enc(Op::Cond, RetType::Null));
            } else {
                gs.gen_null();
            }
        }
        WT::Code => {
            if had_text {
                gs.code.push(enc(Op::Compile, RetType::Null));
            } else {
                gs.code.push(enc(Op::Empty, RetType::Null));
            }
        }
        WT::Ident => {
            if had_text {
                gs.code.push(enc(Op::IdentU, RetType::Null));
            } else {
                gs.gen_ident_dummy();
            }
        }
        WT::Str | WT::Null | WT::Any | WT::Word => {
            if !had_text {
                gs.gen_str("");
            }
        }
        WT::Int | WT::Float => {
            if concs == 0 {
                if !had_text {
                    gs.gen_value(wt, "", curline)?;
                } else {
                    gs.code.push(Op::Force as u32 | ret_code(wt, 0));
                }
            }
        }
    }
    Ok(())
}

/// Compile a `$` lookup in the given context.
fn compile_lookup(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    ltype: WordType,
    prevargs: usize,
) -> CsResult<()> {
    lx.next_char();
    let lookup: String;
    match lx.current() {
        b'(' | b'[' => {
            if !compile_arg(gs, lx, WT::Str, prevargs, None)? {
                return gen_lookup_invalid(gs, ltype, lx.line);
            }
            return gen_lookup_dynamic(gs, ltype);
        }
        b'$' => {
            compile_lookup(gs, lx, WT::Str, prevargs)?;
            return gen_lookup_dynamic(gs, ltype);
        }
        b'"' => {
            lookup = lx.get_str_dup().map_err(|e| gs.err(lx.line, e))?;
        }
        _ => {
            let word = lx.get_word().map_err(|e| gs.err(lx.line, e))?;
            if word.is_empty() {
                return gen_lookup_invalid(gs, ltype, lx.line);
            }
            lookup = String::from_utf8_lossy(word).into_owned();
        }
    }
    let idx = gs
        .cs
        .new_ident(&lookup, IdentFlags::UNKNOWN)
        .map_err(|e| gs.err(lx.line, e.message()))?;
    match &gs.cs.istate.identmap[idx].kind {
        IdentKind::Ivar(_) => {
            gs.code.push(
                enc_data(Op::Ivar, RetType::Null, idx as u32)
                    | ret_code(ltype, RetType::Int.bits()),
            );
            match ltype {
                WT::Pop => {
                    gs.code.pop();
                }
                WT::Code => gs.code.push(enc(Op::Compile, RetType::Null)),
                WT::Ident => gs.code.push(enc(Op::IdentU, RetType::Null)),
                _ => {}
            }
            Ok(())
        }
        IdentKind::Fvar(_) => {
            gs.code.push(
                enc_data(Op::Fvar, RetType::Null, idx as u32)
                    | ret_code(ltype, RetType::Float.bits()),
            );
            match ltype {
                WT::Pop => {
                    gs.code.pop();
                }
                WT::Code => gs.code.push(enc(Op::Compile, RetType::Null)),
                WT::Ident => gs.code.push(enc(Op::IdentU, RetType::Null)),
                _ => {}
            }
            Ok(())
        }
        IdentKind::Svar(_) => {
            if ltype == WT::Pop {
                return Ok(());
            }
            gs.code.push(
                enc_data(Op::Svar, RetType::Null, idx as u32)
                    | ret_code(ltype, RetType::Str.bits()),
            );
            gen_lookup_tail(gs, ltype);
            Ok(())
        }
        IdentKind::Alias(_) => {
            let arg = idx < MAX_ARGUMENTS;
            match ltype {
                WT::Pop => return Ok(()),
                WT::Cond => {
                    let op = if arg { Op::LookupArg } else { Op::Lookup };
                    gs.code.push(enc_data(op, RetType::Null, idx as u32));
                }
                WT::Code | WT::Ident => {
                    let op = if arg { Op::LookupArg } else { Op::Lookup };
                    gs.code.push(enc_data(op, RetType::Str, idx as u32));
                }
                _ => {
                    let op = if arg { Op::LookupArg } else { Op::Lookup };
                    gs.code.push(
                        enc_data(op, RetType::Null, idx as u32)
                            | ret_code(ltype, RetType::Str.bits()),
                    );
                }
            }
            gen_lookup_tail(gs, ltype);
            Ok(())
        }
        IdentKind::Command(cmd) => {
            let kind = cmd.kind;
            let fmt = cmd.args.clone();
            if kind != CommandKind::Normal {
                return gen_lookup_invalid(gs, ltype, lx.line);
            }
            let mut comtype = Op::Com;
            let mut numargs = 0u32;
            if prevargs >= MAX_RESULTS {
                gs.code.push(enc(Op::Enter, RetType::Null));
            }
            let self_idx = idx;
            let mut variadic = false;
            for c in fmt.bytes() {
                match c {
                    b's' => {
                        gs.gen_str("");
                        numargs += 1;
                    }
                    b'i' => {
                        gs.gen_int(0);
                        numargs += 1;
                    }
                    b'b' => {
                        gs.gen_int(i64::MIN);
                        numargs += 1;
                    }
                    b'f' => {
                        gs.gen_float(0.0);
                        numargs += 1;
                    }
                    b'F' => {
                        gs.code.push(enc(Op::Dup, RetType::Float));
                        numargs += 1;
                    }
                    b'E' | b'T' | b't' => {
                        gs.gen_null();
                        numargs += 1;
                    }
                    b'e' => {
                        gs.code.push(enc(Op::Empty, RetType::Null));
                        numargs += 1;
                    }
                    b'r' => {
                        gs.gen_ident_dummy();
                        numargs += 1;
                    }
                    b'$' => {
                        gs.gen_ident_idx(self_idx);
                        numargs += 1;
                    }
                    b'N' => {
                        gs.gen_int(-1);
                        numargs += 1;
                    }
                    b'C' => {
                        comtype = Op::ComC;
                        variadic = true;
                        break;
                    }
                    b'V' => {
                        comtype = Op::ComV;
                        variadic = true;
                        break;
                    }
                    b'1'..=b'4' => {}
                    _ => {}
                }
            }
            if variadic {
                gs.code.push(
                    comtype as u32
                        | ret_code(ltype, 0)
                        | (numargs << DATA_SHIFT)
                        | ((idx as u32) << 13),
                );
            } else {
                gs.code
                    .push(comtype as u32 | ret_code(ltype, 0) | ((idx as u32) << DATA_SHIFT));
            }
            gs.code.push(
                (if prevargs >= MAX_RESULTS {
                    Op::Exit
                } else {
                    Op::ResultArg
                }) as u32
                    | ret_code(ltype, 0),
            );
            gen_lookup_tail(gs, ltype);
            Ok(())
        }
    }
}

/// Tail conversions shared by the resolved lookup paths.
fn gen_lookup_tail(gs: &mut GenState<'_>, ltype: WordType) {
    match ltype {
        WT::Pop => gs.code.push(enc(Op::Pop, RetType::Null)),
        WT::Code => gs.code.push(enc(Op::Compile, RetType::Null)),
        WT::Cond => gs.code.push(enc(Op::Cond, RetType::Null)),
        WT::Ident => gs.code.push(enc(Op::IdentU, RetType::Null)),
        _ => {}
    }
}

/// Dynamic lookup of a name computed at runtime.
fn gen_lookup_dynamic(gs: &mut GenState<'_>, ltype: WordType) -> CsResult<()> {
    match ltype {
        WT::Cond => gs.code.push(enc(Op::LookupU, RetType::Null)),
        WT::Code | WT::Ident => gs.code.push(enc(Op::LookupU, RetType::Str)),
        _ => gs
            .code
            .push(Op::LookupU as u32 | ret_code(ltype, 0)),
    }
    gen_lookup_tail(gs, ltype);
    Ok(())
}

/// Fallback when a lookup target cannot be parsed.
fn gen_lookup_invalid(gs: &mut GenState<'_>, ltype: WordType, line: usize) -> CsResult<()> {
    match ltype {
        WT::Pop => Ok(()),
        WT::Null | WT::Any | WT::Word | WT::Cond => {
            gs.gen_null();
            Ok(())
        }
        _ => gs.gen_value(ltype, "", line),
    }
}

/// Compile one argument in the given context. Returns `false` when no
/// argument was present.
fn compile_arg(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    wt: WordType,
    prevargs: usize,
    word: Option<&mut String>,
) -> CsResult<bool> {
    lx.skip_comments().map_err(|e| gs.err(lx.line, e))?;
    match lx.current() {
        b'"' => {
            match wt {
                WT::Pop => {
                    lx.get_str().map_err(|e| gs.err(lx.line, e))?;
                }
                WT::Cond => {
                    let line = lx.line;
                    let s = lx.get_str_dup().map_err(|e| gs.err(lx.line, e))?;
                    if s.is_empty() {
                        gs.gen_null();
                    } else {
                        compile_block(gs, s.as_bytes(), line, RetType::Null.bits(), 0)?;
                    }
                }
                WT::Code => {
                    let line = lx.line;
                    let s = lx.get_str_dup().map_err(|e| gs.err(lx.line, e))?;
                    compile_block(gs, s.as_bytes(), line, RetType::Null.bits(), 0)?;
                }
                WT::Word => {
                    let s = lx.get_str_dup().map_err(|e| gs.err(lx.line, e))?;
                    if let Some(out) = word {
                        *out = s;
                    }
                }
                WT::Any | WT::Str => {
                    let s = lx.get_str_dup().map_err(|e| gs.err(lx.line, e))?;
                    gs.gen_str(&s);
                }
                _ => {
                    let line = lx.line;
                    let s = lx.get_str_dup().map_err(|e| gs.err(lx.line, e))?;
                    gs.gen_value(wt, &s, line)?;
                }
            }
            Ok(true)
        }
        b'$' => {
            compile_lookup(gs, lx, wt, prevargs)?;
            Ok(true)
        }
        b'(' => {
            lx.next_char();
            if prevargs >= MAX_RESULTS {
                gs.code.push(enc(Op::Enter, RetType::Null));
                compile_statements(gs, lx, WT::Any, b')', 0)?;
                gs.code.push(Op::Exit as u32 | ret_code(wt, 0));
            } else {
                let start = gs.code.len();
                compile_statements(gs, lx, WT::Any, b')', prevargs)?;
                if gs.code.len() > start {
                    gs.code.push(Op::ResultArg as u32 | ret_code(wt, 0));
                } else {
                    gs.gen_value(wt, "", lx.line)?;
                    return Ok(true);
                }
            }
            match wt {
                WT::Pop => gs.code.push(enc(Op::Pop, RetType::Null)),
                WT::Cond => gs.code.push(enc(Op::Cond, RetType::Null)),
                WT::Code => gs.code.push(enc(Op::Compile, RetType::Null)),
                WT::Ident => gs.code.push(enc(Op::IdentU, RetType::Null)),
                _ => {}
            }
            Ok(true)
        }
        b'[' => {
            lx.next_char();
            compile_blockmain(gs, lx, wt, prevargs)?;
            Ok(true)
        }
        _ => match wt {
            WT::Pop => {
                let w = lx.get_word().map_err(|e| gs.err(lx.line, e))?;
                Ok(!w.is_empty())
            }
            WT::Cond | WT::Code => {
                let line = lx.line;
                let w = lx.get_word().map_err(|e| gs.err(lx.line, e))?;
                if w.is_empty() {
                    return Ok(false);
                }
                compile_block(gs, w, line, RetType::Null.bits(), 0)?;
                Ok(true)
            }
            WT::Word => {
                let w = lx.get_word().map_err(|e| gs.err(lx.line, e))?;
                if let Some(out) = word {
                    out.clear();
                    out.push_str(&String::from_utf8_lossy(w));
                }
                Ok(!w.is_empty())
            }
            _ => {
                let line = lx.line;
                let w = lx.get_word().map_err(|e| gs.err(lx.line, e))?;
                if w.is_empty() {
                    return Ok(false);
                }
                let w = String::from_utf8_lossy(w).into_owned();
                gs.gen_value(wt, &w, line)?;
                Ok(true)
            }
        },
    }
}

/// Compile a known command call, driving argument contexts from the
/// command's argument type string.
fn compile_cmd(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    idx: usize,
    more: &mut bool,
    rettype: WordType,
    prevargs: usize,
) -> CsResult<()> {
    let fmt = match &gs.cs.istate.identmap[idx].kind {
        IdentKind::Command(c) => c.args.clone(),
        _ => return Ok(()),
    };
    let b = fmt.as_bytes();
    let mut comtype = Op::Com;
    let mut numargs = 0usize;
    let mut fakeargs = 0usize;
    let mut rep = false;
    let mut fi = 0usize;
    while fi < b.len() {
        match b[fi] {
            b's' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Str, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.gen_str("");
                    fakeargs += 1;
                } else if fi + 1 == b.len() {
                    let mut numconc = 1usize;
                    while numargs + numconc < MAX_ARGUMENTS {
                        *more = compile_arg(gs, lx, WT::Str, prevargs + numargs + numconc, None)?;
                        if !*more {
                            break;
                        }
                        numconc += 1;
                    }
                    if numconc > 1 {
                        gs.code
                            .push(enc_data(Op::Conc, RetType::Str, numconc as u32));
                    }
                }
                numargs += 1;
                fi += 1;
            }
            b'i' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Int, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.gen_int(0);
                    fakeargs += 1;
                }
                numargs += 1;
                fi += 1;
            }
            b'b' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Int, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.gen_int(i64::MIN);
                    fakeargs += 1;
                }
                numargs += 1;
                fi += 1;
            }
            b'f' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Float, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.gen_float(0.0);
                    fakeargs += 1;
                }
                numargs += 1;
                fi += 1;
            }
            b'F' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Float, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.code.push(enc(Op::Dup, RetType::Float));
                    fakeargs += 1;
                }
                numargs += 1;
                fi += 1;
            }
            b't' | b'T' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Any, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.gen_null();
                    fakeargs += 1;
                }
                numargs += 1;
                fi += 1;
            }
            b'E' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Cond, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.gen_null();
                    fakeargs += 1;
                }
                numargs += 1;
                fi += 1;
            }
            b'e' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Code, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.code.push(enc(Op::Empty, RetType::Null));
                    fakeargs += 1;
                }
                numargs += 1;
                fi += 1;
            }
            b'r' => {
                if *more {
                    *more = compile_arg(gs, lx, WT::Ident, prevargs + numargs, None)?;
                }
                if !*more {
                    if rep {
                        fi += 1;
                        continue;
                    }
                    gs.gen_ident_dummy();
                    fakeargs += 1;
                }
                numargs += 1;
                fi += 1;
            }
            b'$' => {
                gs.gen_ident_idx(idx);
                numargs += 1;
                fi += 1;
            }
            b'N' => {
                gs.gen_int((numargs - fakeargs) as i64);
                numargs += 1;
                fi += 1;
            }
            b'C' => {
                comtype = Op::ComC;
                if *more {
                    while numargs < MAX_ARGUMENTS {
                        *more = compile_arg(gs, lx, WT::Any, prevargs + numargs, None)?;
                        if !*more {
                            break;
                        }
                        numargs += 1;
                    }
                }
                gs.code.push(
                    comtype as u32
                        | ret_code(rettype, 0)
                        | ((numargs as u32) << DATA_SHIFT)
                        | ((idx as u32) << 13),
                );
                return Ok(());
            }
            b'V' => {
                comtype = Op::ComV;
                if *more {
                    while numargs < MAX_ARGUMENTS {
                        *more = compile_arg(gs, lx, WT::Any, prevargs + numargs, None)?;
                        if !*more {
                            break;
                        }
                        numargs += 1;
                    }
                }
                gs.code.push(
                    comtype as u32
                        | ret_code(rettype, 0)
                        | ((numargs as u32) << DATA_SHIFT)
                        | ((idx as u32) << 13),
                );
                return Ok(());
            }
            d @ b'1'..=b'4' => {
                if *more && numargs < MAX_ARGUMENTS {
                    let numrep = (d - b'0') as usize;
                    fi -= numrep;
                    rep = true;
                } else {
                    while numargs > MAX_ARGUMENTS {
                        gs.code.push(enc(Op::Pop, RetType::Null));
                        numargs -= 1;
                    }
                    fi += 1;
                }
            }
            _ => {
                fi += 1;
            }
        }
    }
    gs.code
        .push(comtype as u32 | ret_code(rettype, 0) | ((idx as u32) << DATA_SHIFT));
    Ok(())
}

/// Compile a call to a known alias.
fn compile_alias_call(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    idx: usize,
    more: &mut bool,
    prevargs: usize,
) -> CsResult<()> {
    let mut numargs = 0usize;
    while numargs < MAX_ARGUMENTS {
        *more = compile_arg(gs, lx, WT::Any, prevargs + numargs, None)?;
        if !*more {
            break;
        }
        numargs += 1;
    }
    let op = if idx < MAX_ARGUMENTS {
        Op::CallArg
    } else {
        Op::Call
    };
    gs.code.push(
        op as u32 | ((numargs as u32) << DATA_SHIFT) | ((idx as u32) << 13),
    );
    Ok(())
}

fn compile_local(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    more: &mut bool,
    prevargs: usize,
) -> CsResult<()> {
    let mut numargs = 0usize;
    if *more {
        while numargs < MAX_ARGUMENTS {
            *more = compile_arg(gs, lx, WT::Ident, prevargs + numargs, None)?;
            if !*more {
                break;
            }
            numargs += 1;
        }
    }
    if *more {
        while compile_arg(gs, lx, WT::Pop, MAX_RESULTS, None)? {}
        *more = false;
    }
    gs.code
        .push(enc_data(Op::Local, RetType::Null, numargs as u32));
    Ok(())
}

fn compile_do(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    more: &mut bool,
    prevargs: usize,
    rettype: WordType,
    opcode: Op,
) -> CsResult<()> {
    if *more {
        *more = compile_arg(gs, lx, WT::Code, prevargs, None)?;
    }
    gs.code
        .push((if *more { opcode } else { Op::Null }) as u32 | ret_code(rettype, 0));
    Ok(())
}

/// Compile `if`, fusing single-block branches into conditional jumps.
fn compile_if(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    idx: usize,
    more: &mut bool,
    prevargs: usize,
    rettype: WordType,
) -> CsResult<()> {
    if *more {
        *more = compile_arg(gs, lx, WT::Any, prevargs, None)?;
    }
    if !*more {
        gs.code.push(Op::Null as u32 | ret_code(rettype, 0));
        return Ok(());
    }
    let start1 = gs.code.len();
    *more = compile_arg(gs, lx, WT::Code, prevargs + 1, None)?;
    if !*more {
        gs.code.push(enc(Op::Pop, RetType::Null));
        gs.code.push(Op::Null as u32 | ret_code(rettype, 0));
        return Ok(());
    }
    let start2 = gs.code.len();
    *more = compile_arg(gs, lx, WT::Code, prevargs + 2, None)?;
    let inst1 = gs.code[start1];
    let op1 = inst1 & !RET_MASK;
    let len1 = (start2 - (start1 + 1)) as u32;
    if !*more {
        if op1 == Op::Block as u32 | (len1 << DATA_SHIFT) {
            gs.code[start1] = (len1 << DATA_SHIFT) | Op::JumpB as u32 | FLAG_FALSE;
            gs.code[start1 + 1] = enc(Op::EnterResult, RetType::Null);
            let at = start1 + len1 as usize;
            gs.code[at] = (gs.code[at] & !RET_MASK) | ret_code(rettype, 0);
            return Ok(());
        }
        gs.code.push(enc(Op::Empty, RetType::Null));
    } else {
        let inst2 = gs.code[start2];
        let op2 = inst2 & !RET_MASK;
        let len2 = (gs.code.len() - (start2 + 1)) as u32;
        if op2 == Op::Block as u32 | (len2 << DATA_SHIFT) {
            if op1 == Op::Block as u32 | (len1 << DATA_SHIFT) {
                gs.code[start1] =
                    (((start2 - start1) as u32) << DATA_SHIFT) | Op::JumpB as u32 | FLAG_FALSE;
                gs.code[start1 + 1] = enc(Op::EnterResult, RetType::Null);
                let at1 = start1 + len1 as usize;
                gs.code[at1] = (gs.code[at1] & !RET_MASK) | ret_code(rettype, 0);
                gs.code[start2] = (len2 << DATA_SHIFT) | Op::Jump as u32;
                gs.code[start2 + 1] = enc(Op::EnterResult, RetType::Null);
                let at2 = start2 + len2 as usize;
                gs.code[at2] = (gs.code[at2] & !RET_MASK) | ret_code(rettype, 0);
                return Ok(());
            } else if op1 == Op::Empty as u32 | (len1 << DATA_SHIFT) {
                gs.code[start1] = Op::Null as u32 | (inst2 & RET_MASK);
                gs.code[start2] = (len2 << DATA_SHIFT) | Op::JumpB as u32 | FLAG_TRUE;
                gs.code[start2 + 1] = enc(Op::EnterResult, RetType::Null);
                let at2 = start2 + len2 as usize;
                gs.code[at2] = (gs.code[at2] & !RET_MASK) | ret_code(rettype, 0);
                return Ok(());
            }
        }
    }
    gs.code
        .push(Op::Com as u32 | ret_code(rettype, 0) | ((idx as u32) << DATA_SHIFT));
    Ok(())
}

/// Compile `&&`/`||`, fusing a run of block arguments into
/// short-circuit jumps.
fn compile_and_or(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    idx: usize,
    is_and: bool,
    more: &mut bool,
    prevargs: usize,
    rettype: WordType,
) -> CsResult<()> {
    let mut numargs = 0usize;
    if *more {
        *more = compile_arg(gs, lx, WT::Cond, prevargs, None)?;
    }
    if !*more {
        gs.code
            .push((if is_and { Op::True } else { Op::False }) as u32 | ret_code(rettype, 0));
        return Ok(());
    }
    numargs += 1;
    let mut start = gs.code.len();
    let mut end = start;
    while numargs < MAX_ARGUMENTS {
        *more = compile_arg(gs, lx, WT::Cond, prevargs + numargs, None)?;
        if !*more {
            break;
        }
        numargs += 1;
        if (gs.code[end] & !RET_MASK)
            != Op::Block as u32 | (((gs.code.len() - (end + 1)) as u32) << DATA_SHIFT)
        {
            break;
        }
        end = gs.code.len();
    }
    if *more {
        while numargs < MAX_ARGUMENTS {
            *more = compile_arg(gs, lx, WT::Cond, prevargs + numargs, None)?;
            if !*more {
                break;
            }
            numargs += 1;
        }
        gs.code.push(
            Op::ComV as u32
                | ret_code(rettype, 0)
                | ((numargs as u32) << DATA_SHIFT)
                | ((idx as u32) << 13),
        );
    } else {
        let op = Op::JumpResult as u32 | if is_and { FLAG_FALSE } else { FLAG_TRUE };
        gs.code.push(op);
        end = gs.code.len();
        while start + 1 < end {
            let len = (gs.code[start] >> DATA_SHIFT) as usize;
            gs.code[start] = (((end - (start + 1)) as u32) << DATA_SHIFT) | op;
            gs.code[start + 1] = enc(Op::Enter, RetType::Null);
            let at = start + len;
            gs.code[at] = (gs.code[at] & !RET_MASK) | ret_code(rettype, 0);
            start += len + 1;
        }
    }
    Ok(())
}

/// Compile a sequence of statements until the closing bracket `brak`
/// (`0` for end of input).
fn compile_statements(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    rettype: WordType,
    brak: u8,
    prevargs: usize,
) -> CsResult<()> {
    loop {
        lx.skip_comments().map_err(|e| gs.err(lx.line, e))?;
        let mut idname = String::new();
        let curline = lx.line;
        let mut more = compile_arg(gs, lx, WT::Word, prevargs, Some(&mut idname))?;
        if more {
            lx.skip_comments().map_err(|e| gs.err(lx.line, e))?;
            if lx.current() == b'=' {
                let c1 = lx.peek(1);
                let is_assign = match c1 {
                    b'/' => lx.peek(2) == b'/',
                    b';' | b' ' | b'\t' | b'\r' | b'\n' | 0 => true,
                    _ => false,
                };
                if is_assign {
                    lx.next_char();
                    let mut handled = false;
                    if !idname.is_empty() {
                        if let Ok(idx) = gs.cs.new_ident(&idname, IdentFlags::UNKNOWN) {
                            match &gs.cs.istate.identmap[idx].kind {
                                IdentKind::Alias(_) => {
                                    more = compile_arg(gs, lx, WT::Any, prevargs, None)?;
                                    if !more {
                                        gs.gen_str("");
                                    }
                                    let op = if idx < MAX_ARGUMENTS {
                                        Op::AliasArg
                                    } else {
                                        Op::Alias
                                    };
                                    gs.code
                                        .push(enc_data(op, RetType::Null, idx as u32));
                                    handled = true;
                                }
                                IdentKind::Ivar(_) => {
                                    more = compile_arg(gs, lx, WT::Int, prevargs, None)?;
                                    if !more {
                                        gs.gen_int(0);
                                    }
                                    gs.code
                                        .push(enc_data(Op::Ivar1, RetType::Null, idx as u32));
                                    handled = true;
                                }
                                IdentKind::Fvar(_) => {
                                    more = compile_arg(gs, lx, WT::Float, prevargs, None)?;
                                    if !more {
                                        gs.gen_float(0.0);
                                    }
                                    gs.code
                                        .push(enc_data(Op::Fvar1, RetType::Null, idx as u32));
                                    handled = true;
                                }
                                IdentKind::Svar(_) => {
                                    more = compile_arg(gs, lx, WT::Str, prevargs, None)?;
                                    if !more {
                                        gs.gen_str("");
                                    }
                                    gs.code
                                        .push(enc_data(Op::Svar1, RetType::Null, idx as u32));
                                    handled = true;
                                }
                                IdentKind::Command(_) => {
                                    gs.gen_str(&idname);
                                }
                            }
                        } else {
                            gs.gen_str(&idname);
                        }
                    }
                    if !handled {
                        more = compile_arg(gs, lx, WT::Any, MAX_RESULTS, None)?;
                        if !more {
                            gs.gen_str("");
                        }
                        gs.code.push(enc(Op::AliasU, RetType::Null));
                    }
                    end_statement(gs, lx, &mut more, brak)?;
                    match stmt_next(gs, lx, brak)? {
                        StmtFlow::Continue => continue,
                        StmtFlow::Return => return Ok(()),
                    }
                }
            }
        }
        if more {
            if idname.is_empty() {
                compile_call_unknown(gs, lx, &mut more, prevargs)?;
            } else {
                match gs.cs.get_ident(&idname) {
                    None => {
                        if !check_num(&idname) {
                            gs.gen_str(&idname);
                            compile_call_unknown(gs, lx, &mut more, prevargs)?;
                        } else {
                            match rettype {
                                WT::Any => {
                                    let (val, end) = parse_int_end(&idname);
                                    if end != idname.len() {
                                        gs.gen_str(&idname);
                                    } else {
                                        gs.gen_int(val);
                                    }
                                }
                                _ => gs.gen_value(rettype, &idname, curline)?,
                            }
                            gs.code.push(enc(Op::Result, RetType::Null));
                        }
                    }
                    Some(idx) => match gs.cs.istate.identmap[idx].command_kind() {
                        CommandKind::Normal
                            if gs.cs.istate.identmap[idx].is_command() =>
                        {
                            compile_cmd(gs, lx, idx, &mut more, rettype, prevargs)?;
                        }
                        CommandKind::Local => compile_local(gs, lx, &mut more, prevargs)?,
                        CommandKind::Do => {
                            compile_do(gs, lx, &mut more, prevargs, rettype, Op::Do)?;
                        }
                        CommandKind::DoArgs => {
                            compile_do(gs, lx, &mut more, prevargs, rettype, Op::DoArgs)?;
                        }
                        CommandKind::If => {
                            compile_if(gs, lx, idx, &mut more, prevargs, rettype)?;
                        }
                        CommandKind::Break => {
                            gs.code.push(Op::Break as u32 | FLAG_FALSE);
                        }
                        CommandKind::Continue => {
                            gs.code.push(Op::Break as u32 | FLAG_TRUE);
                        }
                        CommandKind::Result => {
                            if more {
                                more = compile_arg(gs, lx, WT::Any, prevargs, None)?;
                            }
                            gs.code.push(
                                (if more { Op::Result } else { Op::Null }) as u32
                                    | ret_code(rettype, 0),
                            );
                        }
                        CommandKind::Not => {
                            if more {
                                more = compile_arg(gs, lx, WT::Any, prevargs, None)?;
                            }
                            gs.code.push(
                                (if more { Op::Not } else { Op::True }) as u32
                                    | ret_code(rettype, 0),
                            );
                        }
                        CommandKind::And => {
                            compile_and_or(gs, lx, idx, true, &mut more, prevargs, rettype)?;
                        }
                        CommandKind::Or => {
                            compile_and_or(gs, lx, idx, false, &mut more, prevargs, rettype)?;
                        }
                        CommandKind::Normal => match &gs.cs.istate.identmap[idx].kind {
                            IdentKind::Alias(_) => {
                                compile_alias_call(gs, lx, idx, &mut more, prevargs)?;
                            }
                            IdentKind::Ivar(_) => {
                                let hex = gs.cs.istate.identmap[idx]
                                    .flags
                                    .contains(IdentFlags::HEX);
                                more = compile_arg(gs, lx, WT::Int, prevargs, None)?;
                                if !more {
                                    gs.code
                                        .push(enc_data(Op::Print, RetType::Null, idx as u32));
                                } else {
                                    // HEX vars accept up to three colour fields
                                    let mut two = false;
                                    if hex {
                                        more = compile_arg(gs, lx, WT::Int, prevargs + 1, None)?;
                                        two = more;
                                    }
                                    if !two {
                                        gs.code
                                            .push(enc_data(Op::Ivar1, RetType::Null, idx as u32));
                                    } else {
                                        more = compile_arg(gs, lx, WT::Int, prevargs + 2, None)?;
                                        if !more {
                                            gs.code.push(enc_data(
                                                Op::Ivar2,
                                                RetType::Null,
                                                idx as u32,
                                            ));
                                        } else {
                                            gs.code.push(enc_data(
                                                Op::Ivar3,
                                                RetType::Null,
                                                idx as u32,
                                            ));
                                        }
                                    }
                                }
                            }
                            IdentKind::Fvar(_) => {
                                more = compile_arg(gs, lx, WT::Float, prevargs, None)?;
                                if !more {
                                    gs.code
                                        .push(enc_data(Op::Print, RetType::Null, idx as u32));
                                } else {
                                    gs.code
                                        .push(enc_data(Op::Fvar1, RetType::Null, idx as u32));
                                }
                            }
                            IdentKind::Svar(_) => {
                                more = compile_arg(gs, lx, WT::Str, prevargs, None)?;
                                if !more {
                                    gs.code
                                        .push(enc_data(Op::Print, RetType::Null, idx as u32));
                                } else {
                                    let mut numargs = 1usize;
                                    while numargs < MAX_ARGUMENTS {
                                        more = compile_arg(
                                            gs,
                                            lx,
                                            WT::Any,
                                            prevargs + numargs,
                                            None,
                                        )?;
                                        if !more {
                                            break;
                                        }
                                        numargs += 1;
                                    }
                                    if numargs > 1 {
                                        gs.code.push(enc_data(
                                            Op::Conc,
                                            RetType::Str,
                                            numargs as u32,
                                        ));
                                    }
                                    gs.code
                                        .push(enc_data(Op::Svar1, RetType::Null, idx as u32));
                                }
                            }
                            IdentKind::Command(_) => {
                                compile_cmd(gs, lx, idx, &mut more, rettype, prevargs)?;
                            }
                        },
                    },
                }
            }
        }
        end_statement(gs, lx, &mut more, brak)?;
        match stmt_next(gs, lx, brak)? {
            StmtFlow::Continue => continue,
            StmtFlow::Return => return Ok(()),
        }
    }
}

/// Head word of a statement resolved to nothing known at compile time:
/// compile the arguments and dispatch at runtime.
fn compile_call_unknown(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    more: &mut bool,
    prevargs: usize,
) -> CsResult<()> {
    let mut numargs = 0usize;
    while numargs < MAX_ARGUMENTS {
        *more = compile_arg(gs, lx, WT::Any, prevargs + numargs, None)?;
        if !*more {
            break;
        }
        numargs += 1;
    }
    gs.code
        .push(enc_data(Op::CallU, RetType::Null, numargs as u32));
    Ok(())
}

/// Drain any unconsumed arguments of the finished statement.
fn end_statement(
    gs: &mut GenState<'_>,
    lx: &mut Lexer<'_>,
    more: &mut bool,
    _brak: u8,
) -> CsResult<()> {
    if *more {
        while compile_arg(gs, lx, WT::Pop, MAX_RESULTS, None)? {}
        *more = false;
    }
    Ok(())
}

enum StmtFlow {
    Continue,
    Return,
}

/// Scan to the statement terminator, handling comments and the closing
/// bracket.
fn stmt_next(gs: &mut GenState<'_>, lx: &mut Lexer<'_>, brak: u8) -> CsResult<StmtFlow> {
    loop {
        match lx.skip_until(b")];/\n") {
            0 => {
                if brak != 0 {
                    return Err(gs.err(
                        lx.line,
                        format!("missing \"{}\"", brak as char),
                    ));
                }
                return Ok(StmtFlow::Return);
            }
            c @ (b')' | b']') => {
                if c == brak {
                    lx.next_char();
                    return Ok(StmtFlow::Return);
                }
                return Err(gs.err(lx.line, format!("unexpected \"{}\"", c as char)));
            }
            b'/' => {
                lx.next_char();
                if lx.current() == b'/' {
                    lx.skip_until_char(b'\n');
                }
            }
            _ => {
                lx.next_char();
                return Ok(StmtFlow::Continue);
            }
        }
    }
}

/// Compile a source buffer into a complete code block.
pub(crate) fn compile_main(cs: &mut CsState, source: &str, src_name: &str) -> CsResult<CodeRef> {
    trace!(len = source.len(), src_name, "compiling");
    let mut gs = GenState {
        cs,
        code: Vec::with_capacity(64),
        src_name: src_name.to_owned(),
    };
    gs.code.push(enc(Op::Start, RetType::Null));
    let mut lx = Lexer::new(source.as_bytes(), 1);
    compile_statements(&mut gs, &mut lx, WT::Any, 0, 0)?;
    gs.code.push(enc(Op::Exit, RetType::Null));
    Ok(CodeRef::from_words(gs.code))
}

/// Compile a plain literal into a block that moves it into the result.
pub(crate) fn compile_literal(cs: &mut CsState, v: &Value) -> CodeRef {
    let mut gs = GenState {
        cs,
        code: Vec::with_capacity(8),
        src_name: String::new(),
    };
    gs.code.push(enc(Op::Start, RetType::Null));
    match v {
        Value::Int(i) => gs.gen_int(*i),
        Value::Float(f) => gs.gen_float(*f),
        _ => gs.gen_null(),
    }
    gs.code.push(enc(Op::Result, RetType::Null));
    gs.code.push(enc(Op::Exit, RetType::Null));
    CodeRef::from_words(gs.code)
}
