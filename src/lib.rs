//! Embeddable Cube/Sauerbraten-style console script interpreter.
//!
//! Source text compiles to a compact 32-bit bytecode stream which a
//! small stack VM interprets. Named entities — aliases, native
//! commands, and integer/float/string variables — live in one
//! identifier table; all strings are interned in a per-state pool.
//!
//! ```
//! use cubescript::prelude::*;
//!
//! let mut cs = CsState::new();
//! let v = cs.run("+ 1 2 3").unwrap();
//! assert_eq!(v.get_int(), 6);
//! ```

pub mod bcode;
pub mod consts;
pub mod error;
pub mod gen;
pub mod ident;
pub mod parse;
pub mod state;
pub mod stdlib;
pub mod strpool;
pub mod value;
pub mod vm;

pub mod prelude {
    //! Embedder-facing re-exports.
    pub use crate::bcode::{CodeRef, Instr, Op, RetType};
    pub use crate::consts::MAX_ARGUMENTS;
    pub use crate::error::{CsError, CsResult, InternalError, ParseError, RunResult, Signal};
    pub use crate::ident::{CommandKind, Ident, IdentFlags, IdentKind};
    pub use crate::parse::{is_valid_name, parse_float, parse_int, ListParser};
    pub use crate::state::{CsState, LoopState};
    pub use crate::strpool::StringPool;
    pub use crate::value::Value;
}
