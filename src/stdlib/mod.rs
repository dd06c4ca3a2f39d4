//! The builtin command library
//!
//! Everything here registers through the same `new_command` path an
//! embedder uses; the VM knows none of these by identity.

use crate::error::CsResult;
use crate::state::CsState;

mod base;
mod list;
mod math;
mod strings;

pub(crate) fn init(cs: &mut CsState) -> CsResult<()> {
    base::init(cs)?;
    math::init(cs)?;
    strings::init(cs)?;
    list::init(cs)?;
    Ok(())
}
