//! String commands

use std::rc::Rc;

use crate::error::CsResult;
use crate::parse::{escape_string, unescape_string};
use crate::state::CsState;
use crate::value::Value;
use crate::vm::concat_values;

fn str_cmp(args: &mut [Value], res: &mut Value, cmp: impl Fn(&str, &str) -> bool) {
    let val = if args.len() >= 2 {
        let mut ok = cmp(&args[0].get_str(), &args[1].get_str());
        for i in 2..args.len() {
            if !ok {
                break;
            }
            ok = cmp(&args[i - 1].get_str(), &args[i].get_str());
        }
        ok
    } else {
        cmp(&args.first().map_or_else(String::new, Value::get_str), "")
    };
    *res = Value::Int(i64::from(val));
}

pub(crate) fn init(cs: &mut CsState) -> CsResult<()> {
    cs.new_command("strstr", "ss", |_, args, res| {
        let a = args[0].get_str();
        let b = args[1].get_str();
        *res = Value::Int(a.find(&b).map_or(-1, |p| p as i64));
        Ok(())
    })?;

    cs.new_command("strlen", "s", |_, args, res| {
        *res = Value::Int(args[0].get_str().len() as i64);
        Ok(())
    })?;

    cs.new_command("strcode", "si", |_, args, res| {
        let s = args[0].get_str();
        let i = args[1].get_int();
        let c = if i >= 0 {
            s.as_bytes().get(i as usize).copied().unwrap_or(0)
        } else {
            0
        };
        *res = Value::Int(i64::from(c));
        Ok(())
    })?;

    cs.new_command("codestr", "i", |_, args, res| {
        let c = args[0].get_int();
        let s = if (1..=255).contains(&c) {
            ((c as u8) as char).to_string()
        } else {
            String::new()
        };
        *res = Value::Str(Rc::from(s));
        Ok(())
    })?;

    cs.new_command("strlower", "s", |_, args, res| {
        *res = Value::Str(Rc::from(args[0].get_str().to_lowercase()));
        Ok(())
    })?;

    cs.new_command("strupper", "s", |_, args, res| {
        *res = Value::Str(Rc::from(args[0].get_str().to_uppercase()));
        Ok(())
    })?;

    cs.new_command("escape", "s", |_, args, res| {
        let mut out = String::new();
        escape_string(&mut out, &args[0].get_str());
        *res = Value::Str(Rc::from(out));
        Ok(())
    })?;

    cs.new_command("unescape", "s", |_, args, res| {
        let mut out = String::new();
        unescape_string(&mut out, &args[0].get_str());
        *res = Value::Str(Rc::from(out));
        Ok(())
    })?;

    cs.new_command("concat", "V", |_, args, res| {
        *res = Value::Str(Rc::from(concat_values(args, " ")));
        Ok(())
    })?;

    cs.new_command("concatword", "V", |_, args, res| {
        *res = Value::Str(Rc::from(concat_values(args, "")));
        Ok(())
    })?;

    cs.new_command("format", "V", |_, args, res| {
        if args.is_empty() {
            return Ok(());
        }
        let fmt = args[0].get_str();
        let b = fmt.as_bytes();
        let mut out = String::new();
        let mut i = 0;
        while i < b.len() {
            let c = b[i];
            i += 1;
            if c == b'%' && i < b.len() {
                let ic = b[i];
                i += 1;
                if ic.is_ascii_digit() && ic != b'0' {
                    let n = (ic - b'0') as usize;
                    if n < args.len() {
                        out.push_str(&args[n].get_str());
                    }
                } else {
                    out.push(ic as char);
                }
            } else {
                out.push(c as char);
            }
        }
        *res = Value::Str(Rc::from(out));
        Ok(())
    })?;

    cs.new_command("substr", "siiN", |_, args, res| {
        let s = args[0].get_str();
        let start = args[1].get_int();
        let count = args[2].get_int();
        let numargs = args[3].get_int();
        let b = s.as_bytes();
        let len = b.len() as i64;
        let offset = start.clamp(0, len) as usize;
        let take = if numargs >= 3 {
            count.clamp(0, len - offset as i64) as usize
        } else {
            len as usize - offset
        };
        *res = Value::Str(Rc::from(
            String::from_utf8_lossy(&b[offset..offset + take]).into_owned(),
        ));
        Ok(())
    })?;

    cs.new_command("=s", "s1V", |_, args, res| {
        str_cmp(args, res, |a, b| a == b);
        Ok(())
    })?;
    cs.new_command("!=s", "s1V", |_, args, res| {
        str_cmp(args, res, |a, b| a != b);
        Ok(())
    })?;
    cs.new_command("<s", "s1V", |_, args, res| {
        str_cmp(args, res, |a, b| a < b);
        Ok(())
    })?;
    cs.new_command(">s", "s1V", |_, args, res| {
        str_cmp(args, res, |a, b| a > b);
        Ok(())
    })?;
    cs.new_command("<=s", "s1V", |_, args, res| {
        str_cmp(args, res, |a, b| a <= b);
        Ok(())
    })?;
    cs.new_command(">=s", "s1V", |_, args, res| {
        str_cmp(args, res, |a, b| a >= b);
        Ok(())
    })?;

    cs.new_command("strreplace", "ssss", |_, args, res| {
        let s = args[0].get_str();
        let oldval = args[1].get_str();
        let newval = args[2].get_str();
        let mut newval2 = args[3].get_str();
        if newval2.is_empty() {
            newval2 = newval.clone();
        }
        if oldval.is_empty() {
            *res = Value::Str(Rc::from(s));
            return Ok(());
        }
        let mut buf = String::with_capacity(s.len());
        let mut rest = s.as_str();
        // occurrences alternate between the two replacements
        let mut i = 0usize;
        while let Some(p) = rest.find(&oldval) {
            buf.push_str(&rest[..p]);
            buf.push_str(if i & 1 != 0 { &newval2 } else { &newval });
            rest = &rest[p + oldval.len()..];
            i += 1;
        }
        buf.push_str(rest);
        *res = Value::Str(Rc::from(buf));
        Ok(())
    })?;

    Ok(())
}
