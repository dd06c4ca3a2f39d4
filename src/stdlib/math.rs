//! Arithmetic, comparison and bitwise commands
//!
//! Binary operators fold left over their argument list; with a single
//! argument the unary form applies, with none the identity value is
//! produced. Comparisons chain pairwise and yield 1 only when every
//! adjacent pair holds.

use crate::error::CsResult;
use crate::state::CsState;
use crate::value::Value;

const RAD: f64 = std::f64::consts::PI / 180.0;

fn int_op(
    args: &mut [Value],
    res: &mut Value,
    init: i64,
    bin: impl Fn(i64, i64) -> i64,
    un: impl Fn(i64) -> i64,
) {
    let val = if args.len() >= 2 {
        let mut v = bin(args[0].get_int(), args[1].get_int());
        for a in &args[2..] {
            v = bin(v, a.get_int());
        }
        v
    } else {
        un(args.first().map_or(init, Value::get_int))
    };
    *res = Value::Int(val);
}

fn float_op(
    args: &mut [Value],
    res: &mut Value,
    init: f64,
    bin: impl Fn(f64, f64) -> f64,
    un: impl Fn(f64) -> f64,
) {
    let val = if args.len() >= 2 {
        let mut v = bin(args[0].get_float(), args[1].get_float());
        for a in &args[2..] {
            v = bin(v, a.get_float());
        }
        v
    } else {
        un(args.first().map_or(init, Value::get_float))
    };
    *res = Value::Float(val);
}

fn int_cmp(args: &mut [Value], res: &mut Value, cmp: impl Fn(i64, i64) -> bool) {
    let val = if args.len() >= 2 {
        let mut ok = cmp(args[0].get_int(), args[1].get_int());
        for i in 2..args.len() {
            if !ok {
                break;
            }
            ok = cmp(args[i - 1].get_int(), args[i].get_int());
        }
        ok
    } else {
        cmp(args.first().map_or(0, Value::get_int), 0)
    };
    *res = Value::Int(i64::from(val));
}

fn float_cmp(args: &mut [Value], res: &mut Value, cmp: impl Fn(f64, f64) -> bool) {
    let val = if args.len() >= 2 {
        let mut ok = cmp(args[0].get_float(), args[1].get_float());
        for i in 2..args.len() {
            if !ok {
                break;
            }
            ok = cmp(args[i - 1].get_float(), args[i].get_float());
        }
        ok
    } else {
        cmp(args.first().map_or(0.0, Value::get_float), 0.0)
    };
    *res = Value::Int(i64::from(val));
}

pub(crate) fn init(cs: &mut CsState) -> CsResult<()> {
    cs.new_command("+", "i1V", |_, args, res| {
        int_op(args, res, 0, i64::wrapping_add, |v| v);
        Ok(())
    })?;
    cs.new_command("*", "i1V", |_, args, res| {
        int_op(args, res, 1, i64::wrapping_mul, |v| v);
        Ok(())
    })?;
    cs.new_command("-", "i1V", |_, args, res| {
        int_op(args, res, 0, i64::wrapping_sub, i64::wrapping_neg);
        Ok(())
    })?;
    cs.new_command("div", "i1V", |_, args, res| {
        int_op(
            args,
            res,
            0,
            |a, b| if b != 0 { a.wrapping_div(b) } else { 0 },
            |v| v,
        );
        Ok(())
    })?;
    cs.new_command("mod", "i1V", |_, args, res| {
        int_op(
            args,
            res,
            0,
            |a, b| if b != 0 { a.wrapping_rem(b) } else { 0 },
            |v| v,
        );
        Ok(())
    })?;

    cs.new_command("^", "i1V", |_, args, res| {
        int_op(args, res, 0, |a, b| a ^ b, |v| !v);
        Ok(())
    })?;
    cs.new_command("~", "i1V", |_, args, res| {
        int_op(args, res, 0, |a, b| a ^ b, |v| !v);
        Ok(())
    })?;
    cs.new_command("&", "i1V", |_, args, res| {
        int_op(args, res, 0, |a, b| a & b, |v| v);
        Ok(())
    })?;
    cs.new_command("|", "i1V", |_, args, res| {
        int_op(args, res, 0, |a, b| a | b, |v| v);
        Ok(())
    })?;
    cs.new_command("^~", "i1V", |_, args, res| {
        int_op(args, res, 0, |a, b| a ^ !b, |v| v);
        Ok(())
    })?;
    cs.new_command("&~", "i1V", |_, args, res| {
        int_op(args, res, 0, |a, b| a & !b, |v| v);
        Ok(())
    })?;
    cs.new_command("|~", "i1V", |_, args, res| {
        int_op(args, res, 0, |a, b| a | !b, |v| v);
        Ok(())
    })?;
    cs.new_command("<<", "i1V", |_, args, res| {
        int_op(
            args,
            res,
            0,
            |a, b| {
                if (0..64).contains(&b) {
                    a.wrapping_shl(b as u32)
                } else {
                    0
                }
            },
            |v| v,
        );
        Ok(())
    })?;
    cs.new_command(">>", "i1V", |_, args, res| {
        int_op(
            args,
            res,
            0,
            |a, b| a.wrapping_shr(b.clamp(0, 63) as u32),
            |v| v,
        );
        Ok(())
    })?;

    cs.new_command("+f", "f1V", |_, args, res| {
        float_op(args, res, 0.0, |a, b| a + b, |v| v);
        Ok(())
    })?;
    cs.new_command("*f", "f1V", |_, args, res| {
        float_op(args, res, 1.0, |a, b| a * b, |v| v);
        Ok(())
    })?;
    cs.new_command("-f", "f1V", |_, args, res| {
        float_op(args, res, 0.0, |a, b| a - b, |v| -v);
        Ok(())
    })?;
    cs.new_command("divf", "f1V", |_, args, res| {
        float_op(
            args,
            res,
            0.0,
            |a, b| if b != 0.0 { a / b } else { 0.0 },
            |v| v,
        );
        Ok(())
    })?;
    cs.new_command("modf", "f1V", |_, args, res| {
        float_op(
            args,
            res,
            0.0,
            |a, b| if b != 0.0 { a % b } else { 0.0 },
            |v| v,
        );
        Ok(())
    })?;
    cs.new_command("pow", "f1V", |_, args, res| {
        float_op(args, res, 0.0, f64::powf, |v| v);
        Ok(())
    })?;

    cs.new_command("=", "i1V", |_, args, res| {
        int_cmp(args, res, |a, b| a == b);
        Ok(())
    })?;
    cs.new_command("!=", "i1V", |_, args, res| {
        int_cmp(args, res, |a, b| a != b);
        Ok(())
    })?;
    cs.new_command("<", "i1V", |_, args, res| {
        int_cmp(args, res, |a, b| a < b);
        Ok(())
    })?;
    cs.new_command(">", "i1V", |_, args, res| {
        int_cmp(args, res, |a, b| a > b);
        Ok(())
    })?;
    cs.new_command("<=", "i1V", |_, args, res| {
        int_cmp(args, res, |a, b| a <= b);
        Ok(())
    })?;
    cs.new_command(">=", "i1V", |_, args, res| {
        int_cmp(args, res, |a, b| a >= b);
        Ok(())
    })?;

    cs.new_command("=f", "f1V", |_, args, res| {
        float_cmp(args, res, |a, b| a == b);
        Ok(())
    })?;
    cs.new_command("!=f", "f1V", |_, args, res| {
        float_cmp(args, res, |a, b| a != b);
        Ok(())
    })?;
    cs.new_command("<f", "f1V", |_, args, res| {
        float_cmp(args, res, |a, b| a < b);
        Ok(())
    })?;
    cs.new_command(">f", "f1V", |_, args, res| {
        float_cmp(args, res, |a, b| a > b);
        Ok(())
    })?;
    cs.new_command("<=f", "f1V", |_, args, res| {
        float_cmp(args, res, |a, b| a <= b);
        Ok(())
    })?;
    cs.new_command(">=f", "f1V", |_, args, res| {
        float_cmp(args, res, |a, b| a >= b);
        Ok(())
    })?;

    cs.new_command("min", "i1V", |_, args, res| {
        let mut v = args.first().map_or(0, Value::get_int);
        for a in args.iter().skip(1) {
            v = v.min(a.get_int());
        }
        *res = Value::Int(v);
        Ok(())
    })?;
    cs.new_command("max", "i1V", |_, args, res| {
        let mut v = args.first().map_or(0, Value::get_int);
        for a in args.iter().skip(1) {
            v = v.max(a.get_int());
        }
        *res = Value::Int(v);
        Ok(())
    })?;
    cs.new_command("minf", "f1V", |_, args, res| {
        let mut v = args.first().map_or(0.0, Value::get_float);
        for a in args.iter().skip(1) {
            v = v.min(a.get_float());
        }
        *res = Value::Float(v);
        Ok(())
    })?;
    cs.new_command("maxf", "f1V", |_, args, res| {
        let mut v = args.first().map_or(0.0, Value::get_float);
        for a in args.iter().skip(1) {
            v = v.max(a.get_float());
        }
        *res = Value::Float(v);
        Ok(())
    })?;

    cs.new_command("abs", "i", |_, args, res| {
        *res = Value::Int(args[0].get_int().wrapping_abs());
        Ok(())
    })?;
    cs.new_command("absf", "f", |_, args, res| {
        *res = Value::Float(args[0].get_float().abs());
        Ok(())
    })?;
    cs.new_command("floor", "f", |_, args, res| {
        *res = Value::Float(args[0].get_float().floor());
        Ok(())
    })?;
    cs.new_command("ceil", "f", |_, args, res| {
        *res = Value::Float(args[0].get_float().ceil());
        Ok(())
    })?;
    cs.new_command("round", "ff", |_, args, res| {
        let step = args[1].get_float();
        let mut r = args[0].get_float();
        if step > 0.0 {
            r += step * if r < 0.0 { -0.5 } else { 0.5 };
            r -= r % step;
        } else {
            r = if r < 0.0 {
                (r - 0.5).ceil()
            } else {
                (r + 0.5).floor()
            };
        }
        *res = Value::Float(r);
        Ok(())
    })?;

    cs.new_command("sin", "f", |_, args, res| {
        *res = Value::Float((args[0].get_float() * RAD).sin());
        Ok(())
    })?;
    cs.new_command("cos", "f", |_, args, res| {
        *res = Value::Float((args[0].get_float() * RAD).cos());
        Ok(())
    })?;
    cs.new_command("tan", "f", |_, args, res| {
        *res = Value::Float((args[0].get_float() * RAD).tan());
        Ok(())
    })?;
    cs.new_command("sqrt", "f", |_, args, res| {
        *res = Value::Float(args[0].get_float().sqrt());
        Ok(())
    })?;
    cs.new_command("exp", "f", |_, args, res| {
        *res = Value::Float(args[0].get_float().exp());
        Ok(())
    })?;
    cs.new_command("loge", "f", |_, args, res| {
        *res = Value::Float(args[0].get_float().ln());
        Ok(())
    })?;
    cs.new_command("log2", "f", |_, args, res| {
        *res = Value::Float(args[0].get_float().log2());
        Ok(())
    })?;
    cs.new_command("log10", "f", |_, args, res| {
        *res = Value::Float(args[0].get_float().log10());
        Ok(())
    })?;

    Ok(())
}
