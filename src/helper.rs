use std::fmt;

pub const KIBI: usize = 1024;

/// Writes a number the way the engine prints it: `%.17g` for values whose
/// fractional part vanishes at single precision, `%g` otherwise.
pub fn write_number(out: &mut impl fmt::Write, n: f64) -> fmt::Result {
    if (n.fract() as f32) == 0.0 { write_g(out, n, 17) } else { write_g(out, n, 6) }
}

/// C-style `%.<precision>g`.
pub fn write_g(out: &mut impl fmt::Write, v: f64, precision: usize) -> fmt::Result {
    if v.is_nan() {
        return out.write_str("nan");
    }
    if v.is_infinite() {
        return out.write_str(if v < 0.0 { "-inf" } else { "inf" });
    }
    if v == 0.0 {
        return out.write_str(if v.is_sign_negative() { "-0" } else { "0" });
    }
    let p = precision.max(1);
    let sci = format!("{:.*e}", p - 1, v);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= p as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        write!(out, "{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let fixed = format!("{:.*}", (p as i32 - 1 - exp) as usize, v);
        out.write_str(trim_fraction(&fixed))
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') { s.trim_end_matches('0').trim_end_matches('.') } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> String {
        let mut s = String::new();
        write_number(&mut s, n).unwrap();
        s
    }

    #[test]
    fn integral_values_use_full_precision() {
        assert_eq!(num(7.0), "7");
        assert_eq!(num(-42.0), "-42");
        assert_eq!(num(9007199254740992.0), "9007199254740992");
        assert_eq!(num(1e21), "1e+21");
    }

    #[test]
    fn fractional_values_use_short_form() {
        assert_eq!(num(0.5), "0.5");
        assert_eq!(num(0.1), "0.1");
        assert_eq!(num(1.0 / 3.0), "0.333333");
        assert_eq!(num(123456.75), "123457");
        assert_eq!(num(0.0001234), "0.0001234");
        assert_eq!(num(0.00001234), "1.234e-05");
    }

    #[test]
    fn special_values() {
        assert_eq!(num(f64::NAN), "nan");
        assert_eq!(num(f64::INFINITY), "inf");
        assert_eq!(num(f64::NEG_INFINITY), "-inf");
        assert_eq!(num(-0.0), "-0");
    }
}
