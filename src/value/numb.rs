//! Parsing, formatting, and lossless binary conversion for CIF numeric values.
//!
//! A [`Numb`] never forgets the digit string it was built from: the quantity
//! is always `sign * digits * 10^-scale`, computed on demand through
//! [`bignum`] rather than cached as an imprecise `f64`.

use super::bignum;
use crate::error::CifError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    fn of(negative: bool) -> Self {
        if negative { Sign::Minus } else { Sign::Plus }
    }

    fn as_f64_multiplier(self) -> f64 {
        match self {
            Sign::Plus => 1.0,
            Sign::Minus => -1.0,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Sign::Plus => "",
            Sign::Minus => "-",
        }
    }
}

/// A CIF `Numb` value: a signed decimal with an optional standard uncertainty,
/// always expressed as an exact digit string at a fixed `scale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numb {
    text: String,
    sign: Sign,
    digits: String,
    su_digits: Option<String>,
    scale: i32,
}

impl Numb {
    /// Rebuilds a `Numb` from its already-validated constituent parts, e.g.
    /// when reconstructing one from [`super::Value::deserialize`]. Callers
    /// are responsible for `digits`/`su_digits` being valid decimal digit
    /// strings and `text` being their correctly rendered display form.
    pub(crate) fn from_parts(sign: Sign, digits: String, su_digits: Option<String>, scale: i32, text: String) -> Self {
        Numb { text, sign, digits, su_digits, scale }
    }

    pub fn zero() -> Self {
        Numb {
            text: "0".to_string(),
            sign: Sign::Plus,
            digits: "0".to_string(),
            su_digits: None,
            scale: 0,
        }
    }

    pub fn display_text(&self) -> &str {
        &self.text
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn su_digits(&self) -> Option<&str> {
        self.su_digits.as_deref()
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Computes the value as an `f64`, correctly rounded to within one ULP of
    /// the exact digit string.
    pub fn get_number(&self) -> f64 {
        self.sign.as_f64_multiplier() * bignum::digits_to_f64(&self.digits, self.scale)
    }

    /// Computes the standard uncertainty as an `f64`, or `0.0` if none was recorded.
    pub fn get_su(&self) -> f64 {
        match &self.su_digits {
            Some(d) => bignum::digits_to_f64(d, self.scale),
            None => 0.0,
        }
    }

    /// Parses CIF NUMB grammar:
    /// `[+-]? ( D+ ('.' D*)? | '.' D+ ) ([eE] [+-]? D+)? ('(' D+ ')')?`
    pub fn parse(text: &str) -> Result<Self, CifError> {
        let bytes = text.as_bytes();
        let mut i = 0;
        let negative = match bytes.first() {
            Some(b'+') => {
                i += 1;
                false
            }
            Some(b'-') => {
                i += 1;
                true
            }
            _ => false,
        };

        let int_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let int_digits = &text[int_start..i];

        let mut frac_digits = "";
        let mut saw_point = false;
        if i < bytes.len() && bytes[i] == b'.' {
            saw_point = true;
            i += 1;
            let frac_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            frac_digits = &text[frac_start..i];
        }

        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(CifError::InvalidNumber {
                text: text.to_string(),
                position: None,
            });
        }
        if saw_point && int_digits.is_empty() && frac_digits.is_empty() {
            return Err(CifError::InvalidNumber {
                text: text.to_string(),
                position: None,
            });
        }

        let mut exponent: i32 = 0;
        if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
            let save = i;
            i += 1;
            let exp_negative = match bytes.get(i) {
                Some(b'+') => {
                    i += 1;
                    false
                }
                Some(b'-') => {
                    i += 1;
                    true
                }
                _ => false,
            };
            let exp_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if exp_start == i {
                // No exponent digits after 'e': not part of the NUMB grammar at all.
                i = save;
            } else {
                let raw: i32 = text[exp_start..i]
                    .parse()
                    .map_err(|_| CifError::InvalidNumber { text: text.to_string(), position: None })?;
                exponent = if exp_negative { -raw } else { raw };
            }
        }

        let mut su_digits = None;
        if i < bytes.len() && bytes[i] == b'(' {
            i += 1;
            let su_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if su_start == i || i >= bytes.len() || bytes[i] != b')' {
                return Err(CifError::InvalidNumber { text: text.to_string(), position: None });
            }
            su_digits = Some(strip_leading_zeros(&text[su_start..i]));
            i += 1;
        }

        if i != bytes.len() {
            return Err(CifError::InvalidNumber { text: text.to_string(), position: None });
        }

        let scale = frac_digits.len() as i32 - exponent;
        let raw_digits = format!("{int_digits}{frac_digits}");
        let digits = strip_leading_zeros(&raw_digits);

        Ok(Numb {
            text: text.to_string(),
            sign: Sign::of(negative),
            digits,
            su_digits,
            scale,
        })
    }

    /// Rounds `value`/`su` to `scale` decimal places and renders the narrowest
    /// legal display text (plain decimal, or scientific when `scale < 0` or the
    /// plain form would need more than `max_lead_zeros` leading zero digits).
    pub fn init(value: f64, su: f64, scale: i32, max_lead_zeros: u32) -> Self {
        let negative = value.is_sign_negative() && value != 0.0;
        let digits = bignum::round_f64_to_scale_digits(value, scale);
        let su_digits = if su != 0.0 {
            Some(bignum::round_f64_to_scale_digits(su, scale))
        } else {
            None
        };
        let sign = Sign::of(negative);
        let text = render(sign, &digits, su_digits.as_deref(), scale, max_lead_zeros);
        Numb { text, sign, digits, su_digits, scale }
    }

    /// Picks a scale automatically from `(value, su, su_rule)` and otherwise
    /// behaves like [`Numb::init`] with a generous `max_lead_zeros`.
    pub fn autoinit(value: f64, su: f64, su_rule: u32) -> Result<Self, CifError> {
        if su_rule < 2 {
            return Err(CifError::InvalidNumber {
                text: format!("su_rule={su_rule}"),
                position: None,
            });
        }
        let scale = if su == 0.0 {
            shortest_roundtrip_scale(value)
        } else {
            su_scale(su, su_rule)
        };
        Ok(Self::init(value, su, scale, 9))
    }
}

fn strip_leading_zeros(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }
}

fn render(sign: Sign, digits: &str, su_digits: Option<&str>, scale: i32, max_lead_zeros: u32) -> String {
    let su_suffix = su_digits.map(|s| format!("({s})")).unwrap_or_default();

    if digits == "0" || scale >= 0 {
        let (int_part, frac_part) = split_at_scale(digits, scale.max(0));
        let leading_zeros = frac_part.chars().take_while(|&c| c == '0').count() as u32;
        if digits == "0" || scale < 0 || leading_zeros <= max_lead_zeros {
            return if scale <= 0 {
                format!("{}{int_part}{su_suffix}", sign.prefix())
            } else {
                format!("{}{int_part}.{frac_part}{su_suffix}", sign.prefix())
            };
        }
    }

    let exponent = digits.len() as i32 - 1 - scale;
    let mantissa = if digits.len() > 1 {
        format!("{}.{}", &digits[..1], &digits[1..])
    } else {
        digits.to_string()
    };
    let exp_sign = if exponent < 0 { "-" } else { "+" };
    format!("{}{mantissa}e{exp_sign}{:02}{su_suffix}", sign.prefix(), exponent.abs())
}

/// Splits a non-negative-scale digit string into its integer and fractional
/// parts, left-padding with zeros so the fractional part always has `scale` digits.
fn split_at_scale(digits: &str, scale: i32) -> (String, String) {
    let scale = scale as usize;
    if digits.len() <= scale {
        let pad = scale - digits.len();
        ("0".to_string(), format!("{}{}", "0".repeat(pad), digits))
    } else {
        let split = digits.len() - scale;
        (digits[..split].to_string(), digits[split..].to_string())
    }
}

/// The scale used by the shortest decimal text that round-trips exactly back
/// to `value` — this is std's own shortest round-trip formatter doing the
/// "reproduce to full binary precision with as few digits as the value's
/// binary fraction allows" work that `DBL_DIG - MSP(value)` approximates.
fn shortest_roundtrip_scale(value: f64) -> i32 {
    if value == 0.0 {
        return 0;
    }
    let plain = format!("{:.*}", shortest_fraction_digits(value), value.abs());
    match plain.split_once('.') {
        Some((_, frac)) => frac.len() as i32,
        None => 0,
    }
}

/// Finds the smallest number of fractional digits that round-trips `value`.
fn shortest_fraction_digits(value: f64) -> usize {
    for digits in 0..=17 {
        let text = format!("{:.*}", digits, value.abs());
        if text.parse::<f64>() == Ok(value.abs()) {
            return digits;
        }
    }
    17
}

/// Implements the standard-uncertainty display-precision convention: su is
/// shown to as many significant digits as `su_rule` itself has, unless that
/// many digits would round su above `su_rule`, in which case one fewer digit
/// is used.
fn su_scale(su: f64, su_rule: u32) -> i32 {
    let su = su.abs();
    let max_digits = ((su_rule as f64 + 0.5).log10().floor() as i32 + 1).max(1);
    let p0 = su.log10().floor() as i32;

    let mut digit_count = max_digits;
    loop {
        let last_pos = p0 - (digit_count - 1);
        let scale = -last_pos;
        let rounded = bignum::round_f64_to_scale_digits(su, scale);
        let value: u64 = rounded.parse().unwrap_or(u64::MAX);
        if digit_count <= 1 || value <= su_rule as u64 {
            return scale;
        }
        digit_count -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_integer() {
        let n = Numb::parse("1").unwrap();
        assert_eq!(n.sign(), Sign::Plus);
        assert_eq!(n.digits(), "1");
        assert_eq!(n.scale(), 0);
    }

    #[test]
    fn parses_signed_decimal_with_exponent_and_su() {
        let n = Numb::parse("-1.5e-3(2)").unwrap();
        assert_eq!(n.sign(), Sign::Minus);
        // scale = frac digits (1) - exponent(-3) = 4
        assert_eq!(n.scale(), 4);
        assert_eq!(n.su_digits(), Some("2"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Numb::parse("abc").is_err());
        assert!(Numb::parse("+").is_err());
        assert!(Numb::parse("1.2.3").is_err());
    }

    #[test]
    fn init_numb_matches_worked_example() {
        let n = Numb::init(12.3456, 0.003, 3, 9);
        assert_eq!(n.display_text(), "12.346(3)");
        assert!((n.get_number() - 12.346).abs() < 1e-9);
        assert!((n.get_su() - 0.003).abs() < 1e-9);
    }

    #[test]
    fn autoinit_matches_worked_example() {
        let n = Numb::autoinit(1721.51, 24.0, 19).unwrap();
        assert_eq!(n.display_text(), "1.72e+03(2)");
        assert!((n.get_number() - 1720.0).abs() < 1e-6);
        assert!((n.get_su() - 20.0).abs() < 1e-6);
    }
}
