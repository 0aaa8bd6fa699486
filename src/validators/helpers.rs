//! Validator helper functions
//!
//! Lexical conversions from XSD literals to Rust values. Every function takes
//! the whitespace-normalized text and returns either the value or a short
//! reason that callers wrap into a type checking error.

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

/// Result of a lexical conversion, the error is a human readable reason
pub type LexicalResult<T> = std::result::Result<T, String>;

lazy_static::lazy_static! {
    /// XSD boolean value mapping
    pub static ref XSD_BOOLEAN_MAP: HashMap<&'static str, bool> = {
        let mut m = HashMap::new();
        m.insert("false", false);
        m.insert("0", false);
        m.insert("true", true);
        m.insert("1", true);
        m
    };

    static ref INTEGER_REGEX: Regex = Regex::new(r"^[+-]?[0-9]+$").unwrap();
    static ref DECIMAL_REGEX: Regex = Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$").unwrap();
    static ref FLOAT_REGEX: Regex =
        Regex::new(r"^([+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?|[+-]?INF|NaN)$").unwrap();
    static ref HEX_BINARY_REGEX: Regex = Regex::new(r"^([0-9a-fA-F]{2})*$").unwrap();
    static ref DURATION_REGEX: Regex = Regex::new(
        r"^(-)?P(?:([0-9]+)Y)?(?:([0-9]+)M)?(?:([0-9]+)D)?(?:T(?:([0-9]+)H)?(?:([0-9]+)M)?(?:([0-9]+(?:\.[0-9]+)?)S)?)?$"
    ).unwrap();
    static ref NCNAME_REGEX: Regex = Regex::new(r"^[\p{L}_][\p{L}\p{N}_.\-\u{B7}\p{Mn}\p{Mc}]*$").unwrap();
    static ref NAME_REGEX: Regex = Regex::new(r"^[\p{L}_:][\p{L}\p{N}_.:\-\u{B7}\p{Mn}\p{Mc}]*$").unwrap();
    static ref NMTOKEN_REGEX: Regex = Regex::new(r"^[\p{L}\p{N}_.:\-\u{B7}\p{Mn}\p{Mc}]+$").unwrap();
    static ref LANGUAGE_REGEX: Regex = Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
}

const TIMEZONE: &str = r"(Z|[+-][0-9]{2}:[0-9]{2})?";

lazy_static::lazy_static! {
    static ref DATE_TIME_REGEX: Regex = Regex::new(&format!(
        r"^(-?[0-9]{{4,}})-([0-9]{{2}})-([0-9]{{2}})T([0-9]{{2}}):([0-9]{{2}}):([0-9]{{2}})(\.[0-9]+)?{}$",
        TIMEZONE
    )).unwrap();
    static ref DATE_REGEX: Regex =
        Regex::new(&format!(r"^(-?[0-9]{{4,}})-([0-9]{{2}})-([0-9]{{2}}){}$", TIMEZONE)).unwrap();
    static ref TIME_REGEX: Regex = Regex::new(&format!(
        r"^([0-9]{{2}}):([0-9]{{2}}):([0-9]{{2}})(\.[0-9]+)?{}$",
        TIMEZONE
    )).unwrap();
    static ref G_YEAR_MONTH_REGEX: Regex =
        Regex::new(&format!(r"^(-?[0-9]{{4,}})-([0-9]{{2}}){}$", TIMEZONE)).unwrap();
    static ref G_YEAR_REGEX: Regex = Regex::new(&format!(r"^(-?[0-9]{{4,}}){}$", TIMEZONE)).unwrap();
    static ref G_MONTH_DAY_REGEX: Regex =
        Regex::new(&format!(r"^--([0-9]{{2}})-([0-9]{{2}}){}$", TIMEZONE)).unwrap();
    static ref G_DAY_REGEX: Regex = Regex::new(&format!(r"^---([0-9]{{2}}){}$", TIMEZONE)).unwrap();
    static ref G_MONTH_REGEX: Regex = Regex::new(&format!(r"^--([0-9]{{2}}){}$", TIMEZONE)).unwrap();
}

/// Year used for date/time kinds that carry no year
const REFERENCE_YEAR: i32 = 2000;

// =============================================================================
// Numeric Conversions
// =============================================================================

/// Convert an xs:decimal literal
pub fn decimal_to_rust(value: &str) -> LexicalResult<Decimal> {
    if !DECIMAL_REGEX.is_match(value) {
        return Err("not a valid decimal literal".to_string());
    }
    let text = value.strip_prefix('+').unwrap_or(value);
    let text = if text.ends_with('.') {
        &text[..text.len() - 1]
    } else {
        text
    };
    Decimal::from_str(text).map_err(|e| format!("decimal out of range ({})", e))
}

/// Convert an xs:integer literal into an integer bounded by `min..=max`
pub fn integer_to_rust(value: &str, min: i128, max: i128) -> LexicalResult<i128> {
    if !INTEGER_REGEX.is_match(value) {
        return Err("not a valid integer literal".to_string());
    }
    let text = value.strip_prefix('+').unwrap_or(value);
    let number = text
        .parse::<i128>()
        .map_err(|_| "integer out of range".to_string())?;
    if number < min || number > max {
        return Err(format!("value must be {} <= x <= {}", min, max));
    }
    Ok(number)
}

/// Convert an xs:double or xs:float literal
pub fn float_to_rust(value: &str) -> LexicalResult<f64> {
    if !FLOAT_REGEX.is_match(value) {
        return Err("not a valid floating point literal".to_string());
    }
    match value {
        "NaN" => Ok(f64::NAN),
        "INF" | "+INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        _ => value
            .parse::<f64>()
            .map_err(|_| "not a valid floating point literal".to_string()),
    }
}

/// Convert Rust float to XSD float string
pub fn rust_to_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "INF".to_string()
    } else if value == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        value.to_string()
    }
}

/// Number of significant digits of a decimal literal
///
/// Leading zeros of the integer part and trailing zeros of the fraction
/// are not significant; zero itself counts one digit.
pub fn total_digits(lexical: &str) -> usize {
    let (int_part, frac_part) = split_decimal(lexical);
    let digits = format!("{}{}", int_part, frac_part);
    let significant = digits.trim_start_matches('0');
    significant.len().max(1)
}

/// Number of fraction digits of a decimal literal, trailing zeros excluded
pub fn fraction_digits(lexical: &str) -> usize {
    split_decimal(lexical).1.len()
}

fn split_decimal(lexical: &str) -> (&str, &str) {
    let unsigned = lexical.trim_start_matches(['+', '-']);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    (int_part.trim_start_matches('0'), frac_part.trim_end_matches('0'))
}

// =============================================================================
// Boolean Conversions
// =============================================================================

/// Convert XSD boolean string to Rust bool
pub fn boolean_to_rust(value: &str) -> LexicalResult<bool> {
    XSD_BOOLEAN_MAP
        .get(value)
        .copied()
        .ok_or_else(|| "not one of 'true', 'false', '1', '0'".to_string())
}

// =============================================================================
// Binary Conversions
// =============================================================================

/// Decode an xs:hexBinary literal
pub fn hex_binary_to_rust(value: &str) -> LexicalResult<Vec<u8>> {
    if !HEX_BINARY_REGEX.is_match(value) {
        return Err("not a valid hexadecimal encoding".to_string());
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16).map_err(|_| "invalid hex byte".to_string()))
        .collect()
}

/// Decode an xs:base64Binary literal, embedded spaces are ignored
pub fn base64_binary_to_rust(value: &str) -> LexicalResult<Vec<u8>> {
    let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }
    base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .map_err(|_| "not a valid base64 encoding".to_string())
}

// =============================================================================
// Name Validators
// =============================================================================

/// Check an NCName (also used for ID, IDREF and ENTITY)
pub fn is_ncname(value: &str) -> bool {
    NCNAME_REGEX.is_match(value)
}

/// Check an XML Name
pub fn is_name(value: &str) -> bool {
    NAME_REGEX.is_match(value)
}

/// Check an NMTOKEN
pub fn is_nmtoken(value: &str) -> bool {
    NMTOKEN_REGEX.is_match(value)
}

/// Check an RFC 3066 language tag
pub fn is_language(value: &str) -> bool {
    LANGUAGE_REGEX.is_match(value)
}

/// Split a lexical QName into prefix and local part
pub fn split_qname(value: &str) -> LexicalResult<(Option<&str>, &str)> {
    let (prefix, local) = match value.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, value),
    };
    if prefix.map_or(true, is_ncname) && is_ncname(local) {
        Ok((prefix, local))
    } else {
        Err("not a valid QName".to_string())
    }
}

// =============================================================================
// Durations
// =============================================================================

/// An xs:duration value: a signed month count and a signed second count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DurationValue {
    /// Total months (years * 12 + months)
    pub months: i64,
    /// Total seconds, days and hours included
    pub seconds: Decimal,
}

/// Reference dates (year, month) used to order durations, all on day 1
const DURATION_REFERENCES: [(i128, i128); 4] = [(1696, 9), (1697, 2), (1903, 3), (1903, 7)];

/// Days from 1970-01-01 to the first day of a proleptic Gregorian month
fn days_to_month_start(year: i128, month: i128) -> i128 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let day_of_year = (153 * ((month + 9) % 12) + 2) / 5;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

impl DurationValue {
    /// Days from the epoch to `reference` shifted by the month component
    ///
    /// References fall on day 1, so month arithmetic never clamps.
    fn shifted_days(&self, (year, month): (i128, i128)) -> i128 {
        let total = year * 12 + (month - 1) + i128::from(self.months);
        days_to_month_start(total.div_euclid(12), total.rem_euclid(12) + 1)
    }

    /// Order of `self + reference` against `other + reference`
    fn order_at(&self, other: &Self, reference: (i128, i128)) -> Ordering {
        let days = self.shifted_days(reference) - other.shifted_days(reference);
        let Some(seconds) = self.seconds.checked_sub(other.seconds) else {
            // the second difference exceeds any day difference
            return self.seconds.cmp(&other.seconds);
        };
        let Some(day_seconds) = Decimal::from_i128(days * 86_400) else {
            return days.cmp(&0);
        };
        match day_seconds.checked_add(seconds) {
            Some(total) => total.cmp(&Decimal::ZERO),
            // both parts share a sign when the sum overflows
            None => seconds.cmp(&Decimal::ZERO),
        }
    }

    /// Partial order of durations
    ///
    /// Two durations compare only when they relate the same way when added
    /// to each of the four reference instants.
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        let mut orders = DURATION_REFERENCES.iter().map(|r| self.order_at(other, *r));
        let first = orders.next()?;
        orders.all(|order| order == first).then_some(first)
    }
}

/// Convert an xs:duration literal
pub fn duration_to_rust(value: &str) -> LexicalResult<DurationValue> {
    let caps = DURATION_REGEX
        .captures(value)
        .ok_or_else(|| "not a valid duration literal".to_string())?;
    if value.ends_with('P') || value.ends_with('T') {
        return Err("duration needs at least one component".to_string());
    }

    let int = |i: usize| -> LexicalResult<i64> {
        caps.get(i)
            .map(|m| m.as_str().parse::<i64>().map_err(|_| "duration component out of range".to_string()))
            .unwrap_or(Ok(0))
    };
    let years = int(2)?;
    let months = int(3)?;
    let days = int(4)?;
    let hours = int(5)?;
    let minutes = int(6)?;
    let seconds = match caps.get(7) {
        Some(m) => Decimal::from_str(m.as_str()).map_err(|_| "seconds out of range".to_string())?,
        None => Decimal::ZERO,
    };

    let total_months = years
        .checked_mul(12)
        .and_then(|y| y.checked_add(months))
        .ok_or_else(|| "duration out of range".to_string())?;
    let whole_seconds = days
        .checked_mul(86_400)
        .and_then(|d| hours.checked_mul(3_600).and_then(|h| d.checked_add(h)))
        .and_then(|s| minutes.checked_mul(60).and_then(|m| s.checked_add(m)))
        .ok_or_else(|| "duration out of range".to_string())?;
    let total_seconds = Decimal::from(whole_seconds)
        .checked_add(seconds)
        .ok_or_else(|| "duration out of range".to_string())?;

    let negative = caps.get(1).is_some();
    Ok(DurationValue {
        months: if negative { -total_months } else { total_months },
        seconds: if negative { -total_seconds } else { total_seconds },
    })
}

// =============================================================================
// Date and Time
// =============================================================================

/// Lexical kinds of the date/time family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    /// xs:dateTime
    DateTime,
    /// xs:date
    Date,
    /// xs:time
    Time,
    /// xs:gYearMonth
    GYearMonth,
    /// xs:gYear
    GYear,
    /// xs:gMonthDay
    GMonthDay,
    /// xs:gDay
    GDay,
    /// xs:gMonth
    GMonth,
}

#[derive(Default)]
struct DateTimeFields<'a> {
    year: Option<&'a str>,
    month: Option<&'a str>,
    day: Option<&'a str>,
    hour: Option<&'a str>,
    minute: Option<&'a str>,
    second: Option<&'a str>,
    fraction: Option<&'a str>,
    timezone: Option<&'a str>,
}

/// Convert a date/time literal into the UTC instant it denotes
///
/// Values without a timezone are taken as UTC; kinds without a year use a
/// fixed reference year, kinds without a time use midnight.
pub fn date_time_to_rust(value: &str, kind: DateTimeKind) -> LexicalResult<NaiveDateTime> {
    let (regex, layout): (&Regex, &[u8]) = match kind {
        DateTimeKind::DateTime => (&DATE_TIME_REGEX, b"YMDhmsfz"),
        DateTimeKind::Date => (&DATE_REGEX, b"YMDz"),
        DateTimeKind::Time => (&TIME_REGEX, b"hmsfz"),
        DateTimeKind::GYearMonth => (&G_YEAR_MONTH_REGEX, b"YMz"),
        DateTimeKind::GYear => (&G_YEAR_REGEX, b"Yz"),
        DateTimeKind::GMonthDay => (&G_MONTH_DAY_REGEX, b"MDz"),
        DateTimeKind::GDay => (&G_DAY_REGEX, b"Dz"),
        DateTimeKind::GMonth => (&G_MONTH_REGEX, b"Mz"),
    };
    let caps = regex
        .captures(value)
        .ok_or_else(|| format!("not a valid {:?} literal", kind))?;

    let mut fields = DateTimeFields::default();
    for (i, field) in layout.iter().enumerate() {
        let text = caps.get(i + 1).map(|m| m.as_str());
        match field {
            b'Y' => fields.year = text,
            b'M' => fields.month = text,
            b'D' => fields.day = text,
            b'h' => fields.hour = text,
            b'm' => fields.minute = text,
            b's' => fields.second = text,
            b'f' => fields.fraction = text,
            _ => fields.timezone = text,
        }
    }

    let number = |text: Option<&str>, default: u32| -> LexicalResult<u32> {
        text.map(|t| t.parse::<u32>().map_err(|_| "component out of range".to_string()))
            .unwrap_or(Ok(default))
    };
    let year = match fields.year {
        Some(text) => {
            let digits = text.trim_start_matches('-');
            if digits.len() > 4 && digits.starts_with('0') {
                return Err("year has leading zeros".to_string());
            }
            let year = text.parse::<i32>().map_err(|_| "year out of range".to_string())?;
            if year == 0 {
                return Err("year 0000 is not allowed".to_string());
            }
            year
        }
        None => REFERENCE_YEAR,
    };
    let month = number(fields.month, 1)?;
    let day = number(fields.day, 1)?;
    let hour = number(fields.hour, 0)?;
    let minute = number(fields.minute, 0)?;
    let second = number(fields.second, 0)?;
    let nanos = match fields.fraction {
        Some(fraction) => {
            let digits: String = fraction[1..].chars().chain(std::iter::repeat('0')).take(9).collect();
            digits.parse::<u32>().map_err(|_| "invalid fraction".to_string())?
        }
        None => 0,
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| "date does not exist".to_string())?;

    // 24:00:00 is the first instant of the next day
    let end_of_day = hour == 24;
    if end_of_day && (minute != 0 || second != 0 || nanos != 0) {
        return Err("hour 24 is only allowed as 24:00:00".to_string());
    }
    let time = NaiveTime::from_hms_nano_opt(if end_of_day { 0 } else { hour }, minute, second, nanos)
        .ok_or_else(|| "time does not exist".to_string())?;
    let mut instant = date.and_time(time);
    if end_of_day {
        instant = instant
            .checked_add_signed(chrono::Duration::days(1))
            .ok_or_else(|| "date out of range".to_string())?;
    }

    if let Some(tz) = fields.timezone.filter(|tz| *tz != "Z") {
        let sign = if tz.starts_with('-') { -1 } else { 1 };
        let hours: i64 = tz[1..3].parse().map_err(|_| "invalid timezone".to_string())?;
        let minutes: i64 = tz[4..6].parse().map_err(|_| "invalid timezone".to_string())?;
        if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
            return Err("timezone out of range".to_string());
        }
        let offset = sign * (hours * 60 + minutes);
        instant = instant
            .checked_sub_signed(chrono::Duration::minutes(offset))
            .ok_or_else(|| "date out of range".to_string())?;
    }
    Ok(instant)
}
