use std::fmt;
use std::str::FromStr;

pub const MS_PER_SECOND: u32 = 1000;
pub const SECONDS_PER_MINUTE: u32 = 60;
pub const MINUTES_PER_HOUR: u32 = 60;
pub const HOURS_PER_DAY: u32 = 24;

/// Layout of a relative time label: `[D days ][H:]MM:SS.sss`.
///
/// The same values drive both [`RelativeTimeFormat::format`] and the
/// JavaScript rendering in `blocks`, so the two cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeTimeFormat {
    pub second_decimals: u32,
    pub second_width: usize,
    pub minute_width: usize,
    pub days_suffix: &'static str,
}

pub const RELATIVE_TIME: RelativeTimeFormat = RelativeTimeFormat {
    second_decimals: 3,
    second_width: 6,
    minute_width: 2,
    days_suffix: " days ",
};

#[derive(Debug, Clone, PartialEq)]
pub enum FormatError {
    Negative(f64),
    NotFinite(f64),
    Unparsable(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::Negative(value) => {
                write!(f, "duration must not be negative (got {value} ms)")
            }
            FormatError::NotFinite(value) => write!(f, "duration must be finite (got {value})"),
            FormatError::Unparsable(raw) => write!(f, "'{raw}' is not a millisecond value"),
        }
    }
}

impl std::error::Error for FormatError {}

/// A non-negative, finite millisecond count.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ElapsedMillis(f64);

impl ElapsedMillis {
    pub fn new(ms: f64) -> Result<Self, FormatError> {
        if !ms.is_finite() {
            return Err(FormatError::NotFinite(ms));
        }
        if ms < 0.0 {
            return Err(FormatError::Negative(ms));
        }
        // folds -0.0 into +0.0
        Ok(Self(ms + 0.0))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl FromStr for ElapsedMillis {
    type Err = FormatError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| FormatError::Unparsable(raw.to_string()))?;
        Self::new(value)
    }
}

impl RelativeTimeFormat {
    pub fn format(&self, elapsed: ElapsedMillis) -> String {
        let mut seconds = elapsed.get() / f64::from(MS_PER_SECOND);
        let mut minutes = (seconds / f64::from(SECONDS_PER_MINUTE)).floor();
        seconds %= f64::from(SECONDS_PER_MINUTE);
        let mut hours = (minutes / f64::from(MINUTES_PER_HOUR)).floor();
        minutes %= f64::from(MINUTES_PER_HOUR);
        let days = (hours / f64::from(HOURS_PER_DAY)).floor();
        hours %= f64::from(HOURS_PER_DAY);

        let mut output = pad_start(
            &to_fixed(seconds, self.second_decimals),
            self.second_width,
        );
        if minutes >= 1.0 || hours >= 1.0 || days >= 1.0 {
            let padded = pad_start(&js_number(minutes), self.minute_width);
            output = format!("{padded}:{output}");
        }
        if hours >= 1.0 || days >= 1.0 {
            output = format!("{}:{output}", js_number(hours));
        }
        if days >= 1.0 {
            output = format!("{}{}{output}", js_number(days), self.days_suffix);
        }
        output
    }
}

pub fn format_relative(elapsed: ElapsedMillis) -> String {
    RELATIVE_TIME.format(elapsed)
}

fn pad_start(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let mut padded = "0".repeat(width - len);
    padded.push_str(text);
    padded
}

/// Fixed-point rendering with `Number.prototype.toFixed` rounding: the exact
/// binary value is rounded to the nearest multiple of 10^-digits, ties going
/// to the larger multiple. Expects a non-negative finite value and
/// `digits <= 9`.
fn to_fixed(value: f64, digits: u32) -> String {
    debug_assert!(digits <= 9);
    if value >= 1e21 {
        return js_number(value);
    }

    let bits = value.to_bits();
    let exponent_bits = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if exponent_bits == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), exponent_bits - 1075)
    };

    let scale = 10u128.pow(digits);
    let scaled = u128::from(mantissa) * scale;
    let units = if exponent >= 0 {
        scaled << exponent
    } else {
        let shift = exponent.unsigned_abs();
        if shift >= 128 {
            0
        } else {
            let whole = scaled >> shift;
            let remainder = scaled - (whole << shift);
            if remainder >= 1u128 << (shift - 1) {
                whole + 1
            } else {
                whole
            }
        }
    };

    let integer = units / scale;
    if digits == 0 {
        return integer.to_string();
    }
    let decimals = units % scale;
    format!("{integer}.{decimals:0width$}", width = digits as usize)
}

/// Integral unit counts print the way JavaScript stringifies numbers.
fn js_number(value: f64) -> String {
    if value.abs() < 1e21 {
        format!("{value}")
    } else {
        format!("{value:e}").replacen('e', "e+", 1)
    }
}
