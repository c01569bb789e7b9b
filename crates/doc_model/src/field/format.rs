//! Result formatting switches: `\*` general formats, `\#` numeric pictures
//! and `\@` date pictures

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

// =============================================================================
// Number formats (\* roman, \* Ordinal, ...)
// =============================================================================

/// Largest number written with letters (thirty `z`s)
pub const MAX_LETTER_NUMBER: u32 = 780;
/// Largest number written in roman numerals
pub const MAX_ROMAN_NUMBER: u32 = 32767;

/// Number format for sequence and page numbers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberFormat {
    /// Arabic numerals (1, 2, 3...)
    #[default]
    Arabic,
    /// Lowercase letters (a, b, c...)
    LowercaseLetter,
    /// Uppercase letters (A, B, C...)
    UppercaseLetter,
    /// Lowercase Roman numerals (i, ii, iii...)
    LowercaseRoman,
    /// Uppercase Roman numerals (I, II, III...)
    UppercaseRoman,
    /// Ordinal (1st, 2nd, 3rd...)
    Ordinal,
    /// Cardinal text (one, two, three...)
    CardinalText,
    /// Ordinal text (first, second, third...)
    OrdinalText,
    /// Uppercase hexadecimal
    Hex,
}

impl NumberFormat {
    /// Resolve a `\*` argument. Roman and alphabetic formats take their
    /// case from the switch text itself.
    pub fn from_switch(argument: &str) -> Option<Self> {
        match argument {
            "roman" => return Some(NumberFormat::LowercaseRoman),
            "ROMAN" => return Some(NumberFormat::UppercaseRoman),
            "alphabetic" => return Some(NumberFormat::LowercaseLetter),
            "ALPHABETIC" => return Some(NumberFormat::UppercaseLetter),
            _ => {}
        }
        match argument.to_ascii_lowercase().as_str() {
            "arabic" => Some(NumberFormat::Arabic),
            "ordinal" => Some(NumberFormat::Ordinal),
            "cardtext" => Some(NumberFormat::CardinalText),
            "ordtext" => Some(NumberFormat::OrdinalText),
            "hex" => Some(NumberFormat::Hex),
            _ => None,
        }
    }

    /// Format a number according to this format. Numbers beyond the range
    /// of letters or roman numerals stay in digits.
    pub fn format(&self, number: u32) -> String {
        match self {
            NumberFormat::LowercaseLetter | NumberFormat::UppercaseLetter
                if number > MAX_LETTER_NUMBER =>
            {
                number.to_string()
            }
            NumberFormat::LowercaseRoman | NumberFormat::UppercaseRoman
                if number > MAX_ROMAN_NUMBER =>
            {
                number.to_string()
            }
            NumberFormat::Arabic => number.to_string(),
            NumberFormat::LowercaseLetter => Self::to_letter(number, false),
            NumberFormat::UppercaseLetter => Self::to_letter(number, true),
            NumberFormat::LowercaseRoman => Self::to_roman(number, false),
            NumberFormat::UppercaseRoman => Self::to_roman(number, true),
            NumberFormat::Ordinal => Self::to_ordinal(number),
            NumberFormat::CardinalText => Self::to_cardinal_text(number),
            NumberFormat::OrdinalText => Self::to_ordinal_text(number),
            NumberFormat::Hex => format!("{:X}", number),
        }
    }

    // a..z, then aa..zz, then aaa..zzz
    fn to_letter(number: u32, uppercase: bool) -> String {
        if number == 0 {
            return String::new();
        }
        let index = (number - 1) % 26;
        let repeat = ((number - 1) / 26 + 1) as usize;
        let base = if uppercase { b'A' } else { b'a' };
        let letter = (base + index as u8) as char;
        letter.to_string().repeat(repeat)
    }

    fn to_roman(number: u32, uppercase: bool) -> String {
        if number == 0 {
            return String::new();
        }
        const TABLE: [(u32, &str); 13] = [
            (1000, "m"),
            (900, "cm"),
            (500, "d"),
            (400, "cd"),
            (100, "c"),
            (90, "xc"),
            (50, "l"),
            (40, "xl"),
            (10, "x"),
            (9, "ix"),
            (5, "v"),
            (4, "iv"),
            (1, "i"),
        ];
        let mut remaining = number;
        let mut out = String::new();
        for (value, symbol) in TABLE {
            while remaining >= value {
                out.push_str(symbol);
                remaining -= value;
            }
        }
        if uppercase {
            out.to_uppercase()
        } else {
            out
        }
    }

    fn to_ordinal(number: u32) -> String {
        let suffix = match (number % 10, number % 100) {
            (_, 11..=13) => "th",
            (1, _) => "st",
            (2, _) => "nd",
            (3, _) => "rd",
            _ => "th",
        };
        format!("{}{}", number, suffix)
    }

    fn to_cardinal_text(number: u32) -> String {
        const ONES: [&str; 20] = [
            "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
            "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
            "eighteen", "nineteen",
        ];
        const TENS: [&str; 10] = [
            "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
        ];

        match number {
            0..=19 => ONES[number as usize].to_string(),
            20..=99 => {
                let tens = TENS[(number / 10) as usize];
                match number % 10 {
                    0 => tens.to_string(),
                    ones => format!("{}-{}", tens, ONES[ones as usize]),
                }
            }
            100..=999 => {
                let hundreds = format!("{} hundred", ONES[(number / 100) as usize]);
                match number % 100 {
                    0 => hundreds,
                    rest => format!("{} {}", hundreds, Self::to_cardinal_text(rest)),
                }
            }
            // Larger numbers fall back to digits
            _ => number.to_string(),
        }
    }

    fn to_ordinal_text(number: u32) -> String {
        const ORDINALS: [&str; 20] = [
            "zeroth", "first", "second", "third", "fourth", "fifth", "sixth", "seventh",
            "eighth", "ninth", "tenth", "eleventh", "twelfth", "thirteenth", "fourteenth",
            "fifteenth", "sixteenth", "seventeenth", "eighteenth", "nineteenth",
        ];
        if number < 20 {
            return ORDINALS[number as usize].to_string();
        }
        if number < 100 && number % 10 != 0 {
            let tens = Self::to_cardinal_text(number - number % 10);
            return format!("{}-{}", tens, ORDINALS[(number % 10) as usize]);
        }
        let cardinal = Self::to_cardinal_text(number);
        match cardinal.strip_suffix('y') {
            Some(stem) => format!("{}ieth", stem),
            None if cardinal.chars().all(|c| c.is_ascii_digit()) => Self::to_ordinal(number),
            None => format!("{}th", cardinal),
        }
    }
}

// =============================================================================
// General formats (\*)
// =============================================================================

/// Apply one `\*` format to a field result.
///
/// Case formats work on any text; number formats only apply when the
/// result parses as a non-negative number. `MERGEFORMAT` and `CHARFORMAT`
/// only concern character formatting and leave the text unchanged.
pub fn apply_general_format(value: &str, format: &str) -> String {
    match format.to_ascii_lowercase().as_str() {
        "mergeformat" | "charformat" => return value.to_string(),
        "upper" => return value.to_uppercase(),
        "lower" => return value.to_lowercase(),
        "firstcap" => return capitalize_first(value),
        "caps" => {
            return value
                .split(' ')
                .map(capitalize_first)
                .collect::<Vec<_>>()
                .join(" ")
        }
        _ => {}
    }
    let Some(number_format) = NumberFormat::from_switch(format) else {
        return value.to_string();
    };
    match value.trim().parse::<f64>() {
        Ok(number) if number >= 0.0 && number <= u32::MAX as f64 => {
            number_format.format(number.round() as u32)
        }
        _ => value.to_string(),
    }
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Numeric pictures (\#)
// =============================================================================

/// Default rendering of a computed number: at most two decimals, trailing
/// zeros trimmed.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{:.2}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Render `value` with a numeric picture such as `#,##0.00` or `$0.0`.
///
/// `0` is a required digit, `#` an optional one, `,` turns on thousands
/// grouping and `.` splits integer from fraction digits. Text around the
/// digit placeholders is copied literally, with single quotes removed.
pub fn format_number_picture(value: f64, picture: &str) -> String {
    let is_digit_char = |c: char| matches!(c, '0' | '#');
    let (Some(first), Some(last)) = (picture.find(is_digit_char), picture.rfind(is_digit_char))
    else {
        return format_number(value);
    };
    let prefix = picture[..first].replace('\'', "");
    let suffix = picture[last + 1..].replace('\'', "");
    let core = &picture[first..=last];

    let (int_pattern, frac_pattern) = match core.split_once('.') {
        Some((int, frac)) => (int, frac),
        None => (core, ""),
    };
    let max_decimals = frac_pattern.chars().filter(|&c| is_digit_char(c)).count();
    let min_decimals = frac_pattern.chars().filter(|&c| c == '0').count();
    let min_int_digits = int_pattern.chars().filter(|&c| c == '0').count();
    let grouping = int_pattern.contains(',');

    let formatted = format!("{:.*}", max_decimals, value.abs());
    let (int_digits, frac_digits) = match formatted.split_once('.') {
        Some((int, frac)) => (int.to_string(), frac.to_string()),
        None => (formatted.clone(), String::new()),
    };

    let mut frac = frac_digits;
    while frac.len() > min_decimals && frac.ends_with('0') {
        frac.pop();
    }

    let mut int = if int_digits == "0" && min_int_digits == 0 {
        String::new()
    } else {
        int_digits
    };
    while int.len() < min_int_digits {
        int.insert(0, '0');
    }
    if grouping {
        int = group_thousands(&int);
    }

    let negative = value < 0.0 && (int.chars().any(|c| c.is_ascii_digit() && c != '0') || frac.chars().any(|c| c != '0'));
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&prefix);
    out.push_str(&int);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    out.push_str(&suffix);
    out
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// =============================================================================
// Date pictures (\@)
// =============================================================================

/// Render a timestamp with a date picture such as `dddd, MMMM d, yyyy` or
/// `h:mm am/pm`. Text in single quotes is copied literally.
pub fn format_date_picture(dt: &NaiveDateTime, picture: &str) -> String {
    let chars: Vec<char> = picture.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                out.push(chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 5)].iter().collect();
        if rest == "AM/PM" || rest == "am/pm" {
            let marker = if dt.hour() < 12 { "AM" } else { "PM" };
            if rest == "am/pm" {
                out.push_str(&marker.to_lowercase());
            } else {
                out.push_str(marker);
            }
            i += 5;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        match c {
            'd' => match run {
                1 => out.push_str(&dt.day().to_string()),
                2 => out.push_str(&format!("{:02}", dt.day())),
                3 => out.push_str(&dt.format("%a").to_string()),
                _ => out.push_str(&dt.format("%A").to_string()),
            },
            'M' => match run {
                1 => out.push_str(&dt.month().to_string()),
                2 => out.push_str(&format!("{:02}", dt.month())),
                3 => out.push_str(&dt.format("%b").to_string()),
                _ => out.push_str(&dt.format("%B").to_string()),
            },
            'y' => {
                if run <= 2 {
                    out.push_str(&format!("{:02}", dt.year().rem_euclid(100)));
                } else {
                    out.push_str(&dt.year().to_string());
                }
            }
            'h' => {
                let hour = match dt.hour() % 12 {
                    0 => 12,
                    h => h,
                };
                push_padded(&mut out, hour, run);
            }
            'H' => push_padded(&mut out, dt.hour(), run),
            'm' => push_padded(&mut out, dt.minute(), run),
            's' => push_padded(&mut out, dt.second(), run),
            other => {
                for _ in 0..run {
                    out.push(other);
                }
            }
        }
        i += run;
    }
    out
}

fn push_padded(out: &mut String, value: u32, run: usize) {
    if run >= 2 {
        out.push_str(&format!("{:02}", value));
    } else {
        out.push_str(&value.to_string());
    }
}

// =============================================================================
// Tests
// =============================================================================
