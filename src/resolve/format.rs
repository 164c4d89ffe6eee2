//! Per-type formatting overrides for scalar values

use std::collections::HashMap;
use std::fmt::{self, Write};
use std::sync::Arc;

use super::value::{Value, ValueKind};

/// Translation applied to enumerated and boolean text
pub type Translator = Arc<dyn Fn(&str) -> String + Send + Sync>;

type FormatFn = dyn Fn(&Value, &Locale) -> String + Send + Sync;

/// Number conventions of a locale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    tag: String,
    decimal_separator: char,
    grouping_separator: char,
}

impl Default for Locale {
    fn default() -> Self {
        Self::from_tag("en-US")
    }
}

impl Locale {
    /// Build a locale from a language tag, using known separator presets
    ///
    /// Unknown languages fall back to `.` for decimals and `,` for grouping.
    pub fn from_tag(tag: &str) -> Self {
        let language = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let (decimal, grouping) = match language.as_str() {
            "de" | "es" | "it" | "nl" | "pt" | "da" | "id" | "tr" => (',', '.'),
            "fr" | "ru" | "pl" | "cs" | "sv" | "fi" | "nb" | "uk" => (',', '\u{a0}'),
            _ => ('.', ','),
        };
        Self {
            tag: tag.to_string(),
            decimal_separator: decimal,
            grouping_separator: grouping,
        }
    }

    pub fn with_separators(mut self, decimal: char, grouping: char) -> Self {
        self.decimal_separator = decimal;
        self.grouping_separator = grouping;
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn decimal_separator(&self) -> char {
        self.decimal_separator
    }

    pub fn grouping_separator(&self) -> char {
        self.grouping_separator
    }
}

/// A formatting override for one value kind
#[derive(Clone)]
pub enum Formatter {
    /// strftime-style pattern for dates, times and date-times
    Pattern(String),
    /// Fixed decimals and optional digit grouping for numbers
    Number {
        decimals: Option<usize>,
        grouping: bool,
    },
    Custom(Arc<FormatFn>),
}

impl Formatter {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value, &Locale) -> String + Send + Sync + 'static,
    {
        Formatter::Custom(Arc::new(f))
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formatter::Pattern(p) => f.debug_tuple("Pattern").field(p).finish(),
            Formatter::Number { decimals, grouping } => f
                .debug_struct("Number")
                .field("decimals", decimals)
                .field("grouping", grouping)
                .finish(),
            Formatter::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Registered overrides, one per value kind
#[derive(Debug, Clone, Default)]
pub struct Formatters {
    by_kind: HashMap<ValueKind, Formatter>,
}

impl Formatters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ValueKind, formatter: Formatter) -> Self {
        self.by_kind.insert(kind, formatter);
        self
    }

    pub fn set(&mut self, kind: ValueKind, formatter: Formatter) {
        self.by_kind.insert(kind, formatter);
    }

    pub fn get(&self, kind: ValueKind) -> Option<&Formatter> {
        self.by_kind.get(&kind)
    }

    /// Render a scalar value; `None` for non-scalar values
    pub fn format(
        &self,
        value: &Value,
        locale: &Locale,
        translator: Option<&Translator>,
    ) -> Option<String> {
        if !value.is_scalar() {
            return None;
        }
        let formatter = self.get(value.kind());
        if let Some(Formatter::Custom(f)) = formatter {
            return Some(f(value, locale));
        }
        let text = match value {
            Value::Bool(b) => translate(if *b { "true" } else { "false" }, translator),
            Value::Enum(name) => translate(name, translator),
            Value::Text(text) => text.clone(),
            Value::Int(i) => match formatter {
                Some(Formatter::Number { decimals, grouping }) => {
                    format_integer(*i, decimals.unwrap_or(0), *grouping, locale)
                }
                _ => i.to_string(),
            },
            Value::Float(x) => match formatter {
                Some(Formatter::Number {
                    decimals: Some(decimals),
                    grouping,
                }) => format_number(*x, *decimals, *grouping, locale),
                Some(Formatter::Number {
                    decimals: None,
                    grouping,
                }) => shortest_float(*x, *grouping, locale),
                _ => shortest_float(*x, false, locale),
            },
            Value::Date(d) => temporal(formatter, "%Y-%m-%d", |p| d.format(p)),
            Value::Time(t) => temporal(formatter, "%H:%M:%S", |p| t.format(p)),
            Value::DateTime(dt) => temporal(formatter, "%Y-%m-%d %H:%M:%S", |p| dt.format(p)),
            _ => return None,
        };
        Some(text)
    }
}

fn translate(text: &str, translator: Option<&Translator>) -> String {
    match translator {
        Some(t) => t(text),
        None => text.to_string(),
    }
}

/// Apply a pattern override, falling back to the default on an invalid pattern
fn temporal<'a, D, F>(formatter: Option<&'a Formatter>, default: &'a str, render: F) -> String
where
    D: fmt::Display,
    F: Fn(&'a str) -> D,
{
    if let Some(Formatter::Pattern(pattern)) = formatter {
        let mut out = String::new();
        if write!(out, "{}", render(pattern.as_str())).is_ok() {
            return out;
        }
    }
    render(default).to_string()
}

fn format_number(value: f64, decimals: usize, grouping: bool, locale: &Locale) -> String {
    let raw = format!("{:.*}", decimals, value);
    localize_digits(&raw, grouping, locale)
}

/// Integers keep every digit; requested decimals are zeros
fn format_integer(value: i64, decimals: usize, grouping: bool, locale: &Locale) -> String {
    let mut raw = value.to_string();
    if decimals > 0 {
        raw.push('.');
        raw.extend(std::iter::repeat('0').take(decimals));
    }
    localize_digits(&raw, grouping, locale)
}

fn shortest_float(value: f64, grouping: bool, locale: &Locale) -> String {
    localize_digits(&value.to_string(), grouping, locale)
}

/// Swap in the locale separators for a `-1234.5`-style number
fn localize_digits(raw: &str, grouping: bool, locale: &Locale) -> String {
    let (sign, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let mut out = String::from(sign);
    if grouping && int_part.chars().all(|c| c.is_ascii_digit()) {
        let digits: Vec<char> = int_part.chars().collect();
        for (i, c) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(locale.grouping_separator());
            }
            out.push(*c);
        }
    } else {
        out.push_str(int_part);
    }
    if let Some(frac) = frac_part {
        out.push(locale.decimal_separator());
        out.push_str(frac);
    }
    out
}
