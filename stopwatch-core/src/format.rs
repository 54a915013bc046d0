//! Elapsed-time templates.
//!
//! A template is literal text with brace-delimited tokens:
//!
//! | token          | component     |
//! |----------------|---------------|
//! | `{H}` `{HH}`   | hours         |
//! | `{M}` `{MM}`   | minutes       |
//! | `{S}` `{SS}`   | seconds       |
//! | `{C}` `{CC}`   | centiseconds  |
//! | `{L}` `{LLL}`  | milliseconds  |
//!
//! The repeated form zero-pads to that many digits. The greatest unit used
//! by a template absorbs everything above it, so `{MM}:{SS}` renders 61
//! minutes as `61:00` and the default template never wraps hours.
//! Tokens that are not in the table are kept as literal text.

use std::fmt;
use std::str::FromStr;

use crate::error::FormatError;

pub const DEFAULT_FORMAT: &str = "{HH}:{MM}:{SS}";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Unit {
    Millis,
    Centis,
    Seconds,
    Minutes,
    Hours,
}

impl Unit {
    fn size_ms(self) -> u64 {
        match self {
            Unit::Millis => 1,
            Unit::Centis => 10,
            Unit::Seconds => 1000,
            Unit::Minutes => 60_000,
            Unit::Hours => 3_600_000,
        }
    }

    /// Wrap-around within the next larger unit.
    fn modulus(self) -> Option<u64> {
        match self {
            Unit::Millis => Some(1000),
            Unit::Centis => Some(100),
            Unit::Seconds | Unit::Minutes => Some(60),
            Unit::Hours => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { unit: Unit, width: usize },
}

fn parse_token(token: &str) -> Option<Segment> {
    let (unit, width) = match token {
        "H" => (Unit::Hours, 1),
        "HH" => (Unit::Hours, 2),
        "M" => (Unit::Minutes, 1),
        "MM" => (Unit::Minutes, 2),
        "S" => (Unit::Seconds, 1),
        "SS" => (Unit::Seconds, 2),
        "C" => (Unit::Centis, 1),
        "CC" => (Unit::Centis, 2),
        "L" => (Unit::Millis, 1),
        "LLL" => (Unit::Millis, 3),
        _ => return None,
    };
    Some(Segment::Field { unit, width })
}

/// A parsed template. Rendering is a pure function of the elapsed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Format {
    source: String,
    segments: Vec<Segment>,
    greatest: Option<Unit>,
}

impl Format {
    pub fn parse(template: &str) -> Result<Self, FormatError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        let mut consumed = 0;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or(FormatError::Unterminated {
                offset: consumed + open,
            })?;
            let token = &after[..close];
            if token.is_empty() {
                return Err(FormatError::EmptyToken {
                    offset: consumed + open,
                });
            }

            match parse_token(token) {
                Some(field) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(field);
                }
                None => literal.push_str(&rest[open..open + close + 2]),
            }

            consumed += open + close + 2;
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let greatest = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Field { unit, .. } => Some(*unit),
                Segment::Literal(_) => None,
            })
            .max();

        Ok(Self {
            source: template.to_string(),
            segments,
            greatest,
        })
    }

    /// The template this format was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, elapsed_ms: u64) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { unit, width } => {
                    let mut value = elapsed_ms / unit.size_ms();
                    if Some(*unit) != self.greatest {
                        if let Some(m) = unit.modulus() {
                            value %= m;
                        }
                    }
                    out.push_str(&format!("{:0width$}", value, width = *width));
                }
            }
        }
        out
    }
}

impl Default for Format {
    fn default() -> Self {
        Self::parse(DEFAULT_FORMAT).expect("default format parses")
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
