//! Wire-format parsing for sensor bus lines.
//!
//! A valid reading line ends in `R=<address>` followed by whitespace and
//! `T=<temperature>`, optionally with a trailing carriage return. The
//! pattern is fixed; anything that does not match is reported as invalid
//! and otherwise ignored by the caller.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Matches `R=<address> T=<temperature>` anchored at end of line.
///
/// The temperature is digits with at most one decimal point and at least
/// one digit, so a matched value is always numeric text.
static READING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"R=(?P<addr>\w+)\s+T=(?P<temp>[0-9]+\.?[0-9]*|\.[0-9]+)\r?$")
        .expect("reading pattern is valid")
});

/// One temperature reading decoded from a bus line.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Sensor address as printed on the bus.
    pub address: String,

    /// Temperature reported by the probe.
    pub temperature: f64,
}

/// Errors that can occur while decoding a bus line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("line does not match reading pattern: {line:?}")]
    NoMatch { line: String },

    #[error("temperature {text:?} is not a finite number")]
    Temperature { text: String },
}

/// Decode one raw bus line into a [`Reading`].
///
/// The trailing newline, if present, is stripped before matching. Matching
/// uses search semantics: noise before the reading is tolerated as long as
/// the line ends in a well-formed reading.
pub fn parse_reading(line: &str) -> Result<Reading, ParseError> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    let caps = READING_RE.captures(line).ok_or_else(|| ParseError::NoMatch {
        line: line.to_owned(),
    })?;

    // The pattern restricts the text to digits and one optional dot, so the
    // only way conversion misbehaves is overflow to infinity on absurdly
    // long digit runs.
    let text = &caps["temp"];
    let temperature: f64 = text.parse().map_err(|_| ParseError::Temperature {
        text: text.to_owned(),
    })?;

    if !temperature.is_finite() {
        return Err(ParseError::Temperature {
            text: text.to_owned(),
        });
    }

    Ok(Reading {
        address: caps["addr"].to_owned(),
        temperature,
    })
}
