//! Parser for DX cluster spot lines.
//!
//! Two strategies are tried in order:
//!
//! 1. **Fixed columns.** Most cluster software pads spots to a 75 column
//!    layout:
//!    ```text
//!    DX de W3LPL:     14025.0  JA1ABC       CW 599                         1234Z
//!    DX de EA5WU-#:    7018.3  RW1M           CW    19 dB  18 WPM  CQ      2259Z
//!    ```
//!    The spotter runs up to the first colon, the frequency ends at column
//!    25, then come the callsign `[25, 39)`, the comment `[39, 70)` and the
//!    time `[70, 75)`.
//!
//! 2. **Pattern.** Servers that do not pad are matched token by token with
//!    `nom`: `DX de <spotter>: <freq> <call> <free text> <HHMM[Z]>`.
//!
//! A fixed-column result with an empty field, an unparseable frequency or
//! an invalid time counts as a miss and falls through to the pattern. So
//! does a line whose time is not exactly `HHMM[Z]` inside its column.
//!
//! Frequencies reported in MHz are stored in kHz; the text keeps what the
//! server sent.

use chrono::NaiveTime;
use nom::{
    IResult, Parser,
    bytes::complete::{tag_no_case, take_while_m_n, take_while1},
    character::complete::{char, digit0, digit1, one_of, space0, space1},
    combinator::{eof, opt, recognize},
    sequence::terminated,
};
use thiserror::Error;
use tracing::trace;

use crate::band;
use crate::spot::SpotRecord;

/// Text every spot line starts with.
pub const SENTINEL: &str = "DX de";

/// End of the frequency column (exclusive).
const FREQ_END: usize = 25;

/// End of the callsign column (exclusive).
const CALL_END: usize = 39;

/// End of the comment column (exclusive).
const MESSAGE_END: usize = 70;

/// End of the time column including the trailing `Z` (exclusive).
const TIME_END: usize = 75;

/// Errors that can occur during parsing.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Not a spot line")]
    NotASpot,

    #[error("Invalid spot format: {0}")]
    InvalidFormat(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a spot line, returning `None` for anything that is not a spot.
pub fn parse_line(line: &str) -> Option<SpotRecord> {
    parse_spot(line).ok()
}

/// Parse a complete spot line.
///
/// # Example
///
/// ```
/// use dxspot::parser::parse_spot;
///
/// let spot = parse_spot("DX de OG3Z: 14074.0 OM5AY    FT8 25dB  1234Z").unwrap();
/// assert_eq!(spot.spotter, "OG3Z");
/// assert_eq!(spot.dx_call, "OM5AY");
/// assert_eq!(spot.message, "FT8 25dB");
/// assert_eq!(spot.time_utc, "1234");
/// ```
pub fn parse_spot(input: &str) -> ParseResult<SpotRecord> {
    let line = input.trim();
    if !looks_like_spot(line) {
        return Err(ParseError::NotASpot);
    }

    match parse_fixed(line) {
        Ok(spot) => Ok(spot),
        Err(e) => {
            trace!("Fixed columns failed ({}), trying pattern: {}", e, line);
            parse_pattern(line)
        }
    }
}

/// Check if a line starts with the spot sentinel (case-insensitive).
#[inline]
pub fn looks_like_spot(line: &str) -> bool {
    line.trim_start()
        .get(..SENTINEL.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(SENTINEL))
}

/// Slice `[start, end)` of a line, clamped to its length.
///
/// Returns an empty string when the range starts past the end or splits a
/// multi-byte character.
fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).unwrap_or("")
}

fn parse_fixed(line: &str) -> ParseResult<SpotRecord> {
    let colon = line
        .find(':')
        .ok_or_else(|| ParseError::InvalidFormat("missing colon".to_string()))?;
    let spotter = column(line, SENTINEL.len(), colon).trim();
    if spotter.is_empty() {
        return Err(ParseError::MissingField("spotter"));
    }
    if colon + 1 >= FREQ_END {
        return Err(ParseError::InvalidFormat(
            "spotter overruns the frequency column".to_string(),
        ));
    }

    let freq_raw = column(line, colon + 1, FREQ_END);
    let (frequency_khz, frequency_text) = parse_frequency_text(freq_raw)?;

    let dx_call = column(line, FREQ_END, CALL_END).trim();
    if dx_call.is_empty() {
        return Err(ParseError::MissingField("callsign"));
    }
    if dx_call.contains(char::is_whitespace) {
        return Err(ParseError::InvalidFormat(format!(
            "callsign column holds '{}'",
            dx_call
        )));
    }

    // A digit touching the time column means the layout is shifted
    let bytes = line.as_bytes();
    let touches = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);
    if touches(MESSAGE_END - 1) || touches(TIME_END) {
        return Err(ParseError::InvalidFormat(
            "time straddles its column".to_string(),
        ));
    }

    let message = column(line, CALL_END, MESSAGE_END).trim();
    let time_raw = column(line, MESSAGE_END, TIME_END).trim();
    if time_raw.is_empty() {
        return Err(ParseError::MissingField("time"));
    }
    let (_, digits) =
        parse_time_token(time_raw).map_err(|_| ParseError::InvalidTime(time_raw.to_string()))?;
    let time_utc = normalize_time(digits)?;

    Ok(SpotRecord {
        spotter: spotter.to_string(),
        frequency_khz: band::to_khz(frequency_khz),
        frequency_text,
        dx_call: dx_call.to_string(),
        message: message.to_string(),
        time_utc,
    })
}

/// Parse the "DX de " prefix that starts every spot line.
fn parse_dx_de_prefix(input: &str) -> IResult<&str, ()> {
    let (input, _) = (tag_no_case("DX"), space1, tag_no_case("de"), space0).parse(input)?;
    Ok((input, ()))
}

/// Parse the spotter followed by a colon.
fn parse_spotter(input: &str) -> IResult<&str, &str> {
    terminated(
        take_while1(|c: char| c != ':' && !c.is_whitespace()),
        (space0, char(':')),
    )
    .parse(input)
}

/// Recognize a frequency, allowing stray spaces around the decimal point.
fn parse_frequency(input: &str) -> IResult<&str, &str> {
    recognize((digit1, opt((space0, char('.'), space0, digit0)))).parse(input)
}

/// Parse a callsign token.
fn parse_callsign(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace()).parse(input)
}

/// Parse a trailing time token: four digits with an optional `Z`.
fn parse_time_token(input: &str) -> IResult<&str, &str> {
    terminated(
        take_while_m_n(4, 4, |c: char| c.is_ascii_digit()),
        (opt(one_of("Zz")), eof),
    )
    .parse(input)
}

fn parse_head(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, _) = parse_dx_de_prefix(input)?;
    let (input, spotter) = parse_spotter(input)?;
    let (input, _) = space0(input)?;
    let (input, frequency) = parse_frequency(input)?;
    let (input, _) = space1(input)?;
    let (input, dx_call) = parse_callsign(input)?;
    Ok((input, (spotter, frequency, dx_call)))
}

fn parse_pattern(line: &str) -> ParseResult<SpotRecord> {
    let (rest, (spotter, freq_raw, dx_call)) =
        parse_head(line).map_err(|e| ParseError::InvalidFormat(format!("{:?}", e)))?;

    let rest = rest.trim();
    let (message, time_token) = match rest.rsplit_once(char::is_whitespace) {
        Some((message, time)) => (message.trim(), time),
        None => ("", rest),
    };
    if time_token.is_empty() {
        return Err(ParseError::MissingField("time"));
    }
    let (_, digits) =
        parse_time_token(time_token).map_err(|_| ParseError::InvalidTime(time_token.to_string()))?;
    let time_utc = normalize_time(digits)?;

    let (frequency_khz, frequency_text) = parse_frequency_text(freq_raw)?;

    Ok(SpotRecord {
        spotter: spotter.to_string(),
        frequency_khz: band::to_khz(frequency_khz),
        frequency_text,
        dx_call: dx_call.to_string(),
        message: message.to_string(),
        time_utc,
    })
}

/// Strip whitespace from a frequency field and parse it.
///
/// Returns the value together with the cleaned text.
pub fn parse_frequency_text(raw: &str) -> ParseResult<(f64, String)> {
    let text: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let well_formed = !text.is_empty()
        && text.chars().all(|c| c.is_ascii_digit() || c == '.')
        && text.chars().filter(|&c| c == '.').count() <= 1
        && text.chars().next().is_some_and(|c| c.is_ascii_digit());
    if !well_formed {
        return Err(ParseError::InvalidFrequency(raw.to_string()));
    }

    let value: f64 = text
        .parse()
        .map_err(|_| ParseError::InvalidFrequency(raw.to_string()))?;
    if value <= 0.0 {
        return Err(ParseError::InvalidFrequency(raw.to_string()));
    }
    Ok((value, text))
}

/// Reduce a time field to four zero-padded digits.
///
/// A trailing `Z` and any other non-digits are dropped; the result must be
/// a valid time of day.
pub fn normalize_time(raw: &str) -> ParseResult<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 4 {
        return Err(ParseError::InvalidTime(raw.to_string()));
    }
    let padded = format!("{:0>4}", digits);

    let hour: u32 = padded[0..2]
        .parse()
        .map_err(|_| ParseError::InvalidTime(raw.to_string()))?;
    let min: u32 = padded[2..4]
        .parse()
        .map_err(|_| ParseError::InvalidTime(raw.to_string()))?;
    NaiveTime::from_hms_opt(hour, min, 0).ok_or_else(|| ParseError::InvalidTime(raw.to_string()))?;

    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_rbn_fixed_columns() {
        let line = "DX de EA5WU-#:    7018.3  RW1M           CW    19 dB  18 WPM  CQ      2259Z";
        let spot = parse_fixed(line).expect("Should parse with fixed columns");

        assert_eq!(spot.spotter, "EA5WU-#");
        assert!((spot.frequency_khz - 7018.3).abs() < 0.01);
        assert_eq!(spot.frequency_text, "7018.3");
        assert_eq!(spot.dx_call, "RW1M");
        assert_eq!(spot.message, "CW    19 dB  18 WPM  CQ");
        assert_eq!(spot.time_utc, "2259");
    }

    #[test]
    fn test_parse_cluster_fixed_columns() {
        let line = "DX de W3LPL:     14025.0  JA1ABC       CW 599                         1234Z";
        let spot = parse_fixed(line).expect("Should parse with fixed columns");

        assert_eq!(spot.spotter, "W3LPL");
        assert_eq!(spot.dx_call, "JA1ABC");
        assert_eq!(spot.message, "CW 599");
        assert_eq!(spot.time_utc, "1234");
    }

    /// The W3LPL spot with its comment padded `shift` columns wider.
    fn shifted_cluster_line(shift: isize) -> String {
        let head = "DX de W3LPL:     14025.0  JA1ABC       CW 599";
        let pad = (25 + shift) as usize;
        format!("{}{}1234Z", head, " ".repeat(pad))
    }

    #[test]
    fn test_shifted_time_column() {
        for shift in [-2, -1, 1, 2] {
            let line = shifted_cluster_line(shift);
            let spot = parse_spot(&line).expect("Shifted line should still parse");
            assert_eq!(spot.time_utc, "1234", "shift {}", shift);
            assert_eq!(spot.message, "CW 599", "shift {}", shift);
            assert_eq!(spot.dx_call, "JA1ABC");
        }
    }

    #[test]
    fn test_shifted_time_rejected_by_fixed_columns() {
        assert!(parse_fixed(&shifted_cluster_line(0)).is_ok());
        assert!(parse_fixed(&shifted_cluster_line(-2)).is_err());
        assert!(parse_fixed(&shifted_cluster_line(-1)).is_err());
        assert!(parse_fixed(&shifted_cluster_line(2)).is_err());
        assert!(matches!(
            parse_fixed(&shifted_cluster_line(2)),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_mhz_frequency_stored_as_khz() {
        let spot = parse_spot("DX de W1AW: 14.074 K1ABC FT8 1234Z").expect("Should parse");
        assert!((spot.frequency_khz - 14074.0).abs() < 1e-6);
        assert_eq!(spot.frequency_text, "14.074");

        let classified = spot.classify();
        assert_eq!(classified.band, crate::band::Band::B20);
        assert_eq!(classified.mode, crate::band::Mode::Digital);
    }

    #[test]
    fn test_parse_beacon_spot() {
        let line = "DX de KM3T-2-#:  14100.0  CS3B           CW    24 dB  22 WPM  NCDXF B 2259Z";
        let spot = parse_spot(line).expect("Should parse successfully");

        assert_eq!(spot.spotter, "KM3T-2-#");
        assert_eq!(spot.dx_call, "CS3B");
        assert!(spot.message.ends_with("NCDXF B"));
    }

    #[test]
    fn test_unpadded_line_uses_pattern() {
        let line = "DX de OG3Z: 14074.0 OM5AY    FT8 25dB  1234Z";
        assert!(parse_fixed(line).is_err());

        let spot = parse_spot(line).expect("Should parse with pattern");
        assert_eq!(spot.spotter, "OG3Z");
        assert!((spot.frequency_khz - 14074.0).abs() < 0.01);
        assert_eq!(spot.dx_call, "OM5AY");
        assert_eq!(spot.message, "FT8 25dB");
        assert_eq!(spot.time_utc, "1234");
    }

    #[test]
    fn test_time_without_z() {
        let spot = parse_spot("DX de W1AW: 14074.0 K1ABC FT8   1234").expect("Should parse");
        assert_eq!(spot.spotter, "W1AW");
        assert_eq!(spot.dx_call, "K1ABC");
        assert_eq!(spot.message, "FT8");
        assert_eq!(spot.time_utc, "1234");
    }

    #[test]
    fn test_empty_message() {
        let spot = parse_spot("DX de W1AW: 7012.5 K1ABC 0005Z").expect("Should parse");
        assert_eq!(spot.message, "");
        assert_eq!(spot.time_utc, "0005");
    }

    #[test]
    fn test_frequency_with_stray_whitespace() {
        let spot = parse_spot("DX de K1TTT: 14025 .5 JA1ABC CW 1234Z").expect("Should parse");
        assert_eq!(spot.frequency_text, "14025.5");
        assert!((spot.frequency_khz - 14025.5).abs() < 0.01);

        let spot = parse_spot("DX de K1TTT: 7018. 3 RW1M up 2 0930Z").expect("Should parse");
        assert_eq!(spot.frequency_text, "7018.3");
        assert_eq!(spot.message, "up 2");
    }

    #[test]
    fn test_long_spotter_falls_back() {
        let line = "DX de VERYLONGCALL-12-#: 14025.0 JA1ABC CW 1234Z";
        let spot = parse_spot(line).expect("Should parse with pattern");
        assert_eq!(spot.spotter, "VERYLONGCALL-12-#");
        assert_eq!(spot.dx_call, "JA1ABC");
    }

    #[test]
    fn test_case_insensitive_sentinel() {
        let line = "dx de ea5wu-#:    7018.3  rw1m           cw    19 db  18 wpm  cq      2259z";
        let spot = parse_spot(line).expect("Should parse case-insensitively");
        assert_eq!(spot.dx_call, "rw1m");
        assert_eq!(spot.time_utc, "2259");
    }

    #[test]
    fn test_non_spot_lines() {
        assert_eq!(parse_spot("Welcome to the cluster"), Err(ParseError::NotASpot));
        assert_eq!(parse_spot(""), Err(ParseError::NotASpot));
        assert_eq!(
            parse_spot("WWV de W0MU <18>:   SFI=70, A=4, K=1"),
            Err(ParseError::NotASpot)
        );
        assert_eq!(parse_spot("To ALL de K1ABC: hello"), Err(ParseError::NotASpot));
        assert!(parse_line("Please enter your call:").is_none());
    }

    #[test]
    fn test_malformed_spot_lines() {
        assert!(parse_spot("DX de").is_err());
        assert!(parse_spot("DX de W1AW:").is_err());
        assert!(parse_spot("DX de W1AW: hello world").is_err());
        assert!(parse_spot("DX de W1AW: 14025.0 K1ABC no time here").is_err());
        assert!(parse_spot("DX de W1AW: 14025.0 K1ABC CW 2599Z").is_err());
        assert!(parse_spot("DX de : 14025.0 K1ABC CW 1234Z").is_err());
    }

    #[test]
    fn test_looks_like_spot() {
        assert!(looks_like_spot("DX de EA5WU-#:    7018.3  RW1M"));
        assert!(looks_like_spot("  DX DE EA5WU-#:"));
        assert!(!looks_like_spot("DX"));
        assert!(!looks_like_spot("Hello world"));
        assert!(!looks_like_spot("ÄÖÜ"));
    }

    #[test]
    fn test_normalize_time() {
        assert_eq!(normalize_time("1234Z").unwrap(), "1234");
        assert_eq!(normalize_time("934Z").unwrap(), "0934");
        assert_eq!(normalize_time("0000").unwrap(), "0000");
        assert_eq!(normalize_time(" 2359z ").unwrap(), "2359");
        assert!(normalize_time("2400Z").is_err());
        assert!(normalize_time("1260").is_err());
        assert!(normalize_time("Z").is_err());
        assert!(normalize_time("123456").is_err());
    }

    #[test]
    fn test_parse_frequency_text() {
        assert_eq!(parse_frequency_text(" 14074.0 ").unwrap().1, "14074.0");
        assert_eq!(parse_frequency_text("14074 . 0").unwrap().1, "14074.0");
        assert!(parse_frequency_text("").is_err());
        assert!(parse_frequency_text("inf").is_err());
        assert!(parse_frequency_text("1.2.3").is_err());
        assert!(parse_frequency_text(".5").is_err());
        assert!(parse_frequency_text("0.0").is_err());
        assert!(parse_frequency_text("14074.0 OM5AY").is_err());
    }

    #[test]
    fn test_multibyte_line_does_not_panic() {
        assert!(parse_spot("DX de ÄÖÜ: 14074.0 ÖM5AY éé 1234Z").is_ok());
        let _ = parse_spot("DX de W1AW:ééééééééééééééééééééééééééééééééééééééééé");
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(s in ".*") {
            let _ = parse_spot(&s);
        }

        #[test]
        fn prop_spot_prefix_never_panics(s in ".{0,100}") {
            let _ = parse_spot(&format!("DX de {}", s));
        }

        #[test]
        fn prop_well_formed_lines_parse(
            spotter in "[A-Z0-9]{3,8}",
            call in "[A-Z0-9]{3,8}",
            khz in 1800u32..30000,
            hour in 0u32..24,
            min in 0u32..60,
        ) {
            let line = format!("DX de {}: {}.0 {} tnx {:02}{:02}Z", spotter, khz, call, hour, min);
            let spot = parse_spot(&line).unwrap();
            prop_assert_eq!(spot.spotter, spotter);
            prop_assert_eq!(spot.dx_call, call);
            prop_assert_eq!(spot.time_utc, format!("{:02}{:02}", hour, min));
        }
    }
}
