//! Parsers for B1500 replies.
//!
//! Learn-query replies (`*LRN?`) may carry several `;`-separated sections, so
//! each grammar searches for its own section instead of matching the whole
//! line. A reply either parses completely or fails; no partial values are
//! handed out.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppResult, DaqError};
use crate::instrument::value::ParamValue;

/// Type a parsed field is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Int,
    Float,
}

/// Reply grammars understood by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `WDCV{chan},{sweep_mode},{sweep_start},{sweep_end},{sweep_steps}`
    SweepSteps,
    /// `WTDCV{hold},{delay},{step_delay},{trigger_delay},{measure_delay}`
    SweepDelays,
    /// `ACT{adc_mode},{adc_coef}`
    AdcSettings,
    /// `{mode},{primary},{secondary}` as returned by `DCORR?`
    ReferenceValues,
}

static SWEEP_STEPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"WDCV(?P<chan>.+?),(?P<sweep_mode>.+?),(?P<sweep_start>.+?),(?P<sweep_end>.+?),(?P<sweep_steps>.+?)(;|$)",
    )
    .expect("static regex")
});

static SWEEP_DELAYS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"WTDCV(?P<hold>.+?),(?P<delay>.+?),(?P<step_delay>.+?),(?P<trigger_delay>.+?),(?P<measure_delay>.+?)(;|$)",
    )
    .expect("static regex")
});

static ADC_SETTINGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ACT(?P<adc_mode>.+?),(?P<adc_coef>.+?)(;|$)").expect("static regex")
});

static REFERENCE_VALUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<mode>.+?),(?P<primary>.+?),(?P<secondary>.+?)(;|$)").expect("static regex")
});

/// Header plus signed exponential value of a measurement reply token.
static MEASUREMENT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<header>[A-Za-z]{3,4})?(?P<value>[+-]\d{1,3}\.\d{3,6}E[+-]\d{2})")
        .expect("static regex")
});

/// Data type letter of a token header.
///
/// Three-letter headers are `<status><channel><type>` (`NCC`); four-letter
/// headers lead with the type (`CAFR`).
fn data_type(header: &str) -> Option<char> {
    let mut chars = header.chars();
    match header.len() {
        3 => chars.nth(2),
        4 => chars.next(),
        _ => None,
    }
}

impl Grammar {
    /// Name used in error reports.
    pub fn name(self) -> &'static str {
        match self {
            Grammar::SweepSteps => "sweep steps (WDCV)",
            Grammar::SweepDelays => "sweep delays (WTDCV)",
            Grammar::AdcSettings => "ADC settings (ACT)",
            Grammar::ReferenceValues => "reference values (DCORR?)",
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            Grammar::SweepSteps => &SWEEP_STEPS,
            Grammar::SweepDelays => &SWEEP_DELAYS,
            Grammar::AdcSettings => &ADC_SETTINGS,
            Grammar::ReferenceValues => &REFERENCE_VALUES,
        }
    }

    fn fields(self) -> &'static [(&'static str, FieldKind)] {
        use FieldKind::{Float, Int};
        match self {
            Grammar::SweepSteps => &[
                ("chan", Int),
                ("sweep_mode", Int),
                ("sweep_start", Float),
                ("sweep_end", Float),
                ("sweep_steps", Int),
            ],
            Grammar::SweepDelays => &[
                ("hold", Float),
                ("delay", Float),
                ("step_delay", Float),
                ("trigger_delay", Float),
                ("measure_delay", Float),
            ],
            Grammar::AdcSettings => &[("adc_mode", Int), ("adc_coef", Int)],
            Grammar::ReferenceValues => {
                &[("mode", Int), ("primary", Float), ("secondary", Float)]
            }
        }
    }
}

/// Named fields of one parsed reply, in grammar order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedFields {
    fields: Vec<(&'static str, ParamValue)>,
}

impl ParsedFields {
    /// Value of field `name`.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| *value)
    }

    /// Value of field `name`, or `UnparsableResponse` attributed to `grammar`.
    pub fn require(&self, grammar: &str, name: &str) -> AppResult<ParamValue> {
        self.get(name)
            .ok_or_else(|| DaqError::unparsable(grammar, format!("missing field '{name}'")))
    }

    /// Fields in grammar order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, ParamValue)> + '_ {
        self.fields.iter().copied()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field was parsed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse `raw` with `grammar`.
pub fn parse(grammar: Grammar, raw: &str) -> AppResult<ParsedFields> {
    let captures = grammar
        .regex()
        .captures(raw)
        .ok_or_else(|| DaqError::unparsable(grammar.name(), raw))?;

    let mut fields = Vec::with_capacity(grammar.fields().len());
    for &(name, kind) in grammar.fields() {
        let text = captures
            .name(name)
            .map(|m| m.as_str().trim())
            .ok_or_else(|| DaqError::unparsable(grammar.name(), raw))?;
        let value = match kind {
            FieldKind::Int => text.parse::<i64>().map(ParamValue::Int).ok(),
            FieldKind::Float => text.parse::<f64>().map(ParamValue::Float).ok(),
        }
        .ok_or_else(|| DaqError::unparsable(grammar.name(), raw))?;
        fields.push((name, value));
    }

    Ok(ParsedFields { fields })
}

/// Parse a spot measurement reply whose tokens must carry `expected_tags`,
/// in order, as data type.
pub fn parse_spot_measurement(raw: &str, expected_tags: &[char]) -> AppResult<Vec<f64>> {
    let tokens: Vec<_> = MEASUREMENT_TOKEN.captures_iter(raw).collect();
    if tokens.len() != expected_tags.len() {
        return Err(DaqError::ResultFormatMismatch(format!(
            "expected {} values, found {} in {raw:?}",
            expected_tags.len(),
            tokens.len()
        )));
    }

    tokens
        .iter()
        .zip(expected_tags)
        .map(|(token, &tag)| {
            let dtype = token.name("header").and_then(|m| data_type(m.as_str()));
            if dtype != Some(tag) {
                return Err(DaqError::ResultFormatMismatch(format!(
                    "expected data type '{tag}', found {dtype:?} in {raw:?}"
                )));
            }
            let value = token.name("value").map(|m| m.as_str()).unwrap_or_default();
            value
                .parse::<f64>()
                .map_err(|_| DaqError::unparsable("spot measurement", raw))
        })
        .collect()
}

/// Split a sweep reply into its primary and secondary value sequences.
///
/// Tokens alternate primary/secondary; each starts with a 3-character
/// status/channel/type header.
pub fn parse_sweep_data(raw: &str) -> AppResult<(Vec<f64>, Vec<f64>)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DaqError::unparsable("sweep data", raw));
    }

    let values = raw
        .split(',')
        .map(|token| {
            token
                .trim()
                .get(3..)
                .and_then(|value| value.parse::<f64>().ok())
                .ok_or_else(|| DaqError::unparsable("sweep data", token))
        })
        .collect::<AppResult<Vec<f64>>>()?;

    if values.len() % 2 != 0 {
        return Err(DaqError::ResultFormatMismatch(format!(
            "sweep data holds an odd number of values ({})",
            values.len()
        )));
    }

    let (primary, secondary) = values
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .unzip();
    Ok((primary, secondary))
}

/// Parse a reply made of a single integer status code.
pub fn parse_integer_status(raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| DaqError::unparsable("integer status", raw))
}

/// Parse a reply made of a single floating point value.
pub fn parse_float(raw: &str) -> AppResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DaqError::unparsable("float value", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_steps() {
        let fields = parse(Grammar::SweepSteps, "WDCV1,1,0.0,1.0,11").unwrap();
        assert_eq!(fields.get("chan"), Some(ParamValue::Int(1)));
        assert_eq!(fields.get("sweep_mode"), Some(ParamValue::Int(1)));
        assert_eq!(fields.get("sweep_start"), Some(ParamValue::Float(0.0)));
        assert_eq!(fields.get("sweep_end"), Some(ParamValue::Float(1.0)));
        assert_eq!(fields.get("sweep_steps"), Some(ParamValue::Int(11)));
        let names: Vec<_> = fields.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            ["chan", "sweep_mode", "sweep_start", "sweep_end", "sweep_steps"]
        );
    }

    #[test]
    fn test_composite_learn_reply() {
        let raw = "WMDCV2,2;WTDCV0.5,0.1,0.0,0.0,0.0;WDCV3,1,-1.0,1.0,21";
        let delays = parse(Grammar::SweepDelays, raw).unwrap();
        assert_eq!(delays.get("hold"), Some(ParamValue::Float(0.5)));
        assert_eq!(delays.get("measure_delay"), Some(ParamValue::Float(0.0)));
        let steps = parse(Grammar::SweepSteps, raw).unwrap();
        assert_eq!(steps.get("sweep_steps"), Some(ParamValue::Int(21)));
    }

    #[test]
    fn test_adc_and_reference_values() {
        let adc = parse(Grammar::AdcSettings, "ACT2,5").unwrap();
        assert_eq!(adc.get("adc_mode"), Some(ParamValue::Int(2)));
        assert_eq!(adc.get("adc_coef"), Some(ParamValue::Int(5)));

        let refs = parse(Grammar::ReferenceValues, "100,0.000000E+00,1.000000E-10").unwrap();
        assert_eq!(refs.get("mode"), Some(ParamValue::Int(100)));
        assert_eq!(refs.get("secondary"), Some(ParamValue::Float(1e-10)));
    }

    #[test]
    fn test_unparsable() {
        assert!(matches!(
            parse(Grammar::SweepSteps, "ACT2,5"),
            Err(DaqError::UnparsableResponse { .. })
        ));
        assert!(matches!(
            parse(Grammar::SweepSteps, "WDCV1,x,0.0,1.0,11"),
            Err(DaqError::UnparsableResponse { .. })
        ));
        assert!(matches!(
            parse(Grammar::AdcSettings, "ACT2,5.5"),
            Err(DaqError::UnparsableResponse { .. })
        ));
    }

    #[test]
    fn test_spot_measurement() {
        let values =
            parse_spot_measurement("CAFR+1.234560E-03,YAFR+5.678900E-02", &['C', 'Y']).unwrap();
        assert_eq!(values, vec![1.23456e-3, 5.6789e-2]);

        let values = parse_spot_measurement("NCC-1.45713E-06,NCY-3.05845E-03", &['C', 'Y']).unwrap();
        assert_eq!(values, vec![-1.45713e-6, -3.05845e-3]);
    }

    #[test]
    fn test_spot_measurement_mismatch() {
        assert!(matches!(
            parse_spot_measurement("YAFR+5.678900E-02,CAFR+1.234560E-03", &['C', 'Y']),
            Err(DaqError::ResultFormatMismatch(_))
        ));
        assert!(matches!(
            parse_spot_measurement("CAFR+1.234560E-03", &['C', 'Y']),
            Err(DaqError::ResultFormatMismatch(_))
        ));
    }

    #[test]
    fn test_sweep_data() {
        let (c, d) =
            parse_sweep_data("NCC+1.000000E-12,NCY+2.000000E-03,NCC+1.100000E-12,NCY+2.100000E-03")
                .unwrap();
        assert_eq!(c, vec![1.0e-12, 1.1e-12]);
        assert_eq!(d, vec![2.0e-3, 2.1e-3]);

        assert!(matches!(
            parse_sweep_data("NCC+1.000000E-12,NCY+2.000000E-03,NCC+1.100000E-12"),
            Err(DaqError::ResultFormatMismatch(_))
        ));
        assert!(parse_sweep_data("").is_err());
    }

    #[test]
    fn test_integer_status() {
        assert_eq!(parse_integer_status("0\r").unwrap(), 0);
        assert!(parse_integer_status("ok").is_err());
        assert_eq!(parse_float("+1.000000E+05").unwrap(), 1e5);
    }
}
