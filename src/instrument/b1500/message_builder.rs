//! Formatter for B1500 FLEX instructions.
//!
//! `CommandBuilder` never touches the link. Each method checks its arguments
//! against the legal domain of the instruction and returns the formatted
//! [`Command`], so every rejection happens before anything is written.
//!
//! Optional arguments follow the trailing omission rule of the FLEX command
//! set: an omitted argument may only be followed by omitted arguments.

use std::fmt::Display;

use super::constants::{
    Abort, AdcMode, AdjMode, AdjQueryMode, CalibrationType, ChNr, ClcorrMode, DcorrMode,
    ImpedanceModel, LrnType, MeasurementMode, PostSweepVoltage, RangingMode, SweepMode,
};
use crate::error::{AppResult, DaqError};
use crate::instrument::command::Command;
use crate::instrument::value::format_float;

/// Output voltage limit of the CMU DC bias, in volts.
pub const MAX_DC_BIAS: f64 = 25.0;
/// Oscillator level limit, in volts rms.
pub const MAX_AC_LEVEL: f64 = 0.25;
/// Oscillator frequency limits, in hertz.
pub const FREQUENCY_LIMITS: (f64, f64) = (1e3, 5e6);
/// Largest number of steps of a staircase sweep.
pub const MAX_SWEEP_STEPS: u32 = 1001;
/// Largest number of channels in a measurement mode instruction.
pub const MAX_MM_CHANNELS: usize = 10;

/// Argument list of one instruction under construction.
struct Args {
    mnemonic: &'static str,
    parts: Vec<String>,
}

impl Args {
    fn new(mnemonic: &'static str) -> Self {
        Self {
            mnemonic,
            parts: Vec::new(),
        }
    }

    fn arg(mut self, value: impl Display) -> Self {
        self.parts.push(value.to_string());
        self
    }

    fn float(self, value: f64) -> Self {
        self.arg(format_float(value))
    }

    /// Append optional trailing arguments, rejecting a gap before a given one.
    fn tail(mut self, optional: Vec<(&'static str, Option<String>)>) -> AppResult<Self> {
        let mut first_missing: Option<&'static str> = None;
        for (name, value) in optional {
            match (value, first_missing) {
                (Some(_), Some(missing)) => {
                    return Err(DaqError::invalid_argument(
                        name,
                        format!("cannot be given while '{missing}' is omitted"),
                    ));
                }
                (Some(value), None) => self.parts.push(value),
                (None, None) => first_missing = Some(name),
                (None, Some(_)) => {}
            }
        }
        Ok(self)
    }

    fn build(self) -> Command {
        if self.parts.is_empty() {
            Command::from_text(self.mnemonic.to_string())
        } else {
            Command::from_text(format!("{} {}", self.mnemonic, self.parts.join(",")))
        }
    }
}

fn check_range(parameter: &str, value: f64, min: f64, max: f64) -> AppResult<f64> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(DaqError::invalid_argument(
            parameter,
            format!("{} is not in [{}, {}]", format_float(value), min, max),
        ))
    }
}

fn check_int_range(parameter: &str, value: i64, min: i64, max: i64) -> AppResult<i64> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(DaqError::invalid_argument(
            parameter,
            format!("{value} is not in [{min}, {max}]"),
        ))
    }
}

fn channel_list(parameter: &str, channels: &[ChNr]) -> AppResult<Vec<String>> {
    if channels.len() > MAX_MM_CHANNELS {
        return Err(DaqError::invalid_argument(
            parameter,
            format!(
                "{} channels given, at most {} allowed",
                channels.len(),
                MAX_MM_CHANNELS
            ),
        ));
    }
    Ok(channels.iter().map(ToString::to_string).collect())
}

/// Builds instructions of the B1500 FLEX command set.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandBuilder;

impl CommandBuilder {
    /// New builder.
    pub fn new() -> Self {
        Self
    }

    /// `DCV` - force DC bias voltage on a CMU channel.
    pub fn dcv(&self, chnum: ChNr, voltage: f64) -> AppResult<Command> {
        let voltage = check_range("voltage", voltage, -MAX_DC_BIAS, MAX_DC_BIAS)?;
        Ok(Args::new("DCV").arg(chnum).float(voltage).build())
    }

    /// `ACV` - oscillator level of the CMU.
    pub fn acv(&self, chnum: ChNr, voltage: f64) -> AppResult<Command> {
        let voltage = check_range("voltage", voltage, 0.0, MAX_AC_LEVEL)?;
        Ok(Args::new("ACV").arg(chnum).float(voltage).build())
    }

    /// `FC` - oscillator frequency of the CMU.
    pub fn fc(&self, chnum: ChNr, freq: f64) -> AppResult<Command> {
        let (min, max) = FREQUENCY_LIMITS;
        let freq = check_range("freq", freq, min, max)?;
        Ok(Args::new("FC").arg(chnum).float(freq).build())
    }

    /// `TC` - high speed spot capacitance measurement.
    pub fn tc(
        &self,
        chnum: ChNr,
        mode: RangingMode,
        range: Option<i64>,
    ) -> AppResult<Command> {
        let range = range
            .map(|r| check_int_range("range", r, 0, i64::MAX))
            .transpose()?;
        Args::new("TC")
            .arg(chnum)
            .arg(mode.code())
            .tail(vec![("range", range.map(|r| r.to_string()))])
            .map(Args::build)
    }

    /// `ADJ` - phase compensation mode.
    pub fn adj(&self, chnum: ChNr, mode: AdjMode) -> Command {
        Args::new("ADJ").arg(chnum).arg(mode.code()).build()
    }

    /// `ADJ?` - perform phase compensation and return its result.
    pub fn adj_query(&self, chnum: ChNr, mode: Option<AdjQueryMode>) -> AppResult<Command> {
        Args::new("ADJ?")
            .arg(chnum)
            .tail(vec![("mode", mode.map(|m| m.code().to_string()))])
            .map(Args::build)
    }

    /// `AB` - abort the running operation.
    pub fn ab(&self) -> Command {
        Args::new("AB").build()
    }

    /// `XE` - execute the configured measurement.
    pub fn xe(&self) -> Command {
        Args::new("XE").build()
    }

    /// `MM` - measurement mode and measurement channels.
    pub fn mm(&self, mode: MeasurementMode, channels: &[ChNr]) -> AppResult<Command> {
        let channels = channel_list("channels", channels)?;
        let mut args = Args::new("MM").arg(mode.code());
        for ch in channels {
            args = args.arg(ch);
        }
        Ok(args.build())
    }

    /// `IMP` - impedance measurement model.
    pub fn imp(&self, mode: ImpedanceModel) -> Command {
        Args::new("IMP").arg(mode.code()).build()
    }

    /// `LMN` - AC/DC voltage monitor of the CMU.
    pub fn lmn(&self, enable_data_monitor: bool) -> Command {
        Args::new("LMN").arg(u8::from(enable_data_monitor)).build()
    }

    /// `RC` - measurement ranging of the CMU.
    ///
    /// The range may be left out for any mode; the instrument then keeps the
    /// range it had.
    pub fn rc(
        &self,
        chnum: ChNr,
        ranging_mode: RangingMode,
        measurement_range: Option<i64>,
    ) -> AppResult<Command> {
        let range = measurement_range
            .map(|r| check_int_range("measurement_range", r, 0, i64::MAX))
            .transpose()?;
        Args::new("RC")
            .arg(chnum)
            .arg(ranging_mode.code())
            .tail(vec![("measurement_range", range.map(|r| r.to_string()))])
            .map(Args::build)
    }

    /// `ACT` - A/D converter averaging of the CMU.
    pub fn act(&self, mode: AdcMode, coeff: Option<i64>) -> AppResult<Command> {
        let coeff = coeff
            .map(|c| check_int_range("coeff", c, 1, 1023))
            .transpose()?;
        Args::new("ACT")
            .arg(mode.code())
            .tail(vec![("coeff", coeff.map(|c| c.to_string()))])
            .map(Args::build)
    }

    /// `WDCV` - DC bias staircase sweep source.
    pub fn wdcv(
        &self,
        chnum: ChNr,
        mode: SweepMode,
        start: f64,
        end: f64,
        steps: u32,
    ) -> AppResult<Command> {
        let start = check_range("start", start, -MAX_DC_BIAS, MAX_DC_BIAS)?;
        let end = check_range("end", end, -MAX_DC_BIAS, MAX_DC_BIAS)?;
        let steps = check_int_range("steps", i64::from(steps), 1, i64::from(MAX_SWEEP_STEPS))?;
        Ok(Args::new("WDCV")
            .arg(chnum)
            .arg(mode.code())
            .float(start)
            .float(end)
            .arg(steps)
            .build())
    }

    /// `WMDCV` - automatic abort and post-sweep output of the CV sweep.
    pub fn wmdcv(&self, abort: Abort, post: Option<PostSweepVoltage>) -> AppResult<Command> {
        Args::new("WMDCV")
            .arg(abort.code())
            .tail(vec![("post", post.map(|p| p.code().to_string()))])
            .map(Args::build)
    }

    /// `WTDCV` - timing of the CV sweep, all values in seconds.
    pub fn wtdcv(
        &self,
        hold: f64,
        delay: f64,
        sdelay: Option<f64>,
        tdelay: Option<f64>,
        mdelay: Option<f64>,
    ) -> AppResult<Command> {
        let hold = check_range("hold", hold, 0.0, 655.35)?;
        let delay = check_range("delay", delay, 0.0, 65.535)?;
        let sdelay = sdelay
            .map(|v| check_range("sdelay", v, 0.0, 1.0))
            .transpose()?;
        let tdelay = tdelay
            .map(|v| check_range("tdelay", v, 0.0, 65.535))
            .transpose()?;
        let mdelay = mdelay
            .map(|v| check_range("mdelay", v, 0.0, 65.535))
            .transpose()?;

        Args::new("WTDCV")
            .float(hold)
            .float(delay)
            .tail(vec![
                ("sdelay", sdelay.map(format_float)),
                ("tdelay", tdelay.map(format_float)),
                ("mdelay", mdelay.map(format_float)),
            ])
            .map(Args::build)
    }

    /// `CN` - enable channels; all channels when the list is empty.
    pub fn cn(&self, channels: &[ChNr]) -> AppResult<Command> {
        let channels = channel_list("channels", channels)?;
        let mut args = Args::new("CN");
        for ch in channels {
            args = args.arg(ch);
        }
        Ok(args.build())
    }

    /// `CORRST` - enable or disable an open/short/load correction.
    pub fn corrst(&self, chnum: ChNr, corr: CalibrationType, state: bool) -> Command {
        Args::new("CORRST")
            .arg(chnum)
            .arg(corr.code())
            .arg(u8::from(state))
            .build()
    }

    /// `CORRST?` - correction enable state.
    pub fn corrst_query(&self, chnum: ChNr, corr: CalibrationType) -> Command {
        Args::new("CORRST?").arg(chnum).arg(corr.code()).build()
    }

    /// `DCORR` - reference values of a correction standard.
    pub fn dcorr(
        &self,
        chnum: ChNr,
        corr: CalibrationType,
        mode: DcorrMode,
        primary: f64,
        secondary: f64,
    ) -> AppResult<Command> {
        if !primary.is_finite() {
            return Err(DaqError::invalid_argument("primary", "must be finite"));
        }
        if !secondary.is_finite() {
            return Err(DaqError::invalid_argument("secondary", "must be finite"));
        }
        Ok(Args::new("DCORR")
            .arg(chnum)
            .arg(corr.code())
            .arg(mode.code())
            .float(primary)
            .float(secondary)
            .build())
    }

    /// `DCORR?` - reference values of a correction standard.
    pub fn dcorr_query(&self, chnum: ChNr, corr: CalibrationType) -> Command {
        Args::new("DCORR?").arg(chnum).arg(corr.code()).build()
    }

    /// `CORR?` - measure correction data.
    pub fn corr_query(&self, chnum: ChNr, corr: CalibrationType) -> Command {
        Args::new("CORR?").arg(chnum).arg(corr.code()).build()
    }

    /// `CLCORR` - clear the correction frequency list.
    pub fn clcorr(&self, chnum: ChNr, mode: ClcorrMode) -> Command {
        Args::new("CLCORR").arg(chnum).arg(mode.code()).build()
    }

    /// `CORRL` - append a frequency to the correction frequency list.
    pub fn corrl(&self, chnum: ChNr, freq: f64) -> AppResult<Command> {
        let (min, max) = FREQUENCY_LIMITS;
        let freq = check_range("freq", freq, min, max)?;
        Ok(Args::new("CORRL").arg(chnum).float(freq).build())
    }

    /// `CORRL?` - list length, or the frequency at `index`.
    pub fn corrl_query(&self, chnum: ChNr, index: Option<u32>) -> AppResult<Command> {
        Args::new("CORRL?")
            .arg(chnum)
            .tail(vec![("index", index.map(|i| i.to_string()))])
            .map(Args::build)
    }

    /// `*LRN?` - learn query for one settings group.
    pub fn lrn_query(&self, type_id: LrnType) -> Command {
        Args::new("*LRN?").arg(type_id.code()).build()
    }

    /// `ERRX?` - oldest error code and message.
    pub fn errx_query(&self) -> Command {
        Args::new("ERRX?").build()
    }

    /// `ERR?` - read and clear the error buffer.
    pub fn err_query(&self) -> Command {
        Args::new("ERR?").build()
    }
}
