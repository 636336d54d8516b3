//! Keysight B1520A multi frequency capacitance measurement unit (MFCMU)
//!
//! The module lives in one slot of a [`KeysightB1500`] and talks over the
//! mainframe's link. Its settings are held in a [`ParameterRegistry`] built
//! once in [`B1520A::new`]; nothing is sent to the instrument until a
//! parameter is set or an operation runs.
//!
//! ## CV sweep
//!
//! ```text
//! NotConfigured --setup_staircase_cv (no error)--> Ready
//! Ready --run_sweep (XE)--> AwaitingResult --reply parsed or failed--> Ready
//! ```
//!
//! `run_sweep` before a successful setup fails with `NotReady`.

use log::{debug, info, warn};
use std::time::Duration;

use super::constants::{
    Abort, AdcMode, AdjMode, AdjQueryMode, AdjResult, ChNr, ImpedanceModel, LrnType,
    MeasurementMode, PostSweepVoltage, RangingMode, SweepMode, NO_ERROR_MESSAGE,
};
use super::correction::Correction;
use super::mainframe::KeysightB1500;
use super::message_builder::CommandBuilder;
use super::response::{self, Grammar};
use crate::error::{AppResult, DaqError};
use crate::instrument::parameter::{
    Group, ParameterDescriptor, ParameterRegistry, Validator,
};
use crate::instrument::value::ParamValue;

/// Largest fixed measurement range accepted by `RC`.
const MAX_MEASUREMENT_RANGE: i64 = 1_000_000;

/// Readout state of the CV sweep measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// No successful setup since construction or the last mode change
    NotConfigured,
    /// Configured; `run_sweep` may be called
    Ready,
    /// `XE` sent, reply pending
    AwaitingResult,
}

/// Primary and secondary values of a CV sweep, one entry per step.
///
/// With the default `Cp_D` model these are parallel capacitance (F) and
/// dissipation factor.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    /// Primary value of the impedance model per step
    pub primary: Vec<f64>,
    /// Secondary value of the impedance model per step
    pub secondary: Vec<f64>,
}

/// Inputs of [`B1520A::setup_staircase_cv`].
#[derive(Debug, Clone, PartialEq)]
pub struct CvSweepSetup {
    /// First DC bias step (V)
    pub v_start: f64,
    /// Last DC bias step (V)
    pub v_end: f64,
    /// Number of steps, 1 to 1001
    pub n_steps: u32,
    /// Oscillator frequency (Hz)
    pub freq: f64,
    /// Oscillator level (V rms)
    pub ac_rms: f64,
    /// DC output after the sweep
    pub post_sweep_voltage_cond: PostSweepVoltage,
    /// A/D converter averaging mode
    pub adc_mode: AdcMode,
    /// Averaging coefficient of `adc_mode`
    pub adc_coef: i64,
    /// Primary/secondary pair returned by the sweep
    pub imp_model: ImpedanceModel,
    /// Auto or fixed measurement range
    pub ranging_mode: RangingMode,
    /// Measurement range (ohm) when `ranging_mode` is fixed
    pub fixed_range_val: Option<i64>,
    /// Delays of `WTDCV` (s)
    pub hold_delay: f64,
    /// Delay before each step (s)
    pub delay: f64,
    /// Delay after each step (s)
    pub step_delay: f64,
    /// Step output trigger delay (s)
    pub trigger_delay: f64,
    /// Step measurement trigger delay (s)
    pub measure_delay: f64,
    /// Automatic abort on compliance or overflow
    pub abort_enabled: Abort,
    /// Linear or logarithmic, single or double
    pub sweep_mode: SweepMode,
    /// Return the AC/DC monitor data with the sweep
    pub volt_monitor: bool,
}

impl CvSweepSetup {
    /// Sweep from `v_start` to `v_end` in `n_steps` with the usual defaults:
    /// PLC averaging with 5 samples, `Cp_D`, auto ranging, no delays,
    /// auto abort with output returning to the stop value.
    pub fn new(v_start: f64, v_end: f64, n_steps: u32, freq: f64, ac_rms: f64) -> Self {
        Self {
            v_start,
            v_end,
            n_steps,
            freq,
            ac_rms,
            post_sweep_voltage_cond: PostSweepVoltage::Stop,
            adc_mode: AdcMode::Plc,
            adc_coef: 5,
            imp_model: ImpedanceModel::CpD,
            ranging_mode: RangingMode::Auto,
            fixed_range_val: None,
            hold_delay: 0.0,
            delay: 0.0,
            step_delay: 0.0,
            trigger_delay: 0.0,
            measure_delay: 0.0,
            abort_enabled: Abort::Enabled,
            sweep_mode: SweepMode::Linear,
            volt_monitor: false,
        }
    }
}

fn int_value(name: &str, value: &ParamValue) -> AppResult<i64> {
    value
        .as_i64()
        .ok_or_else(|| DaqError::invalid_argument(name, format!("{value} is not an integer")))
}

fn channel_value(value: &ParamValue) -> AppResult<ChNr> {
    let code = int_value("chan", value)?;
    let slot = u8::try_from(code)
        .map_err(|_| DaqError::invalid_argument("chan", format!("{code} is not a slot channel")))?;
    ChNr::new(slot)
}

fn steps_value(value: &ParamValue) -> AppResult<u32> {
    let steps = int_value("sweep_steps", value)?;
    u32::try_from(steps)
        .map_err(|_| DaqError::invalid_argument("sweep_steps", format!("{steps} is negative")))
}

fn clear_range_on_auto(registry: &mut ParameterRegistry, value: &ParamValue) {
    if value.as_i64() == Some(RangingMode::Auto.code()) {
        if let Err(e) = registry.invalidate("measurement_range_for_non_auto") {
            warn!("could not drop measurement range: {}", e);
        }
    }
}

fn build_registry(channel: ChNr) -> AppResult<ParameterRegistry> {
    let b = CommandBuilder::new();
    let mut reg = ParameterRegistry::new();

    reg.register(
        ParameterDescriptor::new("voltage_dc")
            .unit("V")
            .validator(Validator::Numbers { min: -25.0, max: 25.0 })
            .set_cmd(move |_, v| b.dcv(channel, v.as_f64())),
    )?;
    reg.register(
        ParameterDescriptor::new("voltage_ac")
            .unit("V")
            .validator(Validator::Numbers { min: 0.0, max: 0.25 })
            .set_cmd(move |_, v| b.acv(channel, v.as_f64())),
    )?;
    reg.register(
        ParameterDescriptor::new("frequency")
            .unit("Hz")
            .validator(Validator::Numbers { min: 1e3, max: 5e6 })
            .set_cmd(move |_, v| b.fc(channel, v.as_f64())),
    )?;
    reg.register(
        ParameterDescriptor::new("phase_compensation_mode")
            .validator(Validator::Enum(AdjMode::CODES))
            .set_cmd(move |_, v| {
                Ok(b.adj(channel, AdjMode::from_code(int_value("phase_compensation_mode", v)?)?))
            }),
    )?;
    reg.register(
        ParameterDescriptor::new("ranging_mode")
            .validator(Validator::Enum(RangingMode::CODES))
            .set_cmd(move |reg, v| {
                let mode = RangingMode::from_code(int_value("ranging_mode", v)?)?;
                let range = match mode {
                    RangingMode::Auto => None,
                    RangingMode::Fixed => reg
                        .cached("measurement_range_for_non_auto")?
                        .and_then(|r| r.as_i64()),
                };
                b.rc(channel, mode, range)
            })
            .after_set(clear_range_on_auto),
    )?;
    reg.register(
        ParameterDescriptor::new("measurement_range_for_non_auto")
            .validator(Validator::Ints {
                min: 0,
                max: MAX_MEASUREMENT_RANGE,
            })
            .set_cmd(move |reg, v| {
                let mode = match reg.cached("ranging_mode")? {
                    Some(code) => RangingMode::from_code(int_value("ranging_mode", &code)?)?,
                    None => RangingMode::Auto,
                };
                b.rc(channel, mode, Some(int_value("measurement_range_for_non_auto", v)?))
            }),
    )?;
    reg.register(
        ParameterDescriptor::new("measurement_mode")
            .validator(Validator::Enum(MeasurementMode::CODES))
            .set_cmd(move |_, v| {
                let mode = MeasurementMode::from_code(int_value("measurement_mode", v)?)?;
                b.mm(mode, &[channel])
            }),
    )?;
    reg.register(
        ParameterDescriptor::new("impedance_model")
            .validator(Validator::Enum(ImpedanceModel::CODES))
            .initial(ImpedanceModel::CpD.code())
            .set_cmd(move |_, v| {
                Ok(b.imp(ImpedanceModel::from_code(int_value("impedance_model", v)?)?))
            }),
    )?;
    reg.register(
        ParameterDescriptor::new("ac_dc_volt_monitor")
            .validator(Validator::Ints { min: 0, max: 1 })
            .initial(false)
            .set_cmd(move |_, v| Ok(b.lmn(int_value("ac_dc_volt_monitor", v)? == 1))),
    )?;
    reg.register(
        ParameterDescriptor::new("sweep_auto_abort")
            .validator(Validator::Enum(Abort::CODES))
            .set_cmd(move |_, v| {
                b.wmdcv(Abort::from_code(int_value("sweep_auto_abort", v)?)?, None)
            }),
    )?;
    reg.register(
        ParameterDescriptor::new("post_sweep_voltage_cond")
            .validator(Validator::Enum(PostSweepVoltage::CODES))
            .set_cmd(move |reg, v| {
                let abort = match reg.cached("sweep_auto_abort")? {
                    Some(code) => Abort::from_code(int_value("sweep_auto_abort", &code)?)?,
                    None => Abort::Enabled,
                };
                if abort == Abort::Disabled {
                    return Err(DaqError::invalid_argument(
                        "post_sweep_voltage_cond",
                        "enable sweep_auto_abort before setting the post sweep voltage",
                    ));
                }
                let post = PostSweepVoltage::from_code(int_value("post_sweep_voltage_cond", v)?)?;
                b.wmdcv(abort, Some(post))
            }),
    )?;

    // WDCV
    reg.register(ParameterDescriptor::new("chan").initial(channel.code()))?;
    reg.register(
        ParameterDescriptor::new("sweep_mode")
            .validator(Validator::Enum(SweepMode::CODES))
            .initial(SweepMode::Linear.code()),
    )?;
    reg.register(ParameterDescriptor::new("sweep_start").unit("V").initial(0.0))?;
    reg.register(ParameterDescriptor::new("sweep_end").unit("V").initial(0.0))?;
    reg.register(
        ParameterDescriptor::new("sweep_steps")
            .validator(Validator::Ints { min: 1, max: 1001 })
            .initial(1),
    )?;
    reg.add_group(Group::new(
        "sweep_steps",
        &["chan", "sweep_mode", "sweep_start", "sweep_end", "sweep_steps"],
        move |v| {
            b.wdcv(
                channel_value(&v[0])?,
                SweepMode::from_code(int_value("sweep_mode", &v[1])?)?,
                v[2].as_f64(),
                v[3].as_f64(),
                steps_value(&v[4])?,
            )
        },
        b.lrn_query(LrnType::CvDcBiasSweepMeasurementSettings),
        |raw| response::parse(Grammar::SweepSteps, raw),
    ))?;

    // ACT
    reg.register(
        ParameterDescriptor::new("adc_mode")
            .validator(Validator::Enum(AdcMode::CODES))
            .initial(AdcMode::Plc.code()),
    )?;
    reg.register(
        ParameterDescriptor::new("adc_coef")
            .validator(Validator::Ints { min: 1, max: 100 })
            .initial(1),
    )?;
    reg.add_group(Group::new(
        "adc",
        &["adc_mode", "adc_coef"],
        move |v| {
            b.act(
                AdcMode::from_code(int_value("adc_mode", &v[0])?)?,
                Some(int_value("adc_coef", &v[1])?),
            )
        },
        b.lrn_query(LrnType::MfcmuAdcSetting),
        |raw| response::parse(Grammar::AdcSettings, raw),
    ))?;

    // WTDCV
    let seconds = |name: &'static str, max: Option<f64>| {
        let descriptor = ParameterDescriptor::new(name).unit("s").initial(0.0);
        match max {
            Some(max) => descriptor.validator(Validator::Numbers { min: 0.0, max }),
            None => descriptor,
        }
    };
    reg.register(seconds("hold", Some(655.35)))?;
    reg.register(seconds("delay", Some(65.535)))?;
    reg.register(seconds("step_delay", Some(1.0)))?;
    reg.register(seconds("trigger_delay", None))?;
    reg.register(seconds("measure_delay", Some(65.535)))?;
    reg.add_group(Group::new(
        "sweep_delays",
        &["hold", "delay", "step_delay", "trigger_delay", "measure_delay"],
        move |v| {
            b.wtdcv(
                v[0].as_f64(),
                v[1].as_f64(),
                Some(v[2].as_f64()),
                Some(v[3].as_f64()),
                Some(v[4].as_f64()),
            )
        },
        b.lrn_query(LrnType::CvDcBiasSweepMeasurementSettings),
        |raw| response::parse(Grammar::SweepDelays, raw),
    ))?;

    Ok(reg)
}

/// B1520A CMU driver.
pub struct B1520A {
    mainframe: KeysightB1500,
    channel: ChNr,
    parameters: ParameterRegistry,
    sweep_state: SweepState,
}

impl B1520A {
    /// Module in `slot` of `mainframe`. No I/O is performed.
    pub fn new(mainframe: KeysightB1500, slot: u8) -> AppResult<Self> {
        let channel = ChNr::new(slot)?;
        let parameters = build_registry(channel)?;
        debug!("B1520A registered in slot {}", channel);
        Ok(Self {
            mainframe,
            channel,
            parameters,
            sweep_state: SweepState::NotConfigured,
        })
    }

    /// Channel of the module slot.
    pub fn channel(&self) -> ChNr {
        self.channel
    }

    /// Mainframe the module is plugged into.
    pub fn mainframe(&self) -> &KeysightB1500 {
        &self.mainframe
    }

    /// Parameter table and caches.
    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    /// Readout state of the CV sweep.
    pub fn sweep_state(&self) -> SweepState {
        self.sweep_state
    }

    /// Set parameter `name` on the instrument and cache it.
    ///
    /// Leaving the CV sweep measurement mode invalidates a configured sweep.
    pub async fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> AppResult<()> {
        let value = value.into();
        self.parameters
            .set(self.mainframe.link(), name, value)
            .await?;

        if name == "measurement_mode"
            && value.as_i64() != Some(MeasurementMode::CvDcSweep.code())
            && self.sweep_state != SweepState::NotConfigured
        {
            debug!("measurement mode changed to {}, sweep needs a new setup", value);
            self.sweep_state = SweepState::NotConfigured;
        }
        Ok(())
    }

    /// Current value of parameter `name`.
    pub async fn get(&mut self, name: &str) -> AppResult<ParamValue> {
        let timeout = self.mainframe.default_timeout();
        self.parameters
            .get(self.mainframe.link(), timeout, name)
            .await
    }

    /// DC bias (V).
    pub async fn set_voltage_dc(&mut self, volts: f64) -> AppResult<()> {
        self.set("voltage_dc", volts).await
    }

    /// Oscillator level (V rms).
    pub async fn set_voltage_ac(&mut self, volts: f64) -> AppResult<()> {
        self.set("voltage_ac", volts).await
    }

    /// Oscillator frequency (Hz).
    pub async fn set_frequency(&mut self, hertz: f64) -> AppResult<()> {
        self.set("frequency", hertz).await
    }

    /// Spot capacitance measurement.
    ///
    /// Switches the measurement mode to spot C and returns the primary and
    /// secondary value of the impedance model.
    pub async fn capacitance(&mut self) -> AppResult<(f64, f64)> {
        self.set("measurement_mode", MeasurementMode::SpotC.code())
            .await?;

        let command = CommandBuilder::new().tc(self.channel, RangingMode::Auto, None)?;
        let reply = self.mainframe.ask(&command).await?;
        match response::parse_spot_measurement(&reply, &['C', 'Y'])?.as_slice() {
            &[primary, secondary] => Ok((primary, secondary)),
            _ => Err(DaqError::ResultFormatMismatch(reply)),
        }
    }

    /// Perform phase compensation (`ADJ?`).
    ///
    /// Set `phase_compensation_mode` to manual and open the measurement
    /// terminals first. Takes about 30 s; the phase compensation timeout
    /// applies.
    pub async fn phase_compensation(&self, mode: Option<AdjQueryMode>) -> AppResult<AdjResult> {
        let command = CommandBuilder::new().adj_query(self.channel, mode)?;
        let timeout = self.mainframe.timeouts().phase_compensation_timeout();
        let reply = self.mainframe.ask_with_timeout(&command, timeout).await?;
        let code = response::parse_integer_status(&reply)?;
        let result =
            AdjResult::from_code(code).map_err(|_| DaqError::unparsable("ADJ? result", reply))?;
        info!("phase compensation of channel {}: {}", self.channel, result);
        Ok(result)
    }

    /// Abort the running operation (`AB`).
    pub async fn abort(&self) -> AppResult<()> {
        self.mainframe.write(&CommandBuilder::new().ab()).await
    }

    /// Program a staircase CV sweep in the order of the programming guide.
    ///
    /// Returns the mainframe error message read after the last setting. The
    /// sweep becomes `Ready` only if that message reports no error. The
    /// mainframe error buffer is cleared in every case, also when a setting
    /// fails half way.
    pub async fn setup_staircase_cv(&mut self, setup: &CvSweepSetup) -> AppResult<String> {
        self.sweep_state = SweepState::NotConfigured;

        if let Err(e) = self.program_staircase_cv(setup).await {
            if let Err(clear) = self.mainframe.clear_buffer_of_error_message().await {
                warn!("could not clear error buffer after failed setup: {}", clear);
            }
            return Err(e);
        }

        let error = self.mainframe.error_message().await?;
        if error == NO_ERROR_MESSAGE {
            self.sweep_state = SweepState::Ready;
            info!(
                "CV sweep on channel {} ready: {} steps",
                self.channel, setup.n_steps
            );
        } else {
            warn!("CV sweep setup reported: {}", error);
        }
        self.mainframe.clear_buffer_of_error_message().await?;
        Ok(error)
    }

    async fn program_staircase_cv(&mut self, setup: &CvSweepSetup) -> AppResult<()> {
        self.mainframe.enable_channels(&[self.channel]).await?;
        self.set("adc_mode", setup.adc_mode.code()).await?;
        self.set("adc_coef", setup.adc_coef).await?;
        self.set("frequency", setup.freq).await?;
        self.set("voltage_ac", setup.ac_rms).await?;
        self.set("sweep_auto_abort", setup.abort_enabled.code())
            .await?;

        // WMDCV takes the post sweep output with either abort setting.
        let post = CommandBuilder::new()
            .wmdcv(setup.abort_enabled, Some(setup.post_sweep_voltage_cond))?;
        self.mainframe.write(&post).await?;
        self.parameters.record(
            "post_sweep_voltage_cond",
            setup.post_sweep_voltage_cond.code(),
        )?;

        self.set("hold", setup.hold_delay).await?;
        self.set("delay", setup.delay).await?;
        self.set("step_delay", setup.step_delay).await?;
        self.set("trigger_delay", setup.trigger_delay).await?;
        self.set("measure_delay", setup.measure_delay).await?;
        self.set("sweep_mode", setup.sweep_mode.code()).await?;
        self.set("sweep_start", setup.v_start).await?;
        self.set("sweep_end", setup.v_end).await?;
        self.set("sweep_steps", setup.n_steps).await?;
        self.set("measurement_mode", MeasurementMode::CvDcSweep.code())
            .await?;
        self.set("impedance_model", setup.imp_model.code()).await?;
        self.set("ac_dc_volt_monitor", setup.volt_monitor).await?;
        self.set("ranging_mode", setup.ranging_mode.code()).await?;
        if let Some(range) = setup.fixed_range_val {
            self.set("measurement_range_for_non_auto", range).await?;
        }
        Ok(())
    }

    /// Timeout for one sweep: `step_delay * steps * factor`, at least the
    /// default link timeout.
    fn sweep_timeout(&self) -> AppResult<Duration> {
        let steps = self.parameters.require_cached("sweep_steps")?.as_f64();
        let step_delay = self.parameters.require_cached("step_delay")?.as_f64();
        let factor = self.mainframe.timeouts().sweep_timeout_factor;
        let limit = Duration::try_from_secs_f64(step_delay * steps * factor)
            .unwrap_or(Duration::MAX);
        Ok(limit.max(self.mainframe.default_timeout()))
    }

    /// Execute the configured CV sweep (`XE`) and read its data.
    pub async fn run_sweep(&mut self) -> AppResult<SweepResult> {
        if self.sweep_state == SweepState::NotConfigured {
            return Err(DaqError::NotReady(
                "sweep setup has not yet been run successfully".to_string(),
            ));
        }

        let timeout = self.sweep_timeout()?;
        self.sweep_state = SweepState::AwaitingResult;
        debug!("CV sweep started, waiting up to {:?}", timeout);

        let result = async {
            let reply = self
                .mainframe
                .ask_with_timeout(&CommandBuilder::new().xe(), timeout)
                .await?;
            response::parse_sweep_data(&reply)
        }
        .await;

        self.sweep_state = SweepState::Ready;
        let (primary, secondary) = result?;
        info!("CV sweep returned {} points", primary.len());
        Ok(SweepResult { primary, secondary })
    }

    /// Open/short/load correction of this module.
    pub fn correction(&self) -> Correction<'_> {
        Correction::new(&self.mainframe, self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutSettings;
    use crate::instrument::{link, MockLink};

    fn cmu(mock: &MockLink) -> B1520A {
        let mainframe = KeysightB1500::new(link::shared(mock.clone()), TimeoutSettings::default());
        B1520A::new(mainframe, 3).unwrap()
    }

    #[test]
    fn test_new_performs_no_io() {
        let mock = MockLink::new("mock");
        let cmu = cmu(&mock);
        assert!(mock.sent().is_empty());
        assert_eq!(cmu.sweep_state(), SweepState::NotConfigured);
        assert_eq!(
            cmu.parameters().cached("impedance_model").unwrap(),
            Some(ParamValue::Int(101))
        );
        assert_eq!(
            cmu.parameters().cached("chan").unwrap(),
            Some(ParamValue::Int(3))
        );
    }

    #[test]
    fn test_invalid_slot() {
        let mock = MockLink::new("mock");
        let mainframe = KeysightB1500::new(link::shared(mock), TimeoutSettings::default());
        assert!(B1520A::new(mainframe, 0).is_err());
    }

    #[tokio::test]
    async fn test_ranging_mode_auto_drops_range() {
        let mock = MockLink::new("mock");
        let mut cmu = cmu(&mock);

        cmu.set("ranging_mode", RangingMode::Fixed.code()).await.unwrap();
        cmu.set("measurement_range_for_non_auto", 1000).await.unwrap();
        cmu.set("ranging_mode", RangingMode::Auto.code()).await.unwrap();

        assert_eq!(mock.sent(), vec!["RC 3,2", "RC 3,2,1000", "RC 3,0"]);
        assert_eq!(
            cmu.parameters()
                .cached("measurement_range_for_non_auto")
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_post_sweep_voltage_requires_auto_abort() {
        let mock = MockLink::new("mock");
        let mut cmu = cmu(&mock);

        cmu.set("sweep_auto_abort", Abort::Disabled.code())
            .await
            .unwrap();
        let err = cmu
            .set("post_sweep_voltage_cond", PostSweepVoltage::Start.code())
            .await
            .unwrap_err();
        assert!(matches!(err, DaqError::InvalidArgument { .. }));
        assert_eq!(mock.sent(), vec!["WMDCV 1"]);
    }

    #[tokio::test]
    async fn test_phase_compensation() {
        let mock = MockLink::new("mock");
        mock.push_reply("0");
        let cmu = cmu(&mock);

        let result = cmu
            .phase_compensation(Some(AdjQueryMode::Measure))
            .await
            .unwrap();
        assert_eq!(result, AdjResult::Passed);
        assert_eq!(mock.sent(), vec!["ADJ? 3,1"]);
    }

    #[test]
    fn test_sweep_timeout_is_floored() {
        let mock = MockLink::new("mock");
        let cmu = cmu(&mock);
        assert_eq!(cmu.sweep_timeout().unwrap(), Duration::from_secs(5));
    }
}
