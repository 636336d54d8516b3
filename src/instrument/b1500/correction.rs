//! Open/short/load correction of the B1520A.

use log::info;

use super::constants::{
    CalibrationType, ChNr, ClcorrMode, CorrResult, CorrState, DcorrMode,
};
use super::mainframe::KeysightB1500;
use super::message_builder::CommandBuilder;
use super::response::{self, Grammar};
use crate::error::{AppResult, DaqError};
use crate::instrument::value::format_float;

/// Reference values of a correction standard, as reported by `DCORR?`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceValues {
    /// Parameter pair of the values
    pub mode: DcorrMode,
    /// Primary reference value
    pub primary: f64,
    /// Secondary reference value
    pub secondary: f64,
}

impl ReferenceValues {
    /// Parse a `DCORR?` reply.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let grammar = Grammar::ReferenceValues;
        let fields = response::parse(grammar, raw)?;
        let mode_code = fields
            .require(grammar.name(), "mode")?
            .as_i64()
            .ok_or_else(|| DaqError::unparsable(grammar.name(), raw))?;
        let mode =
            DcorrMode::from_code(mode_code).map_err(|_| DaqError::unparsable(grammar.name(), raw))?;
        Ok(Self {
            mode,
            primary: fields.require(grammar.name(), "primary")?.as_f64(),
            secondary: fields.require(grammar.name(), "secondary")?.as_f64(),
        })
    }

    /// e.g. `Mode: Cp_G, Primary Cp: 1e-12 F, Secondary G: 0.0 S`
    pub fn describe(&self) -> String {
        let ((primary_label, primary_unit), (secondary_label, secondary_unit)) =
            self.mode.labels_units();
        format!(
            "Mode: {}, Primary {}: {} {}, Secondary {}: {} {}",
            self.mode,
            primary_label,
            format_float(self.primary),
            primary_unit,
            secondary_label,
            format_float(self.secondary),
            secondary_unit
        )
    }
}

/// Correction functions of one CMU channel.
#[derive(Clone, Copy)]
pub struct Correction<'a> {
    mainframe: &'a KeysightB1500,
    channel: ChNr,
}

impl<'a> Correction<'a> {
    pub(crate) fn new(mainframe: &'a KeysightB1500, channel: ChNr) -> Self {
        Self { mainframe, channel }
    }

    /// Enable a correction. Measure its data with [`Self::perform`] first.
    pub async fn enable(&self, corr: CalibrationType) -> AppResult<()> {
        let command = CommandBuilder::new().corrst(self.channel, corr, true);
        self.mainframe.write(&command).await
    }

    /// Disable a correction.
    pub async fn disable(&self, corr: CalibrationType) -> AppResult<()> {
        let command = CommandBuilder::new().corrst(self.channel, corr, false);
        self.mainframe.write(&command).await
    }

    /// Whether a correction is on (`CORRST?`).
    pub async fn is_enabled(&self, corr: CalibrationType) -> AppResult<CorrState> {
        let command = CommandBuilder::new().corrst_query(self.channel, corr);
        let reply = self.mainframe.ask(&command).await?;
        let code = response::parse_integer_status(&reply)?;
        CorrState::from_code(code).map_err(|_| DaqError::unparsable("CORRST? result", reply))
    }

    /// Define the reference values of a standard (`DCORR`).
    ///
    /// This disables the correction and invalidates data measured before.
    /// Use `Cp_G` for the open standard and `Ls_Rs` for short and load.
    pub async fn set_reference_values(
        &self,
        corr: CalibrationType,
        mode: DcorrMode,
        primary: f64,
        secondary: f64,
    ) -> AppResult<()> {
        let command = CommandBuilder::new().dcorr(self.channel, corr, mode, primary, secondary)?;
        self.mainframe.write(&command).await
    }

    /// Reference values of a standard (`DCORR?`).
    pub async fn reference_values(&self, corr: CalibrationType) -> AppResult<ReferenceValues> {
        let command = CommandBuilder::new().dcorr_query(self.channel, corr);
        let reply = self.mainframe.ask(&command).await?;
        ReferenceValues::parse(&reply)
    }

    /// Reference values of a standard as a human readable line.
    pub async fn get_reference_values(&self, corr: CalibrationType) -> AppResult<String> {
        Ok(self.reference_values(corr).await?.describe())
    }

    /// Measure correction data (`CORR?`).
    ///
    /// Set the oscillator level and, when a standard is used, its reference
    /// values before calling this.
    pub async fn perform(&self, corr: CalibrationType) -> AppResult<CorrResult> {
        let command = CommandBuilder::new().corr_query(self.channel, corr);
        let reply = self.mainframe.ask(&command).await?;
        let code = response::parse_integer_status(&reply)?;
        let result =
            CorrResult::from_code(code).map_err(|_| DaqError::unparsable("CORR? result", reply))?;
        info!("{} correction of channel {}: {}", corr, self.channel, result);
        Ok(result)
    }

    /// [`Self::perform`] followed by [`Self::enable`], reported as text.
    pub async fn perform_and_enable(&self, corr: CalibrationType) -> AppResult<String> {
        let status = self.perform(corr).await?;
        self.enable(corr).await?;
        let enabled = self.is_enabled(corr).await?;
        Ok(format!("Correction status {status} and Enable {enabled}"))
    }

    /// Correction frequency list of this channel.
    pub fn frequency_list(&self) -> FrequencyList<'a> {
        FrequencyList {
            mainframe: self.mainframe,
            channel: self.channel,
        }
    }
}

/// Frequencies at which correction data is measured.
#[derive(Clone, Copy)]
pub struct FrequencyList<'a> {
    mainframe: &'a KeysightB1500,
    channel: ChNr,
}

impl FrequencyList<'_> {
    /// Remove every frequency.
    pub async fn clear(&self) -> AppResult<()> {
        self.clear_with(ClcorrMode::ClearOnly).await
    }

    /// Remove every frequency and restore the default list.
    pub async fn clear_and_set_default(&self) -> AppResult<()> {
        self.clear_with(ClcorrMode::ClearAndSetDefaultFreq).await
    }

    async fn clear_with(&self, mode: ClcorrMode) -> AppResult<()> {
        let command = CommandBuilder::new().clcorr(self.channel, mode);
        self.mainframe.write(&command).await
    }

    /// Add a frequency (Hz).
    pub async fn add(&self, freq: f64) -> AppResult<()> {
        let command = CommandBuilder::new().corrl(self.channel, freq)?;
        self.mainframe.write(&command).await
    }

    /// Number of listed frequencies, or the frequency at `index`.
    pub async fn query(&self, index: Option<u32>) -> AppResult<f64> {
        let command = CommandBuilder::new().corrl_query(self.channel, index)?;
        let reply = self.mainframe.ask(&command).await?;
        response::parse_float(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutSettings;
    use crate::instrument::{link, MockLink};

    fn mainframe(mock: &MockLink) -> KeysightB1500 {
        KeysightB1500::new(link::shared(mock.clone()), TimeoutSettings::default())
    }

    #[test]
    fn test_describe_reference_values() {
        let refs = ReferenceValues::parse("400,1.000000E-09,5.000000E-01").unwrap();
        assert_eq!(
            refs.describe(),
            "Mode: Ls_Rs, Primary Ls: 1e-9 H, Secondary Rs: 0.5 Ω"
        );
        assert!(ReferenceValues::parse("101,0.0,0.0").is_err());
    }

    #[tokio::test]
    async fn test_perform_and_enable() {
        let mock = MockLink::new("mock");
        mock.push_reply("0");
        mock.push_reply("1");
        let b1500 = mainframe(&mock);
        let corr = Correction::new(&b1500, ChNr::new(3).unwrap());

        let summary = corr.perform_and_enable(CalibrationType::Open).await.unwrap();
        assert_eq!(summary, "Correction status SUCCESSFUL and Enable ON");
        assert_eq!(mock.sent(), vec!["CORR? 3,1", "CORRST 3,1,1", "CORRST? 3,1"]);
    }

    #[tokio::test]
    async fn test_get_reference_values() {
        let mock = MockLink::new("mock");
        mock.push_reply("100,0.000000E+00,0.000000E+00");
        let b1500 = mainframe(&mock);
        let corr = Correction::new(&b1500, ChNr::new(3).unwrap());

        let text = corr
            .get_reference_values(CalibrationType::Open)
            .await
            .unwrap();
        assert_eq!(text, "Mode: Cp_G, Primary Cp: 0.0 F, Secondary G: 0.0 S");
        assert_eq!(mock.sent(), vec!["DCORR? 3,1"]);
    }

    #[tokio::test]
    async fn test_frequency_list() {
        let mock = MockLink::new("mock");
        mock.push_reply("+2");
        mock.push_reply("+1.000000E+05");
        let b1500 = mainframe(&mock);
        let list = Correction::new(&b1500, ChNr::new(3).unwrap()).frequency_list();

        list.clear().await.unwrap();
        list.add(1e5).await.unwrap();
        assert_eq!(list.query(None).await.unwrap(), 2.0);
        assert_eq!(list.query(Some(1)).await.unwrap(), 1e5);
        assert_eq!(
            mock.sent(),
            vec!["CLCORR 3,1", "CORRL 3,100000.0", "CORRL? 3", "CORRL? 3,1"]
        );
    }
}
