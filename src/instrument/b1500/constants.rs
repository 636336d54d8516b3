//! Enumerated codes of the B1500 command set.
//!
//! Every enumeration travels on the wire as its integer code. `code()` gives
//! that code, `from_code()` maps a reply back, `CODES` lists the legal codes
//! for parameter validators and `name()` gives the manual's spelling.

use std::fmt;

use crate::error::{AppResult, DaqError};

macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:expr => $label:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* #[doc = $label] $variant ),+
        }

        impl $name {
            /// Legal wire codes, in declaration order.
            pub const CODES: &'static [i64] = &[$($code),+];

            /// Wire code.
            pub fn code(self) -> i64 {
                match self {
                    $( $name::$variant => $code ),+
                }
            }

            /// Name as spelled in the programming guide.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            /// Map a wire code back to the enumeration.
            pub fn from_code(code: i64) -> AppResult<Self> {
                match code {
                    $( c if c == $code => Ok($name::$variant), )+
                    other => Err(DaqError::invalid_argument(
                        stringify!($name),
                        format!("{other} is not one of {:?}", Self::CODES),
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

/// Channel number of a module slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChNr(u8);

impl ChNr {
    /// Highest slot channel of the mainframe.
    pub const MAX: u8 = 10;

    /// Channel of slot `slot` (1-10).
    pub fn new(slot: u8) -> AppResult<Self> {
        if (1..=Self::MAX).contains(&slot) {
            Ok(Self(slot))
        } else {
            Err(DaqError::invalid_argument(
                "chnum",
                format!("{slot} is not a slot channel (1-{})", Self::MAX),
            ))
        }
    }

    /// Wire code.
    pub fn code(self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for ChNr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

code_enum! {
    /// Staircase sweep mode (`WDCV`).
    SweepMode {
        Linear = 1 => "LINEAR",
        Log = 2 => "LOG",
        LinearTwoWay = 3 => "LINEAR_TWO_WAY",
        LogTwoWay = 4 => "LOG_TWO_WAY",
    }
}

code_enum! {
    /// Measurement mode (`MM`).
    MeasurementMode {
        Spot = 1 => "SPOT",
        StaircaseSweep = 2 => "STAIRCASE_SWEEP",
        PulsedSpot = 3 => "PULSED_SPOT",
        PulsedSweep = 4 => "PULSED_SWEEP",
        StaircaseSweepWithPulsedBias = 5 => "STAIRCASE_SWEEP_WITH_PULSED_BIAS",
        QuasiPulsedSpot = 9 => "QUASI_PULSED_SPOT",
        LinearSearch = 14 => "LINEAR_SEARCH",
        BinarySearch = 15 => "BINARY_SEARCH",
        MultiChannelSweep = 16 => "MULTI_CHANNEL_SWEEP",
        SpotC = 17 => "SPOT_C",
        CvDcSweep = 18 => "CV_DC_SWEEP",
        PulsedSpotC = 19 => "PULSED_SPOT_C",
        PulsedSweepCv = 20 => "PULSED_SWEEP_CV",
        CfSweep = 22 => "CF_SWEEP",
        CvAcSweep = 23 => "CV_AC_SWEEP",
    }
}

code_enum! {
    /// Impedance measurement model (`IMP`).
    ImpedanceModel {
        RX = 1 => "R_X",
        GB = 2 => "G_B",
        ZThetaDeg = 10 => "Z_THETA_DEG",
        ZThetaRad = 11 => "Z_THETA_RAD",
        YThetaDeg = 20 => "Y_THETA_DEG",
        YThetaRad = 21 => "Y_THETA_RAD",
        CpG = 100 => "Cp_G",
        CpD = 101 => "Cp_D",
        CpQ = 102 => "Cp_Q",
        CpRp = 103 => "Cp_Rp",
        CsRs = 200 => "Cs_Rs",
        CsD = 201 => "Cs_D",
        CsQ = 202 => "Cs_Q",
        LpG = 300 => "Lp_G",
        LpD = 301 => "Lp_D",
        LpQ = 302 => "Lp_Q",
        LpRp = 303 => "Lp_Rp",
        LsRs = 400 => "Ls_Rs",
        LsD = 401 => "Ls_D",
        LsQ = 402 => "Ls_Q",
    }
}

code_enum! {
    /// Phase compensation mode (`ADJ`).
    AdjMode {
        Auto = 0 => "AUTO",
        Manual = 1 => "MANUAL",
        LoadAdaptive = 2 => "LOAD_ADAPTIVE",
    }
}

code_enum! {
    /// Operation mode of the phase compensation query (`ADJ?`).
    AdjQueryMode {
        UseLast = 0 => "USE_LAST",
        Measure = 1 => "MEASURE",
    }
}

code_enum! {
    /// Result of the phase compensation query.
    AdjResult {
        Passed = 0 => "PASSED",
        Failed = 1 => "FAILED",
        Aborted = 2 => "ABORTED",
        NotPerformed = 3 => "NOT_PERFORMED",
    }
}

code_enum! {
    /// Open/short/load correction kind.
    CalibrationType {
        Open = 1 => "OPEN",
        Short = 2 => "SHORT",
        Load = 3 => "LOAD",
    }
}

code_enum! {
    /// Result of a correction data measurement (`CORR?`).
    CorrResult {
        Successful = 0 => "SUCCESSFUL",
        CorrectionDataError = 1 => "CORRECTION_DATA_ERROR",
        Aborted = 2 => "ABORTED",
    }
}

code_enum! {
    /// Correction enable state (`CORRST?`).
    CorrState {
        Off = 0 => "OFF",
        On = 1 => "ON",
    }
}

code_enum! {
    /// Reference value model of a correction standard (`DCORR`).
    DcorrMode {
        CpG = 100 => "Cp_G",
        LsRs = 400 => "Ls_Rs",
    }
}

impl DcorrMode {
    /// `(label, unit)` of the primary and secondary reference values.
    pub fn labels_units(self) -> ((&'static str, &'static str), (&'static str, &'static str)) {
        match self {
            DcorrMode::CpG => (("Cp", "F"), ("G", "S")),
            DcorrMode::LsRs => (("Ls", "H"), ("Rs", "Ω")),
        }
    }
}

code_enum! {
    /// Frequency list clear mode (`CLCORR`).
    ClcorrMode {
        ClearOnly = 1 => "CLEAR_ONLY",
        ClearAndSetDefaultFreq = 2 => "CLEAR_AND_SET_DEFAULT_FREQ",
    }
}

code_enum! {
    /// Measurement ranging (`RC`, `TC`).
    RangingMode {
        Auto = 0 => "AUTO",
        Fixed = 2 => "FIXED",
    }
}

code_enum! {
    /// A/D converter averaging mode of the CMU (`ACT`).
    AdcMode {
        Auto = 0 => "AUTO",
        Plc = 2 => "PLC",
    }
}

code_enum! {
    /// Automatic abort of the CV sweep (`WMDCV`).
    Abort {
        Disabled = 1 => "DISABLED",
        Enabled = 2 => "ENABLED",
    }
}

code_enum! {
    /// Output after a normally completed CV sweep (`WMDCV`).
    PostSweepVoltage {
        Start = 1 => "START",
        Stop = 2 => "STOP",
    }
}

code_enum! {
    /// Settings groups returned by the learn query (`*LRN?`).
    LrnType {
        OutputSwitch = 0 => "OUTPUT_SWITCH",
        TmAvCmFmtMmSettings = 31 => "TM_AV_CM_FMT_MM_SETTINGS",
        MeasurementRangingStatus = 32 => "MEASUREMENT_RANGING_STATUS",
        StaircaseSweepMeasurementSettings = 33 => "STAIRCASE_SWEEP_MEASUREMENT_SETTINGS",
        MfcmuAdcSetting = 55 => "MFCMU_ADC_SETTING",
        CvDcBiasSweepMeasurementSettings = 56 => "CV_DC_BIAS_SWEEP_MEASUREMENT_SETTINGS",
    }
}

/// Error message reported by `ERRX?` when the error buffer is empty.
pub const NO_ERROR_MESSAGE: &str = "+0,\"No Error.\"";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        assert_eq!(SweepMode::Linear.code(), 1);
        assert_eq!(MeasurementMode::CvDcSweep.code(), 18);
        assert_eq!(ImpedanceModel::from_code(101).unwrap(), ImpedanceModel::CpD);
        assert_eq!(AdjResult::from_code(2).unwrap().name(), "ABORTED");
    }

    #[test]
    fn test_unknown_code_is_invalid_argument() {
        assert!(matches!(
            SweepMode::from_code(9),
            Err(DaqError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_channel_range() {
        assert_eq!(ChNr::new(3).unwrap().code(), 3);
        assert!(ChNr::new(0).is_err());
        assert!(ChNr::new(11).is_err());
    }

    #[test]
    fn test_codes_list() {
        assert_eq!(Abort::CODES, &[1, 2]);
        assert_eq!(RangingMode::CODES, &[0, 2]);
    }
}
