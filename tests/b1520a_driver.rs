//! B1520A driver against a scripted link.

use std::time::Duration;

use labdaq::config::TimeoutSettings;
use labdaq::error::DaqError;
use labdaq::instrument::b1500::constants::{Abort, AdjQueryMode, PostSweepVoltage};
use labdaq::instrument::b1500::{CvSweepSetup, KeysightB1500, SweepState, B1520A};
use labdaq::instrument::{link, MockLink, ParamValue};

const NO_ERROR: &str = "+0,\"No Error.\"";

fn cmu(mock: &MockLink) -> B1520A {
    let mainframe = KeysightB1500::new(link::shared(mock.clone()), TimeoutSettings::default());
    B1520A::new(mainframe, 3).unwrap()
}

fn sweep_setup() -> CvSweepSetup {
    CvSweepSetup::new(-1.0, 1.0, 21, 1e6, 0.03)
}

#[tokio::test]
async fn test_setup_staircase_cv_command_sequence() {
    let mock = MockLink::new("mock");
    mock.push_reply(NO_ERROR);
    mock.push_reply("0,0,0,0");
    let mut cmu = cmu(&mock);

    let message = cmu.setup_staircase_cv(&sweep_setup()).await.unwrap();

    assert_eq!(message, NO_ERROR);
    assert_eq!(cmu.sweep_state(), SweepState::Ready);
    assert_eq!(
        mock.sent(),
        vec![
            "CN 3",
            "ACT 2,1",
            "ACT 2,5",
            "FC 3,1000000.0",
            "ACV 3,0.03",
            "WMDCV 2",
            "WMDCV 2,2",
            "WTDCV 0.0,0.0,0.0,0.0,0.0",
            "WTDCV 0.0,0.0,0.0,0.0,0.0",
            "WTDCV 0.0,0.0,0.0,0.0,0.0",
            "WTDCV 0.0,0.0,0.0,0.0,0.0",
            "WTDCV 0.0,0.0,0.0,0.0,0.0",
            "WDCV 3,1,0.0,0.0,1",
            "WDCV 3,1,-1.0,0.0,1",
            "WDCV 3,1,-1.0,1.0,1",
            "WDCV 3,1,-1.0,1.0,21",
            "MM 18,3",
            "IMP 101",
            "LMN 0",
            "RC 3,0",
            "ERRX?",
            "ERR?",
        ]
    );
    assert_eq!(mock.pending_replies(), 0);
}

#[tokio::test]
async fn test_setup_with_instrument_error_stays_not_configured() {
    let mock = MockLink::new("mock");
    mock.push_reply("+305,\"Excess current in HPSMU.\"");
    mock.push_reply("0,0,0,0");
    let mut cmu = cmu(&mock);

    let message = cmu.setup_staircase_cv(&sweep_setup()).await.unwrap();

    assert_eq!(message, "+305,\"Excess current in HPSMU.\"");
    assert_eq!(cmu.sweep_state(), SweepState::NotConfigured);
    assert_eq!(mock.sent().last().map(String::as_str), Some("ERR?"));
    assert!(matches!(
        cmu.run_sweep().await,
        Err(DaqError::NotReady(_))
    ));
}

#[tokio::test]
async fn test_run_sweep_before_setup_is_not_ready() {
    let mock = MockLink::new("mock");
    let mut cmu = cmu(&mock);

    assert!(matches!(
        cmu.run_sweep().await,
        Err(DaqError::NotReady(_))
    ));
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn test_run_sweep_returns_primary_and_secondary() {
    let mock = MockLink::new("mock");
    mock.push_reply(NO_ERROR);
    mock.push_reply("0,0,0,0");
    let mut cmu = cmu(&mock);
    cmu.setup_staircase_cv(&CvSweepSetup::new(0.0, 1.0, 2, 1e5, 0.03))
        .await
        .unwrap();
    mock.clear_log();

    mock.push_reply("NCC+1.000000E-12,NCY+2.000000E-03,NCC+1.100000E-12,NCY+2.100000E-03");
    let result = cmu.run_sweep().await.unwrap();

    assert_eq!(result.primary, vec![1.0e-12, 1.1e-12]);
    assert_eq!(result.secondary, vec![2.0e-3, 2.1e-3]);
    assert_eq!(mock.sent(), vec!["XE"]);
    assert_eq!(cmu.sweep_state(), SweepState::Ready);
}

#[tokio::test]
async fn test_failed_sweep_read_returns_to_ready() {
    let mock = MockLink::new("mock");
    mock.push_reply(NO_ERROR);
    mock.push_reply("0,0,0,0");
    let mut cmu = cmu(&mock);
    cmu.setup_staircase_cv(&sweep_setup()).await.unwrap();

    mock.push_timeout();
    assert!(matches!(cmu.run_sweep().await, Err(DaqError::Timeout(_))));
    assert_eq!(cmu.sweep_state(), SweepState::Ready);

    mock.push_reply("NCC+1.000000E-12");
    assert!(matches!(
        cmu.run_sweep().await,
        Err(DaqError::ResultFormatMismatch(_))
    ));
    assert_eq!(cmu.sweep_state(), SweepState::Ready);
}

#[tokio::test]
async fn test_hold_limit() {
    let mock = MockLink::new("mock");
    let mut cmu = cmu(&mock);

    let err = cmu.set("hold", 655.36).await.unwrap_err();
    assert!(matches!(err, DaqError::InvalidArgument { .. }));
    assert!(mock.sent().is_empty());
    assert_eq!(
        cmu.parameters().cached("hold").unwrap(),
        Some(ParamValue::Float(0.0))
    );

    cmu.set("hold", 655.35).await.unwrap();
    assert_eq!(mock.sent(), vec!["WTDCV 655.35,0.0,0.0,0.0,0.0"]);
    assert_eq!(
        cmu.parameters().cached("hold").unwrap(),
        Some(ParamValue::Float(655.35))
    );
}

#[tokio::test]
async fn test_group_get_updates_every_member() {
    let mock = MockLink::new("mock");
    mock.push_reply("WMDCV2,2;WTDCV0.5,0.1,0.0,0.0,0.0;WDCV3,1,-1.0,1.0,21");
    let mut cmu = cmu(&mock);

    assert_eq!(cmu.get("sweep_steps").await.unwrap(), ParamValue::Int(21));
    assert_eq!(mock.sent(), vec!["*LRN? 56"]);

    let cached = |name: &str| cmu.parameters().cached(name).unwrap();
    assert_eq!(cached("chan"), Some(ParamValue::Int(3)));
    assert_eq!(cached("sweep_mode"), Some(ParamValue::Int(1)));
    assert_eq!(cached("sweep_start"), Some(ParamValue::Float(-1.0)));
    assert_eq!(cached("sweep_end"), Some(ParamValue::Float(1.0)));
}

#[tokio::test]
async fn test_unparsable_group_reply_leaves_cache_untouched() {
    let mock = MockLink::new("mock");
    mock.push_reply("ACT2,5");
    let mut cmu = cmu(&mock);

    let err = cmu.get("sweep_end").await.unwrap_err();
    assert!(matches!(err, DaqError::UnparsableResponse { .. }));
    assert_eq!(
        cmu.parameters().cached("sweep_end").unwrap(),
        Some(ParamValue::Float(0.0))
    );
    assert_eq!(
        cmu.parameters().cached("sweep_steps").unwrap(),
        Some(ParamValue::Int(1))
    );
}

#[tokio::test]
async fn test_capacitance() {
    let mock = MockLink::new("mock");
    mock.push_reply("CAFR+1.234560E-12,YAFR+5.678900E-06");
    let mut cmu = cmu(&mock);

    let (c, y) = cmu.capacitance().await.unwrap();
    assert_eq!(c, 1.23456e-12);
    assert_eq!(y, 5.6789e-6);
    assert_eq!(mock.sent(), vec!["MM 17,3", "TC 3,0"]);
}

#[tokio::test]
async fn test_capacitance_with_swapped_tags() {
    let mock = MockLink::new("mock");
    mock.push_reply("YAFR+5.678900E-06,CAFR+1.234560E-12");
    let mut cmu = cmu(&mock);

    assert!(matches!(
        cmu.capacitance().await,
        Err(DaqError::ResultFormatMismatch(_))
    ));
}

#[tokio::test]
async fn test_write_only_parameter_without_value_is_not_ready() {
    let mock = MockLink::new("mock");
    let mut cmu = cmu(&mock);

    assert!(matches!(
        cmu.get("voltage_dc").await,
        Err(DaqError::NotReady(_))
    ));

    cmu.set_voltage_dc(1.5).await.unwrap();
    assert_eq!(cmu.get("voltage_dc").await.unwrap(), ParamValue::Float(1.5));
    assert_eq!(mock.sent(), vec!["DCV 3,1.5"]);
}

#[tokio::test]
async fn test_setup_with_auto_abort_disabled() {
    let mock = MockLink::new("mock");
    mock.push_reply(NO_ERROR);
    mock.push_reply("0,0,0,0");
    let mut cmu = cmu(&mock);
    let mut setup = sweep_setup();
    setup.abort_enabled = Abort::Disabled;
    setup.post_sweep_voltage_cond = PostSweepVoltage::Start;

    let message = cmu.setup_staircase_cv(&setup).await.unwrap();

    assert_eq!(message, NO_ERROR);
    assert_eq!(cmu.sweep_state(), SweepState::Ready);
    let sent = mock.sent();
    assert_eq!(sent[5..7], ["WMDCV 1", "WMDCV 1,1"]);
    assert_eq!(sent[sent.len() - 2..], ["ERRX?", "ERR?"]);
    assert_eq!(
        cmu.parameters().cached("post_sweep_voltage_cond").unwrap(),
        Some(ParamValue::Int(1))
    );
}

#[tokio::test]
async fn test_failed_setup_still_drains_error_buffer() {
    let mock = MockLink::new("mock");
    mock.push_reply("0,0,0,0");
    let mut cmu = cmu(&mock);
    let mut setup = sweep_setup();
    setup.adc_coef = 500;

    let err = cmu.setup_staircase_cv(&setup).await.unwrap_err();

    assert!(matches!(err, DaqError::InvalidArgument { .. }));
    assert_eq!(cmu.sweep_state(), SweepState::NotConfigured);
    assert_eq!(mock.sent(), vec!["CN 3", "ACT 2,1", "ERR?"]);
    assert_eq!(mock.pending_replies(), 0);
}

#[tokio::test]
async fn test_spot_measurement_invalidates_sweep_setup() {
    let mock = MockLink::new("mock");
    mock.push_reply(NO_ERROR);
    mock.push_reply("0,0,0,0");
    let mut cmu = cmu(&mock);
    cmu.setup_staircase_cv(&sweep_setup()).await.unwrap();
    assert_eq!(cmu.sweep_state(), SweepState::Ready);

    mock.push_reply("CAFR+1.234560E-12,YAFR+5.678900E-06");
    cmu.capacitance().await.unwrap();

    assert_eq!(cmu.sweep_state(), SweepState::NotConfigured);
    mock.clear_log();
    assert!(matches!(cmu.run_sweep().await, Err(DaqError::NotReady(_))));
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn test_phase_compensation_waits_sixty_seconds() {
    let mock = MockLink::new("mock");
    mock.push_timeout();
    let cmu = cmu(&mock);

    let err = cmu
        .phase_compensation(Some(AdjQueryMode::Measure))
        .await
        .unwrap_err();
    assert!(matches!(err, DaqError::Timeout(d) if d == Duration::from_secs(60)));
}

#[tokio::test]
async fn test_sweep_timeout_scales_with_step_delay() {
    let mock = MockLink::new("mock");
    mock.push_reply(NO_ERROR);
    mock.push_reply("0,0,0,0");
    let mut cmu = cmu(&mock);
    let mut setup = sweep_setup();
    setup.step_delay = 1.0;
    cmu.setup_staircase_cv(&setup).await.unwrap();

    // 1 s per step, 21 steps, factor 6
    mock.push_timeout();
    let err = cmu.run_sweep().await.unwrap_err();
    assert!(matches!(err, DaqError::Timeout(d) if d == Duration::from_secs(126)));
}
