//! Integration tests for the hot air ramps, room-temperature batches and
//! multi-sample campaigns, run against simulated stations.

use std::time::Duration;

use vt_scan::config::VtConfig;
use vt_scan::experiment::batch::{parse_rows, RoomTemperatureBatch};
use vt_scan::experiment::campaign::{Campaign, CampaignSample};
use vt_scan::experiment::hot_air::HotAirRamp;
use vt_scan::experiment::{Journal, RampSettings, ScanErrorPolicy, ScanLogger};
use vt_scan::hardware::channel::{DeviceParameter, RecordingWriter};
use vt_scan::hardware::clock::SimulatedClock;
use vt_scan::hardware::Clock;
use vt_scan::station::{Station, StationParts};
use vt_scan::VtError;

fn simulated(config: &VtConfig) -> (Station, SimulatedClock, RecordingWriter) {
    let clock = SimulatedClock::new();
    let writer = RecordingWriter::new();
    let station = Station::simulated(config, clock.clone(), writer.clone()).unwrap();
    (station, clock, writer)
}

fn config_at(initial_temperature: f64) -> VtConfig {
    let mut config = VtConfig::default();
    config.device.initial_temperature = initial_temperature;
    config
}

fn log_lines(logger: &ScanLogger<Vec<u8>>) -> Vec<String> {
    String::from_utf8_lossy(logger.get_ref())
        .lines()
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Hot air ramps
// =============================================================================

#[tokio::test]
async fn test_hot_air_up_near_target_snaps_and_finalizes() {
    let (mut station, _clock, writer) = simulated(&config_at(39.6));
    let mut logger = ScanLogger::new(Vec::new());

    let outcome = {
        let StationParts {
            controller, mut ctx, ..
        } = station.parts(&mut logger);
        HotAirRamp::up(40.0).run(controller, &mut ctx).await.unwrap()
    };

    // First reading is within the snap distance and lands on the set point
    assert!(outcome.stop_reached);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.scans, 6);
    assert_eq!(
        log_lines(&logger),
        vec!["1 40", "2 40", "3 40", "4 40", "5 40", "6 40"]
    );

    assert_eq!(writer.writes_to(DeviceParameter::BlowerRampRate.pv()), vec![Some(0.2)]);
    assert_eq!(writer.writes_to(DeviceParameter::BlowerSetPoint.pv()), vec![Some(40.0)]);
}

#[tokio::test]
async fn test_hot_air_down_stops_inside_tolerance() {
    let (mut station, _clock, writer) = simulated(&config_at(80.0));
    let mut logger = ScanLogger::new(Vec::new());
    let ramp = HotAirRamp::down(30.0);

    let outcome = {
        let StationParts {
            controller, mut ctx, ..
        } = station.parts(&mut logger);
        ramp.run(controller, &mut ctx).await.unwrap()
    };

    assert!(outcome.stop_reached);
    assert_eq!(outcome.finalization_scans, 5);
    assert_eq!(log_lines(&logger).len() as u32, outcome.scans);
    assert_eq!(writer.writes_to(DeviceParameter::BlowerRampRate.pv()), vec![Some(-0.2)]);

    // The reading that stopped the main phase satisfied the one-sided test
    let stop_line = &log_lines(&logger)[outcome.iterations as usize - 1];
    let temperature: f64 = stop_line.split_whitespace().nth(1).unwrap().parse().unwrap();
    assert!(ramp.is_settled(temperature));
}

#[tokio::test]
async fn test_hot_air_budget_exhausted() {
    let (mut station, _clock, _writer) = simulated(&config_at(30.0));
    let mut logger = ScanLogger::new(Vec::new());

    let outcome = {
        let StationParts {
            controller, mut ctx, ..
        } = station.parts(&mut logger);
        HotAirRamp::up(600.0)
            .with_max_scans(3)
            .run(controller, &mut ctx)
            .await
            .unwrap()
    };

    assert!(outcome.budget_exhausted());
    assert_eq!(outcome.scans, 3);
}

// =============================================================================
// Room-temperature batch
// =============================================================================

#[tokio::test]
async fn test_batch_logs_each_row_and_releases_sample() {
    let mut config = VtConfig::default();
    config.scan.first_file_number = 1407330;
    let (mut station, clock, _writer) = simulated(&config);

    let rows = parse_rows(
        "position,sample_id,exposure_time,spos\n\
         1,LFP_A,6,0\n\
         2,LFP_B,3,1.5\n"
            .as_bytes(),
    )
    .unwrap();
    let batch = RoomTemperatureBatch::new(rows);
    let mut logger = ScanLogger::new(Vec::new());

    let outcome = {
        let StationParts {
            sample, spos, mut ctx, ..
        } = station.parts(&mut logger);
        batch.run(sample, spos, &mut ctx).await.unwrap()
    };

    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.rejected.is_empty());

    let lines = log_lines(&logger);
    assert!(lines[0].starts_with(
        "1407330 LFP_A 1 12 seconds PSD scan at room temperature, spos = 0 mm, "
    ));
    assert!(lines[1].starts_with(
        "1407331 LFP_B 2 6 seconds PSD scan at room temperature, spos = 1.5 mm, "
    ));

    // Per row: 1 s changer settle, the scan, 2 s pause
    assert_eq!(clock.now(), Duration::from_secs((1 + 12 + 2) + (1 + 6 + 2)));
    assert_eq!(station.spos.position(), 1.5);
    assert_eq!(station.sample.sample_in_position(), None);
}

#[tokio::test]
async fn test_batch_rejected_scan_writes_no_record() {
    let mut config = VtConfig::default();
    config.scan.syntax_error_pause_secs = 5.0;
    config.scan.strict = true;
    let (mut station, _clock, _writer) = simulated(&config);

    // A zero exposure is refused by the detector as malformed
    let rows = parse_rows("position,sample_id,exposure_time,spos\n1,BAD,0,0\n2,GOOD,6,0\n".as_bytes()).unwrap();
    let mut logger = ScanLogger::new(Vec::new());

    let outcome = {
        let StationParts {
            sample, spos, mut ctx, ..
        } = station.parts(&mut logger);
        RoomTemperatureBatch::new(rows)
            .run(sample, spos, &mut ctx)
            .await
            .unwrap()
    };

    assert_eq!(outcome.rejected, vec!["BAD".to_string()]);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].sample_id, "GOOD");
    assert_eq!(outcome.records[0].file_number, 1);
    assert_eq!(log_lines(&logger).len(), 1);
}

#[tokio::test]
async fn test_batch_exposure_too_long_is_rejected() {
    let (mut station, clock, _writer) = simulated(&VtConfig::default());
    let rows = parse_rows("position,sample_id,exposure_time,spos\n1,HUGE,1e300,0\n".as_bytes()).unwrap();
    let mut logger = ScanLogger::new(Vec::new());

    let outcome = {
        let StationParts {
            sample, spos, mut ctx, ..
        } = station.parts(&mut logger);
        RoomTemperatureBatch::new(rows)
            .run(sample, spos, &mut ctx)
            .await
            .unwrap()
    };

    assert_eq!(outcome.rejected, vec!["HUGE".to_string()]);
    assert!(outcome.records.is_empty());
    assert!(log_lines(&logger).is_empty());
    // Changer settle and the batch pause only
    assert_eq!(clock.now(), Duration::from_secs(1 + 2));
}

#[tokio::test]
async fn test_batch_from_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.csv");
    std::fs::write(&path, "position,sample_id,exposure_time,spos\n7,Grey_BAG,6,0.25\n").unwrap();

    let batch = RoomTemperatureBatch::from_csv(&path).unwrap();
    assert_eq!(batch.rows().len(), 1);
    assert_eq!(batch.rows()[0].position, 7);

    let missing = RoomTemperatureBatch::from_csv(dir.path().join("missing.csv"));
    assert!(matches!(missing, Err(VtError::Io(_))));
}

// =============================================================================
// Campaign
// =============================================================================

fn campaign_config(samples: &[(&str, u32)]) -> VtConfig {
    let mut config = config_at(30.0);
    config.campaign.samples = samples
        .iter()
        .map(|(id, position)| CampaignSample {
            id: id.to_string(),
            position: *position,
        })
        .collect();
    config.campaign.start_temperature = 30.0;
    config.campaign.target_temperature = 40.0;
    config
}

#[tokio::test]
async fn test_campaign_heats_each_sample_into_its_own_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = campaign_config(&[("FHT02", 11), ("FHT03", 12)]);
    let (mut station, _clock, _writer) = simulated(&config);
    let mut journal = Journal::new(Vec::new());

    let campaign = Campaign::new(config.campaign.clone(), config.ramp.clone(), dir.path());
    let report = campaign.run(&mut station, &mut journal).await.unwrap();

    assert_eq!(report.samples.len(), 2);
    for (sample, id) in report.samples.iter().zip(["FHT02", "FHT03"]) {
        assert_eq!(sample.sample_id, id);
        assert_eq!(sample.legs.len(), 2);
        assert!(sample.legs.iter().all(|leg| leg.outcome.stop_reached));

        let expected = dir
            .path()
            .join(format!("{}_heating_30C-40C", id))
            .join(format!("{}_heating_30C_to_40C.log", id));
        assert_eq!(sample.log_path, expected);

        let scans: u32 = sample.legs.iter().map(|leg| leg.outcome.scans).sum();
        let text = std::fs::read_to_string(&expected).unwrap();
        assert_eq!(text.lines().count() as u32, scans);
    }

    let notes = String::from_utf8(journal.get_ref().clone()).unwrap();
    assert!(notes.contains("Running VT on FHT02"));
    assert!(notes.contains("Running VT on FHT03"));
    assert!(notes.contains("see log file: FHT03_heating_30C_to_40C.log"));

    // Station left safe
    assert!(!station.beam.is_on());
    assert!(!station.spinner.is_spinning());
    assert_eq!(station.sample.sample_in_position(), None);
    assert_eq!(station.tlx.position(), 300.0);
}

#[tokio::test]
async fn test_campaign_without_return_leg() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = campaign_config(&[("LFP", 3)]);
    config.campaign.return_leg = false;
    let (mut station, _clock, _writer) = simulated(&config);
    let mut journal = Journal::new(Vec::new());

    let report = Campaign::new(config.campaign.clone(), config.ramp.clone(), dir.path())
        .run(&mut station, &mut journal)
        .await
        .unwrap();

    // 30 -> 40 crosses on the third scan (44.4), then five more
    let leg = &report.samples[0].legs[0];
    assert_eq!(report.samples[0].legs.len(), 1);
    assert_eq!(leg.outcome.iterations, 3);
    assert_eq!(leg.outcome.scans, 8);
}

#[tokio::test]
async fn test_campaign_creates_missing_output_directories() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("beamtime").join("ee12345");
    let mut config = campaign_config(&[("LFP", 3)]);
    config.campaign.return_leg = false;
    let (mut station, _clock, _writer) = simulated(&config);
    let mut journal = Journal::new(Vec::new());

    let report = Campaign::new(config.campaign.clone(), config.ramp.clone(), &output)
        .run(&mut station, &mut journal)
        .await
        .unwrap();

    let log_path = &report.samples[0].log_path;
    assert!(log_path.starts_with(&output));
    assert_eq!(std::fs::read_to_string(log_path).unwrap().lines().count(), 8);
}

#[tokio::test]
async fn test_campaign_failure_still_makes_station_safe() {
    let dir = tempfile::tempdir().unwrap();
    let config = campaign_config(&[("FHT02", 11), ("FHT03", 12)]);
    let (mut station, _clock, _writer) = simulated(&config);
    let mut journal = Journal::new(Vec::new());

    let settings = RampSettings {
        ramp_rate: 0.0,
        ..RampSettings::default()
    };
    let result = Campaign::new(config.campaign.clone(), settings, dir.path())
        .run(&mut station, &mut journal)
        .await;

    assert!(matches!(result, Err(VtError::Configuration(_))));
    assert!(!station.beam.is_on());
    assert!(!station.spinner.is_spinning());
    assert_eq!(station.sample.sample_in_position(), None);

    // The second sample was never started
    let notes = String::from_utf8(journal.get_ref().clone()).unwrap();
    assert!(!notes.contains("FHT03"));
}

#[tokio::test]
async fn test_campaign_abort_between_samples() {
    let dir = tempfile::tempdir().unwrap();
    let config = campaign_config(&[("FHT02", 11)]);
    let (mut station, _clock, _writer) = simulated(&config);
    station.abort().trigger("operator");
    let mut journal = Journal::new(Vec::new());

    let result = Campaign::new(config.campaign.clone(), config.ramp.clone(), dir.path())
        .run(&mut station, &mut journal)
        .await;

    assert!(matches!(result, Err(VtError::Aborted(_))));
    assert!(journal.get_ref().is_empty());
    assert!(!station.beam.is_on());
}

#[tokio::test]
async fn test_strict_policy_is_carried_by_the_station() {
    let mut config = VtConfig::default();
    config.scan.strict = true;
    config.scan.syntax_error_pause_secs = 2.5;
    assert_eq!(config.scan.policy(), ScanErrorPolicy::strict(Duration::from_millis(2500)));
}
