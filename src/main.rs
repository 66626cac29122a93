mod alert;
mod config;
mod detection;
mod error;
mod gps;
mod logger;
mod pipeline;
mod sensors;
mod telemetry;
mod types;
mod utils;

use std::env;
use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use log::{error, info, warn};

use alert::{AlertDispatcher, ConsoleChannel, JsonLinesChannel, MqttChannel};
use config::{AlertConfig, AppConfig, ClassifierConfig, ImuConfig, ImuSource};
use detection::{DisabledScorer, FallClassifier, FallScorer, ForestModel, TimedScorer};
use gps::{open_feed, DisabledLocation, LocationProvider, LocationTracker};
use pipeline::{PipelineParts, SamplingOrchestrator};
use sensors::{
    BusGuard, DisabledVitals, InertialReader, MotionSource, RetryPolicy, SimulatedImuBus, SimulatedPpgSource,
    VitalsReader, VitalsSource,
};
use telemetry::{read_rows, LiveReading, SessionSummary, TelemetryLog};

const DEFAULT_CONFIG_PATH: &str = "vitalwatch.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    logger::init_logger();
    info!("VitalWatch starting");

    let config_path = env::var("VITALWATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match AppConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration {}: {}", config_path, e);
            std::process::exit(1);
        }
    };
    info!("Configuration loaded ({})", config_path);

    // Without a telemetry log there is nothing to run for; fail before any
    // background thread is started.
    let telemetry = match TelemetryLog::create(config.telemetry_directory(), &config.telemetry.file_prefix) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let log_path = telemetry.path().to_path_buf();

    let every = config.sampling.failure_log_every;
    let motion = build_motion(&config.imu);
    let vitals = build_vitals(&config);
    let location = build_location(&config);
    let classifier = FallClassifier::new(build_scorer(&config.classifier), &config.classifier, every);
    let dispatcher = build_dispatcher(&config.alerts, Arc::clone(&location));

    let orchestrator = SamplingOrchestrator::new(
        PipelineParts {
            motion,
            vitals,
            location,
            classifier,
            dispatcher,
            telemetry,
        },
        config.sampling.clone(),
    );

    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let loop_signal = Arc::clone(&shutdown_signal);
    let sampling = tokio::task::spawn_blocking(move || orchestrator.run(loop_signal));

    info!("Monitoring started, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl-C, shutting down: {}", e);
    }
    info!("Ctrl-C received, signaling sampling loop to shutdown");
    shutdown_signal.store(true, Ordering::Relaxed);

    let report = sampling.await?;
    if !report.counters.is_clean() {
        warn!(
            "Session had {} failed reads and {} telemetry write errors",
            report.counters.frames_failed, report.counters.row_errors
        );
    }

    if config.telemetry.write_summary {
        write_summary(&log_path);
    }
    match LiveReading::from_directory(config.telemetry_directory(), &config.telemetry.file_prefix) {
        Ok(reading) => info!(
            "Last reading: {:?}, accel {:.2}g, HR {:?}, SpO2 {:?}",
            reading.device_status, reading.accel_magnitude, reading.heart_rate, reading.spo2
        ),
        Err(e) => warn!("Cannot read back telemetry: {}", e),
    }

    info!("VitalWatch stopped");
    Ok(())
}

fn build_motion(config: &ImuConfig) -> Box<dyn MotionSource> {
    let bus = match config.source {
        ImuSource::Simulated => SimulatedImuBus::new(
            config.address,
            config.simulated_fall_every_secs.map(Duration::from_secs_f64),
            config.simulated_nack_rate,
        ),
    };
    let reader = InertialReader::new(
        Arc::new(BusGuard::new(bus)),
        config.address,
        RetryPolicy::linear(config.read_attempts, Duration::from_millis(config.backoff_step_ms)),
    );
    // Not fatal: every cycle's failed read is counted instead.
    if let Err(e) = reader.init() {
        error!("IMU initialisation failed: {}", e);
    }
    Box::new(reader)
}

fn build_vitals(config: &AppConfig) -> Arc<dyn VitalsSource> {
    if !config.vitals.enabled {
        info!("Vitals monitoring disabled");
        return Arc::new(DisabledVitals);
    }
    let source = SimulatedPpgSource::new(
        config.vitals.sample_rate_hz,
        config.vitals.simulated_bpm,
        config.vitals.simulated_spo2,
    );
    match VitalsReader::spawn(source, &config.vitals, config.sampling.failure_log_every) {
        Ok(reader) => Arc::new(reader),
        Err(e) => {
            warn!("Continuing without vitals: {}", e);
            Arc::new(DisabledVitals)
        }
    }
}

fn build_location(config: &AppConfig) -> Arc<dyn LocationProvider> {
    if !config.gps.enabled {
        info!("GNSS tracking disabled");
        return Arc::new(DisabledLocation);
    }
    let tracker = open_feed(&config.gps)
        .and_then(|feed| LocationTracker::spawn(feed, config.sampling.failure_log_every));
    match tracker {
        Ok(tracker) => Arc::new(tracker),
        Err(e) => {
            warn!("Continuing without location: {}", e);
            Arc::new(DisabledLocation)
        }
    }
}

fn build_scorer(config: &ClassifierConfig) -> Box<dyn FallScorer> {
    let Some(path) = &config.model_path else {
        warn!("No fall model configured, fall detection disabled");
        return Box::new(DisabledScorer);
    };
    let scorer = ForestModel::load(path).and_then(|model| TimedScorer::spawn(model, config.timeout()));
    match scorer {
        Ok(scorer) => Box::new(scorer),
        Err(e) => {
            warn!("Fall detection disabled: {}", e);
            Box::new(DisabledScorer)
        }
    }
}

fn build_dispatcher(config: &AlertConfig, location: Arc<dyn LocationProvider>) -> AlertDispatcher {
    let mut dispatcher = AlertDispatcher::new(location).with_channel(Box::new(JsonLinesChannel::new(&config.event_log_path)));
    if config.console {
        dispatcher.add_channel(Box::new(ConsoleChannel));
    }
    if let Some(mqtt) = &config.mqtt {
        match MqttChannel::connect(mqtt, config.emergency_contacts.clone()) {
            Ok(channel) => dispatcher.add_channel(Box::new(channel)),
            Err(e) => warn!("MQTT alert channel unavailable: {}", e),
        }
    }
    info!("Alert channels: {}", dispatcher.channel_names().join(", "));
    dispatcher
}

fn write_summary(log_path: &Path) {
    let rows = match read_rows(log_path) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Cannot read telemetry for the session summary: {}", e);
            return;
        }
    };
    match SessionSummary::from_rows(&rows) {
        Some(summary) => {
            if let Err(e) = summary.write_next_to(log_path) {
                warn!("Failed to write session summary: {}", e);
            }
        }
        None => info!("No telemetry rows recorded, skipping session summary"),
    }
}
