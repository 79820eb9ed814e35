use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::Builder;

use sightings::config::SightingsConfig;
use sightings::EncoderKind;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SIGHTINGS_CONFIG",
        "SIGHTINGS_OUTPUT_DIR",
        "SIGHTINGS_BACKEND",
        "SIGHTINGS_MODEL_PATH",
        "SIGHTINGS_LABELS_PATH",
        "SIGHTINGS_CONFIDENCE",
        "SIGHTINGS_ENCODER",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SightingsConfig::load().expect("load defaults");
    assert!(cfg.output_dir.ends_with("DetectedVideos"));
    assert_eq!((cfg.output.width, cfg.output.height), (1280, 720));
    assert_eq!(cfg.output.fps, 30);
    assert_eq!(cfg.output.encoder, EncoderKind::Ffmpeg);
    assert_eq!(cfg.detector.model_path, PathBuf::from("my_model.onnx"));
    assert_eq!(cfg.detector.labels_path, PathBuf::from("classes.txt"));
    assert_eq!(cfg.detector.input_size, 640);
    assert!((cfg.detector.confidence_threshold - 0.25).abs() < f32::EPSILON);
    assert_eq!(cfg.synthetic_frames, 30);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "output_dir": "/srv/sightings",
        "output": { "width": 640, "height": 360, "fps": 15, "encoder": "rawvideo" },
        "detector": { "backend": "stub", "input_size": 320, "confidence_threshold": 0.5 },
        "synthetic_frames": 12
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SIGHTINGS_CONFIG", file.path());
    std::env::set_var("SIGHTINGS_OUTPUT_DIR", "/tmp/sightings-out");
    std::env::set_var("SIGHTINGS_CONFIDENCE", "0.4");

    let cfg = SightingsConfig::load().expect("load config");
    assert_eq!(cfg.output_dir, PathBuf::from("/tmp/sightings-out"));
    assert_eq!((cfg.output.width, cfg.output.height), (640, 360));
    assert_eq!(cfg.output.fps, 15);
    assert_eq!(cfg.output.encoder, EncoderKind::RawVideo);
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.input_size, 320);
    assert!((cfg.detector.confidence_threshold - 0.4).abs() < 1e-6);
    assert_eq!(cfg.synthetic_frames, 12);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
output_dir = "/srv/sightings"

[detector]
backend = "stub"
model_path = "models/wildlife.onnx"
labels_path = "models/wildlife.txt"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("SIGHTINGS_CONFIG", file.path());
    std::env::set_var("SIGHTINGS_ENCODER", "raw");

    let cfg = SightingsConfig::load().expect("load config");
    assert_eq!(cfg.output_dir, PathBuf::from("/srv/sightings"));
    assert_eq!(cfg.detector.model_path, PathBuf::from("models/wildlife.onnx"));
    assert_eq!(cfg.detector.labels_path, PathBuf::from("models/wildlife.txt"));
    assert_eq!(cfg.output.encoder, EncoderKind::RawVideo);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTINGS_CONFIDENCE", "1.5");
    assert!(SightingsConfig::load().is_err());
    std::env::set_var("SIGHTINGS_CONFIDENCE", "high");
    assert!(SightingsConfig::load().is_err());
    clear_env();

    std::env::set_var("SIGHTINGS_ENCODER", "gif");
    assert!(SightingsConfig::load().is_err());
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "output": { "fps": 0 } }"#).expect("write config");
    std::env::set_var("SIGHTINGS_CONFIG", file.path());
    assert!(SightingsConfig::load().is_err());

    clear_env();
}
