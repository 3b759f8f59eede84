use std::path::PathBuf;
use std::process::Command;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("eval-cli-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn write_settings(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("settings.json");
    let json = r#"{
        "trajectory_resolution_multiplier": 2,
        "num_steps": 64,
        "num_paths_per_release_cell": 8,
        "random_contribution": 0.1,
        "persistence_contribution": 0.5,
        "alpha": 25.0,
        "aabb_file_path": "missing/aabb.txt",
        "release_points_texture_path": "missing/release_points.png",
        "heightmap_texture_path": "missing/heights.png",
        "output_dir_path": "output",
        "model_type": 2,
        "friction_model": 2,
        "friction_coeff": 0.155,
        "drag_coeff": 4000.0,
        "slab_thickness": 0.5,
        "density": 200.0
    }"#;
    std::fs::write(&path, json).expect("write settings");
    path
}

fn run_eval(arguments: &[&std::ffi::OsStr]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_avalanche_eval"))
        .args(arguments)
        .env("RUST_LOG", "debug")
        .output()
        .expect("spawn avalanche_eval")
}

#[test]
fn failed_run_prints_a_single_error_line() {
    let dir = scratch_dir("missing-inputs");
    let settings = write_settings(&dir);
    let output = run_eval(&[settings.as_os_str()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    assert_eq!(lines.len(), 1, "stderr: {stderr}");
    assert!(lines[0].starts_with("error: "), "stderr: {stderr}");
}

#[test]
fn missing_settings_file_is_reported() {
    let dir = scratch_dir("no-settings");
    let missing = dir.join("absent.json");
    let output = run_eval(&[missing.as_os_str()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.trim_end(),
        format!("error: settings file {} does not exist", missing.display())
    );
}

#[test]
fn dry_run_validates_without_a_gpu() {
    let dir = scratch_dir("dry-run");
    let settings = write_settings(&dir);
    let output = run_eval(&[settings.as_os_str(), std::ffi::OsStr::new("--dry-run")]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(output.stderr.is_empty());
}
