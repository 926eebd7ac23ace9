use super::*;

use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn file_then_env_overlay_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
data_dir = "/var/lib/trainer"
remote_url = "http://sync.local:5984"
username = "lerato"
poll_interval_secs = 30
"#,
    );
    assert_eq!(settings.data_dir, PathBuf::from("/var/lib/trainer"));
    assert_eq!(settings.remote_url.as_deref(), Some("http://sync.local:5984"));
    assert_eq!(settings.username.as_deref(), Some("lerato"));
    assert_eq!(settings.poll_interval, Duration::from_secs(30));

    apply_env(
        &mut settings,
        env_of(&[
            ("TRAINER_USERNAME", "thabo"),
            ("TRAINER_REMOTE_URL", "  "),
            ("TRAINER_POLL_INTERVAL_SECS", "5"),
        ]),
    );
    assert_eq!(settings.username.as_deref(), Some("thabo"));
    assert_eq!(settings.remote_url, None);
    assert_eq!(settings.poll_interval, Duration::from_secs(5));
    assert_eq!(settings.data_dir, PathBuf::from("/var/lib/trainer"));
}

#[test]
fn invalid_values_keep_previous_settings() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "poll_interval_secs = \"soon\"");
    assert_eq!(settings, Settings::default());

    apply_env(
        &mut settings,
        env_of(&[("TRAINER_POLL_INTERVAL_SECS", "0")]),
    );
    assert_eq!(settings.poll_interval, Duration::from_secs(10));
}

#[test]
fn saved_username_round_trips_through_data_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join("state");
    assert_eq!(read_saved_username(&dir).expect("read"), None);

    save_username(&dir, " lerato \n").expect("save");
    assert_eq!(
        read_saved_username(&dir).expect("read").as_deref(),
        Some("lerato")
    );
}
