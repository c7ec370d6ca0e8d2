use serial_test::serial;
use std::fs;
use std::time::Duration;
use wards::{
    install_root, IsolationPolicy, MemoryLimit, PolicyError, SeccompProfile, INSTALL_ROOT_ENV,
};

fn write_profile(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("seccomp_profile.json");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn policy_always_disables_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_profile(dir.path(), r#"{"defaultAction":"SCMP_ACT_ERRNO"}"#);

    let policy = IsolationPolicy::new(
        MemoryLimit::parse("256m").unwrap(),
        SeccompProfile::load(&path).unwrap(),
        Duration::from_secs(10),
        Some(64),
    )
    .unwrap();

    assert_eq!(policy.network_mode(), "none");
    assert_eq!(policy.memory_limit().as_arg(), "256m");
    assert_eq!(policy.timeout(), Duration::from_secs(10));
    assert_eq!(policy.pids_limit(), Some(64));
    assert!(policy.seccomp().security_opt().starts_with("seccomp=/"));
}

#[test]
fn zero_timeout_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_profile(dir.path(), "{}");

    let result = IsolationPolicy::new(
        MemoryLimit::parse("64m").unwrap(),
        SeccompProfile::load(&path).unwrap(),
        Duration::ZERO,
        None,
    );
    assert!(matches!(result, Err(PolicyError::ZeroTimeout)));
}

#[test]
fn zero_pids_limit_means_unlimited() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_profile(dir.path(), "{}");

    let policy = IsolationPolicy::new(
        MemoryLimit::parse("64m").unwrap(),
        SeccompProfile::load(&path).unwrap(),
        Duration::from_secs(1),
        Some(0),
    )
    .unwrap();
    assert_eq!(policy.pids_limit(), None);
}

#[test]
fn missing_and_blank_profiles_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let missing = SeccompProfile::load(dir.path().join("absent.json"));
    assert!(matches!(missing, Err(PolicyError::ProfileUnreadable { .. })));

    let blank = write_profile(dir.path(), "  \n");
    let empty = SeccompProfile::load(&blank);
    assert!(matches!(empty, Err(PolicyError::EmptyProfile { .. })));
}

#[test]
fn profile_content_is_not_interpreted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_profile(dir.path(), "not json, still passed through");

    let profile = SeccompProfile::load(&path).unwrap();
    assert_eq!(profile.len(), 30);
    assert_eq!(profile.path(), fs::canonicalize(&path).unwrap());
}

#[test]
#[serial]
fn install_root_honours_environment_override() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var(INSTALL_ROOT_ENV, dir.path());
    let root = install_root().unwrap();
    std::env::remove_var(INSTALL_ROOT_ENV);

    assert_eq!(root, dir.path());
}
