use ctxbuild::error::{ErrorKind, ExitCode};
use ctxbuild::pipeline::{OutputTarget, Pipeline, PipelineOptions, RunReport, SessionStatus};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(dir: &Path, name: &str, content: &[u8]) {
    fs::write(dir.join(name), content).unwrap();
}

fn build(dir: &Path) -> RunReport {
    Pipeline::new(PipelineOptions::default())
        .build(dir, &OutputTarget::Directory(dir.to_path_buf()))
        .unwrap()
}

fn kind_of(report: &RunReport, session: &str) -> Option<ErrorKind> {
    report
        .sessions
        .iter()
        .find(|o| o.session == session)
        .and_then(|o| match &o.status {
            SessionStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        })
}

#[test]
fn test_unresolved_entry_fails_only_its_session() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "broken.xml",
        br#"<Session id="broken"><Entry order="1" type="Sightings" file="c.dat"/></Session>"#,
    );
    write(dir.path(), "broken_a.dat", b"not referenced");
    write(
        dir.path(),
        "good.xml",
        br#"<Session id="good"><Entry order="1" type="Sightings" file="good.dat"/></Session>"#,
    );
    write(dir.path(), "good.dat", b"fine");

    let report = build(dir.path());

    assert_eq!(report.exit_code(), ExitCode::SessionFailures);
    assert_eq!(report.sessions.len(), 2);
    assert_eq!(kind_of(&report, "broken"), Some(ErrorKind::UnresolvedEntry));
    assert_eq!(kind_of(&report, "good"), None);

    assert!(!dir.path().join("broken.ctx").exists());
    assert!(dir.path().join("good.ctx").exists());

    let SessionStatus::Failed { message, .. } = &report.sessions[0].status else {
        panic!("expected failure first");
    };
    assert!(message.contains("c.dat"));
}

#[test]
fn test_descriptor_without_payloads_is_missing_payload() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "empty.xml",
        br#"<Session id="empty"><Entry order="1" type="Sightings" file="empty.dat"/></Session>"#,
    );

    let report = build(dir.path());

    assert_eq!(report.exit_code(), ExitCode::SessionFailures);
    assert_eq!(kind_of(&report, "empty"), Some(ErrorKind::MissingPayload));
    assert!(!dir.path().join("empty.ctx").exists());
}

#[test]
fn test_descriptor_with_zero_entries_is_missing_payload() {
    let dir = tempdir().unwrap();
    write(dir.path(), "hollow.xml", br#"<Session id="hollow"></Session>"#);
    write(dir.path(), "hollow.dat", b"data nobody lists");

    let report = build(dir.path());

    assert_eq!(kind_of(&report, "hollow"), Some(ErrorKind::MissingPayload));
    assert!(!dir.path().join("hollow.ctx").exists());
}

#[test]
fn test_payloads_without_descriptor_are_reported() {
    let dir = tempdir().unwrap();
    write(dir.path(), "stray.dat", b"lost");
    write(
        dir.path(),
        "kept.xml",
        br#"<Session id="kept"><Entry order="1" type="Sightings" file="kept.dat"/></Session>"#,
    );
    write(dir.path(), "kept.dat", b"k");

    let report = build(dir.path());

    assert_eq!(report.exit_code(), ExitCode::SessionFailures);
    assert_eq!(kind_of(&report, "stray"), Some(ErrorKind::MissingDescriptor));
    assert_eq!(kind_of(&report, "kept"), None);
    let names: Vec<_> = report.sessions.iter().map(|o| o.session.as_str()).collect();
    assert_eq!(names, ["kept", "stray"]);
}

#[test]
fn test_malformed_descriptors() {
    let dir = tempdir().unwrap();
    let cases: [(&str, &[u8]); 4] = [
        (
            "noid",
            &br#"<Session><Entry order="1" type="T" file="noid.dat"/></Session>"#[..],
        ),
        (
            "badorder",
            &br#"<Session id="badorder"><Entry order="x" type="T" file="badorder.dat"/></Session>"#[..],
        ),
        (
            "notype",
            &br#"<Session id="notype"><Entry order="1" file="notype.dat"/></Session>"#[..],
        ),
        (
            "broken",
            &br#"<Session id="broken"><Entry order="1" type="T" file="broken.dat"></Session>"#[..],
        ),
    ];
    for (stem, xml) in cases {
        write(dir.path(), &format!("{stem}.xml"), xml);
        write(dir.path(), &format!("{stem}.dat"), b"payload");
    }

    let report = build(dir.path());

    assert_eq!(report.sessions.len(), 4);
    for (stem, _) in cases {
        assert_eq!(
            kind_of(&report, stem),
            Some(ErrorKind::MalformedDescriptor),
            "{stem}"
        );
        assert!(!dir.path().join(format!("{stem}.ctx")).exists());
    }
}

#[test]
fn test_truncated_descriptor_writes_nothing() {
    let dir = tempdir().unwrap();
    // Cut off after the first entry, before the second and the closing tag.
    write(
        dir.path(),
        "cut.xml",
        br#"<Session id="cut">
  <Entry order="1" type="Elements" file="cut.txt"/>
  <Entry order="2" ty"#,
    );
    write(dir.path(), "cut.txt", b"elements");
    write(dir.path(), "cut.dat", b"sightings");
    write(
        dir.path(),
        "whole.xml",
        br#"<Session id="whole"><Entry order="1" type="Sightings" file="whole.dat"/></Session>"#,
    );
    write(dir.path(), "whole.dat", b"w");

    let report = build(dir.path());

    assert_eq!(report.exit_code(), ExitCode::SessionFailures);
    assert_eq!(kind_of(&report, "cut"), Some(ErrorKind::MalformedDescriptor));
    assert_eq!(kind_of(&report, "whole"), None);
    assert!(!dir.path().join("cut.ctx").exists());
    assert!(dir.path().join("whole.ctx").exists());
}

#[test]
fn test_descriptor_missing_closing_tag_writes_nothing() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "open.xml",
        br#"<Session id="open"><Entry order="1" type="Sightings" file="open.dat"/>"#,
    );
    write(dir.path(), "open.dat", b"o");

    let report = build(dir.path());

    assert_eq!(report.exit_code(), ExitCode::SessionFailures);
    assert_eq!(kind_of(&report, "open"), Some(ErrorKind::MalformedDescriptor));
    assert!(!dir.path().join("open.ctx").exists());
}

#[test]
fn test_empty_folder_has_no_sessions() {
    let dir = tempdir().unwrap();
    write(dir.path(), "readme.md", b"not a backup file");

    let report = build(dir.path());
    assert_eq!(report.exit_code(), ExitCode::NoSessions);
}

#[cfg(unix)]
#[test]
fn test_unreadable_payload_fails_only_its_session() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "locked.xml",
        br#"<Session id="locked"><Entry order="1" type="Sightings" file="locked.dat"/></Session>"#,
    );
    let locked = dir.path().join("locked.dat");
    write(dir.path(), "locked.dat", b"secret");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&locked).is_ok() {
        // Running as root; permissions are not enforced.
        return;
    }

    write(
        dir.path(),
        "open.xml",
        br#"<Session id="open"><Entry order="1" type="Sightings" file="open.dat"/></Session>"#,
    );
    write(dir.path(), "open.dat", b"public");

    let report = build(dir.path());
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(kind_of(&report, "locked"), Some(ErrorKind::PayloadReadFailure));
    assert_eq!(kind_of(&report, "open"), None);
    assert!(dir.path().join("open.ctx").exists());
}
