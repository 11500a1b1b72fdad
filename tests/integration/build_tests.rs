use ctxbuild::container::{unpack, PACKED_MAGIC, PACKED_VERSION};
use ctxbuild::error::{ErrorKind, ExitCode};
use ctxbuild::pipeline::{OutputTarget, Pipeline, PipelineOptions, SessionStatus};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(dir: &Path, name: &str, content: &[u8]) {
    fs::write(dir.join(name), content).unwrap();
}

const SESSION001: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Session id="session001">
  <Entry order="1" type="Sightings" file="a.dat"/>
  <Entry order="2" type="Sightings" file="b.dat"/>
</Session>
"#;

#[test]
fn test_session001_exact_layout() {
    let dir = tempdir().unwrap();
    write(dir.path(), "session001.xml", SESSION001.as_bytes());
    write(dir.path(), "a.dat", b"AAAA");
    write(dir.path(), "b.dat", b"BBBBBBBB");

    let report = Pipeline::new(PipelineOptions::default())
        .build(dir.path(), &OutputTarget::Directory(dir.path().to_path_buf()))
        .unwrap();
    assert_eq!(report.exit_code(), ExitCode::Success);

    let bytes = fs::read(dir.path().join("session001.ctx")).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&PACKED_MAGIC);
    expected.extend_from_slice(&PACKED_VERSION.to_le_bytes());
    expected.extend_from_slice(&2u32.to_le_bytes());
    expected.extend_from_slice(&10u16.to_le_bytes());
    expected.extend_from_slice(b"session001");
    for payload in [&b"AAAA"[..], &b"BBBBBBBB"[..]] {
        expected.extend_from_slice(&9u16.to_le_bytes());
        expected.extend_from_slice(b"Sightings");
        expected.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        expected.extend_from_slice(payload);
    }
    assert_eq!(bytes, expected);

    // header + Σ(entry header + payload)
    assert_eq!(bytes.len(), (12 + 10) + (10 + 9 + 4) + (10 + 9 + 8));
}

#[test]
fn test_entries_follow_declared_order_not_document_order() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "survey.xml",
        br#"<Session id="survey">
  <Entry order="2" type="Sightings" file="survey.dat"/>
  <Entry order="1" type="Elements" file="survey.txt"/>
</Session>"#,
    );
    write(dir.path(), "survey.txt", b"elements");
    write(dir.path(), "survey.dat", b"sightings");

    Pipeline::new(PipelineOptions::default())
        .build(dir.path(), &OutputTarget::Directory(dir.path().to_path_buf()))
        .unwrap();

    let unpacked = unpack(&fs::read(dir.path().join("survey.ctx")).unwrap()).unwrap();
    assert_eq!(unpacked.id, "survey");
    let tags: Vec<_> = unpacked.entries.iter().map(|e| e.tag.as_str()).collect();
    assert_eq!(tags, ["Elements", "Sightings"]);
    assert_eq!(unpacked.entries[0].bytes, b"elements");
    assert_eq!(unpacked.entries[1].bytes, b"sightings");
}

#[test]
fn test_rebuild_is_byte_identical() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("backup");
    fs::create_dir(&input).unwrap();
    write(&input, "session001.xml", SESSION001.as_bytes());
    write(&input, "a.dat", &[0u8, 1, 2, 3, 255]);
    write(&input, "b.dat", &vec![7u8; 70_000]);

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    for out in [&first, &second] {
        let report = Pipeline::new(PipelineOptions::default())
            .build(&input, &OutputTarget::Directory(out.clone()))
            .unwrap();
        assert_eq!(report.exit_code(), ExitCode::Success);
    }

    assert_eq!(
        fs::read(first.join("session001.ctx")).unwrap(),
        fs::read(second.join("session001.ctx")).unwrap()
    );
}

#[test]
fn test_existing_output_is_not_clobbered() {
    let dir = tempdir().unwrap();
    write(dir.path(), "session001.xml", SESSION001.as_bytes());
    write(dir.path(), "a.dat", b"a");
    write(dir.path(), "b.dat", b"b");
    write(dir.path(), "session001.ctx", b"previous archive");

    let target = OutputTarget::Directory(dir.path().to_path_buf());
    let report = Pipeline::new(PipelineOptions::default())
        .build(dir.path(), &target)
        .unwrap();

    assert_eq!(report.exit_code(), ExitCode::SessionFailures);
    match &report.sessions[0].status {
        SessionStatus::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::WriteFailure);
            assert!(message.contains("--force"));
        }
        other => panic!("expected a write failure, got {other:?}"),
    }
    assert_eq!(
        fs::read(dir.path().join("session001.ctx")).unwrap(),
        b"previous archive"
    );

    let options = PipelineOptions {
        overwrite: true,
        ..PipelineOptions::default()
    };
    let report = Pipeline::new(options).build(dir.path(), &target).unwrap();
    assert_eq!(report.exit_code(), ExitCode::Success);
    assert_eq!(&fs::read(dir.path().join("session001.ctx")).unwrap()[..4], b"CTXP");
}

#[test]
fn test_report_carries_digest_of_written_file() {
    use sha2::{Digest, Sha256};

    let dir = tempdir().unwrap();
    write(dir.path(), "session001.xml", SESSION001.as_bytes());
    write(dir.path(), "a.dat", b"a");
    write(dir.path(), "b.dat", b"b");

    let report = Pipeline::new(PipelineOptions::default())
        .build(dir.path(), &OutputTarget::Directory(dir.path().join("out")))
        .unwrap();

    let SessionStatus::Built {
        output,
        sha256,
        bytes,
        ..
    } = &report.sessions[0].status
    else {
        panic!("expected Built");
    };
    let written = fs::read(output).unwrap();
    assert_eq!(*bytes, written.len() as u64);
    assert_eq!(*sha256, format!("{:x}", Sha256::digest(&written)));
}

#[test]
fn test_max_entry_size_rejects_large_payload() {
    let dir = tempdir().unwrap();
    write(dir.path(), "session001.xml", SESSION001.as_bytes());
    write(dir.path(), "a.dat", &[0u8; 16]);
    write(dir.path(), "b.dat", &[0u8; 4096]);

    let options = PipelineOptions {
        max_entry_size: Some(1024),
        ..PipelineOptions::default()
    };
    let report = Pipeline::new(options)
        .build(dir.path(), &OutputTarget::Directory(dir.path().to_path_buf()))
        .unwrap();

    match &report.sessions[0].status {
        SessionStatus::Failed { kind, message } => {
            assert_eq!(*kind, ErrorKind::PayloadReadFailure);
            assert!(message.contains("b.dat"));
        }
        other => panic!("expected a read failure, got {other:?}"),
    }
    assert!(!dir.path().join("session001.ctx").exists());
}

#[test]
fn test_implicit_device_descriptor() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "Patrol.xml",
        br#"<?xml version="1.0"?><CyberTracker><Application name="Patrol"/></CyberTracker>"#,
    );
    write(dir.path(), "Patrol.txt", b"element list");
    write(dir.path(), "Patrol.DAT", b"sightings db");

    let target = OutputTarget::Directory(dir.path().to_path_buf());

    let strict = Pipeline::new(PipelineOptions::default())
        .build(dir.path(), &target)
        .unwrap();
    assert_eq!(strict.exit_code(), ExitCode::SessionFailures);
    assert!(matches!(
        &strict.sessions[0].status,
        SessionStatus::Failed { kind: ErrorKind::MalformedDescriptor, .. }
    ));

    let options = PipelineOptions {
        implicit_descriptors: true,
        ..PipelineOptions::default()
    };
    let report = Pipeline::new(options).build(dir.path(), &target).unwrap();
    assert_eq!(report.exit_code(), ExitCode::Success);

    let unpacked = unpack(&fs::read(dir.path().join("Patrol.ctx")).unwrap()).unwrap();
    let tags: Vec<_> = unpacked.entries.iter().map(|e| e.tag.as_str()).collect();
    assert_eq!(tags, ["Elements", "Sightings"]);
    assert_eq!(unpacked.entries[1].bytes, b"sightings db");
}
