use ctxbuild::container::{read_cabinet, ContainerFormat, CAB_MAGIC};
use ctxbuild::error::ExitCode;
use ctxbuild::pipeline::{OutputTarget, Pipeline, PipelineOptions};
use std::fs;
use tempfile::tempdir;

const DESCRIPTOR: &str = r#"<Session id="Transect">
  <Entry order="1" type="Elements" file="Transect.txt"/>
  <Entry order="2" type="Sightings" file="Transect.dat"/>
  <Entry order="3" type="Photo" file="Transect_photo.dat" name="Photo.dat"/>
</Session>"#;

fn cabinet_options() -> PipelineOptions {
    PipelineOptions {
        format: ContainerFormat::Cabinet,
        ..PipelineOptions::default()
    }
}

#[test]
fn test_cabinet_output_lists_descriptor_and_entries() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("Transect.xml"), DESCRIPTOR).unwrap();
    fs::write(dir.path().join("Transect.txt"), b"Elements\r\n").unwrap();
    // Spans several 32 KiB data blocks.
    let sightings: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(dir.path().join("Transect.dat"), &sightings).unwrap();
    fs::write(dir.path().join("Transect_photo.dat"), b"\xff\xd8jpeg").unwrap();

    let report = Pipeline::new(cabinet_options())
        .build(dir.path(), &OutputTarget::Directory(dir.path().join("out")))
        .unwrap();
    assert_eq!(report.exit_code(), ExitCode::Success);

    let bytes = fs::read(dir.path().join("out/Transect.ctx")).unwrap();
    assert_eq!(&bytes[..4], &CAB_MAGIC);
    let declared = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    assert_eq!(declared as usize, bytes.len());

    let members = read_cabinet(&bytes).unwrap();
    let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["Info.xml", "Elements.txt", "Sightings.DAT", "Photo.dat"]);
    assert_eq!(members[0].bytes, DESCRIPTOR.as_bytes());
    assert_eq!(members[1].bytes, b"Elements\r\n");
    assert_eq!(members[2].bytes, sightings);
    assert_eq!(members[3].bytes, b"\xff\xd8jpeg");
}

#[test]
fn test_cabinet_rebuild_is_byte_identical() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("Transect.xml"), DESCRIPTOR).unwrap();
    fs::write(input.join("Transect.txt"), b"e").unwrap();
    fs::write(input.join("Transect.dat"), b"s").unwrap();
    fs::write(input.join("Transect_photo.dat"), b"p").unwrap();

    let a = dir.path().join("a.ctx");
    let b = dir.path().join("b.ctx");
    for out in [&a, &b] {
        Pipeline::new(cabinet_options())
            .build(&input, &OutputTarget::File(out.clone()))
            .unwrap();
    }
    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
}
