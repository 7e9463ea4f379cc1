//! End-to-end jobs over on-disk `.jsonl` datasets.

use std::path::Path;
use std::sync::{Arc, Mutex};

use geo_types::point;
use tempfile::TempDir;

use vecbatch_core::io::NativeDriver;
use vecbatch_core::{
    AttributeValue, DatasetReader, DatasetWriter, FieldSchema, FieldType, GeometryType, LayerSpec,
    Record, VectorDriver, CRS,
};
use vecbatch_jobs::{
    collect_inputs, collect_inputs_by_geometry, run_merge, run_split, CancellationToken,
    JobContext, JobError, JobEvent, JobReport, JobRunner, JobState, JobStatus, MergeJob,
    MergeParams, SplitJob, SplitParams,
};

fn write_layer(path: &Path, fields: Vec<FieldSchema>, rows: Vec<Vec<AttributeValue>>) {
    let spec = LayerSpec {
        name: vecbatch_core::io::layer_name_from_path(path),
        fields,
        geometry_type: GeometryType::Point,
        crs: Some(CRS::from_epsg(4326)),
        encoding: "UTF-8".to_string(),
    };
    let mut writer = NativeDriver.create(path, &spec).unwrap();
    for (i, attributes) in rows.into_iter().enumerate() {
        writer
            .append(Record::new(attributes).with_geometry(point!(x: i as f64, y: 1.0)))
            .unwrap();
    }
    writer.close().unwrap();
}

fn read_all(path: &Path) -> (Vec<FieldSchema>, Vec<Record>) {
    let mut reader = NativeDriver.open(path, "UTF-8").unwrap();
    let records = reader.records().unwrap().map(|r| r.unwrap()).collect();
    (reader.fields().to_vec(), records)
}

fn text(name: &str, len: usize) -> FieldSchema {
    FieldSchema::new(name, FieldType::String).with_length(len)
}

/// `a.jsonl`: name String(10) x3; `b.jsonl`: name String(20) + pop Integer x2
fn merge_inputs(dir: &Path) {
    write_layer(
        &dir.join("a.jsonl"),
        vec![text("name", 10)],
        ["Ely", "York", "Bath"]
            .iter()
            .map(|n| vec![AttributeValue::from(*n)])
            .collect(),
    );
    write_layer(
        &dir.join("b.jsonl"),
        vec![text("name", 20), FieldSchema::new("pop", FieldType::Integer)],
        vec![
            vec![AttributeValue::from("Leeds"), AttributeValue::Int(800)],
            vec![AttributeValue::from("Hull"), AttributeValue::Int(260)],
        ],
    );
}

#[test]
fn merge_fills_missing_fields_with_empty_string() {
    let dir = TempDir::new().unwrap();
    merge_inputs(dir.path());
    let output = dir.path().join("merged.jsonl");

    let params = MergeParams::new(
        dir.path(),
        vec!["a.jsonl".to_string(), "b.jsonl".to_string()],
        &output,
    );
    let mut runner = JobRunner::new();
    runner.start(MergeJob::new(NativeDriver, params)).unwrap();
    let events = runner.wait().unwrap();
    assert!(matches!(events.last(), Some(JobEvent::Finished(_))));
    assert_eq!(runner.state(), JobState::Completed);

    let (fields, records) = read_all(&output);
    assert_eq!(
        fields,
        vec![text("name", 20), FieldSchema::new("pop", FieldType::Integer)]
    );
    assert_eq!(records.len(), 5);
    let pops: Vec<AttributeValue> = records.iter().map(|r| r.attributes[1].clone()).collect();
    assert_eq!(
        pops,
        vec![
            AttributeValue::empty(),
            AttributeValue::empty(),
            AttributeValue::empty(),
            AttributeValue::Int(800),
            AttributeValue::Int(260),
        ]
    );
}

#[test]
fn merge_every_dataset_in_a_directory() {
    let dir = TempDir::new().unwrap();
    merge_inputs(dir.path());
    std::fs::write(dir.path().join("readme.txt"), "not a dataset").unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("all.jsonl");

    let names = collect_inputs(dir.path(), NativeDriver.file_extension()).unwrap();
    assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);

    let report = run_merge(
        &NativeDriver,
        &MergeParams::new(dir.path(), names, &output),
        &JobContext::detached(),
    )
    .unwrap();
    assert_eq!(report.records_written, 5);
    assert_eq!(read_all(&output).1.len(), 5);
}

fn empty_layer(path: &Path, geometry_type: GeometryType) {
    let spec = LayerSpec {
        name: vecbatch_core::io::layer_name_from_path(path),
        fields: vec![text("name", 10)],
        geometry_type,
        crs: None,
        encoding: "UTF-8".to_string(),
    };
    NativeDriver.create(path, &spec).unwrap().close().unwrap();
}

#[test]
fn directory_inputs_filtered_by_geometry_family() {
    let dir = TempDir::new().unwrap();
    empty_layer(&dir.path().join("a.jsonl"), GeometryType::Point);
    empty_layer(&dir.path().join("b.jsonl"), GeometryType::MultiPoint);
    empty_layer(&dir.path().join("c.jsonl"), GeometryType::Polygon);
    std::fs::write(dir.path().join("d.jsonl"), "not a dataset\n").unwrap();

    let points =
        collect_inputs_by_geometry(&NativeDriver, dir.path(), Some(GeometryType::Point), "UTF-8")
            .unwrap();
    assert_eq!(points, vec!["a.jsonl", "b.jsonl"]);

    let polygons = collect_inputs_by_geometry(
        &NativeDriver,
        dir.path(),
        Some(GeometryType::MultiPolygon),
        "UTF-8",
    )
    .unwrap();
    assert_eq!(polygons, vec!["c.jsonl"]);

    let all = collect_inputs_by_geometry(&NativeDriver, dir.path(), None, "UTF-8").unwrap();
    assert_eq!(all, vec!["a.jsonl", "b.jsonl", "c.jsonl", "d.jsonl"]);
}

#[test]
fn no_input_with_the_geometry_type_is_an_error() {
    let dir = TempDir::new().unwrap();
    empty_layer(&dir.path().join("a.jsonl"), GeometryType::Point);
    empty_layer(&dir.path().join("c.jsonl"), GeometryType::Polygon);

    let result = collect_inputs_by_geometry(
        &NativeDriver,
        dir.path(),
        Some(GeometryType::LineString),
        "UTF-8",
    );
    match result {
        Err(JobError::NoMatchingInputs { dir: d, geometry }) => {
            assert_eq!(d, dir.path());
            assert_eq!(geometry, GeometryType::LineString);
        }
        other => panic!("expected no matching inputs, got {:?}", other),
    }
}

#[test]
fn merge_output_has_every_input_field() {
    let dir = TempDir::new().unwrap();
    write_layer(
        &dir.path().join("a.jsonl"),
        vec![FieldSchema::new("id", FieldType::Integer), text("code", 4)],
        vec![vec![AttributeValue::Int(1), AttributeValue::from("x")]],
    );
    write_layer(
        &dir.path().join("b.jsonl"),
        vec![
            FieldSchema::new("code", FieldType::Integer),
            FieldSchema::new("area", FieldType::Real),
        ],
        vec![vec![AttributeValue::Int(7), AttributeValue::Float(2.5)]],
    );
    let output = dir.path().join("merged.jsonl");

    run_merge(
        &NativeDriver,
        &MergeParams::new(
            dir.path(),
            vec!["a.jsonl".to_string(), "b.jsonl".to_string()],
            &output,
        ),
        &JobContext::detached(),
    )
    .unwrap();

    let (fields, records) = read_all(&output);
    for input in ["a.jsonl", "b.jsonl"] {
        let reader = NativeDriver.open(&dir.path().join(input), "UTF-8").unwrap();
        for field in reader.fields() {
            assert!(fields.iter().any(|f| f.is_compatible(field)), "{} lost", field);
        }
    }
    assert_eq!(fields.len(), 4);
    assert_eq!(
        records[1].attributes,
        vec![
            AttributeValue::empty(),
            AttributeValue::empty(),
            AttributeValue::Int(7),
            AttributeValue::Float(2.5),
        ]
    );
}

#[test]
fn merge_stopped_after_a_file_keeps_what_was_written() {
    let dir = TempDir::new().unwrap();
    merge_inputs(dir.path());
    write_layer(
        &dir.path().join("c.jsonl"),
        vec![text("name", 10)],
        vec![vec![AttributeValue::from("Ripon")]],
    );
    let output = dir.path().join("merged.jsonl");

    let token = CancellationToken::new();
    let trigger = token.clone();
    let ctx = JobContext::with_callback(token, move |event| {
        if event == JobEvent::FileCompleted("b.jsonl".to_string()) {
            trigger.cancel();
        }
    });
    let params = MergeParams::new(
        dir.path(),
        ["a.jsonl", "b.jsonl", "c.jsonl"].map(String::from).to_vec(),
        &output,
    );
    let report = run_merge(&NativeDriver, &params, &ctx).unwrap();

    assert_eq!(report.status, JobStatus::Interrupted);
    assert_eq!(report.files_written, vec!["a.jsonl", "b.jsonl"]);
    assert_eq!(read_all(&output).1.len(), 5);
}

fn split_input(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("layer.jsonl");
    let regions = ["N", "S", "N", "E", "S", "N", "E", "E", "N", "S"];
    write_layer(
        &path,
        vec![FieldSchema::new("id", FieldType::Integer), text("region", 2)],
        regions
            .iter()
            .enumerate()
            .map(|(i, r)| vec![AttributeValue::Int(i as i64), AttributeValue::from(*r)])
            .collect(),
    );
    path
}

#[test]
fn split_writes_one_dataset_per_value() {
    let dir = TempDir::new().unwrap();
    let input = split_input(dir.path());
    let out_dir = TempDir::new().unwrap();

    let mut runner = JobRunner::new();
    runner
        .start(SplitJob::new(
            NativeDriver,
            &input,
            SplitParams::new("region", out_dir.path()),
        ))
        .unwrap();
    let events = runner.wait().unwrap();
    let report = match events.last() {
        Some(JobEvent::Finished(JobReport::Split(report))) => report.clone(),
        other => panic!("unexpected last event: {:?}", other),
    };
    assert!(report.is_clean());
    assert_eq!(report.groups, 3);

    let mut total = 0;
    for (value, expected) in [("N", 4), ("S", 3), ("E", 3)] {
        let path = out_dir.path().join(format!("layer_region_{}.jsonl", value));
        let (fields, records) = read_all(&path);
        assert_eq!(fields.len(), 2);
        assert_eq!(records.len(), expected);
        assert!(records
            .iter()
            .all(|r| r.attributes[1] == AttributeValue::from(value)));
        total += records.len();
    }
    assert_eq!(total, 10);
}

#[test]
fn split_ticks_once_per_group() {
    let dir = TempDir::new().unwrap();
    let input = split_input(dir.path());
    let out_dir = TempDir::new().unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let ctx = JobContext::with_callback(CancellationToken::new(), move |e| {
        sink.lock().unwrap().push(e)
    });
    let mut source = NativeDriver.open(&input, "UTF-8").unwrap();
    run_split(
        &NativeDriver,
        &mut source,
        &SplitParams::new("region", out_dir.path()),
        &ctx,
    )
    .unwrap();

    let events = events.lock().unwrap();
    assert!(events.contains(&JobEvent::RangeChanged(3)));
    let ticks = events.iter().filter(|e| **e == JobEvent::UnitProcessed).count();
    assert_eq!(ticks, 3);
}
