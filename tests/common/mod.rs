//! Shared fixtures: two incompatible versions of a columnar driver that
//! register the same class names, and a recording output driver.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;

use isolated::library::{ArtifactManifest, MANIFEST_ENTRY};
use isolated::{
    Configuration, Datum, DriverCatalog, DriverDefinition, DriverError, InputFormat, InputSplit,
    Instance, IsolationSettings, JobContext, Library, LibraryManager, Location, OutputCommitter,
    OutputFormat, RecordReader, RecordWriter, Snapshot, SnapshotKeys, Spec, TaskAttemptContext,
    current_environment, downcast_split,
};

pub const INPUT_FORMAT: &str = "com.acme.ColumnarInputFormat";
pub const SPLIT: &str = "com.acme.ColumnarSplit";
pub const OUTPUT_FORMAT: &str = "com.acme.RecordingOutputFormat";

/// Library id of the thread's current environment, `"root"` outside any
/// library.
fn current_library() -> String {
    current_environment()
        .and_then(|env| env.library().map(|library| library.id().to_string()))
        .unwrap_or_else(|| "root".to_string())
}

fn read_u64(input: &mut dyn Read) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn read_string(input: &mut dyn Read) -> std::io::Result<String> {
    let len = read_u64(input)?;
    let mut bytes = vec![0u8; len as usize];
    input.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn write_string(out: &mut dyn Write, value: &str) -> std::io::Result<()> {
    out.write_all(&(value.len() as u64).to_be_bytes())?;
    out.write_all(value.as_bytes())
}

/// Rows served by one reader, tagged with the driver version.
struct RowReader {
    version: u32,
    path: String,
    rows: u64,
    schema: Option<String>,
    current: Option<u64>,
}

impl RowReader {
    fn new(version: u32, path: &str, rows: u64) -> Self {
        Self {
            version,
            path: path.to_string(),
            rows,
            schema: None,
            current: None,
        }
    }
}

impl RecordReader for RowReader {
    fn initialize(&mut self, _split: &dyn InputSplit, task: &mut TaskAttemptContext) -> Result<(), DriverError> {
        let schema = task.configuration().get("columnar.schema").ok_or_else(|| {
            DriverError::InvalidConfiguration("columnar.schema was not discovered".to_string())
        })?;
        self.schema = Some(schema.to_string());
        task.configuration_mut()
            .set("columnar.initialized", current_library());
        Ok(())
    }

    fn next_key_value(&mut self) -> Result<bool, DriverError> {
        if self.schema.is_none() {
            return Err(DriverError::Failed("reader not initialized".to_string()));
        }
        let next = self.current.map_or(0, |row| row + 1);
        if next >= self.rows {
            return Ok(false);
        }
        self.current = Some(next);
        Ok(true)
    }

    fn current_key(&self) -> Result<Datum, DriverError> {
        Ok(json!(self.current))
    }

    fn current_value(&self) -> Result<Datum, DriverError> {
        Ok(json!({ "version": self.version, "path": self.path }))
    }

    fn progress(&self) -> Result<f32, DriverError> {
        Ok(self.current.map_or(0.0, |row| (row + 1) as f32 / self.rows as f32))
    }
}

pub mod v1 {
    use super::*;

    /// Version 1 splits carry a path and a row count.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct ColumnarSplit {
        pub path: String,
        pub rows: u64,
    }

    impl InputSplit for ColumnarSplit {
        fn class_name(&self) -> &str {
            SPLIT
        }

        fn length(&self) -> u64 {
            self.rows
        }

        fn write(&self, out: &mut dyn Write) -> std::io::Result<()> {
            write_string(out, &self.path)?;
            out.write_all(&self.rows.to_be_bytes())
        }

        fn read_fields(&mut self, input: &mut dyn Read) -> std::io::Result<()> {
            self.path = read_string(input)?;
            self.rows = read_u64(input)?;
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    pub struct ColumnarInputFormat;

    impl InputFormat for ColumnarInputFormat {
        fn get_splits(&self, job: &mut JobContext) -> Result<Vec<Box<dyn InputSplit>>, DriverError> {
            let conf = job.configuration_mut();
            let path = conf
                .get("path")
                .ok_or_else(|| DriverError::InvalidConfiguration("path is not set".to_string()))?
                .to_string();
            conf.set("columnar.schema", "v1:id:int64");
            conf.set("columnar.enumerated", current_library());

            Ok((0..2)
                .map(|i| {
                    Box::new(ColumnarSplit {
                        path: format!("{}/part-{}", path, i),
                        rows: 3,
                    }) as Box<dyn InputSplit>
                })
                .collect())
        }

        fn create_record_reader(
            &self,
            split: &dyn InputSplit,
            _task: &mut TaskAttemptContext,
        ) -> Result<Box<dyn RecordReader>, DriverError> {
            let split = downcast_split::<ColumnarSplit>(split, SPLIT)?;
            Ok(Box::new(RowReader::new(1, &split.path, split.rows)))
        }
    }

    pub fn register(catalog: &DriverCatalog) {
        catalog.register_bundled("columnar-1::input-format", |_conf: &Configuration| -> Result<Instance, DriverError> {
            Ok(Instance::InputFormat(Box::new(ColumnarInputFormat)))
        });
        catalog.register_bundled("columnar-1::split", |_conf: &Configuration| -> Result<Instance, DriverError> {
            Ok(Instance::Split(Box::new(ColumnarSplit::default())))
        });
    }
}

pub mod v2 {
    use super::*;

    /// Version 2 splits add a block offset and a different field order.
    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct ColumnarSplit {
        pub offset: u64,
        pub rows: u64,
        pub path: String,
    }

    impl InputSplit for ColumnarSplit {
        fn class_name(&self) -> &str {
            SPLIT
        }

        fn length(&self) -> u64 {
            self.rows
        }

        fn locations(&self) -> Vec<String> {
            vec![format!("block-{}", self.offset)]
        }

        fn write(&self, out: &mut dyn Write) -> std::io::Result<()> {
            out.write_all(&self.offset.to_be_bytes())?;
            out.write_all(&self.rows.to_be_bytes())?;
            write_string(out, &self.path)
        }

        fn read_fields(&mut self, input: &mut dyn Read) -> std::io::Result<()> {
            self.offset = read_u64(input)?;
            self.rows = read_u64(input)?;
            self.path = read_string(input)?;
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    pub struct ColumnarInputFormat;

    impl InputFormat for ColumnarInputFormat {
        fn get_splits(&self, job: &mut JobContext) -> Result<Vec<Box<dyn InputSplit>>, DriverError> {
            let conf = job.configuration_mut();
            let path = conf
                .get("path")
                .ok_or_else(|| DriverError::InvalidConfiguration("path is not set".to_string()))?
                .to_string();
            conf.set("columnar.schema", "v2:id:int64,ts:timestamp");
            conf.set("columnar.enumerated", current_library());

            let split: Box<dyn InputSplit> = Box::new(ColumnarSplit {
                offset: 4096,
                rows: 2,
                path,
            });
            Ok(vec![split])
        }

        fn create_record_reader(
            &self,
            split: &dyn InputSplit,
            _task: &mut TaskAttemptContext,
        ) -> Result<Box<dyn RecordReader>, DriverError> {
            let split = downcast_split::<ColumnarSplit>(split, SPLIT)?;
            Ok(Box::new(RowReader::new(2, &split.path, split.rows)))
        }
    }

    pub fn register(catalog: &DriverCatalog) {
        catalog.register_bundled("columnar-2::input-format", |_conf: &Configuration| -> Result<Instance, DriverError> {
            Ok(Instance::InputFormat(Box::new(ColumnarInputFormat)))
        });
        catalog.register_bundled("columnar-2::split", |_conf: &Configuration| -> Result<Instance, DriverError> {
            Ok(Instance::Split(Box::new(ColumnarSplit::default())))
        });
    }
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

fn record(events: &EventLog, event: String) {
    events.lock().unwrap().push(event);
}

/// Output driver that logs every call with the library it ran in.
pub struct RecordingOutputFormat {
    events: EventLog,
}

impl OutputFormat for RecordingOutputFormat {
    fn check_output_specs(&self, job: &mut JobContext) -> Result<(), DriverError> {
        if job.configuration().get("target").is_none() {
            return Err(DriverError::InvalidConfiguration("target is not set".to_string()));
        }
        record(&self.events, format!("check@{}", current_library()));
        Ok(())
    }

    fn get_record_writer(&self, _task: &mut TaskAttemptContext) -> Result<Box<dyn RecordWriter>, DriverError> {
        record(&self.events, format!("writer@{}", current_library()));
        Ok(Box::new(RecordingWriter {
            events: Arc::clone(&self.events),
        }))
    }

    fn get_output_committer(
        &self,
        _task: &mut TaskAttemptContext,
    ) -> Result<Box<dyn OutputCommitter>, DriverError> {
        Ok(Box::new(RecordingCommitter {
            events: Arc::clone(&self.events),
        }))
    }
}

struct RecordingWriter {
    events: EventLog,
}

impl RecordWriter for RecordingWriter {
    fn write(&mut self, key: &Datum, value: &Datum) -> Result<(), DriverError> {
        record(&self.events, format!("write {} {}", key, value));
        Ok(())
    }
}

struct RecordingCommitter {
    events: EventLog,
}

impl OutputCommitter for RecordingCommitter {
    fn setup_job(&mut self, job: &mut JobContext) -> Result<(), DriverError> {
        job.configuration_mut().set("sink.staging", "/tmp/_staging");
        record(&self.events, format!("setup_job@{}", current_library()));
        Ok(())
    }

    fn setup_task(&mut self, task: &mut TaskAttemptContext) -> Result<(), DriverError> {
        record(&self.events, format!("setup_task {}@{}", task.attempt_id(), current_library()));
        Ok(())
    }

    fn needs_task_commit(&mut self, task: &mut TaskAttemptContext) -> Result<bool, DriverError> {
        Ok(task.attempt_id().attempt == 0)
    }

    fn commit_task(&mut self, task: &mut TaskAttemptContext) -> Result<(), DriverError> {
        let staging = task.configuration().get("sink.staging").unwrap_or("<missing>");
        record(&self.events, format!("commit_task {} {}@{}", task.attempt_id(), staging, current_library()));
        Ok(())
    }

    fn abort_task(&mut self, task: &mut TaskAttemptContext) -> Result<(), DriverError> {
        record(&self.events, format!("abort_task {}@{}", task.attempt_id(), current_library()));
        Ok(())
    }
}

pub fn register_sink(catalog: &DriverCatalog, events: &EventLog) {
    let events = Arc::clone(events);
    catalog.register_bundled("sink::output-format", move |_conf: &Configuration| -> Result<Instance, DriverError> {
        Ok(Instance::OutputFormat(Box::new(RecordingOutputFormat {
            events: Arc::clone(&events),
        })))
    });
}

/// Write a bundle binding `classes` (class name to catalog symbol).
pub fn bundle(dir: &Path, name: &str, classes: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let manifest = ArtifactManifest {
        classes: classes
            .iter()
            .map(|(class, symbol)| (class.to_string(), symbol.to_string()))
            .collect::<BTreeMap<_, _>>(),
    };
    writer.start_file(MANIFEST_ENTRY, options).unwrap();
    writer.write_all(&serde_json::to_vec(&manifest).unwrap()).unwrap();
    writer.finish().unwrap();
    path
}

/// Bundles on disk, a catalog with both columnar versions and the sink, and
/// a library manager over that catalog.
pub struct Fixture {
    pub dir: TempDir,
    pub catalog: Arc<DriverCatalog>,
    pub libraries: Arc<LibraryManager>,
    pub events: EventLog,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(DriverCatalog::new());
        let events = EventLog::default();
        v1::register(&catalog);
        v2::register(&catalog);
        register_sink(&catalog, &events);

        bundle(
            dir.path(),
            "columnar-1.zip",
            &[(INPUT_FORMAT, "columnar-1::input-format"), (SPLIT, "columnar-1::split")],
        );
        bundle(
            dir.path(),
            "columnar-2.zip",
            &[(INPUT_FORMAT, "columnar-2::input-format"), (SPLIT, "columnar-2::split")],
        );
        bundle(dir.path(), "sink.zip", &[(OUTPUT_FORMAT, "sink::output-format")]);

        let libraries = Arc::new(LibraryManager::new(
            IsolationSettings::default(),
            Arc::clone(&catalog),
        ));
        Self {
            dir,
            catalog,
            libraries,
            events,
        }
    }

    pub fn artifact(&self, name: &str) -> Location {
        Location::from(self.dir.path().join(name))
    }

    /// Specs `events` (columnar v1), `clicks` (columnar v2) and `out` (sink).
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            libraries: vec![
                Library::new("columnar1", [self.artifact("columnar-1.zip")]).unwrap(),
                Library::new("columnar2", [self.artifact("columnar-2.zip")]).unwrap(),
                Library::new("sink", [self.artifact("sink.zip")]).unwrap(),
            ],
            drivers: vec![
                DriverDefinition::new("col1", Some("columnar1"), INPUT_FORMAT)
                    .unwrap()
                    .with_default("mode", "fast"),
                DriverDefinition::new("col2", Some("columnar2"), INPUT_FORMAT).unwrap(),
                DriverDefinition::new("sink", Some("sink"), OUTPUT_FORMAT).unwrap(),
            ],
            specs: vec![
                Spec::new("events", "col1").unwrap().with_conf("path", "/data/events"),
                Spec::new("clicks", "col2").unwrap().with_conf("path", "/data/clicks"),
                Spec::new("out", "sink").unwrap().with_conf("target", "/data/out"),
            ],
            input_specs: vec!["events".to_string(), "clicks".to_string()],
            output_spec: Some("out".to_string()),
        }
    }

    /// Host job configuration carrying the snapshot.
    pub fn job_configuration(&self) -> Configuration {
        let mut conf = Configuration::from_iter([("fs.default", "file:///")]);
        SnapshotKeys::default().write(&self.snapshot(), &mut conf);
        conf
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}
