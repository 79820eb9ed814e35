use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Result};

use sightings::{
    AnnotationRenderer, BoundingBox, CancelToken, Detection, DetectionAdapter, DetectorBackend,
    EncoderKind, FileMedia, Frame, FrameObserver, FrameSink, FrameSource, MediaOpener,
    OutputSettings, Pipeline, PipelineState, SinkSettings, Stage, StubBackend,
};

#[derive(Default)]
struct Counters {
    source_opens: u32,
    source_closes: u32,
    sink_opens: u32,
    sink_closes: u32,
    frames_written: u64,
}

struct MockSource {
    remaining: u64,
    read: u64,
    fail_at: Option<u64>,
    counters: Rc<RefCell<Counters>>,
}

impl FrameSource for MockSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.read += 1;
        if self.fail_at == Some(self.read) {
            return Err(anyhow!("corrupt packet"));
        }
        self.remaining -= 1;
        Ok(Some(Frame::filled(32, 24, [10, 20, 30])?))
    }

    fn close(&mut self) -> Result<()> {
        self.counters.borrow_mut().source_closes += 1;
        Ok(())
    }
}

struct MockSink {
    file: Option<File>,
    written: u64,
    fail_at: Option<u64>,
    close_fails: bool,
    counters: Rc<RefCell<Counters>>,
}

impl FrameSink for MockSink {
    fn write(&mut self, _frame: &Frame) -> Result<()> {
        self.written += 1;
        if self.fail_at == Some(self.written) {
            return Err(anyhow!("disk full"));
        }
        let file = self.file.as_mut().ok_or_else(|| anyhow!("sink closed"))?;
        file.write_all(&[0u8])?;
        self.counters.borrow_mut().frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.counters.borrow_mut().sink_closes += 1;
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        if self.close_fails {
            return Err(anyhow!("trailer write failed"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct MockMedia {
    frames: u64,
    read_fail_at: Option<u64>,
    write_fail_at: Option<u64>,
    sink_open_fails: bool,
    sink_close_fails: bool,
    counters: Rc<RefCell<Counters>>,
}

impl MockMedia {
    fn with_frames(frames: u64) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }
}

impl MediaOpener for MockMedia {
    fn open_source(&mut self, _input: &str) -> Result<Box<dyn FrameSource>> {
        self.counters.borrow_mut().source_opens += 1;
        Ok(Box::new(MockSource {
            remaining: self.frames,
            read: 0,
            fail_at: self.read_fail_at,
            counters: Rc::clone(&self.counters),
        }))
    }

    fn open_sink(&mut self, path: &Path, _settings: &SinkSettings) -> Result<Box<dyn FrameSink>> {
        if self.sink_open_fails {
            return Err(anyhow!("no encoder for container"));
        }
        self.counters.borrow_mut().sink_opens += 1;
        Ok(Box::new(MockSink {
            file: Some(File::create(path)?),
            written: 0,
            fail_at: self.write_fail_at,
            close_fails: self.sink_close_fails,
            counters: Rc::clone(&self.counters),
        }))
    }
}

struct FailingBackend {
    fail_at: u64,
    calls: u64,
}

impl DetectorBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.calls == self.fail_at {
            return Err(anyhow!("inference crashed"));
        }
        Ok(Vec::new())
    }
}

/// Cancels the run once `at` frames have been written.
struct StopAfter {
    token: CancelToken,
    at: u64,
}

impl FrameObserver for StopAfter {
    fn on_frame(&mut self, index: u64, _frame: &Frame, _detections: &[Detection]) {
        if index == self.at {
            self.token.cancel();
        }
    }
}

fn sighting(label: &str) -> Vec<Detection> {
    vec![Detection::new(
        label,
        0.8,
        BoundingBox::new(2.0, 2.0, 12.0, 12.0),
    )]
}

fn small_renderer() -> AnnotationRenderer {
    AnnotationRenderer::new(64, 36)
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn dog_clip_is_named_after_the_dog() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia::with_frames(10);
    let mut script = vec![Vec::new(); 10];
    for frame in script.iter_mut().take(5).skip(1) {
        *frame = sighting("dog");
    }
    let mut backend = StubBackend::scripted(script);
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    let report = pipeline.run("uploads/dog.mp4", dir.path()).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(report.frames_processed, 10);
    assert!(!report.cancelled);
    assert_eq!(report.classes, vec!["dog".to_string()]);
    assert!(report.committed());
    assert_eq!(report.final_path, dir.path().join("dog-dog.mp4"));
    assert_eq!(file_names(dir.path()), vec!["dog-dog.mp4".to_string()]);
    assert_eq!(std::fs::metadata(&report.final_path).unwrap().len(), 10);

    drop(pipeline);
    let counters = media.counters.borrow();
    assert_eq!(counters.frames_written, 10);
    assert_eq!(counters.source_closes, 1);
    assert_eq!(counters.sink_closes, 1);
}

#[test]
fn clip_without_sightings_gets_the_no_detection_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia::with_frames(6);
    let mut backend = StubBackend::new();
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    let report = pipeline.run("empty.mov", dir.path()).unwrap();
    assert!(report.classes.is_empty());
    assert_eq!(
        file_names(dir.path()),
        vec!["no-animals-detected-empty.mov".to_string()]
    );
}

#[test]
fn classes_are_sorted_and_spaces_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia::with_frames(3);
    let mut backend =
        StubBackend::scripted(vec![sighting("cat"), sighting("Sea Bird"), sighting("cat")]);
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    let report = pipeline.run("cat_bird.avi", dir.path()).unwrap();
    assert_eq!(
        report.final_path,
        dir.path().join("Sea_Bird-cat-cat_bird.avi")
    );
    assert!(report.final_path.is_file());
    assert!(!report.provisional_path.exists());
}

#[test]
fn missing_input_fails_at_open_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let input = dir.path().join("missing.mp4");
    let mut media = FileMedia::default();
    let mut backend = StubBackend::new();
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    );

    let err = pipeline.run(&input.to_string_lossy(), &out).unwrap_err();
    assert_eq!(err.stage, Stage::Open);
    assert!(err.to_string().starts_with("OPEN_ERROR"));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(!out.exists());
}

#[test]
fn cancel_keeps_frames_processed_so_far() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia::with_frames(10);
    let mut script = vec![sighting("dog"), sighting("dog"), sighting("dog")];
    script.push(Vec::new());
    script.push(sighting("cat"));
    let mut backend = StubBackend::scripted(script);
    let token = CancelToken::new();
    let mut stop = StopAfter {
        token: token.clone(),
        at: 3,
    };
    let mut pipeline = Pipeline::new(&mut media, DetectionAdapter::new(&mut backend), token)
        .with_renderer(small_renderer())
        .with_observer(&mut stop);

    let report = pipeline.run("walk.mp4", dir.path()).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert!(report.cancelled);
    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.final_path, dir.path().join("dog-walk.mp4"));
    assert_eq!(std::fs::metadata(&report.final_path).unwrap().len(), 3);
    drop(pipeline);
    assert_eq!(backend.calls(), 3);

    let counters = media.counters.borrow();
    assert_eq!(counters.source_closes, 1);
    assert_eq!(counters.sink_closes, 1);
}

#[test]
fn detection_failure_keeps_provisional_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia::with_frames(5);
    let mut backend = FailingBackend {
        fail_at: 3,
        calls: 0,
    };
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    let err = pipeline.run("fox.mp4", dir.path()).unwrap_err();
    assert_eq!(err.stage, Stage::Detect);
    assert!(err.to_string().contains("frame 3"));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(file_names(dir.path()), vec!["fox_detecting.mp4".to_string()]);

    drop(pipeline);
    let counters = media.counters.borrow();
    assert_eq!(counters.frames_written, 2);
    assert_eq!(counters.source_closes, 1);
    assert_eq!(counters.sink_closes, 1);
}

#[test]
fn read_failure_is_reported_as_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia {
        frames: 5,
        read_fail_at: Some(2),
        ..MockMedia::default()
    };
    let mut backend = StubBackend::new();
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    let err = pipeline.run("owl.mp4", dir.path()).unwrap_err();
    assert_eq!(err.stage, Stage::Read);
    assert_eq!(file_names(dir.path()), vec!["owl_detecting.mp4".to_string()]);
    drop(pipeline);
    let counters = media.counters.borrow();
    assert_eq!(counters.source_closes, 1);
    assert_eq!(counters.sink_closes, 1);
}

#[test]
fn write_failure_is_reported_as_write_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia {
        frames: 5,
        write_fail_at: Some(2),
        ..MockMedia::default()
    };
    let mut backend = StubBackend::new();
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    let err = pipeline.run("elk.mov", dir.path()).unwrap_err();
    assert_eq!(err.stage, Stage::Write);
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(file_names(dir.path()), vec!["elk_detecting.mov".to_string()]);
}

#[test]
fn failed_finalize_blocks_the_rename() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia {
        frames: 3,
        sink_close_fails: true,
        ..MockMedia::default()
    };
    let mut backend = StubBackend::scripted(vec![sighting("dog")]);
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    let err = pipeline.run("dog.mp4", dir.path()).unwrap_err();
    assert_eq!(err.stage, Stage::Write);
    assert!(err.to_string().contains("dog_detecting.mp4"));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(file_names(dir.path()), vec!["dog_detecting.mp4".to_string()]);

    drop(pipeline);
    let counters = media.counters.borrow();
    assert_eq!(counters.frames_written, 3);
    assert_eq!(counters.source_closes, 1);
    assert_eq!(counters.sink_closes, 1);
}

#[test]
fn sink_open_failure_closes_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia {
        frames: 5,
        sink_open_fails: true,
        ..MockMedia::default()
    };
    let mut backend = StubBackend::new();
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    );

    let err = pipeline.run("deer.mp4", dir.path()).unwrap_err();
    assert_eq!(err.stage, Stage::Open);
    assert!(file_names(dir.path()).is_empty());
    drop(pipeline);
    let counters = media.counters.borrow();
    assert_eq!(counters.source_opens, 1);
    assert_eq!(counters.source_closes, 1);
    assert_eq!(counters.sink_opens, 0);
}

#[test]
fn stale_cancel_signal_refuses_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia::with_frames(5);
    let mut backend = StubBackend::new();
    let token = CancelToken::new();
    token.cancel();
    let mut pipeline = Pipeline::new(&mut media, DetectionAdapter::new(&mut backend), token.clone());

    let err = pipeline.run("bear.mp4", dir.path()).unwrap_err();
    assert_eq!(err.stage, Stage::Open);
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(token.is_cancelled());
    drop(pipeline);
    assert_eq!(media.counters.borrow().source_opens, 0);
}

#[test]
fn pipeline_runs_only_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = MockMedia::with_frames(2);
    let mut backend = StubBackend::new();
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    pipeline.run("one.mp4", dir.path()).unwrap();
    let err = pipeline.run("two.mp4", dir.path()).unwrap_err();
    assert_eq!(err.stage, Stage::Open);
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[test]
fn existing_destination_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let taken = dir.path().join("no-animals-detected-clip.mp4");
    std::fs::write(&taken, b"earlier run").unwrap();

    let mut media = MockMedia::with_frames(4);
    let mut backend = StubBackend::new();
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_renderer(small_renderer());

    let report = pipeline.run("clip.mp4", dir.path()).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);
    let rename_error = report.rename_error.as_ref().unwrap();
    assert_eq!(rename_error.stage, Stage::Rename);
    assert_eq!(report.output_path(), report.provisional_path.as_path());
    assert!(report.provisional_path.is_file());
    assert_eq!(std::fs::read(&taken).unwrap(), b"earlier run");
}

#[test]
fn synthetic_clip_round_trips_through_rawvideo() {
    let dir = tempfile::tempdir().unwrap();
    let mut media = FileMedia {
        synthetic_frames: 4,
    };
    let mut backend = StubBackend::new();
    let mut pipeline = Pipeline::new(
        &mut media,
        DetectionAdapter::new(&mut backend),
        CancelToken::new(),
    )
    .with_output(OutputSettings {
        fps: 30,
        encoder: EncoderKind::RawVideo,
    });

    let report = pipeline.run("stub://clip.mp4", dir.path()).unwrap();
    assert_eq!(report.frames_processed, 4);
    assert_eq!(
        report.final_path,
        dir.path().join("no-animals-detected-clip.mp4")
    );
    let len = std::fs::metadata(&report.final_path).unwrap().len();
    assert_eq!(len, 4 * 1280 * 720 * 3);
}
