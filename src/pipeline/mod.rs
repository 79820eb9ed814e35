//! Video detection pipeline.
//!
//! One `Pipeline` drives one run through a fixed lifecycle:
//!
//! ```text
//! Idle -> Opening -> Streaming -> Finalizing -> Done
//!            \           \
//!             +-----------+--> Failed
//! ```
//!
//! Frames are pulled from the source, detected, rendered at the output
//! resolution, written to the sink, and recorded in the aggregator, strictly
//! in source order. The cancel token is polled once before each frame. Output
//! is written under a provisional name and renamed exactly once, after the
//! sink has been closed, to a name derived from the classes seen.
//!
//! The source and sink are closed exactly once on every path out of
//! `Streaming`. On failure the provisional file is left in place for
//! inspection and never renamed.

mod error;
mod media;

use std::path::{Path, PathBuf};

use anyhow::anyhow;

pub use error::{PipelineError, Stage};
pub use media::{FileMedia, MediaOpener};

use crate::cancel::CancelToken;
use crate::detect::{Detection, DetectionAdapter};
use crate::frame::Frame;
use crate::ingest::{FrameSource, STUB_SCHEME};
use crate::media::{Codec, MediaKind};
use crate::naming::{provisional_filename, DetectionAggregator};
use crate::render::AnnotationRenderer;
use crate::sink::{EncoderKind, FrameSink, SinkSettings};

pub const DEFAULT_OUTPUT_FPS: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opening,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

/// Notified after each frame is written. Used for previews and progress.
pub trait FrameObserver {
    fn on_frame(&mut self, index: u64, frame: &Frame, detections: &[Detection]);
}

/// Encoding parameters that do not depend on the input.
#[derive(Clone, Copy, Debug)]
pub struct OutputSettings {
    pub fps: u32,
    pub encoder: EncoderKind,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_OUTPUT_FPS,
            encoder: EncoderKind::default(),
        }
    }
}

/// Outcome of a run that reached `Done`.
#[derive(Debug)]
pub struct RunReport {
    pub input: String,
    pub frames_processed: u64,
    /// The run stopped early because the cancel token was set.
    pub cancelled: bool,
    /// Normalized classes seen, sorted.
    pub classes: Vec<String>,
    pub provisional_path: PathBuf,
    /// Name the output was (or would have been) renamed to.
    pub final_path: PathBuf,
    /// Set when the stream finished but the rename did not. The video is
    /// complete under `provisional_path`.
    pub rename_error: Option<PipelineError>,
}

impl RunReport {
    pub fn committed(&self) -> bool {
        self.rename_error.is_none()
    }

    /// Where the finished video actually is.
    pub fn output_path(&self) -> &Path {
        if self.committed() {
            &self.final_path
        } else {
            &self.provisional_path
        }
    }
}

/// Basename, extension, and paths derived from the input name.
struct OutputPlan {
    basename: String,
    extension: &'static str,
    codec: Codec,
    provisional_path: PathBuf,
}

impl OutputPlan {
    fn for_input(input: &str, output_dir: &Path) -> anyhow::Result<Self> {
        let local = input.strip_prefix(STUB_SCHEME).unwrap_or(input);
        let path = Path::new(local);
        let container = match MediaKind::from_path(path) {
            MediaKind::Video(container) => container,
            MediaKind::Image => {
                return Err(anyhow!(
                    "'{}' is an image; use the single-image annotation path",
                    input
                ))
            }
            MediaKind::Unsupported => {
                return Err(anyhow!(
                    "'{}' is not a supported video (expected avi, mov, or mp4)",
                    input
                ))
            }
        };
        let basename = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| anyhow!("cannot derive a basename from '{}'", input))?
            .to_string();
        let extension = container.extension();
        let provisional_path = output_dir.join(provisional_filename(&basename, extension));
        Ok(Self {
            basename,
            extension,
            codec: Codec::for_extension(extension),
            provisional_path,
        })
    }
}

struct StreamEnd {
    frames: u64,
    cancelled: bool,
}

/// Controller for a single video run.
pub struct Pipeline<'a> {
    media: &'a mut dyn MediaOpener,
    detector: DetectionAdapter<'a>,
    renderer: AnnotationRenderer,
    output: OutputSettings,
    cancel: CancelToken,
    observer: Option<&'a mut dyn FrameObserver>,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        media: &'a mut dyn MediaOpener,
        detector: DetectionAdapter<'a>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            media,
            detector,
            renderer: AnnotationRenderer::default(),
            output: OutputSettings::default(),
            cancel,
            observer: None,
            state: PipelineState::Idle,
        }
    }

    pub fn with_renderer(mut self, renderer: AnnotationRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_output(mut self, output: OutputSettings) -> Self {
        self.output = output;
        self
    }

    pub fn with_observer(mut self, observer: &'a mut dyn FrameObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Process `input` into `output_dir`.
    ///
    /// Returns a report once the run is `Done`, including runs that were
    /// cancelled or whose final rename failed. Any other failure leaves the
    /// pipeline `Failed` and is returned as an error.
    pub fn run(&mut self, input: &str, output_dir: &Path) -> Result<RunReport, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::new(
                Stage::Open,
                anyhow!("pipeline already ran (state {:?}); create a new one", self.state),
            ));
        }
        self.transition(PipelineState::Opening);

        if self.cancel.is_cancelled() {
            return Err(self.fail(
                Stage::Open,
                anyhow!("cancellation signal is still set; reset it before starting a new run"),
            ));
        }

        let plan = match OutputPlan::for_input(input, output_dir) {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(Stage::Open, e)),
        };

        let mut source = match self.media.open_source(input) {
            Ok(source) => source,
            Err(e) => return Err(self.fail(Stage::Open, e.context(format!("open source {}", input)))),
        };
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            close_source(source.as_mut());
            return Err(self.fail(
                Stage::Open,
                anyhow!("create output directory {}: {}", output_dir.display(), e),
            ));
        }

        let (width, height) = self.renderer.output_size();
        let settings = SinkSettings {
            codec: plan.codec,
            fps: self.output.fps,
            width,
            height,
            encoder: self.output.encoder,
        };
        let preexisting = plan.provisional_path.exists();
        let mut sink = match self.media.open_sink(&plan.provisional_path, &settings) {
            Ok(sink) => sink,
            Err(e) => {
                close_source(source.as_mut());
                if !preexisting {
                    remove_partial(&plan.provisional_path);
                }
                return Err(self.fail(
                    Stage::Open,
                    e.context(format!("open sink {}", plan.provisional_path.display())),
                ));
            }
        };

        log::info!(
            "run started: {} -> {} ({}, {}x{} @ {} fps)",
            input,
            plan.provisional_path.display(),
            plan.codec.fourcc_str(),
            width,
            height,
            self.output.fps
        );
        self.transition(PipelineState::Streaming);

        let mut aggregator = DetectionAggregator::new();
        let streamed = self.stream(source.as_mut(), sink.as_mut(), &mut aggregator);
        let end = match streamed {
            Ok(end) => end,
            Err(err) => {
                close_source(source.as_mut());
                if let Err(e) = sink.close() {
                    log::warn!("closing sink after failure: {:#}", e);
                }
                log::error!(
                    "run failed; partial output kept at {}",
                    plan.provisional_path.display()
                );
                self.transition(PipelineState::Failed);
                return Err(err);
            }
        };

        self.transition(PipelineState::Finalizing);
        close_source(source.as_mut());
        if let Err(e) = sink.close() {
            return Err(self.fail(
                Stage::Write,
                e.context(format!("finalize {}", plan.provisional_path.display())),
            ));
        }

        let final_name = aggregator.final_filename(&plan.basename, plan.extension);
        let final_path = output_dir.join(&final_name);
        let rename_error = commit(&plan.provisional_path, &final_path).err();
        match &rename_error {
            None => log::info!(
                "run done: {} frames, output {}",
                end.frames,
                final_path.display()
            ),
            Some(err) => log::warn!(
                "run done but not renamed ({}); output kept at {}",
                err,
                plan.provisional_path.display()
            ),
        }
        self.transition(PipelineState::Done);

        Ok(RunReport {
            input: input.to_string(),
            frames_processed: end.frames,
            cancelled: end.cancelled,
            classes: aggregator.classes(),
            provisional_path: plan.provisional_path,
            final_path,
            rename_error,
        })
    }

    fn stream(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        aggregator: &mut DetectionAggregator,
    ) -> Result<StreamEnd, PipelineError> {
        let mut frames = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                log::info!("stop requested after {} frames; finalizing", frames);
                return Ok(StreamEnd {
                    frames,
                    cancelled: true,
                });
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    return Ok(StreamEnd {
                        frames,
                        cancelled: false,
                    })
                }
                Err(e) => {
                    return Err(PipelineError::new(
                        Stage::Read,
                        e.context(format!("read frame {}", frames + 1)),
                    ))
                }
            };

            let detections = self.detector.detect(&frame).map_err(|e| {
                PipelineError::new(
                    Stage::Detect,
                    e.context(format!(
                        "{} backend on frame {}",
                        self.detector.backend_name(),
                        frames + 1
                    )),
                )
            })?;
            let annotated = self
                .renderer
                .render(frame, &detections)
                .map_err(|e| PipelineError::new(Stage::Render, e))?;
            sink.write(&annotated).map_err(|e| {
                PipelineError::new(Stage::Write, e.context(format!("write frame {}", frames + 1)))
            })?;
            aggregator.record(&detections);
            frames += 1;

            if let Some(observer) = self.observer.as_mut() {
                observer.on_frame(frames, &annotated, &detections);
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, cause: anyhow::Error) -> PipelineError {
        let err = PipelineError::new(stage, cause);
        log::error!("run failed: {}", err);
        self.transition(PipelineState::Failed);
        err
    }
}

fn close_source(source: &mut dyn FrameSource) {
    if let Err(e) = source.close() {
        log::warn!("closing source: {:#}", e);
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("could not remove partial output {}: {}", path.display(), e);
        }
    }
}

/// Move the finished output to its final name. Refuses to overwrite.
fn commit(provisional: &Path, final_path: &Path) -> Result<(), PipelineError> {
    if !provisional.is_file() {
        return Err(PipelineError::new(
            Stage::Rename,
            anyhow!("provisional output {} is missing", provisional.display()),
        ));
    }
    if final_path.exists() {
        return Err(PipelineError::new(
            Stage::Rename,
            anyhow!("destination {} already exists", final_path.display()),
        ));
    }
    std::fs::rename(provisional, final_path).map_err(|e| {
        PipelineError::new(
            Stage::Rename,
            anyhow!(
                "rename {} -> {}: {}",
                provisional.display(),
                final_path.display(),
                e
            ),
        )
    })
}
