//! PPE Sentinel
//!
//! Workplace-safety monitoring: detect people and protective equipment in a
//! video stream, decide which detections are violations, persist evidence,
//! and notify people.
//!
//! # Pipeline
//!
//! 1. **Source** (`ingest`): frames from a camera, a directory of images, a
//!    still image, or a synthetic `stub://` feed.
//! 2. **Detection** (`detect`): a `DetectorBackend` maps an image to labelled,
//!    scored boxes. The model itself is opaque.
//! 3. **Evaluation** (`evaluate`, `zone`): missing-equipment labels above the
//!    confidence threshold, and people whose box center is inside the
//!    restricted polygon.
//! 4. **Cooldown** (`cooldown`): one record per violation type per window
//!    (180 s by default).
//! 5. **Evidence** (`storage`, `annotate`): annotated snapshot plus a CSV row
//!    or JSON sidecar.
//! 6. **Alerts** (`alert`): sound, speech, WhatsApp, and email, each
//!    best-effort and independent of the others.
//!
//! `session` ties the steps together; `display` and `stream` render the
//! annotated feed and `display` carries the stop signal. `still` runs the same
//! steps once against a single image.

pub mod alert;
pub mod annotate;
pub mod config;
pub mod cooldown;
pub mod detect;
pub mod display;
pub mod evaluate;
pub mod frame;
pub mod ingest;
pub mod session;
pub mod still;
pub mod storage;
pub mod stream;
pub mod ui;
pub mod zone;

pub use alert::{Alert, AlertChannel, AlertDispatcher, DispatchReport, DispatchWorker};
pub use annotate::Annotator;
pub use config::SentinelConfig;
pub use cooldown::CooldownTracker;
pub use detect::{BoundingBox, Detection, DetectorBackend, ScriptedBackend};
pub use display::{FrameSink, NullSink, PreviewSink, SinkSet, StopSignal};
pub use evaluate::{Check, LabelRule, Violation, ViolationRules, ZoneRule};
pub use frame::Frame;
pub use ingest::{FrameSource, SourceStats};
pub use session::{run, FrameReport, MonitorSession, RunSummary, SessionStats};
pub use still::{check_image, StillCheck, StillOptions};
pub use storage::{
    CsvViolationLog, JsonSidecarLog, MemoryViolationLog, SnapshotWriter, ViolationLog,
    ViolationRecord,
};
pub use stream::{StreamHandle, StreamServer, StreamSink};
pub use zone::{Point, Zone};
