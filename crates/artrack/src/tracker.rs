//! The tracking session: one camera, one pattern set, one frame at a time.

use artrack_core::{Camera, CameraModel, Frame, GrayImage, GrayImageView, Pose};
use artrack_pattern::{
    IdDictionary, IdMatcher, InteriorSampler, PattFile, PatternError, TemplateMatcher,
    TemplatePattern,
};
use artrack_pose::{
    estimate_pose, marker_corners, HullMode, PoseEstimator, Rig, RigEntry, RigObservation,
    RigTracker,
};
use artrack_square::{MarkerCandidate, SquareDetector, ThresholdMap};
use nalgebra::{Point2, Vector3};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::{MarkerMode, TrackerConfig};
use crate::error::TrackerError;
use crate::history::TrackingHistory;
use crate::registry::PatternRegistry;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One identified marker with its pose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TrackedMarker {
    pub id: u32,
    /// Quarter turns of the pattern on screen, `0..=3`.
    pub direction: u8,
    pub confidence: f64,
    /// Matched the black/white-swapped template (template mode with
    /// `allow_inverted` only).
    pub inverted: bool,
    /// Ideal corners in canonical order (pattern TL, TR, BR, BL).
    pub corners: [Point2<f64>; 4],
    /// The same corners in observed (distorted) pixels.
    pub observed: [Point2<f64>; 4],
    /// Camera-from-marker transform, marker centred at the origin.
    pub pose: Pose,
    /// Mean squared reprojection error, px².
    pub fit_error: f64,
    /// Side length the pose was solved with.
    pub width: f64,
}

impl TrackedMarker {
    /// Column-major model-view matrix.
    pub fn gl_matrix(&self) -> [f64; 16] {
        self.pose.to_gl_matrix()
    }
}

/// Fused pose of a registered rig.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RigPose {
    /// Handle returned by [`Tracker::add_rig`].
    pub rig: usize,
    pub pose: Pose,
    pub error: f64,
    /// Rig markers visible in this frame.
    pub markers: usize,
}

/// Output of one [`Tracker::track`] call.
///
/// Owned by the tracker and overwritten by the next call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TrackingResult {
    pub markers: Vec<TrackedMarker>,
    pub rigs: Vec<RigPose>,
    /// Threshold of the attempt that produced `markers`.
    pub threshold: u8,
    /// Threshold attempts made this frame.
    pub attempts: u32,
    /// Square candidates found by the last attempt.
    pub candidates: usize,
}

impl TrackingResult {
    fn clear(&mut self) {
        self.markers.clear();
        self.rigs.clear();
        self.attempts = 0;
        self.candidates = 0;
    }

    pub fn marker(&self, id: u32) -> Option<&TrackedMarker> {
        self.markers.iter().find(|m| m.id == id)
    }

    pub fn rig(&self, rig: usize) -> Option<&RigPose> {
        self.rigs.iter().find(|r| r.rig == rig)
    }

    /// Most confident marker of the frame.
    pub fn best(&self) -> Option<&TrackedMarker> {
        self.markers
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct Identified {
    id: u32,
    direction: u8,
    confidence: f64,
    inverted: bool,
}

#[derive(Debug)]
enum Matcher {
    Template(TemplateMatcher),
    Id(IdMatcher),
}

/// Interior sampler plus the matcher of the session's marker mode.
#[derive(Debug)]
struct Identifier {
    sampler: InteriorSampler,
    matcher: Matcher,
}

impl Identifier {
    fn new(config: &TrackerConfig) -> Self {
        let cells = config.capacity().pattern_size;
        let sampler = InteriorSampler::new(cells, config.template.sample_resolution);
        let matcher = match config.marker_mode {
            MarkerMode::Template => Matcher::Template(TemplateMatcher::new(
                cells,
                config.template.matching.clone(),
            )),
            MarkerMode::Id => Matcher::Id(IdMatcher::new(
                IdDictionary::new(config.id.encoding),
                config.id.effective_max_hamming(),
            )),
        };
        Self { sampler, matcher }
    }

    fn identify(
        &mut self,
        gray: &GrayImageView<'_>,
        camera: &CameraModel,
        quad: &[Point2<f64>; 4],
        border: f64,
    ) -> Option<Identified> {
        let samples = self.sampler.sample(gray, camera, quad, border)?;
        match &mut self.matcher {
            Matcher::Template(m) => m.identify(samples).map(|t| Identified {
                id: t.id,
                direction: t.direction,
                confidence: t.confidence,
                inverted: t.inverted,
            }),
            Matcher::Id(m) => m.decode_samples(samples).map(|d| Identified {
                id: d.id,
                direction: d.rotation,
                confidence: d.confidence(),
                inverted: false,
            }),
        }
    }
}

/// Retry threshold generator (xorshift32).
#[derive(Clone, Copy, Debug)]
struct ThresholdRng(u32);

impl ThresholdRng {
    fn new(seed: u32) -> Self {
        Self(if seed == 0 { 0x9e37_79b9 } else { seed })
    }

    fn next_threshold(&mut self) -> u8 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (10 + x % 230) as u8
    }
}

/// A marker tracking session.
///
/// All working buffers are sized at construction (and on camera changes);
/// [`Tracker::track`] reuses them frame after frame. A session is not meant
/// to be shared between capture threads.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    camera: CameraModel,
    near: f64,
    far: f64,
    gray: GrayImage,
    threshold_map: ThresholdMap,
    detector: SquareDetector,
    candidates: Vec<MarkerCandidate>,
    identifier: Identifier,
    registry: PatternRegistry,
    widths: HashMap<u32, f64>,
    history: TrackingHistory,
    rigs: Vec<Option<RigTracker>>,
    observations: Vec<RigObservation>,
    threshold: u8,
    rng: ThresholdRng,
    result: TrackingResult,
}

impl Tracker {
    /// Validate `config` against `camera` and allocate the session.
    pub fn new(config: TrackerConfig, camera: Camera) -> Result<Self, TrackerError> {
        config.validate()?;
        camera.validate()?;
        check_budget(&config, &camera)?;

        let (w, h) = (camera.width, camera.height);
        let detector = SquareDetector::new(config.square.clone(), w, h);
        let identifier = Identifier::new(&config);
        let model = CameraModel::new(camera, config.undistortion).with_undistort_config(config.undistort);
        log::debug!(
            "tracker {w}x{h}, {:?} markers, {:?} pose",
            config.marker_mode,
            config.pose.estimator
        );

        Ok(Self {
            near: config.near_clip,
            far: config.far_clip,
            gray: GrayImage::with_capacity(w, h),
            threshold_map: ThresholdMap::new(),
            candidates: Vec::with_capacity(config.square.max_candidates),
            identifier,
            registry: PatternRegistry::new(config.max_patterns),
            widths: HashMap::new(),
            history: TrackingHistory::new(config.max_stale_frames),
            rigs: Vec::new(),
            observations: Vec::with_capacity(config.square.max_candidates),
            threshold: config.threshold.value,
            rng: ThresholdRng::new(config.threshold.seed),
            result: TrackingResult {
                markers: Vec::with_capacity(config.square.max_candidates),
                ..TrackingResult::default()
            },
            detector,
            camera: model,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        self.camera.camera()
    }

    #[inline]
    pub fn camera_model(&self) -> &CameraModel {
        &self.camera
    }

    /// Replace the camera and its clip planes.
    ///
    /// Drops the undistortion table, reallocates the frame buffers and
    /// forgets all cross-frame state.
    pub fn set_camera(&mut self, camera: Camera, near: f64, far: f64) -> Result<(), TrackerError> {
        camera.validate()?;
        if !(near > 0.0 && far > near) {
            return Err(TrackerError::InvalidConfig(format!(
                "clip planes must satisfy 0 < near < far (got {near}, {far})"
            )));
        }
        check_budget(&self.config, &camera)?;

        let (w, h) = (camera.width, camera.height);
        self.camera.set_camera(camera);
        self.near = near;
        self.far = far;
        self.gray = GrayImage::with_capacity(w, h);
        self.threshold_map = ThresholdMap::new();
        self.detector = SquareDetector::new(self.config.square.clone(), w, h);
        self.candidates.clear();
        self.history.clear();
        for rig in self.rigs.iter_mut().flatten() {
            rig.reset();
        }
        self.result.clear();
        log::debug!("camera replaced, now {w}x{h}");
        Ok(())
    }

    /// Rescale the active camera to a new frame size.
    pub fn change_camera_size(&mut self, width: usize, height: usize) -> Result<(), TrackerError> {
        let camera = self.camera.camera().resized(width, height)?;
        self.set_camera(camera, self.near, self.far)
    }

    /// Column-major projection matrix for the active camera and clip planes.
    pub fn gl_projection(&self) -> Result<[f64; 16], TrackerError> {
        Ok(self.camera.camera().gl_projection(self.near, self.far)?)
    }

    /// Threshold the next frame starts from.
    #[inline]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold;
    }

    pub fn set_auto_threshold(&mut self, enabled: bool, retries: u32) -> Result<(), TrackerError> {
        if enabled && retries == 0 {
            return Err(TrackerError::InvalidConfig(
                "auto threshold needs at least one retry".into(),
            ));
        }
        self.config.threshold.auto = enabled;
        self.config.threshold.retries = retries;
        Ok(())
    }

    pub fn set_pose_estimator(&mut self, estimator: PoseEstimator) {
        self.config.pose.estimator = estimator;
    }

    pub fn set_hull_mode(&mut self, mode: HullMode) {
        self.config.fusion.hull = mode;
    }

    pub fn set_border_width(&mut self, border_width: f64) -> Result<(), TrackerError> {
        if !(border_width > 0.0 && border_width < 0.5) {
            return Err(TrackerError::InvalidConfig(format!(
                "border_width {border_width} outside (0, 0.5)"
            )));
        }
        self.config.border_width = border_width;
        Ok(())
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn history(&self) -> &TrackingHistory {
        &self.history
    }

    /// Result of the most recent frame.
    pub fn result(&self) -> &TrackingResult {
        &self.result
    }

    /// Candidates of the most recent threshold attempt.
    pub fn candidates(&self) -> &[MarkerCandidate] {
        &self.candidates
    }

    /// Luminance plane of the most recent frame.
    pub fn luminance(&self) -> GrayImageView<'_> {
        self.gray.view()
    }

    fn require_template_mode(&self) -> Result<(), TrackerError> {
        match self.config.marker_mode {
            MarkerMode::Template => Ok(()),
            MarkerMode::Id => Err(TrackerError::WrongMarkerMode(MarkerMode::Template)),
        }
    }

    /// Register a pattern from `.patt` text; returns its id.
    pub fn register_patt_text(&mut self, text: &str) -> Result<u32, TrackerError> {
        self.require_template_mode()?;
        let patt = PattFile::parse_with_size(text, self.config.template.pattern_size)?;
        self.register_pattern(TemplatePattern::from_patt(&patt)?)
    }

    pub fn register_patt_bytes(&mut self, bytes: &[u8]) -> Result<u32, TrackerError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PatternError::Malformed(format!("not utf-8: {e}")))?;
        self.register_patt_text(text)
    }

    pub fn register_patt_file(&mut self, path: impl AsRef<Path>) -> Result<u32, TrackerError> {
        let text = std::fs::read_to_string(path).map_err(PatternError::from)?;
        self.register_patt_text(&text)
    }

    /// Register an upright grey template of the configured size.
    pub fn register_template(&mut self, grey: &[u8]) -> Result<u32, TrackerError> {
        self.require_template_mode()?;
        let pattern = TemplatePattern::from_grey(self.config.template.pattern_size, grey)?;
        self.register_pattern(pattern)
    }

    pub fn register_pattern(&mut self, pattern: TemplatePattern) -> Result<u32, TrackerError> {
        self.require_template_mode()?;
        let (expected, got) = (self.config.template.pattern_size, pattern.size());
        if got != expected {
            return Err(PatternError::SizeMismatch {
                expected: expected * expected,
                got: got * got,
            }
            .into());
        }
        let id = self.registry.register(pattern)?;
        self.rebuild_matcher();
        log::debug!("registered pattern {id} ({} active)", self.registry.len());
        Ok(id)
    }

    pub fn unregister(&mut self, id: u32) -> Result<(), TrackerError> {
        self.require_template_mode()?;
        self.registry.unregister(id)?;
        self.widths.remove(&id);
        self.history.forget(id);
        self.rebuild_matcher();
        log::debug!("unregistered pattern {id}");
        Ok(())
    }

    fn rebuild_matcher(&mut self) {
        if let Matcher::Template(m) = &mut self.identifier.matcher {
            m.rebuild(self.registry.iter());
        }
    }

    /// Whether `id` can be reported by this session.
    pub fn is_known_id(&self, id: u32) -> bool {
        match self.config.marker_mode {
            MarkerMode::Template => self.registry.contains(id),
            MarkerMode::Id => id < self.config.id.encoding.id_count(),
        }
    }

    /// Physical side length used for marker `id`.
    pub fn set_marker_width(&mut self, id: u32, width: f64) -> Result<(), TrackerError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(TrackerError::InvalidConfig(format!(
                "marker width {width} must be positive"
            )));
        }
        if !self.is_known_id(id) {
            return Err(TrackerError::UnknownPattern(id));
        }
        self.widths.insert(id, width);
        Ok(())
    }

    pub fn marker_width(&self, id: u32) -> f64 {
        self.widths
            .get(&id)
            .copied()
            .unwrap_or(self.config.default_marker_width)
    }

    /// Start tracking `rig`; returns its handle.
    pub fn add_rig(&mut self, rig: Rig) -> Result<usize, TrackerError> {
        rig.validate(|id| self.is_known_id(id))?;
        let tracker = RigTracker::new(rig);
        let handle = match self.rigs.iter().position(Option::is_none) {
            Some(free) => {
                self.rigs[free] = Some(tracker);
                free
            }
            None => {
                self.rigs.push(Some(tracker));
                self.rigs.len() - 1
            }
        };
        log::debug!("rig {handle} added");
        Ok(handle)
    }

    pub fn load_rig(&mut self, path: impl AsRef<Path>) -> Result<usize, TrackerError> {
        let rig = Rig::load_json(path)?;
        self.add_rig(rig)
    }

    pub fn remove_rig(&mut self, handle: usize) -> Result<Rig, TrackerError> {
        self.rigs
            .get_mut(handle)
            .and_then(Option::take)
            .map(|t| t.rig().clone())
            .ok_or(TrackerError::UnknownRig(handle))
    }

    /// Last fused pose of rig `handle`.
    pub fn rig_pose(&self, handle: usize) -> Option<&Pose> {
        self.rigs
            .get(handle)
            .and_then(Option::as_ref)
            .and_then(RigTracker::pose)
    }

    /// Track a raw buffer in the configured pixel format at camera size.
    pub fn track_buffer(
        &mut self,
        data: &[u8],
        filter: Option<&[u32]>,
    ) -> Result<&TrackingResult, TrackerError> {
        let cam = self.camera.camera();
        let frame = Frame::new(cam.width, cam.height, self.config.pixel_format, data)?;
        self.track(&frame, filter)
    }

    /// Detect, identify and locate markers in `frame`.
    ///
    /// With `filter`, ids outside the list are dropped before pose
    /// estimation. Frames without markers are not errors.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = frame.width(), height = frame.height()))
    )]
    pub fn track(
        &mut self,
        frame: &Frame<'_>,
        filter: Option<&[u32]>,
    ) -> Result<&TrackingResult, TrackerError> {
        let cam = self.camera.camera();
        if frame.width() != cam.width || frame.height() != cam.height {
            return Err(TrackerError::FrameSize {
                width: cam.width,
                height: cam.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }

        frame.luminance_into(&mut self.gray);
        let (gw, gh) = self.detector.grid_size();
        self.threshold_map.update(gw, gh, self.config.vignetting);
        self.history.begin_frame();
        self.result.clear();

        let auto = self.config.threshold.auto;
        let attempts = if auto { 1 + self.config.threshold.retries } else { 1 };
        let mut threshold = self.threshold;
        for attempt in 0..attempts {
            if attempt > 0 {
                threshold = self.rng.next_threshold();
            }
            self.result.attempts = attempt + 1;
            self.result.threshold = threshold;
            self.detect_markers(threshold, filter);
            if !self.result.markers.is_empty() {
                break;
            }
        }

        if auto {
            match self.luminance_midpoint() {
                Some(next) => self.threshold = next,
                None => log::debug!("no markers after {attempts} thresholds"),
            }
        }
        for m in &self.result.markers {
            self.history.record(m.id, m.pose);
        }
        self.update_rigs();

        log::debug!(
            "frame: {} candidates, {} markers, {} rigs, threshold {}",
            self.result.candidates,
            self.result.markers.len(),
            self.result.rigs.len(),
            self.result.threshold
        );
        Ok(&self.result)
    }

    /// One threshold attempt: candidates, identification and poses.
    fn detect_markers(&mut self, threshold: u8, filter: Option<&[u32]>) {
        self.result.markers.clear();
        let gray = self.gray.view();
        let found = self
            .detector
            .detect(&gray, threshold, &self.threshold_map, &self.camera);
        self.candidates.clear();
        self.candidates.extend_from_slice(found);
        self.result.candidates = self.candidates.len();

        let border = self.config.border_width;
        for cand in &self.candidates {
            let Some(ident) = self
                .identifier
                .identify(&gray, &self.camera, &cand.vertices, border)
            else {
                continue;
            };
            if filter.is_some_and(|ids| !ids.contains(&ident.id)) {
                continue;
            }

            let k = ident.direction as usize;
            let corners: [Point2<f64>; 4] = std::array::from_fn(|j| cand.vertices[(j + k) % 4]);
            let observed: [Point2<f64>; 4] = std::array::from_fn(|j| cand.observed[(j + k) % 4]);
            let width = self
                .widths
                .get(&ident.id)
                .copied()
                .unwrap_or(self.config.default_marker_width);
            let model = marker_corners(width, [0.0, 0.0]);
            let Some(fit) = estimate_pose(
                self.camera.camera(),
                &model,
                &corners,
                self.history.previous(ident.id),
                &self.config.pose,
            ) else {
                log::trace!("marker {}: no pose", ident.id);
                continue;
            };
            if !fit.is_trackable(&self.config.pose) {
                log::trace!("marker {}: fit error {:.3} too large", ident.id, fit.error);
                continue;
            }

            let marker = TrackedMarker {
                id: ident.id,
                direction: ident.direction,
                confidence: ident.confidence,
                inverted: ident.inverted,
                corners,
                observed,
                pose: fit.pose,
                fit_error: fit.error,
                width,
            };
            match self.result.markers.iter_mut().find(|m| m.id == marker.id) {
                Some(prev) if prev.confidence >= marker.confidence => {}
                Some(prev) => *prev = marker,
                None => self.result.markers.push(marker),
            }
        }
    }

    /// `(min + max) / 2` of the luminance under this frame's markers.
    fn luminance_midpoint(&self) -> Option<u8> {
        let (w, h) = (self.gray.width, self.gray.height);
        if w == 0 || h == 0 {
            return None;
        }
        let (mut lo, mut hi) = (u8::MAX, u8::MIN);
        for m in &self.result.markers {
            let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
            let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
            for p in &m.observed {
                x0 = x0.min(p.x);
                y0 = y0.min(p.y);
                x1 = x1.max(p.x);
                y1 = y1.max(p.y);
            }
            let clamp_x = |v: f64| v.round().clamp(0.0, (w - 1) as f64) as usize;
            let clamp_y = |v: f64| v.round().clamp(0.0, (h - 1) as f64) as usize;
            for y in clamp_y(y0)..=clamp_y(y1) {
                let row = &self.gray.data[y * w..(y + 1) * w];
                for &v in &row[clamp_x(x0)..=clamp_x(x1)] {
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            }
        }
        (lo <= hi).then(|| ((u16::from(lo) + u16::from(hi)) / 2) as u8)
    }

    fn update_rigs(&mut self) {
        let camera = self.camera.camera();
        for (handle, slot) in self.rigs.iter_mut().enumerate() {
            let Some(tracker) = slot else { continue };
            self.observations.clear();
            for m in &self.result.markers {
                let Some(entry) = tracker.rig().position(m.id) else {
                    continue;
                };
                let pose = entry_pose(&m.pose, m.width, &tracker.rig().markers[entry]);
                self.observations.push(RigObservation {
                    entry,
                    corners: m.corners,
                    pose: Some(pose),
                    confidence: m.confidence,
                });
            }
            if let Some(fit) =
                tracker.update(camera, &self.observations, &self.config.fusion, &self.config.pose)
            {
                self.result.rigs.push(RigPose {
                    rig: handle,
                    pose: fit.pose,
                    error: fit.error,
                    markers: fit.markers,
                });
            }
        }
    }
}

fn check_budget(config: &TrackerConfig, camera: &Camera) -> Result<(), TrackerError> {
    let Some(budget) = config.memory_budget else {
        return Ok(());
    };
    let required = config.capacity().required_bytes(camera.width, camera.height);
    if required > budget {
        return Err(TrackerError::MemoryBudget { required, budget });
    }
    Ok(())
}

/// Re-express a marker-centred pose solved at `tracked_width` in the frame of
/// a rig entry (its own width and centre offset).
fn entry_pose(marker: &Pose, tracked_width: f64, entry: &RigEntry) -> Pose {
    let scale = entry.width / tracked_width;
    let center = Vector3::new(entry.center[0], entry.center[1], 0.0);
    Pose::new(
        marker.rotation,
        marker.translation * scale - marker.rotation * center,
    )
}
