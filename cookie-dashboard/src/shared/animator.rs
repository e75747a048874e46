//! Smooth interpolation of displayed metrics
//!
//! Each metric owns one [`ValueAnimator`]. A retarget restarts the ease-out
//! curve from whatever value is on screen at that instant, so the display
//! never jumps. Frame loops are tagged with a generation; a loop whose
//! generation is no longer current cannot write.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::derived::DerivedMetrics;
use super::poller::DashboardState;

/// Time to reach a new target
pub const ANIMATION_DURATION: Duration = Duration::from_millis(1000);

/// Frame interval for the tick loop (~60 fps)
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Ease-out quadratic: fast start, decelerating finish
#[inline]
pub fn ease_out_quad(t: f64) -> f64 {
    t * (2.0 - t)
}

/// Interpolation state for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationState {
    pub start_value: f64,
    pub target_value: f64,
    pub start_time: Instant,
    pub duration: Duration,
    pub displayed_value: f64,
    /// Normalised elapsed time, 0..=1
    pub progress: f64,
}

impl AnimationState {
    fn settled(value: f64, now: Instant, duration: Duration) -> Self {
        Self {
            start_value: value,
            target_value: value,
            start_time: now,
            duration,
            displayed_value: value,
            progress: 1.0,
        }
    }

    fn advance(&mut self, now: Instant) {
        if self.is_idle() {
            return;
        }

        let elapsed = now.saturating_duration_since(self.start_time);
        let t = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        };
        // Ticks for one run arrive in frame order, but never move backwards
        self.progress = self.progress.max(t);

        if self.progress >= 1.0 {
            self.progress = 1.0;
            self.displayed_value = self.target_value;
        } else {
            let eased = ease_out_quad(self.progress);
            self.displayed_value =
                self.start_value + (self.target_value - self.start_value) * eased;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Interpolates one displayed metric toward its latest target
#[derive(Debug, Clone)]
pub struct ValueAnimator {
    duration: Duration,
    state: Option<AnimationState>,
    generation: u64,
}

impl ValueAnimator {
    pub fn new() -> Self {
        Self::with_duration(ANIMATION_DURATION)
    }

    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            state: None,
            generation: 0,
        }
    }

    /// Retarget using the current time
    pub fn retarget(&mut self, target: f64) -> u64 {
        self.retarget_at(target, Instant::now())
    }

    /// Start a new run toward `target` from the value displayed at `now`
    ///
    /// The first target ever assigned is displayed immediately. Returns the
    /// generation of the new run.
    pub fn retarget_at(&mut self, target: f64, now: Instant) -> u64 {
        self.generation += 1;

        match self.state.as_mut() {
            None => {
                self.state = Some(AnimationState::settled(target, now, self.duration));
            }
            Some(state) => {
                state.advance(now);
                let from = state.displayed_value;
                *state = AnimationState {
                    start_value: from,
                    target_value: target,
                    start_time: now,
                    duration: self.duration,
                    displayed_value: from,
                    progress: 0.0,
                };
                // Already there: nothing to animate
                if from == target {
                    state.progress = 1.0;
                }
            }
        }

        self.generation
    }

    /// Advance using the current time
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    /// Advance the current run to `now` and return the displayed value
    pub fn tick_at(&mut self, now: Instant) -> f64 {
        match self.state.as_mut() {
            Some(state) => {
                state.advance(now);
                state.displayed_value
            }
            None => 0.0,
        }
    }

    /// Advance only if `generation` is still the current run
    ///
    /// Returns `None` for a superseded run, leaving state untouched.
    pub fn tick_generation(&mut self, generation: u64, now: Instant) -> Option<f64> {
        if generation != self.generation {
            return None;
        }
        Some(self.tick_at(now))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Value currently on screen (0 before the first target)
    pub fn displayed(&self) -> f64 {
        self.state.map(|s| s.displayed_value).unwrap_or(0.0)
    }

    pub fn target(&self) -> Option<f64> {
        self.state.map(|s| s.target_value)
    }

    pub fn state(&self) -> Option<&AnimationState> {
        self.state.as_ref()
    }

    /// True when no run is in flight
    pub fn is_idle(&self) -> bool {
        self.state.map(|s| s.is_idle()).unwrap_or(true)
    }
}

impl Default for ValueAnimator {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// A [`ValueAnimator`] driven by its own frame loop task
///
/// Each retarget aborts the previous loop and spawns one for the new
/// generation. Must be used inside a tokio runtime.
#[derive(Clone)]
pub struct SharedAnimator {
    inner: Arc<Mutex<ValueAnimator>>,
    frame_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
    frame_interval: Duration,
}

impl SharedAnimator {
    pub fn new() -> Self {
        Self::with_animator(ValueAnimator::new(), FRAME_INTERVAL)
    }

    pub fn with_animator(animator: ValueAnimator, frame_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(animator)),
            frame_loop: Arc::new(Mutex::new(None)),
            frame_interval,
        }
    }

    /// Retarget and (re)start the frame loop
    pub fn retarget(&self, target: f64) {
        let generation = self.inner.lock().retarget_at(target, now());

        let mut frame_loop = self.frame_loop.lock();
        if let Some(previous) = frame_loop.take() {
            previous.abort();
        }
        if self.inner.lock().is_idle() {
            return;
        }

        let animator = Arc::clone(&self.inner);
        let frame_interval = self.frame_interval;
        *frame_loop = Some(tokio::spawn(async move {
            run_frame_loop(animator, generation, frame_interval).await;
        }));
    }

    /// Value on screen right now
    ///
    /// Advances the current run to the present instant, so the result does
    /// not lag by up to one frame. A superseded loop is still rejected by
    /// its generation check.
    pub fn displayed(&self) -> f64 {
        self.inner.lock().tick_at(now())
    }

    pub fn is_idle(&self) -> bool {
        let mut animator = self.inner.lock();
        animator.tick_at(now());
        animator.is_idle()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation()
    }
}

impl Default for SharedAnimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick `animator` every frame until the run finishes or is superseded
async fn run_frame_loop(animator: Arc<Mutex<ValueAnimator>>, generation: u64, frame_interval: Duration) {
    let mut frames = tokio::time::interval(frame_interval);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        frames.tick().await;

        let mut guard = animator.lock();
        if guard.tick_generation(generation, now()).is_none() {
            debug!("Frame loop for generation {} superseded", generation);
            break;
        }
        if guard.is_idle() {
            break;
        }
    }
}

/// Values currently on screen for every animated metric
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DisplayedValues {
    pub cookie_count: f64,
    pub total_cookies: f64,
    pub pnl_cookies: f64,
}

/// The three independently animated dashboard metrics
#[derive(Clone, Default)]
pub struct MetricAnimators {
    pub cookie_count: SharedAnimator,
    pub total_cookies: SharedAnimator,
    pub pnl_cookies: SharedAnimator,
}

impl MetricAnimators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retarget every metric from one set of derived figures
    pub fn apply(&self, derived: &DerivedMetrics) {
        self.cookie_count.retarget(derived.cookie_count);
        self.total_cookies.retarget(derived.total_cookies);
        self.pnl_cookies.retarget(derived.pnl_cookies);
    }

    pub fn displayed(&self) -> DisplayedValues {
        DisplayedValues {
            cookie_count: self.cookie_count.displayed(),
            total_cookies: self.total_cookies.displayed(),
            pnl_cookies: self.pnl_cookies.displayed(),
        }
    }

    /// Retarget on every published state until the publisher goes away
    pub fn follow(&self, mut state_rx: watch::Receiver<DashboardState>) -> JoinHandle<()> {
        let animators = self.clone();
        tokio::spawn(async move {
            loop {
                let derived = state_rx.borrow_and_update().derived;
                if let Some(derived) = derived {
                    animators.apply(&derived);
                }
                if state_rx.changed().await.is_err() {
                    debug!("State publisher dropped, animators stop following");
                    break;
                }
            }
        })
    }
}
