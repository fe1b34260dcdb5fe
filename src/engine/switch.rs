use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// Which source feeds the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Live,
    Fallback,
    /// Fallback forced by the privacy flag; live arrivals are ignored until
    /// privacy is released.
    PrivacyForcedFallback,
}

impl SwitchState {
    fn as_u8(self) -> u8 {
        match self {
            SwitchState::Live => 0,
            SwitchState::Fallback => 1,
            SwitchState::PrivacyForcedFallback => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => SwitchState::Live,
            1 => SwitchState::Fallback,
            _ => SwitchState::PrivacyForcedFallback,
        }
    }

    /// True when the fallback source feeds the output.
    pub fn uses_fallback(self) -> bool {
        !matches!(self, SwitchState::Live)
    }
}

/// Mode state machine: freshness watchdog for leaving live, hysteresis for
/// returning to it, privacy override above both. The controller never moves
/// packets; it publishes the current mode and one event per transition.
pub struct SwitchController {
    state: AtomicU8,
    privacy: AtomicBool,
    consecutive_live: AtomicU64,
    last_live_packet: Mutex<Option<Instant>>,
    max_live_gap: Duration,
    min_consecutive: u64,
    events: Option<mpsc::UnboundedSender<SwitchState>>,
}

impl SwitchController {
    pub fn new(
        max_live_gap: Duration,
        min_consecutive: u64,
        events: Option<mpsc::UnboundedSender<SwitchState>>,
    ) -> Self {
        Self {
            state: AtomicU8::new(SwitchState::Fallback.as_u8()),
            privacy: AtomicBool::new(false),
            consecutive_live: AtomicU64::new(0),
            last_live_packet: Mutex::new(None),
            max_live_gap,
            min_consecutive,
            events,
        }
    }

    pub fn state(&self) -> SwitchState {
        SwitchState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn privacy(&self) -> bool {
        self.privacy.load(Ordering::Acquire)
    }

    /// Called by the live source's indexer on every arriving packet.
    pub fn note_live_packet(&self, now: Instant) {
        *self.last_live_packet.lock().unwrap() = Some(now);
        if self.state() == SwitchState::Fallback && !self.privacy() {
            self.consecutive_live.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn consecutive_live_packets(&self) -> u64 {
        self.consecutive_live.load(Ordering::Relaxed)
    }

    pub fn set_privacy(&self, enabled: bool) {
        let was = self.privacy.swap(enabled, Ordering::AcqRel);
        if was == enabled {
            return;
        }
        tracing::info!(privacy = enabled, "privacy flag changed");
        if enabled {
            self.transition(SwitchState::PrivacyForcedFallback);
        } else if self.state() == SwitchState::PrivacyForcedFallback {
            // Released: the normal recovery path applies from here.
            self.transition(SwitchState::Fallback);
        }
    }

    /// One decision step; called by the engine between batches.
    pub fn evaluate(
        &self,
        now: Instant,
        live_media_ready: bool,
        live_has_clean_point: bool,
    ) -> SwitchState {
        match self.state() {
            SwitchState::Live => {
                let stale = self
                    .last_live_packet
                    .lock()
                    .unwrap()
                    .is_some_and(|last| now.duration_since(last) > self.max_live_gap);
                if stale {
                    tracing::warn!(
                        gap_ms = self.max_live_gap.as_millis() as u64,
                        "live feed stale, switching to fallback"
                    );
                    self.transition(SwitchState::Fallback);
                }
            }
            SwitchState::Fallback => {
                if self.consecutive_live_packets() >= self.min_consecutive
                    && live_media_ready
                    && live_has_clean_point
                {
                    self.transition(SwitchState::Live);
                }
            }
            SwitchState::PrivacyForcedFallback => {}
        }
        self.state()
    }

    /// Used by the engine when a switch target fails to produce a clean
    /// switch point in time, and to publish the initial mode.
    pub fn force_state(&self, state: SwitchState) {
        if self.state() != state {
            self.transition(state);
        }
    }

    fn transition(&self, to: SwitchState) {
        let from = SwitchState::from_u8(self.state.swap(to.as_u8(), Ordering::AcqRel));
        self.consecutive_live.store(0, Ordering::Relaxed);
        tracing::info!(?from, ?to, "switch state changed");
        if let Some(events) = &self.events {
            let _ = events.send(to);
        }
    }
}
