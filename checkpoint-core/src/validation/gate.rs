use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Identifier of one scan-to-outcome cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRefusal {
    /// A cycle is already running.
    Busy,
    /// The previous cycle started less than the spacing ago.
    TooSoon,
}

#[derive(Debug, Default)]
struct GateState {
    busy: bool,
    last_dispatch: Option<Instant>,
    next_scan: u64,
}

/// Busy/spacing guard over scan cycles.
///
/// Only the orchestrator holds the writer; everything else observes it
/// through a [`ScanGateView`].
#[derive(Debug)]
pub struct ScanGate {
    state: Arc<Mutex<GateState>>,
    spacing: Duration,
}

/// Read-only handle on the gate.
#[derive(Debug, Clone)]
pub struct ScanGateView {
    state: Arc<Mutex<GateState>>,
}

impl ScanGate {
    pub fn new(spacing: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::default())),
            spacing,
        }
    }

    pub fn view(&self) -> ScanGateView {
        ScanGateView {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Marks the gate busy and allocates a scan id.
    pub fn try_acquire(&mut self, now: Instant) -> Result<ScanId, GateRefusal> {
        let mut state = self.state.lock();
        if state.busy {
            return Err(GateRefusal::Busy);
        }
        if let Some(last) = state.last_dispatch
            && now.saturating_duration_since(last) < self.spacing
        {
            return Err(GateRefusal::TooSoon);
        }
        state.busy = true;
        state.last_dispatch = Some(now);
        state.next_scan += 1;
        Ok(ScanId(state.next_scan))
    }

    /// Re-arms the gate. Idempotent.
    pub fn release(&mut self) {
        self.state.lock().busy = false;
    }
}

impl ScanGateView {
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }
}
