//! Pass-through model for events crossing into a model tree.

use crate::sim::error::{SimError, SimResult};
use crate::sim::event::{Event, EventKind};
use crate::sim::model::{AtomicModel, InitContext, ModelReport, TransitionContext};
use crate::sim::time::{Duration, Time, TimeUnit};

/// Re-emits every accepted event unchanged, at the instant it arrived.
///
/// Placed at a coupling boundary, a relay turns an injected event into an
/// ordinary output that the enclosing coupled model routes like any other.
#[derive(Debug, Clone)]
pub struct RelayModel {
    kinds: Vec<EventKind>,
    pending: Vec<Event>,
    unit: TimeUnit,
    uri: String,
    forwarded: usize,
}

impl RelayModel {
    pub fn new(kinds: Vec<EventKind>) -> Self {
        Self {
            kinds,
            pending: Vec::new(),
            unit: TimeUnit::Seconds,
            uri: String::new(),
            forwarded: 0,
        }
    }

    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }
}

impl AtomicModel for RelayModel {
    fn kind(&self) -> &'static str {
        "Relay"
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> SimResult<()> {
        self.uri = ctx.uri.to_string();
        self.unit = ctx.start.unit();
        self.pending.clear();
        self.forwarded = 0;
        Ok(())
    }

    fn time_advance(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::infinite(self.unit)
        } else {
            Duration::zero(self.unit)
        }
    }

    fn output(&mut self, _ctx: &TransitionContext<'_>) -> Vec<Event> {
        self.pending.clone()
    }

    fn internal_transition(
        &mut self,
        _elapsed: Duration,
        _ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        self.forwarded += self.pending.len();
        self.pending.clear();
        Ok(())
    }

    fn external_transition(
        &mut self,
        _elapsed: Duration,
        events: &[Event],
        _ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        if let Some(e) = events
            .iter()
            .find(|e| !self.kinds.iter().any(|k| k.name() == e.kind().name()))
        {
            return Err(SimError::UnexpectedEvent {
                model: self.uri.clone(),
                event: e.kind().name().to_string(),
            });
        }
        self.pending.extend_from_slice(events);
        Ok(())
    }

    fn end_simulation(&mut self, _end: Time) -> ModelReport {
        ModelReport::new(&self.uri, self.kind()).metric("forwarded", self.forwarded as f64)
    }
}
