use crate::Observation;
use std::sync::mpsc;

/// Downstream consumer of decoded telemetry. Receives one observation per successful poll.
pub trait ObservationSink {
    fn publish(&mut self, obs: &Observation);
}

impl ObservationSink for Vec<Observation> {
    fn publish(&mut self, obs: &Observation) {
        self.push(*obs);
    }
}

impl ObservationSink for mpsc::Sender<Observation> {
    fn publish(&mut self, obs: &Observation) {
        if self.send(*obs).is_err() {
            tracing::trace!("observation receiver dropped");
        }
    }
}

impl<S: ObservationSink + ?Sized> ObservationSink for &mut S {
    fn publish(&mut self, obs: &Observation) {
        (**self).publish(obs);
    }
}

impl<S: ObservationSink + ?Sized> ObservationSink for Box<S> {
    fn publish(&mut self, obs: &Observation) {
        (**self).publish(obs);
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F: FnMut(&Observation)> ObservationSink for FnSink<F> {
    fn publish(&mut self, obs: &Observation) {
        (self.0)(obs);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ObservationSink for NullSink {
    fn publish(&mut self, _obs: &Observation) {}
}
