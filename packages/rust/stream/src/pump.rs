//! Drive one aggregator from an event stream into a bounded channel.

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::aggregator::{ClientEvent, Phase, StreamAggregator};
use crate::event::StreamEvent;

/// Why [`pump`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The answer completed and its completion record was delivered.
    Completed,
    /// The producer reported an error, which was delivered.
    Errored,
    /// The event stream ended before a terminal event.
    Exhausted,
    /// The receiving side went away.
    Disconnected,
    Cancelled,
}

/// Feed `events` through a fresh [`StreamAggregator`] into `sink`.
///
/// A full `sink` suspends consumption of `events`. Cancellation and a dropped
/// receiver are noticed while waiting for either side; no further events are
/// applied after that.
#[instrument(skip_all)]
pub async fn pump<S>(
    events: S,
    sink: mpsc::Sender<ClientEvent>,
    cancel: CancellationToken,
) -> PumpOutcome
where
    S: Stream<Item = StreamEvent>,
{
    let mut aggregator = StreamAggregator::new();
    let mut events = std::pin::pin!(events);
    let mut applied: u64 = 0;
    let mut sent: u64 = 0;

    let outcome = 'pump: loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'pump PumpOutcome::Cancelled,
            _ = sink.closed() => break 'pump PumpOutcome::Disconnected,
            next = events.next() => next,
        };
        let Some(event) = next else {
            break PumpOutcome::Exhausted;
        };

        applied += 1;
        for client_event in aggregator.apply(event) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'pump PumpOutcome::Cancelled,
                delivered = sink.send(client_event) => {
                    if delivered.is_err() {
                        break 'pump PumpOutcome::Disconnected;
                    }
                    sent += 1;
                }
            }
        }

        match aggregator.phase() {
            Phase::Completed => break PumpOutcome::Completed,
            Phase::Errored => break PumpOutcome::Errored,
            Phase::Idle | Phase::Streaming => {}
        }
    };

    if matches!(outcome, PumpOutcome::Disconnected | PumpOutcome::Cancelled) {
        debug!(phase = ?aggregator.phase(), "answer state released early");
    }
    info!(?outcome, applied, sent, "pump finished");
    outcome
}
