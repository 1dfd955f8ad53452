use log::{Level, log};

use crate::{ConfigError, TimebaseEvent};
use crate::{OutgoingFrameQueueReceiver, TimebaseQueueReceiver, TxBusQueueSender};

/// Diagnostics derived when a data frame arrives, relative to the
/// scheduler's own history. Observational only; they never feed back into
/// scheduling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxDiagnostics {
    /// Nanoseconds between the frame timestamp and the last scheduled
    /// transmission (tx_prev), signed.
    pub since_last_tx: i64,
    /// Nanoseconds between the frame timestamp and the previously received
    /// frame (rx_prev before this update), signed.
    pub since_last_rx: i64,
}

/// Tick-synchronized transmit scheduler.
///
/// Decides when the next frame must be handed to the modem: a frame
/// scheduled for instant `tx_next` is dispatched as soon as an observed
/// tick enters the lead-time window, i.e. `t - tx_next >= -tx_ahead` in
/// signed arithmetic. Scheduling is fixed-interval: after each dispatch
/// `tx_next` advances by exactly `tx_interval` and never resynchronizes to
/// the observed tick. Drift between the interval and the true tick cadence
/// therefore accumulates; callers monitor it through [`crate::TickTracker`]
/// deltas.
///
/// All fields are plain nanosecond values with zero meaning unset. The
/// state is owned by a single task; there is no locking.
pub struct TransmitScheduler {
    tx_interval: u64,
    tx_ahead: u64,
    tx_next: u64,
    tx_prev: u64,
    rx_prev: u64,
}

impl TransmitScheduler {
    /// Construct a scheduler. Fails with [`ConfigError::InvalidWindow`] if
    /// the lead time is not strictly smaller than the interval, since the
    /// window test is meaningless otherwise.
    pub fn new(tx_interval: u64, tx_ahead: u64) -> Result<Self, ConfigError> {
        if tx_interval == 0 || tx_ahead >= tx_interval {
            return Err(ConfigError::InvalidWindow);
        }
        Ok(TransmitScheduler {
            tx_interval,
            tx_ahead,
            tx_next: 0,
            tx_prev: 0,
            rx_prev: 0,
        })
    }

    /// Advance the state machine with an observed tick.
    ///
    /// Returns the timestamp of a transmission slot when the tick has
    /// entered the lead-time window (or is already past it), None
    /// otherwise. The very first tick only arms the schedule: it sets
    /// `tx_next = t + tx_interval` and emits nothing, deliberately
    /// deferring the first transmission by one full interval until the
    /// timebase is known.
    pub fn on_tick(&mut self, tick: u64) -> Option<u64> {
        if self.tx_next == 0 {
            self.tx_next = tick.wrapping_add(self.tx_interval);
            return None;
        }

        // Signed comparison: the tick is usually still before tx_next.
        if (tick as i64).wrapping_sub(self.tx_next as i64) >= -(self.tx_ahead as i64) {
            let slot = self.tx_next;
            self.tx_prev = slot;
            self.tx_next = slot.wrapping_add(self.tx_interval);
            return Some(slot);
        }

        None
    }

    /// Record a received data frame timestamp and derive its timing
    /// diagnostics.
    pub fn on_frame(&mut self, timestamp: u64) -> RxDiagnostics {
        let diagnostics = RxDiagnostics {
            since_last_tx: (timestamp as i64).wrapping_sub(self.tx_prev as i64),
            since_last_rx: (timestamp as i64).wrapping_sub(self.rx_prev as i64),
        };
        self.rx_prev = timestamp;
        diagnostics
    }

    /// Next scheduled transmission instant, 0 while unarmed.
    pub fn next_slot(&self) -> u64 {
        self.tx_next
    }
}

/// TX Scheduler Task
///
/// Owns the scheduler state and drives it from the timebase event queue
/// fed by the rx handler. On each tick that opens a transmission slot it
/// takes the next queued outgoing frame, stamps it with the slot instant
/// and hands the encoded message to the bus device. An open slot with
/// nothing queued is skipped; the schedule still advances.
///
/// Received-frame events only update the rx diagnostics, which are logged.
///
/// # Parameters
/// * `timebase_queue_receiver` - Ticks and frame arrivals from the rx handler
/// * `outgoing_frame_queue_receiver` - Frames queued by the application
/// * `bus_tx_queue_sender` - Encoded messages toward the bus device
/// * `scheduler` - Validated scheduler state machine
#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
#[cfg_attr(not(feature = "std"), embassy_executor::task(pool_size = 1))]
pub(crate) async fn tx_scheduler_task(
    timebase_queue_receiver: TimebaseQueueReceiver,
    outgoing_frame_queue_receiver: OutgoingFrameQueueReceiver,
    bus_tx_queue_sender: TxBusQueueSender,
    mut scheduler: TransmitScheduler,
) -> ! {
    log!(
        Level::Info,
        "TX scheduler task started, interval: {} ns, lead time: {} ns",
        scheduler.tx_interval,
        scheduler.tx_ahead
    );
    loop {
        let event = timebase_queue_receiver.receive().await;
        handle_timebase_event(&mut scheduler, event, &outgoing_frame_queue_receiver, &bus_tx_queue_sender);
    }
}

fn handle_timebase_event(
    scheduler: &mut TransmitScheduler,
    event: TimebaseEvent,
    outgoing_frame_queue_receiver: &OutgoingFrameQueueReceiver,
    bus_tx_queue_sender: &TxBusQueueSender,
) {
    match event {
        TimebaseEvent::Tick(tick) => {
            let Some(slot) = scheduler.on_tick(tick) else {
                return;
            };

            let Ok(frame) = outgoing_frame_queue_receiver.try_receive() else {
                log!(Level::Debug, "No frame queued, skipping TX slot at {}", slot);
                return;
            };

            log!(Level::Debug, "Dispatching frame for slot {} on tick {}", slot, tick);
            match bus_tx_queue_sender.try_send(frame.encode_at(slot)) {
                Ok(_) => {}
                Err(embassy_sync::channel::TrySendError::Full(_)) => {
                    log!(Level::Warn, "Bus TX queue full, dropping frame scheduled for {}", slot);
                }
            }
        }
        TimebaseEvent::FrameReceived(timestamp) => {
            let diagnostics = scheduler.on_frame(timestamp);
            log!(
                Level::Debug,
                "RX at {}: {} ns from last TX, {} ns from last RX",
                timestamp,
                diagnostics.since_last_tx,
                diagnostics.since_last_rx
            );
        }
    }
}

// A single-event version of the scheduler loop for tests.
#[cfg(all(test, feature = "std"))]
pub(crate) async fn tx_scheduler_step(
    timebase_queue_receiver: TimebaseQueueReceiver,
    outgoing_frame_queue_receiver: OutgoingFrameQueueReceiver,
    bus_tx_queue_sender: TxBusQueueSender,
    scheduler: &mut TransmitScheduler,
) {
    let event = timebase_queue_receiver.receive().await;
    handle_timebase_event(scheduler, event, &outgoing_frame_queue_receiver, &bus_tx_queue_sender);
}
