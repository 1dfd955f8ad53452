use log::{Level, log};

use crate::frame::{self, MessageKind, ReceivedFrame, TickMessage};
use crate::tick::TickTracker;
use crate::{IncomingFrameQueueSender, RxBusQueueReceiver, TimebaseEvent, TimebaseQueueSender};

/// RX Handler Task
///
/// Sequentially drains the raw message queue filled by the bus device and
/// splits the stream by kind:
/// - Tick messages feed the tick tracker (gap and jitter diagnostics are
///   logged here) and are forwarded to the scheduler task as timebase
///   events.
/// - Data frames are decoded; protocol violations are logged and the
///   message is dropped, processing continues with the next one. Valid
///   frames go to the application queue, and their timestamp goes to the
///   scheduler for the rx diagnostics.
///
/// Frame loss on the bus is invisible at this layer; the tick delta is the
/// only advisory signal for gaps.
#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
#[cfg_attr(not(feature = "std"), embassy_executor::task(pool_size = 1))]
pub(crate) async fn rx_handler_task(
    rx_bus_queue_receiver: RxBusQueueReceiver,
    incoming_frame_queue_sender: IncomingFrameQueueSender,
    timebase_queue_sender: TimebaseQueueSender,
) -> ! {
    log!(Level::Info, "RX handler task started");
    let mut tick_tracker = TickTracker::new();
    loop {
        let message = rx_bus_queue_receiver.receive().await;
        handle_bus_message(&mut tick_tracker, message.bytes(), &incoming_frame_queue_sender, &timebase_queue_sender);
    }
}

fn handle_bus_message(
    tick_tracker: &mut TickTracker,
    bytes: &[u8],
    incoming_frame_queue_sender: &IncomingFrameQueueSender,
    timebase_queue_sender: &TimebaseQueueSender,
) {
    match frame::classify(bytes) {
        MessageKind::Tick => {
            let tick_message = match TickMessage::decode(bytes) {
                Ok(tick_message) => tick_message,
                Err(error) => {
                    log!(Level::Warn, "Dropping undecodable tick message: {:?}", error);
                    return;
                }
            };

            match tick_tracker.observe(tick_message.tick).delta {
                None => log!(Level::Debug, "First tick observed: {}", tick_message.tick),
                Some(delta) if delta < 0 => {
                    log!(Level::Warn, "Out-of-order tick {} (delta {} ns)", tick_message.tick, delta);
                }
                Some(delta) => log!(Level::Debug, "Tick {} (delta {} ns)", tick_message.tick, delta),
            }

            if timebase_queue_sender.try_send(TimebaseEvent::Tick(tick_message.tick)).is_err() {
                log!(Level::Warn, "Timebase queue full, dropping tick {}", tick_message.tick);
            }
        }
        MessageKind::Data => {
            let received = match ReceivedFrame::decode(bytes) {
                Ok(received) => received,
                Err(error) => {
                    log!(Level::Warn, "Dropping malformed data frame ({} bytes): {:?}", bytes.len(), error);
                    return;
                }
            };

            if timebase_queue_sender.try_send(TimebaseEvent::FrameReceived(received.timestamp())).is_err() {
                log!(Level::Warn, "Timebase queue full, dropping RX diagnostics event");
            }

            match incoming_frame_queue_sender.try_send(received) {
                Ok(_) => {}
                Err(embassy_sync::channel::TrySendError::Full(dropped)) => {
                    log!(
                        Level::Warn,
                        "Incoming frame queue full, dropping frame with timestamp {}",
                        dropped.timestamp()
                    );
                }
            }
        }
    }
}

// A single-message version of the handler loop for tests.
#[cfg(all(test, feature = "std"))]
pub(crate) async fn rx_handler_step(
    rx_bus_queue_receiver: RxBusQueueReceiver,
    incoming_frame_queue_sender: IncomingFrameQueueSender,
    timebase_queue_sender: TimebaseQueueSender,
    tick_tracker: &mut TickTracker,
) {
    let message = rx_bus_queue_receiver.receive().await;
    handle_bus_message(tick_tracker, message.bytes(), &incoming_frame_queue_sender, &timebase_queue_sender);
}
