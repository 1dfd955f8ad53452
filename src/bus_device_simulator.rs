//! # Bus Device Simulator - Synthetic Modem for Testing
//!
//! Emulates the receive side of a modem bus without any transport:
//!
//! - Publishes tick messages at a configurable cadence, advancing a
//!   simulated hardware clock by the same amount each period, so the
//!   transmit scheduler can arm and run end to end.
//! - Loops messages published for transmission back into the receive
//!   queue, like the echo device, so a dispatched frame reappears as a
//!   received frame.
//!
//! The simulated clock is decoupled from wall time on purpose: tests get a
//! deterministic timebase whose cadence is exactly the configured step.

use crate::RxBusQueueSender;
use crate::TxBusQueueReceiver;
use crate::frame::TickMessage;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use log::{Level, log};

/// Simulator bus device task
///
/// Alternates between forwarding published messages and emitting synthetic
/// ticks. Backpressure on the RX queue drops the affected message with a
/// warning, matching the behavior of a real gateway with a slow consumer.
#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
#[cfg_attr(not(feature = "std"), embassy_executor::task(pool_size = 1))]
pub(crate) async fn bus_device_task(mut bus_device: BusDevice, tx_receiver: TxBusQueueReceiver, rx_sender: RxBusQueueSender) -> ! {
    log!(
        Level::Info,
        "Simulator bus device task started, tick interval: {} ns",
        bus_device.tick_interval_ns
    );
    bus_device.run(tx_receiver, rx_sender).await
}

/// Simulated modem bus device.
pub struct BusDevice {
    tick_interval_ns: u64,
    tick: u64,
}

impl BusDevice {
    /// Device emitting one tick every `tick_interval_ns` nanoseconds of
    /// simulated hardware time (also the wall-clock emission period,
    /// rounded up to microsecond resolution).
    pub const fn new(tick_interval_ns: u64) -> Self {
        BusDevice {
            tick_interval_ns,
            tick: 0,
        }
    }

    async fn run(&mut self, tx_receiver: TxBusQueueReceiver, rx_sender: RxBusQueueSender) -> ! {
        let period = Duration::from_micros((self.tick_interval_ns / 1_000).max(1));
        loop {
            match select(tx_receiver.receive(), Timer::after(period)).await {
                Either::First(message) => match rx_sender.try_send(message) {
                    Ok(_) => {}
                    Err(embassy_sync::channel::TrySendError::Full(dropped)) => {
                        log!(Level::Warn, "Bus RX queue full, dropping looped message ({} bytes)", dropped.length());
                    }
                },
                Either::Second(_) => {
                    self.tick = self.tick.wrapping_add(self.tick_interval_ns);
                    let tick_message = TickMessage {
                        id: 0,
                        flags: 0,
                        tick: self.tick,
                    };
                    match rx_sender.try_send(tick_message.encode()) {
                        Ok(_) => {}
                        Err(embassy_sync::channel::TrySendError::Full(_)) => {
                            log!(Level::Warn, "Bus RX queue full, dropping tick {}", self.tick);
                        }
                    }
                }
            }
        }
    }
}
