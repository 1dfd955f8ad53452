//! # Bus Device Echo - Loopback Gateway for Testing
//!
//! The simplest possible bus gateway backend: every message published for
//! transmission is looped straight back into the receive queue. No
//! transport, no timing, no tick generation.
//!
//! Useful for exercising the codec and the rx path without a live bus.
//! Because it never produces tick messages, the transmit scheduler stays
//! unarmed under this device; use the simulator backend when scheduler
//! behavior matters.

use crate::RxBusQueueSender;
use crate::TxBusQueueReceiver;
use log::{Level, log};

/// Echo bus device task - loops published messages back to the receiver
///
/// Runs forever: receives encoded messages from the TX queue and forwards
/// them unchanged to the RX queue. Drops the message with a warning when
/// the RX queue is full.
#[cfg_attr(feature = "std", embassy_executor::task(pool_size = 8))]
#[cfg_attr(not(feature = "std"), embassy_executor::task(pool_size = 1))]
pub(crate) async fn bus_device_task(mut bus_device: BusDevice, tx_receiver: TxBusQueueReceiver, rx_sender: RxBusQueueSender) -> ! {
    log!(Level::Info, "Echo bus device task started");
    bus_device.run(tx_receiver, rx_sender).await
}

/// Echo bus device - zero-sized loopback implementation.
pub struct BusDevice {}

impl BusDevice {
    pub const fn new() -> Self {
        BusDevice {}
    }

    async fn run(&mut self, tx_receiver: TxBusQueueReceiver, rx_sender: RxBusQueueSender) -> ! {
        loop {
            let message = tx_receiver.receive().await;
            match rx_sender.try_send(message) {
                Ok(_) => {}
                Err(embassy_sync::channel::TrySendError::Full(dropped)) => {
                    log!(Level::Warn, "Bus RX queue full, dropping echoed message ({} bytes)", dropped.length());
                }
            }
        }
    }
}

impl Default for BusDevice {
    fn default() -> Self {
        Self::new()
    }
}
