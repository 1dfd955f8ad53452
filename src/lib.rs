#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(feature = "bus-device-echo", feature = "bus-device-simulator"))]
compile_error!("Only one bus device implementation feature can be enabled at a time");

#[cfg(all(not(test), not(any(feature = "bus-device-echo", feature = "bus-device-simulator"))))]
compile_error!("At least one bus device implementation feature must be enabled");

pub mod demod;
pub mod frame;
pub mod tick;

#[cfg(feature = "bus-device-echo")]
pub mod bus_device_echo;

#[cfg(feature = "bus-device-simulator")]
pub mod bus_device_simulator;

#[cfg(feature = "bus-device-echo")]
use crate::bus_device_echo::BusDevice;
#[cfg(feature = "bus-device-echo")]
use crate::bus_device_echo::bus_device_task;

#[cfg(feature = "bus-device-simulator")]
use crate::bus_device_simulator::BusDevice;
#[cfg(feature = "bus-device-simulator")]
use crate::bus_device_simulator::bus_device_task;

mod rx_handler;
mod tx_scheduler;

#[cfg(any(feature = "std", feature = "embedded"))]
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
#[cfg(any(feature = "std", feature = "embedded"))]
use embassy_sync::channel::Channel;
#[cfg(any(feature = "std", feature = "embedded"))]
use log::log;

// Re-export the protocol types from the frame module
pub use frame::{BusMessage, FrameHeader, MessageKind, ProtocolError, ReceivedFrame, TickMessage, TxFrame, classify, decode_payload, encode_frame};
pub use frame::{FRAME_HEADER_SIZE, METADATA_FLOAT_COUNT, TICK_MESSAGE_SIZE};

pub use demod::{HARD_DECISION_THRESHOLD, HardDecisionIterator, hard_decision, hard_decision_into};
pub use tick::{TickEvent, TickTracker};
pub use tx_scheduler::{RxDiagnostics, TransmitScheduler};

// Wire-compatibility constants: a bus message is a 64-byte header plus
// payload; the capacity bounds a single message end to end.
pub const BUS_FRAME_MAX_SIZE: usize = 1088;
pub const FRAME_MAX_PAYLOAD_SIZE: usize = BUS_FRAME_MAX_SIZE - frame::FRAME_HEADER_SIZE;

/// Configuration for tick-synchronized transmission
///
/// Both values are nanoseconds on the modem timebase and are fixed for the
/// lifetime of the link. The lead time must be strictly smaller than the
/// interval; `initialize` rejects the configuration otherwise.
pub struct LinkConfiguration {
    /// Spacing between scheduled transmission instants.
    pub tx_interval: u64,
    /// How long before the scheduled instant a frame must reach the modem.
    pub tx_ahead: u64,
}

/// Fatal configuration and startup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `tx_ahead >= tx_interval`; the scheduler window test would be
    /// meaningless, so the link is not constructed.
    InvalidWindow,
    /// A worker task could not be spawned.
    TaskSpawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFrameError {
    ChannelFull,
    NotInited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveFrameError {
    NotInited,
}

/// Events driving the scheduler task, produced by the rx handler. One
/// sequential stream keeps the scheduler state single-writer without any
/// locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimebaseEvent {
    /// A hardware tick (nanoseconds).
    Tick(u64),
    /// Timestamp of a received data frame, for the rx diagnostics.
    FrameReceived(u64),
}

pub(crate) const RX_BUS_QUEUE_SIZE: usize = 16;
type RxBusQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, BusMessage, RX_BUS_QUEUE_SIZE>;
pub(crate) type RxBusQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, BusMessage, RX_BUS_QUEUE_SIZE>;
pub(crate) type RxBusQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, BusMessage, RX_BUS_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static RX_BUS_QUEUE: RxBusQueue = Channel::new();

pub(crate) const TX_BUS_QUEUE_SIZE: usize = 16;
type TxBusQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, BusMessage, TX_BUS_QUEUE_SIZE>;
pub(crate) type TxBusQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, BusMessage, TX_BUS_QUEUE_SIZE>;
pub(crate) type TxBusQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, BusMessage, TX_BUS_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static TX_BUS_QUEUE: TxBusQueue = Channel::new();

pub(crate) const TIMEBASE_QUEUE_SIZE: usize = 8;
type TimebaseQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, TimebaseEvent, TIMEBASE_QUEUE_SIZE>;
pub(crate) type TimebaseQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, TimebaseEvent, TIMEBASE_QUEUE_SIZE>;
pub(crate) type TimebaseQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, TimebaseEvent, TIMEBASE_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static TIMEBASE_QUEUE: TimebaseQueue = Channel::new();

pub(crate) const INCOMING_FRAME_QUEUE_SIZE: usize = 10;
type IncomingFrameQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, ReceivedFrame, INCOMING_FRAME_QUEUE_SIZE>;
pub(crate) type IncomingFrameQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, ReceivedFrame, INCOMING_FRAME_QUEUE_SIZE>;
pub(crate) type IncomingFrameQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, ReceivedFrame, INCOMING_FRAME_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static INCOMING_FRAME_QUEUE: IncomingFrameQueue = Channel::new();

pub(crate) const OUTGOING_FRAME_QUEUE_SIZE: usize = 10;
type OutgoingFrameQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, TxFrame, OUTGOING_FRAME_QUEUE_SIZE>;
pub(crate) type OutgoingFrameQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, TxFrame, OUTGOING_FRAME_QUEUE_SIZE>;
pub(crate) type OutgoingFrameQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, TxFrame, OUTGOING_FRAME_QUEUE_SIZE>;

#[cfg(feature = "embedded")]
static OUTGOING_FRAME_QUEUE: OutgoingFrameQueue = Channel::new();

enum ModemLinkManagerState {
    Uninitialized,
    Initialized {
        outgoing_frame_queue_sender: OutgoingFrameQueueSender,
        incoming_frame_queue_receiver: IncomingFrameQueueReceiver,
    },
}

/// Owner of the link: spawns the bus device, rx handler and tx scheduler
/// tasks and exposes the frame send/receive surface.
///
/// `send_frame` only queues a frame; the scheduler task decides when it is
/// actually handed to the modem, locked to the tick timebase.
pub struct ModemLinkManager {
    state: ModemLinkManagerState,
}

impl ModemLinkManager {
    pub const fn new() -> Self {
        ModemLinkManager {
            state: ModemLinkManagerState::Uninitialized,
        }
    }

    #[cfg(all(feature = "embedded", any(feature = "bus-device-echo", feature = "bus-device-simulator")))]
    pub fn initialize(&mut self, configuration: LinkConfiguration, spawner: Spawner, bus_device: BusDevice) -> Result<(), ConfigError> {
        self.initialize_common(
            configuration,
            spawner,
            bus_device,
            &RX_BUS_QUEUE,
            &TX_BUS_QUEUE,
            &TIMEBASE_QUEUE,
            &INCOMING_FRAME_QUEUE,
            &OUTGOING_FRAME_QUEUE,
        )
    }

    #[cfg(all(feature = "std", any(feature = "bus-device-echo", feature = "bus-device-simulator")))]
    pub fn initialize(&mut self, configuration: LinkConfiguration, spawner: Spawner, bus_device: BusDevice) -> Result<(), ConfigError> {
        let rx_bus_queue: &'static RxBusQueue = Box::leak(Box::new(Channel::new()));
        let tx_bus_queue: &'static TxBusQueue = Box::leak(Box::new(Channel::new()));
        let timebase_queue: &'static TimebaseQueue = Box::leak(Box::new(Channel::new()));
        let incoming_frame_queue: &'static IncomingFrameQueue = Box::leak(Box::new(Channel::new()));
        let outgoing_frame_queue: &'static OutgoingFrameQueue = Box::leak(Box::new(Channel::new()));

        self.initialize_common(
            configuration,
            spawner,
            bus_device,
            rx_bus_queue,
            tx_bus_queue,
            timebase_queue,
            incoming_frame_queue,
            outgoing_frame_queue,
        )
    }

    #[cfg(all(any(feature = "std", feature = "embedded"), any(feature = "bus-device-echo", feature = "bus-device-simulator")))]
    #[allow(clippy::too_many_arguments)]
    fn initialize_common(
        &mut self,
        configuration: LinkConfiguration,
        spawner: Spawner,
        bus_device: BusDevice,
        rx_bus_queue: &'static RxBusQueue,
        tx_bus_queue: &'static TxBusQueue,
        timebase_queue: &'static TimebaseQueue,
        incoming_frame_queue: &'static IncomingFrameQueue,
        outgoing_frame_queue: &'static OutgoingFrameQueue,
    ) -> Result<(), ConfigError> {
        // Validate the window before anything is spawned.
        let scheduler = TransmitScheduler::new(configuration.tx_interval, configuration.tx_ahead)?;

        spawner
            .spawn(bus_device_task(bus_device, tx_bus_queue.receiver(), rx_bus_queue.sender()))
            .map_err(|_| ConfigError::TaskSpawn)?;
        log!(log::Level::Debug, "Bus device task spawned");

        spawner
            .spawn(rx_handler::rx_handler_task(
                rx_bus_queue.receiver(),
                incoming_frame_queue.sender(),
                timebase_queue.sender(),
            ))
            .map_err(|_| ConfigError::TaskSpawn)?;
        log!(log::Level::Debug, "RX handler task spawned");

        spawner
            .spawn(tx_scheduler::tx_scheduler_task(
                timebase_queue.receiver(),
                outgoing_frame_queue.receiver(),
                tx_bus_queue.sender(),
                scheduler,
            ))
            .map_err(|_| ConfigError::TaskSpawn)?;
        log!(log::Level::Debug, "TX scheduler task spawned");
        log!(log::Level::Info, "Modem link initialized");

        self.state = ModemLinkManagerState::Initialized {
            outgoing_frame_queue_sender: outgoing_frame_queue.sender(),
            incoming_frame_queue_receiver: incoming_frame_queue.receiver(),
        };
        Ok(())
    }

    /// Queue a frame for the next open transmission slot.
    pub fn send_frame(&self, frame: TxFrame) -> Result<(), SendFrameError> {
        let outgoing_frame_queue_sender = match &self.state {
            ModemLinkManagerState::Uninitialized => {
                return Err(SendFrameError::NotInited);
            }
            ModemLinkManagerState::Initialized {
                outgoing_frame_queue_sender, ..
            } => outgoing_frame_queue_sender,
        };
        outgoing_frame_queue_sender.try_send(frame).map_err(|_| SendFrameError::ChannelFull)?;
        Ok(())
    }

    /// Wait for the next decoded inbound data frame.
    pub async fn receive_frame(&self) -> Result<ReceivedFrame, ReceiveFrameError> {
        let incoming_frame_queue_receiver = match &self.state {
            ModemLinkManagerState::Uninitialized => {
                return Err(ReceiveFrameError::NotInited);
            }
            ModemLinkManagerState::Initialized {
                incoming_frame_queue_receiver,
                ..
            } => incoming_frame_queue_receiver,
        };
        Ok(incoming_frame_queue_receiver.receive().await)
    }
}

impl Default for ModemLinkManager {
    fn default() -> Self {
        Self::new()
    }
}
