pub mod channel;
pub mod codec;
pub mod config;
pub mod errors;
pub mod layout;
pub mod names;
pub mod region;
pub mod ring;
pub mod semaphore;
pub mod sync;
pub mod types;

pub use channel::{FrameConsumer, FrameProducer, ReadSlot, WriteSlot};
pub use codec::{ControlBlock, DecodeError, SlotHeader};
pub use config::ChannelConfig;
pub use errors::ChannelError;
pub use layout::SlotLayout;
pub use names::ChannelNames;
pub use ring::{RingError, SlotState};
pub use types::{Detection, Detections, Frame, Image};
