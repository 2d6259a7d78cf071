pub mod normalizer;
pub mod public_ip;
pub mod ring_buffer;
pub mod source;
pub mod types;
pub mod view;

pub use normalizer::{Normalizer, SequenceCounter};
pub use public_ip::{lookup_public_ip, PublicIpInfo};
pub use ring_buffer::RingBuffer;
pub use source::{ResourceFeed, ResourceTimingSource, SimulatedSource, TelemetrySource};
pub use types::{RawEvent, Record, ResourceTiming, Severity};
pub use view::{SortDirection, SortKey, ViewQuery};
