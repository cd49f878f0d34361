//! Per-SSRC source table, adaptive RTCP scheduler, collision list and
//! outgoing packet builder (spec.md §4.2, §4.3, §4.6, and the packet
//! builder share of §2).

pub mod collision;
pub mod packet_builder;
pub mod record;
pub mod scheduler;
pub mod source;
pub mod table;

pub use collision::CollisionList;
pub use packet_builder::PacketBuilder;
pub use record::{ProbationType, SourceRecord};
pub use scheduler::{RtcpScheduler, SchedulerParams};
pub use source::{Channel, IngestResult, SourceEvent, SourceTable};
pub use table::Table;
