pub mod access_log;
pub mod file;
pub mod presence;
pub mod room;

pub use access_log::{AccessEvent, AccessLog};
pub use file::{File, FileStatus, ScanStatus};
pub use presence::PresenceRecord;
pub use room::{Room, RoomMode, RoomStatus, RoomSummary};
