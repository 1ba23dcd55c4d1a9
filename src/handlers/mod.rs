pub mod access_logs;
pub mod analytics;
pub mod bulk;
pub mod download;
pub mod files;
pub mod invite;
pub mod room_access;
pub mod rooms;
pub mod upload;
