pub mod overload;
pub mod rate_limit;
pub mod request_id;

pub use rate_limit::RouteLimiters;
pub use request_id::request_id_middleware;
