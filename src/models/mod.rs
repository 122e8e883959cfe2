//! Request and Response models for the admin API
//!
//! DTOs serialized to and from HTTP bodies and query strings.

pub mod requests;
pub mod responses;

pub use requests::{AlertsQuery, ExportQuery, PatternRequest, SetEntryRequest, WindowQuery};
pub use responses::{
    EntryActionResponse, EntryResponse, ErrorResponse, InvalidationResponse, ResolveResponse, StatsResponse,
    TtlResponse,
};
