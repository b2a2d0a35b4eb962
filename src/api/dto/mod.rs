//! Data Transfer Objects for REST request/response serialization.
//!
//! Domain read models serialize directly; the types here cover request
//! bodies and the composite response shapes the handlers build.

pub mod allocation_dto;
pub mod common_dto;
pub mod event_dto;
pub mod ledger_dto;
pub mod member_dto;

pub use allocation_dto::*;
pub use common_dto::*;
pub use event_dto::*;
pub use ledger_dto::*;
pub use member_dto::*;
