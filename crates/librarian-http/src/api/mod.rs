//! Request handlers, one module per protocol area. Grounded on
//! `snow-owl-http/src/api.rs`'s handler shape (`State<AppState>` +
//! `Json<Request>` in, `Result<Json<Response>, ApiError>` out), split across
//! files since this surface is considerably larger than the teacher's.

pub mod checkin;
pub mod clone;
pub mod ping;
pub mod search;
pub mod upload;
pub mod validate;
