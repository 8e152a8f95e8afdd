//! Integration with external types.
//!
//! Implementation of [`FromValue`][f] and conversion into [`Value`][v] for external types.
//!
//! Available for:
//!
//! - [`serde`]'s [`Deserialize`][sd] and [`Serialize`][ss] via [`Json`], requires `json` feature
//! - [`time`][::time]'s [`PrimitiveDateTime`][tp], [`UtcDateTime`][tu] and [`Date`][td], requires `time` feature
//!
//! [f]: crate::value::FromValue
//! [v]: crate::value::Value
//! [sd]: serde::Deserialize
//! [ss]: serde::Serialize
//! [tp]: ::time::PrimitiveDateTime
//! [tu]: ::time::UtcDateTime
//! [td]: ::time::Date

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "json")]
pub use json::Json;

#[cfg(feature = "time")]
mod time;
