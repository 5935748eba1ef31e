//! Persistent ordering for the engine's editable collections.
//!
//! [`OrderedList`] keeps rows of one parent in a doubly-linked list;
//! [`Collections`] and [`Params`] are the entity stores built on it.
//! [`Overlay`] layers per-view order, overrides and extra items over the
//! parameters of an origin example.

mod collection;
mod db;
mod error;
pub mod list;
pub mod overlay;
mod param;

pub use collection::{Collection, Collections, COLLECTIONS};
pub use db::{Store, StoreConfig};
pub use error::{ErrorKind, Result, StoreError};
pub use list::{ListProblem, ListReport, ListSchema, OrderedList, Position};
pub use overlay::{ItemSource, Overlay, OverlayItem, ParamPatch};
pub use param::{ParamFields, ParamItem, ParamKind, Params};
