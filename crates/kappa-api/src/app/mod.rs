//! Application state shared by every handler.

pub(crate) mod state;
