//! Seams between the transfer engine and its remote collaborators.

mod traits;

pub use traits::*;
