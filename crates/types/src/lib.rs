// crates/types/src/lib.rs
pub mod error;
pub mod health;
pub mod job;
pub mod profile;
pub mod view;

pub use error::*;
pub use health::*;
pub use job::*;
pub use profile::*;
pub use view::*;
