pub mod event;
pub mod macros;
pub mod records;
pub mod schedule;
pub mod time;

pub use event::*;
pub use records::*;
pub use schedule::*;
pub use time::*;
