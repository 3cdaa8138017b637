pub mod recover;

pub use recover::CatchPanic;
