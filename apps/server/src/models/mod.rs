pub mod build_event;

pub use build_event::{should_notify, Action, Build, BuildEvent, EventKind, Repo, System};
