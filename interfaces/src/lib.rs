pub mod defs;
pub mod empty;
pub mod state;

pub use defs::{BlockedSource, Decision, Notifier, Posting, RunSummary, SourceSpec, Verdict};
pub use empty::LogNotifier;
pub use state::SeenSet;
