//! Git operation monitoring
//!
//! - HEAD transition tracking per repository
//! - Operation classification from the reflog
//! - Monitored file change detection between revisions
//! - Dispatch of qualifying transitions to subscribed listeners

mod classifier;
mod detector;
mod dispatcher;
pub(crate) mod event;
pub(crate) mod tracker;

pub use classifier::ReflogClassifier;
pub use detector::ChangeDetector;
pub use dispatcher::{Dispatcher, Outcome};
pub use event::{EventBus, GitOperationEvent, OperationKind};
