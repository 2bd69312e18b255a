pub mod notifier;
pub mod observer;
pub mod snapshot;

pub use notifier::ProgressNotifier;
pub use observer::{CallbackObserver, ProgressObserver};
pub use snapshot::{format_duration, ProgressSnapshot};
