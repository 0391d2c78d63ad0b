//! Built-in gatherers.

mod media_sized;
mod mutation_events;
mod scrolling;
mod url;

pub use media_sized::{MediaSizedGatherer, UNSIZED_MEDIA_SCRIPT};
pub use mutation_events::MutationEventsGatherer;
pub use scrolling::{ScrollingGatherer, SCROLL_SCRIPT};
pub use url::UrlGatherer;
