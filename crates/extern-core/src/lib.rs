pub mod errors;
pub mod events;
pub mod fragment;
pub mod surface;
pub mod view;

pub use errors::ExternError;
pub use events::{EventSink, SessionEvent, Topic, TopicKind};
pub use fragment::{Fragment, FragmentDetails};
pub use surface::{MemorySurface, RenderSurface};
pub use view::{Component, ErrorView, LoadingView, Node, Props};
