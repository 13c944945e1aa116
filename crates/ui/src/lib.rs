//! Reactive state store for the browser adapter.
//!
//! A single [`dispatcher::Dispatcher`] routes tagged [`actions::Action`]s to
//! independently-reducing [`slices`]; the [`store::Store`] is the sole
//! mutator of [`slices::UIState`], publishing immutable snapshots that
//! [`selectors::Selector`]s memoize by reference equality and that the
//! [`render_coordinator::RenderCoordinator`] throttles for streaming
//! content. [`effects`] are independent subscribers that perform I/O and
//! dispatch further actions — they never touch state directly.

pub mod actions;
pub mod dispatcher;
pub mod effects;
pub mod reducers;
pub mod render_coordinator;
pub mod selectors;
pub mod slices;
pub mod store;

pub use actions::Action;
pub use dispatcher::Dispatcher;
pub use render_coordinator::RenderCoordinator;
pub use selectors::Selector;
pub use slices::{
    ApprovalState, ConnectionState, ConnectionStatus, MessagesState, SpaceState, StreamingContent,
    StreamingState, TopicsState, UIState,
};
pub use store::Store;
