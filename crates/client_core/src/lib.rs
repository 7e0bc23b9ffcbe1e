//! Client-side services around the sidebar engine: persistence boundary,
//! the sidebar controller, application stores and the modal stack.

pub mod controller;
pub mod editor;
pub mod error;
pub mod modals;
pub mod stores;

pub use controller::{DragOutcome, SidebarController, SidebarEvent};
pub use editor::{ServerEditor, StorageServerEditor};
pub use error::SidebarError;
pub use modals::{ModalController, ModalEvent, ModalRequest};
pub use stores::{ApplicationState, ChangelogEntry, ChangelogStore, LayoutStore, StateChanged};
