//! Server sidebar ordering: categories, the flat channel list, and drag-and-drop moves.

pub mod categories;
pub mod ordering;
pub mod reorder;

pub use categories::{create_category, delete_category, rename_category, CategoryChange};
pub use ordering::{OrderingError, OrderingState};
pub use reorder::{apply_move, Container, MoveIntent, MoveKind, Reorder};
