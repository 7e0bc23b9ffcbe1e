//! Category management used by the server settings page.

use shared::{domain::CategoryId, protocol::{Category, ServerEdit}};

use crate::ordering::{OrderingError, OrderingState};

/// Next ordering after a category edit, plus the edit that persists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryChange {
    pub state: OrderingState,
    pub persist: ServerEdit,
}

impl CategoryChange {
    fn from_state(state: OrderingState) -> Self {
        let persist = state.categories_edit();
        Self { state, persist }
    }
}

/// Appends a new, empty category.
pub fn create_category(
    current: &OrderingState,
    id: CategoryId,
    title: impl Into<String>,
) -> Result<CategoryChange, OrderingError> {
    if current.category(&id).is_some() {
        return Err(OrderingError::DuplicateCategory(id));
    }
    let mut state = current.clone();
    state.categories.push(Category::new(id, title));
    Ok(CategoryChange::from_state(state))
}

pub fn rename_category(
    current: &OrderingState,
    id: &CategoryId,
    title: impl Into<String>,
) -> Result<CategoryChange, OrderingError> {
    let index = current
        .category_index(id)
        .ok_or_else(|| OrderingError::UnknownCategory(id.clone()))?;
    let mut state = current.clone();
    state.categories[index].title = title.into();
    Ok(CategoryChange::from_state(state))
}

/// Removes a category. Its channels fall back to the uncategorized zone in
/// their flat-list order.
pub fn delete_category(
    current: &OrderingState,
    id: &CategoryId,
) -> Result<CategoryChange, OrderingError> {
    let index = current
        .category_index(id)
        .ok_or_else(|| OrderingError::UnknownCategory(id.clone()))?;
    let mut state = current.clone();
    state.categories.remove(index);
    Ok(CategoryChange::from_state(state))
}

#[cfg(test)]
mod tests {
    use shared::domain::ChannelId;

    use super::*;

    fn state() -> OrderingState {
        OrderingState::new(
            vec![Category::new("x", "Text").with_channels(["b", "c"])],
            vec!["a".into(), "b".into(), "c".into()],
        )
    }

    #[test]
    fn create_appends_empty_category() {
        let change = create_category(&state(), CategoryId::new("y"), "Voice").expect("create");
        assert_eq!(change.state.categories.len(), 2);
        assert!(change.state.categories[1].channels.is_empty());
        assert!(change.persist.channels.is_none());
    }

    #[test]
    fn create_rejects_existing_id() {
        let err = create_category(&state(), CategoryId::new("x"), "Again").expect_err("dup");
        assert_eq!(err, OrderingError::DuplicateCategory(CategoryId::new("x")));
    }

    #[test]
    fn rename_keeps_channels() {
        let change = rename_category(&state(), &CategoryId::new("x"), "Chat").expect("rename");
        assert_eq!(change.state.categories[0].title, "Chat");
        assert_eq!(change.state.categories[0].channels.len(), 2);
    }

    #[test]
    fn delete_releases_channels_to_uncategorized() {
        let change = delete_category(&state(), &CategoryId::new("x")).expect("delete");
        assert!(change.state.categories.is_empty());
        assert_eq!(
            change.state.uncategorized(),
            vec![ChannelId::new("a"), ChannelId::new("b"), ChannelId::new("c")]
        );
    }

    #[test]
    fn unknown_category_is_reported() {
        assert!(matches!(
            delete_category(&state(), &CategoryId::new("nope")),
            Err(OrderingError::UnknownCategory(_))
        ));
    }
}
