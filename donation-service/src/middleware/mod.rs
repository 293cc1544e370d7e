pub mod capability;

pub use capability::{require_edit_posts, UserContext, EDIT_POSTS};
