//! Persisted key vocabulary.
//!
//! The content application only ever persists these keys through the
//! bridge. The session injects exactly this set at startup.

/// Registered users (JSON array).
pub const USERS: &str = "sairyne_users";
/// Pointer to the signed-in user.
pub const CURRENT_USER: &str = "sairyne_current_user";
/// Access token of the signed-in user.
pub const ACCESS_TOKEN: &str = "sairyne_access_token";
/// Project list (JSON array).
pub const PROJECTS: &str = "sairyne_projects";
/// Currently selected project id.
pub const SELECTED_PROJECT: &str = "sairyne_selected_project";
/// Chat/UI state snapshot.
pub const CHAT_STATE: &str = "sairyne_functional_chat_state_v1";
/// Value written by the wrapper page to check the save pipeline end to end.
pub const SMOKE_TEST: &str = "sairyne_smoke_test";

/// Keys injected into the content context at startup, in injection order.
pub const DEFAULT_PERSISTED_KEYS: &[&str] = &[
    USERS,
    CURRENT_USER,
    ACCESS_TOKEN,
    PROJECTS,
    SELECTED_PROJECT,
    CHAT_STATE,
    SMOKE_TEST,
];
