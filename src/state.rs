use std::sync::Arc;

use crate::auth::services::UserService;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserService>,
}

impl AppState {
    pub fn new(users: Arc<dyn UserService>) -> Self {
        Self { users }
    }
}
