pub mod auth;
pub mod messages;
pub mod users;

use std::sync::Arc;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
}
