pub mod app;
pub mod config;
pub mod error;
pub mod notifications;
pub mod api {
    pub mod errors;
    pub mod follows;
    pub mod posts;
    pub mod search;
    pub mod tasks;
    pub mod users;
}
pub mod db {
    pub mod memory;
    pub mod models;
    pub mod record;
    pub mod session;
    pub mod store;
    pub mod unit_of_work;
}
pub mod email {
    pub mod mailer;
}
pub mod search {
    pub mod client;
    pub mod memory;
    pub mod registry;
    pub mod searchable;
    pub mod sync;
}
pub mod tasks {
    pub mod export;
    pub mod progress;
    pub mod queue;
}
