pub mod analytics;
pub mod app;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod errors;
pub mod funnel;
pub mod handlers;
pub mod models;
pub mod outcome;
pub mod profiles;
pub mod report;
pub mod state;
pub mod ui;

pub use app::router;
pub use config::Settings;
pub use dashboard::Dashboard;
pub use state::AppState;
