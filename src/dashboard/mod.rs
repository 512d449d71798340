// src/dashboard/mod.rs
//! Web dashboard: one view layer whose actions are switched on by
//! [`Capabilities`](crate::config::Capabilities).

pub mod api;
pub mod render;
pub mod view;

pub use api::{router, AppState};
pub use view::{build_view, filter_keyword, label_color, sentiment_columns, DashboardView};
