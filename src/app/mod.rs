//! Presentation layer.
//!
//! Screens are plain state holders: they own their live subscriptions,
//! apply incoming snapshots, and call the repositories in response to user
//! actions. Rendering is left to whatever front end drives them.

mod busy;
mod class_detail;
mod class_list;

pub use busy::{BusyFlag, BusyGuard};
pub use class_detail::{ClassDetailScreen, FolderView, ItemKind, PendingDelete, RenameState};
pub use class_list::{ClassListScreen, ClassRow};

/// Navigation target returned by screen actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The list of all classes.
    ClassList,
    /// One class, by code.
    ClassDetail(String),
}

/// Title shown for a class.
pub fn class_title(code: &str) -> String {
    format!("Class {code}")
}
