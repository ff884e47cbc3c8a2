pub mod daemon;
pub mod fetch;
pub mod menu;
pub mod permissions;
pub mod prefs;
