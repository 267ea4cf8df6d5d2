//! Browser session management and the automation driver behind it.

pub mod chromium;
pub mod driver;
pub mod idle;
pub mod navigation;
pub mod scripts;
pub mod session;
pub mod stealth;

#[cfg(test)]
pub mod testing;

pub use driver::{BrowserDriver, BrowserLauncher, PageDriver};
pub use session::Session;
