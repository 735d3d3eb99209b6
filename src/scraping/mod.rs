pub mod browser_manager;
pub mod navigator;
pub mod page;

pub use browser_manager::BrowserSession;
pub use navigator::Navigator;
pub use page::{CdpPage, PortalPage, Selector};
