pub mod launcher;
pub mod loader;
pub mod tab;

pub use launcher::ChromeDriver;
pub use loader::HttpLoader;
pub use tab::ChromeTab;
