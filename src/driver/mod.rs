pub mod traits;
pub mod web;

pub use traits::{
    Browser, BrowserLauncher, BrowserType, BrowsingContext, ContextOptions, LaunchOptions, Page,
    VideoSize, DEFAULT_VIDEO_SIZE,
};
