mod driver;

pub use driver::{
    classify_launch_error, PlaywrightBrowser, PlaywrightContext, PlaywrightLauncher,
    PlaywrightPage,
};
