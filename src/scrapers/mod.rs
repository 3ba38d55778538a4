mod kijiji;

pub use kijiji::KijijiScraper;
