pub mod analysis;
pub mod lyrics;
pub mod timeline;
