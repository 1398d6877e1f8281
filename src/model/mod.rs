pub mod analysis;
pub mod color;
pub mod project;
pub mod timeline;

// Re-export commonly used types at the model level.
pub use analysis::{AudioAnalysis, BeatAnalysis, LyricWord, LyricsAnalysis, SongSection, StructureAnalysis};
pub use color::Color;
pub use project::Project;
pub use timeline::{InsertReport, Segment, TimeRange, Timeline};
