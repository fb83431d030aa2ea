//! CIP file parsing functionality

pub mod greyscale;
mod index_parser;
pub mod particle_parser;
mod timestamp_parser;

// Re-export the parsing functions
pub use greyscale::{GreyscaleStream, StreamCursor};
pub use index_parser::{INDEX_HEADER_SIZE, parse_index_header};
pub use particle_parser::parse_particle_record;
pub use timestamp_parser::parse_timestamp;
