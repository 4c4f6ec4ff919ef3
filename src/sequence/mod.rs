pub mod parser;
pub mod records;
pub mod source;

pub use parser::SequenceParser;
pub use records::load_records;
pub use source::{is_remote, SequenceFetcher, SourceFetcher};
