// Pure functions that turn a generic `LogRecord` into a sink-specific payload.

pub mod document;
pub mod pattern;
pub mod util;
pub mod value;

pub use document::{default_no_source_location, DocumentBuilder, StandardDocumentBuilder};
pub use pattern::PatternFormatter;
pub use value::{FlatValueBuilder, IndexKeyedValueBuilder, ValueBuilder};
