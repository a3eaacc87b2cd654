//! Declarative payload construction over normalized analytics messages.
//!
//! A [`MappingTable`] is an ordered list of rules that read values out of a
//! message through dot-separated [`Path`]s and write them into an output
//! record. Tables are parsed and validated once when they are loaded, so
//! building a payload never has to re-check the table shape.

pub mod errors;
pub mod fields;
pub mod flatten;
pub mod mapping;
pub mod names;
pub mod path;
pub mod resolver;
pub mod template;

pub use errors::MappingError;
pub use fields::FieldTable;
pub use flatten::flatten_json;
pub use mapping::{MappingRule, MappingTable, construct};
pub use names::split_full_name;
pub use path::Path;
pub use resolver::{SourceKeys, resolve};
pub use template::Template;
