pub mod extract;
pub mod manager;
pub mod rule;
pub mod value;

pub use manager::{FilterManager, Side};
pub use rule::{RuleFile, RuleLoadError, SimpleRule};
pub use value::{Condition, Field, FieldValue, ValueType};
