mod array;
mod atomic;
pub mod cast;
pub mod datatype;
mod function;
mod map;
mod sequence;
mod sequence_type;
pub mod temporal;

pub use array::XdmArray;
pub use atomic::{AtomicType, AtomicValue, QNameValue, format_decimal, format_double, is_nc_name};
pub use function::FunctionItem;
pub use map::XdmMap;
pub use sequence::{Item, Sequence, SequenceIter, atomize_node, node_string_value};
pub use sequence_type::{ItemType, KindTest, Occurrence, SequenceType};
pub use temporal::{DateTimeValue, DateValue, DurationValue, TimeValue};

pub(crate) use atomic::{collapse_whitespace, double_to_decimal, parse_double};
pub(crate) use map::same_key;
