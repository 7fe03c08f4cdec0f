mod data_type;
mod element;

pub use data_type::DataType;
pub use element::{CastInto, Element};
