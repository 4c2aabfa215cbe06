pub mod result;

pub use result::{QueryResult, Record};
