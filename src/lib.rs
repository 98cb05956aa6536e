pub mod error;
pub mod value;
pub mod date;
pub mod binary;
pub mod xml;
pub mod codec;

pub use error::{Error, Result};
pub use value::{Value, Dictionary};
pub use codec::{Format, encode, decode};
