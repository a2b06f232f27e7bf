mod helpers;
mod rupiah;
mod secret;

pub mod op;

pub use helpers::{parse_boolean_flag, parse_env_flag};
pub use rupiah::{Rupiah, RupiahConversionError, IDR_CURRENCY_CODE};
pub use secret::Secret;
