pub mod errors;

pub use errors::{ExitPlaceholder, RelhfError, RelhfErrorCategory, RelhfResult};
