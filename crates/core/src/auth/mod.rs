mod error;
mod gate;
mod types;

pub use error::AuthError;
pub use gate::{check, permitted_types};
pub use types::{Operation, VaccinePermissions};
