/*!
 * Ethernity Core
 *
 * Tipos, erros e contratos compartilhados para a workspace Ethernity
 */

pub mod alert;
pub mod types;
pub mod traits;
pub mod utils;
pub mod error;

// Re-exportações públicas
pub use alert::*;
pub use error::{Error, Result};
pub use types::*;
