//! Configuration, data model and error taxonomy.

pub mod settings;
pub mod types;
pub mod validator;
