// src/db/models/mod.rs

//! Entity models over the SQLite schema

mod package;
mod repository;
mod session;
mod token;

pub use package::{Package, Version};
pub use repository::{Repository, RepositoryStatus, SourceType};
pub use session::Session;
pub use token::{Permission, Token};
