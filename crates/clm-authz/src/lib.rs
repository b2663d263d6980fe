//! Multi-layer authorization engine for CloudLab Manager.
//!
//! Grounded on the layered RBAC design in `examples/original_source/app/
//! {inventory_auth,service_auth,credential_access}.py`, backed here by
//! `clm-store`'s entity tables instead of SQLAlchemy queries.

pub mod cache;
pub mod credential;
pub mod inventory;
pub mod permissions;
pub mod service;

pub use cache::PermissionCache;
pub use permissions::{get_user_permissions, has_permission, seed_super_admin_role};
