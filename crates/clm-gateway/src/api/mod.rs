pub mod admin;
pub mod audit;
pub mod auth;
pub mod blueprints;
pub mod credentials;
pub mod drift;
pub mod instances;
pub mod inventory;
pub mod jobs;
pub mod roles;
pub mod schedules;
pub mod services;
pub mod users;
pub mod workspaces;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind [`auth::require_auth`], which accepts either the static
/// system token or a minted per-user access token).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/api/health", get(admin::health))
        .route("/api/readiness", get(admin::readiness))
        .route("/api/auth/status", get(auth::status))
        .route("/api/auth/setup", post(auth::setup))
        .route("/api/auth/login", post(auth::login));

    let protected = Router::new()
        // Jobs
        .route("/api/jobs", get(jobs::list_jobs))
        .route("/api/jobs/:id", get(jobs::get_job))
        .route("/api/jobs/:id/rerun", post(jobs::rerun_job))
        // Services
        .route("/api/services", get(services::list_services))
        .route("/api/services/:service/deploy", post(services::deploy))
        .route("/api/services/:service/stop", post(services::stop))
        .route("/api/services/:service/run/:script", post(services::run_script))
        .route("/api/services/bulk/deploy", post(services::bulk_deploy))
        .route("/api/services/bulk/stop", post(services::bulk_stop))
        // Instances
        .route("/api/instances/:label/stop", post(instances::stop_instance))
        .route("/api/instances/refresh", post(instances::refresh))
        // Schedules
        .route("/api/schedules", get(schedules::list_schedules))
        .route("/api/schedules", post(schedules::create_schedule))
        .route("/api/schedules/:id", get(schedules::get_schedule))
        .route("/api/schedules/:id", put(schedules::update_schedule))
        .route("/api/schedules/:id", delete(schedules::delete_schedule))
        .route("/api/schedules/:id/run-now", post(schedules::run_now))
        .route("/api/schedules/:id/reset-errors", post(schedules::reset_errors))
        // Blueprints
        .route("/api/blueprints", get(blueprints::list_blueprints))
        .route("/api/blueprints", post(blueprints::create_blueprint))
        .route("/api/blueprints/:id", get(blueprints::get_blueprint))
        .route("/api/blueprints/:id", delete(blueprints::delete_blueprint))
        .route("/api/blueprints/:id/deploy", post(blueprints::deploy))
        .route("/api/blueprints/deployments/:id", get(blueprints::get_deployment))
        // Roles
        .route("/api/roles", get(roles::list_roles))
        .route("/api/roles", post(roles::create_role))
        .route("/api/roles/:id", get(roles::get_role))
        .route("/api/roles/:id", put(roles::update_role))
        .route("/api/roles/:id", delete(roles::delete_role))
        // Users
        .route("/api/users", get(users::list_users))
        .route("/api/users/:id", get(users::get_user))
        .route("/api/users/:id/roles", put(users::set_roles))
        .route("/api/users/:id/active", put(users::set_active))
        // Inventory
        .route("/api/inventory/types", get(inventory::list_types))
        .route("/api/inventory/objects", post(inventory::create_object))
        .route("/api/inventory/objects/:id", get(inventory::get_object))
        .route("/api/inventory/objects/:id", delete(inventory::delete_object))
        .route("/api/inventory/:type_slug", get(inventory::list_objects))
        // Workspaces (thin alias over the inventory `workspace` type)
        .route("/api/workspaces", get(workspaces::list_workspaces))
        // Audit / drift / credentials
        .route("/api/audit", get(audit::list_audit))
        .route("/api/drift", get(drift::list_drift))
        .route("/api/drift/:id", get(drift::get_drift))
        .route("/api/credentials/audit", get(credentials::audit))
        // Apply auth middleware to every protected route.
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
