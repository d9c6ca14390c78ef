pub mod checkpoints;
pub mod contents;
pub mod error;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the `/api/contents` routes over the shared state.
///
/// The wildcard route carries both entry paths and their
/// `…/checkpoints[/<id>]` sub-resources; handlers split the suffix
/// themselves since entry paths may contain any number of segments.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route(
      "/api/contents",
      get(contents::get_root)
        .post(contents::post_root)
        .put(contents::put_root)
        .patch(contents::patch_root)
        .delete(contents::delete_root),
    )
    .route(
      "/api/contents/",
      get(contents::get_root)
        .post(contents::post_root)
        .put(contents::put_root)
        .patch(contents::patch_root)
        .delete(contents::delete_root),
    )
    .route(
      "/api/contents/{*path}",
      get(contents::dispatch_get)
        .post(contents::dispatch_post)
        .put(contents::put_entry)
        .patch(contents::patch_entry)
        .delete(contents::dispatch_delete),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
