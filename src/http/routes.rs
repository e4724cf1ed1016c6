use axum::Router;

use crate::app::AppContext;

/// Trait for composable route modules
///
/// Each module returns a stateless router over [`AppContext`]; state is
/// applied once when the [`App`](crate::App) is served.
pub trait RouteModule {
    fn routes(&self) -> Router<AppContext>
    where
        Self: Sized;

    /// Optional path prefix for all routes in this module
    fn prefix(&self) -> Option<&str> {
        None
    }

    fn register(self, router: Router<AppContext>) -> Router<AppContext>
    where
        Self: Sized,
    {
        let routes = self.routes();

        if let Some(prefix) = self.prefix() {
            router.nest(prefix, routes)
        } else {
            router.merge(routes)
        }
    }
}
