use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Main,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Main => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Identity bootstrap still running; render nothing.
    Pending,
    Redirect(Route),
    Render(Route),
}

pub fn resolve_route(state: SessionState, requested: Route) -> RouteDecision {
    match (state, requested) {
        (SessionState::Uninitialized, _) => RouteDecision::Pending,
        (SessionState::Unauthenticated, Route::Main) => RouteDecision::Redirect(Route::Login),
        (SessionState::Unauthenticated, Route::Login) => RouteDecision::Render(Route::Login),
        (SessionState::Authenticated, Route::Login) => RouteDecision::Redirect(Route::Main),
        (SessionState::Authenticated, Route::Main) => RouteDecision::Render(Route::Main),
    }
}
