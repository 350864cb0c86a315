use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

/// Controller/action labels of the route that served a request. Known only
/// after dispatch, so they travel back on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLabels {
    pub controller: String,
    pub action: String,
}

impl RouteLabels {
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
        }
    }

    /// Derives labels from a route template: the first literal segment is the
    /// controller, the method plus template is the action.
    pub fn from_route(method: &str, template: &str) -> Self {
        let controller = template
            .split('/')
            .find(|segment| !segment.is_empty() && !segment.starts_with(':') && !segment.starts_with('*'))
            .unwrap_or("/");
        Self::new(controller, format!("{method} {template}"))
    }
}

/// Route-layer middleware that stamps [`RouteLabels`] onto the response
/// unless the handler already set its own.
pub async fn route_labels(matched: Option<MatchedPath>, request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let mut response = next.run(request).await;
    if response.extensions().get::<RouteLabels>().is_none() {
        if let Some(matched) = matched {
            response
                .extensions_mut()
                .insert(RouteLabels::from_route(&method, matched.as_str()));
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_come_from_the_first_literal_segment() {
        let labels = RouteLabels::from_route("POST", "/orders/:id/items");
        assert_eq!(labels.controller, "orders");
        assert_eq!(labels.action, "POST /orders/:id/items");

        assert_eq!(RouteLabels::from_route("GET", "/").controller, "/");
        assert_eq!(RouteLabels::from_route("GET", "/:tenant/users").controller, "users");
    }
}
