/*!
CORS for the player pages

Any origin is reflected back, except requests coming from a bare
`localhost` origin which get no CORS headers at all.
*/
use tide::http::Method;

#[derive(Debug, Default, Clone)]
pub struct CorsMiddleware {
    _priv: (),
}

impl CorsMiddleware {
    pub fn new() -> Self {
        Self { _priv: () }
    }
}

/// The origin to echo back in `access-control-allow-origin`, if any
pub fn allowed_origin(origin: Option<&str>) -> Option<String> {
    match origin {
        None => None,
        Some("localhost") => None,
        Some(o) => Some(o.to_string()),
    }
}

#[tide::utils::async_trait]
impl<State: Clone + Send + Sync + 'static> tide::Middleware<State> for CorsMiddleware {
    async fn handle(&self, req: tide::Request<State>, next: tide::Next<'_, State>) -> tide::Result {
        let origin = allowed_origin(req.header("origin").map(|v| v.last().as_str()));
        let origin = match origin {
            None => return Ok(next.run(req).await),
            Some(origin) => origin,
        };

        if req.method() == Method::Options {
            let mut resp = tide::Response::builder(204)
                .header("access-control-allow-origin", origin.as_str())
                .header("access-control-allow-methods", "GET, OPTIONS")
                .header("vary", "Origin")
                .build();
            if let Some(headers) = req.header("access-control-request-headers") {
                resp.insert_header("access-control-allow-headers", headers.last().as_str());
            }
            return Ok(resp);
        }

        let mut resp = next.run(req).await;
        resp.insert_header("access-control-allow-origin", origin.as_str());
        resp.insert_header("vary", "Origin");
        Ok(resp)
    }
}
