/*!
Request logging middleware
*/
use crate::LOG;

#[derive(Debug, Default, Clone)]
pub struct LogMiddleware {
    _priv: (),
}

impl LogMiddleware {
    pub fn new() -> Self {
        Self { _priv: () }
    }
}

#[tide::utils::async_trait]
impl<State: Clone + Send + Sync + 'static> tide::Middleware<State> for LogMiddleware {
    async fn handle(&self, req: tide::Request<State>, next: tide::Next<'_, State>) -> tide::Result {
        let path = req.url().path().to_owned();
        let method = req.method().to_string();
        let start = std::time::Instant::now();
        let response = next.run(req).await;
        let status = response.status() as u16;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if status >= 500 {
            let error = response
                .error()
                .map(|e| e.to_string())
                .unwrap_or_default();
            slog::error!(
                LOG, "request failed";
                "method" => method, "path" => path, "status" => status,
                "elapsed_ms" => elapsed_ms, "error" => error,
            );
        } else if status >= 400 {
            slog::warn!(
                LOG, "request rejected";
                "method" => method, "path" => path, "status" => status,
                "elapsed_ms" => elapsed_ms,
            );
        } else {
            slog::info!(
                LOG, "request";
                "method" => method, "path" => path, "status" => status,
                "elapsed_ms" => elapsed_ms,
            );
        }
        Ok(response)
    }
}
