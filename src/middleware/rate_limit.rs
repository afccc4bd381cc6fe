use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

#[derive(Debug)]
struct Window {
    opened: Instant,
    requests: u32,
}

/// Fixed one-second window limiter shared by every route of a surface.
#[derive(Clone, Debug)]
pub struct SurfaceLimiter {
    max_rps: u32,
    window: Arc<Mutex<Window>>,
}

impl SurfaceLimiter {
    pub fn new(max_rps: u32) -> Self {
        Self {
            max_rps: max_rps.max(1),
            window: Arc::new(Mutex::new(Window {
                opened: Instant::now(),
                requests: 0,
            })),
        }
    }

    fn admit(&self) -> bool {
        let mut window = self.window.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        if now.duration_since(window.opened) >= Duration::from_secs(1) {
            window.opened = now;
            window.requests = 0;
        }
        if window.requests < self.max_rps {
            window.requests += 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(limiter): State<SurfaceLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.admit() {
        return (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded").into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_limit_within_one_window() {
        let limiter = SurfaceLimiter::new(3);
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());
    }
}
