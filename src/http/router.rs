//! Path-pattern routing.
//!
//! A router is built from `(pattern, handler)` pairs and dispatches
//! to the first route, in insertion order, whose pattern matches the
//! whole request path. Patterns are regular expressions anchored at
//! both ends. When nothing matches, a `404 Not Found` is written
//! directly.

use std::sync::Arc;

use log::{debug, warn};
use regex::Regex;

use crate::http::error::HttpError;
use crate::http::response::ResponseWriter;
use crate::http::{Handler, Request, StatusCode};

struct Route {
    pattern: String,
    re: Regex,
    handler: Handler,
}

struct Router {
    routes: Vec<Route>,
}

impl Router {
    fn handle(&self, req: &mut Request, resp: &mut ResponseWriter<'_>) -> Result<(), HttpError> {
        debug!("handling path {}", req.path);
        for route in &self.routes {
            debug!("testing route {}", route.pattern);
            if route.re.is_match(&req.path) {
                return (route.handler)(req, resp);
            }
        }
        warn!("no handler for path {}", req.path);
        resp.write_status(StatusCode::NotFound)
    }
}

/// Accumulates routes in insertion order; [`Builder::build`]
/// compiles the patterns and returns the router as a [`Handler`].
#[derive(Default)]
pub struct Builder {
    routes: Vec<(String, Handler)>,
}

pub fn builder() -> Builder {
    Builder::default()
}

impl Builder {
    pub fn route<H>(mut self, pattern: impl Into<String>, handler: H) -> Self
    where
        H: Fn(&mut Request, &mut ResponseWriter<'_>) -> Result<(), HttpError>
            + Send
            + Sync
            + 'static,
    {
        self.routes.push((pattern.into(), Arc::new(handler)));
        self
    }

    pub fn build(self) -> Result<Handler, regex::Error> {
        let routes = self
            .routes
            .into_iter()
            .map(|(pattern, handler)| {
                let re = Regex::new(&format!("^(?:{pattern})$"))?;
                Ok(Route {
                    pattern,
                    re,
                    handler,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let router = Router { routes };
        Ok(Arc::new(
            move |req: &mut Request, resp: &mut ResponseWriter<'_>| router.handle(req, resp),
        ))
    }
}
