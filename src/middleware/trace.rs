use tracing::{debug, info};

use crate::error::Result;
use crate::middleware::{Middleware, RequestContext};
use crate::request::Request;
use crate::response::Response;

/// Logs one line per dispatched request: method, route, status, latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn before(&self, req: &mut Request) -> Result<()> {
        debug!(
            method = %req.method(),
            path = req.path(),
            route = req.route().map(|r| r.route().pattern()),
            "dispatching"
        );
        Ok(())
    }

    fn after(&self, ctx: &RequestContext, res: Response) -> Result<Response> {
        info!(
            method = %ctx.method(),
            path = ctx.path(),
            route = ctx.route().map(|r| r.route().pattern()),
            status = res.status_code().as_u16(),
            latency_us = ctx.started().elapsed().as_micros() as u64,
            "request handled"
        );
        Ok(res)
    }
}
