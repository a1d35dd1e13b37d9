//! Liveness-plane request handler.
//!
//! Runs on its own port with its own worker pool so probes cannot be
//! starved by business-call queues. Built from a read-only view of the
//! role cell plus the node context; it holds no reference back into the
//! registry runtime.

use std::sync::Arc;

use beacon_types::RoleReader;
use beacon_wire::{ErrorCode, Request, RequestPayload, Response, ResponsePayload, UptimeInfo};

use crate::context::NodeContext;
use crate::server::RequestHandler;

/// Handles liveness-plane requests.
pub struct LivenessHandler {
    role: RoleReader,
    ctx: Arc<NodeContext>,
}

impl LivenessHandler {
    pub fn new(role: RoleReader, ctx: Arc<NodeContext>) -> Self {
        Self { role, ctx }
    }
}

impl RequestHandler for LivenessHandler {
    fn handle(&self, request: Request) -> Response {
        match request.payload {
            // A backup answers unavailable so clients move on to another
            // node; the probe itself still proves the process is alive.
            RequestPayload::Ping => {
                if self.role.is_primary() {
                    Response::new(request.id, ResponsePayload::Pong)
                } else {
                    Response::error(request.id, ErrorCode::Unavailable, "node is a backup")
                }
            }

            // Answered regardless of role; the election loop depends on it.
            RequestPayload::GetUptime => Response::new(
                request.id,
                ResponsePayload::Uptime(UptimeInfo {
                    node_id: self.ctx.node_id().clone(),
                    uptime_sec: self.ctx.uptime_secs(),
                }),
            ),

            _ => Response::error(
                request.id,
                ErrorCode::InvalidRequest,
                "business operation sent to the liveness plane",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_types::{Role, RoleCell};
    use beacon_wire::RequestId;

    fn handler(role: Role) -> (LivenessHandler, Arc<NodeContext>) {
        let ctx = Arc::new(NodeContext::new());
        let cell = RoleCell::new(role);
        (LivenessHandler::new(cell.reader(), Arc::clone(&ctx)), ctx)
    }

    #[test]
    fn primary_answers_ping() {
        let (handler, _ctx) = handler(Role::Primary);
        let resp = handler.handle(Request::new(RequestId(1), RequestPayload::Ping));
        assert_eq!(resp.payload, ResponsePayload::Pong);
    }

    #[test]
    fn backup_ping_is_unavailable() {
        let (handler, _ctx) = handler(Role::Backup);
        let resp = handler.handle(Request::new(RequestId(1), RequestPayload::Ping));
        match resp.payload {
            ResponsePayload::Error(e) => assert_eq!(e.code, ErrorCode::Unavailable),
            other => panic!("expected unavailable error, got {other:?}"),
        }
    }

    #[test]
    fn uptime_is_answered_regardless_of_role() {
        let (handler, ctx) = handler(Role::Backup);
        let resp = handler.handle(Request::new(RequestId(1), RequestPayload::GetUptime));
        match resp.payload {
            ResponsePayload::Uptime(info) => {
                assert_eq!(&info.node_id, ctx.node_id());
                assert!(info.uptime_sec >= 0.0);
            }
            other => panic!("expected uptime info, got {other:?}"),
        }
    }

    #[test]
    fn business_ops_are_rejected_on_this_plane() {
        let (handler, _ctx) = handler(Role::Primary);
        let resp = handler.handle(Request::new(RequestId(1), RequestPayload::List));
        match resp.payload {
            ResponsePayload::Error(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
            other => panic!("expected invalid-request error, got {other:?}"),
        }
    }
}
