//! Business-plane request handler.
//!
//! Routes CRUD and heartbeat operations to the store, gating writes on the
//! node's role: only the primary accepts direct client writes, while
//! replication echoes (`is_replication = true`) bypass the role check,
//! apply with [`Origin::Replica`], and are never forwarded again.

use std::sync::Arc;

use tracing::{debug, info, warn};

use beacon_store::Store;
use beacon_types::{ObjectRecord, Origin, RoleReader};
use beacon_wire::{
    ErrorCode, GetResponse, HeartbeatAck, ObjectInfo, ObjectListResponse, RegisterRequest, Request,
    RequestId, Response, ResponsePayload,
};

use crate::replication::{Replicator, WriteOp};
use crate::server::RequestHandler;

/// Handles business-plane requests against the local store.
pub struct BusinessHandler {
    store: Arc<Store>,
    role: RoleReader,
    replicator: Arc<Replicator>,
}

impl BusinessHandler {
    pub fn new(store: Arc<Store>, role: RoleReader, replicator: Arc<Replicator>) -> Self {
        Self {
            store,
            role,
            replicator,
        }
    }

    fn record_from(&self, req: &RegisterRequest, origin: Origin) -> ObjectRecord {
        ObjectRecord::new(
            req.address.clone(),
            req.language.clone(),
            req.version.clone(),
            req.region.clone(),
            origin,
        )
    }

    fn handle_register(&self, id: RequestId, reg: RegisterRequest) -> Response {
        if reg.is_replication {
            self.store
                .put(&reg.name, self.record_from(&reg, Origin::Replica));
            debug!(name = %reg.name, "applied replicated register");
            return Response::new(id, ResponsePayload::Ack { success: true });
        }
        if !self.role.is_primary() {
            return Response::error(id, ErrorCode::NotLeader, "not the leader");
        }

        self.store
            .put(&reg.name, self.record_from(&reg, Origin::Local));
        info!(name = %reg.name, address = %reg.address, "registered object");
        self.replicator.replicate(&WriteOp::Register(reg));
        Response::new(id, ResponsePayload::Ack { success: true })
    }

    fn handle_update(&self, id: RequestId, reg: RegisterRequest) -> Response {
        if reg.is_replication {
            // Applied as an upsert so a backup that missed the original
            // register still converges.
            self.store
                .put(&reg.name, self.record_from(&reg, Origin::Replica));
            debug!(name = %reg.name, "applied replicated update");
            return Response::new(id, ResponsePayload::Ack { success: true });
        }
        if !self.role.is_primary() {
            return Response::error(id, ErrorCode::NotLeader, "not the leader");
        }
        if self.store.get(&reg.name).is_none() {
            warn!(name = %reg.name, "update for unknown object");
            return Response::new(id, ResponsePayload::Ack { success: false });
        }

        self.store
            .put(&reg.name, self.record_from(&reg, Origin::Local));
        info!(name = %reg.name, address = %reg.address, "updated object");
        self.replicator.replicate(&WriteOp::Update(reg));
        Response::new(id, ResponsePayload::Ack { success: true })
    }
}

impl RequestHandler for BusinessHandler {
    fn handle(&self, request: Request) -> Response {
        use beacon_wire::RequestPayload;

        let id = request.id;
        match request.payload {
            RequestPayload::Register(reg) => self.handle_register(id, reg),
            RequestPayload::Update(reg) => self.handle_update(id, reg),

            RequestPayload::Deregister(dereg) => {
                if dereg.is_replication {
                    let removed = self.store.delete(&dereg.name);
                    debug!(name = %dereg.name, removed, "applied replicated deregister");
                    return Response::new(id, ResponsePayload::Ack { success: removed });
                }
                if !self.role.is_primary() {
                    return Response::error(id, ErrorCode::NotLeader, "not the leader");
                }

                let removed = self.store.delete(&dereg.name);
                if removed {
                    info!(name = %dereg.name, "deregistered object");
                    self.replicator.replicate(&WriteOp::Deregister(dereg));
                } else {
                    debug!(name = %dereg.name, "deregister for unknown object");
                }
                Response::new(id, ResponsePayload::Ack { success: removed })
            }

            RequestPayload::Get(get) => {
                let address = self
                    .store
                    .get(&get.name)
                    .map(|rec| rec.address)
                    .unwrap_or_default();
                debug!(name = %get.name, found = !address.is_empty(), "lookup");
                Response::new(id, ResponsePayload::Get(GetResponse { address }))
            }

            RequestPayload::List => {
                let objects: Vec<ObjectInfo> = self
                    .store
                    .list()
                    .into_iter()
                    .map(|(name, rec)| ObjectInfo {
                        name,
                        address: rec.address,
                        language: rec.language,
                        version: rec.version,
                        region: rec.region,
                        last_seen: rec.last_seen,
                    })
                    .collect();
                debug!(count = objects.len(), "list");
                Response::new(id, ResponsePayload::List(ObjectListResponse { objects }))
            }

            RequestPayload::Heartbeat(ping) => {
                // A heartbeat refreshes a record's TTL, so like every other
                // write it only means something on the primary: touching a
                // replica would not keep the authoritative copy alive.
                if !self.role.is_primary() {
                    return Response::error(id, ErrorCode::NotLeader, "not the leader");
                }
                let ok = self.store.touch(&ping.name);
                if ok {
                    debug!(name = %ping.name, "heartbeat");
                } else {
                    debug!(name = %ping.name, "heartbeat rejected, object not found");
                }
                Response::new(id, ResponsePayload::Heartbeat(HeartbeatAck { ok }))
            }

            RequestPayload::Ping | RequestPayload::GetUptime => Response::error(
                id,
                ErrorCode::InvalidRequest,
                "liveness operation sent to the business plane",
            ),
        }
    }
}
