//! Command handlers.
//!
//! Each handler decodes its payload, calls exactly one service operation
//! and reports the outcome: one broadcast event on success, one error to the
//! originator on failure.

use super::{Dispatcher, HandlerContext};
use crate::entity::{EntityKind, Record};
use crate::error::ServiceError;
use crate::protocol::{
    self, command_type, BuildingCommandPayload, Envelope, EventVerb, IdPayload,
    SkillAssignmentPayload, UpdatePayload,
};
use crate::service::{BuildingService, EntityService, Services, SkillService};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

/// Wire every command type to its service.
pub fn register_all(dispatcher: &mut Dispatcher, services: &Services) {
    register_crud(dispatcher, Arc::clone(&services.buildings));
    register_crud(dispatcher, Arc::clone(&services.agents));
    register_crud(dispatcher, Arc::clone(&services.skills));
    register_crud(dispatcher, Arc::clone(&services.secrets));
    register_crud(dispatcher, Arc::clone(&services.custom_classes));

    let buildings = Arc::clone(&services.buildings);
    dispatcher.register(
        protocol::BUILDING_COMMAND,
        move |ctx: HandlerContext, payload: Value| {
            building_command(Arc::clone(&buildings), ctx, payload)
        },
    );

    let skills = Arc::clone(&services.skills);
    dispatcher.register(
        protocol::ASSIGN_SKILL,
        move |ctx: HandlerContext, payload: Value| assign_skill(Arc::clone(&skills), ctx, payload),
    );

    let skills = Arc::clone(&services.skills);
    dispatcher.register(
        protocol::UNASSIGN_SKILL,
        move |ctx: HandlerContext, payload: Value| {
            unassign_skill(Arc::clone(&skills), ctx, payload)
        },
    );

    let services = services.clone();
    dispatcher.register(protocol::SYNC, move |ctx: HandlerContext, _payload: Value| {
        sync(services.clone(), ctx)
    });
}

/// Register `create_<kind>`, `update_<kind>` and `delete_<kind>` for one service.
pub fn register_crud<S: EntityService>(dispatcher: &mut Dispatcher, service: Arc<S>) {
    let kind = <S::Entity as Record>::KIND;

    let svc = Arc::clone(&service);
    dispatcher.register(
        command_type(EventVerb::Created, kind),
        move |ctx: HandlerContext, payload: Value| create(Arc::clone(&svc), ctx, payload),
    );

    let svc = Arc::clone(&service);
    dispatcher.register(
        command_type(EventVerb::Updated, kind),
        move |ctx: HandlerContext, payload: Value| update(Arc::clone(&svc), ctx, payload),
    );

    dispatcher.register(
        command_type(EventVerb::Deleted, kind),
        move |ctx: HandlerContext, payload: Value| delete(Arc::clone(&service), ctx, payload),
    );
}

pub async fn create<S: EntityService>(service: Arc<S>, ctx: HandlerContext, payload: Value) {
    let result = decode::<<S::Entity as Record>::Draft>(payload)
        .and_then(|draft| service.create(draft));
    respond(&ctx, <S::Entity as Record>::KIND, EventVerb::Created, result);
}

pub async fn update<S: EntityService>(service: Arc<S>, ctx: HandlerContext, payload: Value) {
    let result = decode::<UpdatePayload<<S::Entity as Record>::Patch>>(payload)
        .and_then(|request| service.update(request.id.trim(), request.updates));
    respond(&ctx, <S::Entity as Record>::KIND, EventVerb::Updated, result);
}

pub async fn delete<S: EntityService>(service: Arc<S>, ctx: HandlerContext, payload: Value) {
    let result = decode::<IdPayload>(payload)
        .and_then(|request| service.delete(request.id.trim()))
        .map(|removed| IdPayload {
            id: removed.id().to_string(),
        });
    respond(&ctx, <S::Entity as Record>::KIND, EventVerb::Deleted, result);
}

pub async fn building_command(
    buildings: Arc<BuildingService>,
    ctx: HandlerContext,
    payload: Value,
) {
    let result = match decode::<BuildingCommandPayload>(payload) {
        Ok(request) => {
            buildings
                .execute(request.building_id.trim(), request.command)
                .await
        }
        Err(e) => Err(e),
    };
    respond(&ctx, EntityKind::Building, EventVerb::Updated, result);
}

pub async fn assign_skill(skills: Arc<SkillService>, ctx: HandlerContext, payload: Value) {
    let result = decode::<SkillAssignmentPayload>(payload)
        .and_then(|request| skills.assign(request.skill_id.trim(), request.agent_id.trim()));
    respond(&ctx, EntityKind::Skill, EventVerb::Updated, result);
}

pub async fn unassign_skill(skills: Arc<SkillService>, ctx: HandlerContext, payload: Value) {
    let result = decode::<SkillAssignmentPayload>(payload)
        .and_then(|request| skills.unassign(request.skill_id.trim(), request.agent_id.trim()));
    respond(&ctx, EntityKind::Skill, EventVerb::Updated, result);
}

/// Reply to the requester alone with a full snapshot.
pub async fn sync(services: Services, ctx: HandlerContext) {
    match Envelope::snapshot(&services.snapshot()) {
        Ok(snapshot) => ctx.reply(snapshot),
        Err(e) => {
            error!(error = %e, "Failed to serialize snapshot");
            ctx.send_error(&ServiceError::Internal("snapshot unavailable".to_string()));
        }
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, ServiceError> {
    Ok(serde_json::from_value(payload)?)
}

/// Broadcast the `<kind>_<verb>` event on success, or report the error to
/// the originator. Never both.
pub fn respond<T: Serialize>(
    ctx: &HandlerContext,
    kind: EntityKind,
    verb: EventVerb,
    result: Result<T, ServiceError>,
) {
    let event = result.and_then(|value| {
        Envelope::event(kind, verb, &value).map_err(|e| {
            error!(error = %e, "Failed to serialize event");
            ServiceError::Internal("event could not be encoded".to_string())
        })
    });

    match event {
        Ok(event) => ctx.broadcast(event),
        Err(err) => ctx.send_error(&err),
    }
}
