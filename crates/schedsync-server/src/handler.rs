//! Request handling.
//!
//! Every request carries the caller's verified identity alongside it. The
//! handler parses ids, checks the caller against the trainer/student ids
//! the request names, runs the operation and maps failures to wire error
//! codes. Internal details are logged and never returned.

use std::sync::Arc;

use schedsync_calendar::RemoteEvent;
use schedsync_core::{GroupFilter, GroupId, Schedule, ScheduleFilter, TimeWindow, UserId};
use schedsync_protocol::{ErrorCode, ErrorResponse, EventView, Request, Response};
use tracing::{debug, error, warn};

use crate::calendar_sync::CalendarSync;
use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::groups::GroupService;
use crate::schedule::ScheduleWorkflow;

/// Dispatches requests to the services.
#[derive(Clone)]
pub struct RequestHandler {
    schedules: Arc<ScheduleWorkflow>,
    groups: Arc<GroupService>,
    calendar: Arc<CalendarSync>,
}

impl RequestHandler {
    pub fn new(
        schedules: Arc<ScheduleWorkflow>,
        groups: Arc<GroupService>,
        calendar: Arc<CalendarSync>,
    ) -> Self {
        Self {
            schedules,
            groups,
            calendar,
        }
    }

    /// Handles a request on behalf of `caller`.
    ///
    /// A missing caller is rejected before anything else happens.
    pub async fn handle(&self, caller: Option<UserId>, request: Request) -> Response {
        let operation = request.operation();
        let Some(caller) = caller else {
            debug!(operation, "request without caller identity");
            return Response::error(ErrorCode::Unauthenticated, "missing caller identity");
        };

        debug!(operation, caller = %caller, "handling request");
        match self.dispatch(caller, request).await {
            Ok(response) => response,
            Err(err) => error_response(operation, caller, err),
        }
    }

    async fn dispatch(&self, caller: UserId, request: Request) -> ServiceResult<Response> {
        match request {
            Request::CreateSchedule {
                group_id,
                title,
                start,
                end,
                trainer_id,
                student_id,
            } => {
                let group_id = GroupId::parse(&group_id)?;
                let trainer_id = UserId::parse(&trainer_id)?;
                let student_id = UserId::parse(&student_id)?;
                require_caller(caller, &[Some(trainer_id)])?;

                let window = TimeWindow::new(start, end)?;
                let schedule = Schedule::new(group_id, title, window, trainer_id, student_id);
                self.schedules.create_schedule(schedule).await?;
                Ok(Response::Ok)
            }

            Request::CreateScheduleForGroup {
                group_id,
                title,
                start,
                end,
                trainer_id,
            } => {
                let group_id = GroupId::parse(&group_id)?;
                let trainer_id = UserId::parse(&trainer_id)?;
                require_caller(caller, &[Some(trainer_id)])?;

                let window = TimeWindow::new(start, end)?;
                self.schedules
                    .create_schedule_for_group(group_id, title, window, trainer_id)
                    .await?;
                Ok(Response::Ok)
            }

            Request::GetSchedules {
                group_id,
                trainer_id,
                student_id,
            } => {
                let group_id = parse_optional(group_id.as_deref(), GroupId::parse)?;
                let trainer_id = parse_optional(trainer_id.as_deref(), UserId::parse)?;
                let student_id = parse_optional(student_id.as_deref(), UserId::parse)?;
                require_caller(caller, &[trainer_id, student_id])?;

                let filter = ScheduleFilter {
                    group_id,
                    trainer_id,
                    student_id,
                };
                let schedules = self.schedules.get_schedules(filter).await?;
                Ok(Response::Schedules { schedules })
            }

            Request::DeleteSchedule {
                group_id,
                trainer_id,
            } => {
                let group_id = GroupId::parse(&group_id)?;
                let trainer_id = UserId::parse(&trainer_id)?;
                require_caller(caller, &[Some(trainer_id)])?;

                self.schedules.delete_schedule(group_id, trainer_id).await?;
                Ok(Response::Ok)
            }

            Request::CreateGroup { name, trainer_id } => {
                let trainer_id = UserId::parse(&trainer_id)?;
                require_caller(caller, &[Some(trainer_id)])?;

                let group = self.groups.create_group(trainer_id, name).await?;
                Ok(Response::Group { group })
            }

            Request::GetGroups {
                trainer_id,
                student_id,
            } => {
                let trainer_id = parse_optional(trainer_id.as_deref(), UserId::parse)?;
                let student_id = parse_optional(student_id.as_deref(), UserId::parse)?;
                require_caller(caller, &[trainer_id, student_id])?;

                let filter = GroupFilter {
                    trainer_id,
                    student_id,
                };
                let groups = self.groups.get_groups(filter).await?;
                Ok(Response::Groups { groups })
            }

            Request::GetGroup { group_id } => {
                let group_id = GroupId::parse(&group_id)?;
                let group = self.groups.get_group(group_id).await?;
                if !group.is_participant(caller) {
                    return Err(ServiceError::permission_denied(format!(
                        "user {caller} is not in group {group_id}"
                    )));
                }
                Ok(Response::Group { group })
            }

            Request::DeleteGroup {
                group_id,
                trainer_id,
            } => {
                let group_id = GroupId::parse(&group_id)?;
                let trainer_id = UserId::parse(&trainer_id)?;
                require_caller(caller, &[Some(trainer_id)])?;

                self.groups.delete_group(group_id, trainer_id).await?;
                Ok(Response::Ok)
            }

            Request::JoinGroup { student_id, link } => {
                let student_id = UserId::parse(&student_id)?;
                require_caller(caller, &[Some(student_id)])?;
                if link.trim().is_empty() {
                    return Err(ServiceError::invalid_argument("link is required"));
                }

                let group = self.groups.join_group(student_id, link).await?;
                Ok(Response::Group { group })
            }

            Request::LoginUrl => {
                let url = self.calendar.issue_login_url(caller).await;
                Ok(Response::LoginUrl {
                    url: url.unwrap_or_default(),
                })
            }

            Request::Authorize { code, state } => {
                if code.is_empty() {
                    return Err(ServiceError::invalid_argument("code is required"));
                }
                self.calendar.authorize(caller, code, state).await?;
                Ok(Response::Ok)
            }

            Request::IsAuthorized => Ok(Response::Authorized {
                authorized: self.calendar.is_authorized(caller).await,
            }),

            Request::ListEvents { start, end } => {
                let window = TimeWindow::new(start, end)?;
                let events = self
                    .calendar
                    .list_events(caller, window)
                    .await?
                    .into_iter()
                    .map(event_view)
                    .collect();
                Ok(Response::Events { events })
            }
        }
    }
}

/// Rejects the request unless the caller is one of the named ids.
fn require_caller(caller: UserId, allowed: &[Option<UserId>]) -> ServiceResult<()> {
    if allowed.iter().flatten().any(|id| *id == caller) {
        Ok(())
    } else {
        Err(ServiceError::permission_denied(format!(
            "user {caller} may not act for the requested ids"
        )))
    }
}

/// Parses an optional id; absent and empty values both mean "not set".
fn parse_optional<T, E, F>(value: Option<&str>, parse: F) -> Result<Option<T>, E>
where
    F: FnOnce(&str) -> Result<T, E>,
{
    match value {
        Some(value) if !value.is_empty() => parse(value).map(Some),
        _ => Ok(None),
    }
}

fn event_view(event: RemoteEvent) -> EventView {
    EventView {
        id: event.id,
        calendar_id: event.calendar_id,
        title: event.title,
        start: event.start,
        end: event.end,
    }
}

fn error_response(operation: &str, caller: UserId, err: ServiceError) -> Response {
    match err.kind() {
        ErrorKind::InvalidArgument => {
            debug!(operation, caller = %caller, error = %err, "invalid request");
            Response::error(ErrorCode::InvalidArgument, err.to_string())
        }
        ErrorKind::PermissionDenied => {
            warn!(operation, caller = %caller, error = %err, "permission denied");
            Response::error(
                ErrorCode::PermissionDenied,
                ErrorCode::PermissionDenied.description(),
            )
        }
        ErrorKind::Unauthorized => {
            debug!(operation, caller = %caller, error = %err, "calendar not authorized");
            Response::error(ErrorCode::PermissionDenied, "calendar authorization required")
        }
        ErrorKind::NotFound if !err.is_remote_not_found() => {
            Response::error(ErrorCode::NotFound, ErrorCode::NotFound.description())
        }
        _ => {
            error!(operation, caller = %caller, error = %err, "request failed");
            Response::Error {
                error: ErrorResponse::internal(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{EventPublisher, MemoryProducer, PublisherConfig};
    use crate::signals::ShutdownHandle;
    use crate::testing::{GatewayOp, Harness};
    use schedsync_calendar::GatewayError;

    fn handler(h: &Harness) -> RequestHandler {
        let publisher = Arc::new(EventPublisher::new(
            Arc::new(MemoryProducer::new()),
            PublisherConfig::default(),
            ShutdownHandle::new(),
        ));
        let schedules = Arc::new(ScheduleWorkflow::new(
            h.calendar.clone(),
            h.schedules.clone(),
            h.groups.clone(),
            publisher.clone(),
        ));
        let groups = Arc::new(GroupService::new(
            h.groups.clone(),
            h.calendar.clone(),
            publisher,
        ));
        RequestHandler::new(schedules, groups, h.calendar.clone())
    }

    fn code(response: &Response) -> Option<ErrorCode> {
        response.as_error().map(|e| e.code)
    }

    #[tokio::test]
    async fn missing_caller_is_unauthenticated() {
        let h = Harness::new();
        let response = handler(&h).handle(None, Request::IsAuthorized).await;
        assert_eq!(code(&response), Some(ErrorCode::Unauthenticated));
    }

    #[tokio::test]
    async fn malformed_ids_are_invalid_arguments() {
        let h = Harness::new();
        let caller = UserId::generate();
        let response = handler(&h)
            .handle(
                Some(caller),
                Request::DeleteSchedule {
                    group_id: "not-a-uuid".to_string(),
                    trainer_id: caller.to_string(),
                },
            )
            .await;
        assert_eq!(code(&response), Some(ErrorCode::InvalidArgument));
    }

    #[tokio::test]
    async fn booking_for_someone_else_is_denied_before_side_effects() {
        let h = Harness::new();
        let group = h.group_with_students(1).await;
        h.sign_in(group.trainer_id).await;
        let window = h.window();

        let response = handler(&h)
            .handle(
                Some(group.student_ids[0]),
                Request::CreateSchedule {
                    group_id: group.id.to_string(),
                    title: "Deadlifts".to_string(),
                    start: window.start,
                    end: window.end,
                    trainer_id: group.trainer_id.to_string(),
                    student_id: group.student_ids[0].to_string(),
                },
            )
            .await;

        assert_eq!(code(&response), Some(ErrorCode::PermissionDenied));
        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 0);
    }

    #[tokio::test]
    async fn booking_and_listing() {
        let h = Harness::new();
        let group = h.group_with_students(1).await;
        let student = group.student_ids[0];
        h.sign_in(group.trainer_id).await;
        h.sign_in(student).await;
        let handler = handler(&h);
        let window = h.window();

        let response = handler
            .handle(
                Some(group.trainer_id),
                Request::CreateSchedule {
                    group_id: group.id.to_string(),
                    title: "Deadlifts".to_string(),
                    start: window.start,
                    end: window.end,
                    trainer_id: group.trainer_id.to_string(),
                    student_id: student.to_string(),
                },
            )
            .await;
        assert_eq!(response, Response::Ok);

        let response = handler
            .handle(
                Some(student),
                Request::GetSchedules {
                    group_id: None,
                    trainer_id: Some(String::new()),
                    student_id: Some(student.to_string()),
                },
            )
            .await;
        let Response::Schedules { schedules } = response else {
            panic!("unexpected response: {response:?}");
        };
        assert_eq!(schedules.len(), 1);

        let response = handler
            .handle(
                Some(student),
                Request::GetSchedules {
                    group_id: Some(group.id.to_string()),
                    trainer_id: None,
                    student_id: None,
                },
            )
            .await;
        assert_eq!(code(&response), Some(ErrorCode::PermissionDenied));
    }

    #[tokio::test]
    async fn unlinked_calendar_is_reported_without_detail() {
        let h = Harness::new();
        let group = h.group_with_students(1).await;
        let window = h.window();

        let response = handler(&h)
            .handle(
                Some(group.trainer_id),
                Request::CreateScheduleForGroup {
                    group_id: group.id.to_string(),
                    title: "Deadlifts".to_string(),
                    start: window.start,
                    end: window.end,
                    trainer_id: group.trainer_id.to_string(),
                },
            )
            .await;

        let error = response.as_error().unwrap();
        assert_eq!(error.code, ErrorCode::PermissionDenied);
        assert_eq!(error.message, "calendar authorization required");
    }

    #[tokio::test]
    async fn provider_failures_collapse_to_internal() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;
        h.gateway
            .fail_next(GatewayOp::CreateCalendar, GatewayError::server("quota exceeded"));
        let window = h.window();

        let response = handler(&h)
            .handle(
                Some(group.trainer_id),
                Request::CreateScheduleForGroup {
                    group_id: group.id.to_string(),
                    title: "Deadlifts".to_string(),
                    start: window.start,
                    end: window.end,
                    trainer_id: group.trainer_id.to_string(),
                },
            )
            .await;

        let error = response.as_error().unwrap();
        assert_eq!(error.code, ErrorCode::Internal);
        assert_eq!(error.message, "internal error");
    }

    #[tokio::test]
    async fn group_lifecycle() {
        let h = Harness::new();
        let handler = handler(&h);
        let trainer = UserId::generate();
        let student = UserId::generate();

        let response = handler
            .handle(
                Some(trainer),
                Request::CreateGroup {
                    name: "Morning lifts".to_string(),
                    trainer_id: trainer.to_string(),
                },
            )
            .await;
        let Response::Group { group } = response else {
            panic!("unexpected response: {response:?}");
        };

        let response = handler
            .handle(
                Some(trainer),
                Request::JoinGroup {
                    student_id: student.to_string(),
                    link: group.link.clone(),
                },
            )
            .await;
        assert_eq!(code(&response), Some(ErrorCode::PermissionDenied));

        let response = handler
            .handle(
                Some(student),
                Request::JoinGroup {
                    student_id: student.to_string(),
                    link: group.link.clone(),
                },
            )
            .await;
        assert!(response.is_success());

        let response = handler
            .handle(
                Some(student),
                Request::GetGroup {
                    group_id: group.id.to_string(),
                },
            )
            .await;
        assert!(response.is_success());

        let response = handler
            .handle(
                Some(UserId::generate()),
                Request::GetGroup {
                    group_id: group.id.to_string(),
                },
            )
            .await;
        assert_eq!(code(&response), Some(ErrorCode::PermissionDenied));

        let response = handler
            .handle(
                Some(student),
                Request::JoinGroup {
                    student_id: student.to_string(),
                    link: "unknown-link".to_string(),
                },
            )
            .await;
        assert_eq!(code(&response), Some(ErrorCode::NotFound));

        let response = handler
            .handle(
                Some(trainer),
                Request::DeleteGroup {
                    group_id: group.id.to_string(),
                    trainer_id: trainer.to_string(),
                },
            )
            .await;
        assert_eq!(response, Response::Ok);
    }

    #[tokio::test]
    async fn oauth_flow_through_handler() {
        let h = Harness::new();
        let handler = handler(&h);
        let user = UserId::generate();

        let response = handler.handle(Some(user), Request::LoginUrl).await;
        let Response::LoginUrl { url } = response else {
            panic!("unexpected response: {response:?}");
        };
        let state = url.split("state=").nth(1).unwrap().to_string();

        let response = handler
            .handle(
                Some(user),
                Request::Authorize {
                    code: "code".to_string(),
                    state,
                },
            )
            .await;
        assert_eq!(response, Response::Ok);

        let response = handler.handle(Some(user), Request::IsAuthorized).await;
        assert_eq!(response, Response::Authorized { authorized: true });
    }

    #[tokio::test]
    async fn list_events_maps_to_views() {
        let h = Harness::new();
        let user = UserId::generate();
        h.sign_in(user).await;
        let window = h.window();
        h.gateway.set_listed(vec![RemoteEvent {
            id: "evt-1".to_string(),
            calendar_id: "primary".to_string(),
            title: "Deadlifts".to_string(),
            start: window.start,
            end: window.end,
        }]);

        let response = handler(&h)
            .handle(
                Some(user),
                Request::ListEvents {
                    start: window.start,
                    end: window.end,
                },
            )
            .await;

        let Response::Events { events } = response else {
            panic!("unexpected response: {response:?}");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].calendar_id, "primary");
    }

    #[tokio::test]
    async fn inverted_window_is_invalid() {
        let h = Harness::new();
        let user = UserId::generate();
        let window = h.window();

        let response = handler(&h)
            .handle(
                Some(user),
                Request::ListEvents {
                    start: window.end,
                    end: window.start,
                },
            )
            .await;

        assert_eq!(code(&response), Some(ErrorCode::InvalidArgument));
    }
}
