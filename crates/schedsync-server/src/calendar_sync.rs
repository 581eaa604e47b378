//! Calendar sync orchestration.
//!
//! [`CalendarSync`] owns the token lifecycle and the group to calendar
//! mapping. Callers ask for an outcome ("this event exists in the user's
//! calendar") and the orchestrator handles expired tokens and calendars
//! deleted on the provider side.
//!
//! # Recovery policy
//!
//! Every operation makes one attempt. A failure gets at most one recovery
//! per failure class, followed by one re-attempt:
//!
//! - `Unauthorized` from the provider: refresh the session, retry once
//! - An access token already past its expiry: refresh before the first call
//! - `NotFound` while creating: provision a new calendar, rebind, retry once
//! - `NotFound` while deleting: nothing left to delete, success
//!
//! A session whose refresh token is rejected is kept in the store. The
//! user stays degraded until a fresh authorization replaces it.

use std::sync::Arc;

use schedsync_calendar::{BoxFuture, CalendarGateway, GatewayResult, OAuthToken, RemoteEvent};
use schedsync_core::{CalendarEvent, GroupId, TimeWindow, UserId};
use tracing::{debug, info, warn};

use crate::credentials::{AuthState, CredentialVault};
use crate::error::{ServiceError, ServiceResult};
use crate::store::{CalendarBindingStore, GroupStore};

/// The token an operation is currently using.
struct SessionAttempt {
    user_id: UserId,
    token: OAuthToken,
    /// Set once the single refresh allowed per operation has been spent.
    refreshed: bool,
}

/// Token lifecycle and per-group calendar mapping.
pub struct CalendarSync {
    gateway: Arc<dyn CalendarGateway>,
    vault: CredentialVault,
    bindings: Arc<dyn CalendarBindingStore>,
    groups: Arc<dyn GroupStore>,
}

impl CalendarSync {
    /// Creates an orchestrator over the given gateway and stores.
    pub fn new(
        gateway: Arc<dyn CalendarGateway>,
        vault: CredentialVault,
        bindings: Arc<dyn CalendarBindingStore>,
        groups: Arc<dyn GroupStore>,
    ) -> Self {
        Self {
            gateway,
            vault,
            bindings,
            groups,
        }
    }

    /// Issues a consent URL for the user.
    ///
    /// Returns `None` if the login state could not be recorded; callers
    /// should try again later.
    pub async fn issue_login_url(&self, user_id: UserId) -> Option<String> {
        let state = AuthState::generate();
        if let Err(err) = self.vault.put_auth_state(user_id, &state).await {
            warn!(user_id = %user_id, error = %err, "failed to store login state");
            return None;
        }
        debug!(user_id = %user_id, provider = self.gateway.name(), "issued login url");
        Some(self.gateway.login_url(&state.nonce))
    }

    /// Completes the OAuth callback for the user.
    pub async fn authorize(
        &self,
        user_id: UserId,
        code: String,
        presented_state: String,
    ) -> ServiceResult<()> {
        match self.vault.auth_state(user_id).await? {
            Some(state) if state.matches(&presented_state) => {}
            Some(_) => {
                warn!(user_id = %user_id, "login state mismatch");
                return Err(ServiceError::unauthorized("login state mismatch"));
            }
            None => {
                return Err(ServiceError::unauthorized("no pending login"));
            }
        }

        let token = match self.gateway.exchange_code(code.clone()).await {
            Ok(token) => token,
            Err(err) if err.is_unauthorized() => {
                let Some(session) = self.vault.session(user_id).await? else {
                    return Err(err.into());
                };
                debug!(user_id = %user_id, "code exchange rejected, refreshing known session once");
                self.refresh_session(user_id, session).await?;
                self.gateway.exchange_code(code).await?
            }
            Err(err) => return Err(err.into()),
        };

        self.vault.delete_auth_state(user_id).await?;
        self.vault.put_session(user_id, &token).await?;
        info!(user_id = %user_id, "calendar authorized");
        Ok(())
    }

    /// Returns true if the user has a stored session. Never touches the network.
    pub async fn is_authorized(&self, user_id: UserId) -> bool {
        match self.vault.session(user_id).await {
            Ok(session) => session.is_some(),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "failed to read session");
                false
            }
        }
    }

    /// Makes sure the event exists in the group's calendar of the user.
    ///
    /// Returns the provider event id, or `None` when the calendar vanished
    /// again right after being recreated.
    pub async fn ensure_event_created(
        &self,
        user_id: UserId,
        group_id: GroupId,
        event: &CalendarEvent,
    ) -> ServiceResult<Option<String>> {
        let mut attempt = self.begin(user_id).await?;

        let calendar_id = match self.bindings.calendar_for(group_id).await? {
            Some(calendar_id) => calendar_id,
            None => self.provision_calendar(&mut attempt, group_id).await?,
        };

        match self.create_in(&mut attempt, calendar_id, event).await {
            Ok(event_id) => Ok(Some(event_id)),
            Err(err) if err.is_remote_not_found() => {
                warn!(
                    user_id = %user_id,
                    group_id = %group_id,
                    "bound calendar is gone, recreating"
                );
                let calendar_id = self.provision_calendar(&mut attempt, group_id).await?;
                match self.create_in(&mut attempt, calendar_id, event).await {
                    Ok(event_id) => Ok(Some(event_id)),
                    Err(err) if err.is_remote_not_found() => {
                        warn!(
                            user_id = %user_id,
                            group_id = %group_id,
                            "recreated calendar not found, skipping event"
                        );
                        Ok(None)
                    }
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Makes sure the event no longer exists in the group's calendar.
    pub async fn ensure_event_deleted(
        &self,
        user_id: UserId,
        group_id: GroupId,
        event_id: String,
    ) -> ServiceResult<()> {
        let mut attempt = self.begin(user_id).await?;

        let Some(calendar_id) = self.bindings.calendar_for(group_id).await? else {
            debug!(group_id = %group_id, "no calendar bound, nothing to delete");
            return Ok(());
        };

        let gateway = self.gateway.as_ref();
        let deleted = self
            .call_with_refresh(&mut attempt, |token| {
                gateway.delete_event(token, calendar_id.clone(), event_id.clone())
            })
            .await;

        match deleted {
            Err(err) if err.is_remote_not_found() => {
                debug!(event_id = %event_id, "event already gone");
                Ok(())
            }
            other => other,
        }
    }

    /// Lists the user's events in the window across their calendars.
    pub async fn list_events(
        &self,
        user_id: UserId,
        window: TimeWindow,
    ) -> ServiceResult<Vec<RemoteEvent>> {
        let mut attempt = self.begin(user_id).await?;
        let gateway = self.gateway.as_ref();
        self.call_with_refresh(&mut attempt, |token| gateway.list_events(token, window))
            .await
    }

    /// Forgets the calendar bound to a deleted group.
    pub async fn release_group(&self, group_id: GroupId) -> ServiceResult<()> {
        self.bindings.unbind(group_id).await?;
        Ok(())
    }

    async fn begin(&self, user_id: UserId) -> ServiceResult<SessionAttempt> {
        let token = self
            .vault
            .session(user_id)
            .await?
            .ok_or_else(|| ServiceError::unauthorized(format!("no session for user {user_id}")))?;
        Ok(SessionAttempt {
            user_id,
            token,
            refreshed: false,
        })
    }

    async fn create_in(
        &self,
        attempt: &mut SessionAttempt,
        calendar_id: String,
        event: &CalendarEvent,
    ) -> ServiceResult<String> {
        let gateway = self.gateway.as_ref();
        self.call_with_refresh(attempt, |token| {
            gateway.create_event(token, calendar_id.clone(), event.clone())
        })
        .await
    }

    /// Creates a calendar named after the group and binds it, replacing
    /// any previous binding.
    async fn provision_calendar(
        &self,
        attempt: &mut SessionAttempt,
        group_id: GroupId,
    ) -> ServiceResult<String> {
        let group = self.groups.group(group_id).await?;
        let gateway = self.gateway.as_ref();
        let calendar_id = self
            .call_with_refresh(attempt, |token| {
                gateway.create_calendar(token, group.name.clone())
            })
            .await?;

        self.bindings.bind(group_id, calendar_id.clone()).await?;
        info!(group_id = %group_id, calendar_id = %calendar_id, "bound group calendar");
        Ok(calendar_id)
    }

    /// Runs a gateway call, refreshing the session and retrying once if
    /// the access token is rejected.
    ///
    /// A token known to be expired is refreshed up front instead. Either
    /// way the refresh is spent per operation: a later rejection anywhere
    /// in the same operation propagates.
    async fn call_with_refresh<'g, T, F>(
        &self,
        attempt: &mut SessionAttempt,
        call: F,
    ) -> ServiceResult<T>
    where
        F: Fn(OAuthToken) -> BoxFuture<'g, GatewayResult<T>>,
    {
        if !attempt.refreshed
            && attempt.token.is_expired()
            && attempt.token.refresh_token.is_some()
        {
            debug!(user_id = %attempt.user_id, "access token expired, refreshing before the call");
            attempt.refreshed = true;
            attempt.token = self
                .refresh_session(attempt.user_id, attempt.token.clone())
                .await?;
        }

        match call(attempt.token.clone()).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_unauthorized() && !attempt.refreshed => {
                debug!(user_id = %attempt.user_id, "access token rejected, refreshing once");
                attempt.refreshed = true;
                attempt.token = self
                    .refresh_session(attempt.user_id, attempt.token.clone())
                    .await?;
                Ok(call(attempt.token.clone()).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Refreshes and stores the session. A rejected refresh keeps the old one.
    async fn refresh_session(
        &self,
        user_id: UserId,
        token: OAuthToken,
    ) -> ServiceResult<OAuthToken> {
        match self.gateway.refresh_token(token).await {
            Ok(fresh) => {
                self.vault.put_session(user_id, &fresh).await?;
                debug!(user_id = %user_id, "session refreshed");
                Ok(fresh)
            }
            Err(err) => {
                if err.is_unauthorized() {
                    warn!(
                        user_id = %user_id,
                        "refresh token rejected, session degraded until re-authorization"
                    );
                }
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GatewayOp, Harness};
    use schedsync_calendar::GatewayError;

    #[tokio::test]
    async fn authorize_with_matching_state() {
        let h = Harness::new();
        let user = UserId::generate();

        let url = h.calendar.issue_login_url(user).await.unwrap();
        let state = h.vault.auth_state(user).await.unwrap().unwrap();
        assert!(url.contains(&state.nonce));
        assert!(!h.calendar.is_authorized(user).await);

        h.calendar
            .authorize(user, "code".to_string(), state.nonce.clone())
            .await
            .unwrap();
        assert!(h.calendar.is_authorized(user).await);
        assert_eq!(h.vault.auth_state(user).await.unwrap(), None);

        let err = h
            .calendar
            .authorize(user, "code".to_string(), state.nonce)
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.gateway.calls(GatewayOp::Exchange), 1);
    }

    #[tokio::test]
    async fn authorize_rejects_mismatched_state() {
        let h = Harness::new();
        let user = UserId::generate();
        h.calendar.issue_login_url(user).await.unwrap();

        let err = h
            .calendar
            .authorize(user, "code".to_string(), "forged".to_string())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(h.gateway.calls(GatewayOp::Exchange), 0);
        assert!(h.vault.auth_state(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn authorize_refreshes_known_session_once() {
        let h = Harness::new();
        let user = UserId::generate();
        h.sign_in(user).await;
        h.calendar.issue_login_url(user).await.unwrap();
        let state = h.vault.auth_state(user).await.unwrap().unwrap();
        h.gateway
            .fail_next(GatewayOp::Exchange, GatewayError::unauthorized("invalid_grant"));

        h.calendar
            .authorize(user, "code".to_string(), state.nonce)
            .await
            .unwrap();

        assert_eq!(h.gateway.calls(GatewayOp::Exchange), 2);
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 1);
        let session = h.vault.session(user).await.unwrap().unwrap();
        assert_eq!(session.access_token, "access-from-code");
    }

    #[tokio::test]
    async fn authorize_without_session_propagates_rejection() {
        let h = Harness::new();
        let user = UserId::generate();
        h.calendar.issue_login_url(user).await.unwrap();
        let state = h.vault.auth_state(user).await.unwrap().unwrap();
        h.gateway
            .fail_next(GatewayOp::Exchange, GatewayError::unauthorized("invalid_grant"));

        let err = h
            .calendar
            .authorize(user, "code".to_string(), state.nonce)
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(h.gateway.calls(GatewayOp::Exchange), 1);
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 0);
        assert!(!h.calendar.is_authorized(user).await);
    }

    #[tokio::test]
    async fn login_url_is_none_when_state_cannot_be_stored() {
        let h = Harness::with_credentials(Arc::new(crate::testing::BrokenCredentialStore));
        assert_eq!(h.calendar.issue_login_url(UserId::generate()).await, None);
    }

    #[tokio::test]
    async fn first_event_provisions_group_calendar() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;

        let event_id = h
            .calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap();

        assert_eq!(event_id.as_deref(), Some("evt-1"));
        assert_eq!(h.gateway.calendar_titles(), vec![group.name.clone()]);
        assert_eq!(
            h.bindings.calendar_for(group.id).await.unwrap().as_deref(),
            Some("cal-1")
        );

        h.calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap();
        assert_eq!(h.gateway.calls(GatewayOp::CreateCalendar), 1);
    }

    #[tokio::test]
    async fn missing_calendar_is_recreated_and_rebound() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;

        h.calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap();
        h.gateway
            .fail_next(GatewayOp::CreateEvent, GatewayError::not_found("calendar deleted"));

        let event_id = h
            .calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap();

        assert!(event_id.is_some());
        assert_eq!(h.gateway.calls(GatewayOp::CreateCalendar), 2);
        assert_eq!(
            h.bindings.calendar_for(group.id).await.unwrap().as_deref(),
            Some("cal-2")
        );
        let last = h.gateway.created_events().pop().unwrap();
        assert_eq!(last.calendar_id, "cal-2");
    }

    #[tokio::test]
    async fn second_not_found_is_a_no_op() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;
        h.bindings.bind(group.id, "stale".to_string()).await.unwrap();
        h.gateway
            .fail_next(GatewayOp::CreateEvent, GatewayError::not_found("gone"));
        h.gateway
            .fail_next(GatewayOp::CreateEvent, GatewayError::not_found("gone again"));

        let event_id = h
            .calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap();

        assert_eq!(event_id, None);
        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 2);
        assert_eq!(h.gateway.calls(GatewayOp::CreateCalendar), 1);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;
        h.bindings.bind(group.id, "cal-x".to_string()).await.unwrap();
        h.gateway
            .fail_next(GatewayOp::CreateEvent, GatewayError::unauthorized("expired"));

        h.calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap();

        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 2);
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 1);
        let session = h.vault.session(group.trainer_id).await.unwrap().unwrap();
        assert_eq!(session.access_token, "access-refreshed-1");
        assert_eq!(
            h.gateway.created_events()[0].access_token,
            "access-refreshed-1"
        );
    }

    #[tokio::test]
    async fn known_expired_token_is_refreshed_before_calling() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        let mut token = OAuthToken::from_response("access-stale", Some("refresh".into()), Some(0));
        assert!(token.is_expired());
        h.vault.put_session(group.trainer_id, &token).await.unwrap();
        h.bindings.bind(group.id, "cal-x".to_string()).await.unwrap();

        h.calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap();

        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 1);
        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 1);
        assert_eq!(
            h.gateway.created_events()[0].access_token,
            "access-refreshed-1"
        );

        // Without a refresh token the stale access token is still tried.
        token.refresh_token = None;
        h.vault.put_session(group.trainer_id, &token).await.unwrap();
        h.calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap();
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 1);
        assert_eq!(h.gateway.created_events()[1].access_token, "access-stale");
    }

    #[tokio::test]
    async fn expired_token_rejected_after_refresh_propagates() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        let token = OAuthToken::from_response("access-stale", Some("refresh".into()), Some(0));
        h.vault.put_session(group.trainer_id, &token).await.unwrap();
        h.bindings.bind(group.id, "cal-x".to_string()).await.unwrap();
        h.gateway
            .fail_next(GatewayOp::CreateEvent, GatewayError::unauthorized("revoked"));

        let err = h
            .calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 1);
        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 1);
    }

    #[tokio::test]
    async fn stale_refresh_token_stops_after_one_attempt() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;
        h.bindings.bind(group.id, "cal-x".to_string()).await.unwrap();
        h.gateway
            .fail_next(GatewayOp::CreateEvent, GatewayError::unauthorized("expired"));
        h.gateway
            .fail_next(GatewayOp::Refresh, GatewayError::unauthorized("invalid_grant"));

        let err = h
            .calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 1);
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 1);
        // Degraded: the session is kept.
        assert!(h.calendar.is_authorized(group.trainer_id).await);
    }

    #[tokio::test]
    async fn refresh_is_spent_per_operation() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;
        h.gateway
            .fail_next(GatewayOp::CreateCalendar, GatewayError::unauthorized("expired"));
        h.gateway
            .fail_next(GatewayOp::CreateEvent, GatewayError::unauthorized("expired again"));

        let err = h
            .calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 1);
        assert_eq!(h.gateway.calls(GatewayOp::CreateCalendar), 2);
        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 1);
    }

    #[tokio::test]
    async fn create_without_session_is_unauthorized() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;

        let err = h
            .calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 0);
    }

    #[tokio::test]
    async fn other_errors_propagate_unchanged() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;
        h.bindings.bind(group.id, "cal-x".to_string()).await.unwrap();
        h.gateway
            .fail_next(GatewayOp::CreateEvent, GatewayError::server("503"));

        let err = h
            .calendar
            .ensure_event_created(group.trainer_id, group.id, &h.event())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Gateway(ref e) if e.message() == "503"));
        assert_eq!(h.gateway.calls(GatewayOp::CreateEvent), 1);
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 0);
    }

    #[tokio::test]
    async fn deleting_absent_event_succeeds() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;

        // No binding yet.
        h.calendar
            .ensure_event_deleted(group.trainer_id, group.id, "evt-9".to_string())
            .await
            .unwrap();
        assert_eq!(h.gateway.calls(GatewayOp::DeleteEvent), 0);

        h.bindings.bind(group.id, "cal-x".to_string()).await.unwrap();
        h.gateway
            .fail_next(GatewayOp::DeleteEvent, GatewayError::not_found("gone"));
        h.calendar
            .ensure_event_deleted(group.trainer_id, group.id, "evt-9".to_string())
            .await
            .unwrap();
        assert_eq!(h.gateway.calls(GatewayOp::DeleteEvent), 1);
    }

    #[tokio::test]
    async fn delete_refreshes_once() {
        let h = Harness::new();
        let group = h.group_with_students(0).await;
        h.sign_in(group.trainer_id).await;
        h.bindings.bind(group.id, "cal-x".to_string()).await.unwrap();
        h.gateway
            .fail_next(GatewayOp::DeleteEvent, GatewayError::unauthorized("expired"));

        h.calendar
            .ensure_event_deleted(group.trainer_id, group.id, "evt-1".to_string())
            .await
            .unwrap();

        assert_eq!(h.gateway.calls(GatewayOp::DeleteEvent), 2);
        assert_eq!(h.gateway.calls(GatewayOp::Refresh), 1);
    }

    #[tokio::test]
    async fn list_events_uses_session() {
        let h = Harness::new();
        let user = UserId::generate();
        h.sign_in(user).await;
        h.gateway
            .fail_next(GatewayOp::ListEvents, GatewayError::unauthorized("expired"));

        let events = h.calendar.list_events(user, h.window()).await.unwrap();

        assert!(events.is_empty());
        assert_eq!(h.gateway.calls(GatewayOp::ListEvents), 2);
    }

    #[tokio::test]
    async fn release_group_unbinds() {
        let h = Harness::new();
        let group = GroupId::generate();
        h.bindings.bind(group, "cal-x".to_string()).await.unwrap();

        h.calendar.release_group(group).await.unwrap();

        assert_eq!(h.bindings.calendar_for(group).await.unwrap(), None);
    }
}
