//! One fan-out cycle: scan events, scan users, score every pair and push a
//! notification for each pair inside the falloff radius.
//!
//! Runs are stateless. Unchanged inputs produce the same set of pairs, and
//! re-sent notifications collapse on the device through their dedupe tag.

use crate::db::store::{EventStore, UserStore};
use crate::error::StoreFetchError;
use crate::models::event::Event;
use crate::models::notification::{dedupe_tag, NotificationMessage};
use crate::models::user::User;
use crate::processor::danger::{Assessment, DangerLevel, DangerScorer};
use crate::push::PushGateway;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub page_size: i64,
    pub max_in_flight: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_in_flight: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNotification {
    pub user_id: String,
    pub event_id: String,
    pub assessment: Assessment,
    pub message: NotificationMessage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub events_scanned: usize,
    pub users_scanned: usize,
    pub planned: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct NotificationDispatcher<E, U, P> {
    events: E,
    users: U,
    gateway: P,
    scorer: DangerScorer,
    settings: DispatchSettings,
}

impl<E, U, P> NotificationDispatcher<E, U, P>
where
    E: EventStore,
    U: UserStore,
    P: PushGateway,
{
    pub fn new(
        events: E,
        users: U,
        gateway: P,
        scorer: DangerScorer,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            events,
            users,
            gateway,
            scorer,
            settings,
        }
    }

    /// Scores the full cross product lazily and yields every pair above
    /// zero, user by user. Opted-out users, users without a token and users
    /// without a known location are never planned.
    pub fn planned<'a>(
        &'a self,
        events: &'a [Event],
        users: &'a [User],
    ) -> impl Iterator<Item = PlannedNotification> + 'a {
        users
            .iter()
            .filter_map(|user| {
                let token = user.push_target()?;
                let Some((lat, lon)) = user.location() else {
                    debug!("User {} has no known location, skipping", user.user_id);
                    return None;
                };
                Some((user, token, lat, lon))
            })
            .flat_map(move |(user, token, lat, lon)| {
                events.iter().filter_map(move |event| {
                    let assessment = self.scorer.assess(event, lat, lon);
                    (assessment.score > 0).then(|| PlannedNotification {
                        user_id: user.user_id.clone(),
                        event_id: event.event_id.clone(),
                        assessment,
                        message: build_message(event, token, assessment),
                    })
                })
            })
    }

    pub fn plan(&self, events: &[Event], users: &[User]) -> Vec<PlannedNotification> {
        self.planned(events, users).collect()
    }

    /// FETCH_EVENTS -> FETCH_USERS -> SCORE_AND_DISPATCH. A failed scan
    /// returns before anything is sent.
    pub async fn try_run(&self) -> Result<DispatchReport, StoreFetchError> {
        let events = self.events.scan_all(self.settings.page_size).await?;
        debug!("Loaded {} events", events.len());

        let users = self.users.scan_all(self.settings.page_size).await?;
        debug!("Loaded {} users", users.len());

        let (sent, failed) = self.dispatch(self.planned(&events, &users)).await;

        Ok(DispatchReport {
            events_scanned: events.len(),
            users_scanned: users.len(),
            planned: sent + failed,
            sent,
            failed,
        })
    }

    /// Fire-and-forget entry point for the scheduler and the ingestion hook.
    /// Outcomes only reach the logs.
    pub async fn run(&self) {
        let run_id = Uuid::new_v4();
        info!("Starting notification dispatch run {}", run_id);
        match self.try_run().await {
            Ok(report) => info!(
                "Dispatch run {} finished: events={} users={} planned={} sent={} failed={}",
                run_id,
                report.events_scanned,
                report.users_scanned,
                report.planned,
                report.sent,
                report.failed
            ),
            Err(e) => error!("Dispatch run {} aborted, nothing sent: {}", run_id, e),
        }
    }

    /// Sends with at most `max_in_flight` requests outstanding. Pairs are
    /// pulled from `planned` only as slots free up, so no more than that many
    /// messages exist at once. Every send captures its own error so one
    /// failure never stops the rest.
    async fn dispatch<I>(&self, planned: I) -> (usize, usize)
    where
        I: IntoIterator<Item = PlannedNotification>,
    {
        let limit = self.settings.max_in_flight.max(1);

        stream::iter(planned)
            .map(move |p| async move {
                match self.gateway.send(&p.message).await {
                    Ok(()) => {
                        debug!("Notified user {} about event {}", p.user_id, p.event_id);
                        true
                    }
                    Err(e) => {
                        warn!(
                            "Push failed for user {} event {} (score {}): {}",
                            p.user_id, p.event_id, p.assessment.score, e
                        );
                        false
                    }
                }
            })
            .buffer_unordered(limit)
            .fold((0, 0), |(sent, failed), ok| async move {
                if ok {
                    (sent + 1, failed)
                } else {
                    (sent, failed + 1)
                }
            })
            .await
    }
}

fn build_message(event: &Event, token: &str, assessment: Assessment) -> NotificationMessage {
    let level = match assessment.level() {
        DangerLevel::Extreme => "Extreme danger",
        DangerLevel::High => "High danger",
        DangerLevel::Moderate => "Moderate danger",
        DangerLevel::Low | DangerLevel::None => "Low danger",
    };
    let name = event.display_name();
    let km = assessment.distance_m / 1000.0;

    NotificationMessage {
        target_token: token.to_string(),
        title: format!("{}: {}", level, name),
        body: format!(
            "{} reported about {:.0} km from your last known location. Danger level {}/100.",
            name, km, assessment.score
        ),
        dedupe_tag: dedupe_tag(&event.event_id),
        event_id: event.event_id.clone(),
        danger_score: assessment.score,
    }
}
