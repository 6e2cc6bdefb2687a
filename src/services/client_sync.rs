//! Client-side view of a match kept in step with the server.
//!
//! A [`MatchSync`] holds the newest version of every game it has seen. Events
//! can arrive late, twice or out of order: a record only replaces the local
//! copy when its version is higher. The event stream is never trusted to be
//! complete, so every (re)connect, lag notice or stale write triggers a full
//! fetch before the client may act again. Projection and queue are rebuilt
//! from scratch on every tick.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{sync::watch, time::sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::matches::GameActionRequest,
    error::ServiceError,
    services::scoring_service,
    state::{
        SharedState,
        game_record::{GameRecord, GameState, Side},
        projector::{MatchProjection, MatchStateProjector},
        queue::ConfirmationQueue,
        sync::{MatchEvent, MatchSubscription, SyncMessage},
    },
};

const RESYNC_INITIAL_DELAY: Duration = Duration::from_millis(250);
const RESYNC_MAX_DELAY: Duration = Duration::from_secs(5);

/// Where a client reads records from and sends confirmations to.
pub trait GameSource: Send + Sync {
    /// Every game of the match.
    fn fetch_games(&self, match_id: Uuid) -> BoxFuture<'static, Result<Vec<GameRecord>, ServiceError>>;
    /// Confirm `game_number` as `member_id`, conditional on `expected_version`.
    fn confirm(
        &self,
        match_id: Uuid,
        game_number: u8,
        member_id: Uuid,
        expected_version: u64,
    ) -> BoxFuture<'static, Result<GameRecord, ServiceError>>;
}

/// [`GameSource`] calling the scoring service in-process.
#[derive(Clone)]
pub struct ServiceGameSource {
    state: SharedState,
}

impl ServiceGameSource {
    /// Wrap the shared application state.
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl GameSource for ServiceGameSource {
    fn fetch_games(&self, match_id: Uuid) -> BoxFuture<'static, Result<Vec<GameRecord>, ServiceError>> {
        let state = self.state.clone();
        Box::pin(async move {
            let store = state.require_store().await?;
            Ok(store.list_games(match_id).await?)
        })
    }

    fn confirm(
        &self,
        match_id: Uuid,
        game_number: u8,
        member_id: Uuid,
        expected_version: u64,
    ) -> BoxFuture<'static, Result<GameRecord, ServiceError>> {
        let state = self.state.clone();
        Box::pin(async move {
            scoring_service::confirm_game(
                &state,
                match_id,
                game_number,
                GameActionRequest {
                    acting_member_id: member_id,
                    expected_version: Some(expected_version),
                },
            )
            .await
        })
    }
}

/// What the client renders after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTick {
    /// Aggregate match state.
    pub projection: MatchProjection,
    /// Games awaiting the viewer.
    pub queue: ConfirmationQueue,
    /// The client must refetch before acting.
    pub stale: bool,
}

/// Confirmation the auto-confirm policy wants to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoConfirm {
    /// Game to confirm.
    pub game_number: u8,
    /// Version the confirmation is conditional on.
    pub version: u64,
}

/// Local, reconciled copy of one match for one viewer.
#[derive(Debug, Clone)]
pub struct MatchSync {
    match_id: Uuid,
    viewer: Side,
    member_id: Uuid,
    projector: MatchStateProjector,
    records: BTreeMap<u8, GameRecord>,
    auto_confirm: bool,
    attempted: HashMap<u8, u64>,
    stale: bool,
}

impl MatchSync {
    /// Start empty and stale: nothing may be acted on before [`MatchSync::reconcile`].
    pub fn new(
        match_id: Uuid,
        viewer: Side,
        member_id: Uuid,
        projector: MatchStateProjector,
    ) -> Self {
        Self {
            match_id,
            viewer,
            member_id,
            projector,
            records: BTreeMap::new(),
            auto_confirm: false,
            attempted: HashMap::new(),
            stale: true,
        }
    }

    /// Match this view tracks.
    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    /// Opt in or out of confirming the other side's submissions automatically.
    pub fn set_auto_confirm(&mut self, enabled: bool) {
        self.auto_confirm = enabled;
    }

    /// Replace the local copy with a full fetch.
    pub fn reconcile(&mut self, records: Vec<GameRecord>) {
        self.records = records
            .into_iter()
            .filter(|record| record.match_id == self.match_id)
            .fold(BTreeMap::new(), |mut latest, record| {
                match latest.get(&record.game_number) {
                    Some(current) if current.version >= record.version => {}
                    _ => {
                        latest.insert(record.game_number, record);
                    }
                }
                latest
            });
        self.stale = false;
    }

    /// Merge one record. Returns whether it replaced the local copy.
    pub fn apply_record(&mut self, record: GameRecord) -> bool {
        if record.match_id != self.match_id {
            return false;
        }
        match self.records.get(&record.game_number) {
            Some(current) if current.version >= record.version => {
                debug!(
                    match_id = %self.match_id,
                    game_number = record.game_number,
                    local = current.version,
                    incoming = record.version,
                    "ignoring outdated game event"
                );
                false
            }
            _ => {
                self.records.insert(record.game_number, record);
                true
            }
        }
    }

    /// Fold a message from the match subscription into the local copy.
    pub fn handle(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::Event(MatchEvent::GameChanged { record }) => {
                self.apply_record(record);
            }
            SyncMessage::Event(_) => {}
            SyncMessage::Resync { missed } => {
                info!(match_id = %self.match_id, missed, "events dropped; resync required");
                self.mark_stale();
            }
        }
    }

    /// Forbid acting until the next full fetch.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Record a failed write; stale writes and rejected transitions mean the
    /// local copy is behind.
    pub fn on_error(&mut self, err: &ServiceError) {
        if err.requires_resync() {
            self.mark_stale();
        }
    }

    /// The local copy needs a full fetch.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The client may issue writes.
    pub fn can_act(&self) -> bool {
        !self.stale
    }

    /// Newest known record of `game_number`.
    pub fn record(&self, game_number: u8) -> Option<&GameRecord> {
        self.records.get(&game_number)
    }

    /// Rebuild projection and queue from the local records.
    pub fn tick(&self) -> SyncTick {
        let records = self.records.values();
        SyncTick {
            projection: self.projector.project(records.clone()),
            queue: ConfirmationQueue::derive(records, self.viewer, self.projector.teams()),
            stale: self.stale,
        }
    }

    /// Confirmations the auto-confirm policy should send now. Each game
    /// version is attempted once.
    pub fn auto_confirm_intents(&mut self) -> Vec<AutoConfirm> {
        if !self.auto_confirm || self.stale {
            return Vec::new();
        }

        let intents: Vec<AutoConfirm> = self
            .records
            .values()
            .filter(|record| {
                record.state()
                    == GameState::Pending {
                        awaiting: self.viewer,
                    }
            })
            .filter(|record| self.attempted.get(&record.game_number) != Some(&record.version))
            .map(|record| AutoConfirm {
                game_number: record.game_number,
                version: record.version,
            })
            .collect();

        for intent in &intents {
            self.attempted.insert(intent.game_number, intent.version);
        }
        intents
    }
}

/// Fetch every game and reconcile.
pub async fn resync(sync: &mut MatchSync, source: &dyn GameSource) -> Result<SyncTick, ServiceError> {
    let records = source.fetch_games(sync.match_id).await?;
    debug!(match_id = %sync.match_id, count = records.len(), "match reconciled");
    sync.reconcile(records);
    Ok(sync.tick())
}

/// Send the confirmations the auto-confirm policy asks for. Stops at the
/// first failure that makes the local copy stale.
pub async fn execute_auto_confirm(
    sync: &mut MatchSync,
    source: &dyn GameSource,
) -> Vec<Result<GameRecord, ServiceError>> {
    let mut outcomes = Vec::new();

    for intent in sync.auto_confirm_intents() {
        let result = source
            .confirm(sync.match_id, intent.game_number, sync.member_id, intent.version)
            .await;
        match &result {
            Ok(record) => {
                info!(
                    match_id = %sync.match_id,
                    game_number = record.game_number,
                    "auto-confirmed game"
                );
                sync.apply_record(record.clone());
            }
            Err(err) => {
                warn!(
                    match_id = %sync.match_id,
                    game_number = intent.game_number,
                    error = %err,
                    "auto-confirm failed"
                );
                sync.on_error(err);
            }
        }
        let stop = sync.is_stale();
        outcomes.push(result);
        if stop {
            break;
        }
    }

    outcomes
}

/// Keep `sync` up to date from `subscription` until it closes, publishing a
/// fresh tick after every message. A failed resync is retried with backoff
/// even when no further message arrives.
pub async fn drive(
    mut sync: MatchSync,
    mut subscription: MatchSubscription,
    source: &dyn GameSource,
    ticks: watch::Sender<SyncTick>,
) -> MatchSync {
    let mut retry_delay = RESYNC_INITIAL_DELAY;

    loop {
        let mut retry_in = None;
        if sync.is_stale() {
            match resync(&mut sync, source).await {
                Ok(_) => retry_delay = RESYNC_INITIAL_DELAY,
                Err(err) => {
                    warn!(
                        match_id = %sync.match_id,
                        error = %err,
                        retry_in_ms = retry_delay.as_millis() as u64,
                        "match resync failed"
                    );
                    retry_in = Some(retry_delay);
                    retry_delay = (retry_delay * 2).min(RESYNC_MAX_DELAY);
                }
            }
        }
        execute_auto_confirm(&mut sync, source).await;
        ticks.send_replace(sync.tick());

        let message = match retry_in {
            Some(delay) => tokio::select! {
                _ = sleep(delay) => continue,
                message = subscription.next() => message,
            },
            None => subscription.next().await,
        };
        match message {
            Some(message) => sync.handle(message),
            None => break,
        }
    }

    subscription.close();
    sync
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;
    use crate::{
        config::AppConfig,
        services::scoring_service::tests::{MATCH_ID, home_win, seeded_state},
        state::{
            game_record::{
                ScoringOptions,
                tests::{
                    AWAY_CAPTAIN, AWAY_TEAM, HOME_TEAM, blank, confirmed_home_win, score_home_win,
                },
            },
            AppState,
            handicap::{HandicapThresholds, MatchFormat, MatchThresholds},
            projector::MatchTeams,
        },
    };

    fn projector() -> MatchStateProjector {
        MatchStateProjector::new(
            MatchTeams {
                home_team_id: HOME_TEAM,
                away_team_id: AWAY_TEAM,
            },
            MatchThresholds {
                home: HandicapThresholds::TIEBREAKER,
                away: HandicapThresholds::TIEBREAKER,
            },
            3,
            true,
        )
    }

    fn away_view() -> MatchSync {
        MatchSync::new(blank(1).match_id, Side::Away, AWAY_CAPTAIN, projector())
    }

    /// Source replaying canned records and counting confirmations.
    #[derive(Default)]
    struct FakeSource {
        games: Vec<GameRecord>,
        confirm_error: bool,
        confirms: Arc<Mutex<Vec<u8>>>,
        /// Fetches still to fail before the source answers.
        failing_fetches: Arc<AtomicU32>,
    }

    impl GameSource for FakeSource {
        fn fetch_games(
            &self,
            _match_id: Uuid,
        ) -> BoxFuture<'static, Result<Vec<GameRecord>, ServiceError>> {
            let failing = self
                .failing_fetches
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            let games = self.games.clone();
            Box::pin(async move {
                if failing {
                    Err(ServiceError::Degraded)
                } else {
                    Ok(games)
                }
            })
        }

        fn confirm(
            &self,
            _match_id: Uuid,
            game_number: u8,
            _member_id: Uuid,
            _expected_version: u64,
        ) -> BoxFuture<'static, Result<GameRecord, ServiceError>> {
            self.confirms.lock().unwrap().push(game_number);
            let fail = self.confirm_error;
            Box::pin(async move {
                if fail {
                    Err(ServiceError::StaleWrite("moved".into()))
                } else {
                    Ok(confirmed_home_win(game_number))
                }
            })
        }
    }

    #[test]
    fn older_versions_never_overwrite_newer_ones() {
        let mut sync = away_view();
        sync.reconcile(vec![blank(1)]);

        let pending = score_home_win(&blank(1), ScoringOptions::default());
        let confirmed = confirmed_home_win(1);
        assert!(sync.apply_record(confirmed.clone()));
        assert!(!sync.apply_record(pending));
        assert!(!sync.apply_record(confirmed.clone()));
        assert_eq!(sync.record(1), Some(&confirmed));
    }

    #[test]
    fn arrival_order_does_not_change_the_tick() {
        let pending_two = score_home_win(&blank(2), ScoringOptions::default());
        let events = [blank(1), confirmed_home_win(1), pending_two.clone(), blank(2)];

        let mut forward = away_view();
        forward.reconcile(Vec::new());
        for record in events.iter().cloned() {
            forward.apply_record(record);
        }

        let mut backward = away_view();
        backward.reconcile(Vec::new());
        for record in events.iter().rev().cloned() {
            backward.apply_record(record);
        }

        assert_eq!(forward.tick(), backward.tick());
        assert_eq!(forward.tick().projection.home_wins, 1);
        assert_eq!(forward.tick().queue.current().map(|item| item.game_number), Some(2));
    }

    #[test]
    fn lag_and_stale_writes_block_actions_until_reconciled() {
        let mut sync = away_view();
        assert!(!sync.can_act());
        sync.reconcile(vec![blank(1)]);
        assert!(sync.can_act());

        sync.handle(SyncMessage::Resync { missed: 2 });
        assert!(!sync.can_act());
        sync.reconcile(vec![blank(1)]);

        sync.on_error(&ServiceError::InvalidOption("both".into()));
        assert!(sync.can_act());
        sync.on_error(&ServiceError::StaleWrite("moved".into()));
        assert!(sync.is_stale());
    }

    #[tokio::test]
    async fn auto_confirm_sends_each_pending_version_once() {
        let confirms = Arc::new(Mutex::new(Vec::new()));
        let source = FakeSource {
            games: vec![
                score_home_win(&blank(2), ScoringOptions::default()),
                score_home_win(&blank(1), ScoringOptions::default()),
                confirmed_home_win(3),
            ],
            confirm_error: false,
            confirms: confirms.clone(),
            ..Default::default()
        };

        let mut sync = away_view();
        sync.set_auto_confirm(true);
        resync(&mut sync, &source).await.unwrap();

        let outcomes = execute_auto_confirm(&mut sync, &source).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(*confirms.lock().unwrap(), vec![1, 2]);
        assert!(sync.tick().queue.is_empty());

        execute_auto_confirm(&mut sync, &source).await;
        assert_eq!(confirms.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_auto_confirm_stops_and_marks_stale() {
        let confirms = Arc::new(Mutex::new(Vec::new()));
        let source = FakeSource {
            games: vec![
                score_home_win(&blank(1), ScoringOptions::default()),
                score_home_win(&blank(2), ScoringOptions::default()),
            ],
            confirm_error: true,
            confirms: confirms.clone(),
            ..Default::default()
        };

        let mut sync = away_view();
        sync.set_auto_confirm(true);
        resync(&mut sync, &source).await.unwrap();

        let outcomes = execute_auto_confirm(&mut sync, &source).await;
        assert_eq!(outcomes.len(), 1);
        assert!(sync.is_stale());
        assert!(sync.auto_confirm_intents().is_empty());
    }

    #[tokio::test]
    async fn driven_client_auto_confirms_live_submissions() {
        let state = seeded_state(MatchFormat::ThreeVThree, true).await;
        let source = ServiceGameSource::new(state.clone());
        let projector = MatchStateProjector::new(
            MatchTeams {
                home_team_id: HOME_TEAM,
                away_team_id: AWAY_TEAM,
            },
            MatchThresholds {
                home: HandicapThresholds {
                    games_to_win: 10,
                    games_to_tie: Some(9),
                    games_to_lose: 8,
                },
                away: HandicapThresholds {
                    games_to_win: 10,
                    games_to_tie: Some(9),
                    games_to_lose: 8,
                },
            },
            18,
            true,
        );
        let mut sync = MatchSync::new(MATCH_ID, Side::Away, AWAY_CAPTAIN, projector);
        sync.set_auto_confirm(true);

        let subscription = state.sync().subscribe(MATCH_ID);
        let (ticks, mut watcher) = watch::channel(sync.tick());
        let driver = tokio::spawn({
            let source = source.clone();
            async move { drive(sync, subscription, &source, ticks).await }
        });

        // Initial reconcile publishes the first tick.
        watcher.changed().await.unwrap();
        scoring_service::score_game(&state, MATCH_ID, 1, home_win(false))
            .await
            .unwrap();

        let confirmed = loop {
            watcher.changed().await.unwrap();
            let tick = watcher.borrow_and_update().clone();
            if tick.projection.home_wins == 1 {
                break tick;
            }
        };
        assert!(confirmed.queue.is_empty());
        assert!(!confirmed.stale);

        let record = state
            .require_store()
            .await
            .unwrap()
            .find_game(MATCH_ID, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.confirmed_by_away, Some(AWAY_CAPTAIN));

        driver.abort();
    }

    #[tokio::test]
    async fn failed_resync_is_retried_without_new_events() {
        let failing_fetches = Arc::new(AtomicU32::new(2));
        let source = FakeSource {
            games: vec![score_home_win(&blank(1), ScoringOptions::default())],
            failing_fetches: failing_fetches.clone(),
            ..Default::default()
        };
        let state = AppState::new(AppConfig::default());
        let sync = away_view();
        let subscription = state.sync().subscribe(sync.match_id);
        let (ticks, mut watcher) = watch::channel(sync.tick());

        let driver = tokio::spawn(async move { drive(sync, subscription, &source, ticks).await });

        let reconciled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                watcher.changed().await.unwrap();
                let tick = watcher.borrow_and_update().clone();
                if !tick.stale {
                    break tick;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(failing_fetches.load(Ordering::SeqCst), 0);
        assert_eq!(reconciled.queue.current().map(|item| item.game_number), Some(1));

        driver.abort();
    }
}
