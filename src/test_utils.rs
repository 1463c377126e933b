//! Test doubles for the crawler's capability traits
//!
//! In-memory `PageSession`, `Store`, `AuditLedger` and `WorkUnitSource`
//! implementations with scripted failures, so the executor and orchestrator
//! can be exercised without a browser or a database.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::{
    AuditLedger, AuditRecord, ElementHandle, LedgerError, NormalizedRowSet, PageSession, PersistError,
    SessionError, SessionFactory, SourceError, Store, WorkUnit, WorkUnitSource,
};

/// Canned markup
pub mod fixtures {
    /// Team batting table with a repeated header row and two summary rows
    pub const BATTING_TABLE: &str = r#"<div class="table_container" id="div_team_batting">
<table class="stats_table sortable" id="team_batting">
  <caption>Team Player Standard Batting Table</caption>
  <thead>
    <tr><th>Rk</th><th>Pos</th><th>Name</th><th>Age</th><th>2B</th><th>SB</th><th>SB%</th><th>OPS+</th></tr>
  </thead>
  <tbody>
    <tr><th>1</th><td>C</td><td>Gary Sanchez</td><td>27</td><td>8</td><td>1</td><td>50.0</td><td>91</td></tr>
    <tr class="thead"><th>Rk</th><th>Pos</th><th>Name</th><th>Age</th><th>2B</th><th>SB</th><th>SB%</th><th>OPS+</th></tr>
    <tr><th>2</th><td>2B</td><td>DJ LeMahieu</td><td>32</td><td>10</td><td>3</td><td></td><td>177</td></tr>
    <tr><th></th><td></td><td>Rank in 15 AL teams</td><td></td><td>4</td><td>9</td><td></td><td>2</td></tr>
  </tbody>
  <tfoot>
    <tr><th></th><td></td><td>Team Totals</td><td>28.9</td><td>18</td><td>4</td><td>80.0</td><td>112</td></tr>
  </tfoot>
</table>
</div>"#;

    /// Platoon split table; no rank or name column
    pub const SPLITS_TABLE: &str = r#"<table class="stats_table" id="plato">
  <thead><tr><th>Split</th><th>G</th><th>PA</th><th>BA</th><th>OPS</th></tr></thead>
  <tbody>
    <tr><th>vs RHP</th><td>120</td><td>3412</td><td>.244</td><td>.760</td></tr>
    <tr><th>vs LHP</th><td>98</td><td>1503</td><td>.251</td><td>.771</td></tr>
  </tbody>
</table>"#;

    /// Full page whose second table only exists inside an HTML comment
    pub const COMMENTED_PAGE: &str = r#"<html><body>
<div id="all_team_batting">
<table id="team_batting"><thead><tr><th>Rk</th><th>Name</th><th>HR</th></tr></thead>
<tbody><tr><th>1</th><td>Aaron Judge</td><td>39</td></tr></tbody></table>
</div>
<div id="all_players_baserunning_batting">
<!--
<table id="players_baserunning_batting"><thead><tr><th>Name</th><th>SB</th></tr></thead>
<tbody><tr><td>Aaron Judge</td><td>6</td></tr></tbody></table>
-->
</div>
</body></html>"#;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct SiteScript {
    /// url fragment -> remaining failures
    navigate_timeouts: HashMap<String, usize>,
    navigate_panics: HashSet<String>,
    /// (url fragment, locator)
    element_timeouts: HashSet<(String, String)>,
    markup: HashMap<String, String>,
    latency: Duration,
}

#[derive(Default)]
struct SiteLog {
    navigations: Vec<String>,
    busy_sessions: HashSet<usize>,
    overlap_violations: usize,
    in_flight: usize,
    peak_in_flight: usize,
}

/// A scripted website shared by every `MockPageSession`
#[derive(Default)]
pub struct MockSite {
    script: Mutex<SiteScript>,
    log: Mutex<SiteLog>,
    closed: AtomicUsize,
}

impl MockSite {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next `times` navigations to a URL containing `url_fragment` time out.
    pub fn fail_navigation(&self, url_fragment: &str, times: usize) {
        lock(&self.script).navigate_timeouts.insert(url_fragment.to_string(), times);
    }

    /// Navigations to a URL containing `url_fragment` panic.
    pub fn panic_on_navigation(&self, url_fragment: &str) {
        lock(&self.script).navigate_panics.insert(url_fragment.to_string());
    }

    /// `locator` never resolves on pages whose URL contains `url_fragment`.
    pub fn fail_element(&self, url_fragment: &str, locator: &str) {
        lock(&self.script)
            .element_timeouts
            .insert((url_fragment.to_string(), locator.to_string()));
    }

    /// Markup returned for `locator`; defaults to `fixtures::BATTING_TABLE`.
    pub fn set_markup(&self, locator: &str, markup: &str) {
        lock(&self.script).markup.insert(locator.to_string(), markup.to_string());
    }

    /// Delay added to every navigation.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.script).latency = latency;
    }

    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.log).navigations.clone()
    }

    #[must_use]
    pub fn navigation_count(&self, url_fragment: &str) -> usize {
        lock(&self.log)
            .navigations
            .iter()
            .filter(|url| url.contains(url_fragment))
            .count()
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Times a session was entered while another call on it was in progress
    #[must_use]
    pub fn overlap_violations(&self) -> usize {
        lock(&self.log).overlap_violations
    }

    /// Most navigations in progress at once
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        lock(&self.log).peak_in_flight
    }

    fn enter(&self, session_id: usize, url: Option<&str>) {
        let mut log = lock(&self.log);
        if !log.busy_sessions.insert(session_id) {
            log.overlap_violations += 1;
        }
        if let Some(url) = url {
            log.navigations.push(url.to_string());
            log.in_flight += 1;
            log.peak_in_flight = log.peak_in_flight.max(log.in_flight);
        }
    }

    fn leave(&self, session_id: usize, navigated: bool) {
        let mut log = lock(&self.log);
        log.busy_sessions.remove(&session_id);
        if navigated {
            log.in_flight = log.in_flight.saturating_sub(1);
        }
    }

    /// Consumes one scripted failure for `url`, if any.
    fn take_navigate_timeout(&self, url: &str) -> bool {
        let mut script = lock(&self.script);
        for (fragment, remaining) in &mut script.navigate_timeouts {
            if *remaining > 0 && url.contains(fragment.as_str()) {
                *remaining -= 1;
                return true;
            }
        }
        false
    }

    fn should_panic(&self, url: &str) -> bool {
        lock(&self.script)
            .navigate_panics
            .iter()
            .any(|fragment| url.contains(fragment.as_str()))
    }

    fn element_times_out(&self, url: &str, locator: &str) -> bool {
        lock(&self.script)
            .element_timeouts
            .iter()
            .any(|(fragment, loc)| loc == locator && url.contains(fragment.as_str()))
    }

    fn markup_for(&self, locator: &str) -> String {
        lock(&self.script)
            .markup
            .get(locator)
            .cloned()
            .unwrap_or_else(|| fixtures::BATTING_TABLE.to_string())
    }

    fn latency(&self) -> Duration {
        lock(&self.script).latency
    }
}

/// Session against a `MockSite`
pub struct MockPageSession {
    session_id: usize,
    site: Arc<MockSite>,
    current_url: Option<String>,
    closed: bool,
}

impl MockPageSession {
    #[must_use]
    pub fn new(session_id: usize, site: Arc<MockSite>) -> Self {
        Self {
            session_id,
            site,
            current_url: None,
            closed: false,
        }
    }
}

#[async_trait]
impl PageSession for MockPageSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.site.enter(self.session_id, Some(url));
        let latency = self.site.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let panics = self.site.should_panic(url);
        let timed_out = self.site.take_navigate_timeout(url);
        self.site.leave(self.session_id, true);

        if panics {
            panic!("scripted panic navigating to {url}");
        }
        if timed_out {
            self.current_url = None;
            return Err(SessionError::NavigateTimeout { url: url.to_string() });
        }
        self.current_url = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_element(&mut self, locator: &str, _timeout: Duration) -> Result<ElementHandle, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let Some(url) = self.current_url.clone() else {
            return Err(SessionError::Driver("no page loaded".to_string()));
        };
        self.site.enter(self.session_id, None);
        let result = if self.site.element_times_out(&url, locator) {
            Err(SessionError::ElementTimeout {
                locator: locator.to_string(),
            })
        } else {
            Ok(ElementHandle::new(locator.to_string(), self.site.markup_for(locator)))
        };
        self.site.leave(self.session_id, false);
        result
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.closed = true;
        self.site.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates `MockPageSession`s; can be told to fail at a given session id
pub struct MockSessionFactory {
    site: Arc<MockSite>,
    fail_at: Option<usize>,
}

impl MockSessionFactory {
    #[must_use]
    pub fn new(site: Arc<MockSite>) -> Self {
        Self { site, fail_at: None }
    }

    #[must_use]
    pub fn failing_at(mut self, session_id: usize) -> Self {
        self.fail_at = Some(session_id);
        self
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn create(&self, session_id: usize) -> Result<Box<dyn PageSession>, SessionError> {
        if self.fail_at == Some(session_id) {
            return Err(SessionError::Driver(format!("mock driver refused session {session_id}")));
        }
        Ok(Box::new(MockPageSession::new(session_id, Arc::clone(&self.site))))
    }
}

/// Store that keeps every row set in memory
#[derive(Default)]
pub struct RecordingStore {
    persisted: Mutex<Vec<NormalizedRowSet>>,
    failing_tables: Mutex<HashSet<String>>,
}

impl RecordingStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Writes to `table` fail from now on.
    pub fn fail_table(&self, table: &str) {
        lock(&self.failing_tables).insert(table.to_string());
    }

    #[must_use]
    pub fn persisted(&self) -> Vec<NormalizedRowSet> {
        lock(&self.persisted).clone()
    }

    #[must_use]
    pub fn persist_count(&self) -> usize {
        lock(&self.persisted).len()
    }

    /// Row sets written for one work unit key
    #[must_use]
    pub fn persisted_for(&self, key: &str) -> Vec<NormalizedRowSet> {
        lock(&self.persisted)
            .iter()
            .filter(|set| set.rows().first().and_then(|row| row.first()).and_then(Option::as_deref) == Some(key))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn persist(&self, rows: &NormalizedRowSet) -> Result<u64, PersistError> {
        if lock(&self.failing_tables).contains(rows.destination_table()) {
            return Err(PersistError::new(rows.destination_table(), "relation is read-only"));
        }
        lock(&self.persisted).push(rows.clone());
        Ok(rows.len() as u64)
    }
}

/// Ledger that keeps every record in memory
#[derive(Default)]
pub struct RecordingLedger {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingLedger {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl AuditLedger for RecordingLedger {
    async fn append(&self, record: &AuditRecord) -> Result<(), LedgerError> {
        lock(&self.records).push(record.clone());
        Ok(())
    }
}

/// Ledger whose every write fails
#[derive(Default)]
pub struct FailingLedger {
    attempts: AtomicUsize,
}

impl FailingLedger {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditLedger for FailingLedger {
    async fn append(&self, _record: &AuditRecord) -> Result<(), LedgerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(LedgerError("connection reset by peer".to_string()))
    }
}

/// Ledger that never answers
#[derive(Default)]
pub struct StalledLedger;

#[async_trait]
impl AuditLedger for StalledLedger {
    async fn append(&self, _record: &AuditRecord) -> Result<(), LedgerError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Source whose listing always fails
pub struct FailingSource;

#[async_trait]
impl WorkUnitSource for FailingSource {
    async fn list(&self) -> Result<Vec<WorkUnit>, SourceError> {
        Err(SourceError("relation \"team\" does not exist".to_string()))
    }
}

/// Work units `(1, keys[0]), (2, keys[1]), ...`
#[must_use]
pub fn work_units(keys: &[&str]) -> Vec<WorkUnit> {
    keys.iter()
        .enumerate()
        .map(|(idx, key)| WorkUnit::new(idx as i64 + 1, *key))
        .collect()
}
