//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::bus::EventBus;
use crate::context::{ContextRepository, PreferenceRepository};
use crate::db::Database;
use crate::event::EventRepository;
use crate::mesh::{MeshRouter, MessageRepository};
use crate::monitor::Monitor;
use crate::router::AfterWorkRouter;
use crate::rules::RuleRepository;
use crate::session::SessionRepository;
use crate::tasks::TaskRepository;
use crate::terminal::PaneDriver;

/// Everything a request handler can touch.
#[derive(Clone)]
pub struct AppState {
    pub events: EventRepository,
    pub sessions: SessionRepository,
    pub messages: MessageRepository,
    pub rules: RuleRepository,
    pub tasks: TaskRepository,
    pub context: ContextRepository,
    pub prefs: PreferenceRepository,
    pub mesh: Arc<MeshRouter>,
    pub router: Arc<AfterWorkRouter>,
    pub monitor: Arc<Monitor>,
    pub bus: Arc<EventBus>,
    pub driver: Arc<dyn PaneDriver>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the runtime together around one database and one pane driver.
    pub fn new(db: &Database, driver: Arc<dyn PaneDriver>) -> Self {
        let pool = db.pool().clone();
        let events = EventRepository::new(pool.clone());
        let sessions = SessionRepository::new(pool.clone());
        let messages = MessageRepository::new(pool.clone());
        let rules = RuleRepository::new(pool.clone());
        let tasks = TaskRepository::new(pool.clone());
        let context = ContextRepository::new(pool.clone());
        let prefs = PreferenceRepository::new(pool);

        let bus = Arc::new(EventBus::new());
        let mesh = Arc::new(MeshRouter::new(
            messages.clone(),
            sessions.clone(),
            rules.clone(),
            driver.clone(),
        ));
        let router = Arc::new(AfterWorkRouter::new(
            sessions.clone(),
            tasks.clone(),
            messages.clone(),
            rules.clone(),
            driver.clone(),
        ));
        let monitor = Arc::new(Monitor::new(sessions.clone(), bus.clone()));

        Self {
            events,
            sessions,
            messages,
            rules,
            tasks,
            context,
            prefs,
            mesh,
            router,
            monitor,
            bus,
            driver,
            started_at: Instant::now(),
        }
    }
}
