//! Campus event core: conflict detection, the conflict ledger, the approval
//! state machine and the registration gate, composed behind [`EventService`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::Event;
use crate::store::Store;
use crate::utils::clock::Clock;
use crate::utils::error::AppError;

pub mod conflict;
pub mod events;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod notification;
pub mod registration;

use identity::IdentityDirectory;
use notification::{dispatch, Notification, Notifier, Templates};

pub use events::MyEvents;
pub use lifecycle::{Decision, DecisionRequest};
pub use registration::EventStatistics;

/// One async mutex per event id. Registration and payment confirmation for
/// the same event run one at a time.
#[derive(Default)]
struct EventLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl EventLocks {
    async fn acquire(&self, event_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.entry(event_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn forget(&self, event_id: Uuid) {
        let mut locks = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.remove(&event_id);
    }
}

pub struct EventService {
    store: Arc<dyn Store>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    templates: Templates,
    locks: EventLocks,
}

impl EventService {
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        templates: Templates,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            clock,
            templates,
            locks: EventLocks::default(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    async fn load_event(&self, id: Uuid) -> Result<Event, AppError> {
        self.store
            .get_event(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event with id '{}' was not found", id)))
    }

    async fn notify(&self, notification: Notification) {
        dispatch(self.notifier.as_ref(), notification).await;
    }

    async fn notify_opt(&self, notification: Option<Notification>) {
        if let Some(notification) = notification {
            self.notify(notification).await;
        }
    }
}
