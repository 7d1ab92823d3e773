pub mod conflict;
pub mod event;
pub mod feedback;
pub mod registration;
pub mod user;

pub use conflict::{Conflict, ConflictFilter, ConflictStatus};
pub use event::{Event, EventFilter, EventView, EventLevel, EventStatus, EventUpdate, NewEvent};
pub use feedback::{Feedback, NewFeedback};
pub use registration::{AttendanceCode, RegisteredEvent, Registration, RegistrationFilter, RegistrationStatus};
pub use user::{Capability, ExternalRecord, Principal, Role};
