//! Slot computation and conflict checking for doctor appointments.

pub mod calendar;
pub mod resolver;
pub mod slots;
pub mod store;

pub use calendar::{WeeklySchedule, WorkDay, WorkHours, WorkingCalendar};
pub use resolver::{
    ensure_slot_free, validate_requested_slot, Availability, AvailabilityResolver, BookingSource,
    SlotOption,
};
pub use slots::{format_slot, truncate_to_minute};
pub use store::{PgBookingStore, TxBookingStore};
