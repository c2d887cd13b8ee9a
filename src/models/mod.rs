pub mod events;
pub mod users;
pub mod volunteers;

pub use events::{EventRow, EventWithHelpersRow};
pub use users::UserRow;
pub use volunteers::{VolunteerRow, VolunteerWithPersonRow};
