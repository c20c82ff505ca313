pub mod notification;
pub mod pet_match;
pub mod report;
