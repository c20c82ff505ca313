pub mod auth;
pub mod candidates;
pub mod ledger;
pub mod matcher;
pub mod matches;
pub mod notifications;
pub mod reports;
pub mod scorer;
pub mod uploads;
